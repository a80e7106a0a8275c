use clap::Parser;
use log::{error, info};

use tagclip::{App, Cli, Commands, Config};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> tagclip::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    if let Commands::Config { show, set, reset } = cli.command {
        return App::handle_config(&config_path, show, set, reset);
    }

    let mut config = Config::load(&config_path)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(file) = cli.backup_file {
        config.backup_file = file;
    }

    let mut app = App::startup(config, cli.verbose)?;
    let result = app.run(cli.command).await;

    // The backup worker must drain before the process exits.
    if let Err(e) = app.shutdown().await {
        error!("Shutdown failed: {}", e);
    }
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    info!("Application starting up");

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("Application shutting down");
}
