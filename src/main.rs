use clap::Parser;

use shadowfix::cli::{self, Cli, Command, ConfigCommand};
use shadowfix::{config, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        // Exit without waiting on a timed-out analysis worker.
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Analyze {
            file,
            kind,
            timeout_secs,
        } => {
            let cfg = config::load_config()?;
            logging::init_logging(cfg.logging.format, &cfg.logging.level)?;
            tracing::debug!(
                target: "config",
                path = %config::get_config_path().display(),
                "Configuration loaded"
            );
            cli::handle_analyze(&cfg, &file, kind, timeout_secs).await
        }
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(),
        Command::Config(ConfigCommand::Path) => {
            cli::handle_config_path();
            Ok(())
        }
        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    }
}
