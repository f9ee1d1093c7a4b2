mod args;
mod commands;
mod display;
mod terminal;

use anyhow::Context;
use sellerie_core::config::Settings;
use sellerie_core::serial::list_serial_ports;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::Action;
use crate::terminal::Terminal;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let action = match args::parse_args(&argv) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{e}");
            args::print_usage();
            std::process::exit(1);
        }
    };

    match action {
        Action::Version => {
            println!("sellerie {}", VERSION);
            Ok(())
        }
        Action::Help => {
            args::print_usage();
            Ok(())
        }
        Action::List => {
            let ports = list_serial_ports();
            if ports.is_empty() {
                eprintln!("No serial ports found");
            }
            for port in ports {
                println!("{port}");
            }
            Ok(())
        }
        Action::Run(opts) => {
            // Received data goes to stdout, so logs go to stderr.
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .with_writer(std::io::stderr)
                .init();

            let config_path = opts.config.clone().unwrap_or_else(Settings::default_path);
            let mut settings = Settings::load_from(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?;
            opts.apply(&mut settings);
            settings.validate()?;

            if settings.serial.port.is_empty() {
                anyhow::bail!(
                    "No serial port given; use --port or set serial.port in {}",
                    config_path.display()
                );
            }

            info!("sellerie {} starting on {}", VERSION, settings.serial.port);
            Terminal::start(settings)?.run().await
        }
    }
}
