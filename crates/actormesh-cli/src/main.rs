//! actormesh CLI: offline inspection of captured protocol traffic.

mod cli;
mod cmd;

use actormesh_types::config::{LogFormat, MeshConfig};
use clap::Parser;
use cli::{Cli, Commands, LogFormatArg};

fn init_tracing(config: &MeshConfig, format: Option<LogFormatArg>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level));
    let json = match format {
        Some(LogFormatArg::Json) => true,
        Some(LogFormatArg::Text) => false,
        None => config.log.format == LogFormat::Json,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let cli = Cli::parse();
    let config = actormesh_wire::config::load_config(cli.config.as_deref());
    init_tracing(&config, cli.log_format);

    let result = match cli.command {
        Commands::Inspect {
            file,
            hex,
            json,
            max_frame_size,
        } => cmd::inspect::run(
            &file,
            &cmd::inspect::InspectOptions {
                hex,
                json,
                max_frame_size: max_frame_size.unwrap_or(config.wire.max_frame_size),
            },
        ),
        Commands::Config => cmd::config::run(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
