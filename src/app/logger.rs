//! Logging setup: `tracing` + `tracing_subscriber`, following the
//! teacher's `EnvFilter`-seeded-by-CLI-flag pattern.

use tracing_subscriber::EnvFilter;

use super::args::{Args, LogFormat};
use crate::config::VERSION;

pub fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!args.no_color);

    match args.log_format {
        LogFormat::Structured => subscriber.json().init(),
        LogFormat::Debug => subscriber.pretty().init(),
        LogFormat::Text => subscriber.init(),
    };

    tracing::info!("pg_wire_emulator {VERSION} starting up");
    Ok(())
}
