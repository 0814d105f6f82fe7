use std::io::{self, IsTerminal, Write};

use tokio::runtime::Builder;

use super::args::Args;
use crate::config::{self, get_config, Config};

/// Parse and validate the configuration file named by `args`, exiting
/// the process with `exitcode::CONFIG` on failure (spec §6's CLI
/// contract). Uses a throwaway single-threaded runtime so a bad config
/// is reported before the real multi-threaded runtime and logger spin
/// up.
pub fn init_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let runtime = Builder::new_multi_thread().worker_threads(1).build()?;
    runtime.block_on(async {
        if let Err(err) = config::parse(args.config_file.as_str()).await {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                eprintln!("Config parse error: {err}");
                io::stdout().flush().unwrap();
            } else {
                log::error!("Config parse error: {err:?}");
            }
            std::process::exit(exitcode::CONFIG);
        }
    });

    Ok((*get_config()).clone())
}
