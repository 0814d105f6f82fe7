//! Configuration loading for the emulator binary.
//!
//! The wire-protocol core (spec §1-§9) never reads a config file itself;
//! this module is the external collaborator that turns a TOML file into
//! the [`Config`] value the CLI hands to [`crate::app::server::run_server`]
//! and the [`crate::dispatcher::DispatcherConfig`] it builds from it.

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

mod byte_size;
mod duration;
mod general;


pub use byte_size::ByteSize;
pub use duration::Duration;
pub use general::{General, TlsMode};

use crate::errors::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Globally available configuration, reloadable on `SIGHUP` without
/// restarting any in-flight dispatch loop.
static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub general: General,

    /// Populated from the path `parse` was called with, so a later
    /// `reload_config()` (triggered by `SIGHUP`) knows what to re-read.
    #[serde(skip)]
    pub path: String,
}

impl Config {
    /// Non-zero port, non-negative timeouts — the checks a conformance
    /// fixture actually needs; there is no pool/user/HBA graph to walk.
    pub fn validate(&self) -> Result<(), Error> {
        if self.general.port == 0 {
            return Err(Error::BadConfig("general.port must be non-zero".into()));
        }
        if self.general.max_connections == 0 {
            return Err(Error::BadConfig(
                "general.max_connections must be non-zero".into(),
            ));
        }
        if self.general.worker_threads == 0 {
            return Err(Error::BadConfig(
                "general.worker_threads must be non-zero".into(),
            ));
        }
        if matches!(self.general.auth_method, crate::auth::AuthMethod::Cleartext | crate::auth::AuthMethod::Md5)
            && self.general.auth_password.is_none()
        {
            return Err(Error::BadConfig(
                "general.auth_password is required when auth_method is cleartext or md5".into(),
            ));
        }
        Ok(())
    }

    pub fn show(&self) {
        use log::info;
        info!("Listening on {}:{}", self.general.host, self.general.port);
        info!("Worker threads: {}", self.general.worker_threads);
        info!("Max connections: {}", self.general.max_connections);
        info!(
            "Message size limit: {} bytes",
            self.general.message_size_limit
        );
        info!("Auth method: {}", self.general.auth_method);
        info!("TLS mode: {:?} (always declines)", self.general.tls_mode);
    }
}

/// A read-only snapshot of the configuration. `ArcSwap` makes this cheap
/// and lock-free from every dispatch loop.
pub fn get_config() -> Arc<Config> {
    CONFIG.load_full()
}

/// Parse and validate a TOML configuration file, then publish it as the
/// process-wide `Config` (spec §6's CLI contract: a bad file is reported
/// and the caller is expected to exit non-zero, not silently proceed).
pub async fn parse(path: &str) -> Result<(), Error> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::BadConfig(format!("could not read '{path}': {err}")))?;

    let mut config: Config = toml::from_str(&contents)
        .map_err(|err| Error::BadConfig(format!("TOML parse error in '{path}': {err}")))?;

    config.validate()?;
    config.path = path.to_string();

    CONFIG.store(Arc::new(config));
    Ok(())
}

/// Reload the configuration from the path it was last loaded from,
/// triggered by `SIGHUP` (spec §5's "Internal" signal handling, extended
/// here the way the teacher's `reload_config` extends it — our core has
/// no connection pool to re-provision, so this is just a re-parse).
pub async fn reload_config() -> Result<(), Error> {
    let path = get_config().path.clone();
    parse(&path).await
}
