//! The settings a running emulator actually needs: where to listen, how
//! much to accept before refusing connections, how to authenticate, and
//! which `ParameterStatus` values to advertise after a successful
//! startup (spec §6's minimum set).

use serde_derive::{Deserialize, Serialize};

use crate::auth::AuthMethod;

use super::{ByteSize, Duration};

/// TLS negotiation policy. `Decline` is the only variant implemented —
/// real certificate handling is out of the core's scope (spec §1, §9);
/// this variant exists so the schema has a place for a future real TLS
/// handler without the core needing to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    Decline,
}

impl Default for TlsMode {
    fn default() -> Self {
        TlsMode::Decline
    }
}

/// General configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct General {
    #[serde(default = "General::default_host")]
    pub host: String,

    #[serde(default = "General::default_port")]
    pub port: u16,

    #[serde(default = "General::default_max_connections")]
    pub max_connections: u64,

    /// `0` disables the idle timeout (spec §5 "Timeouts").
    #[serde(default = "General::default_idle_timeout_ms")]
    pub idle_timeout_ms: Duration,

    /// Drain deadline the Acceptor waits for dispatch loops to finish
    /// during a graceful shutdown (spec §4.4).
    #[serde(default = "General::default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: Duration,

    /// The Codec's oversize-length ceiling (spec §4.1, default 1 MiB).
    #[serde(default = "General::default_message_size_limit")]
    pub message_size_limit: ByteSize,

    #[serde(default)]
    pub tls_mode: TlsMode,

    #[serde(default = "General::default_auth_method")]
    pub auth_method: AuthMethod,

    /// Expected password for `Cleartext`/`Md5`; unused under `Trust`.
    pub auth_password: Option<String>,

    #[serde(default = "General::default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default)]
    pub log_client_connections: bool,

    // Minimum `ParameterStatus` set sent after a successful startup
    // (spec §6), each overridable.
    #[serde(default = "General::default_server_version")]
    pub server_version: String,
    #[serde(default = "General::default_server_encoding")]
    pub server_encoding: String,
    #[serde(default = "General::default_client_encoding")]
    pub client_encoding: String,
    #[serde(default = "General::default_date_style")]
    pub date_style: String,
    #[serde(default = "General::default_interval_style")]
    pub interval_style: String,
    #[serde(default = "General::default_time_zone")]
    pub time_zone: String,
    #[serde(default = "General::default_integer_datetimes")]
    pub integer_datetimes: String,
    #[serde(default = "General::default_standard_conforming_strings")]
    pub standard_conforming_strings: String,
}

impl General {
    pub fn default_host() -> String {
        "127.0.0.1".into()
    }

    pub fn default_port() -> u16 {
        5432
    }

    pub fn default_max_connections() -> u64 {
        1024
    }

    pub fn default_idle_timeout_ms() -> Duration {
        Duration::from_millis(0)
    }

    pub fn default_shutdown_timeout_ms() -> Duration {
        Duration::from_millis(5_000)
    }

    pub fn default_message_size_limit() -> ByteSize {
        ByteSize::from_mb(1)
    }

    pub fn default_auth_method() -> AuthMethod {
        AuthMethod::Trust
    }

    pub fn default_worker_threads() -> usize {
        num_cpus::get()
    }

    pub fn default_server_version() -> String {
        "16.0 (pg_wire_emulator)".into()
    }

    pub fn default_server_encoding() -> String {
        "UTF8".into()
    }

    pub fn default_client_encoding() -> String {
        "UTF8".into()
    }

    pub fn default_date_style() -> String {
        "ISO, MDY".into()
    }

    pub fn default_interval_style() -> String {
        "postgres".into()
    }

    pub fn default_time_zone() -> String {
        "UTC".into()
    }

    pub fn default_integer_datetimes() -> String {
        "on".into()
    }

    pub fn default_standard_conforming_strings() -> String {
        "on".into()
    }

    /// The `(name, value)` pairs emitted as `ParameterStatus` messages
    /// right after `AuthenticationOk` (spec §6).
    pub fn server_parameters(&self) -> Vec<(String, String)> {
        vec![
            ("server_version".into(), self.server_version.clone()),
            ("server_encoding".into(), self.server_encoding.clone()),
            ("client_encoding".into(), self.client_encoding.clone()),
            ("DateStyle".into(), self.date_style.clone()),
            ("IntervalStyle".into(), self.interval_style.clone()),
            ("TimeZone".into(), self.time_zone.clone()),
            (
                "integer_datetimes".into(),
                self.integer_datetimes.clone(),
            ),
            (
                "standard_conforming_strings".into(),
                self.standard_conforming_strings.clone(),
            ),
        ]
    }
}

impl Default for General {
    fn default() -> General {
        General {
            host: Self::default_host(),
            port: Self::default_port(),
            max_connections: Self::default_max_connections(),
            idle_timeout_ms: Self::default_idle_timeout_ms(),
            shutdown_timeout_ms: Self::default_shutdown_timeout_ms(),
            message_size_limit: Self::default_message_size_limit(),
            tls_mode: TlsMode::default(),
            auth_method: Self::default_auth_method(),
            auth_password: None,
            worker_threads: Self::default_worker_threads(),
            log_client_connections: false,
            server_version: Self::default_server_version(),
            server_encoding: Self::default_server_encoding(),
            client_encoding: Self::default_client_encoding(),
            date_style: Self::default_date_style(),
            interval_style: Self::default_interval_style(),
            time_zone: Self::default_time_zone(),
            integer_datetimes: Self::default_integer_datetimes(),
            standard_conforming_strings: Self::default_standard_conforming_strings(),
        }
    }
}
