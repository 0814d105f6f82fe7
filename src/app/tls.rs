//! TLS negotiation stub.
//!
//! Real certificate handling is an explicit external collaborator the
//! core never touches (spec §1, §9): the default handler always
//! declines, leaving the client to fall back to a plaintext connection
//! or disconnect, exactly like the teacher's default before a real
//! certificate is configured.

use crate::config::{Config, TlsMode};

/// Decide how an `SSLRequest`/`GSSENCRequest` should be answered. Only
/// `Decline` is implemented; the enum exists so a future real TLS
/// handler has somewhere to plug in without the dispatcher changing.
pub fn should_accept_tls(config: &Config) -> bool {
    match config.general.tls_mode {
        TlsMode::Decline => false,
    }
}
