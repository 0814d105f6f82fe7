//! Default authentication handler: trust, cleartext, and MD5.
//!
//! SCRAM, GSSAPI, JWT, PAM, and HBA rule evaluation are explicit
//! non-goals; this module only ever negotiates the three sub-types the
//! wire protocol calls `AuthenticationOk`/`CleartextPassword`/`MD5Password`.

use md5::{Digest, Md5};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::{AuthError, Error};
use crate::messages::{backend, codec};

/// Which sub-type the default handler negotiates. `Trust` never reads a
/// `PasswordMessage` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Trust,
    Cleartext,
    Md5,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthMethod::Trust => "trust",
            AuthMethod::Cleartext => "cleartext",
            AuthMethod::Md5 => "md5",
        };
        write!(f, "{s}")
    }
}

/// Negotiate authentication for `user` over `stream`, following the
/// sequence in spec §6: challenge, read `PasswordMessage`, verify, and
/// (on success) leave the caller free to write `AuthenticationOk`.
///
/// Returns `Ok(())` on success; on failure the caller is responsible for
/// writing the `ErrorResponse` and closing the connection (spec §7.2).
pub async fn authenticate<S>(
    stream: &mut S,
    method: AuthMethod,
    user: &str,
    expected_password: Option<&str>,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match method {
        AuthMethod::Trust => Ok(()),
        AuthMethod::Cleartext => {
            codec::write(stream, &backend::authentication_cleartext_password()).await?;
            let password = read_password_message(stream).await?;
            let password = String::from_utf8_lossy(&password);
            if constant_time_eq(password.as_bytes(), expected_password.unwrap_or("").as_bytes()) {
                Ok(())
            } else {
                Err(AuthError::WrongPassword(user.to_string()).into())
            }
        }
        AuthMethod::Md5 => {
            let salt: [u8; 4] = rand::rng().random();
            codec::write(stream, &backend::authentication_md5_password(salt)).await?;
            let password = read_password_message(stream).await?;
            let expected = md5_hash(expected_password.unwrap_or(""), user, salt);
            if constant_time_eq(&password, expected.as_bytes()) {
                Ok(())
            } else {
                Err(AuthError::WrongPassword(user.to_string()).into())
            }
        }
    }
}

async fn read_password_message<S>(stream: &mut S) -> Result<Vec<u8>, Error>
where
    S: AsyncRead + Unpin,
{
    let msg = codec::read_typed(stream, 1024 * 1024).await?;
    if msg.tag != crate::messages::constants::frontend::PASSWORD {
        return Err(crate::errors::ProtocolError::UnexpectedMessage(Some(msg.tag)).into());
    }
    let mut raw = msg.payload.to_vec();
    // Trim the trailing NUL the wire format always carries.
    if raw.last() == Some(&0) {
        raw.pop();
    }
    Ok(raw)
}

/// `concat("md5", hex(md5(concat(hex(md5(password||user)), salt))))`.
pub fn md5_hash(password: &str, user: &str, salt: [u8; 4]) -> String {
    let inner = hex_digest(format!("{password}{user}").as_bytes());
    let mut outer_input = Vec::with_capacity(inner.len() + 4);
    outer_input.extend_from_slice(inner.as_bytes());
    outer_input.extend_from_slice(&salt);
    format!("md5{}", hex_digest(&outer_input))
}

fn hex_digest(input: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(input);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
