//! Builders for backend (server → client) messages.
//!
//! Every builder computes its length field from the payload it assembles;
//! none of them hand-calculate a size up front, which is how the original
//! C server's buffer-overflow class of bugs crept in.

use bytes::{BufMut, BytesMut};

use super::codec::put_cstr;
use super::constants::{auth_code, backend, target};

fn framed(tag: u8, body: impl FnOnce(&mut BytesMut)) -> BytesMut {
    let mut payload = BytesMut::new();
    body(&mut payload);
    let mut out = BytesMut::with_capacity(payload.len() + 5);
    out.put_u8(tag);
    out.put_i32(4 + payload.len() as i32);
    out.put_slice(&payload);
    out
}

pub fn authentication_ok() -> BytesMut {
    framed(backend::AUTHENTICATION, |b| b.put_i32(auth_code::OK))
}

pub fn authentication_cleartext_password() -> BytesMut {
    framed(backend::AUTHENTICATION, |b| {
        b.put_i32(auth_code::CLEARTEXT_PASSWORD)
    })
}

pub fn authentication_md5_password(salt: [u8; 4]) -> BytesMut {
    framed(backend::AUTHENTICATION, |b| {
        b.put_i32(auth_code::MD5_PASSWORD);
        b.put_slice(&salt);
    })
}

pub fn parameter_status(name: &str, value: &str) -> BytesMut {
    framed(backend::PARAMETER_STATUS, |b| {
        put_cstr(b, name);
        put_cstr(b, value);
    })
}

pub fn backend_key_data(pid: i32, secret_key: i32) -> BytesMut {
    framed(backend::BACKEND_KEY_DATA, |b| {
        b.put_i32(pid);
        b.put_i32(secret_key);
    })
}

pub fn ready_for_query(txn_status: u8) -> BytesMut {
    framed(backend::READY_FOR_QUERY, |b| b.put_u8(txn_status))
}

/// One column's metadata for a [`row_description`] message.
pub struct FieldDescription {
    pub name: String,
    pub table_oid: i32,
    pub column_attr: i16,
    pub type_oid: i32,
    pub type_len: i16,
    pub type_modifier: i32,
    pub format_code: i16,
}

impl FieldDescription {
    /// A `text`-typed column (OID 25), the common case for canned rows.
    pub fn text(name: impl Into<String>) -> Self {
        FieldDescription {
            name: name.into(),
            table_oid: 0,
            column_attr: 0,
            type_oid: 25,
            type_len: -1,
            type_modifier: -1,
            format_code: 0,
        }
    }

    /// An `int4`-typed column (OID 23).
    pub fn int4(name: impl Into<String>) -> Self {
        FieldDescription {
            name: name.into(),
            table_oid: 0,
            column_attr: 0,
            type_oid: 23,
            type_len: 4,
            type_modifier: -1,
            format_code: 0,
        }
    }
}

pub fn row_description(fields: &[FieldDescription]) -> BytesMut {
    framed(backend::ROW_DESCRIPTION, |b| {
        b.put_i16(fields.len() as i16);
        for f in fields {
            put_cstr(b, &f.name);
            b.put_i32(f.table_oid);
            b.put_i16(f.column_attr);
            b.put_i32(f.type_oid);
            b.put_i16(f.type_len);
            b.put_i32(f.type_modifier);
            b.put_i16(f.format_code);
        }
    })
}

/// `None` encodes SQL NULL; `Some` encodes the column's text-format value.
pub fn data_row(columns: &[Option<&str>]) -> BytesMut {
    framed(backend::DATA_ROW, |b| {
        b.put_i16(columns.len() as i16);
        for col in columns {
            match col {
                Some(v) => {
                    b.put_i32(v.len() as i32);
                    b.put_slice(v.as_bytes());
                }
                None => b.put_i32(-1),
            }
        }
    })
}

pub fn command_complete(tag: &str) -> BytesMut {
    framed(backend::COMMAND_COMPLETE, |b| put_cstr(b, tag))
}

pub fn empty_query_response() -> BytesMut {
    framed(backend::EMPTY_QUERY_RESPONSE, |_| {})
}

pub fn parse_complete() -> BytesMut {
    framed(backend::PARSE_COMPLETE, |_| {})
}

pub fn bind_complete() -> BytesMut {
    framed(backend::BIND_COMPLETE, |_| {})
}

pub fn close_complete() -> BytesMut {
    framed(backend::CLOSE_COMPLETE, |_| {})
}

pub fn no_data() -> BytesMut {
    framed(backend::NO_DATA, |_| {})
}

pub fn portal_suspended() -> BytesMut {
    framed(backend::PORTAL_SUSPENDED, |_| {})
}

pub fn parameter_description(type_oids: &[i32]) -> BytesMut {
    framed(backend::PARAMETER_DESCRIPTION, |b| {
        b.put_i16(type_oids.len() as i16);
        for oid in type_oids {
            b.put_i32(*oid);
        }
    })
}

/// One field of an `ErrorResponse`/`NoticeResponse`: `(type_byte, value)`.
/// Common type bytes: `S` severity, `C` SQLSTATE code, `M` message.
pub fn error_response(fields: &[(u8, &str)]) -> BytesMut {
    notice_like(backend::ERROR_RESPONSE, fields)
}

pub fn notice_response(fields: &[(u8, &str)]) -> BytesMut {
    notice_like(backend::NOTICE_RESPONSE, fields)
}

fn notice_like(tag: u8, fields: &[(u8, &str)]) -> BytesMut {
    framed(tag, |b| {
        for (kind, value) in fields {
            b.put_u8(*kind);
            put_cstr(b, value);
        }
        b.put_u8(0); // terminator
    })
}

/// A simple error response built from severity/SQLSTATE/message, the
/// three fields every handler in this crate actually sets.
pub fn simple_error(severity: &str, sqlstate: &str, message: &str) -> BytesMut {
    error_response(&[(b'S', severity), (b'C', sqlstate), (b'M', message)])
}

/// `Describe`/`Close` response helpers share the target byte convention.
pub const STATEMENT_TARGET: u8 = target::STATEMENT;
pub const PORTAL_TARGET: u8 = target::PORTAL;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_for_query_has_the_right_length_and_status() {
        let msg = ready_for_query(b'I');
        assert_eq!(&msg[..], &[b'Z', 0, 0, 0, 5, b'I']);
    }

    #[test]
    fn row_description_and_data_row_agree_on_column_count() {
        let rd = row_description(&[FieldDescription::text("x")]);
        assert_eq!(rd[0], b'T');
        let count = i16::from_be_bytes([rd[5], rd[6]]);
        assert_eq!(count, 1);

        let dr = data_row(&[Some("1")]);
        assert_eq!(dr[0], b'D');
        let count = i16::from_be_bytes([dr[5], dr[6]]);
        assert_eq!(count, 1);
    }

    #[test]
    fn data_row_encodes_null_as_minus_one() {
        let dr = data_row(&[None]);
        let len = i32::from_be_bytes([dr[7], dr[8], dr[9], dr[10]]);
        assert_eq!(len, -1);
    }

    #[test]
    fn simple_error_is_nul_terminated() {
        let msg = simple_error("ERROR", "42601", "syntax error");
        assert_eq!(*msg.last().unwrap(), 0);
    }
}
