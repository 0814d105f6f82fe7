//! Frame assembly and disassembly.
//!
//! Every inbound message, typed or untyped, is read to completion before
//! the dispatcher sees it: a short `read()` on a slow client never yields a
//! partial frame to the rest of the crate.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{Error, ProtocolError};

/// A typed message: one tag byte followed by a length-prefixed payload.
#[derive(Debug)]
pub struct TypedMessage {
    pub tag: u8,
    /// Payload bytes, the length field and tag already stripped.
    pub payload: BytesMut,
}

/// Read one typed frame, looping on `read()` until the whole frame — tag,
/// length, and payload — has arrived.
///
/// Returns `Err(ProtocolError::PeerClosed)` only when the peer closes
/// before a single byte of a new frame arrives; a close mid-frame is
/// `ProtocolError::Truncated`.
pub async fn read_typed<S>(stream: &mut S, limit: usize) -> Result<TypedMessage, Error>
where
    S: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    match stream.read_exact(&mut tag).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::PeerClosed.into());
        }
        Err(err) => return Err(err.into()),
    }

    let len_buf = read_len_prefix(stream, limit).await?;
    let payload = read_payload(stream, len_buf).await?;

    Ok(TypedMessage {
        tag: tag[0],
        payload,
    })
}

/// Read one untyped (startup-class) frame: a bare length-prefixed payload
/// with no leading tag byte. Used for `StartupMessage`, `SSLRequest`,
/// `GSSENCRequest`, and `CancelRequest`.
pub async fn read_untyped<S>(stream: &mut S, limit: usize) -> Result<BytesMut, Error>
where
    S: AsyncRead + Unpin,
{
    let len_buf = read_len_prefix(stream, limit).await?;
    read_payload(stream, len_buf).await
}

async fn read_len_prefix<S>(stream: &mut S, limit: usize) -> Result<i32, Error>
where
    S: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match stream.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::Truncated.into());
        }
        Err(err) => return Err(err.into()),
    }
    let len = i32::from_be_bytes(len_bytes);
    if len < 4 {
        return Err(ProtocolError::InvalidLength(len).into());
    }
    if (len as usize).saturating_sub(4) > limit {
        return Err(ProtocolError::OversizeLength(len, limit).into());
    }
    Ok(len)
}

async fn read_payload<S>(stream: &mut S, len: i32) -> Result<BytesMut, Error>
where
    S: AsyncRead + Unpin,
{
    let body_len = (len as usize) - 4;
    let mut payload = BytesMut::zeroed(body_len);
    if body_len > 0 {
        match stream.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::Truncated.into());
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(payload)
}

/// Write a fully-built message and flush it. The length field inside
/// `bytes` must already be correct; every builder in [`super::backend`]
/// computes it from the actual payload it assembles.
pub async fn write<S>(stream: &mut S, bytes: &[u8]) -> Result<(), Error>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Read a NUL-terminated C-string out of a payload cursor.
pub fn get_cstr(buf: &mut BytesMut) -> Result<String, Error> {
    let nul = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| ProtocolError::MalformedPayload("unterminated string".into()))?;
    let raw = buf.split_to(nul);
    buf.advance(1); // the NUL itself
    String::from_utf8(raw.to_vec())
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()).into())
}

/// Append a NUL-terminated C-string to an outbound buffer.
pub fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_typed_message_split_across_many_small_reads() {
        let mut payload = BytesMut::new();
        payload.put_u8(frontend_tag());
        payload.put_i32(4 + 5);
        payload.put_slice(b"hello");

        let mut reader = tokio_test::io::Builder::new()
            .read(&payload[0..1])
            .read(&payload[1..3])
            .read(&payload[3..6])
            .read(&payload[6..])
            .build();

        let msg = read_typed(&mut reader, 1024).await.unwrap();
        assert_eq!(msg.tag, frontend_tag());
        assert_eq!(&msg.payload[..], b"hello");
    }

    #[tokio::test]
    async fn rejects_frames_over_the_configured_ceiling() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(b'Q');
        bytes.put_i32(4 + 100);
        bytes.extend_from_slice(&vec![0u8; 100]);

        let mut reader = tokio_test::io::Builder::new().read(&bytes).build();
        let err = read_typed(&mut reader, 16).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::OversizeLength(_, _))
        ));
    }

    #[tokio::test]
    async fn peer_closed_before_any_byte_is_reported_distinctly_from_mid_frame() {
        let mut reader = tokio_test::io::Builder::new().build();
        let err = read_typed(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::PeerClosed)));

        let mut reader = tokio_test::io::Builder::new().read(&[b'Q']).build();
        let err = read_typed(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Truncated)));
    }

    #[test]
    fn cstr_roundtrips() {
        let mut buf = BytesMut::new();
        put_cstr(&mut buf, "user");
        buf.put_slice(b"trailer");
        let s = get_cstr(&mut buf).unwrap();
        assert_eq!(s, "user");
        assert_eq!(&buf[..], b"trailer");
    }

    fn frontend_tag() -> u8 {
        b'Q'
    }
}
