//! Connection preface announcing the content type.
//!
//! ```text
//! +-------------+-------------+-----------+----------------------+
//! | "TTHR" (4)  | version (1) | len (1)   | content type (len)   |
//! +-------------+-------------+-----------+----------------------+
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use tether_core::CodecError;

pub const PREFACE_MAGIC: &[u8; 4] = b"TTHR";
pub const PROTOCOL_VERSION: u8 = 1;

/// Write the preface for `content_type`.
pub async fn write_preface<W>(io: &mut W, content_type: &str) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let len = u8::try_from(content_type.len()).map_err(|_| {
        CodecError::InvalidFrame(format!("content type too long: {content_type}"))
    })?;

    let mut buf = Vec::with_capacity(6 + content_type.len());
    buf.extend_from_slice(PREFACE_MAGIC);
    buf.push(PROTOCOL_VERSION);
    buf.push(len);
    buf.extend_from_slice(content_type.as_bytes());

    io.write_all(&buf).await?;
    io.flush().await?;
    Ok(())
}

/// Read a preface and return the announced content type.
pub async fn read_preface<R>(io: &mut R) -> Result<String, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 6];
    io.read_exact(&mut head).await?;

    if &head[..4] != PREFACE_MAGIC {
        return Err(CodecError::InvalidFrame("bad preface magic".into()));
    }
    if head[4] != PROTOCOL_VERSION {
        return Err(CodecError::InvalidFrame(format!(
            "unsupported protocol version {}",
            head[4]
        )));
    }

    let mut content_type = vec![0u8; usize::from(head[5])];
    io.read_exact(&mut content_type).await?;
    String::from_utf8(content_type)
        .map_err(|_| CodecError::InvalidFrame("content type is not utf-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_preface_exchange() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_preface(&mut client, "application/json").await.unwrap();
        assert_eq!(read_preface(&mut server).await.unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_bad_magic() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"HTTP/1").await.unwrap();
        assert!(matches!(
            read_preface(&mut server).await,
            Err(CodecError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_preface() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"TTH").await.unwrap();
        drop(client);
        assert!(matches!(read_preface(&mut server).await, Err(CodecError::Io(_))));
    }
}
