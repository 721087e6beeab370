//! Length-prefixed JSON framing: a 4-byte big-endian length header followed
//! by UTF-8 JSON bytes. Used for handshake frames' payload, RPC envelopes,
//! and the yamux `StreamHello` preface.

use facet::Facet;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::bigendian;
use crate::error::FrameError;

/// Read one length-prefixed JSON frame's raw bytes, rejecting anything
/// larger than `max_len`.
pub async fn read_raw_frame<R>(reader: &mut R, max_len: u32) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = bigendian::get_u32(&len_buf).expect("4-byte buffer");

    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write raw bytes as one length-prefixed frame.
pub async fn write_raw_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut header = Vec::with_capacity(4);
    bigendian::put_u32(&mut header, body.len() as u32);
    writer.write_all(&header).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and parse one length-prefixed JSON frame as `T`.
pub async fn read_json_frame<R, T>(reader: &mut R, max_len: u32) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: Facet<'static>,
{
    let body = read_raw_frame(reader, max_len).await?;
    let text = std::str::from_utf8(&body).map_err(FrameError::InvalidUtf8)?;
    facet_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))
}

/// Serialize `value` to JSON and write it as one length-prefixed frame.
pub async fn write_json_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Facet<'static>,
{
    let text = facet_json::to_string(value).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    write_raw_frame(writer, text.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet::Facet;

    #[derive(Facet, Debug, PartialEq)]
    struct Greeting {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn json_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let msg = Greeting {
            name: "flowersec".to_string(),
            count: 3,
        };

        write_json_frame(&mut client, &msg).await.unwrap();
        let received: Greeting = read_json_frame(&mut server, 4096).await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let big = vec![b'a'; 100];
        write_raw_frame(&mut client, &big).await.unwrap();

        let result: Result<Greeting, _> = read_json_frame(&mut server, 10).await;
        assert!(matches!(result, Err(FrameError::TooLarge { len: 100, max: 10 })));
    }

    #[tokio::test]
    async fn clean_eof_before_header_is_reported() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let result: Result<Greeting, _> = read_json_frame(&mut server, 4096).await;
        assert!(matches!(result, Err(FrameError::Eof)));
    }
}
