//! The preface every yamux stream opens with: `{v:1, kind:<string>}`,
//! naming what the stream is for (e.g. `"rpc"`). Unlike the envelope body,
//! this shape is fixed, so it goes through the ordinary `Facet` JSON path.

use facet::Facet;

use flowersec_wire::FrameError;

pub const STREAM_HELLO_VERSION: u32 = 1;

/// Cap on the `StreamHello` frame itself; this is a small, fixed-shape
/// preface, not a place for large payloads.
pub const MAX_STREAM_HELLO_BYTES: u32 = 4096;

pub const RPC_STREAM_KIND: &str = "rpc";

#[derive(Facet, Debug, Clone, PartialEq)]
pub struct StreamHello {
    pub v: u32,
    pub kind: String,
}

impl StreamHello {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { v: STREAM_HELLO_VERSION, kind: kind.into() }
    }

    pub fn rpc() -> Self {
        Self::new(RPC_STREAM_KIND)
    }
}

pub async fn write_stream_hello<W>(writer: &mut W, hello: &StreamHello) -> Result<(), FrameError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    flowersec_wire::write_json_frame(writer, hello).await
}

pub async fn read_stream_hello<R>(reader: &mut R) -> Result<StreamHello, FrameError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    flowersec_wire::read_json_frame(reader, MAX_STREAM_HELLO_BYTES).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rpc_hello_roundtrips() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_stream_hello(&mut a, &StreamHello::rpc()).await.unwrap();
        let hello = read_stream_hello(&mut b).await.unwrap();
        assert_eq!(hello, StreamHello::rpc());
        assert_eq!(hello.kind, "rpc");
    }
}
