//! Yamux v0 frame layout:
//! `version(1) type(1) flags(2 be) stream_id(4 be) length(4 be)`, 12 bytes,
//! followed by `length` bytes of body for DATA (and the opaque PING payload
//! carried as `length`, with no trailing bytes — PING's "length" is just an
//! opaque counter, never a body to read).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use flowersec_wire::bigendian;

use crate::error::MuxError;

pub const PROTOCOL_VERSION: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data = 0,
    WindowUpdate = 1,
    Ping = 2,
    GoAway = 3,
}

impl FrameType {
    pub fn from_byte(b: u8) -> Result<Self, MuxError> {
        match b {
            0 => Ok(Self::Data),
            1 => Ok(Self::WindowUpdate),
            2 => Ok(Self::Ping),
            3 => Ok(Self::GoAway),
            other => Err(MuxError::UnknownFrameType(other)),
        }
    }
}

pub mod flags {
    pub const SYN: u16 = 1;
    pub const ACK: u16 = 2;
    pub const FIN: u16 = 4;
    pub const RST: u16 = 8;
}

#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub flags: u16,
    pub stream_id: u32,
    pub length: u32,
}

impl FrameHeader {
    pub const LEN: usize = 12;

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0] = PROTOCOL_VERSION;
        buf[1] = self.frame_type as u8;
        buf[2..4].copy_from_slice(&self.flags.to_be_bytes());
        buf[4..8].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.length.to_be_bytes());
        buf
    }
}

pub async fn write_header<W>(writer: &mut W, header: &FrameHeader) -> Result<(), MuxError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&header.encode()).await?;
    Ok(())
}

pub async fn write_frame<W>(writer: &mut W, header: &FrameHeader, body: &[u8]) -> Result<(), MuxError>
where
    W: AsyncWrite + Unpin,
{
    write_header(writer, header).await?;
    if !body.is_empty() {
        writer.write_all(body).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read and validate one frame header (version/type checked, body not read).
pub async fn read_header<R>(reader: &mut R) -> Result<FrameHeader, MuxError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; FrameHeader::LEN];
    reader.read_exact(&mut buf).await?;

    let version = buf[0];
    if version != PROTOCOL_VERSION {
        return Err(MuxError::UnsupportedVersion(version));
    }
    let frame_type = FrameType::from_byte(buf[1])?;
    let flags = bigendian::get_u16(&buf[2..4]).expect("2-byte slice");
    let stream_id = bigendian::get_u32(&buf[4..8]).expect("4-byte slice");
    let length = bigendian::get_u32(&buf[8..12]).expect("4-byte slice");

    Ok(FrameHeader {
        frame_type,
        flags,
        stream_id,
        length,
    })
}

pub async fn read_body<R>(reader: &mut R, len: u32) -> Result<Vec<u8>, MuxError>
where
    R: AsyncRead + Unpin,
{
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn data_frame_roundtrips() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let header = FrameHeader {
            frame_type: FrameType::Data,
            flags: flags::SYN,
            stream_id: 3,
            length: 5,
        };
        write_frame(&mut a, &header, b"hello").await.unwrap();

        let read = read_header(&mut b).await.unwrap();
        assert_eq!(read.stream_id, 3);
        assert!(read.has_flag(flags::SYN));
        let body = read_body(&mut b, read.length).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let mut bad = [0u8; FrameHeader::LEN];
        bad[0] = 7;
        a.write_all(&bad).await.unwrap();
        assert!(matches!(read_header(&mut b).await, Err(MuxError::UnsupportedVersion(7))));
    }

    #[tokio::test]
    async fn unknown_frame_type_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let mut bad = [0u8; FrameHeader::LEN];
        bad[1] = 99;
        a.write_all(&bad).await.unwrap();
        assert!(matches!(read_header(&mut b).await, Err(MuxError::UnknownFrameType(99))));
    }
}
