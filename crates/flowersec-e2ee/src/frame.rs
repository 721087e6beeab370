//! FSEH (handshake) and FSEC (record) frame layouts.

use facet::Facet;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use flowersec_wire::bigendian;

use crate::error::E2eeError;

const HANDSHAKE_MAGIC: &[u8; 4] = b"FSEH";
const RECORD_MAGIC: &[u8; 4] = b"FSEC";
pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFrameType {
    Init = 1,
    Resp = 2,
    Ack = 3,
}

impl HandshakeFrameType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Init),
            2 => Some(Self::Resp),
            3 => Some(Self::Ack),
            _ => None,
        }
    }
}

/// Read one FSEH frame's header and raw JSON payload bytes.
pub async fn read_handshake_frame<R>(
    reader: &mut R,
    max_len: u32,
) -> Result<(HandshakeFrameType, Vec<u8>), E2eeError>
where
    R: AsyncRead + Unpin,
{
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).await.map_err(flowersec_wire::FrameError::from)?;
    if &magic != HANDSHAKE_MAGIC {
        return Err(E2eeError::InvalidVersion {
            expected: PROTOCOL_VERSION,
            actual: 0,
        });
    }

    let mut rest = [0u8; 6];
    reader.read_exact(&mut rest).await.map_err(flowersec_wire::FrameError::from)?;
    let version = rest[0];
    if version != PROTOCOL_VERSION {
        return Err(E2eeError::InvalidVersion {
            expected: PROTOCOL_VERSION,
            actual: version,
        });
    }
    let frame_type = HandshakeFrameType::from_byte(rest[1]).ok_or(E2eeError::InvalidRole(rest[1]))?;
    let len = bigendian::get_u32(&rest[2..6]).expect("4-byte slice");

    if len > max_len {
        return Err(flowersec_wire::FrameError::TooLarge { len, max: max_len }.into());
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(flowersec_wire::FrameError::from)?;
    Ok((frame_type, payload))
}

/// Write one FSEH frame from raw JSON payload bytes.
pub async fn write_handshake_frame<W>(
    writer: &mut W,
    frame_type: HandshakeFrameType,
    payload: &[u8],
) -> Result<(), E2eeError>
where
    W: AsyncWrite + Unpin,
{
    let mut header = Vec::with_capacity(10);
    header.extend_from_slice(HANDSHAKE_MAGIC);
    header.push(PROTOCOL_VERSION);
    header.push(frame_type as u8);
    bigendian::put_u32(&mut header, payload.len() as u32);

    writer.write_all(&header).await.map_err(flowersec_wire::FrameError::from)?;
    writer.write_all(payload).await.map_err(flowersec_wire::FrameError::from)?;
    writer.flush().await.map_err(flowersec_wire::FrameError::from)?;
    Ok(())
}

pub async fn read_handshake_json<R, T>(reader: &mut R, frame_type: HandshakeFrameType, max_len: u32) -> Result<T, E2eeError>
where
    R: AsyncRead + Unpin,
    T: Facet<'static>,
{
    let (actual_type, payload) = read_handshake_frame(reader, max_len).await?;
    if actual_type != frame_type {
        return Err(E2eeError::InvalidRole(actual_type as u8));
    }
    let text = std::str::from_utf8(&payload).map_err(flowersec_wire::FrameError::InvalidUtf8)?;
    facet_json::from_str(text).map_err(|e| flowersec_wire::FrameError::InvalidJson(e.to_string()).into())
}

pub async fn write_handshake_json<W, T>(writer: &mut W, frame_type: HandshakeFrameType, value: &T) -> Result<(), E2eeError>
where
    W: AsyncWrite + Unpin,
    T: Facet<'static>,
{
    let text = facet_json::to_string(value).map_err(|e| flowersec_wire::FrameError::InvalidJson(e.to_string()))?;
    write_handshake_frame(writer, frame_type, text.as_bytes()).await
}

/// `{channel_id, role, version, suite, client_eph_pub_b64u, nonce_c_b64u, client_features}`
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct InitPayload {
    pub channel_id: String,
    pub role: u8,
    pub version: u8,
    pub suite: u16,
    pub client_eph_pub_b64u: String,
    pub nonce_c_b64u: String,
    pub client_features: u32,
}

/// `{handshake_id, server_eph_pub_b64u, nonce_s_b64u, server_features}`
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct RespPayload {
    pub handshake_id: String,
    pub server_eph_pub_b64u: String,
    pub nonce_s_b64u: String,
    pub server_features: u32,
}

/// `{handshake_id, timestamp_unix_s, auth_tag_b64u}`
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct AckPayload {
    pub handshake_id: String,
    pub timestamp_unix_s: u64,
    pub auth_tag_b64u: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFlag {
    App = 0,
    Ping = 1,
    Rekey = 2,
}

impl RecordFlag {
    pub fn from_byte(b: u8) -> Result<Self, E2eeError> {
        match b {
            0 => Ok(Self::App),
            1 => Ok(Self::Ping),
            2 => Ok(Self::Rekey),
            other => Err(E2eeError::RecordBadFlag(other)),
        }
    }
}

/// A decoded FSEC record header, also reused verbatim as AEAD AAD.
pub struct RecordHeader {
    pub flags: u8,
    pub seq: u64,
    pub cipherlen: u32,
    pub bytes: [u8; 18],
}

impl RecordHeader {
    pub fn build(flag: RecordFlag, seq: u64, cipherlen: u32) -> Self {
        let mut bytes = [0u8; 18];
        bytes[0..4].copy_from_slice(RECORD_MAGIC);
        bytes[4] = PROTOCOL_VERSION;
        bytes[5] = flag as u8;
        bytes[6..14].copy_from_slice(&seq.to_be_bytes());
        bytes[14..18].copy_from_slice(&cipherlen.to_be_bytes());
        Self {
            flags: flag as u8,
            seq,
            cipherlen,
            bytes,
        }
    }
}

/// Read one FSEC record: header plus ciphertext (AEAD tag included).
pub async fn read_record_frame<R>(reader: &mut R, max_record_bytes: u32) -> Result<(RecordHeader, Vec<u8>), E2eeError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; 18];
    reader.read_exact(&mut header_bytes).await.map_err(flowersec_wire::FrameError::from)?;

    if &header_bytes[0..4] != RECORD_MAGIC {
        return Err(E2eeError::InvalidVersion {
            expected: PROTOCOL_VERSION,
            actual: 0,
        });
    }
    let version = header_bytes[4];
    if version != PROTOCOL_VERSION {
        return Err(E2eeError::InvalidVersion {
            expected: PROTOCOL_VERSION,
            actual: version,
        });
    }
    let flags = header_bytes[5];
    let seq = bigendian::get_u64(&header_bytes[6..14]).expect("8-byte slice");
    let cipherlen = bigendian::get_u32(&header_bytes[14..18]).expect("4-byte slice");

    if cipherlen > max_record_bytes {
        return Err(E2eeError::RecordTooLarge {
            len: cipherlen,
            max: max_record_bytes,
        });
    }

    let mut ciphertext = vec![0u8; cipherlen as usize];
    reader.read_exact(&mut ciphertext).await.map_err(flowersec_wire::FrameError::from)?;

    Ok((
        RecordHeader {
            flags,
            seq,
            cipherlen,
            bytes: header_bytes,
        },
        ciphertext,
    ))
}

/// Write one FSEC record given a fully-sealed ciphertext.
pub async fn write_record_frame<W>(writer: &mut W, header: &RecordHeader, ciphertext: &[u8]) -> Result<(), E2eeError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&header.bytes).await.map_err(flowersec_wire::FrameError::from)?;
    writer.write_all(ciphertext).await.map_err(flowersec_wire::FrameError::from)?;
    writer.flush().await.map_err(flowersec_wire::FrameError::from)?;
    Ok(())
}
