//! Canonical big-endian integer I/O.
//!
//! Every header in the flowersec stack (handshake frame, record frame,
//! mux frame, RPC length prefix) uses big-endian integers. Centralizing
//! the read/write helpers here keeps that choice consistent and gives
//! every layer the same overflow/truncation behavior.

pub fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn get_u16(buf: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(buf.get(0..2)?.try_into().ok()?))
}

pub fn get_u32(buf: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(buf.get(0..4)?.try_into().ok()?))
}

pub fn get_u64(buf: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(buf.get(0..8)?.try_into().ok()?))
}
