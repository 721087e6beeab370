//! Framing primitives shared by the flowersec protocol stack.
//!
//! This crate knows nothing about handshakes, records, mux frames, or RPC
//! envelopes. It only knows how bytes are laid out on the wire: big-endian
//! integers, length-prefixed JSON frames, base64url text encoding, and the
//! canonical JSON form used to fingerprint handshake retries.

pub mod base64url;
pub mod bigendian;
pub mod canonical;
pub mod error;
pub mod json_frame;
pub mod raw_object;

pub use canonical::{canonicalize, CanonicalizeError};
pub use error::FrameError;
pub use json_frame::{read_json_frame, read_raw_frame, write_json_frame, write_raw_frame};
pub use raw_object::{escape_json_string, object_fields, unescape_json_string, RawJsonError};
