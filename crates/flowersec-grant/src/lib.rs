//! Controlplane input contract types: `ChannelInitGrant`, `DirectConnectInfo`,
//! and the tunnel `AttachMessage`. Data definitions only — no controlplane
//! issuance logic, no HTTP client.

pub mod attach;
pub mod error;
pub mod grant;
pub mod role;

pub use attach::AttachMessage;
pub use error::GrantError;
pub use grant::{validate_endpoint_instance_id, ChannelInitGrant, DirectConnectInfo};
pub use role::GrantRole;
