use flowersec_grant::{ChannelInitGrant, DirectConnectInfo};

/// What to connect to: a tunnel-mediated attach (needs a grant and an
/// `endpoint_instance_id` the caller picks, e.g. a per-process random
/// identifier) or a direct WebSocket to the peer endpoint.
#[derive(Debug, Clone)]
pub enum ConnectTarget {
    Tunnel {
        grant: ChannelInitGrant,
        /// Base64url-encoded, 16-32 decoded bytes. Identifies this
        /// physical endpoint instance to the tunnel; opaque otherwise.
        endpoint_instance_id: String,
    },
    Direct(DirectConnectInfo),
}

impl ConnectTarget {
    pub fn path(&self) -> crate::error::ConnectPath {
        match self {
            ConnectTarget::Tunnel { .. } => crate::error::ConnectPath::Tunnel,
            ConnectTarget::Direct(_) => crate::error::ConnectPath::Direct,
        }
    }
}
