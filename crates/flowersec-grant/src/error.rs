use std::fmt;

/// Errors from validating a grant or connect-info value before dialing.
#[derive(Debug)]
pub enum GrantError {
    /// `e2ee_psk_b64u` did not decode to exactly 32 bytes.
    InvalidPsk,
    /// `default_suite` is not present in `allowed_suites` (grants only).
    UnsupportedSuite(u16),
    /// `role` was not `1` (client) or `2` (server).
    InvalidRole(u8),
    /// A required field was empty where the protocol requires a value.
    MissingField(&'static str),
    /// `endpoint_instance_id` did not decode to 16-32 bytes.
    InvalidEndpointInstanceId,
}

impl fmt::Display for GrantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantError::InvalidPsk => write!(f, "invalid_psk"),
            GrantError::UnsupportedSuite(id) => write!(f, "invalid_suite: {id}"),
            GrantError::InvalidRole(r) => write!(f, "invalid role value: {r}"),
            GrantError::MissingField(name) => write!(f, "missing required field: {name}"),
            GrantError::InvalidEndpointInstanceId => write!(f, "invalid_endpoint_instance_id"),
        }
    }
}

impl std::error::Error for GrantError {}
