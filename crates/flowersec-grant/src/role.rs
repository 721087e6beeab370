use crate::error::GrantError;

/// Which side of a channel a grant authorizes its holder to attach as.
///
/// Carried on the wire as a plain `u8` (`1` or `2`), not a tagged enum, so
/// `ChannelInitGrant`/`AttachMessage` hold the raw value and convert to
/// this type at the point of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantRole {
    Client = 1,
    Server = 2,
}

impl GrantRole {
    pub fn from_wire(value: u8) -> Result<Self, GrantError> {
        match value {
            1 => Ok(GrantRole::Client),
            2 => Ok(GrantRole::Server),
            other => Err(GrantError::InvalidRole(other)),
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_values() {
        assert_eq!(GrantRole::from_wire(1).unwrap(), GrantRole::Client);
        assert_eq!(GrantRole::from_wire(2).unwrap(), GrantRole::Server);
        assert_eq!(GrantRole::Client.to_wire(), 1);
        assert_eq!(GrantRole::Server.to_wire(), 2);
    }

    #[test]
    fn rejects_unknown_value() {
        assert!(matches!(GrantRole::from_wire(0), Err(GrantError::InvalidRole(0))));
        assert!(matches!(GrantRole::from_wire(3), Err(GrantError::InvalidRole(3))));
    }
}
