use std::time::Duration;

use flowersec_e2ee::{HandshakeConfig, RecordConfig};
use flowersec_mux::MuxConfig;

/// How the keepalive task's ping interval is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveMode {
    /// `max(500ms, min(idle_timeout/2, idle_timeout - 1s))`, only when the
    /// target carries an `idle_timeout_seconds`. No task is started for a
    /// direct connect (it carries no idle timeout).
    Default,
    /// Always ping at this interval, regardless of `idle_timeout_seconds`.
    Interval(Duration),
    /// Never start a keepalive task.
    Disabled,
}

/// Tunable parameters for one [`crate::connect::connect`] call. Constructed
/// explicitly by the caller; no global singleton.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `Origin` header value sent with the WebSocket upgrade request.
    pub origin: Option<String>,
    /// Additional headers attached to the upgrade request (e.g. a
    /// controlplane-issued bearer token for direct connects).
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
    pub handshake: HandshakeConfig,
    pub record: RecordConfig,
    pub mux: MuxConfig,
    pub keepalive: KeepaliveMode,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            origin: None,
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            handshake: HandshakeConfig::default(),
            record: RecordConfig::default(),
            mux: MuxConfig::default(),
            keepalive: KeepaliveMode::Default,
        }
    }
}

/// Compute the default keepalive interval for an idle timeout of `t`
/// seconds: `max(500ms, min(t/2, t - 1s))`, strictly less than `t`.
pub fn default_keepalive_interval(idle_timeout_seconds: i32) -> Option<Duration> {
    if idle_timeout_seconds <= 1 {
        return None;
    }
    let t = Duration::from_secs(idle_timeout_seconds as u64);
    let half = t / 2;
    let minus_one = t - Duration::from_secs(1);
    let candidate = half.min(minus_one);
    let floor = Duration::from_millis(500);
    let interval = candidate.max(floor);
    if interval < t { Some(interval) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_idle_timeout_uses_half() {
        assert_eq!(default_keepalive_interval(2), Some(Duration::from_secs(1)));
    }

    #[test]
    fn long_idle_timeout_uses_half() {
        assert_eq!(default_keepalive_interval(60), Some(Duration::from_secs(30)));
    }

    #[test]
    fn odd_idle_timeout_rounds_down_via_half() {
        // t=3: t/2=1.5s, t-1=2s -> half is the smaller of the two.
        assert_eq!(default_keepalive_interval(3), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn interval_never_reaches_the_timeout_itself() {
        assert_eq!(default_keepalive_interval(1), None);
        assert_eq!(default_keepalive_interval(0), None);
    }
}
