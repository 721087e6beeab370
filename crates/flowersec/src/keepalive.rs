//! The background task that sends a ping on a fixed interval so an idle
//! connection survives policy timeouts upstream of the tunnel. Purely a
//! convenience over `SecureChannel::send_ping`; the E2EE and mux layers
//! have no opinion about liveness.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use flowersec_e2ee::SecureChannel;

/// Handle to a running keepalive task. Dropping it does not stop the task
/// (the connection should keep pinging until explicitly closed); call
/// [`KeepaliveHandle::stop`] to cancel it.
pub struct KeepaliveHandle {
    handle: JoinHandle<()>,
}

impl KeepaliveHandle {
    pub fn spawn(channel: SecureChannel, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if channel.send_ping().await.is_err() {
                    debug!("keepalive ping failed, secure channel is closed");
                    return;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}
