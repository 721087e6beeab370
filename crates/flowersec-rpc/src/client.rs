//! Client-side RPC router: assigns monotonically increasing request IDs,
//! keeps a pending-call map, and fans notifications out to subscribers by
//! `type_id`. A reader task drains envelopes off the transport; a writer
//! task serializes frame emission, the same single-writer discipline
//! `SecureChannel` uses for its record queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use facet::Facet;
use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use flowersec_wire::{read_raw_frame, write_raw_frame};

use crate::envelope::{Envelope, EnvelopeError};
use crate::error::RouterError;

/// Cap on a single envelope frame. Requests/responses are expected to be
/// small control messages, not bulk data transfer (that belongs on its own
/// yamux stream).
const MAX_ENVELOPE_BYTES: u32 = 1024 * 1024;

type Waiter = oneshot::Sender<Result<Envelope, RouterError>>;

struct Inner {
    next_request_id: AtomicU64,
    pending: SyncMutex<HashMap<u64, Waiter>>,
    subscribers: SyncMutex<HashMap<u32, Vec<mpsc::UnboundedSender<Envelope>>>>,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
}

/// A client-side router bound to one rpc-kind stream.
pub struct RpcClient {
    inner: Arc<Inner>,
    reader_handle: SyncMutex<Option<JoinHandle<()>>>,
    writer_handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    pub fn new<T>(transport: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            next_request_id: AtomicU64::new(1),
            pending: SyncMutex::new(HashMap::new()),
            subscribers: SyncMutex::new(HashMap::new()),
            write_tx,
            closed: AtomicBool::new(false),
        });

        let writer_handle = tokio::spawn(run_writer(write_half, write_rx));
        let reader_handle = tokio::spawn(run_reader(read_half, inner.clone()));

        Self {
            inner,
            reader_handle: SyncMutex::new(Some(reader_handle)),
            writer_handle: SyncMutex::new(Some(writer_handle)),
        }
    }

    /// Issue a request carrying raw JSON `payload` and await the matching
    /// response, with no deadline.
    pub async fn call(&self, type_id: u32, payload: Option<String>) -> Result<Envelope, RouterError> {
        self.call_with_deadline(type_id, payload, None).await
    }

    /// Issue a request and await the matching response, failing with
    /// `RouterError::Canceled` if `deadline` elapses first. A cancellation
    /// removes the pending-call waiter and sends no extra frame; a late
    /// response that arrives afterward is dropped as an unknown
    /// `response_to`.
    pub async fn call_with_deadline(
        &self,
        type_id: u32,
        payload: Option<String>,
        deadline: Option<Duration>,
    ) -> Result<Envelope, RouterError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RouterError::TransportClosed);
        }

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(request_id, tx);

        let envelope = Envelope::request(type_id, request_id, payload);
        if self.inner.write_tx.send(envelope.encode().into_bytes()).is_err() {
            self.inner.pending.lock().remove(&request_id);
            return Err(RouterError::TransportClosed);
        }

        match deadline {
            Some(d) => match tokio::time::timeout(d, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(RouterError::TransportClosed),
                Err(_) => {
                    self.inner.pending.lock().remove(&request_id);
                    Err(RouterError::Canceled)
                }
            },
            None => rx.await.unwrap_or(Err(RouterError::TransportClosed)),
        }
    }

    /// Convenience wrapper around `call` for typed request/response bodies,
    /// serialized through `facet_json`. A structured `error` in the
    /// response surfaces as `RouterError::Remote`.
    pub async fn call_typed<Req, Resp>(&self, type_id: u32, request: &Req) -> Result<Resp, RouterError>
    where
        Req: Facet<'static>,
        Resp: Facet<'static>,
    {
        let payload =
            facet_json::to_string(request).map_err(|e| RouterError::Envelope(EnvelopeError::Encode(e.to_string())))?;
        let envelope = self.call(type_id, Some(payload)).await?;
        if let Some(error) = envelope.error {
            return Err(RouterError::Remote(error));
        }
        let payload = envelope.payload.unwrap_or_else(|| "null".to_string());
        facet_json::from_str(&payload).map_err(|e| RouterError::Envelope(EnvelopeError::Decode(e.to_string())))
    }

    /// Send a fire-and-forget notification; no response is expected.
    pub fn notify(&self, type_id: u32, payload: Option<String>) -> Result<(), RouterError> {
        let envelope = Envelope::notification(type_id, payload);
        self.inner
            .write_tx
            .send(envelope.encode().into_bytes())
            .map_err(|_| RouterError::TransportClosed)
    }

    /// Subscribe to notifications carrying this `type_id`. Multiple
    /// subscribers for the same `type_id` all receive every matching
    /// notification.
    pub fn subscribe(&self, type_id: u32) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().entry(type_id).or_default().push(tx);
        rx
    }

    /// Tear down the reader/writer tasks and fail every pending call with
    /// `transport_closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        fail_all_pending(&self.inner);
        if let Some(handle) = self.writer_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.reader_handle.lock().take() {
            handle.abort();
        }
    }
}

fn fail_all_pending(inner: &Inner) {
    let mut pending = inner.pending.lock();
    for (_, waiter) in pending.drain() {
        let _ = waiter.send(Err(RouterError::TransportClosed));
    }
}

async fn run_writer<W>(mut write_half: W, mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(body) = write_rx.recv().await {
        if write_raw_frame(&mut write_half, &body).await.is_err() {
            break;
        }
    }
}

async fn run_reader<R>(mut read_half: R, inner: Arc<Inner>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let body = match read_raw_frame(&mut read_half, MAX_ENVELOPE_BYTES).await {
            Ok(body) => body,
            Err(_) => break,
        };
        let text = match std::str::from_utf8(&body) {
            Ok(text) => text,
            Err(_) => continue,
        };
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(_) => continue,
        };

        if envelope.response_to != 0 {
            if let Some(waiter) = inner.pending.lock().remove(&envelope.response_to) {
                let _ = waiter.send(Ok(envelope));
            }
            // Unknown response_to: dropped, per the cancellation contract.
            continue;
        }

        if envelope.request_id == 0 {
            let subscribers = inner.subscribers.lock().get(&envelope.type_id).cloned().unwrap_or_default();
            for tx in subscribers {
                let _ = tx.send(envelope.clone());
            }
        }
    }

    inner.closed.store(true, Ordering::Release);
    fail_all_pending(&inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::RpcError;

    #[tokio::test]
    async fn call_receives_matching_response() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let client = RpcClient::new(client_side);
        let (mut server_read, mut server_write) = tokio::io::split(server_side);

        tokio::spawn(async move {
            let body = read_raw_frame(&mut server_read, MAX_ENVELOPE_BYTES).await.unwrap();
            let request = Envelope::decode(std::str::from_utf8(&body).unwrap()).unwrap();
            let response = Envelope::response(request.type_id, request.request_id, Some(r#"{"ok":true}"#.to_string()));
            write_raw_frame(&mut server_write, response.encode().as_bytes()).await.unwrap();
        });

        let response = client.call(1, Some("{}".to_string())).await.unwrap();
        assert_eq!(response.payload.as_deref(), Some(r#"{"ok":true}"#));
        client.close();
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let client = RpcClient::new(client_side);
        let (mut server_read, mut server_write) = tokio::io::split(server_side);

        tokio::spawn(async move {
            let body = read_raw_frame(&mut server_read, MAX_ENVELOPE_BYTES).await.unwrap();
            let request = Envelope::decode(std::str::from_utf8(&body).unwrap()).unwrap();
            let response =
                Envelope::error_response(request.type_id, request.request_id, RpcError::new(404, "unknown type"));
            write_raw_frame(&mut server_write, response.encode().as_bytes()).await.unwrap();
        });

        let response = client.call(999, None).await.unwrap();
        assert_eq!(response.error.unwrap().code, 404);
        client.close();
    }

    #[tokio::test]
    async fn cancellation_drops_a_late_response() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let client = RpcClient::new(client_side);
        let (mut server_read, _server_write) = tokio::io::split(server_side);

        tokio::spawn(async move {
            let _ = read_raw_frame(&mut server_read, MAX_ENVELOPE_BYTES).await;
            // Never responds; the call should time out.
        });

        let result = client.call_with_deadline(1, None, Some(Duration::from_millis(20))).await;
        assert!(matches!(result, Err(RouterError::Canceled)));
        client.close();
    }

    #[tokio::test]
    async fn transport_close_fails_pending_calls() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let client = RpcClient::new(client_side);
        drop(server_side);

        let result = client.call(1, None).await;
        assert!(matches!(result, Err(RouterError::TransportClosed)));
    }

    #[tokio::test]
    async fn notifications_reach_subscribers() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let client = RpcClient::new(client_side);
        let mut notifications = client.subscribe(5);

        let (_server_read, mut server_write) = tokio::io::split(server_side);
        let envelope = Envelope::notification(5, Some(r#"{"n":1}"#.to_string()));
        write_raw_frame(&mut server_write, envelope.encode().as_bytes()).await.unwrap();

        let received = notifications.recv().await.unwrap();
        assert_eq!(received.payload.as_deref(), Some(r#"{"n":1}"#));
        client.close();
    }
}
