//! Server-side RPC router: a `type_id -> handler` table plus the reader
//! and writer tasks that drain a stream's envelopes and dispatch them.
//!
//! `HandlerTable`'s registration API mirrors a control-method dispatcher:
//! register by type, reject duplicates, look up by ID, never invent a
//! handler for an ID nobody registered.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use flowersec_wire::{read_raw_frame, write_raw_frame};

use crate::envelope::{Envelope, RpcError};

const MAX_ENVELOPE_BYTES: u32 = 1024 * 1024;

/// Code returned in the envelope's `error` field for an unregistered
/// `type_id`.
pub const UNKNOWN_TYPE_CODE: i32 = 404;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One registered RPC method. `call` receives the request's raw JSON
/// `payload` and returns either a raw JSON response payload or a
/// structured error, never panicking the router on a bad request.
pub trait Handler: Send + Sync {
    fn type_id(&self) -> u32;
    fn call(&self, payload: Option<String>) -> BoxFuture<'_, Result<Option<String>, RpcError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    AlreadyRegistered(u32),
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterError::AlreadyRegistered(id) => write!(f, "type_id {id} is already registered"),
        }
    }
}

impl std::error::Error for RegisterError {}

#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<u32, Arc<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, handler: impl Handler + 'static) -> Result<(), RegisterError> {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn Handler>) -> Result<(), RegisterError> {
        let type_id = handler.type_id();
        if self.handlers.contains_key(&type_id) {
            return Err(RegisterError::AlreadyRegistered(type_id));
        }
        self.handlers.insert(type_id, handler);
        Ok(())
    }

    pub fn unregister(&mut self, type_id: u32) -> bool {
        self.handlers.remove(&type_id).is_some()
    }

    pub fn has_handler(&self, type_id: u32) -> bool {
        self.handlers.contains_key(&type_id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.handlers.keys().copied()
    }

    fn lookup(&self, type_id: u32) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&type_id).cloned()
    }
}

/// A server-side router bound to one rpc-kind stream.
pub struct RpcServer {
    reader_handle: SyncMutex<Option<JoinHandle<()>>>,
    writer_handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl RpcServer {
    pub fn new<T>(transport: T, handlers: HandlerTable) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let writer_handle = tokio::spawn(run_writer(write_half, write_rx));
        let reader_handle = tokio::spawn(run_reader(read_half, Arc::new(handlers), write_tx));

        Self {
            reader_handle: SyncMutex::new(Some(reader_handle)),
            writer_handle: SyncMutex::new(Some(writer_handle)),
        }
    }

    pub fn close(&self) {
        if let Some(handle) = self.reader_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.writer_handle.lock().take() {
            handle.abort();
        }
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

async fn run_reader<R>(mut read_half: R, handlers: Arc<HandlerTable>, write_tx: mpsc::UnboundedSender<Vec<u8>>)
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

        if envelope.is_notification() {
            if let Some(handler) = handlers.lookup(envelope.type_id) {
                tokio::spawn(async move {
                    let _ = handler.call(envelope.payload).await;
                });
            }
            continue;
        }

        let write_tx = write_tx.clone();
        let handlers = handlers.clone();
        // Requests are dispatched concurrently; only frame emission is
        // serialized, by the single writer task draining `write_tx`.
        tokio::spawn(async move {
            let response = dispatch_one(&handlers, envelope).await;
            let _ = write_tx.send(response.encode().into_bytes());
        });
    }
}

async fn dispatch_one(handlers: &HandlerTable, request: Envelope) -> Envelope {
    match handlers.lookup(request.type_id) {
        Some(handler) => match handler.call(request.payload).await {
            Ok(payload) => Envelope::response(request.type_id, request.request_id, payload),
            Err(error) => Envelope::error_response(request.type_id, request.request_id, error),
        },
        None => Envelope::error_response(
            request.type_id,
            request.request_id,
            RpcError::new(UNKNOWN_TYPE_CODE, "unknown type"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowersec_wire::{read_raw_frame, write_raw_frame};

    struct Echo;

    impl Handler for Echo {
        fn type_id(&self) -> u32 {
            1
        }

        fn call(&self, payload: Option<String>) -> BoxFuture<'_, Result<Option<String>, RpcError>> {
            Box::pin(async move { Ok(payload) })
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut table = HandlerTable::new();
        table.register(Echo).unwrap();
        assert_eq!(table.register(Echo), Err(RegisterError::AlreadyRegistered(1)));
    }

    #[test]
    fn unregister_removes_the_handler() {
        let mut table = HandlerTable::new();
        table.register(Echo).unwrap();
        assert!(table.unregister(1));
        assert!(!table.has_handler(1));
        assert!(!table.unregister(1));
    }

    #[tokio::test]
    async fn known_type_id_echoes_payload() {
        let mut table = HandlerTable::new();
        table.register(Echo).unwrap();

        let (server_side, client_side) = tokio::io::duplex(4096);
        let _server = RpcServer::new(server_side, table);
        let (mut client_read, mut client_write) = tokio::io::split(client_side);

        let request = Envelope::request(1, 10, Some(r#"{"x":1}"#.to_string()));
        write_raw_frame(&mut client_write, request.encode().as_bytes()).await.unwrap();

        let body = read_raw_frame(&mut client_read, MAX_ENVELOPE_BYTES).await.unwrap();
        let response = Envelope::decode(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(response.response_to, 10);
        assert_eq!(response.payload.as_deref(), Some(r#"{"x":1}"#));
    }

    #[tokio::test]
    async fn unknown_type_id_returns_structured_error() {
        let table = HandlerTable::new();
        let (server_side, client_side) = tokio::io::duplex(4096);
        let _server = RpcServer::new(server_side, table);
        let (mut client_read, mut client_write) = tokio::io::split(client_side);

        let request = Envelope::request(999, 11, None);
        write_raw_frame(&mut client_write, request.encode().as_bytes()).await.unwrap();

        let body = read_raw_frame(&mut client_read, MAX_ENVELOPE_BYTES).await.unwrap();
        let response = Envelope::decode(std::str::from_utf8(&body).unwrap()).unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, UNKNOWN_TYPE_CODE);
        assert_eq!(error.message, "unknown type");
    }

    #[tokio::test]
    async fn notification_gets_no_response() {
        let mut table = HandlerTable::new();
        table.register(Echo).unwrap();
        let (server_side, client_side) = tokio::io::duplex(4096);
        let _server = RpcServer::new(server_side, table);
        let (mut client_read, mut client_write) = tokio::io::split(client_side);

        let notification = Envelope::notification(1, Some("{}".to_string()));
        write_raw_frame(&mut client_write, notification.encode().as_bytes()).await.unwrap();

        // Follow up with a real request; if a response to the notification
        // had been sent it would arrive first and this assertion would see
        // the wrong request_id.
        let request = Envelope::request(1, 20, Some("{}".to_string()));
        write_raw_frame(&mut client_write, request.encode().as_bytes()).await.unwrap();

        let body = read_raw_frame(&mut client_read, MAX_ENVELOPE_BYTES).await.unwrap();
        let response = Envelope::decode(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(response.response_to, 20);
    }
}
