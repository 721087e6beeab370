//! `Connect`: dial -> (tunnel) attach -> E2EE handshake -> mux -> open the
//! `"rpc"` stream, in one call. Mirrors the sequence in
//! `flowersec-tunnel`'s own attach/pairing code, but driven from the
//! client side of a plain WebSocket rather than an axum upgrade handler.

use std::sync::Arc;

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use flowersec_e2ee::{run_client_handshake, HandshakeOutcome, SecureChannel, SecureChannelDuplex};
use flowersec_grant::{validate_endpoint_instance_id, AttachMessage, GrantError};
use flowersec_mux::MuxSession;
use flowersec_rpc::{write_stream_hello, RpcClient, StreamHello};
use flowersec_wire::base64url;

use crate::config::{ConnectOptions, KeepaliveMode};
use crate::error::{ConnectCode, ConnectPath, ConnectStage, FlowersecError};
use crate::keepalive::KeepaliveHandle;
use crate::target::ConnectTarget;
use crate::ws_stream::WsByteStream;

fn fail(path: ConnectPath, stage: ConnectStage, code: ConnectCode, message: impl Into<String>) -> FlowersecError {
    FlowersecError::new(path, stage, code, message)
}

fn fail_with(
    path: ConnectPath,
    stage: ConnectStage,
    code: ConnectCode,
    message: impl Into<String>,
    source: impl std::error::Error + Send + Sync + 'static,
) -> FlowersecError {
    FlowersecError::new(path, stage, code, message).with_source(source)
}

/// Map a `GrantError` from `validate()` to its `ConnectCode`, per spec §7's
/// separate `invalid_psk`/`invalid_suite`/`invalid_input` vocabulary.
/// `missing_field_code` distinguishes the two callers: a `ChannelInitGrant`
/// missing a required field is `missing_grant`; a `DirectConnectInfo` isn't
/// a grant at all, so the same failure there is `invalid_input`.
fn validate_error_code(err: &GrantError, missing_field_code: ConnectCode) -> ConnectCode {
    match err {
        GrantError::InvalidPsk => ConnectCode::InvalidPsk,
        GrantError::UnsupportedSuite(_) => ConnectCode::InvalidSuite,
        GrantError::MissingField(_) => missing_field_code,
        GrantError::InvalidRole(_) => ConnectCode::InvalidInput,
        GrantError::InvalidEndpointInstanceId => ConnectCode::InvalidEndpointInstanceId,
    }
}

/// Everything a completed [`connect`] call hands back: the RPC client bound
/// to the `"rpc"` stream, plus handles needed to open further streams or
/// tear the connection down.
pub struct FlowersecConnection {
    secure_channel: SecureChannel,
    mux: Arc<MuxSession>,
    rpc: Arc<RpcClient>,
    keepalive: Option<KeepaliveHandle>,
    path: ConnectPath,
}

impl FlowersecConnection {
    /// The RPC client bound to the connection's `"rpc"` stream.
    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    /// Open a new yamux stream and write its `StreamHello{kind}` preface,
    /// handing back the raw byte stream for the caller to frame however
    /// that stream's protocol requires.
    pub async fn open_stream(&self, kind: &str) -> Result<flowersec_mux::Stream, FlowersecError> {
        let mut stream = self.mux.open_stream().await.map_err(|e| {
            fail_with(self.path, ConnectStage::Yamux, ConnectCode::OpenStreamFailed, "failed to open yamux stream", e)
        })?;
        write_stream_hello(&mut stream, &StreamHello::new(kind)).await.map_err(|e| {
            fail_with(self.path, ConnectStage::Rpc, ConnectCode::StreamHelloFailed, "failed to write stream hello", e)
        })?;
        Ok(stream)
    }

    /// Tear the connection down in reverse order of construction
    /// (keepalive, then RPC, then mux, then the secure channel), reporting
    /// the first error encountered.
    pub async fn close(&self) -> Result<(), FlowersecError> {
        if let Some(keepalive) = &self.keepalive {
            keepalive.stop();
        }
        self.rpc.close();
        self.mux.close().await;
        self.secure_channel.close().await;
        Ok(())
    }
}

/// Validate `target`, decoding the fields the rest of `connect` needs.
struct ResolvedTarget {
    ws_url: String,
    channel_id: String,
    psk: [u8; 32],
    suite_id: u16,
    idle_timeout_seconds: Option<i32>,
    attach: Option<AttachMessage>,
}

fn resolve_target(target: &ConnectTarget) -> Result<ResolvedTarget, FlowersecError> {
    let path = target.path();
    match target {
        ConnectTarget::Tunnel { grant, endpoint_instance_id } => {
            grant.validate().map_err(|e| {
                let code = validate_error_code(&e, ConnectCode::MissingGrant);
                fail_with(path, ConnectStage::Validate, code, "grant failed validation", e)
            })?;

            let psk = grant
                .psk()
                .map_err(|e| fail_with(path, ConnectStage::Validate, ConnectCode::InvalidPsk, "invalid psk", e))?;

            let decoded_instance_id = base64url::decode(endpoint_instance_id).map_err(|_| {
                fail(path, ConnectStage::Validate, ConnectCode::InvalidEndpointInstanceId, "endpoint_instance_id is not valid base64url")
            })?;
            validate_endpoint_instance_id(&decoded_instance_id).map_err(|e| {
                fail_with(path, ConnectStage::Validate, ConnectCode::InvalidEndpointInstanceId, "invalid endpoint_instance_id", e)
            })?;

            let role = grant
                .role()
                .map_err(|e| fail_with(path, ConnectStage::Validate, ConnectCode::InvalidInput, "invalid role", e))?;

            let attach = AttachMessage::new(
                grant.channel_id.clone(),
                role.to_wire(),
                grant.token.clone(),
                endpoint_instance_id.clone(),
            );

            Ok(ResolvedTarget {
                ws_url: grant.tunnel_url.clone(),
                channel_id: grant.channel_id.clone(),
                psk,
                suite_id: grant.default_suite,
                idle_timeout_seconds: Some(grant.idle_timeout_seconds),
                attach: Some(attach),
            })
        }
        ConnectTarget::Direct(info) => {
            info.validate().map_err(|e| {
                let code = validate_error_code(&e, ConnectCode::InvalidInput);
                fail_with(path, ConnectStage::Validate, code, "direct connect info failed validation", e)
            })?;
            let psk = info
                .psk()
                .map_err(|e| fail_with(path, ConnectStage::Validate, ConnectCode::InvalidPsk, "invalid psk", e))?;

            Ok(ResolvedTarget {
                ws_url: info.ws_url.clone(),
                channel_id: info.channel_id.clone(),
                psk,
                suite_id: info.default_suite,
                idle_timeout_seconds: None,
                attach: None,
            })
        }
    }
}

/// Run the full client connect sequence: validate, dial, (tunnel) attach,
/// E2EE handshake, yamux session, open the `"rpc"` stream, start keepalive.
pub async fn connect(target: ConnectTarget, options: &ConnectOptions) -> Result<FlowersecConnection, FlowersecError> {
    let path = target.path();
    let resolved = resolve_target(&target)?;

    let origin = options
        .origin
        .as_deref()
        .ok_or_else(|| fail(path, ConnectStage::Validate, ConnectCode::MissingOrigin, "ConnectOptions::origin is required"))?;

    let mut request = resolved
        .ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| fail_with(path, ConnectStage::Validate, ConnectCode::InvalidInput, "invalid websocket url", e))?;
    request.headers_mut().insert(
        tokio_tungstenite::tungstenite::http::header::ORIGIN,
        HeaderValue::from_str(origin)
            .map_err(|e| fail_with(path, ConnectStage::Validate, ConnectCode::InvalidInput, "invalid origin header value", e))?,
    );
    for (name, value) in &options.headers {
        let header_name = tokio_tungstenite::tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| fail_with(path, ConnectStage::Validate, ConnectCode::InvalidInput, "invalid header name", e))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| fail_with(path, ConnectStage::Validate, ConnectCode::InvalidInput, "invalid header value", e))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (mut ws, _response) = tokio::time::timeout(options.connect_timeout, tokio_tungstenite::connect_async(request))
        .await
        .map_err(|_| fail(path, ConnectStage::Connect, ConnectCode::Timeout, "websocket dial timed out"))?
        .map_err(|e| fail_with(path, ConnectStage::Connect, ConnectCode::NotConnected, "websocket dial failed", e))?;

    if let Some(attach) = &resolved.attach {
        let attach_json = facet_json::to_string(attach)
            .map_err(|e| fail(path, ConnectStage::Attach, ConnectCode::InvalidInput, format!("failed to encode attach message: {e}")))?;
        use futures_util::SinkExt;
        ws.send(Message::Text(attach_json.into()))
            .await
            .map_err(|e| fail_with(path, ConnectStage::Attach, ConnectCode::NotConnected, "failed to send attach frame", e))?;
    }

    let (mut transport, close_capture) = WsByteStream::new(ws);

    let classify_handshake_failure = |e: flowersec_e2ee::E2eeError| -> FlowersecError {
        if let Some((code, reason)) = close_capture.get() {
            if code == 1008 {
                if let Some(connect_code) = ConnectCode::from_close_reason_token(&reason) {
                    return fail(path, ConnectStage::Attach, connect_code, format!("tunnel rejected attach: {reason}"));
                }
            }
        }
        fail_with(path, ConnectStage::Handshake, ConnectCode::NotConnected, "e2ee handshake failed", e)
    };

    let handshake_result = tokio::time::timeout(
        options.handshake_timeout,
        run_client_handshake(
            &mut transport,
            &options.handshake,
            &resolved.channel_id,
            &resolved.psk,
            resolved.suite_id,
            0,
        ),
    )
    .await
    .map_err(|_| fail(path, ConnectStage::Handshake, ConnectCode::Timeout, "e2ee handshake timed out"))?;

    let outcome: HandshakeOutcome = handshake_result.map_err(classify_handshake_failure)?;

    let secure_channel = SecureChannel::new(transport, outcome, options.record.clone());
    let max_plaintext_len = options.record.max_plaintext_len();
    let duplex = SecureChannelDuplex::new(secure_channel.clone(), max_plaintext_len);

    let mux = Arc::new(MuxSession::new_client(duplex, options.mux.clone()));

    let mut rpc_stream = mux
        .open_stream()
        .await
        .map_err(|e| fail_with(path, ConnectStage::Yamux, ConnectCode::OpenStreamFailed, "failed to open rpc stream", e))?;
    write_stream_hello(&mut rpc_stream, &StreamHello::rpc())
        .await
        .map_err(|e| fail_with(path, ConnectStage::Rpc, ConnectCode::StreamHelloFailed, "failed to write rpc stream hello", e))?;
    let rpc = Arc::new(RpcClient::new(rpc_stream));

    let keepalive = match options.keepalive {
        KeepaliveMode::Disabled => None,
        KeepaliveMode::Interval(interval) => Some(KeepaliveHandle::spawn(secure_channel.clone(), interval)),
        KeepaliveMode::Default => resolved
            .idle_timeout_seconds
            .and_then(crate::config::default_keepalive_interval)
            .map(|interval| KeepaliveHandle::spawn(secure_channel.clone(), interval)),
    };

    Ok(FlowersecConnection { secure_channel, mux, rpc, keepalive, path })
}
