//! axum wiring: the `/attach` WebSocket upgrade route, Origin/connection-cap
//! gating before upgrade, and the post-upgrade attach/pairing sequence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use flowersec_grant::{validate_endpoint_instance_id, AttachMessage, GrantRole};
use flowersec_wire::base64url;

use crate::channel::{AttachOutcome, AttachRejection, ChannelMap};
use crate::config::TunnelConfig;
use crate::endpoint::Endpoint;
use crate::error::CloseReason;
use crate::message::{AxumWsTransport, TunnelMessage, WsTransport};
use crate::origin::OriginAllowList;
use crate::token::{Keyset, ReplayGuard};

/// Shared state for one tunnel server instance.
pub struct TunnelState {
    config: TunnelConfig,
    origins: OriginAllowList,
    keyset: Keyset,
    replay: ReplayGuard,
    channels: ChannelMap,
    connections: AtomicUsize,
    global_write_budget: Arc<Semaphore>,
}

impl TunnelState {
    pub fn new(config: TunnelConfig, origins: OriginAllowList, keyset: Keyset) -> Arc<Self> {
        let global_write_budget = Arc::new(Semaphore::new(config.max_total_pending_bytes));
        Arc::new(Self {
            config,
            origins,
            keyset,
            replay: ReplayGuard::new(),
            channels: ChannelMap::new(),
            connections: AtomicUsize::new(0),
            global_write_budget,
        })
    }
}

/// Build the axum router exposing the `/attach` upgrade endpoint.
pub fn router(state: Arc<TunnelState>) -> Router {
    Router::new().route("/attach", get(ws_handler)).with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<TunnelState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin) {
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    if state.connections.fetch_add(1, Ordering::AcqRel) >= state.config.max_connections {
        state.connections.fetch_sub(1, Ordering::AcqRel);
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    ws.on_upgrade(move |socket| async move {
        handle_socket(Box::new(AxumWsTransport::new(socket)), state.clone()).await;
        state.connections.fetch_sub(1, Ordering::AcqRel);
    })
    .into_response()
}

async fn handle_socket(mut transport: Box<dyn WsTransport>, state: Arc<TunnelState>) {
    let attach_text = match tokio::time::timeout(state.config.attach_timeout, transport.recv()).await {
        Ok(Some(TunnelMessage::Text(text))) => text,
        _ => {
            transport.close(CloseReason::POLICY_VIOLATION, CloseReason::InvalidToken.to_string()).await;
            return;
        }
    };

    let attach: AttachMessage = match facet_json::from_str(&attach_text) {
        Ok(msg) => msg,
        Err(_) => {
            transport.close(CloseReason::POLICY_VIOLATION, CloseReason::InvalidToken.to_string()).await;
            return;
        }
    };

    if attach.v != AttachMessage::PROTOCOL_VERSION {
        transport.close(CloseReason::POLICY_VIOLATION, CloseReason::InvalidToken.to_string()).await;
        return;
    }

    let role = match GrantRole::from_wire(attach.role) {
        Ok(role) => role,
        Err(_) => {
            transport.close(CloseReason::POLICY_VIOLATION, CloseReason::InvalidToken.to_string()).await;
            return;
        }
    };

    let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let claims = match crate::token::verify_token(
        &attach.token,
        &state.keyset,
        now_unix,
        state.config.expected_aud.as_deref(),
        state.config.expected_iss.as_deref(),
    ) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "attach token failed verification");
            transport.close(CloseReason::POLICY_VIOLATION, CloseReason::InvalidToken.to_string()).await;
            return;
        }
    };

    if claims.channel_id != attach.channel_id || claims.role != attach.role {
        transport.close(CloseReason::POLICY_VIOLATION, CloseReason::ChannelMismatch.to_string()).await;
        return;
    }

    let instance_id_ok = base64url::decode(&attach.endpoint_instance_id)
        .ok()
        .is_some_and(|bytes| validate_endpoint_instance_id(&bytes).is_ok());
    if !instance_id_ok {
        transport.close(CloseReason::POLICY_VIOLATION, CloseReason::InvalidToken.to_string()).await;
        return;
    }

    if !state.replay.spend(&attach.token) {
        transport.close(CloseReason::POLICY_VIOLATION, CloseReason::TokenReplay.to_string()).await;
        return;
    }

    let endpoint = Endpoint::spawn(
        transport,
        state.config.per_connection_write_queue_bytes,
        state.global_write_budget.clone(),
        state.config.write_timeout,
    );

    match state.channels.attach(&attach.channel_id, role, &claims, endpoint.clone(), state.config.replace_grace) {
        Ok(AttachOutcome::Paired { peer }) => {
            endpoint.set_peer(Arc::downgrade(&peer));
            peer.set_peer(Arc::downgrade(&endpoint));
            info!(channel_id = %attach.channel_id, "tunnel channel paired");
        }
        Ok(AttachOutcome::Waiting) => {
            info!(channel_id = %attach.channel_id, role = attach.role, "tunnel endpoint attached, waiting for peer");
        }
        Err(rejection) => {
            let reason = match rejection {
                AttachRejection::ReplaceRateLimited => CloseReason::ReplaceRateLimited,
                AttachRejection::InitExpMismatch => CloseReason::InitExpMismatch,
                AttachRejection::IdleTimeoutMismatch => CloseReason::IdleTimeoutMismatch,
            };
            endpoint.request_close(CloseReason::POLICY_VIOLATION, reason.to_string());
        }
    }

    endpoint.closed().await;
    state.channels.remove_if_both_closed(&attach.channel_id);
}
