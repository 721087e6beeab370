//! End-to-end pairing and forwarding over mock transports: no axum server
//! involved, exercising `ChannelMap` and `Endpoint` together the way
//! `server::handle_socket` wires them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use flowersec_grant::GrantRole;
use flowersec_tunnel::channel::{AttachOutcome, ChannelMap};
use flowersec_tunnel::endpoint::Endpoint;
use flowersec_tunnel::message::mock;
use flowersec_tunnel::message::TunnelMessage;
use flowersec_tunnel::token::TokenClaims;

fn claims(channel_id: &str, role: u8) -> TokenClaims {
    TokenClaims {
        aud: "flowersec-tunnel".to_string(),
        iss: "controlplane".to_string(),
        exp: 2_000_000_000,
        channel_id: channel_id.to_string(),
        role,
        kid: "k1".to_string(),
        channel_init_expire_at_unix_s: 5_000,
        idle_timeout_seconds: 30,
    }
}

#[tokio::test]
async fn both_endpoints_attach_and_forward_binary_frames() {
    let channels = ChannelMap::new();
    let budget = Arc::new(Semaphore::new(1024 * 1024));

    let (mut client_near, client_far) = mock::pair();
    let client_endpoint = Endpoint::spawn(Box::new(client_far), 64 * 1024, budget.clone(), Duration::from_secs(1));

    let outcome = channels
        .attach("chan-1", GrantRole::Client, &claims("chan-1", 1), client_endpoint.clone(), Duration::from_secs(2))
        .unwrap();
    assert!(matches!(outcome, AttachOutcome::Waiting));

    let (mut server_near, server_far) = mock::pair();
    let server_endpoint = Endpoint::spawn(Box::new(server_far), 64 * 1024, budget, Duration::from_secs(1));

    let outcome = channels
        .attach("chan-1", GrantRole::Server, &claims("chan-1", 2), server_endpoint.clone(), Duration::from_secs(2))
        .unwrap();
    match outcome {
        AttachOutcome::Paired { peer } => {
            server_endpoint.set_peer(Arc::downgrade(&peer));
            peer.set_peer(Arc::downgrade(&server_endpoint));
        }
        AttachOutcome::Waiting => panic!("expected the client endpoint to already be waiting"),
    }

    client_near.send(TunnelMessage::Binary(b"hello from client".to_vec())).await.unwrap();
    let forwarded = server_near.recv().await.unwrap();
    assert_eq!(forwarded, TunnelMessage::Binary(b"hello from client".to_vec()));

    server_near.send(TunnelMessage::Binary(b"hello from server".to_vec())).await.unwrap();
    let forwarded_back = client_near.recv().await.unwrap();
    assert_eq!(forwarded_back, TunnelMessage::Binary(b"hello from server".to_vec()));
}

#[tokio::test]
async fn a_protocol_violating_text_frame_tears_down_both_sides() {
    let channels = ChannelMap::new();
    let budget = Arc::new(Semaphore::new(1024 * 1024));

    let (mut client_near, client_far) = mock::pair();
    let client_endpoint = Endpoint::spawn(Box::new(client_far), 64 * 1024, budget.clone(), Duration::from_secs(1));
    channels.attach("chan-2", GrantRole::Client, &claims("chan-2", 1), client_endpoint.clone(), Duration::from_secs(2)).unwrap();

    let (_server_near, server_far) = mock::pair();
    let server_endpoint = Endpoint::spawn(Box::new(server_far), 64 * 1024, budget, Duration::from_secs(1));
    let outcome = channels
        .attach("chan-2", GrantRole::Server, &claims("chan-2", 2), server_endpoint.clone(), Duration::from_secs(2))
        .unwrap();
    let AttachOutcome::Paired { peer } = outcome else { panic!("expected pairing") };
    server_endpoint.set_peer(Arc::downgrade(&peer));
    peer.set_peer(Arc::downgrade(&server_endpoint));

    client_near.send(TunnelMessage::Text("not allowed".to_string())).await.unwrap();
    client_endpoint.closed().await;
    server_endpoint.closed().await;

    assert!(client_endpoint.is_closed());
    assert!(server_endpoint.is_closed());
}
