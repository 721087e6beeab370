//! Client-side handshake state machine.

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};

use flowersec_crypto::{
    compute_auth_tag, derive_session_keys, suite_for_id, transcript_hash, Role, TranscriptInput,
};
use flowersec_wire::base64url;

use crate::config::HandshakeConfig;
use crate::frame::{
    read_handshake_json, read_record_frame, write_handshake_json, AckPayload, HandshakeFrameType,
    InitPayload, RecordFlag, RespPayload,
};
use crate::outcome::HandshakeOutcome;
use crate::record_cipher::open_record;
use crate::error::E2eeError;

const CLIENT_ROLE: u8 = 1;

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_secs()
}

/// Run the client side of the handshake to completion over `transport`,
/// returning the derived session state.
pub async fn run_client_handshake<T>(
    transport: &mut T,
    config: &HandshakeConfig,
    channel_id: &str,
    psk: &[u8; 32],
    suite_id: u16,
    client_features: u32,
) -> Result<HandshakeOutcome, E2eeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let suite = suite_for_id(suite_id)?;
    let (client_priv, client_eph_pub) = suite.generate_ephemeral();

    let mut nonce_c = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut nonce_c);

    let init = InitPayload {
        channel_id: channel_id.to_string(),
        role: CLIENT_ROLE,
        version: crate::frame::PROTOCOL_VERSION,
        suite: suite_id,
        client_eph_pub_b64u: base64url::encode(&client_eph_pub),
        nonce_c_b64u: base64url::encode(&nonce_c),
        client_features,
    };
    write_handshake_json(transport, HandshakeFrameType::Init, &init).await?;

    let resp: RespPayload =
        read_handshake_json(transport, HandshakeFrameType::Resp, config.max_handshake_payload).await?;

    let server_eph_pub = base64url::decode(&resp.server_eph_pub_b64u).map_err(|_| E2eeError::InvalidPublicKeyLength {
        expected: suite.public_key_len(),
        actual: 0,
    })?;
    if server_eph_pub.len() != suite.public_key_len() {
        return Err(E2eeError::InvalidPublicKeyLength {
            expected: suite.public_key_len(),
            actual: server_eph_pub.len(),
        });
    }
    let nonce_s_vec = base64url::decode(&resp.nonce_s_b64u).map_err(|_| E2eeError::InvalidPublicKeyLength {
        expected: 32,
        actual: 0,
    })?;
    let nonce_s: [u8; 32] = nonce_s_vec
        .try_into()
        .map_err(|v: Vec<u8>| E2eeError::InvalidPublicKeyLength { expected: 32, actual: v.len() })?;

    let th = transcript_hash(&TranscriptInput {
        version: crate::frame::PROTOCOL_VERSION,
        suite: suite_id,
        role: Role::Client,
        client_features,
        server_features: resp.server_features,
        channel_id: channel_id.as_bytes(),
        nonce_c: &nonce_c,
        nonce_s: &nonce_s,
        client_eph: &client_eph_pub,
        server_eph: &server_eph_pub,
    });

    let shared_secret = client_priv.diffie_hellman(&server_eph_pub)?;
    let session_keys = derive_session_keys(psk, &shared_secret, &th)?;

    let ts = unix_now();
    let auth_tag = compute_auth_tag(psk, &th, ts);

    let ack = AckPayload {
        handshake_id: resp.handshake_id.clone(),
        timestamp_unix_s: ts,
        auth_tag_b64u: base64url::encode(&auth_tag),
    };
    write_handshake_json(transport, HandshakeFrameType::Ack, &ack).await?;

    // "server-finished": exactly one s2c record at seq=1, flag=Ping, empty payload.
    let (header, ciphertext) = read_record_frame(transport, config.max_handshake_payload).await?;
    if header.seq != 1 {
        return Err(E2eeError::HandshakeNotFinished);
    }
    let plaintext = open_record(&session_keys.s2c_key, &session_keys.s2c_nonce_prefix, &header, &ciphertext)
        .map_err(|_| E2eeError::HandshakeNotFinished)?;
    let flag = RecordFlag::from_byte(header.flags).map_err(|_| E2eeError::HandshakeNotFinished)?;
    if flag != RecordFlag::Ping || !plaintext.is_empty() {
        return Err(E2eeError::HandshakeNotFinished);
    }

    Ok(HandshakeOutcome {
        session_keys,
        transcript_hash: th,
        psk: *psk,
        next_send_seq: 1,
        next_recv_seq: 2,
        is_client: true,
    })
}
