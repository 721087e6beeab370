//! Server-side handshake state machine.

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};

use flowersec_crypto::{
    derive_session_keys, suite_for_id, transcript_hash, verify_auth_tag, Role, TranscriptInput,
};
use flowersec_wire::base64url;

use crate::config::HandshakeConfig;
use crate::error::E2eeError;
use crate::frame::{
    read_handshake_frame, read_handshake_json, write_handshake_json, write_record_frame,
    AckPayload, HandshakeFrameType, InitPayload, RecordFlag, RespPayload,
};
use crate::handshake_cache::HandshakeCache;
use crate::outcome::HandshakeOutcome;
use crate::record_cipher::seal_record_framed;

const CLIENT_ROLE: u8 = 1;

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_secs()
}

fn fingerprint_init(init: &InitPayload) -> Result<String, E2eeError> {
    let json = facet_json::to_string(init)
        .map_err(|e| flowersec_wire::FrameError::InvalidJson(e.to_string()))?;
    flowersec_wire::canonicalize(&json).map_err(|_| flowersec_wire::FrameError::InvalidJson("non-canonicalizable init".to_string()).into())
}

fn validate_init(init: &InitPayload, config: &HandshakeConfig, expected_channel_id: Option<&str>) -> Result<(), E2eeError> {
    if init.version != crate::frame::PROTOCOL_VERSION {
        return Err(E2eeError::InvalidVersion {
            expected: crate::frame::PROTOCOL_VERSION,
            actual: init.version,
        });
    }
    if init.role != CLIENT_ROLE {
        return Err(E2eeError::InvalidRole(init.role));
    }
    if let Some(expected) = expected_channel_id {
        if expected != init.channel_id {
            return Err(E2eeError::ChannelIdMismatch);
        }
    }
    if !config.allowed_suites.contains(&init.suite) {
        return Err(E2eeError::UnsupportedSuite(init.suite));
    }
    Ok(())
}

/// Run the server side of the handshake to completion over `transport`.
///
/// `expected_channel_id`, when set, rejects an Init for any other channel.
/// `init_exp_unix_s`, when set (from the grant that authorized this
/// attach), rejects an Ack timestamped after `init_exp + ceil(clock_skew)`.
pub async fn run_server_handshake<T>(
    transport: &mut T,
    config: &HandshakeConfig,
    cache: &HandshakeCache,
    expected_channel_id: Option<&str>,
    init_exp_unix_s: Option<i64>,
    psk: &[u8; 32],
) -> Result<HandshakeOutcome, E2eeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let init: InitPayload =
        read_handshake_json(transport, HandshakeFrameType::Init, config.max_handshake_payload).await?;
    validate_init(&init, config, expected_channel_id)?;

    let suite = suite_for_id(init.suite)?;
    let client_eph = base64url::decode(&init.client_eph_pub_b64u)
        .map_err(|_| E2eeError::InvalidPublicKeyLength { expected: suite.public_key_len(), actual: 0 })?;
    if client_eph.len() != suite.public_key_len() {
        return Err(E2eeError::InvalidPublicKeyLength {
            expected: suite.public_key_len(),
            actual: client_eph.len(),
        });
    }
    let nonce_c_vec = base64url::decode(&init.nonce_c_b64u)
        .map_err(|_| E2eeError::InvalidPublicKeyLength { expected: 32, actual: 0 })?;
    let nonce_c: [u8; 32] = nonce_c_vec
        .try_into()
        .map_err(|v: Vec<u8>| E2eeError::InvalidPublicKeyLength { expected: 32, actual: v.len() })?;

    let fingerprint = fingerprint_init(&init)?;

    if let Some(cached_resp) = cache.lookup_resp(&fingerprint) {
        write_handshake_json(transport, HandshakeFrameType::Resp, &cached_resp).await?;
    } else {
        let mut nonce_s = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce_s);
        let mut handshake_id_bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut handshake_id_bytes);
        let handshake_id = base64url::encode(&handshake_id_bytes);

        let (server_priv, server_eph_pub) = suite.generate_ephemeral();
        let server_features = 0u32;

        let resp = RespPayload {
            handshake_id: handshake_id.clone(),
            server_eph_pub_b64u: base64url::encode(&server_eph_pub),
            nonce_s_b64u: base64url::encode(&nonce_s),
            server_features,
        };

        let entry = cache.make_entry(
            handshake_id,
            resp.clone(),
            init.channel_id.clone(),
            init.suite,
            init.client_features,
            nonce_c,
            nonce_s,
            client_eph.clone(),
            server_eph_pub,
            server_priv,
        );
        cache.insert(fingerprint.clone(), entry)?;

        write_handshake_json(transport, HandshakeFrameType::Resp, &resp).await?;
    }

    loop {
        let (frame_type, payload) = read_handshake_frame(transport, config.max_handshake_payload).await?;
        match frame_type {
            HandshakeFrameType::Init => {
                let retry: InitPayload = {
                    let text = std::str::from_utf8(&payload).map_err(flowersec_wire::FrameError::InvalidUtf8)?;
                    facet_json::from_str(text).map_err(|e| flowersec_wire::FrameError::InvalidJson(e.to_string()))?
                };
                validate_init(&retry, config, expected_channel_id)?;
                let retry_fingerprint = fingerprint_init(&retry)?;
                let cached_resp = cache.lookup_resp(&retry_fingerprint).ok_or(E2eeError::UnknownHandshakeId)?;
                write_handshake_json(transport, HandshakeFrameType::Resp, &cached_resp).await?;
            }
            HandshakeFrameType::Ack => {
                let ack: AckPayload = {
                    let text = std::str::from_utf8(&payload).map_err(flowersec_wire::FrameError::InvalidUtf8)?;
                    facet_json::from_str(text).map_err(|e| flowersec_wire::FrameError::InvalidJson(e.to_string()))?
                };

                let mut pending = cache
                    .take_by_handshake_id(&ack.handshake_id)
                    .ok_or(E2eeError::UnknownHandshakeId)?;
                let server_priv = pending.server_eph_priv.take().ok_or(E2eeError::UnknownHandshakeId)?;

                let now = unix_now();
                let skew = config.clock_skew.as_secs();
                if ack.timestamp_unix_s > now.saturating_add(skew) || ack.timestamp_unix_s < now.saturating_sub(skew) {
                    return Err(E2eeError::TimestampOutOfSkew);
                }
                if let Some(init_exp) = init_exp_unix_s {
                    let skew_ceil_secs = config.clock_skew.as_secs()
                        + if config.clock_skew.subsec_nanos() > 0 { 1 } else { 0 };
                    let limit = init_exp.saturating_add(skew_ceil_secs as i64);
                    if (ack.timestamp_unix_s as i64) > limit {
                        return Err(E2eeError::TimestampAfterInitExp);
                    }
                }

                let th = transcript_hash(&TranscriptInput {
                    version: crate::frame::PROTOCOL_VERSION,
                    suite: pending.suite,
                    role: Role::Client,
                    client_features: pending.client_features,
                    server_features: pending.resp.server_features,
                    channel_id: pending.channel_id.as_bytes(),
                    nonce_c: &pending.nonce_c,
                    nonce_s: &pending.nonce_s,
                    client_eph: &pending.client_eph,
                    server_eph: &pending.server_eph_pub,
                });

                let auth_tag = base64url::decode(&ack.auth_tag_b64u).map_err(|_| E2eeError::AuthTagMismatch)?;
                if !verify_auth_tag(psk, &th, ack.timestamp_unix_s, &auth_tag) {
                    return Err(E2eeError::AuthTagMismatch);
                }

                let shared_secret = server_priv.diffie_hellman(&pending.client_eph)?;
                let session_keys = derive_session_keys(psk, &shared_secret, &th)?;

                let (header, ciphertext) =
                    seal_record_framed(&session_keys.s2c_key, &session_keys.s2c_nonce_prefix, RecordFlag::Ping, 1, &[])?;
                write_record_frame(transport, &header, &ciphertext).await?;

                return Ok(HandshakeOutcome {
                    session_keys,
                    transcript_hash: th,
                    psk: *psk,
                    next_send_seq: 2,
                    next_recv_seq: 1,
                    is_client: false,
                });
            }
            HandshakeFrameType::Resp => return Err(E2eeError::InvalidRole(HandshakeFrameType::Resp as u8)),
        }
    }
}
