//! Attach-token verification: a compact `header.payload.signature`
//! structure, each part base64url (unpadded), signed with ed25519 over
//! the ASCII bytes of `header.payload`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use facet::Facet;
use parking_lot::Mutex;

use flowersec_wire::base64url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    UnknownKid,
    BadSignature,
    Expired,
    AudienceMismatch,
    IssuerMismatch,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "token is not a valid header.payload.signature structure"),
            TokenError::UnknownKid => write!(f, "token kid is not in the verification key set"),
            TokenError::BadSignature => write!(f, "token signature does not verify"),
            TokenError::Expired => write!(f, "token exp is in the past"),
            TokenError::AudienceMismatch => write!(f, "token aud does not match the expected audience"),
            TokenError::IssuerMismatch => write!(f, "token iss does not match the expected issuer"),
        }
    }
}

impl std::error::Error for TokenError {}

#[derive(Facet, Debug, Clone, PartialEq)]
struct TokenHeader {
    alg: String,
}

/// The claims carried in an attach token's payload.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub aud: String,
    pub iss: String,
    /// Token expiry, Unix seconds.
    pub exp: i64,
    pub channel_id: String,
    /// `1` = client, `2` = server. See [`flowersec_grant::GrantRole`].
    pub role: u8,
    pub kid: String,
    /// Mirrors `ChannelInitGrant::channel_init_expire_at_unix_s`; both
    /// endpoints on a channel must agree on this value.
    pub channel_init_expire_at_unix_s: i64,
    /// Mirrors `ChannelInitGrant::idle_timeout_seconds`.
    pub idle_timeout_seconds: i32,
}

/// A `kid -> ed25519 public key` verification set.
#[derive(Default)]
pub struct Keyset {
    keys: HashMap<String, VerifyingKey>,
}

impl Keyset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kid: impl Into<String>, key: VerifyingKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    pub fn insert(&mut self, kid: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(kid.into(), key);
    }
}

/// Verify `token` against `keyset`, requiring `exp > now_unix`. Does not
/// check `aud`/`iss` unless `expected_aud`/`expected_iss` are `Some`, and
/// does not enforce single-use — see [`ReplayGuard`] for that.
pub fn verify_token(
    token: &str,
    keyset: &Keyset,
    now_unix: i64,
    expected_aud: Option<&str>,
    expected_iss: Option<&str>,
) -> Result<TokenClaims, TokenError> {
    let mut parts = token.split('.');
    let (header_b64, payload_b64, sig_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(TokenError::Malformed),
        };

    let header_bytes = base64url::decode(header_b64).map_err(|_| TokenError::Malformed)?;
    let header_text = std::str::from_utf8(&header_bytes).map_err(|_| TokenError::Malformed)?;
    let header: TokenHeader = facet_json::from_str(header_text).map_err(|_| TokenError::Malformed)?;
    if header.alg != "EdDSA" {
        return Err(TokenError::Malformed);
    }

    let payload_bytes = base64url::decode(payload_b64).map_err(|_| TokenError::Malformed)?;
    let payload_text = std::str::from_utf8(&payload_bytes).map_err(|_| TokenError::Malformed)?;
    let claims: TokenClaims = facet_json::from_str(payload_text).map_err(|_| TokenError::Malformed)?;

    let sig_bytes = base64url::decode(sig_b64).map_err(|_| TokenError::Malformed)?;
    let sig_bytes: [u8; 64] = sig_bytes.try_into().map_err(|_| TokenError::Malformed)?;
    let signature = Signature::from_bytes(&sig_bytes);

    let key = keyset.keys.get(&claims.kid).ok_or(TokenError::UnknownKid)?;

    let signed_message = format!("{header_b64}.{payload_b64}");
    key.verify(signed_message.as_bytes(), &signature)
        .map_err(|_| TokenError::BadSignature)?;

    if claims.exp <= now_unix {
        return Err(TokenError::Expired);
    }
    if let Some(expected) = expected_aud {
        if claims.aud != expected {
            return Err(TokenError::AudienceMismatch);
        }
    }
    if let Some(expected) = expected_iss {
        if claims.iss != expected {
            return Err(TokenError::IssuerMismatch);
        }
    }

    Ok(claims)
}

/// Tracks tokens already spent, so a captured token can't be attached
/// with twice. Keyed on the raw token text: since each token's claims
/// already bind it to one `(channel_id, role)` pair, single-use on the
/// token text is single-use on that pair.
#[derive(Default)]
pub struct ReplayGuard {
    spent: Mutex<HashSet<String>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token` as spent. Returns `false` if it was already spent.
    pub fn spend(&self, token: &str) -> bool {
        self.spent.lock().insert(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn sign_token(signing_key: &SigningKey, claims: &TokenClaims) -> String {
        let header = TokenHeader { alg: "EdDSA".to_string() };
        let header_b64 = base64url::encode(facet_json::to_string(&header).unwrap().as_bytes());
        let payload_b64 = base64url::encode(facet_json::to_string(claims).unwrap().as_bytes());
        let signed_message = format!("{header_b64}.{payload_b64}");
        let signature = ed25519_dalek::Signer::sign(signing_key, signed_message.as_bytes());
        let sig_b64 = base64url::encode(&signature.to_bytes());
        format!("{header_b64}.{payload_b64}.{sig_b64}")
    }

    fn sample_claims(kid: &str) -> TokenClaims {
        TokenClaims {
            aud: "flowersec-tunnel".to_string(),
            iss: "controlplane".to_string(),
            exp: 2_000_000_000,
            channel_id: "chan-1".to_string(),
            role: 1,
            kid: kid.to_string(),
            channel_init_expire_at_unix_s: 2_000_000_000,
            idle_timeout_seconds: 60,
        }
    }

    #[test]
    fn valid_token_verifies() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let keyset = Keyset::new().with_key("k1", signing_key.verifying_key());
        let token = sign_token(&signing_key, &sample_claims("k1"));

        let claims = verify_token(&token, &keyset, 1_000_000_000, None, None).unwrap();
        assert_eq!(claims.channel_id, "chan-1");
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let keyset = Keyset::new();
        let token = sign_token(&signing_key, &sample_claims("k1"));
        assert_eq!(verify_token(&token, &keyset, 1_000_000_000, None, None), Err(TokenError::UnknownKid));
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let keyset = Keyset::new().with_key("k1", signing_key.verifying_key());
        let token = sign_token(&signing_key, &sample_claims("k1"));
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = base64url::encode(b"{\"tampered\":true}");
        parts[1] = &forged_payload;
        let forged = parts.join(".");
        assert_eq!(verify_token(&forged, &keyset, 1_000_000_000, None, None), Err(TokenError::Malformed));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let keyset = Keyset::new().with_key("k1", signing_key.verifying_key());
        let mut claims = sample_claims("k1");
        claims.exp = 100;
        let token = sign_token(&signing_key, &claims);
        assert_eq!(verify_token(&token, &keyset, 1_000_000_000, None, None), Err(TokenError::Expired));
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let keyset = Keyset::new().with_key("k1", signing_key.verifying_key());
        let token = sign_token(&signing_key, &sample_claims("k1"));
        assert_eq!(
            verify_token(&token, &keyset, 1_000_000_000, Some("someone-else"), None),
            Err(TokenError::AudienceMismatch)
        );
    }

    #[test]
    fn replay_guard_rejects_second_spend() {
        let guard = ReplayGuard::new();
        assert!(guard.spend("token-a"));
        assert!(!guard.spend("token-a"));
        assert!(guard.spend("token-b"));
    }
}
