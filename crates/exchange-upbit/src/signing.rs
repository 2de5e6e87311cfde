//! Request signing for Upbit's private REST endpoints.
//!
//! Upbit authenticates with a JWT bearer token per request: an HS256
//! signature over `{access_key, nonce}` plus, for requests that carry
//! parameters, a SHA-512 hash of the urlencoded query string.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Upbit API credentials, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct UpbitCredentials {
    pub access_key: String,
    secret_key: String,
}

impl UpbitCredentials {
    /// Loads credentials from `UPBIT_ACCESS_KEY` / `UPBIT_SECRET_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if either environment variable is missing.
    pub fn from_env() -> Result<Self> {
        let access_key =
            std::env::var("UPBIT_ACCESS_KEY").context("Missing UPBIT_ACCESS_KEY env var")?;
        let secret_key =
            std::env::var("UPBIT_SECRET_KEY").context("Missing UPBIT_SECRET_KEY env var")?;

        Ok(Self {
            access_key,
            secret_key,
        })
    }

    #[cfg(test)]
    pub fn for_tests(access_key: &str, secret_key: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// Builds the `Authorization: Bearer <jwt>` value for a request.
    ///
    /// `query` is the exact urlencoded query/body string the request will
    /// carry, or empty for parameterless endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if HMAC signing fails.
    pub fn bearer_token(&self, query: &str) -> Result<String> {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);

        let mut payload = json!({
            "access_key": self.access_key,
            "nonce": Uuid::new_v4().to_string(),
        });
        if !query.is_empty() {
            let digest = Sha512::digest(query.as_bytes());
            payload["query_hash"] = json!(hex_encode(&digest));
            payload["query_hash_alg"] = json!("SHA512");
        }
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(&payload)?);

        let signing_input = format!("{header}.{payload}");
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("HMAC key setup failed: {e}"))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("Bearer {signing_input}.{signature}"))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_has_jwt_shape() {
        let creds = UpbitCredentials::for_tests("access", "secret");
        let token = creds.bearer_token("").unwrap();

        let token = token.strip_prefix("Bearer ").expect("bearer prefix");
        assert_eq!(token.split('.').count(), 3, "header.payload.signature");
    }

    #[test]
    fn query_hash_only_present_with_query() {
        let creds = UpbitCredentials::for_tests("access", "secret");

        let bare = creds.bearer_token("").unwrap();
        let with_query = creds.bearer_token("market=KRW-BTC&side=bid").unwrap();

        let decode_payload = |token: &str| {
            let payload = token
                .strip_prefix("Bearer ")
                .unwrap()
                .split('.')
                .nth(1)
                .unwrap()
                .to_string();
            let bytes = URL_SAFE_NO_PAD.decode(payload).unwrap();
            serde_json::from_slice::<serde_json::Value>(&bytes).unwrap()
        };

        assert!(decode_payload(&bare).get("query_hash").is_none());
        let payload = decode_payload(&with_query);
        assert_eq!(payload["query_hash_alg"], "SHA512");
        assert_eq!(payload["query_hash"].as_str().unwrap().len(), 128);
    }
}
