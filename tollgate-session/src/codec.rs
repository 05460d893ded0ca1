//! Token codec
//!
//! Wire format: `base64url(header) "." base64url(payload) "." base64url(tag)`
//! where `tag = HMAC-SHA256(secret, header_segment "." payload_segment)` and
//! every segment uses the unpadded URL-safe alphabet.

use crate::types::{TokenHeader, TokenPayload, UserId};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tollgate_core::{ErrorContext, TollgateError, TollgateResult};

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '.';

/// A token split into its parsed parts. Nothing here has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub header: TokenHeader,
    pub payload: TokenPayload,
    /// Third segment exactly as presented (still base64url text)
    pub signature: String,
}

/// Encodes, decodes and verifies tokens with a server-held secret
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    pub fn new(secret: &str) -> TollgateResult<Self> {
        let mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| TollgateError::Config {
                message: format!("Secret cannot be used as an HMAC key: {}", e),
                source: None,
                context: ErrorContext::new("token_codec").with_operation("new"),
            })?;
        Ok(Self { mac })
    }

    /// Build a signed three-segment token
    pub fn encode(
        &self,
        user_id: UserId,
        timeout_minutes: i64,
        creation_time: DateTime<Utc>,
    ) -> TollgateResult<String> {
        let header = encode_segment(&TokenHeader::hs256())?;
        let payload = encode_segment(&TokenPayload {
            user_id,
            minutes_timeout: timeout_minutes,
            creation_time,
        })?;

        let signing_input = format!("{}{}{}", header, SEPARATOR, payload);
        let tag = URL_SAFE_NO_PAD.encode(self.sign(&signing_input));

        Ok(format!("{}{}{}", signing_input, SEPARATOR, tag))
    }

    /// Split and parse a token without checking its signature
    pub fn decode(token: &str) -> TollgateResult<DecodedToken> {
        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(TollgateError::malformed(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }

        Ok(DecodedToken {
            header: decode_segment(parts[0], "header")?,
            payload: decode_segment(parts[1], "payload")?,
            signature: parts[2].to_string(),
        })
    }

    /// Check the token's tag in constant time.
    ///
    /// Any structural problem simply yields `false`; a forged token is a
    /// validation result, not an error.
    pub fn verify(&self, token: &str) -> bool {
        let Some((signing_input, signature)) = token.rsplit_once(SEPARATOR) else {
            return false;
        };
        if signing_input.matches(SEPARATOR).count() != 1 {
            return false;
        }
        let Ok(provided) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };

        let expected = self.sign(signing_input);
        provided.ct_eq(expected.as_slice()).into()
    }

    fn sign(&self, signing_input: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn encode_segment<T: serde::Serialize>(value: &T) -> TollgateResult<String> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> TollgateResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TollgateError::malformed(format!("{} is not base64url: {}", name, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TollgateError::malformed(format!("{} is not valid JSON: {}", name, e)))
}
