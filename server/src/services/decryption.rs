//! User decryption through the external relayer.
//!
//! The registry only hands out ciphertext handles. A user who wants the
//! plaintext sends a time-boxed request, scoped to specific handles and signed
//! by the requester, to a `DecryptionService`.

use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::models::{format_address, format_handle};
use crate::registry::Handle;

pub const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("Decryption request has no handles")]
    EmptyRequest,

    #[error("Handle requested twice: {0}")]
    DuplicateHandle(Handle),

    #[error("Duration of {days} days is outside 1..={max}")]
    InvalidDuration { days: u64, max: u64 },

    #[error("Decryption request is not valid yet")]
    NotYetValid,

    #[error("Decryption request expired")]
    Expired,

    #[error("Invalid decryption request signature")]
    BadSignature,

    #[error("Unknown ciphertext handle: {0}")]
    UnknownHandle(Handle),

    #[error("Requester is not allowed to decrypt {0}")]
    NotAllowed(Handle),

    #[error("Relayer error: {0}")]
    Relayer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDecryptRequest {
    pub requester: Address,
    pub registry: Address,
    pub handles: Vec<Handle>,
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub signature: Vec<u8>,
}

impl UserDecryptRequest {
    /// keccak256(requester ‖ registry ‖ start ‖ duration ‖ handles…)
    pub fn digest(&self) -> B256 {
        let mut buf = Vec::with_capacity(20 + 20 + 8 + 8 + 32 * self.handles.len());
        buf.extend_from_slice(self.requester.as_slice());
        buf.extend_from_slice(self.registry.as_slice());
        buf.extend_from_slice(&self.start_timestamp.to_be_bytes());
        buf.extend_from_slice(&self.duration_days.to_be_bytes());
        for handle in &self.handles {
            buf.extend_from_slice(handle.as_slice());
        }
        keccak256(&buf)
    }

    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Checks the shape and validity window of the request, not the signature
    pub fn validate(&self, now: u64, max_duration_days: u64) -> Result<(), DecryptionError> {
        if self.handles.is_empty() {
            return Err(DecryptionError::EmptyRequest);
        }

        let mut seen = HashSet::with_capacity(self.handles.len());
        if let Some(dup) = self.handles.iter().find(|h| !seen.insert(**h)) {
            return Err(DecryptionError::DuplicateHandle(*dup));
        }

        if self.duration_days == 0 || self.duration_days > max_duration_days {
            return Err(DecryptionError::InvalidDuration {
                days: self.duration_days,
                max: max_duration_days,
            });
        }
        if now < self.start_timestamp {
            return Err(DecryptionError::NotYetValid);
        }
        if now >= self.expires_at() {
            return Err(DecryptionError::Expired);
        }
        Ok(())
    }
}

#[async_trait]
pub trait DecryptionService: Send + Sync {
    async fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<Handle, U256>, DecryptionError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDecryptBody {
    user_address: String,
    contract_address: String,
    handles: Vec<String>,
    start_timestamp: String,
    duration_days: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct UserDecryptReply {
    values: BTreeMap<String, String>,
}

/// Client for the external relayer's user decryption endpoint
pub struct RelayerDecryptionService {
    client: reqwest::Client,
    base_url: String,
}

impl RelayerDecryptionService {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DecryptionService for RelayerDecryptionService {
    async fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<Handle, U256>, DecryptionError> {
        let url = format!("{}/v1/user-decrypt", self.base_url);
        let body = UserDecryptBody {
            user_address: format_address(&request.requester),
            contract_address: format_address(&request.registry),
            handles: request.handles.iter().map(format_handle).collect(),
            start_timestamp: request.start_timestamp.to_string(),
            duration_days: request.duration_days.to_string(),
            signature: format!("0x{}", hex::encode(&request.signature)),
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DecryptionError::Relayer(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(DecryptionError::Relayer(format!("{}: {}", status, text)));
        }

        let reply: UserDecryptReply = resp
            .json()
            .await
            .map_err(|e| DecryptionError::Relayer(format!("Malformed response: {}", e)))?;

        let mut values = HashMap::with_capacity(reply.values.len());
        for (handle, value) in reply.values {
            let handle: Handle = handle
                .parse()
                .map_err(|_| DecryptionError::Relayer(format!("Invalid handle in response: {}", handle)))?;
            let value = U256::from_str_radix(&value, 10)
                .map_err(|_| DecryptionError::Relayer(format!("Invalid value in response: {}", value)))?;
            values.insert(handle, value);
        }

        // The relayer must answer exactly what was asked
        if let Some(missing) = request.handles.iter().find(|h| !values.contains_key(*h)) {
            return Err(DecryptionError::Relayer(format!(
                "Response is missing handle {}",
                missing
            )));
        }

        Ok(values)
    }
}
