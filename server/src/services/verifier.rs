//! Input proof verification.
//!
//! A proof shows that the ciphertext handles of a submission were produced
//! for one (registry, submitter) pair. The registry never checks proofs itself;
//! it asks a `ProofVerifier` and treats the answer as a precondition.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{format_address, format_handle};
use crate::registry::Handle;

const INPUT_PROOF_DOMAIN: &[u8] = b"kyc-input-proof";

#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// `Ok(false)` means the proof was checked and rejected.
    /// `Err` means the verifier could not be reached.
    async fn verify(
        &self,
        registry: Address,
        submitter: Address,
        handles: &[Handle],
        proof: &[u8],
    ) -> Result<bool>;
}

/// SHA-256 commitment binding a set of handles to a registry and submitter
pub fn input_proof_digest(registry: Address, submitter: Address, handles: &[Handle]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(INPUT_PROOF_DOMAIN);
    hasher.update(registry.as_slice());
    hasher.update(submitter.as_slice());
    for handle in handles {
        hasher.update(handle.as_slice());
    }
    hasher.finalize().into()
}

/// Accepts exactly the proofs equal to `input_proof_digest`
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestProofVerifier;

#[async_trait]
impl ProofVerifier for DigestProofVerifier {
    async fn verify(
        &self,
        registry: Address,
        submitter: Address,
        handles: &[Handle],
        proof: &[u8],
    ) -> Result<bool> {
        Ok(proof == input_proof_digest(registry, submitter, handles).as_slice())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyInputRequest {
    contract_address: String,
    user_address: String,
    handles: Vec<String>,
    input_proof: String,
}

#[derive(Debug, Deserialize)]
struct VerifyInputResponse {
    valid: bool,
}

/// Forwards proofs to the external relayer's input verification endpoint
pub struct RelayerProofVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl RelayerProofVerifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProofVerifier for RelayerProofVerifier {
    async fn verify(
        &self,
        registry: Address,
        submitter: Address,
        handles: &[Handle],
        proof: &[u8],
    ) -> Result<bool> {
        let url = format!("{}/v1/input-proof/verify", self.base_url);
        let request = VerifyInputRequest {
            contract_address: format_address(&registry),
            user_address: format_address(&submitter),
            handles: handles.iter().map(format_handle).collect(),
            input_proof: format!("0x{}", hex::encode(proof)),
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Relayer unreachable at {}", url))?
            .error_for_status()
            .context("Relayer rejected verification request")?;

        let body: VerifyInputResponse = resp.json().await.context("Malformed relayer response")?;
        Ok(body.valid)
    }
}
