//! In-process stand-in for the FHE relayer.
//!
//! Used for local development and tests when no `RELAYER_URL` is configured.
//! It never encrypts anything: handles are derived deterministically and the
//! plaintexts are kept in a key store. The input proof is the
//! `input_proof_digest` of the handles, and a decryption request is accepted
//! when its signature equals the request digest.

use alloy::primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::decryption::{DecryptionError, DecryptionService, UserDecryptRequest};
use super::verifier::{input_proof_digest, DigestProofVerifier, ProofVerifier};
use crate::registry::Handle;

/// Most values a single encrypted input may carry
pub const MAX_INPUT_VALUES: usize = 16;

#[derive(Debug, Clone, Copy)]
struct StoredCiphertext {
    value: U256,
    registry: Address,
    owner: Address,
}

/// Handles plus the proof that binds them to one (registry, user) pair
#[derive(Debug, Clone)]
pub struct EncryptedInput {
    pub handles: Vec<Handle>,
    pub input_proof: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct LocalRelayer {
    keystore: RwLock<HashMap<Handle, StoredCiphertext>>,
    nonce: AtomicU64,
}

impl LocalRelayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_encrypted_input(&self, registry: Address, user: Address) -> EncryptedInputBuilder<'_> {
        EncryptedInputBuilder {
            relayer: self,
            registry,
            user,
            values: Vec::new(),
        }
    }

    pub async fn ciphertext_count(&self) -> usize {
        self.keystore.read().await.len()
    }
}

pub struct EncryptedInputBuilder<'a> {
    relayer: &'a LocalRelayer,
    registry: Address,
    user: Address,
    values: Vec<(U256, u16)>,
}

impl EncryptedInputBuilder<'_> {
    pub fn add256(&mut self, value: U256) -> &mut Self {
        self.values.push((value, 256));
        self
    }

    pub fn add32(&mut self, value: u32) -> &mut Self {
        self.values.push((U256::from(value), 32));
        self
    }

    pub async fn encrypt(&self) -> EncryptedInput {
        let nonce = self.relayer.nonce.fetch_add(1, Ordering::SeqCst);

        let handles: Vec<Handle> = self
            .values
            .iter()
            .enumerate()
            .map(|(index, (value, bits))| {
                let mut buf = Vec::with_capacity(20 + 20 + 8 + 4 + 2 + 32);
                buf.extend_from_slice(self.registry.as_slice());
                buf.extend_from_slice(self.user.as_slice());
                buf.extend_from_slice(&nonce.to_be_bytes());
                buf.extend_from_slice(&(index as u32).to_be_bytes());
                buf.extend_from_slice(&bits.to_be_bytes());
                buf.extend_from_slice(&value.to_be_bytes::<32>());
                keccak256(&buf)
            })
            .collect();

        let mut keystore = self.relayer.keystore.write().await;
        for (handle, (value, _)) in handles.iter().zip(&self.values) {
            keystore.insert(
                *handle,
                StoredCiphertext {
                    value: *value,
                    registry: self.registry,
                    owner: self.user,
                },
            );
        }

        tracing::debug!(
            "Encrypted {} values for user {} on registry {}",
            handles.len(),
            self.user,
            self.registry
        );

        let input_proof = input_proof_digest(self.registry, self.user, &handles).to_vec();
        EncryptedInput { handles, input_proof }
    }
}

#[async_trait]
impl ProofVerifier for LocalRelayer {
    async fn verify(
        &self,
        registry: Address,
        submitter: Address,
        handles: &[Handle],
        proof: &[u8],
    ) -> anyhow::Result<bool> {
        if !DigestProofVerifier.verify(registry, submitter, handles, proof).await? {
            return Ok(false);
        }

        // Every handle must have been produced for this exact pair
        let keystore = self.keystore.read().await;
        Ok(handles.iter().all(|h| {
            keystore
                .get(h)
                .is_some_and(|c| c.registry == registry && c.owner == submitter)
        }))
    }
}

#[async_trait]
impl DecryptionService for LocalRelayer {
    async fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<Handle, U256>, DecryptionError> {
        if request.signature.as_slice() != request.digest().as_slice() {
            return Err(DecryptionError::BadSignature);
        }

        let keystore = self.keystore.read().await;
        request
            .handles
            .iter()
            .map(|handle| {
                let stored = keystore
                    .get(handle)
                    .filter(|c| c.registry == request.registry)
                    .ok_or(DecryptionError::UnknownHandle(*handle))?;
                Ok((*handle, stored.value))
            })
            .collect()
    }
}
