//! Registry service: serializes mutations and talks to the proof verifier

use alloy::primitives::Address;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::clock::Clock;
use super::verifier::ProofVerifier;
use crate::error::RegistryError;
use crate::registry::{
    FieldMode, Handle, KycData, KycRegistry, KycSubmission, LoggedEvent, ProvenSubmission,
    RegistryEvent, KycStatus,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Status fields of one identity read under a single guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub has_record: bool,
    pub status: KycStatus,
    pub submitted_at: u64,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPage {
    /// 0 while the log is empty
    pub latest: u64,
    pub events: Vec<LoggedEvent>,
}

/// Everything mutated together under one write lock
struct RegistryState {
    registry: KycRegistry,
    log: Vec<LoggedEvent>,
    /// Identities allowed to request decryption of each handle
    acl: HashMap<Handle, HashSet<Address>>,
}

impl RegistryState {
    fn record_event(&mut self, event: RegistryEvent) -> LoggedEvent {
        let logged = LoggedEvent {
            seq: self.log.len() as u64 + 1,
            event,
        };
        self.log.push(logged.clone());
        logged
    }
}

pub struct RegistryService {
    state: RwLock<RegistryState>,
    verifier: Arc<dyn ProofVerifier>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<LoggedEvent>,
}

impl RegistryService {
    pub fn new(registry: KycRegistry, verifier: Arc<dyn ProofVerifier>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RegistryState {
                registry,
                log: Vec::new(),
                acl: HashMap::new(),
            }),
            verifier,
            clock,
            events,
        }
    }

    pub async fn submit(
        &self,
        identity: Address,
        submission: KycSubmission,
    ) -> Result<RegistryEvent, RegistryError> {
        // Cheap checks first so a duplicate never reaches the verifier
        let registry_address = {
            let state = self.state.read().await;
            state.registry.check_submission(identity, &submission)?;
            state.registry.address()
        };

        let handles = submission.ciphertext_handles();
        let accepted = self
            .verifier
            .verify(registry_address, identity, &handles, &submission.proof)
            .await
            .map_err(|e| RegistryError::VerifierUnavailable(format!("{:#}", e)))?;

        if !accepted {
            tracing::warn!("Rejected input proof from {}", identity);
            return Err(RegistryError::InvalidProof);
        }

        let mut state = self.state.write().await;
        let owner = state.registry.owner();
        // Re-checked under the write lock; another submit may have won the race
        let event = state
            .registry
            .submit(identity, ProvenSubmission::new(submission), self.clock.now())?;

        for handle in handles {
            state.acl.entry(handle).or_default().extend([identity, owner]);
        }

        tracing::info!("KYC submitted by {}", identity);
        self.publish(&mut state, event.clone());
        Ok(event)
    }

    pub async fn verify(&self, caller: Address, identity: Address) -> Result<RegistryEvent, RegistryError> {
        let mut state = self.state.write().await;
        let event = state.registry.verify(caller, identity)?;
        tracing::info!("KYC verified for {} by {}", identity, caller);
        self.publish(&mut state, event.clone());
        Ok(event)
    }

    pub async fn reject(&self, caller: Address, identity: Address) -> Result<RegistryEvent, RegistryError> {
        let mut state = self.state.write().await;
        let event = state.registry.reject(caller, identity)?;
        tracing::info!("KYC rejected for {} by {}", identity, caller);
        self.publish(&mut state, event.clone());
        Ok(event)
    }

    /// Returns the previous owner
    pub async fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<Address, RegistryError> {
        let mut state = self.state.write().await;
        let previous = state.registry.transfer_ownership(caller, new_owner)?;
        tracing::info!("Ownership transferred from {} to {}", previous, new_owner);
        Ok(previous)
    }

    fn publish(&self, state: &mut RegistryState, event: RegistryEvent) {
        let logged = state.record_event(event);
        tracing::debug!("Registry event #{} for {}", logged.seq, logged.event.identity());
        // No subscribers is fine; the log keeps everything
        let _ = self.events.send(logged);
    }

    pub async fn has_record(&self, identity: Address) -> bool {
        self.state.read().await.registry.has_record(identity)
    }

    pub async fn status_snapshot(&self, identity: Address) -> StatusSnapshot {
        let state = self.state.read().await;
        let (status, submitted_at) = state.registry.status(identity);
        StatusSnapshot {
            has_record: state.registry.has_record(identity),
            status,
            submitted_at,
            verified: state.registry.is_verified(identity),
        }
    }

    pub async fn data(&self, identity: Address) -> KycData {
        self.state.read().await.registry.data(identity)
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.registry.pending_count()
    }

    pub async fn registered_users(&self) -> Vec<Address> {
        self.state.read().await.registry.registered_users().to_vec()
    }

    pub async fn owner(&self) -> Address {
        self.state.read().await.registry.owner()
    }

    pub async fn address(&self) -> Address {
        self.state.read().await.registry.address()
    }

    pub async fn field_mode(&self) -> FieldMode {
        self.state.read().await.registry.field_mode()
    }

    pub async fn can_decrypt(&self, account: Address, handle: Handle) -> bool {
        self.state
            .read()
            .await
            .acl
            .get(&handle)
            .is_some_and(|allowed| allowed.contains(&account))
    }

    /// Logged notifications with `seq > since`, oldest first, and the
    /// sequence number of the newest notification
    pub async fn events_since(&self, since: u64) -> EventPage {
        let state = self.state.read().await;
        let start = (since as usize).min(state.log.len());
        EventPage {
            latest: state.log.len() as u64,
            events: state.log[start..].to_vec(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoggedEvent> {
        self.events.subscribe()
    }
}
