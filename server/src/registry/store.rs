//! KYC registry state machine.
//!
//! Per identity: NoRecord → Pending (submit), Pending → Verified (verify),
//! Pending → Rejected (reject). Verified and Rejected are terminal.
//!
//! **Invariant**: `registered` holds an identity iff `records` has an entry
//! for it, exactly once, in submission order.
//!
//! **Invariant**: only `status` changes after a record is created, and records
//! are never removed.

use alloy::primitives::Address;
use std::collections::HashMap;

use super::events::RegistryEvent;
use super::record::{FieldMode, KycData, KycRecord, KycStatus, KycSubmission};
use crate::error::RegistryError;

/// A submission whose input proof was accepted by the verifier.
///
/// Only the service layer constructs these, after awaiting the verifier.
#[derive(Debug, Clone)]
pub struct ProvenSubmission(KycSubmission);

impl ProvenSubmission {
    pub(crate) fn new(submission: KycSubmission) -> Self {
        Self(submission)
    }

    pub fn submission(&self) -> &KycSubmission {
        &self.0
    }
}

#[derive(Debug)]
pub struct KycRegistry {
    /// Address the input proofs are bound to.
    address: Address,
    owner: Address,
    field_mode: FieldMode,
    records: HashMap<Address, KycRecord>,
    registered: Vec<Address>,
}

impl KycRegistry {
    pub fn new(address: Address, owner: Address, field_mode: FieldMode) -> Result<Self, RegistryError> {
        if owner == Address::ZERO {
            return Err(RegistryError::InvalidArgument(
                "owner cannot be zero address".to_string(),
            ));
        }

        Ok(Self {
            address,
            owner,
            field_mode,
            records: HashMap::new(),
            registered: Vec::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn field_mode(&self) -> FieldMode {
        self.field_mode
    }

    /// Checks everything about a submission except its proof
    pub fn check_submission(
        &self,
        identity: Address,
        submission: &KycSubmission,
    ) -> Result<(), RegistryError> {
        if identity == Address::ZERO {
            return Err(RegistryError::InvalidArgument(
                "submitter cannot be zero address".to_string(),
            ));
        }
        if self.has_record(identity) {
            return Err(RegistryError::DuplicateSubmission);
        }
        for (field, value) in [("identityHash", &submission.identity_hash), ("name", &submission.name)] {
            if !value.matches(self.field_mode) {
                return Err(RegistryError::InvalidArgument(format!(
                    "{} must be {} in this registry",
                    field, self.field_mode
                )));
            }
        }
        Ok(())
    }

    pub fn submit(
        &mut self,
        identity: Address,
        submission: ProvenSubmission,
        now: u64,
    ) -> Result<RegistryEvent, RegistryError> {
        self.check_submission(identity, submission.submission())?;

        let KycSubmission {
            identity_hash,
            name,
            nationality,
            birth_year,
            ..
        } = submission.0;

        self.records.insert(
            identity,
            KycRecord {
                identity_hash,
                name,
                nationality,
                birth_year,
                status: KycStatus::Pending,
                submitted_at: now,
                exists: true,
            },
        );
        self.registered.push(identity);

        Ok(RegistryEvent::Submitted {
            identity,
            timestamp: now,
        })
    }

    pub fn verify(&mut self, caller: Address, identity: Address) -> Result<RegistryEvent, RegistryError> {
        self.transition(caller, identity, KycStatus::Verified)
    }

    pub fn reject(&mut self, caller: Address, identity: Address) -> Result<RegistryEvent, RegistryError> {
        self.transition(caller, identity, KycStatus::Rejected)
    }

    fn transition(
        &mut self,
        caller: Address,
        identity: Address,
        new_status: KycStatus,
    ) -> Result<RegistryEvent, RegistryError> {
        self.ensure_owner(caller)?;

        let record = self
            .records
            .get_mut(&identity)
            .filter(|r| r.exists)
            .ok_or(RegistryError::NoRecord)?;

        if record.status.is_terminal() {
            return Err(RegistryError::InvalidTransition);
        }

        let old_status = record.status;
        record.status = new_status;

        Ok(RegistryEvent::StatusChanged {
            identity,
            old_status,
            new_status,
        })
    }

    /// Returns the previous owner
    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<Address, RegistryError> {
        if new_owner == Address::ZERO {
            return Err(RegistryError::InvalidArgument(
                "new owner cannot be zero address".to_string(),
            ));
        }
        self.ensure_owner(caller)?;

        Ok(std::mem::replace(&mut self.owner, new_owner))
    }

    fn ensure_owner(&self, caller: Address) -> Result<(), RegistryError> {
        if caller != self.owner {
            return Err(RegistryError::Unauthorized);
        }
        Ok(())
    }

    pub fn has_record(&self, identity: Address) -> bool {
        self.records.get(&identity).is_some_and(|r| r.exists)
    }

    /// `(Pending, 0)` when no record exists; check `has_record` first
    pub fn status(&self, identity: Address) -> (KycStatus, u64) {
        self.records
            .get(&identity)
            .map(|r| (r.status, r.submitted_at))
            .unwrap_or_default()
    }

    pub fn is_verified(&self, identity: Address) -> bool {
        self.records
            .get(&identity)
            .is_some_and(|r| r.exists && r.status == KycStatus::Verified)
    }

    /// Stored values as-is; encrypted fields stay as handles
    pub fn data(&self, identity: Address) -> KycData {
        match self.records.get(&identity) {
            Some(r) => KycData {
                identity_hash: r.identity_hash.clone(),
                name: r.name.clone(),
                nationality: r.nationality,
                birth_year: r.birth_year,
            },
            None => KycData::zero(self.field_mode),
        }
    }

    pub fn record(&self, identity: Address) -> Option<&KycRecord> {
        self.records.get(&identity)
    }

    /// Linear scan over the registered identities
    pub fn pending_count(&self) -> usize {
        self.registered
            .iter()
            .filter(|identity| self.records.get(*identity).is_some_and(KycRecord::is_pending))
            .count()
    }

    pub fn registered_users(&self) -> &[Address] {
        &self.registered
    }
}
