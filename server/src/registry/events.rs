//! Notifications emitted by the registry.
//!
//! Only two kinds exist: a record was submitted, or a record's status changed.
//! Subscribers either poll the sequenced log or listen on the broadcast channel.

use alloy::primitives::Address;

use super::record::KycStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A new record was created in the Pending state.
    Submitted { identity: Address, timestamp: u64 },
    /// A Pending record moved to Verified or Rejected.
    StatusChanged {
        identity: Address,
        old_status: KycStatus,
        new_status: KycStatus,
    },
}

impl RegistryEvent {
    pub fn identity(&self) -> Address {
        match self {
            RegistryEvent::Submitted { identity, .. } => *identity,
            RegistryEvent::StatusChanged { identity, .. } => *identity,
        }
    }
}

/// A notification with its position in the registry's event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    /// Starts at 1 and increases by one per committed notification.
    pub seq: u64,
    pub event: RegistryEvent,
}
