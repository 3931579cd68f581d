//! KYC registry: records, status state machine and notifications

pub mod events;
pub mod record;
pub mod store;

pub use events::{LoggedEvent, RegistryEvent};
pub use record::{FieldMode, FieldValue, Handle, KycData, KycRecord, KycStatus, KycSubmission};
pub use store::{KycRegistry, ProvenSubmission};
