//! KYC record types

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque reference to a ciphertext held by the encryption relayer
pub type Handle = B256;

/// Review status of a KYC record.
///
/// Numeric codes match the order the statuses were introduced in:
/// Pending = 0, Verified = 1, Rejected = 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

impl KycStatus {
    pub fn code(self) -> u8 {
        match self {
            KycStatus::Pending => 0,
            KycStatus::Verified => 1,
            KycStatus::Rejected => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KycStatus::Pending => "Pending",
            KycStatus::Verified => "Verified",
            KycStatus::Rejected => "Rejected",
        }
    }

    /// Verified and Rejected are terminal
    pub fn is_terminal(self) -> bool {
        !matches!(self, KycStatus::Pending)
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `identity_hash` and `name` are stored.
///
/// Nationality and birth year are always ciphertext regardless of mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldMode {
    #[default]
    Encrypted,
    Plaintext,
}

impl FieldMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldMode::Encrypted => "encrypted",
            FieldMode::Plaintext => "plaintext",
        }
    }
}

impl fmt::Display for FieldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encrypted" => Ok(FieldMode::Encrypted),
            "plaintext" | "plain" => Ok(FieldMode::Plaintext),
            other => Err(format!("unknown field mode '{}'", other)),
        }
    }
}

/// A record field that is either a ciphertext handle or a plaintext string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Encrypted(Handle),
    Plain(String),
}

impl FieldValue {
    /// Zero value returned for identities without a record
    pub fn zero(mode: FieldMode) -> Self {
        match mode {
            FieldMode::Encrypted => FieldValue::Encrypted(Handle::ZERO),
            FieldMode::Plaintext => FieldValue::Plain(String::new()),
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        match self {
            FieldValue::Encrypted(handle) => Some(*handle),
            FieldValue::Plain(_) => None,
        }
    }

    pub fn matches(&self, mode: FieldMode) -> bool {
        matches!(
            (self, mode),
            (FieldValue::Encrypted(_), FieldMode::Encrypted) | (FieldValue::Plain(_), FieldMode::Plaintext)
        )
    }
}

/// Values supplied by a submitter, before proof verification
#[derive(Debug, Clone)]
pub struct KycSubmission {
    pub identity_hash: FieldValue,
    pub name: FieldValue,
    pub nationality: Handle,
    pub birth_year: Handle,
    pub proof: Vec<u8>,
}

impl KycSubmission {
    /// Ciphertext handles covered by the input proof, in field order
    pub fn ciphertext_handles(&self) -> Vec<Handle> {
        self.identity_hash
            .handle()
            .into_iter()
            .chain(self.name.handle())
            .chain([self.nationality, self.birth_year])
            .collect()
    }
}

/// One identity's KYC record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycRecord {
    pub identity_hash: FieldValue,
    pub name: FieldValue,
    pub nationality: Handle,
    pub birth_year: Handle,
    pub status: KycStatus,
    pub submitted_at: u64,
    pub exists: bool,
}

impl KycRecord {
    pub fn is_pending(&self) -> bool {
        self.exists && self.status == KycStatus::Pending
    }
}

/// Stored field values as returned by `KycRegistry::data`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycData {
    pub identity_hash: FieldValue,
    pub name: FieldValue,
    pub nationality: Handle,
    pub birth_year: Handle,
}

impl KycData {
    pub fn zero(mode: FieldMode) -> Self {
        Self {
            identity_hash: FieldValue::zero(mode),
            name: FieldValue::zero(mode),
            nationality: Handle::ZERO,
            birth_year: Handle::ZERO,
        }
    }

    pub fn ciphertext_handles(&self) -> Vec<Handle> {
        self.identity_hash
            .handle()
            .into_iter()
            .chain(self.name.handle())
            .chain([self.nationality, self.birth_year])
            .collect()
    }
}
