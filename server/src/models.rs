//! Data models for API requests/responses

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AppError;
use crate::registry::{FieldMode, FieldValue, Handle, KycStatus, LoggedEvent, RegistryEvent};

pub fn format_address(address: &Address) -> String {
    address.to_checksum(None)
}

pub fn format_handle(handle: &Handle) -> String {
    format!("0x{}", hex::encode(handle.as_slice()))
}

pub fn parse_address(value: &str) -> Result<Address, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid address: {}", value)))
}

pub fn parse_handle(value: &str) -> Result<Handle, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid ciphertext handle: {}", value)))
}

pub fn parse_hex_bytes(value: &str) -> Result<Vec<u8>, AppError> {
    hex::decode(value.trim().trim_start_matches("0x"))
        .map_err(|e| AppError::BadRequest(format!("Invalid hex encoding: {}", e)))
}

/// Serialized form of a record field: a handle in encrypted mode,
/// the plaintext in plaintext mode
pub fn format_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Encrypted(handle) => format_handle(handle),
        FieldValue::Plain(text) => text.clone(),
    }
}

/// KYC submission from the identity owner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitKycRequest {
    /// Handle (encrypted mode) or document CID (plaintext mode)
    pub identity_hash: String,
    /// Handle (encrypted mode) or plain name (plaintext mode)
    pub name: String,
    pub nationality: String,
    pub birth_year: String,
    pub input_proof: String, // Hex-encoded
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitKycResponse {
    pub address: String,
    pub status: KycStatus,
    pub submitted_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycStatusResponse {
    pub address: String,
    pub has_record: bool,
    pub status: KycStatus,
    pub status_code: u8,
    pub submitted_at: u64,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDataResponse {
    pub address: String,
    pub field_mode: FieldMode,
    pub identity_hash: String,
    pub name: String,
    pub nationality: String,
    pub birth_year: String,
    /// Gateway link when the identity hash is a plaintext CID
    pub document_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeResponse {
    pub address: String,
    pub old_status: KycStatus,
    pub new_status: KycStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCountResponse {
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredUsersResponse {
    pub count: usize,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOwnershipRequest {
    pub new_owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOwnershipResponse {
    pub previous_owner: String,
    pub owner: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventBody {
    #[serde(rename_all = "camelCase")]
    Submitted { address: String, timestamp: u64 },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        address: String,
        old_status: KycStatus,
        new_status: KycStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq: u64,
    #[serde(flatten)]
    pub body: EventBody,
}

impl From<&LoggedEvent> for EventEnvelope {
    fn from(logged: &LoggedEvent) -> Self {
        let body = match &logged.event {
            RegistryEvent::Submitted { identity, timestamp } => EventBody::Submitted {
                address: format_address(identity),
                timestamp: *timestamp,
            },
            RegistryEvent::StatusChanged {
                identity,
                old_status,
                new_status,
            } => EventBody::StatusChanged {
                address: format_address(identity),
                old_status: *old_status,
                new_status: *new_status,
            },
        };
        Self {
            seq: logged.seq,
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub latest: u64,
    pub events: Vec<EventEnvelope>,
}

/// Time-boxed user decryption request; the requester is the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    pub handles: Vec<String>,
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub signature: String, // Hex-encoded
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    /// Handle → decimal plaintext
    pub values: BTreeMap<String, String>,
}

/// Plaintext for the local relayer's encrypted input builder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PlainInput {
    /// Decimal string, up to 256 bits
    U256(String),
    U32(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptRequest {
    pub values: Vec<PlainInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    pub handles: Vec<String>,
    pub input_proof: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadResponse {
    pub cid: String,
    pub size: usize,
    pub gateway_url: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub chain_id: u64,
    pub registry: String,
    pub owner: String,
    pub field_mode: FieldMode,
    pub local_relayer: bool,
    pub version: String,
}
