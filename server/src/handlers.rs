//! HTTP handlers for the KYC registry API

use alloy::primitives::U256;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, RegistryError};
use crate::middleware::Caller;
use crate::models::*;
use crate::registry::{FieldMode, FieldValue, KycRegistry, KycStatus, KycSubmission, RegistryEvent};
use crate::services::clock::Clock;
use crate::services::decryption::{
    DecryptionError, DecryptionService, RelayerDecryptionService, UserDecryptRequest,
};
use crate::services::ipfs::{gateway_url, is_valid_cid, MockDocumentStore};
use crate::services::local_relayer::{LocalRelayer, MAX_INPUT_VALUES};
use crate::services::registry::RegistryService;
use crate::services::verifier::{ProofVerifier, RelayerProofVerifier};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<RegistryService>,
    pub decryption: Arc<dyn DecryptionService>,
    /// Present only when no external relayer is configured
    pub local_relayer: Option<Arc<LocalRelayer>>,
    pub documents: Arc<MockDocumentStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let registry = KycRegistry::new(
            config.registry_address,
            config.owner_address,
            config.field_mode,
        )?;

        let (verifier, decryption, local_relayer): (
            Arc<dyn ProofVerifier>,
            Arc<dyn DecryptionService>,
            Option<Arc<LocalRelayer>>,
        ) = match &config.relayer_url {
            Some(url) => (
                Arc::new(RelayerProofVerifier::new(url)),
                Arc::new(RelayerDecryptionService::new(url)),
                None,
            ),
            None => {
                let local = Arc::new(LocalRelayer::new());
                (local.clone(), local.clone(), Some(local))
            }
        };

        Ok(Self {
            registry: Arc::new(RegistryService::new(registry, verifier, clock.clone())),
            decryption,
            local_relayer,
            documents: Arc::new(MockDocumentStore::new()),
            clock,
            config,
        })
    }
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        chain_id: state.config.chain_id,
        registry: format_address(&state.registry.address().await),
        owner: format_address(&state.registry.owner().await),
        field_mode: state.registry.field_mode().await,
        local_relayer: state.local_relayer.is_some(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

fn parse_field(mode: FieldMode, name: &str, value: &str) -> Result<FieldValue, AppError> {
    match mode {
        FieldMode::Encrypted => parse_handle(value).map(FieldValue::Encrypted),
        FieldMode::Plaintext => {
            let value = value.trim();
            if value.is_empty() {
                return Err(AppError::BadRequest(format!("{} cannot be empty", name)));
            }
            Ok(FieldValue::Plain(value.to_string()))
        }
    }
}

/// Submit KYC information for the caller
pub async fn submit_kyc(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<SubmitKycRequest>,
) -> Result<(StatusCode, Json<SubmitKycResponse>), AppError> {
    let mode = state.registry.field_mode().await;

    let submission = KycSubmission {
        identity_hash: parse_field(mode, "identityHash", &request.identity_hash)?,
        name: parse_field(mode, "name", &request.name)?,
        nationality: parse_handle(&request.nationality)?,
        birth_year: parse_handle(&request.birth_year)?,
        proof: parse_hex_bytes(&request.input_proof)?,
    };

    let submitted_at = match state.registry.submit(caller, submission).await? {
        RegistryEvent::Submitted { timestamp, .. } => timestamp,
        RegistryEvent::StatusChanged { .. } => {
            return Err(AppError::Internal("unexpected event for submission".to_string()))
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(SubmitKycResponse {
            address: format_address(&caller),
            status: KycStatus::Pending,
            submitted_at,
        }),
    ))
}

/// Record existence, status and verification flag
pub async fn get_kyc_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<KycStatusResponse>, AppError> {
    let identity = parse_address(&address)?;
    let snapshot = state.registry.status_snapshot(identity).await;

    Ok(Json(KycStatusResponse {
        address: format_address(&identity),
        has_record: snapshot.has_record,
        status: snapshot.status,
        status_code: snapshot.status.code(),
        submitted_at: snapshot.submitted_at,
        verified: snapshot.verified,
    }))
}

/// Stored field values; encrypted fields are returned as handles
pub async fn get_kyc_data(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<KycDataResponse>, AppError> {
    let identity = parse_address(&address)?;
    let data = state.registry.data(identity).await;

    let document_url = match &data.identity_hash {
        FieldValue::Plain(cid) if is_valid_cid(cid) => Some(gateway_url(&state.config.ipfs_gateway, cid)),
        _ => None,
    };

    Ok(Json(KycDataResponse {
        address: format_address(&identity),
        field_mode: state.registry.field_mode().await,
        identity_hash: format_field(&data.identity_hash),
        name: format_field(&data.name),
        nationality: format_handle(&data.nationality),
        birth_year: format_handle(&data.birth_year),
        document_url,
    }))
}

fn status_change(event: RegistryEvent) -> Result<Json<StatusChangeResponse>, AppError> {
    match event {
        RegistryEvent::StatusChanged {
            identity,
            old_status,
            new_status,
        } => Ok(Json(StatusChangeResponse {
            address: format_address(&identity),
            old_status,
            new_status,
        })),
        RegistryEvent::Submitted { .. } => Err(AppError::Internal(
            "unexpected event for status change".to_string(),
        )),
    }
}

/// Owner-only: Pending → Verified
pub async fn verify_kyc(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    let identity = parse_address(&address)?;
    status_change(state.registry.verify(caller, identity).await?)
}

/// Owner-only: Pending → Rejected
pub async fn reject_kyc(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    let identity = parse_address(&address)?;
    status_change(state.registry.reject(caller, identity).await?)
}

pub async fn pending_count(State(state): State<AppState>) -> Json<PendingCountResponse> {
    Json(PendingCountResponse {
        pending: state.registry.pending_count().await,
    })
}

pub async fn registered_users(State(state): State<AppState>) -> Json<RegisteredUsersResponse> {
    let users: Vec<String> = state
        .registry
        .registered_users()
        .await
        .iter()
        .map(format_address)
        .collect();

    Json(RegisteredUsersResponse {
        count: users.len(),
        users,
    })
}

pub async fn get_owner(State(state): State<AppState>) -> Json<OwnerResponse> {
    Json(OwnerResponse {
        owner: format_address(&state.registry.owner().await),
    })
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<TransferOwnershipRequest>,
) -> Result<Json<TransferOwnershipResponse>, AppError> {
    let new_owner = parse_address(&request.new_owner)?;
    let previous = state.registry.transfer_ownership(caller, new_owner).await?;

    Ok(Json(TransferOwnershipResponse {
        previous_owner: format_address(&previous),
        owner: format_address(&new_owner),
    }))
}

/// Poll registry notifications newer than `since`
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let page = state.registry.events_since(query.since.unwrap_or(0)).await;

    Json(EventsResponse {
        latest: page.latest,
        events: page.events.iter().map(EventEnvelope::from).collect(),
    })
}

/// Decrypt handles the caller is allowed to see
pub async fn decrypt(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, AppError> {
    let handles = request
        .handles
        .iter()
        .map(|h| parse_handle(h))
        .collect::<Result<Vec<_>, _>>()?;

    let request = UserDecryptRequest {
        requester: caller,
        registry: state.registry.address().await,
        handles,
        start_timestamp: request.start_timestamp,
        duration_days: request.duration_days,
        signature: parse_hex_bytes(&request.signature)?,
    };
    request.validate(state.clock.now(), state.config.decryption_max_duration_days)?;

    for handle in &request.handles {
        if !state.registry.can_decrypt(caller, *handle).await {
            tracing::warn!("{} tried to decrypt {} without access", caller, handle);
            return Err(DecryptionError::NotAllowed(*handle).into());
        }
    }

    let values = state.decryption.user_decrypt(&request).await?;
    tracing::info!("Decrypted {} values for {}", values.len(), caller);

    Ok(Json(DecryptResponse {
        values: values
            .iter()
            .map(|(handle, value)| (format_handle(handle), value.to_string()))
            .collect(),
    }))
}

/// Mock IPFS upload of an identity document
pub async fn upload_document(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentUploadResponse>), AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("Document body is empty".to_string()));
    }

    let size = body.len();
    let cid = state.documents.put(body.to_vec()).await;

    Ok((
        StatusCode::CREATED,
        Json(DocumentUploadResponse {
            gateway_url: gateway_url(&state.config.ipfs_gateway, &cid),
            cid,
            size,
        }),
    ))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !is_valid_cid(&cid) {
        return Err(AppError::BadRequest(format!("Invalid CID: {}", cid)));
    }

    let bytes = state
        .documents
        .get(&cid)
        .await
        .ok_or_else(|| AppError::DocumentNotFound(cid.clone()))?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// Local relayer only: encrypt values for the caller on this registry
pub async fn relayer_encrypt(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<EncryptRequest>,
) -> Result<Json<EncryptResponse>, AppError> {
    let relayer = state
        .local_relayer
        .as_ref()
        .ok_or_else(|| AppError::NotAvailable("an external relayer is configured".to_string()))?;

    if request.values.is_empty() {
        return Err(RegistryError::InvalidArgument("no values to encrypt".to_string()).into());
    }
    if request.values.len() > MAX_INPUT_VALUES {
        return Err(RegistryError::InvalidArgument(format!(
            "at most {} values per encrypted input",
            MAX_INPUT_VALUES
        ))
        .into());
    }

    let mut input = relayer.create_encrypted_input(state.registry.address().await, caller);
    for value in &request.values {
        match value {
            PlainInput::U256(text) => {
                let value = U256::from_str_radix(text.trim(), 10)
                    .map_err(|_| AppError::BadRequest(format!("Invalid u256 value: {}", text)))?;
                input.add256(value);
            }
            PlainInput::U32(value) => {
                input.add32(*value);
            }
        }
    }
    let encrypted = input.encrypt().await;

    Ok(Json(EncryptResponse {
        handles: encrypted.handles.iter().map(format_handle).collect(),
        input_proof: format!("0x{}", hex::encode(&encrypted.input_proof)),
    }))
}
