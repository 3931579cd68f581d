//! Command line client for the confidential KYC registry
//!
//! Covers the whole lifecycle against a running `kyc-server`:
//! 1. Upload an identity document (mock IPFS)
//! 2. Encrypt and submit the KYC fields
//! 3. Review as the registry owner
//! 4. Decrypt your own fields with a time-boxed request

use alloy_primitives::{keccak256, Address, B256, U256};
use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Used when an encrypted-mode name carries no digits
const DEFAULT_NAME_CODE: u32 = 123_456_789;

const CALLER_HEADER: &str = "X-Caller-Address";

#[derive(Parser)]
#[command(name = "kyc")]
#[command(about = "Confidential KYC registry client")]
struct Cli {
    /// KYC registry server URL
    #[arg(long, env = "KYC_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Account the requests are sent as
    #[arg(long, env = "KYC_ADDRESS")]
    from: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt and submit KYC information for --from
    Submit {
        /// Name (digits only are kept in encrypted mode)
        #[arg(long)]
        name: String,

        /// Nationality code (1 USA, 2 China, 3 UK, 4 Germany, 5 France, 86 Other)
        #[arg(long)]
        nationality: u32,

        #[arg(long)]
        birth_year: u32,

        /// Identity document hash: a decimal number in encrypted mode, a CID in plaintext mode
        #[arg(long, conflicts_with = "document")]
        hash: Option<String>,

        /// Identity document to upload first
        #[arg(long)]
        document: Option<PathBuf>,
    },

    /// Show the KYC status of a user
    Status {
        #[arg(short, long)]
        user: String,
    },

    /// Verify a pending KYC (owner only)
    Verify {
        #[arg(short, long)]
        user: String,
    },

    /// Reject a pending KYC (owner only)
    Reject {
        #[arg(short, long)]
        user: String,
    },

    /// Number of pending applications
    Pending,

    /// List all registered users with their status
    List,

    /// Show the registry owner
    Owner,

    /// Hand the registry to a new owner (owner only)
    TransferOwner {
        #[arg(long)]
        new_owner: String,
    },

    /// Upload an identity document to the mock IPFS store
    Upload {
        path: PathBuf,
    },

    /// Decrypt the stored KYC fields of a user
    Decrypt {
        /// Defaults to --from
        #[arg(short, long)]
        user: Option<String>,

        /// Validity of the decryption request
        #[arg(long, default_value = "10")]
        days: u64,
    },

    /// Show registry notifications
    Events {
        #[arg(long, default_value = "0")]
        since: u64,
    },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    chain_id: u64,
    registry: String,
    field_mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KycStatus {
    address: String,
    has_record: bool,
    status: String,
    submitted_at: u64,
    verified: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KycData {
    field_mode: String,
    identity_hash: String,
    name: String,
    nationality: String,
    birth_year: String,
    document_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusChange {
    address: String,
    old_status: String,
    new_status: String,
}

#[derive(Debug, Deserialize)]
struct PendingCount {
    pending: usize,
}

#[derive(Debug, Deserialize)]
struct RegisteredUsers {
    count: usize,
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    owner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnershipTransfer {
    previous_owner: String,
    owner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Upload {
    cid: String,
    size: usize,
    gateway_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedInput {
    handles: Vec<String>,
    input_proof: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    identity_hash: String,
    name: String,
    nationality: String,
    birth_year: String,
    input_proof: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Submitted {
    status: String,
    submitted_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest {
    handles: Vec<String>,
    start_timestamp: u64,
    duration_days: u64,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct Decrypted {
    values: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Events {
    latest: u64,
    events: Vec<serde_json::Value>,
}

struct KycClient {
    client: Client,
    server: String,
    from: Option<Address>,
}

impl KycClient {
    fn new(server: &str, from: Option<&str>) -> Result<Self> {
        let from = from
            .map(|a| a.parse::<Address>().with_context(|| format!("Invalid --from address: {}", a)))
            .transpose()?;

        Ok(Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
            from,
        })
    }

    fn caller(&self) -> Result<Address> {
        self.from
            .context("This command needs an account: pass --from or set KYC_ADDRESS")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn signed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.header(CALLER_HEADER, self.caller()?.to_checksum(None)))
    }

    async fn read<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => bail!("{} ({}): {}", body.kind, status.as_u16(), body.error),
                Err(e) => {
                    tracing::debug!("Error body is not JSON: {}", e);
                    bail!("Request failed with {}: {}", status, text)
                }
            }
        }
        Ok(resp.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!("GET {}", path);
        let resp = self.client.get(self.url(path)).send().await?;
        Self::read(resp).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        tracing::debug!("POST {}", path);
        let resp = self
            .signed(self.client.post(self.url(path)))?
            .json(body)
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.signed(self.client.post(self.url(path)))?.send().await?;
        Self::read(resp).await
    }

    async fn health(&self) -> Result<Health> {
        self.get("/health").await
    }

    async fn status(&self, user: &str) -> Result<KycStatus> {
        self.get(&format!("/api/v1/kyc/{}", user)).await
    }

    async fn data(&self, user: &str) -> Result<KycData> {
        self.get(&format!("/api/v1/kyc/{}/data", user)).await
    }

    async fn upload(&self, path: &Path) -> Result<Upload> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let resp = self
            .client
            .post(self.url("/api/v1/documents"))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn encrypt(&self, values: Vec<serde_json::Value>) -> Result<EncryptedInput> {
        self.post("/api/v1/relayer/encrypt", &json!({ "values": values }))
            .await
            .context("Encryption failed (the server must run the local relayer)")
    }

    async fn submit(
        &self,
        name: &str,
        nationality: u32,
        birth_year: u32,
        hash: Option<String>,
        document: Option<PathBuf>,
    ) -> Result<Submitted> {
        let caller = self.caller()?;
        let health = self.health().await?;
        println!("\n[*] Submitting KYC for {}", caller);
        println!("    Registry:   {} (chain {})", health.registry, health.chain_id);
        println!("    Field mode: {}", health.field_mode);

        let cid = match &document {
            Some(path) => {
                println!("\n[1] Uploading identity document {}", path.display());
                let upload = self.upload(path).await?;
                println!("    CID: {} ({} bytes)", upload.cid, upload.size);
                Some(upload.cid)
            }
            None => None,
        };

        let encrypted_mode = health.field_mode == "encrypted";
        let mut values = Vec::with_capacity(4);
        let (identity_hash, plain_name) = if encrypted_mode {
            let identity = match (hash, &cid) {
                (Some(hash), _) => U256::from_str_radix(hash.trim(), 10)
                    .with_context(|| format!("--hash must be a decimal number: {}", hash))?,
                (None, Some(cid)) => identity_value(cid),
                (None, None) => bail!("Pass --hash or --document"),
            };
            values.push(json!({ "type": "u256", "value": identity.to_string() }));
            values.push(json!({ "type": "u32", "value": name_code(name) }));
            (None, None)
        } else {
            let identity = cid.or(hash).context("Pass --hash or --document")?;
            (Some(identity), Some(name.trim().to_string()))
        };
        values.push(json!({ "type": "u32", "value": nationality }));
        values.push(json!({ "type": "u32", "value": birth_year }));

        println!("\n[2] Encrypting {} values", values.len());
        let input = self.encrypt(values).await?;
        let mut handles = input.handles.into_iter();
        let mut next = || handles.next().context("Relayer returned too few handles");

        let request = SubmitRequest {
            identity_hash: match identity_hash {
                Some(identity) => identity,
                None => next()?,
            },
            name: match plain_name {
                Some(name) => name,
                None => next()?,
            },
            nationality: next()?,
            birth_year: next()?,
            input_proof: input.input_proof,
        };

        println!("\n[3] Sending submission");
        self.post("/api/v1/kyc", &request).await
    }

    async fn decrypt(&self, user: &str, days: u64) -> Result<()> {
        let caller = self.caller()?;
        let health = self.health().await?;
        let registry: Address = health.registry.parse().context("Server sent an invalid registry address")?;

        let status = self.status(user).await?;
        if !status.has_record {
            bail!("No KYC record found for user: {}", user);
        }
        let data = self.data(user).await?;

        let mut fields = Vec::with_capacity(4);
        if data.field_mode == "encrypted" {
            fields.push(("Identity hash", data.identity_hash.clone()));
            fields.push(("Name", data.name.clone()));
        }
        fields.push(("Nationality", data.nationality.clone()));
        fields.push(("Birth year", data.birth_year.clone()));

        let handles = fields
            .iter()
            .map(|(_, h)| h.parse::<B256>().with_context(|| format!("Invalid handle: {}", h)))
            .collect::<Result<Vec<_>>>()?;

        let start_timestamp = Utc::now().timestamp().max(0) as u64;
        let signature = decrypt_digest(caller, registry, start_timestamp, days, &handles);

        let request = DecryptRequest {
            handles: fields.iter().map(|(_, h)| h.clone()).collect(),
            start_timestamp,
            duration_days: days,
            signature: format!("0x{}", hex::encode(signature)),
        };
        let decrypted: Decrypted = self.post("/api/v1/decrypt", &request).await?;

        println!("Decrypted KYC data for {}:", status.address);
        if data.field_mode != "encrypted" {
            println!("  Identity hash: {}", data.identity_hash);
            println!("  Name:          {}", data.name);
        }
        for (label, handle) in &fields {
            let value = match decrypted.values.get(handle) {
                Some(value) => value.as_str(),
                None => {
                    tracing::warn!("No decrypted value returned for {} ({})", label, handle);
                    "?"
                }
            };
            if *label == "Nationality" {
                println!(
                    "  {:<14} {} ({})",
                    format!("{}:", label),
                    value,
                    describe_nationality(value)
                );
            } else {
                println!("  {:<14} {}", format!("{}:", label), value);
            }
        }
        if let Some(url) = data.document_url {
            println!("  Document:      {}", url);
        }
        Ok(())
    }
}

/// keccak256(requester ‖ registry ‖ start ‖ duration ‖ handles…), the
/// message a wallet signs for user decryption
fn decrypt_digest(
    requester: Address,
    registry: Address,
    start_timestamp: u64,
    duration_days: u64,
    handles: &[B256],
) -> B256 {
    let mut buf = Vec::with_capacity(20 + 20 + 8 + 8 + 32 * handles.len());
    buf.extend_from_slice(requester.as_slice());
    buf.extend_from_slice(registry.as_slice());
    buf.extend_from_slice(&start_timestamp.to_be_bytes());
    buf.extend_from_slice(&duration_days.to_be_bytes());
    for handle in handles {
        buf.extend_from_slice(handle.as_slice());
    }
    keccak256(&buf)
}

/// Numeric identity hash derived from a document CID
fn identity_value(cid: &str) -> U256 {
    let digest = Sha256::digest(cid.as_bytes());
    U256::from_be_slice(&digest)
}

/// Names are encrypted as a 32-bit number built from their digits
fn name_code(name: &str) -> u32 {
    let digits: String = name.chars().filter(char::is_ascii_digit).take(9).collect();
    digits.parse().unwrap_or(DEFAULT_NAME_CODE)
}

fn nationality_name(code: u32) -> Option<&'static str> {
    match code {
        1 => Some("USA"),
        2 => Some("China"),
        3 => Some("UK"),
        4 => Some("Germany"),
        5 => Some("France"),
        86 => Some("Other"),
        _ => None,
    }
}

/// Display name for a decrypted nationality value
fn describe_nationality(value: &str) -> &'static str {
    let Ok(code) = value.parse::<u32>() else {
        tracing::warn!("Decrypted nationality is not a number: {}", value);
        return "Unknown";
    };
    nationality_name(code).unwrap_or_else(|| {
        tracing::warn!("Unrecognized nationality code {}", code);
        "Unknown"
    })
}

fn format_timestamp(ts: u64) -> String {
    match Utc.timestamp_opt(ts as i64, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => ts.to_string(),
    }
}

fn capitalize(status: &str) -> String {
    let mut chars = status.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "kyc=warn".into()),
        )
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let client = KycClient::new(&cli.server, cli.from.as_deref())?;

    match cli.command {
        Commands::Submit {
            name,
            nationality,
            birth_year,
            hash,
            document,
        } => {
            let submitted = client
                .submit(&name, nationality, birth_year, hash, document)
                .await?;
            println!("\n[$] KYC submitted successfully!");
            println!("    Status:    {}", capitalize(&submitted.status));
            println!("    Submitted: {}", format_timestamp(submitted.submitted_at));
        }

        Commands::Status { user } => {
            let status = client.status(&user).await?;
            if !status.has_record {
                println!("No KYC record found for user: {}", status.address);
                return Ok(());
            }

            println!("KYC Status for {}:", status.address);
            println!("  Status:    {}", capitalize(&status.status));
            println!("  Verified:  {}", status.verified);
            println!("  Submitted: {}", format_timestamp(status.submitted_at));
        }

        Commands::Verify { user } => {
            println!("Verifying KYC for user: {}", user);
            let change: StatusChange = client
                .post_empty(&format!("/api/v1/kyc/{}/verify", user))
                .await?;
            println!(
                "KYC verified successfully! {}: {} -> {}",
                change.address, change.old_status, change.new_status
            );
        }

        Commands::Reject { user } => {
            println!("Rejecting KYC for user: {}", user);
            let change: StatusChange = client
                .post_empty(&format!("/api/v1/kyc/{}/reject", user))
                .await?;
            println!(
                "KYC rejected successfully! {}: {} -> {}",
                change.address, change.old_status, change.new_status
            );
        }

        Commands::Pending => {
            let count: PendingCount = client.get("/api/v1/registry/pending-count").await?;
            println!("Pending KYC applications: {}", count.pending);
        }

        Commands::List => {
            let users: RegisteredUsers = client.get("/api/v1/registry/users").await?;
            println!("Registered users ({}):\n", users.count);
            println!("{:<44} {:<10} {:<24}", "Address", "Status", "Submitted");
            println!("{}", "-".repeat(78));

            for user in &users.users {
                let status = client.status(user).await?;
                println!(
                    "{:<44} {:<10} {:<24}",
                    status.address,
                    capitalize(&status.status),
                    format_timestamp(status.submitted_at)
                );
            }
        }

        Commands::Owner => {
            let owner: Owner = client.get("/api/v1/registry/owner").await?;
            println!("Registry owner: {}", owner.owner);
        }

        Commands::TransferOwner { new_owner } => {
            let transfer: OwnershipTransfer = client
                .post("/api/v1/registry/owner", &json!({ "newOwner": new_owner }))
                .await?;
            println!("Ownership transferred");
            println!("  Previous owner: {}", transfer.previous_owner);
            println!("  New owner:      {}", transfer.owner);
        }

        Commands::Upload { path } => {
            let upload = client.upload(&path).await?;
            println!("Document uploaded");
            println!("  CID:     {}", upload.cid);
            println!("  Size:    {} bytes", upload.size);
            println!("  Gateway: {}", upload.gateway_url);
        }

        Commands::Decrypt { user, days } => {
            let user = match user {
                Some(user) => user,
                None => client.caller()?.to_checksum(None),
            };
            client.decrypt(&user, days).await?;
        }

        Commands::Events { since } => {
            let events: Events = client.get(&format!("/api/v1/registry/events?since={}", since)).await?;
            for event in &events.events {
                println!("{}", event);
            }
            println!("Latest sequence: {}", events.latest);
        }
    }

    Ok(())
}
