//! End-to-end tests of the HTTP API against the in-process local relayer

use alloy::primitives::Address;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use kyc_registry::config::Config;
use kyc_registry::models::{format_address, parse_handle};
use kyc_registry::services::clock::ManualClock;
use kyc_registry::services::decryption::UserDecryptRequest;
use kyc_registry::AppState;

const NOW: u64 = 1_700_000_000;
const ALICE: Address = Address::repeat_byte(0x01);
const BOB: Address = Address::repeat_byte(0x02);
const CAROL: Address = Address::repeat_byte(0x03);

struct TestApp {
    router: Router,
    owner: Address,
    registry: Address,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn new(toml: &str) -> Self {
        let config = Config::from_toml(toml).unwrap();
        let clock = Arc::new(ManualClock::new(NOW));
        let owner = config.owner_address;
        let registry = config.registry_address;
        let state = AppState::new(config, clock.clone()).unwrap();

        Self {
            router: kyc_registry::app(state),
            owner,
            registry,
            clock,
        }
    }

    async fn call(&self, method: Method, uri: &str, caller: Option<Address>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header("x-caller-address", format_address(&caller));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None, None).await
    }

    async fn post(&self, uri: &str, caller: Address, body: Option<Value>) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(caller), body).await
    }

    /// Encrypted input for (hash, name, nationality, birth year)
    async fn encrypt(&self, user: Address, values: Value) -> (Vec<String>, String) {
        let (status, body) = self
            .post("/api/v1/relayer/encrypt", user, Some(json!({ "values": values })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let handles = body["handles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h.as_str().unwrap().to_string())
            .collect();
        (handles, body["inputProof"].as_str().unwrap().to_string())
    }

    async fn submit_encrypted(&self, user: Address, nationality: u32, birth_year: u32) -> (StatusCode, Value) {
        let (handles, proof) = self
            .encrypt(
                user,
                json!([
                    { "type": "u256", "value": "123456789012345678901234567890" },
                    { "type": "u32", "value": 1001 },
                    { "type": "u32", "value": nationality },
                    { "type": "u32", "value": birth_year },
                ]),
            )
            .await;

        self.post(
            "/api/v1/kyc",
            user,
            Some(json!({
                "identityHash": handles[0],
                "name": handles[1],
                "nationality": handles[2],
                "birthYear": handles[3],
                "inputProof": proof,
            })),
        )
        .await
    }

    async fn status_of(&self, user: Address) -> Value {
        let (status, body) = self.get(&format!("/api/v1/kyc/{}", format_address(&user))).await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    async fn decrypt(&self, caller: Address, handles: &[String], start: u64, days: u64) -> (StatusCode, Value) {
        let request = UserDecryptRequest {
            requester: caller,
            registry: self.registry,
            handles: handles.iter().map(|h| parse_handle(h).unwrap()).collect(),
            start_timestamp: start,
            duration_days: days,
            signature: vec![],
        };
        let signature = format!("0x{}", hex::encode(request.digest()));

        self.post(
            "/api/v1/decrypt",
            caller,
            Some(json!({
                "handles": handles,
                "startTimestamp": start,
                "durationDays": days,
                "signature": signature,
            })),
        )
        .await
    }
}

#[tokio::test]
async fn test_submit_verify_lifecycle() {
    let app = TestApp::new("");

    let status = app.status_of(ALICE).await;
    assert_eq!(status["hasRecord"], false);

    let (code, body) = app.submit_encrypted(ALICE, 86, 1990).await;
    assert_eq!(code, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["submittedAt"], NOW);

    let status = app.status_of(ALICE).await;
    assert_eq!(status["hasRecord"], true);
    assert_eq!(status["status"], "pending");
    assert_eq!(status["statusCode"], 0);
    assert_eq!(status["submittedAt"], NOW);
    assert_eq!(status["verified"], false);

    app.clock.advance(3600);
    let uri = format!("/api/v1/kyc/{}/verify", format_address(&ALICE));
    let (code, body) = app.post(&uri, app.owner, None).await;
    assert_eq!(code, StatusCode::OK, "{body}");
    assert_eq!(body["oldStatus"], "pending");
    assert_eq!(body["newStatus"], "verified");

    // Submission time never changes
    let status = app.status_of(ALICE).await;
    assert_eq!(status["status"], "verified");
    assert_eq!(status["statusCode"], 1);
    assert_eq!(status["submittedAt"], NOW);
    assert_eq!(status["verified"], true);

    let (code, body) = app.post(&uri, app.owner, None).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "InvalidTransition");
}

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let app = TestApp::new("");
    let (code, _) = app.submit_encrypted(ALICE, 86, 1990).await;
    assert_eq!(code, StatusCode::CREATED);

    let (code, body) = app.submit_encrypted(ALICE, 156, 1985).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "DuplicateSubmission");

    let (_, users) = app.get("/api/v1/registry/users").await;
    assert_eq!(users["count"], 1);

    let (_, events) = app.get("/api/v1/registry/events").await;
    assert_eq!(events["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_owner_cannot_review() {
    let app = TestApp::new("");
    app.submit_encrypted(ALICE, 86, 1990).await;

    for action in ["verify", "reject"] {
        let uri = format!("/api/v1/kyc/{}/{}", format_address(&ALICE), action);
        let (code, body) = app.post(&uri, BOB, None).await;
        assert_eq!(code, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "Unauthorized");
    }

    assert_eq!(app.status_of(ALICE).await["status"], "pending");
}

#[tokio::test]
async fn test_review_without_record() {
    let app = TestApp::new("");
    let uri = format!("/api/v1/kyc/{}/reject", format_address(&CAROL));
    let (code, body) = app.post(&uri, app.owner, None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NoRecord");
}

#[tokio::test]
async fn test_new_owner_can_reject_own_record() {
    let app = TestApp::new("");
    app.submit_encrypted(BOB, 2, 1985).await;

    let (code, body) = app
        .post(
            "/api/v1/registry/owner",
            app.owner,
            Some(json!({ "newOwner": format_address(&BOB) })),
        )
        .await;
    assert_eq!(code, StatusCode::OK, "{body}");
    assert_eq!(body["owner"], format_address(&BOB));

    let (_, owner) = app.get("/api/v1/registry/owner").await;
    assert_eq!(owner["owner"], format_address(&BOB));

    // The old owner is now just another account
    let uri = format!("/api/v1/kyc/{}/reject", format_address(&BOB));
    let (code, _) = app.post(&uri, app.owner, None).await;
    assert_eq!(code, StatusCode::FORBIDDEN);

    let (code, body) = app.post(&uri, BOB, None).await;
    assert_eq!(code, StatusCode::OK, "{body}");
    assert_eq!(app.status_of(BOB).await["status"], "rejected");
}

#[tokio::test]
async fn test_transfer_to_zero_address_is_invalid() {
    let app = TestApp::new("");
    for caller in [app.owner, ALICE] {
        let (code, body) = app
            .post(
                "/api/v1/registry/owner",
                caller,
                Some(json!({ "newOwner": format_address(&Address::ZERO) })),
            )
            .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "InvalidArgument");
    }

    let (_, owner) = app.get("/api/v1/registry/owner").await;
    assert_eq!(owner["owner"], format_address(&app.owner));
}

#[tokio::test]
async fn test_tampered_and_replayed_proofs() {
    let app = TestApp::new("");
    let (handles, proof) = app
        .encrypt(
            ALICE,
            json!([
                { "type": "u256", "value": "42" },
                { "type": "u32", "value": 1001 },
                { "type": "u32", "value": 86 },
                { "type": "u32", "value": 1990 },
            ]),
        )
        .await;

    let body = json!({
        "identityHash": handles[0],
        "name": handles[1],
        "nationality": handles[2],
        "birthYear": handles[3],
        "inputProof": proof,
    });

    // Alice's ciphertexts submitted by Bob
    let (code, resp) = app.post("/api/v1/kyc", BOB, Some(body.clone())).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    assert_eq!(resp["kind"], "InvalidProof");

    // Fields swapped after the proof was made
    let mut swapped = body.clone();
    swapped["nationality"] = body["birthYear"].clone();
    swapped["birthYear"] = body["nationality"].clone();
    let (code, _) = app.post("/api/v1/kyc", ALICE, Some(swapped)).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);

    assert_eq!(app.status_of(ALICE).await["hasRecord"], false);
    assert_eq!(app.status_of(BOB).await["hasRecord"], false);
    let (_, events) = app.get("/api/v1/registry/events").await;
    assert!(events["events"].as_array().unwrap().is_empty());

    let (code, _) = app.post("/api/v1/kyc", ALICE, Some(body)).await;
    assert_eq!(code, StatusCode::CREATED);
}

#[tokio::test]
async fn test_counts_and_enumeration() {
    let app = TestApp::new("");
    for user in [ALICE, BOB, CAROL] {
        let (code, _) = app.submit_encrypted(user, 1, 1990).await;
        assert_eq!(code, StatusCode::CREATED);
    }

    let (_, pending) = app.get("/api/v1/registry/pending-count").await;
    assert_eq!(pending["pending"], 3);

    app.post(&format!("/api/v1/kyc/{}/verify", format_address(&ALICE)), app.owner, None)
        .await;
    app.post(&format!("/api/v1/kyc/{}/reject", format_address(&CAROL)), app.owner, None)
        .await;

    let (_, pending) = app.get("/api/v1/registry/pending-count").await;
    assert_eq!(pending["pending"], 1);

    let (_, users) = app.get("/api/v1/registry/users").await;
    assert_eq!(users["count"], 3);
    assert_eq!(
        users["users"],
        json!([format_address(&ALICE), format_address(&BOB), format_address(&CAROL)])
    );
}

#[tokio::test]
async fn test_event_polling() {
    let app = TestApp::new("");
    app.submit_encrypted(ALICE, 86, 1990).await;
    app.post(&format!("/api/v1/kyc/{}/verify", format_address(&ALICE)), app.owner, None)
        .await;

    let (_, all) = app.get("/api/v1/registry/events").await;
    assert_eq!(all["latest"], 2);
    assert_eq!(all["events"][0]["kind"], "submitted");
    assert_eq!(all["events"][0]["timestamp"], NOW);
    assert_eq!(all["events"][1]["kind"], "status_changed");
    assert_eq!(all["events"][1]["oldStatus"], "pending");
    assert_eq!(all["events"][1]["newStatus"], "verified");

    let (_, newer) = app.get("/api/v1/registry/events?since=1").await;
    assert_eq!(newer["events"].as_array().unwrap().len(), 1);
    assert_eq!(newer["events"][0]["seq"], 2);

    let (_, none) = app.get("/api/v1/registry/events?since=2").await;
    assert!(none["events"].as_array().unwrap().is_empty());
    assert_eq!(none["latest"], 2);

    // A cursor past the head still reports the real head
    let (_, ahead) = app.get("/api/v1/registry/events?since=9").await;
    assert!(ahead["events"].as_array().unwrap().is_empty());
    assert_eq!(ahead["latest"], 2);
}

#[tokio::test]
async fn test_user_decryption() {
    let app = TestApp::new("");
    app.submit_encrypted(ALICE, 86, 1990).await;

    let (_, data) = app.get(&format!("/api/v1/kyc/{}/data", format_address(&ALICE))).await;
    assert_eq!(data["fieldMode"], "encrypted");
    let handles = vec![
        data["nationality"].as_str().unwrap().to_string(),
        data["birthYear"].as_str().unwrap().to_string(),
    ];

    let (code, body) = app.decrypt(ALICE, &handles, NOW - 60, 10).await;
    assert_eq!(code, StatusCode::OK, "{body}");
    assert_eq!(body["values"][&handles[0]], "86");
    assert_eq!(body["values"][&handles[1]], "1990");

    // The owner at submission time was granted access too
    let (code, _) = app.decrypt(app.owner, &handles, NOW, 1).await;
    assert_eq!(code, StatusCode::OK);

    let (code, body) = app.decrypt(CAROL, &handles, NOW, 1).await;
    assert_eq!(code, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Unauthorized");

    // Window already closed
    let (code, _) = app.decrypt(ALICE, &handles, NOW - 2 * 86_400, 1).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    // Longer than the configured maximum
    let (code, _) = app.decrypt(ALICE, &handles, NOW, 366).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_decryption_rejects_foreign_signature() {
    let app = TestApp::new("");
    app.submit_encrypted(ALICE, 86, 1990).await;
    let (_, data) = app.get(&format!("/api/v1/kyc/{}/data", format_address(&ALICE))).await;
    let handle = data["nationality"].as_str().unwrap().to_string();

    let (code, body) = app
        .post(
            "/api/v1/decrypt",
            ALICE,
            Some(json!({
                "handles": [handle],
                "startTimestamp": NOW,
                "durationDays": 1,
                "signature": format!("0x{}", "00".repeat(65)),
            })),
        )
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidDecryptRequest");
}

#[tokio::test]
async fn test_plaintext_mode_with_documents() {
    let app = TestApp::new(r#"kyc_field_mode = "plaintext""#);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/documents")
        .body(Body::from(&b"passport scan"[..]))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let upload: Value = serde_json::from_slice(&bytes).unwrap();
    let cid = upload["cid"].as_str().unwrap().to_string();
    assert!(cid.starts_with("Qm"));
    assert_eq!(upload["size"], 13);

    let (handles, proof) = app
        .encrypt(
            ALICE,
            json!([
                { "type": "u32", "value": 86 },
                { "type": "u32", "value": 1990 },
            ]),
        )
        .await;

    // Plaintext fields cannot be empty
    let (code, body) = app
        .post(
            "/api/v1/kyc",
            ALICE,
            Some(json!({
                "identityHash": cid,
                "name": "",
                "nationality": handles[0],
                "birthYear": handles[1],
                "inputProof": proof,
            })),
        )
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST, "{body}");

    let (code, body) = app
        .post(
            "/api/v1/kyc",
            ALICE,
            Some(json!({
                "identityHash": cid,
                "name": "Alice Example",
                "nationality": handles[0],
                "birthYear": handles[1],
                "inputProof": proof,
            })),
        )
        .await;
    assert_eq!(code, StatusCode::CREATED, "{body}");

    let (_, data) = app.get(&format!("/api/v1/kyc/{}/data", format_address(&ALICE))).await;
    assert_eq!(data["fieldMode"], "plaintext");
    assert_eq!(data["identityHash"], cid);
    assert_eq!(data["name"], "Alice Example");
    assert_eq!(
        data["documentUrl"],
        format!("https://gateway.pinata.cloud/ipfs/{}", cid)
    );

    let (code, _) = app.get(&format!("/api/v1/documents/{}", cid)).await;
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn test_encrypt_value_limit() {
    let app = TestApp::new("");
    let values: Vec<Value> = (0..17).map(|_| json!({ "type": "u32", "value": 1 })).collect();

    let (code, body) = app
        .post("/api/v1/relayer/encrypt", ALICE, Some(json!({ "values": values })))
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidArgument");

    let (handles, _) = app.encrypt(ALICE, Value::Array(values[..16].to_vec())).await;
    assert_eq!(handles.len(), 16);
}

#[tokio::test]
async fn test_unreachable_relayer() {
    // Nothing listens on the discard port
    let app = TestApp::new(r#"relayer_url = "http://127.0.0.1:9""#);

    let (_, health) = app.get("/health").await;
    assert_eq!(health["localRelayer"], false);

    let (code, body) = app
        .post("/api/v1/relayer/encrypt", ALICE, Some(json!({ "values": [{ "type": "u32", "value": 1 }] })))
        .await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotAvailable");

    let handle = |byte: u8| format!("0x{}", format!("{:02x}", byte).repeat(32));
    let (code, body) = app
        .post(
            "/api/v1/kyc",
            ALICE,
            Some(json!({
                "identityHash": handle(0x11),
                "name": handle(0x22),
                "nationality": handle(0x33),
                "birthYear": handle(0x44),
                "inputProof": "0xab",
            })),
        )
        .await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE, "{body}");
    assert_eq!(body["kind"], "VerifierUnavailable");
    assert_eq!(app.status_of(ALICE).await["hasRecord"], false);
}

#[tokio::test]
async fn test_missing_caller_header() {
    let app = TestApp::new("");
    let (code, body) = app
        .call(
            Method::POST,
            "/api/v1/registry/owner",
            None,
            Some(json!({ "newOwner": format_address(&ALICE) })),
        )
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "BadRequest");
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new("");
    let (code, body) = app.get("/health").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["registry"], format_address(&app.registry));
    assert_eq!(body["owner"], format_address(&app.owner));
    assert_eq!(body["localRelayer"], true);
}
