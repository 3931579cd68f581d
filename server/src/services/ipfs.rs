//! Mock content-addressed document store.
//!
//! The registry only keeps a reference string for the identity document.
//! Documents live here, in memory, under CIDv0-shaped identifiers.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const CID_PREFIX: &str = "Qm";
const CID_BODY_LEN: usize = 44;

/// Deterministic `Qm…` identifier for a document
pub fn mock_cid(bytes: &[u8]) -> String {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);

    let mut cid = String::with_capacity(CID_PREFIX.len() + CID_BODY_LEN);
    cid.push_str(CID_PREFIX);
    for byte in first.iter().chain(second.iter()).take(CID_BODY_LEN) {
        cid.push(BASE58_ALPHABET[*byte as usize % BASE58_ALPHABET.len()] as char);
    }
    cid
}

/// `Qm` followed by 44 base58 characters
pub fn is_valid_cid(cid: &str) -> bool {
    cid.len() == CID_PREFIX.len() + CID_BODY_LEN
        && cid.starts_with(CID_PREFIX)
        && cid[CID_PREFIX.len()..].bytes().all(|b| BASE58_ALPHABET.contains(&b))
}

pub fn gateway_url(gateway: &str, cid: &str) -> String {
    format!("{}/ipfs/{}", gateway.trim_end_matches('/'), cid)
}

#[derive(Debug, Default)]
pub struct MockDocumentStore {
    documents: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bytes: Vec<u8>) -> String {
        let cid = mock_cid(&bytes);
        let size = bytes.len();
        self.documents.write().await.entry(cid.clone()).or_insert(bytes);
        tracing::debug!("Stored document {} ({} bytes)", cid, size);
        cid
    }

    pub async fn get(&self, cid: &str) -> Option<Vec<u8>> {
        self.documents.read().await.get(cid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_cid_shape() {
        let cid = mock_cid(b"passport scan");
        assert_eq!(cid.len(), 46);
        assert!(cid.starts_with("Qm"));
        assert!(is_valid_cid(&cid));
        assert_eq!(cid, mock_cid(b"passport scan"));
        assert_ne!(cid, mock_cid(b"driver license"));
    }

    #[test]
    fn test_cid_validation() {
        assert!(!is_valid_cid(""));
        assert!(!is_valid_cid("Qm123"));
        // 0, O, I and l are not base58
        assert!(!is_valid_cid(&format!("Qm{}", "0".repeat(44))));
        assert!(!is_valid_cid(&format!("Xm{}", "1".repeat(44))));
        assert!(is_valid_cid(&format!("Qm{}", "1".repeat(44))));
    }

    #[test]
    fn test_gateway_url() {
        assert_eq!(
            gateway_url("https://gateway.pinata.cloud/", "QmAbc"),
            "https://gateway.pinata.cloud/ipfs/QmAbc"
        );
    }

    #[tokio::test]
    async fn test_store_roundtrip() {
        let store = MockDocumentStore::new();
        let cid = store.put(b"document".to_vec()).await;
        assert_eq!(store.put(b"document".to_vec()).await, cid);
        assert_eq!(store.get(&cid).await.as_deref(), Some(&b"document"[..]));
        assert_eq!(store.get("QmMissing").await, None);
    }
}
