//! Registry service and the external collaborators it depends on

pub mod clock;
pub mod decryption;
pub mod ipfs;
pub mod local_relayer;
pub mod registry;
pub mod verifier;
