//! Crypto module: key derivation, addresses, signing, verification, hashing.
//!
//! - Keys: passphrase-derived ed25519 keypairs, hex public keys
//! - Address: numeric account address derived from a public key
//! - Sign: Ed25519 signatures

pub mod keys;
pub mod sign;
pub mod hash;

use thiserror::Error;

pub use keys::{Address, Keypair, PublicKey};
pub use sign::{Signature, Signer, Verifier};
pub use hash::{sha256, Hash32};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("signature verification failed")]
    VerificationFailed,
}
