//! Cryptographic primitives for sealed record issuance.
//!
//! Provides SHA-256 content hashing, audit hash-chain verification, and
//! Ed25519 signing for locally generated fallback proofs.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod chain;
pub mod hasher;
pub mod signer;

pub use chain::{push_field, ChainError, ChainLink, HashChainVerifier, GENESIS_HASH};
pub use hasher::{ContentHasher, HasherError};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
