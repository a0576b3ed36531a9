//! Block data model and hash computation.

use crate::error::{LedgerError, LedgerResult};
use crate::validation::validate_structure;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Versioned block hashing scheme.
///
/// Every node must hash with the same scheme for chain verification to
/// mean anything, so a scheme is never changed in place: a new variant is
/// added instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashScheme {
    /// SHA-256 over a domain tag and length-prefixed fields, hex encoded.
    #[default]
    V1,
}

impl HashScheme {
    /// Domain separation tag for this scheme.
    pub fn domain(&self) -> &'static [u8] {
        match self {
            HashScheme::V1 => b"ledgerlink/block/v1",
        }
    }

    /// Computes the hash of a block's content fields.
    ///
    /// Integers are hashed as their decimal text. Each field is preceded
    /// by its byte length as a big-endian u64, so no two distinct field
    /// tuples share an encoding.
    pub fn compute(
        &self,
        index: u64,
        timestamp: i64,
        previous_hash: &str,
        vote_hash: &str,
        signature: &str,
    ) -> String {
        match self {
            HashScheme::V1 => {
                let index = index.to_string();
                let timestamp = timestamp.to_string();
                let fields: [&[u8]; 5] = [
                    index.as_bytes(),
                    timestamp.as_bytes(),
                    previous_hash.as_bytes(),
                    vote_hash.as_bytes(),
                    signature.as_bytes(),
                ];

                let mut hasher = Sha256::new();
                hasher.update(self.domain());
                for field in fields {
                    hasher.update((field.len() as u64).to_be_bytes());
                    hasher.update(field);
                }
                hex::encode(hasher.finalize())
            }
        }
    }
}

/// One immutable, hash-linked ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain, starting at 0.
    pub index: u64,
    /// Creation time in epoch milliseconds. Informational only.
    pub timestamp: i64,
    /// `current_hash` of the block at `index - 1`, empty for genesis.
    pub previous_hash: String,
    /// Content hash of the payload this block commits to.
    pub vote_hash: String,
    /// Producer's signature over the payload.
    pub signature: String,
    /// Hash over all other fields.
    pub current_hash: String,
}

impl Block {
    /// Creates a block and computes its hash with the default scheme.
    pub fn new(
        index: u64,
        timestamp: i64,
        previous_hash: impl Into<String>,
        vote_hash: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            previous_hash: previous_hash.into(),
            vote_hash: vote_hash.into(),
            signature: signature.into(),
            current_hash: String::new(),
        };
        block.current_hash = block.compute_hash();
        block
    }

    /// Creates the genesis block (index 0, empty previous hash).
    pub fn genesis(timestamp: i64, vote_hash: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::new(0, timestamp, String::new(), vote_hash, signature)
    }

    /// Creates the block that follows `self`.
    pub fn next(
        &self,
        timestamp: i64,
        vote_hash: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self::new(
            self.index + 1,
            timestamp,
            self.current_hash.clone(),
            vote_hash,
            signature,
        )
    }

    /// Recomputes this block's hash with the default scheme.
    pub fn compute_hash(&self) -> String {
        self.compute_hash_with(HashScheme::default())
    }

    /// Recomputes this block's hash with a specific scheme.
    pub fn compute_hash_with(&self, scheme: HashScheme) -> String {
        scheme.compute(
            self.index,
            self.timestamp,
            &self.previous_hash,
            &self.vote_hash,
            &self.signature,
        )
    }

    /// Decodes a block from untrusted JSON.
    ///
    /// Performs the structural check first so that a wrong type is reported
    /// as [`LedgerError::InvalidStructure`] rather than a decoder error.
    pub fn from_json(value: &serde_json::Value) -> LedgerResult<Self> {
        if !validate_structure(value) {
            return Err(LedgerError::InvalidStructure(
                "expected numeric index/timestamp and string hash fields".into(),
            ));
        }
        Ok(Self::deserialize(value)?)
    }

    /// Checks the stored hash against a recomputation.
    pub fn verify_hash(&self) -> LedgerResult<()> {
        let computed = self.compute_hash();
        if computed == self.current_hash {
            Ok(())
        } else {
            Err(LedgerError::HashMismatch {
                index: self.index,
                stored: self.current_hash.clone(),
                computed,
            })
        }
    }

    /// Short hash prefix for log lines.
    pub fn short_hash(&self) -> &str {
        let end = self
            .current_hash
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.current_hash.len());
        &self.current_hash[..end]
    }
}
