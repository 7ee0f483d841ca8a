//! Error types for consensus validation
//!
//! Two layers: [`ConsensusError`] reports a broken caller contract (unknown
//! block ids, undecodable bytes, coins that were promised but are absent),
//! while [`Rejection`] is the verdict returned when untrusted data violates a
//! protocol rule.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ConsensusError {
    #[error("Transaction validation failed: {0}")]
    TransactionValidation(Cow<'static, str>),

    #[error("Block validation failed: {0}")]
    BlockValidation(Cow<'static, str>),

    #[error("UTXO not found: {0}")]
    UtxoNotFound(Cow<'static, str>),

    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    #[error("Consensus rule violation: {0}")]
    ConsensusRuleViolation(Cow<'static, str>),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Broad class of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectKind {
    /// A protocol rule was violated.
    Invalid,
    /// The data could not be interpreted (e.g. a tampered partial Merkle proof).
    Malformed,
    /// A timing or sequence constraint is not yet met; may become valid later.
    NotFinal,
}

/// Machine-readable reason code attached to every rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectCode {
    // Context-free transaction structure
    EmptyInputs,
    EmptyOutputs,
    Oversize,
    NegativeOutput,
    OutputTooLarge,
    OutputTotalTooLarge,
    DuplicateInputs,
    BadCoinbaseLength,
    NullPrevout,

    // Inputs against the coin view
    MissingInputs,
    PrematureSpend,
    InputValuesOutOfRange,
    InBelowOut,
    FeeOutOfRange,

    // Timing
    NonFinal,
    SequenceLocks,

    // Resource accounting
    SigOpCost,
    BlockWeight,

    // Block structure and linkage
    BadBlockLength,
    MissingCoinbase,
    MultipleCoinbase,
    MerkleRootMismatch,
    MutatedMerkle,
    HeaderHashMismatch,
    BadPrevBlock,
    WitnessMerkleMismatch,
    WitnessNonceSize,
    UnexpectedWitness,

    // Proofs
    MalformedProof,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::EmptyInputs => "bad-txns-vin-empty",
            RejectCode::EmptyOutputs => "bad-txns-vout-empty",
            RejectCode::Oversize => "bad-txns-oversize",
            RejectCode::NegativeOutput => "bad-txns-vout-negative",
            RejectCode::OutputTooLarge => "bad-txns-vout-toolarge",
            RejectCode::OutputTotalTooLarge => "bad-txns-txouttotal-toolarge",
            RejectCode::DuplicateInputs => "bad-txns-inputs-duplicate",
            RejectCode::BadCoinbaseLength => "bad-cb-length",
            RejectCode::NullPrevout => "bad-txns-prevout-null",
            RejectCode::MissingInputs => "bad-txns-inputs-missingorspent",
            RejectCode::PrematureSpend => "bad-txns-premature-spend-of-coinbase",
            RejectCode::InputValuesOutOfRange => "bad-txns-inputvalues-outofrange",
            RejectCode::InBelowOut => "bad-txns-in-belowout",
            RejectCode::FeeOutOfRange => "bad-txns-fee-outofrange",
            RejectCode::NonFinal => "bad-txns-nonfinal",
            RejectCode::SequenceLocks => "bad-txns-nonBIP68-final",
            RejectCode::SigOpCost => "bad-blk-sigops",
            RejectCode::BlockWeight => "bad-blk-weight",
            RejectCode::BadBlockLength => "bad-blk-length",
            RejectCode::MissingCoinbase => "bad-cb-missing",
            RejectCode::MultipleCoinbase => "bad-cb-multiple",
            RejectCode::MerkleRootMismatch => "bad-txnmrklroot",
            RejectCode::MutatedMerkle => "bad-txns-duplicate",
            RejectCode::HeaderHashMismatch => "bad-header-hash",
            RejectCode::BadPrevBlock => "bad-prevblk",
            RejectCode::WitnessMerkleMismatch => "bad-witness-merkle-match",
            RejectCode::WitnessNonceSize => "bad-witness-nonce-size",
            RejectCode::UnexpectedWitness => "unexpected-witness",
            RejectCode::MalformedProof => "bad-merkle-proof",
        }
    }

    pub fn kind(&self) -> RejectKind {
        match self {
            RejectCode::NonFinal | RejectCode::SequenceLocks => RejectKind::NotFinal,
            RejectCode::MalformedProof => RejectKind::Malformed,
            _ => RejectKind::Invalid,
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged failure: reason code plus free-text detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectCode,
    pub detail: String,
}

impl Rejection {
    pub fn new(code: RejectCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> RejectKind {
        self.code.kind()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_code_kinds() {
        assert_eq!(RejectCode::InBelowOut.kind(), RejectKind::Invalid);
        assert_eq!(RejectCode::SequenceLocks.kind(), RejectKind::NotFinal);
        assert_eq!(RejectCode::NonFinal.kind(), RejectKind::NotFinal);
        assert_eq!(RejectCode::MalformedProof.kind(), RejectKind::Malformed);
    }

    #[test]
    fn test_rejection_display() {
        let bare = Rejection::new(RejectCode::FeeOutOfRange, "");
        assert_eq!(bare.to_string(), "bad-txns-fee-outofrange");

        let detailed = Rejection::new(RejectCode::PrematureSpend, "depth 50");
        assert_eq!(
            detailed.to_string(),
            "bad-txns-premature-spend-of-coinbase (depth 50)"
        );
    }
}
