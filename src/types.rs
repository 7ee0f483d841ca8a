//! Core types for block and transaction validation

use crate::error::{RejectCode, Rejection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hash type: 256-bit digest
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Natural number type
pub type Natural = u64;

/// Integer type
pub type Integer = i64;

/// Witness stack of a single input
pub type Witness = Vec<ByteString>;

/// OutPoint: reference to output `index` of transaction `hash`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: Natural,
}

impl OutPoint {
    /// The outpoint carried by a coinbase input: no prior output.
    pub fn null() -> Self {
        Self {
            hash: [0u8; 32],
            index: 0xffffffff,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == 0xffffffff
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: Natural,
    #[serde(default)]
    pub witness: Witness,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Integer,
    pub script_pubkey: ByteString,
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: Natural,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: Natural,
}

impl Transaction {
    /// True if any input carries witness data
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    /// Sum of output values, saturating on overflow
    pub fn value_out(&self) -> Integer {
        self.outputs
            .iter()
            .fold(0i64, |acc, output| acc.saturating_add(output.value))
    }
}

/// Block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: Integer,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: Natural,
    pub bits: Natural,
    pub nonce: Natural,
}

/// Block: header plus ordered transactions, the first of which is the coinbase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

/// A block as it travels along a chain, together with the header hash it declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlock {
    pub hash: Hash,
    pub block: Block,
}

impl SealedBlock {
    /// Seal a block with its computed header hash
    pub fn seal(block: Block) -> Self {
        let hash = crate::hash::calculate_block_hash(&block.header);
        Self { hash, block }
    }
}

/// Unspent output record held by a coin view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub value: Integer,
    pub script_pubkey: ByteString,
    /// Height of the block that created the output
    pub height: Natural,
    pub is_coinbase: bool,
}

/// UTXO set keyed by outpoint
pub type UtxoSet = HashMap<OutPoint, Coin>;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(Rejection),
}

impl ValidationResult {
    pub fn invalid(code: RejectCode, detail: impl Into<String>) -> Self {
        ValidationResult::Invalid(Rejection::new(code, detail))
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(rejection) => Some(rejection),
        }
    }

    /// Reason code of the rejection, if any
    pub fn code(&self) -> Option<RejectCode> {
        self.rejection().map(|r| r.code)
    }
}
