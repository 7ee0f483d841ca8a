//! Segregated witness: weight accounting and the coinbase witness commitment

use crate::constants::{BLOCK_HEADER_SIZE, WITNESS_SCALE_FACTOR};
use crate::encoding::{encode_varint, serialize_transaction};
use crate::error::RejectCode;
use crate::hash::{combine, hash_to_hex};
use crate::merkle::block_witness_merkle_root;
use crate::types::*;
use tracing::debug;

/// `OP_RETURN`, push 36 bytes, then the 4-byte commitment tag
pub const WITNESS_COMMITMENT_HEADER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// Length of a commitment output script: header plus 32-byte commitment
const WITNESS_COMMITMENT_SCRIPT_LEN: usize = WITNESS_COMMITMENT_HEADER.len() + 32;

/// Calculate transaction weight
/// Weight(tx) = (4 - 1) × |Serialize(tx ∖ witness)| + |Serialize(tx)|
pub fn calculate_transaction_weight(tx: &Transaction) -> Natural {
    let base_size = serialize_transaction(tx, false).len() as Natural;
    let total_size = serialize_transaction(tx, true).len() as Natural;
    base_size * (WITNESS_SCALE_FACTOR - 1) + total_size
}

/// Block weight: header and transaction count count at full scale, plus
/// every transaction's weight
pub fn calculate_block_weight(block: &Block) -> Natural {
    let framing = (BLOCK_HEADER_SIZE + encode_varint(block.transactions.len() as u64).len()) as Natural;
    block
        .transactions
        .iter()
        .fold(framing * WITNESS_SCALE_FACTOR, |acc, tx| {
            acc.saturating_add(calculate_transaction_weight(tx))
        })
}

/// Commitment value: `SHA256d(witness_root || reserved_value)`
pub fn witness_commitment(witness_root: &Hash, reserved_value: &Hash) -> Hash {
    combine(witness_root, reserved_value)
}

/// Index of the last coinbase output carrying a witness commitment
pub fn find_witness_commitment(coinbase: &Transaction) -> Option<usize> {
    coinbase.outputs.iter().rposition(|output| {
        output.script_pubkey.len() >= WITNESS_COMMITMENT_SCRIPT_LEN
            && output.script_pubkey.starts_with(&WITNESS_COMMITMENT_HEADER)
    })
}

/// Build the coinbase output script committing to `commitment`
pub fn witness_commitment_script(commitment: &Hash) -> ByteString {
    let mut script = WITNESS_COMMITMENT_HEADER.to_vec();
    script.extend_from_slice(commitment);
    script
}

/// Check the coinbase witness commitment against the block's witness root.
///
/// Without a commitment no transaction may carry witness data. With one, the
/// coinbase witness must be a single 32-byte reserved value and the commitment
/// must equal `SHA256d(witness_root || reserved_value)`.
pub fn check_witness_commitment(block: &Block) -> ValidationResult {
    let Some(coinbase) = block.transactions.first() else {
        return ValidationResult::Valid;
    };

    let Some(position) = find_witness_commitment(coinbase) else {
        if let Some(index) = block.transactions.iter().position(|tx| tx.has_witness()) {
            debug!("witness data in transaction {} without a commitment", index);
            return ValidationResult::invalid(
                RejectCode::UnexpectedWitness,
                format!("transaction {} carries witness data", index),
            );
        }
        return ValidationResult::Valid;
    };

    let reserved_value = match coinbase.inputs.first().map(|input| input.witness.as_slice()) {
        Some([item]) if item.len() == 32 => {
            let mut value = [0u8; 32];
            value.copy_from_slice(item);
            value
        }
        _ => {
            return ValidationResult::invalid(
                RejectCode::WitnessNonceSize,
                "coinbase witness must be a single 32-byte value",
            )
        }
    };

    let witness_root = block_witness_merkle_root(block).root;
    let expected = witness_commitment(&witness_root, &reserved_value);
    let script = &coinbase.outputs[position].script_pubkey;
    let committed = &script[WITNESS_COMMITMENT_HEADER.len()..WITNESS_COMMITMENT_SCRIPT_LEN];

    if committed != &expected[..] {
        debug!(
            "witness commitment mismatch: expected {}",
            hash_to_hex(&expected)
        );
        return ValidationResult::invalid(
            RejectCode::WitnessMerkleMismatch,
            format!("witness root {}", hash_to_hex(&witness_root)),
        );
    }

    ValidationResult::Valid
}
