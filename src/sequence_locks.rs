//! Relative lock times (BIP68)
//!
//! Each enabled input constrains the block that spends it: either a number of
//! blocks after the coin was created, or a number of 512-second intervals
//! after the median time past of the block before the coin's block.

use crate::chain::{BlockId, ChainIndex};
use crate::constants::SEQUENCE_LOCKTIME_GRANULARITY;
use crate::error::{ConsensusError, RejectCode, Result};
use crate::locktime::{is_sequence_disabled, is_time_based_sequence, sequence_lock_value};
use crate::types::*;

/// Last height and last median time past at which the transaction is still
/// locked; `-1` means no constraint of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceLock {
    pub min_height: Integer,
    pub min_time: Integer,
}

impl SequenceLock {
    pub const NONE: SequenceLock = SequenceLock {
        min_height: -1,
        min_time: -1,
    };
}

/// Fold a candidate into a `-1`-initialized minimum
fn fold_min(current: Integer, candidate: Integer) -> Integer {
    if current == -1 {
        candidate
    } else {
        current.min(candidate)
    }
}

/// Derive the lock of `tx` when included in `block`.
///
/// `prev_heights[i]` is the creation height of the coin spent by input `i`.
/// Entries of inputs with relative locks disabled are reset to 0.
pub fn calculate_sequence_locks(
    tx: &Transaction,
    prev_heights: &mut [Natural],
    chain: &ChainIndex,
    block: BlockId,
) -> Result<SequenceLock> {
    if prev_heights.len() != tx.inputs.len() {
        return Err(ConsensusError::TransactionValidation(
            format!(
                "prev_heights length {} does not match input count {}",
                prev_heights.len(),
                tx.inputs.len()
            )
            .into(),
        ));
    }

    let mut lock = SequenceLock::NONE;

    for (input, prev_height) in tx.inputs.iter().zip(prev_heights.iter_mut()) {
        if is_sequence_disabled(input.sequence) {
            *prev_height = 0;
            continue;
        }

        let coin_height = *prev_height;
        let value = sequence_lock_value(input.sequence);

        if is_time_based_sequence(input.sequence) {
            // Nothing precedes a coin created at genesis
            let coin_time = match coin_height.checked_sub(1) {
                None => 0,
                Some(height) => {
                    let ancestor = chain.ancestor(block, height)?.ok_or_else(|| {
                        ConsensusError::TransactionValidation(
                            format!("coin height {} is above the spending block", coin_height)
                                .into(),
                        )
                    })?;
                    chain.median_time_past(ancestor)? as Integer
                }
            };
            let required = coin_time + (value << SEQUENCE_LOCKTIME_GRANULARITY) - 1;
            lock.min_time = fold_min(lock.min_time, required);
        } else {
            let required = coin_height as Integer + value - 1;
            lock.min_height = fold_min(lock.min_height, required);
        }
    }

    Ok(lock)
}

/// True if `block` satisfies `lock`: its height must exceed `min_height` and
/// its parent's median time past must exceed `min_time`.
pub fn evaluate_sequence_locks(chain: &ChainIndex, block: BlockId, lock: SequenceLock) -> Result<bool> {
    let entry = chain.get(block)?;
    if lock.min_height >= entry.height as Integer {
        return Ok(false);
    }

    if lock.min_time >= 0 {
        let parent = entry.parent.ok_or_else(|| {
            ConsensusError::BlockValidation("time-based sequence lock evaluated at genesis".into())
        })?;
        if lock.min_time >= chain.median_time_past(parent)? as Integer {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Calculate and evaluate in one step
pub fn check_sequence_locks(
    tx: &Transaction,
    prev_heights: &mut [Natural],
    chain: &ChainIndex,
    block: BlockId,
) -> Result<ValidationResult> {
    let lock = calculate_sequence_locks(tx, prev_heights, chain, block)?;
    if evaluate_sequence_locks(chain, block, lock)? {
        return Ok(ValidationResult::Valid);
    }
    Ok(ValidationResult::invalid(
        RejectCode::SequenceLocks,
        format!(
            "locked until height > {} and time > {}",
            lock.min_height, lock.min_time
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_TYPE_FLAG};
    use crate::hash::{calculate_block_hash, NULL_HASH};

    /// Chain of `n` blocks, block `i` stamped `1000 + 600 * i`
    fn chain(n: usize) -> (ChainIndex, Vec<BlockId>) {
        let mut chain = ChainIndex::new();
        let mut ids = Vec::new();
        let mut prev = NULL_HASH;
        for i in 0..n {
            let header = BlockHeader {
                version: 1,
                prev_block_hash: prev,
                merkle_root: [0; 32],
                timestamp: 1000 + 600 * i as Natural,
                bits: 0x207fffff,
                nonce: i as Natural,
            };
            prev = calculate_block_hash(&header);
            ids.push(chain.insert(&header).unwrap());
        }
        (chain, ids)
    }

    fn tx_with_sequences(sequences: &[Natural]) -> Transaction {
        Transaction {
            version: 2,
            inputs: sequences
                .iter()
                .map(|&sequence| TransactionInput {
                    prevout: OutPoint { hash: [1; 32], index: 0 },
                    script_sig: vec![],
                    sequence,
                    witness: vec![],
                })
                .collect(),
            outputs: vec![],
            lock_time: 0,
        }
    }

    #[test]
    fn test_disabled_inputs_contribute_nothing() {
        let (chain, ids) = chain(5);
        let tx = tx_with_sequences(&[SEQUENCE_LOCKTIME_DISABLE_FLAG as Natural]);
        let mut prev_heights = vec![3];

        let lock = calculate_sequence_locks(&tx, &mut prev_heights, &chain, ids[4]).unwrap();
        assert_eq!(lock, SequenceLock::NONE);
        assert_eq!(prev_heights, vec![0]);
        assert!(evaluate_sequence_locks(&chain, ids[4], lock).unwrap());
    }

    #[test]
    fn test_height_lock_minimized() {
        let (chain, ids) = chain(20);
        let tx = tx_with_sequences(&[10, 3]);
        let mut prev_heights = vec![5, 6];

        let lock = calculate_sequence_locks(&tx, &mut prev_heights, &chain, ids[19]).unwrap();
        // min(5 + 10 - 1, 6 + 3 - 1)
        assert_eq!(lock.min_height, 8);
        assert_eq!(lock.min_time, -1);
        assert_eq!(prev_heights, vec![5, 6]);
    }

    #[test]
    fn test_height_lock_boundary() {
        let (chain, ids) = chain(12);
        let tx = tx_with_sequences(&[5]);

        // Coin at height 5 with a 5-block lock: last locked height is 9
        let result = check_sequence_locks(&tx, &mut [5], &chain, ids[9]).unwrap();
        assert_eq!(result.code(), Some(RejectCode::SequenceLocks));

        let result = check_sequence_locks(&tx, &mut [5], &chain, ids[10]).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_time_lock_uses_ancestor_median_time() {
        let (chain, ids) = chain(30);
        // One 512-second unit
        let sequence = (SEQUENCE_LOCKTIME_TYPE_FLAG | 1) as Natural;
        let tx = tx_with_sequences(&[sequence]);
        let mut prev_heights = vec![10];

        let lock = calculate_sequence_locks(&tx, &mut prev_heights, &chain, ids[29]).unwrap();
        let coin_time = chain.median_time_past(ids[9]).unwrap() as Integer;
        assert_eq!(lock.min_time, coin_time + 512 - 1);
        assert_eq!(lock.min_height, -1);
        assert!(evaluate_sequence_locks(&chain, ids[29], lock).unwrap());
    }

    #[test]
    fn test_time_lock_on_genesis_coin_starts_at_zero() {
        let (chain, ids) = chain(3);
        let sequence = (SEQUENCE_LOCKTIME_TYPE_FLAG | 2) as Natural;
        let tx = tx_with_sequences(&[sequence]);

        let lock = calculate_sequence_locks(&tx, &mut [0], &chain, ids[2]).unwrap();
        assert_eq!(lock.min_time, (2 << SEQUENCE_LOCKTIME_GRANULARITY) - 1);

        // Parent median time past is 1600: past 1023, short of 1000 + 1023
        assert!(evaluate_sequence_locks(&chain, ids[2], lock).unwrap());
    }

    #[test]
    fn test_time_lock_not_yet_satisfied() {
        let (chain, ids) = chain(30);
        // 100 units is far beyond the chain's time span
        let sequence = (SEQUENCE_LOCKTIME_TYPE_FLAG | 100) as Natural;
        let tx = tx_with_sequences(&[sequence]);

        let result = check_sequence_locks(&tx, &mut [10], &chain, ids[29]).unwrap();
        assert_eq!(result.code(), Some(RejectCode::SequenceLocks));
    }

    #[test]
    fn test_prev_heights_length_mismatch() {
        let (chain, ids) = chain(2);
        let tx = tx_with_sequences(&[1, 2]);
        assert!(calculate_sequence_locks(&tx, &mut [1], &chain, ids[1]).is_err());
    }
}
