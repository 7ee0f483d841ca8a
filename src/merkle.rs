//! Full Merkle tree computation over transaction ids
//!
//! Levels are built bottom-up by hashing adjacent pairs. An odd level
//! duplicates its last entry, which makes a list ending in `[.., x, x]`
//! indistinguishable from one ending in `[.., x]`; such collisions are
//! reported through [`MerkleRoot::mutated`] instead of aborting.

use crate::hash::{calculate_tx_id, calculate_wtx_id, combine, NULL_HASH};
use crate::types::*;

/// Root of a Merkle tree and whether any level paired two identical hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleRoot {
    pub root: Hash,
    pub mutated: bool,
}

/// Compute the Merkle root of an ordered list of leaf digests
///
/// An empty list yields the null digest and no mutation.
pub fn compute_merkle_root(leaves: &[Hash]) -> MerkleRoot {
    if leaves.is_empty() {
        return MerkleRoot {
            root: NULL_HASH,
            mutated: false,
        };
    }

    let mut mutated = false;
    let mut level = leaves.to_vec();

    while level.len() > 1 {
        let mut next_level = Vec::with_capacity((level.len() + 1) / 2);

        for chunk in level.chunks(2) {
            if chunk.len() == 2 {
                if chunk[0] == chunk[1] {
                    mutated = true;
                }
                next_level.push(combine(&chunk[0], &chunk[1]));
            } else {
                // Odd number: duplicate the last hash
                next_level.push(combine(&chunk[0], &chunk[0]));
            }
        }

        level = next_level;
    }

    MerkleRoot {
        root: level[0],
        mutated,
    }
}

/// Merkle root over the block's transaction ids
pub fn block_merkle_root(block: &Block) -> MerkleRoot {
    let leaves: Vec<Hash> = block.transactions.iter().map(calculate_tx_id).collect();
    compute_merkle_root(&leaves)
}

/// Merkle root over witness ids, with the coinbase leaf replaced by the null digest
pub fn block_witness_merkle_root(block: &Block) -> MerkleRoot {
    let leaves: Vec<Hash> = block
        .transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| if i == 0 { NULL_HASH } else { calculate_wtx_id(tx) })
        .collect();
    compute_merkle_root(&leaves)
}
