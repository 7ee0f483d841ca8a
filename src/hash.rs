//! Hash digest primitive: double SHA-256 and the identities derived from it

use crate::encoding::serialize_transaction;
use crate::error::{ConsensusError, Result};
use crate::types::*;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};

/// The all-zero digest, used for "absent" values and never a content hash
pub const NULL_HASH: Hash = [0u8; 32];

pub fn is_null(hash: &Hash) -> bool {
    *hash == NULL_HASH
}

/// Double SHA-256 of `data`
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// Parent node digest: `SHA256d(left || right)`. Order-sensitive.
pub fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(left);
    engine.input(right);
    sha256d::Hash::from_engine(engine).into_inner()
}

/// Transaction id: hash of the serialization without witness data
pub fn calculate_tx_id(tx: &Transaction) -> Hash {
    sha256d(&serialize_transaction(tx, false))
}

/// Witness transaction id; equal to the txid when no input carries witness data
pub fn calculate_wtx_id(tx: &Transaction) -> Hash {
    sha256d(&serialize_transaction(tx, true))
}

/// Header hash over the fields that bind a block to its parent and contents.
///
/// Timestamp and nonce are committed as full 64-bit little-endian values, so
/// no two distinct field values share a digest.
pub fn calculate_header_hash(
    prev_block_hash: &Hash,
    merkle_root: &Hash,
    timestamp: Natural,
    nonce: Natural,
) -> Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(prev_block_hash);
    engine.input(merkle_root);
    engine.input(&timestamp.to_le_bytes());
    engine.input(&nonce.to_le_bytes());
    sha256d::Hash::from_engine(engine).into_inner()
}

pub fn calculate_block_hash(header: &BlockHeader) -> Hash {
    calculate_header_hash(
        &header.prev_block_hash,
        &header.merkle_root,
        header.timestamp,
        header.nonce,
    )
}

/// Hex in display order (bytes reversed), as block explorers print digests
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

pub fn hash_from_hex(s: &str) -> Result<Hash> {
    let bytes = hex::decode(s)
        .map_err(|e| ConsensusError::Serialization(format!("invalid hex digest: {}", e).into()))?;
    if bytes.len() != 32 {
        return Err(ConsensusError::Serialization(
            format!("digest must be 32 bytes, got {}", bytes.len()).into(),
        ));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    hash.reverse();
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256d_empty() {
        assert_eq!(
            hex::encode(sha256d(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_combine_is_order_sensitive() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(combine(&a, &b), combine(&b, &a));

        let mut concat = Vec::with_capacity(64);
        concat.extend_from_slice(&a);
        concat.extend_from_slice(&b);
        assert_eq!(combine(&a, &b), sha256d(&concat));
    }

    #[test]
    fn test_hex_display_order() {
        let mut hash = NULL_HASH;
        hash[0] = 0xab;
        let text = hash_to_hex(&hash);
        assert!(text.ends_with("ab"));
        assert_eq!(hash_from_hex(&text).unwrap(), hash);
    }

    #[test]
    fn test_hash_from_hex_rejects_bad_input() {
        assert!(hash_from_hex("zz").is_err());
        assert!(hash_from_hex("abcd").is_err());
    }

    #[test]
    fn test_wtxid_equals_txid_without_witness() {
        let mut tx = Transaction {
            version: 1,
            inputs: vec![TransactionInput {
                prevout: OutPoint { hash: [3; 32], index: 0 },
                script_sig: vec![0x51],
                sequence: 0xffffffff,
                witness: vec![],
            }],
            outputs: vec![TransactionOutput {
                value: 50,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        };
        assert_eq!(calculate_tx_id(&tx), calculate_wtx_id(&tx));

        tx.inputs[0].witness = vec![vec![1, 2, 3]];
        let txid = calculate_tx_id(&tx);
        assert_ne!(txid, calculate_wtx_id(&tx));

        // Witness data never changes the txid
        tx.inputs[0].witness = vec![vec![9]];
        assert_eq!(calculate_tx_id(&tx), txid);
    }

    #[test]
    fn test_header_hash_ignores_version_and_bits() {
        let header = BlockHeader {
            version: 1,
            prev_block_hash: [4; 32],
            merkle_root: [5; 32],
            timestamp: 1000,
            bits: 0x1d00ffff,
            nonce: 7,
        };
        let mut other = header.clone();
        other.version = 4;
        other.bits = 0x207fffff;
        assert_eq!(calculate_block_hash(&header), calculate_block_hash(&other));

        other.nonce = 8;
        assert_ne!(calculate_block_hash(&header), calculate_block_hash(&other));
    }

    #[test]
    fn test_header_hash_commits_high_bits() {
        let header = BlockHeader {
            version: 1,
            prev_block_hash: [4; 32],
            merkle_root: [5; 32],
            timestamp: 1000,
            bits: 0x1d00ffff,
            nonce: 7,
        };

        let mut later = header.clone();
        later.timestamp += 1 << 32;
        assert_ne!(calculate_block_hash(&header), calculate_block_hash(&later));

        let mut renonced = header.clone();
        renonced.nonce += 1 << 32;
        assert_ne!(calculate_block_hash(&header), calculate_block_hash(&renonced));

        // Prev hash, root, then both fields as 8-byte little-endian values
        let mut preimage = Vec::with_capacity(80);
        preimage.extend_from_slice(&header.prev_block_hash);
        preimage.extend_from_slice(&header.merkle_root);
        preimage.extend_from_slice(&1000u64.to_le_bytes());
        preimage.extend_from_slice(&7u64.to_le_bytes());
        assert_eq!(calculate_block_hash(&header), sha256d(&preimage));
    }
}
