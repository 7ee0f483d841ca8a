//! Property tests for Merkle roots and partial Merkle proofs

use consensus_verify::hash::{sha256d, NULL_HASH};
use consensus_verify::merkle::compute_merkle_root;
use consensus_verify::partial_merkle::PartialMerkleTree;
use consensus_verify::types::Hash;
use proptest::prelude::*;
use sha2::{Digest, Sha256};

/// Distinct random leaves with a random match mask of the same length
fn arb_leaves_and_mask() -> impl Strategy<Value = (Vec<Hash>, Vec<bool>)> {
    (1usize..=64).prop_flat_map(|n| {
        (
            prop::collection::hash_set(prop::array::uniform32(any::<u8>()), n)
                .prop_map(|set| set.into_iter().collect::<Vec<_>>()),
            prop::collection::vec(any::<bool>(), n),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sha256d_matches_reference(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let expected: [u8; 32] = Sha256::digest(Sha256::digest(&data)).into();
        prop_assert_eq!(sha256d(&data), expected);
    }

    #[test]
    fn merkle_root_is_deterministic(leaves in prop::collection::vec(prop::array::uniform32(any::<u8>()), 1..64)) {
        let first = compute_merkle_root(&leaves);
        let second = compute_merkle_root(&leaves);
        prop_assert_eq!(first, second);
        prop_assert_ne!(first.root, NULL_HASH);
    }

    #[test]
    fn build_then_extract_recovers_root_and_matches((leaves, mask) in arb_leaves_and_mask()) {
        let tree = PartialMerkleTree::new(&leaves, &mask);
        let extracted = tree.extract_matches();

        prop_assert!(extracted.is_valid());
        prop_assert_eq!(extracted.root, compute_merkle_root(&leaves).root);

        let expected: Vec<(u32, Hash)> = leaves
            .iter()
            .zip(&mask)
            .enumerate()
            .filter(|(_, (_, &matched))| matched)
            .map(|(i, (leaf, _))| (i as u32, *leaf))
            .collect();
        prop_assert_eq!(extracted.matches, expected);
    }

    #[test]
    fn wire_form_preserves_extraction((leaves, mask) in arb_leaves_and_mask()) {
        let tree = PartialMerkleTree::new(&leaves, &mask);
        let decoded = PartialMerkleTree::deserialize(&tree.serialize()).unwrap();
        prop_assert_eq!(decoded.extract_matches(), tree.extract_matches());
    }

    #[test]
    fn truncated_hashes_always_rejected((leaves, mask) in arb_leaves_and_mask()) {
        let tree = PartialMerkleTree::new(&leaves, &mask);
        let mut hashes = tree.hashes().to_vec();
        hashes.pop();
        let truncated = PartialMerkleTree::from_parts(
            tree.transaction_count(),
            tree.bits().to_vec(),
            hashes,
        );

        let extracted = truncated.extract_matches();
        prop_assert!(!extracted.is_valid());
        prop_assert_eq!(extracted.root, NULL_HASH);
    }

    #[test]
    fn damaged_hash_never_yields_true_root(
        (leaves, mask) in arb_leaves_and_mask(),
        pick in any::<prop::sample::Index>(),
        bit in 0usize..256,
    ) {
        let tree = PartialMerkleTree::new(&leaves, &mask);
        let mut hashes = tree.hashes().to_vec();
        let n = pick.index(hashes.len());
        hashes[n][bit / 8] ^= 1 << (bit % 8);
        let damaged = PartialMerkleTree::from_parts(
            tree.transaction_count(),
            tree.bits().to_vec(),
            hashes,
        );

        prop_assert_ne!(damaged.extract_matches().root, compute_merkle_root(&leaves).root);
    }

    #[test]
    fn flipped_flag_never_proves_a_false_match(
        (leaves, mask) in arb_leaves_and_mask(),
        pick in any::<prop::sample::Index>(),
    ) {
        let tree = PartialMerkleTree::new(&leaves, &mask);
        let mut bits = tree.bits().to_vec();
        let n = pick.index(bits.len());
        bits[n] = !bits[n];
        let flipped = PartialMerkleTree::from_parts(
            tree.transaction_count(),
            bits,
            tree.hashes().to_vec(),
        );

        // A flip may still decode to some root; only one that equals the real
        // root is trusted, and then every reported leaf must be genuine
        let extracted = flipped.extract_matches();
        if extracted.is_valid() && extracted.root == compute_merkle_root(&leaves).root {
            for (index, txid) in extracted.matches {
                prop_assert_eq!(leaves[index as usize], txid);
            }
        }
    }
}
