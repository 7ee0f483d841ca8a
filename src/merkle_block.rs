//! Filtered blocks: a header plus a partial Merkle tree over the selected transactions

use crate::bloom::TransactionFilter;
use crate::encoding::{read_header, serialize_header, Reader};
use crate::error::{RejectCode, Result};
use crate::hash::{calculate_tx_id, hash_to_hex};
use crate::partial_merkle::PartialMerkleTree;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBlock {
    pub header: BlockHeader,
    pub txn: PartialMerkleTree,
    /// `(index, txid)` of the transactions selected when the block was built.
    /// Not part of the wire form.
    #[serde(default)]
    pub matched_txn: Vec<(u32, Hash)>,
}

impl MerkleBlock {
    /// Select transactions whose id is in `txids` or that `filter` reports as
    /// relevant. The filter is not consulted for transactions already selected
    /// by id.
    pub fn build(
        block: &Block,
        txids: Option<&HashSet<Hash>>,
        mut filter: Option<&mut dyn TransactionFilter>,
    ) -> Self {
        let mut leaves = Vec::with_capacity(block.transactions.len());
        let mut matches = Vec::with_capacity(block.transactions.len());
        let mut matched_txn = Vec::new();

        for (i, tx) in block.transactions.iter().enumerate() {
            let txid = calculate_tx_id(tx);
            let selected = txids.map_or(false, |set| set.contains(&txid))
                || filter
                    .as_mut()
                    .map_or(false, |f| f.is_relevant_and_update(tx));
            if selected {
                matched_txn.push((i as u32, txid));
            }
            matches.push(selected);
            leaves.push(txid);
        }

        Self {
            header: block.header.clone(),
            txn: PartialMerkleTree::new(&leaves, &matches),
            matched_txn,
        }
    }

    pub fn from_txids(block: &Block, txids: &HashSet<Hash>) -> Self {
        Self::build(block, Some(txids), None)
    }

    pub fn from_filter(block: &Block, filter: &mut dyn TransactionFilter) -> Self {
        Self::build(block, None, Some(filter))
    }

    /// Check the embedded proof against the header's Merkle root.
    ///
    /// Returns the proven `(index, txid)` pairs on success, none on failure.
    pub fn verify(&self) -> (ValidationResult, Vec<(u32, Hash)>) {
        let extracted = self.txn.extract_matches();

        if !extracted.is_valid() {
            return (
                ValidationResult::invalid(RejectCode::MalformedProof, "partial merkle tree rejected"),
                Vec::new(),
            );
        }

        if extracted.root != self.header.merkle_root {
            debug!(
                "merkle block root {} does not match header root {}",
                hash_to_hex(&extracted.root),
                hash_to_hex(&self.header.merkle_root)
            );
            return (
                ValidationResult::invalid(
                    RejectCode::MerkleRootMismatch,
                    format!("proof commits to {}", hash_to_hex(&extracted.root)),
                ),
                Vec::new(),
            );
        }

        (ValidationResult::Valid, extracted.matches)
    }

    /// `merkleblock` wire form: 80-byte header followed by the partial tree
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = serialize_header(&self.header);
        data.extend_from_slice(&self.txn.serialize());
        data
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let header = read_header(&mut reader)?;
        let txn = PartialMerkleTree::read(&mut reader)?;
        reader.finish()?;

        Ok(Self {
            header,
            txn,
            matched_txn: Vec::new(),
        })
    }
}
