//! # Consensus-Verify
//!
//! Verification core for Bitcoin block data: Merkle roots and compact Merkle
//! proofs, header-hash chain linkage, lock-time finality, relative lock times
//! and signature-operation accounting.
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: every check is deterministic and side-effect-free
//! 2. **Verdicts are values**: broken rules yield [`ValidationResult::Invalid`]
//!    with a [`RejectCode`]; [`ConsensusError`] is reserved for broken caller
//!    contracts
//! 3. **Consumed interfaces**: coins come through [`coins::CoinView`] and
//!    script analysis through [`script::ScriptEvaluator`]
//!
//! ## Usage
//!
//! ```rust
//! use consensus_verify::ConsensusVerifier;
//! use consensus_verify::types::*;
//!
//! let verifier = ConsensusVerifier::new();
//! let txids = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
//!
//! let tree = verifier.build_partial_merkle_tree(&txids, &[false, true, false]);
//! let extracted = verifier.extract_matches(&tree);
//!
//! assert_eq!(extracted.root, verifier.compute_merkle_root(&txids).root);
//! assert_eq!(extracted.matches, vec![(1, [2u8; 32])]);
//! ```

pub mod block;
pub mod bloom;
pub mod chain;
pub mod coins;
pub mod config;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod locktime;
pub mod merkle;
pub mod merkle_block;
pub mod partial_merkle;
pub mod script;
pub mod segwit;
pub mod sequence_locks;
pub mod sigop;
pub mod transaction;
pub mod types;

// Re-export commonly used types
pub use config::ConsensusConfig;
pub use error::{ConsensusError, RejectCode, RejectKind, Rejection, Result};
pub use types::*;

use chain::{BlockId, ChainIndex};
use coins::CoinView;
use merkle::MerkleRoot;
use merkle_block::MerkleBlock;
use partial_merkle::{PartialMerkleMatches, PartialMerkleTree};
use script::{ScriptEvaluator, StandardScript};
use std::collections::HashSet;

/// Entry point bundling a configuration with a script evaluator
///
/// # Examples
///
/// ```
/// use consensus_verify::{ConsensusConfig, ConsensusVerifier};
///
/// let mut config = ConsensusConfig::default();
/// config.block_validation.reject_mutated_merkle = true;
///
/// let verifier = ConsensusVerifier::with_config(config);
/// assert!(verifier.config().block_validation.reject_mutated_merkle);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConsensusVerifier<E: ScriptEvaluator = StandardScript> {
    config: ConsensusConfig,
    evaluator: E,
}

impl ConsensusVerifier {
    /// Default configuration and the standard script evaluator
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConsensusConfig) -> Self {
        Self {
            config,
            evaluator: StandardScript,
        }
    }
}

impl<E: ScriptEvaluator> ConsensusVerifier<E> {
    /// Use a custom script evaluator for sig-op accounting
    pub fn with_evaluator(config: ConsensusConfig, evaluator: E) -> Self {
        Self { config, evaluator }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Merkle root of an ordered list of leaf hashes
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_verify::ConsensusVerifier;
    /// use consensus_verify::hash::NULL_HASH;
    ///
    /// let verifier = ConsensusVerifier::new();
    ///
    /// let single = verifier.compute_merkle_root(&[[7u8; 32]]);
    /// assert_eq!(single.root, [7u8; 32]);
    /// assert!(!single.mutated);
    ///
    /// assert_eq!(verifier.compute_merkle_root(&[]).root, NULL_HASH);
    /// ```
    pub fn compute_merkle_root(&self, leaves: &[Hash]) -> MerkleRoot {
        merkle::compute_merkle_root(leaves)
    }

    /// Build a proof revealing the leaves flagged in `matches`
    ///
    /// # Panics
    ///
    /// If `txids` and `matches` differ in length.
    pub fn build_partial_merkle_tree(&self, txids: &[Hash], matches: &[bool]) -> PartialMerkleTree {
        PartialMerkleTree::new(txids, matches)
    }

    /// Recover the root and the matched leaves from a proof
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_verify::ConsensusVerifier;
    /// use consensus_verify::partial_merkle::PartialMerkleTree;
    ///
    /// let verifier = ConsensusVerifier::new();
    ///
    /// // Claims 0 transactions: always rejected
    /// let bogus = PartialMerkleTree::from_parts(0, vec![true], vec![[0u8; 32]]);
    /// assert!(!verifier.extract_matches(&bogus).is_valid());
    /// ```
    pub fn extract_matches(&self, tree: &PartialMerkleTree) -> PartialMerkleMatches {
        tree.extract_matches()
    }

    /// Filtered block selecting the transactions whose id is in `txids`
    pub fn build_merkle_block(&self, block: &Block, txids: &HashSet<Hash>) -> MerkleBlock {
        MerkleBlock::from_txids(block, txids)
    }

    /// Check a filtered block's proof against its header
    pub fn verify_merkle_block(&self, merkle_block: &MerkleBlock) -> (ValidationResult, Vec<(u32, Hash)>) {
        merkle_block.verify()
    }

    /// Merkle root and header hash consistency of one block
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_verify::ConsensusVerifier;
    /// use consensus_verify::merkle::block_merkle_root;
    /// use consensus_verify::types::*;
    ///
    /// let verifier = ConsensusVerifier::new();
    ///
    /// let mut block = Block {
    ///     header: BlockHeader {
    ///         version: 1,
    ///         prev_block_hash: [0; 32],
    ///         merkle_root: [0; 32],
    ///         timestamp: 1231006505,
    ///         bits: 0x1d00ffff,
    ///         nonce: 2083236893,
    ///     },
    ///     transactions: vec![Transaction {
    ///         version: 1,
    ///         inputs: vec![TransactionInput {
    ///             prevout: OutPoint::null(),
    ///             script_sig: vec![0x01, 0x04],
    ///             sequence: 0xffffffff,
    ///             witness: vec![],
    ///         }],
    ///         outputs: vec![TransactionOutput {
    ///             value: 5000000000,
    ///             script_pubkey: vec![0x51],
    ///         }],
    ///         lock_time: 0,
    ///     }],
    /// };
    /// block.header.merkle_root = block_merkle_root(&block).root;
    ///
    /// let sealed = SealedBlock::seal(block);
    /// assert_eq!(verifier.verify_block(&sealed), ValidationResult::Valid);
    /// ```
    pub fn verify_block(&self, sealed: &SealedBlock) -> ValidationResult {
        block::verify_block(sealed, &self.config)
    }

    /// Verify blocks oldest to newest, naming the first failing index
    ///
    /// Checks Merkle roots, header hashes and parent links only; pair it with
    /// [`validate_block_transactions`](Self::validate_block_transactions) per
    /// block to check the transactions themselves.
    pub fn verify_chain(&self, blocks: &[SealedBlock]) -> Result<(ValidationResult, Option<usize>)> {
        block::verify_chain(blocks, &self.config)
    }

    /// Absolute lock-time finality
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_verify::ConsensusVerifier;
    /// use consensus_verify::types::*;
    ///
    /// let verifier = ConsensusVerifier::new();
    /// let tx = Transaction {
    ///     version: 1,
    ///     inputs: vec![TransactionInput {
    ///         prevout: OutPoint { hash: [1; 32], index: 0 },
    ///         script_sig: vec![],
    ///         sequence: 0,
    ///         witness: vec![],
    ///     }],
    ///     outputs: vec![],
    ///     lock_time: 500000,
    /// };
    ///
    /// assert!(!verifier.is_final_tx(&tx, 499999, 0));
    /// assert!(verifier.is_final_tx(&tx, 500000, 0));
    /// ```
    pub fn is_final_tx(&self, tx: &Transaction, block_height: Natural, block_time: Natural) -> bool {
        locktime::is_final_tx(tx, block_height, block_time)
    }

    /// BIP68 relative lock check of `tx` in `block`
    pub fn check_sequence_locks(
        &self,
        tx: &Transaction,
        prev_heights: &mut [Natural],
        chain: &ChainIndex,
        block: BlockId,
    ) -> Result<ValidationResult> {
        sequence_locks::check_sequence_locks(tx, prev_heights, chain, block)
    }

    /// Sig-op cost of `tx` under the configured script flags
    pub fn transaction_sig_op_cost<V: CoinView + ?Sized>(&self, tx: &Transaction, view: &V) -> Result<Integer> {
        sigop::get_transaction_sig_op_cost(
            tx,
            view,
            self.config.block_validation.script_flags,
            &self.evaluator,
        )
    }

    /// Context-free transaction checks
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_verify::{ConsensusVerifier, RejectCode};
    /// use consensus_verify::types::*;
    ///
    /// let verifier = ConsensusVerifier::new();
    /// let tx = Transaction {
    ///     version: 1,
    ///     inputs: vec![],
    ///     outputs: vec![TransactionOutput {
    ///         value: 1000,
    ///         script_pubkey: vec![0x51],
    ///     }],
    ///     lock_time: 0,
    /// };
    ///
    /// let result = verifier.check_transaction(&tx).unwrap();
    /// assert_eq!(result.code(), Some(RejectCode::EmptyInputs));
    /// ```
    pub fn check_transaction(&self, tx: &Transaction) -> Result<ValidationResult> {
        transaction::check_transaction(tx)
    }

    /// Check inputs against coins; returns the fee when valid
    ///
    /// # Examples
    ///
    /// ```
    /// use consensus_verify::ConsensusVerifier;
    /// use consensus_verify::types::*;
    ///
    /// let verifier = ConsensusVerifier::new();
    /// let mut utxo_set = UtxoSet::new();
    ///
    /// let outpoint = OutPoint { hash: [1; 32], index: 0 };
    /// utxo_set.insert(outpoint.clone(), Coin {
    ///     value: 1000,
    ///     script_pubkey: vec![],
    ///     height: 10,
    ///     is_coinbase: false,
    /// });
    ///
    /// let tx = Transaction {
    ///     version: 1,
    ///     inputs: vec![TransactionInput {
    ///         prevout: outpoint,
    ///         script_sig: vec![],
    ///         sequence: 0xffffffff,
    ///         witness: vec![],
    ///     }],
    ///     outputs: vec![TransactionOutput {
    ///         value: 900,
    ///         script_pubkey: vec![],
    ///     }],
    ///     lock_time: 0,
    /// };
    ///
    /// let (result, fee) = verifier.check_tx_inputs(&tx, &utxo_set, 11).unwrap();
    /// assert_eq!(result, ValidationResult::Valid);
    /// assert_eq!(fee, 100);
    /// ```
    pub fn check_tx_inputs<V: CoinView + ?Sized>(
        &self,
        tx: &Transaction,
        view: &V,
        spend_height: Natural,
    ) -> Result<(ValidationResult, Integer)> {
        transaction::check_tx_inputs(tx, view, spend_height)
    }

    /// Run every transaction check of `block`, returning the total fees
    pub fn validate_block_transactions<V: CoinView + Sync + ?Sized>(
        &self,
        block: &Block,
        view: &V,
        chain: &ChainIndex,
        block_id: BlockId,
    ) -> Result<(ValidationResult, Integer)> {
        block::validate_block_transactions(block, view, chain, block_id, &self.config, &self.evaluator)
    }
}
