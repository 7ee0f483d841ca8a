//! Block validation: chain linkage and the per-block transaction pipeline

use crate::chain::{BlockId, ChainIndex};
use crate::coins::CoinView;
use crate::config::ConsensusConfig;
use crate::error::{ConsensusError, RejectCode, Rejection, Result};
use crate::hash::{calculate_block_hash, hash_to_hex};
use crate::locktime::check_final_tx;
use crate::merkle::block_merkle_root;
use crate::script::ScriptEvaluator;
use crate::segwit::{calculate_block_weight, check_witness_commitment};
use crate::sequence_locks::check_sequence_locks;
use crate::sigop::get_transaction_sig_op_cost;
use crate::transaction::{check_transaction, check_tx_inputs, is_coinbase, money_range};
use crate::types::*;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// VerifyBlock: checks that a sealed block is internally consistent
///
/// 1. MerkleRoot(txids) = header.merkle_root
/// 2. HeaderHash(prev, merkle_root, timestamp, nonce) = declared hash
///
/// A Merkle tree that pairs two identical hashes is logged and, if
/// `reject_mutated_merkle` is set, rejected.
pub fn verify_block(sealed: &SealedBlock, config: &ConsensusConfig) -> ValidationResult {
    let header = &sealed.block.header;
    let merkle = block_merkle_root(&sealed.block);

    if merkle.mutated {
        warn!(
            "block {} has a mutated merkle tree",
            hash_to_hex(&sealed.hash)
        );
        if config.block_validation.reject_mutated_merkle {
            return ValidationResult::invalid(RejectCode::MutatedMerkle, "duplicate transaction subtree");
        }
    }

    if merkle.root != header.merkle_root {
        return ValidationResult::invalid(
            RejectCode::MerkleRootMismatch,
            format!(
                "header commits to {}, transactions hash to {}",
                hash_to_hex(&header.merkle_root),
                hash_to_hex(&merkle.root)
            ),
        );
    }

    let computed = calculate_block_hash(header);
    if computed != sealed.hash {
        return ValidationResult::invalid(
            RejectCode::HeaderHashMismatch,
            format!(
                "declared {}, computed {}",
                hash_to_hex(&sealed.hash),
                hash_to_hex(&computed)
            ),
        );
    }

    ValidationResult::Valid
}

/// VerifyChain: verifies blocks oldest to newest
///
/// Every block must pass [`verify_block`] and every block after the first
/// must name its predecessor's hash as `prev_block_hash`. Stops at the first
/// failure and reports its index. An empty chain is valid.
///
/// Only structure and linkage are checked here. Callers run
/// [`validate_block_transactions`] on each block to check its transactions.
pub fn verify_chain(
    blocks: &[SealedBlock],
    config: &ConsensusConfig,
) -> Result<(ValidationResult, Option<usize>)> {
    for (i, sealed) in blocks.iter().enumerate() {
        trace!("verifying block {} ({})", i, hash_to_hex(&sealed.hash));

        let mut result = verify_block(sealed, config);

        if result.is_valid() && i > 0 {
            let expected = &blocks[i - 1].hash;
            let actual = &sealed.block.header.prev_block_hash;
            if actual != expected {
                result = ValidationResult::invalid(
                    RejectCode::BadPrevBlock,
                    format!(
                        "expected parent {}, found {}",
                        hash_to_hex(expected),
                        hash_to_hex(actual)
                    ),
                );
            }
        }

        if let ValidationResult::Invalid(rejection) = &result {
            warn!("chain verification failed at block {}: {}", i, rejection);
            return Ok((result, Some(i)));
        }
    }

    Ok((ValidationResult::Valid, None))
}

/// What one transaction contributes to its block
struct TxOutcome {
    result: ValidationResult,
    fee: Integer,
    sig_op_cost: Integer,
}

impl TxOutcome {
    fn rejected(result: ValidationResult) -> Self {
        Self {
            result,
            fee: 0,
            sig_op_cost: 0,
        }
    }
}

/// Context shared by the checks of every transaction in one block
struct BlockContext<'a, V: ?Sized> {
    view: &'a V,
    chain: &'a ChainIndex,
    block_id: BlockId,
    height: Natural,
    lock_time_cutoff: Natural,
    double_spend: Option<(usize, usize)>,
    config: &'a ConsensusConfig,
    evaluator: &'a dyn ScriptEvaluator,
}

impl<V: CoinView + ?Sized> BlockContext<'_, V> {
    fn check(&self, index: usize, tx: &Transaction) -> Result<TxOutcome> {
        let result = check_transaction(tx)?;
        if !result.is_valid() {
            return Ok(TxOutcome::rejected(result));
        }

        let result = check_final_tx(tx, self.height, self.lock_time_cutoff);
        if !result.is_valid() {
            return Ok(TxOutcome::rejected(result));
        }

        let flags = self.config.block_validation.script_flags;

        if is_coinbase(tx) {
            let sig_op_cost = get_transaction_sig_op_cost(tx, self.view, flags, self.evaluator)?;
            return Ok(TxOutcome {
                result: ValidationResult::Valid,
                fee: 0,
                sig_op_cost,
            });
        }

        if let Some((_, input)) = self.double_spend.filter(|&(tx_index, _)| tx_index == index) {
            return Ok(TxOutcome::rejected(ValidationResult::invalid(
                RejectCode::MissingInputs,
                format!("input {} is spent by an earlier transaction of the block", input),
            )));
        }

        let (result, fee) = check_tx_inputs(tx, self.view, self.height)?;
        if !result.is_valid() {
            return Ok(TxOutcome::rejected(result));
        }

        if self.config.block_validation.enforce_sequence_locks {
            let mut prev_heights = tx
                .inputs
                .iter()
                .map(|input| {
                    self.view
                        .access_coin(&input.prevout)
                        .map(|coin| coin.height)
                        .ok_or_else(|| {
                            ConsensusError::UtxoNotFound(
                                hash_to_hex(&input.prevout.hash).into(),
                            )
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let result = check_sequence_locks(tx, &mut prev_heights, self.chain, self.block_id)?;
            if !result.is_valid() {
                return Ok(TxOutcome::rejected(result));
            }
        }

        let sig_op_cost = get_transaction_sig_op_cost(tx, self.view, flags, self.evaluator)?;

        Ok(TxOutcome {
            result: ValidationResult::Valid,
            fee,
            sig_op_cost,
        })
    }
}

/// First `(transaction, input)` that spends an outpoint already spent earlier
/// in the block. Every transaction is checked against the same view, so this
/// is the only place spends are compared across transactions.
fn first_double_spend(block: &Block) -> Option<(usize, usize)> {
    let mut spent = HashSet::new();
    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        for (j, input) in tx.inputs.iter().enumerate() {
            if !spent.insert(&input.prevout) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Combine per-transaction outcomes in block order. The first rejection wins,
/// whether it comes from a transaction or from a block-wide total.
fn accumulate(
    outcomes: impl Iterator<Item = (usize, Result<TxOutcome>)>,
    max_sig_op_cost: Integer,
) -> Result<(ValidationResult, Integer)> {
    let mut total_fees: Integer = 0;
    let mut total_sig_op_cost: Integer = 0;

    for (i, outcome) in outcomes {
        let outcome = outcome?;

        if let ValidationResult::Invalid(rejection) = outcome.result {
            debug!("transaction {} rejected: {}", i, rejection);
            let detail = if rejection.detail.is_empty() {
                format!("transaction {}", i)
            } else {
                format!("transaction {}: {}", i, rejection.detail)
            };
            return Ok((
                ValidationResult::Invalid(Rejection::new(rejection.code, detail)),
                0,
            ));
        }

        total_sig_op_cost += outcome.sig_op_cost;
        if total_sig_op_cost > max_sig_op_cost {
            debug!("block sig-op cost {} exceeds {}", total_sig_op_cost, max_sig_op_cost);
            return Ok((
                ValidationResult::invalid(
                    RejectCode::SigOpCost,
                    format!("cost {} after transaction {}", total_sig_op_cost, i),
                ),
                0,
            ));
        }

        total_fees += outcome.fee;
        if !money_range(total_fees) {
            return Ok((
                ValidationResult::invalid(
                    RejectCode::FeeOutOfRange,
                    format!("accumulated fees {} after transaction {}", total_fees, i),
                ),
                0,
            ));
        }
    }

    Ok((ValidationResult::Valid, total_fees))
}

/// Check every transaction of `block` against the coin view as it was before
/// the block.
///
/// `block_id` is the block's own record in `chain`; its height and its
/// parent's median time past drive the finality and sequence-lock checks.
///
/// 1. The block is non-empty, starts with the only coinbase and is within the
///    weight limit
/// 2. The witness commitment holds
/// 3. Per transaction: CheckTransaction, IsFinal, no outpoint spent by an
///    earlier transaction, CheckTxInputs, sequence locks
/// 4. Σ sig-op cost ≤ max_block_sigops_cost
/// 5. Return (valid, Σ fees)
pub fn validate_block_transactions<V: CoinView + Sync + ?Sized>(
    block: &Block,
    view: &V,
    chain: &ChainIndex,
    block_id: BlockId,
    config: &ConsensusConfig,
    evaluator: &dyn ScriptEvaluator,
) -> Result<(ValidationResult, Integer)> {
    let Some(first) = block.transactions.first() else {
        return Ok((ValidationResult::invalid(RejectCode::BadBlockLength, "no transactions"), 0));
    };
    if !is_coinbase(first) {
        return Ok((
            ValidationResult::invalid(RejectCode::MissingCoinbase, "first transaction is not a coinbase"),
            0,
        ));
    }
    if let Some(i) = block.transactions.iter().skip(1).position(is_coinbase) {
        return Ok((
            ValidationResult::invalid(RejectCode::MultipleCoinbase, format!("coinbase at index {}", i + 1)),
            0,
        ));
    }

    let weight = calculate_block_weight(block);
    if weight > config.block_validation.max_block_weight {
        return Ok((
            ValidationResult::invalid(
                RejectCode::BlockWeight,
                format!("weight {} exceeds {}", weight, config.block_validation.max_block_weight),
            ),
            0,
        ));
    }

    let result = check_witness_commitment(block);
    if !result.is_valid() {
        return Ok((result, 0));
    }

    let entry = chain.get(block_id)?;
    let lock_time_cutoff = match entry.parent {
        Some(parent) => chain.median_time_past(parent)?,
        None => entry.header.timestamp,
    };

    let double_spend = first_double_spend(block);
    if let Some((i, j)) = double_spend {
        debug!("transaction {} input {} spends an outpoint twice in the block", i, j);
    }

    let context = BlockContext {
        view,
        chain,
        block_id,
        height: entry.height,
        lock_time_cutoff,
        double_spend,
        config,
        evaluator,
    };
    let max_sig_op_cost = config.block_validation.max_block_sigops_cost;

    #[cfg(feature = "rayon")]
    {
        if config.block_validation.enable_parallel_validation {
            let outcomes: Vec<Result<TxOutcome>> = block
                .transactions
                .par_iter()
                .enumerate()
                .map(|(i, tx)| context.check(i, tx))
                .collect();
            return accumulate(outcomes.into_iter().enumerate(), max_sig_op_cost);
        }
    }

    accumulate(
        block
            .transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (i, context.check(i, tx))),
        max_sig_op_cost,
    )
}
