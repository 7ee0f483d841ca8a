//! Transaction validation: context-free structure checks and input checks
//! against a coin view

use crate::coins::CoinView;
use crate::constants::*;
use crate::encoding::serialize_transaction;
use crate::error::{RejectCode, Result};
use crate::types::*;
use std::collections::HashSet;

/// True if `value` is a valid amount: 0 ≤ value ≤ MAX_MONEY
pub fn money_range(value: Integer) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Check if transaction is coinbase: a single input spending the null outpoint
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.len() == 1 && tx.inputs[0].prevout.is_null()
}

/// Sum of the output values, rejecting any output or running total outside
/// the money range
fn checked_value_out(tx: &Transaction) -> std::result::Result<Integer, ValidationResult> {
    let mut total_output_value: Integer = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 {
            return Err(ValidationResult::invalid(
                RejectCode::NegativeOutput,
                format!("output {} has value {}", i, output.value),
            ));
        }
        if output.value > MAX_MONEY {
            return Err(ValidationResult::invalid(
                RejectCode::OutputTooLarge,
                format!("output {} has value {}", i, output.value),
            ));
        }
        total_output_value += output.value;
        if !money_range(total_output_value) {
            return Err(ValidationResult::invalid(
                RejectCode::OutputTotalTooLarge,
                format!("total {} after output {}", total_output_value, i),
            ));
        }
    }
    Ok(total_output_value)
}

/// CheckTransaction: checks that need nothing but the transaction itself
///
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. |Serialize(tx ∖ witness)| × 4 ≤ MAX_BLOCK_WEIGHT
/// 3. ∀o ∈ outs: 0 ≤ o.value ≤ MAX_MONEY, and so is the running total
/// 4. No outpoint is spent twice
/// 5. Coinbase: 2 ≤ |scriptSig| ≤ 100; otherwise no null prevouts
pub fn check_transaction(tx: &Transaction) -> Result<ValidationResult> {
    if tx.inputs.is_empty() {
        return Ok(ValidationResult::invalid(RejectCode::EmptyInputs, ""));
    }
    if tx.outputs.is_empty() {
        return Ok(ValidationResult::invalid(RejectCode::EmptyOutputs, ""));
    }

    let stripped_size = serialize_transaction(tx, false).len() as Natural;
    if stripped_size * WITNESS_SCALE_FACTOR > MAX_BLOCK_WEIGHT {
        return Ok(ValidationResult::invalid(
            RejectCode::Oversize,
            format!("{} bytes without witness", stripped_size),
        ));
    }

    if let Err(rejection) = checked_value_out(tx) {
        return Ok(rejection);
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(&input.prevout) {
            return Ok(ValidationResult::invalid(
                RejectCode::DuplicateInputs,
                format!("outpoint index {} spent twice", input.prevout.index),
            ));
        }
    }

    if is_coinbase(tx) {
        let len = tx.inputs[0].script_sig.len();
        if !(MIN_COINBASE_SCRIPT_SIZE..=MAX_COINBASE_SCRIPT_SIZE).contains(&len) {
            return Ok(ValidationResult::invalid(
                RejectCode::BadCoinbaseLength,
                format!("coinbase script is {} bytes", len),
            ));
        }
    } else if let Some(i) = tx.inputs.iter().position(|input| input.prevout.is_null()) {
        return Ok(ValidationResult::invalid(
            RejectCode::NullPrevout,
            format!("input {} spends the null outpoint", i),
        ));
    }

    Ok(ValidationResult::Valid)
}

/// CheckTxInputs: 𝒯𝒳 × 𝒰𝒮 × ℕ → {valid, invalid} × ℤ
///
/// For transaction tx with coin view us, included at height h:
/// 1. If tx is coinbase: return (valid, 0)
/// 2. Every input must refer to a coin in us
/// 3. Coinbase coins need h - coin.height ≥ COINBASE_MATURITY
/// 4. Every coin value and the running input total must be in money range
/// 5. Every output value and the running output total must be in money range
/// 6. total_in ≥ total_out, and the fee total_in - total_out is in money range
/// 7. Return (valid, fee)
pub fn check_tx_inputs<V: CoinView + ?Sized>(
    tx: &Transaction,
    view: &V,
    spend_height: Natural,
) -> Result<(ValidationResult, Integer)> {
    if is_coinbase(tx) {
        return Ok((ValidationResult::Valid, 0));
    }

    if !view.have_inputs(tx) {
        return Ok((
            ValidationResult::invalid(RejectCode::MissingInputs, "inputs missing or spent"),
            0,
        ));
    }

    let mut total_input_value: Integer = 0;

    for (i, input) in tx.inputs.iter().enumerate() {
        let Some(coin) = view.access_coin(&input.prevout) else {
            return Ok((
                ValidationResult::invalid(RejectCode::MissingInputs, format!("input {}", i)),
                0,
            ));
        };

        if coin.is_coinbase {
            let depth = spend_height.checked_sub(coin.height);
            if depth.map_or(true, |depth| depth < COINBASE_MATURITY) {
                return Ok((
                    ValidationResult::invalid(
                        RejectCode::PrematureSpend,
                        format!(
                            "coinbase from height {} spent at height {}",
                            coin.height, spend_height
                        ),
                    ),
                    0,
                ));
            }
        }

        if !money_range(coin.value) {
            return Ok((
                ValidationResult::invalid(
                    RejectCode::InputValuesOutOfRange,
                    format!("input {} has value {}", i, coin.value),
                ),
                0,
            ));
        }
        total_input_value += coin.value;
        if !money_range(total_input_value) {
            return Ok((
                ValidationResult::invalid(
                    RejectCode::InputValuesOutOfRange,
                    format!("input total {} after input {}", total_input_value, i),
                ),
                0,
            ));
        }
    }

    // Outputs are not assumed to have passed check_transaction
    let total_output_value = match checked_value_out(tx) {
        Ok(total) => total,
        Err(rejection) => return Ok((rejection, 0)),
    };
    if total_input_value < total_output_value {
        return Ok((
            ValidationResult::invalid(
                RejectCode::InBelowOut,
                format!("value in {} < value out {}", total_input_value, total_output_value),
            ),
            0,
        ));
    }

    let fee = total_input_value - total_output_value;
    if !money_range(fee) {
        return Ok((
            ValidationResult::invalid(RejectCode::FeeOutOfRange, format!("fee {}", fee)),
            0,
        ));
    }

    Ok((ValidationResult::Valid, fee))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outpoint(n: u8) -> OutPoint {
        OutPoint { hash: [n; 32], index: 0 }
    }

    fn input(prevout: OutPoint) -> TransactionInput {
        TransactionInput {
            prevout,
            script_sig: vec![],
            sequence: 0xffffffff,
            witness: vec![],
        }
    }

    fn output(value: Integer) -> TransactionOutput {
        TransactionOutput {
            value,
            script_pubkey: vec![0x51],
        }
    }

    fn coin(value: Integer, height: Natural, is_coinbase: bool) -> Coin {
        Coin {
            value,
            script_pubkey: vec![0x51],
            height,
            is_coinbase,
        }
    }

    fn spend(prevouts: &[OutPoint], values: &[Integer]) -> Transaction {
        Transaction {
            version: 1,
            inputs: prevouts.iter().cloned().map(input).collect(),
            outputs: values.iter().map(|&v| output(v)).collect(),
            lock_time: 0,
        }
    }

    fn coinbase(script_len: usize) -> Transaction {
        let mut tx = spend(&[OutPoint::null()], &[50]);
        tx.inputs[0].script_sig = vec![0x01; script_len];
        tx
    }

    #[test]
    fn test_check_transaction_valid() {
        let tx = spend(&[outpoint(1)], &[1000]);
        assert_eq!(check_transaction(&tx).unwrap(), ValidationResult::Valid);
    }

    #[test]
    fn test_check_transaction_empty_inputs() {
        let tx = spend(&[], &[1000]);
        assert!(matches!(check_transaction(&tx).unwrap(), ValidationResult::Invalid(_)));
        assert_eq!(check_transaction(&tx).unwrap().code(), Some(RejectCode::EmptyInputs));
    }

    // ============================================================================
    // COMPREHENSIVE TRANSACTION TESTS
    // ============================================================================

    #[test]
    fn test_check_transaction_empty_outputs() {
        let tx = spend(&[outpoint(1)], &[]);
        assert_eq!(check_transaction(&tx).unwrap().code(), Some(RejectCode::EmptyOutputs));
    }

    #[test]
    fn test_check_transaction_output_values() {
        let negative = spend(&[outpoint(1)], &[-1]);
        assert_eq!(check_transaction(&negative).unwrap().code(), Some(RejectCode::NegativeOutput));

        let too_large = spend(&[outpoint(1)], &[MAX_MONEY + 1]);
        assert_eq!(check_transaction(&too_large).unwrap().code(), Some(RejectCode::OutputTooLarge));

        let total_too_large = spend(&[outpoint(1)], &[MAX_MONEY, 1]);
        assert_eq!(
            check_transaction(&total_too_large).unwrap().code(),
            Some(RejectCode::OutputTotalTooLarge)
        );

        let max = spend(&[outpoint(1)], &[MAX_MONEY]);
        assert!(check_transaction(&max).unwrap().is_valid());
    }

    #[test]
    fn test_check_transaction_duplicate_inputs() {
        let tx = spend(&[outpoint(1), outpoint(1)], &[1]);
        assert_eq!(check_transaction(&tx).unwrap().code(), Some(RejectCode::DuplicateInputs));
    }

    #[test]
    fn test_check_transaction_oversize() {
        let mut tx = spend(&[outpoint(1)], &[1]);
        tx.outputs[0].script_pubkey = vec![0x6a; MAX_BLOCK_WEIGHT as usize / 4];
        assert_eq!(check_transaction(&tx).unwrap().code(), Some(RejectCode::Oversize));
    }

    #[test]
    fn test_check_transaction_coinbase_script_length() {
        assert!(check_transaction(&coinbase(2)).unwrap().is_valid());
        assert!(check_transaction(&coinbase(100)).unwrap().is_valid());
        assert_eq!(
            check_transaction(&coinbase(1)).unwrap().code(),
            Some(RejectCode::BadCoinbaseLength)
        );
        assert_eq!(
            check_transaction(&coinbase(101)).unwrap().code(),
            Some(RejectCode::BadCoinbaseLength)
        );
    }

    #[test]
    fn test_check_transaction_null_prevout() {
        let tx = spend(&[outpoint(1), OutPoint::null()], &[1]);
        assert_eq!(check_transaction(&tx).unwrap().code(), Some(RejectCode::NullPrevout));
    }

    #[test]
    fn test_check_tx_inputs_coinbase() {
        let utxo_set = UtxoSet::new();
        let (result, fee) = check_tx_inputs(&coinbase(2), &utxo_set, 0).unwrap();
        assert_eq!(result, ValidationResult::Valid);
        assert_eq!(fee, 0);
    }

    #[test]
    fn test_check_tx_inputs_fee() {
        let mut utxo_set = UtxoSet::new();
        utxo_set.insert(outpoint(1), coin(5, 10, false));
        utxo_set.insert(outpoint(2), coin(3, 10, false));

        let tx = spend(&[outpoint(1), outpoint(2)], &[7]);
        let (result, fee) = check_tx_inputs(&tx, &utxo_set, 20).unwrap();
        assert!(result.is_valid());
        assert_eq!(fee, 1);

        let greedy = spend(&[outpoint(1), outpoint(2)], &[9]);
        let (result, fee) = check_tx_inputs(&greedy, &utxo_set, 20).unwrap();
        assert_eq!(result.code(), Some(RejectCode::InBelowOut));
        assert_eq!(fee, 0);
    }

    #[test]
    fn test_check_tx_inputs_missing() {
        let utxo_set = UtxoSet::new();
        let tx = spend(&[outpoint(1)], &[1]);
        let (result, _) = check_tx_inputs(&tx, &utxo_set, 1).unwrap();
        assert_eq!(result.code(), Some(RejectCode::MissingInputs));
    }

    #[test]
    fn test_check_tx_inputs_coinbase_maturity() {
        let mut utxo_set = UtxoSet::new();
        utxo_set.insert(outpoint(1), coin(50, 100, true));
        let tx = spend(&[outpoint(1)], &[10]);

        let (result, _) = check_tx_inputs(&tx, &utxo_set, 150).unwrap();
        assert_eq!(result.code(), Some(RejectCode::PrematureSpend));

        let (result, _) = check_tx_inputs(&tx, &utxo_set, 199).unwrap();
        assert_eq!(result.code(), Some(RejectCode::PrematureSpend));

        let (result, fee) = check_tx_inputs(&tx, &utxo_set, 200).unwrap();
        assert!(result.is_valid());
        assert_eq!(fee, 40);
    }

    #[test]
    fn test_check_tx_inputs_value_range() {
        let mut utxo_set = UtxoSet::new();
        utxo_set.insert(outpoint(1), coin(MAX_MONEY, 1, false));
        utxo_set.insert(outpoint(2), coin(1, 1, false));
        utxo_set.insert(outpoint(3), coin(-5, 1, false));

        let overflow = spend(&[outpoint(1), outpoint(2)], &[1]);
        let (result, _) = check_tx_inputs(&overflow, &utxo_set, 2).unwrap();
        assert_eq!(result.code(), Some(RejectCode::InputValuesOutOfRange));

        let negative = spend(&[outpoint(3)], &[0]);
        let (result, _) = check_tx_inputs(&negative, &utxo_set, 2).unwrap();
        assert_eq!(result.code(), Some(RejectCode::InputValuesOutOfRange));
    }

    #[test]
    fn test_check_tx_inputs_output_values() {
        let mut utxo_set = UtxoSet::new();
        utxo_set.insert(outpoint(1), coin(1, 1, false));

        let negative = spend(&[outpoint(1)], &[Integer::MIN]);
        let (result, fee) = check_tx_inputs(&negative, &utxo_set, 10).unwrap();
        assert_eq!(result.code(), Some(RejectCode::NegativeOutput));
        assert_eq!(fee, 0);

        let too_large = spend(&[outpoint(1)], &[MAX_MONEY + 1]);
        let (result, _) = check_tx_inputs(&too_large, &utxo_set, 10).unwrap();
        assert_eq!(result.code(), Some(RejectCode::OutputTooLarge));

        let overflowing_total = spend(&[outpoint(1)], &[MAX_MONEY, MAX_MONEY]);
        let (result, _) = check_tx_inputs(&overflowing_total, &utxo_set, 10).unwrap();
        assert_eq!(result.code(), Some(RejectCode::OutputTotalTooLarge));
    }

    #[test]
    fn test_money_range() {
        assert!(money_range(0));
        assert!(money_range(MAX_MONEY));
        assert!(!money_range(-1));
        assert!(!money_range(MAX_MONEY + 1));
    }
}
