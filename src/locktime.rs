//! Absolute lock time finality and sequence-number field helpers

use crate::constants::*;
use crate::error::RejectCode;
use crate::types::*;

/// Lock times below the threshold are heights, the rest are timestamps
pub fn is_height_lock_time(lock_time: Natural) -> bool {
    lock_time < LOCKTIME_THRESHOLD as Natural
}

/// True if relative lock time is switched off for this input (bit 31)
pub fn is_sequence_disabled(sequence: Natural) -> bool {
    (sequence as u32) & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0
}

/// True if the relative lock is measured in 512-second units (bit 22)
pub fn is_time_based_sequence(sequence: Natural) -> bool {
    (sequence as u32) & SEQUENCE_LOCKTIME_TYPE_FLAG != 0
}

/// Relative lock value held in the low 16 bits
pub fn sequence_lock_value(sequence: Natural) -> Integer {
    ((sequence as u32) & SEQUENCE_LOCKTIME_MASK) as Integer
}

/// Whether `tx` may be included in a block at `block_height` / `block_time`.
///
/// A zero lock time is always final. Otherwise the lock time is compared with
/// the height or the time, depending on its range, and the transaction is
/// final once that clock has reached it. A transaction whose inputs all use
/// the final sequence number ignores its lock time.
pub fn is_final_tx(tx: &Transaction, block_height: Natural, block_time: Natural) -> bool {
    if tx.lock_time == 0 {
        return true;
    }

    let clock = if is_height_lock_time(tx.lock_time) {
        block_height
    } else {
        block_time
    };
    if clock >= tx.lock_time {
        return true;
    }

    tx.inputs
        .iter()
        .all(|input| input.sequence == SEQUENCE_FINAL as Natural)
}

/// [`is_final_tx`] as a validation verdict
pub fn check_final_tx(tx: &Transaction, block_height: Natural, block_time: Natural) -> ValidationResult {
    if is_final_tx(tx, block_height, block_time) {
        return ValidationResult::Valid;
    }
    let (clock, value) = if is_height_lock_time(tx.lock_time) {
        ("height", block_height)
    } else {
        ("time", block_time)
    };
    ValidationResult::invalid(
        RejectCode::NonFinal,
        format!("lock time {} not reached at {} {}", tx.lock_time, clock, value),
    )
}
