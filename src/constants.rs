//! Consensus constants

/// Maximum money supply: 21,000,000 coins in base units
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Maximum block weight (with SegWit)
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// Legacy sizes count this many times towards weight
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Smallest weight a valid transaction can have (60 stripped bytes)
pub const MIN_TRANSACTION_WEIGHT: u64 = WITNESS_SCALE_FACTOR * 60;

/// Maximum sig-op cost per block
pub const MAX_BLOCK_SIGOPS_COST: i64 = 80_000;

/// Blocks a coinbase output must wait before it can be spent
pub const COINBASE_MATURITY: u64 = 100;

/// Number of ancestors considered for median time past
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Lock time threshold: values below are block heights, values at or above are timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number that disables lock time for the input
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Sequence bit 31: relative lock time disabled for this input
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// Sequence bit 22: relative lock time is time based (512 s units)
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Sequence bits 0-15 hold the relative lock time value
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

/// Time-based relative locks are expressed in units of 2^9 seconds
pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9;

/// Script verification flag: evaluate P2SH redeem scripts
pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;

/// Script verification flag: evaluate witness programs
pub const SCRIPT_VERIFY_WITNESS: u32 = 1 << 11;

/// Coinbase script length bounds
pub const MIN_COINBASE_SCRIPT_SIZE: usize = 2;
pub const MAX_COINBASE_SCRIPT_SIZE: usize = 100;

/// Serialized block header size
pub const BLOCK_HEADER_SIZE: usize = 80;
