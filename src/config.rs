//! Configuration for consensus-verify
//!
//! Limits and switches for block validation. Settings can be built in code,
//! read from JSON, or overridden through environment variables named
//! `CONSENSUS_VERIFY_BLOCK_VALIDATION_<FIELD>`.

use crate::constants::{
    MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT, SCRIPT_VERIFY_P2SH, SCRIPT_VERIFY_WITNESS,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

const ENV_PREFIX: &str = "CONSENSUS_VERIFY_BLOCK_VALIDATION_";

/// Block validation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockValidationConfig {
    /// Maximum block weight (Bitcoin Core: 4,000,000)
    #[serde(default = "default_max_block_weight")]
    pub max_block_weight: u64,

    /// Maximum total signature operation cost per block (Bitcoin Core: 80,000)
    #[serde(default = "default_max_block_sigops_cost")]
    pub max_block_sigops_cost: i64,

    /// Script verification flags used for sig-op accounting
    #[serde(default = "default_script_flags")]
    pub script_flags: u32,

    /// Reject blocks whose Merkle tree pairs two identical hashes.
    /// Such trees are only logged when this is off.
    #[serde(default)]
    pub reject_mutated_merkle: bool,

    #[serde(default = "default_true")]
    pub enforce_sequence_locks: bool,

    /// Check transactions of a block in parallel (needs the `rayon` feature)
    #[serde(default = "default_true")]
    pub enable_parallel_validation: bool,
}

fn default_max_block_weight() -> u64 {
    MAX_BLOCK_WEIGHT
}

fn default_max_block_sigops_cost() -> i64 {
    MAX_BLOCK_SIGOPS_COST
}

fn default_script_flags() -> u32 {
    SCRIPT_VERIFY_P2SH | SCRIPT_VERIFY_WITNESS
}

fn default_true() -> bool {
    true
}

impl Default for BlockValidationConfig {
    fn default() -> Self {
        Self {
            max_block_weight: default_max_block_weight(),
            max_block_sigops_cost: default_max_block_sigops_cost(),
            script_flags: default_script_flags(),
            reject_mutated_merkle: false,
            enforce_sequence_locks: true,
            enable_parallel_validation: true,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default)]
    pub block_validation: BlockValidationConfig,
}

/// Replace `field` with the parsed value of `CONSENSUS_VERIFY_BLOCK_VALIDATION_<name>`
fn env_override<T: FromStr>(name: &str, field: &mut T) {
    let key = format!("{}{}", ENV_PREFIX, name);
    if let Ok(val) = std::env::var(&key) {
        match val.parse::<T>() {
            Ok(parsed) => *field = parsed,
            Err(_) => warn!("ignoring {}: cannot parse {:?}", key, val),
        }
    }
}

impl ConsensusConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let block = &mut config.block_validation;

        env_override("MAX_BLOCK_WEIGHT", &mut block.max_block_weight);
        env_override("MAX_BLOCK_SIGOPS_COST", &mut block.max_block_sigops_cost);
        env_override("SCRIPT_FLAGS", &mut block.script_flags);
        env_override("REJECT_MUTATED_MERKLE", &mut block.reject_mutated_merkle);
        env_override("ENFORCE_SEQUENCE_LOCKS", &mut block.enforce_sequence_locks);
        env_override(
            "ENABLE_PARALLEL_VALIDATION",
            &mut block.enable_parallel_validation,
        );

        config
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid consensus configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}
