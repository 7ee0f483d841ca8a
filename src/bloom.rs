//! BIP37 bloom filter used to select transactions for filtered blocks

use crate::encoding::{encode_varint, Reader};
use crate::error::{ConsensusError, Result};
use crate::hash::calculate_tx_id;
use crate::script::{decode_op_n, instructions, OP_CHECKMULTISIG, OP_CHECKSIG};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;

/// Largest filter accepted, in bytes
pub const MAX_BLOOM_FILTER_SIZE: usize = 36_000;
/// Largest number of hash functions accepted
pub const MAX_HASH_FUNCS: u32 = 50;

const SEED_MULTIPLIER: u32 = 0xFBA4C795;

/// Decides whether a transaction belongs in a filtered block. Implementations
/// may learn from what they match.
pub trait TransactionFilter {
    fn is_relevant_and_update(&mut self, tx: &Transaction) -> bool;
}

/// Which outpoints a filter adds to itself when an output script matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloomUpdate {
    None,
    All,
    /// Only outputs paying to a bare public key or a bare multisig
    P2PubKeyOnly,
}

impl BloomUpdate {
    fn to_byte(self) -> u8 {
        match self {
            BloomUpdate::None => 0,
            BloomUpdate::All => 1,
            BloomUpdate::P2PubKeyOnly => 2,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte & 0x03 {
            0 => Ok(BloomUpdate::None),
            1 => Ok(BloomUpdate::All),
            2 => Ok(BloomUpdate::P2PubKeyOnly),
            other => Err(ConsensusError::Serialization(
                format!("unknown bloom update flag {}", other).into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    data: Vec<u8>,
    hash_funcs: u32,
    tweak: u32,
    flags: BloomUpdate,
}

impl BloomFilter {
    /// Size a filter for `elements` insertions at the target false-positive rate
    pub fn new(elements: u32, fp_rate: f64, tweak: u32, flags: BloomUpdate) -> Self {
        let elements = elements.max(1) as usize;
        let bits = ((-1.0 / (LN_2 * LN_2) * elements as f64 * fp_rate.ln()) as usize)
            .min(MAX_BLOOM_FILTER_SIZE * 8);
        let size = (bits / 8).max(1);
        let hash_funcs = ((size * 8 / elements) as f64 * LN_2) as u32;

        Self {
            data: vec![0u8; size],
            hash_funcs: hash_funcs.clamp(1, MAX_HASH_FUNCS),
            tweak,
            flags,
        }
    }

    pub fn flags(&self) -> BloomUpdate {
        self.flags
    }

    pub fn is_within_size_constraints(&self) -> bool {
        self.data.len() <= MAX_BLOOM_FILTER_SIZE && self.hash_funcs <= MAX_HASH_FUNCS
    }

    fn bit_index(&self, n: u32, key: &[u8]) -> usize {
        let seed = n.wrapping_mul(SEED_MULTIPLIER).wrapping_add(self.tweak);
        murmur3(seed, key) as usize % (self.data.len() * 8)
    }

    pub fn insert(&mut self, key: &[u8]) {
        if self.data.is_empty() {
            return;
        }
        for n in 0..self.hash_funcs {
            let index = self.bit_index(n, key);
            self.data[index >> 3] |= 1 << (index & 7);
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        if self.data.is_empty() {
            return false;
        }
        (0..self.hash_funcs).all(|n| {
            let index = self.bit_index(n, key);
            self.data[index >> 3] & (1 << (index & 7)) != 0
        })
    }

    pub fn insert_outpoint(&mut self, outpoint: &OutPoint) {
        self.insert(&outpoint_key(outpoint));
    }

    pub fn contains_outpoint(&self, outpoint: &OutPoint) -> bool {
        self.contains(&outpoint_key(outpoint))
    }

    /// `filterload` wire form
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = encode_varint(self.data.len() as u64);
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&self.hash_funcs.to_le_bytes());
        data.extend_from_slice(&self.tweak.to_le_bytes());
        data.push(self.flags.to_byte());
        data
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let len = reader.read_length(1)?;
        let data = reader.read_bytes(len)?.to_vec();
        let hash_funcs = reader.read_u32_le()?;
        let tweak = reader.read_u32_le()?;
        let flags = BloomUpdate::from_byte(reader.read_u8()?)?;
        reader.finish()?;

        let filter = Self {
            data,
            hash_funcs,
            tweak,
            flags,
        };
        if !filter.is_within_size_constraints() {
            return Err(ConsensusError::Serialization(
                format!(
                    "bloom filter of {} bytes with {} hash functions exceeds limits",
                    filter.data.len(),
                    filter.hash_funcs
                )
                .into(),
            ));
        }
        Ok(filter)
    }
}

impl TransactionFilter for BloomFilter {
    /// Match on the txid, any data pushed by an output script, any spent
    /// outpoint, or any data pushed by an input script. Matching outputs are
    /// added to the filter per its update flag so later spends also match.
    fn is_relevant_and_update(&mut self, tx: &Transaction) -> bool {
        let txid = calculate_tx_id(tx);
        let mut found = self.contains(&txid);

        for (index, output) in tx.outputs.iter().enumerate() {
            let matched = instructions(&output.script_pubkey)
                .map_while(|ins| ins.ok())
                .filter_map(|ins| ins.push_data)
                .any(|data| !data.is_empty() && self.contains(data));
            if !matched {
                continue;
            }
            found = true;
            let outpoint = OutPoint {
                hash: txid,
                index: index as Natural,
            };
            match self.flags {
                BloomUpdate::All => self.insert_outpoint(&outpoint),
                BloomUpdate::P2PubKeyOnly if is_pubkey_or_multisig(&output.script_pubkey) => {
                    self.insert_outpoint(&outpoint)
                }
                _ => {}
            }
        }

        if found {
            return true;
        }

        tx.inputs.iter().any(|input| {
            self.contains_outpoint(&input.prevout)
                || instructions(&input.script_sig)
                    .map_while(|ins| ins.ok())
                    .filter_map(|ins| ins.push_data)
                    .any(|data| !data.is_empty() && self.contains(data))
        })
    }
}

fn outpoint_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(&outpoint.hash);
    key[32..].copy_from_slice(&(outpoint.index as u32).to_le_bytes());
    key
}

/// `<pubkey> OP_CHECKSIG` or `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`
fn is_pubkey_or_multisig(script: &[u8]) -> bool {
    let Ok(ops) = instructions(script).collect::<Result<Vec<_>>>() else {
        return false;
    };
    let is_pubkey = |data: Option<&[u8]>| matches!(data, Some(d) if d.len() == 33 || d.len() == 65);

    match ops.as_slice() {
        [key, checksig] => checksig.opcode == OP_CHECKSIG && is_pubkey(key.push_data),
        [first, keys @ .., last_n, checkmultisig] if !keys.is_empty() => {
            let required = decode_op_n(first.opcode).filter(|&m| m >= 1);
            let total = decode_op_n(last_n.opcode);
            checkmultisig.opcode == OP_CHECKMULTISIG
                && first.push_data.is_none()
                && last_n.push_data.is_none()
                && matches!((required, total), (Some(m), Some(n)) if m <= n && n as usize == keys.len())
                && keys.iter().all(|k| is_pubkey(k.push_data))
        }
        _ => false,
    }
}

/// MurmurHash3 (x86, 32-bit)
pub fn murmur3(seed: u32, data: &[u8]) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut h1 = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let mut k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k1 ^= (byte as u32) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;
    h1
}
