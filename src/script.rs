//! Script inspection for resource accounting
//!
//! Scripts are never executed here. This module only walks their opcodes to
//! count signature operations, recognize standard templates and recover the
//! data pushed by unlock scripts. Validation code reaches these capabilities
//! through the [`ScriptEvaluator`] trait so that a full interpreter can be
//! plugged in instead of [`StandardScript`].

use crate::constants::SCRIPT_VERIFY_WITNESS;
use crate::error::{ConsensusError, Result};
use crate::types::Witness;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// Key count assumed for multisig when it cannot be read from the script
pub const MAX_PUBKEYS_PER_MULTISIG: u32 = 20;

/// One decoded opcode with the bytes it pushes, if it is a data push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub opcode: u8,
    pub push_data: Option<&'a [u8]>,
}

/// Iterator over the instructions of a script.
///
/// Yields an error once and then stops if a push runs past the end.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    script: &'a [u8],
    pos: usize,
    done: bool,
}

pub fn instructions(script: &[u8]) -> Instructions<'_> {
    Instructions {
        script,
        pos: 0,
        done: false,
    }
}

impl<'a> Instructions<'a> {
    fn malformed(&mut self) -> Option<Result<Instruction<'a>>> {
        self.done = true;
        Some(Err(ConsensusError::Serialization(
            format!("script push overruns script at offset {}", self.pos).into(),
        )))
    }

    fn read_len(&self, start: usize, width: usize) -> Option<usize> {
        let bytes = self.script.get(start..start + width)?;
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(bytes);
        Some(u32::from_le_bytes(buf) as usize)
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.script.len() {
            return None;
        }

        let opcode = self.script[self.pos];
        let (header, len) = match opcode {
            0x00..=0x4b => (1, opcode as usize),
            OP_PUSHDATA1 => match self.read_len(self.pos + 1, 1) {
                Some(len) => (2, len),
                None => return self.malformed(),
            },
            OP_PUSHDATA2 => match self.read_len(self.pos + 1, 2) {
                Some(len) => (3, len),
                None => return self.malformed(),
            },
            OP_PUSHDATA4 => match self.read_len(self.pos + 1, 4) {
                Some(len) => (5, len),
                None => return self.malformed(),
            },
            _ => {
                self.pos += 1;
                return Some(Ok(Instruction {
                    opcode,
                    push_data: None,
                }));
            }
        };

        let start = self.pos + header;
        let end = match start.checked_add(len) {
            Some(end) if end <= self.script.len() => end,
            _ => return self.malformed(),
        };
        self.pos = end;
        Some(Ok(Instruction {
            opcode,
            push_data: Some(&self.script[start..end]),
        }))
    }
}

/// Value of OP_1..OP_16 (and 0 for OP_0)
pub fn decode_op_n(opcode: u8) -> Option<u32> {
    match opcode {
        OP_0 => Some(0),
        OP_1..=OP_16 => Some((opcode - OP_1 + 1) as u32),
        _ => None,
    }
}

/// True if the script only pushes data (opcodes up to OP_16) and parses cleanly
pub fn is_push_only(script: &[u8]) -> bool {
    instructions(script).all(|ins| matches!(ins, Ok(i) if i.opcode <= OP_16))
}

/// Data pushed by the last instruction of a push-only script.
///
/// Small-integer pushes (OP_1NEGATE..OP_16) carry no data bytes and yield an
/// empty slice. Returns `None` for an empty, malformed or non-push-only script.
pub fn last_push_data(script: &[u8]) -> Option<&[u8]> {
    let mut last = None;
    for ins in instructions(script) {
        let ins = ins.ok()?;
        if ins.opcode > OP_16 {
            return None;
        }
        last = Some(ins.push_data.unwrap_or(&[]));
    }
    last
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Witness version and program if the script is a witness program
pub fn witness_program(script: &[u8]) -> Option<(u32, &[u8])> {
    if script.len() < 4 || script.len() > 42 {
        return None;
    }
    if script[0] != OP_0 && !(OP_1..=OP_16).contains(&script[0]) {
        return None;
    }
    if script[1] as usize + 2 != script.len() {
        return None;
    }
    Some((decode_op_n(script[0])?, &script[2..]))
}

/// Count signature operations.
///
/// In accurate mode a multisig preceded by OP_1..OP_16 counts that many keys;
/// otherwise every multisig counts [`MAX_PUBKEYS_PER_MULTISIG`]. Counting
/// stops at the first malformed push.
pub fn count_sig_ops(script: &[u8], accurate: bool) -> u32 {
    let mut count = 0u32;
    let mut last_opcode: Option<u8> = None;

    for ins in instructions(script) {
        let Ok(ins) = ins else { break };
        match ins.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count = count.saturating_add(1),
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let keys = match last_opcode {
                    Some(op @ OP_1..=OP_16) if accurate => (op - OP_1 + 1) as u32,
                    _ => MAX_PUBKEYS_PER_MULTISIG,
                };
                count = count.saturating_add(keys);
            }
            _ => {}
        }
        last_opcode = Some(ins.opcode);
    }

    count
}

fn witness_program_sig_ops(version: u32, program: &[u8], witness: &Witness) -> u32 {
    if version != 0 {
        return 0;
    }
    match program.len() {
        20 => 1,
        32 => witness
            .last()
            .map(|witness_script| count_sig_ops(witness_script, true))
            .unwrap_or(0),
        _ => 0,
    }
}

/// Operations on scripts that resource accounting relies on.
pub trait ScriptEvaluator: Send + Sync {
    /// Signature operations in `script`
    fn sig_op_count(&self, script: &[u8], accurate: bool) -> u32;

    /// Signature operations spent through witness data when `script_sig`
    /// unlocks `script_pubkey`
    fn witness_sig_op_count(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        witness: &Witness,
        flags: u32,
    ) -> u32;

    fn is_pay_to_script_hash(&self, script: &[u8]) -> bool;

    /// Signature operations in the redeem script pushed last by `script_sig`
    fn p2sh_sig_op_count(&self, script_sig: &[u8]) -> u32 {
        last_push_data(script_sig)
            .map(|redeem| self.sig_op_count(redeem, true))
            .unwrap_or(0)
    }
}

/// Evaluator for the standard templates: P2SH, P2WPKH, P2WSH and
/// P2SH-wrapped witness programs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScript;

impl ScriptEvaluator for StandardScript {
    fn sig_op_count(&self, script: &[u8], accurate: bool) -> u32 {
        count_sig_ops(script, accurate)
    }

    fn witness_sig_op_count(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        witness: &Witness,
        flags: u32,
    ) -> u32 {
        if flags & SCRIPT_VERIFY_WITNESS == 0 {
            return 0;
        }

        if let Some((version, program)) = witness_program(script_pubkey) {
            return witness_program_sig_ops(version, program, witness);
        }

        if is_pay_to_script_hash(script_pubkey) && is_push_only(script_sig) {
            if let Some((version, program)) = last_push_data(script_sig).and_then(witness_program) {
                return witness_program_sig_ops(version, program, witness);
            }
        }

        0
    }

    fn is_pay_to_script_hash(&self, script: &[u8]) -> bool {
        is_pay_to_script_hash(script)
    }
}
