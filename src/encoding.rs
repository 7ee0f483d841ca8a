//! Wire encoding helpers: compact-size integers, headers and transactions

use crate::constants::BLOCK_HEADER_SIZE;
use crate::error::{ConsensusError, Result};
use crate::types::*;

/// Encode a number as a compact-size varint
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut result = vec![0xfd];
        result.extend_from_slice(&(value as u16).to_le_bytes());
        result
    } else if value <= 0xffffffff {
        let mut result = vec![0xfe];
        result.extend_from_slice(&(value as u32).to_le_bytes());
        result
    } else {
        let mut result = vec![0xff];
        result.extend_from_slice(&value.to_le_bytes());
        result
    }
}

/// Cursor over a byte slice for decoding wire data
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ConsensusError::Serialization(
                format!(
                    "unexpected end of data: wanted {} bytes at offset {}, {} left",
                    len,
                    self.pos,
                    self.remaining()
                )
                .into(),
            ));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_hash(&mut self) -> Result<Hash> {
        let bytes = self.read_bytes(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(bytes);
        Ok(hash)
    }

    /// Read a compact-size varint, rejecting non-canonical encodings
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, min) = match self.read_u8()? {
            0xfd => (self.read_u16_le()? as u64, 0xfd),
            0xfe => (self.read_u32_le()? as u64, 0x1_0000),
            0xff => (self.read_u64_le()?, 0x1_0000_0000),
            small => return Ok(small as u64),
        };
        if value < min {
            return Err(ConsensusError::Serialization(
                format!("non-canonical compact size {}", value).into(),
            ));
        }
        Ok(value)
    }

    /// Read a length prefix for items of `item_size` bytes, bounded by the data left
    pub fn read_length(&mut self, item_size: usize) -> Result<usize> {
        let len = self.read_varint()?;
        let available = (self.remaining() / item_size.max(1)) as u64;
        if len > available {
            return Err(ConsensusError::Serialization(
                format!("length prefix {} exceeds remaining data", len).into(),
            ));
        }
        Ok(len as usize)
    }

    /// Fail if any bytes are left over
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(ConsensusError::Serialization(
                format!("{} trailing bytes", self.remaining()).into(),
            ));
        }
        Ok(())
    }
}

/// Serialize a block header to its 80-byte wire form
pub fn serialize_header(header: &BlockHeader) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(BLOCK_HEADER_SIZE);

    bytes.extend_from_slice(&(header.version as u32).to_le_bytes());
    bytes.extend_from_slice(&header.prev_block_hash);
    bytes.extend_from_slice(&header.merkle_root);
    bytes.extend_from_slice(&(header.timestamp as u32).to_le_bytes());
    bytes.extend_from_slice(&(header.bits as u32).to_le_bytes());
    bytes.extend_from_slice(&(header.nonce as u32).to_le_bytes());

    bytes
}

pub fn read_header(reader: &mut Reader<'_>) -> Result<BlockHeader> {
    Ok(BlockHeader {
        version: reader.read_u32_le()? as i32 as Integer,
        prev_block_hash: reader.read_hash()?,
        merkle_root: reader.read_hash()?,
        timestamp: reader.read_u32_le()? as Natural,
        bits: reader.read_u32_le()? as Natural,
        nonce: reader.read_u32_le()? as Natural,
    })
}

/// Serialize a transaction; with `include_witness` the BIP144 extended form
/// is produced whenever any input carries witness data.
pub fn serialize_transaction(tx: &Transaction, include_witness: bool) -> Vec<u8> {
    let with_witness = include_witness && tx.has_witness();
    let mut data = Vec::new();

    data.extend_from_slice(&(tx.version as u32).to_le_bytes());

    if with_witness {
        // marker + flag
        data.extend_from_slice(&[0x00, 0x01]);
    }

    data.extend_from_slice(&encode_varint(tx.inputs.len() as u64));
    for input in &tx.inputs {
        data.extend_from_slice(&input.prevout.hash);
        data.extend_from_slice(&(input.prevout.index as u32).to_le_bytes());
        data.extend_from_slice(&encode_varint(input.script_sig.len() as u64));
        data.extend_from_slice(&input.script_sig);
        data.extend_from_slice(&(input.sequence as u32).to_le_bytes());
    }

    data.extend_from_slice(&encode_varint(tx.outputs.len() as u64));
    for output in &tx.outputs {
        data.extend_from_slice(&(output.value as u64).to_le_bytes());
        data.extend_from_slice(&encode_varint(output.script_pubkey.len() as u64));
        data.extend_from_slice(&output.script_pubkey);
    }

    if with_witness {
        for input in &tx.inputs {
            data.extend_from_slice(&encode_varint(input.witness.len() as u64));
            for item in &input.witness {
                data.extend_from_slice(&encode_varint(item.len() as u64));
                data.extend_from_slice(item);
            }
        }
    }

    data.extend_from_slice(&(tx.lock_time as u32).to_le_bytes());

    data
}
