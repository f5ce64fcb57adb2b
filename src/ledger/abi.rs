//! ABI encoding and decoding for ledger program calls.
//!
//! Call data is a 4-byte Keccak-256 selector followed by head/tail encoded
//! arguments: static values occupy one 32-byte head word, dynamic values put
//! a byte offset in the head and their length-prefixed, zero-padded content
//! in the tail.

use crate::error::{ChainTraceError, Result};
use primitive_types::U256;
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

/// Argument values the ledger program calls use
#[derive(Debug, Clone)]
pub enum AbiValue {
    Uint(U256),
    Str(String),
}

/// First four bytes of the Keccak-256 hash of the function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Encode a full call: selector plus head/tail encoded arguments
pub fn encode_call(signature: &str, values: &[AbiValue]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend_from_slice(&encode_values(values));
    out
}

fn encode_values(values: &[AbiValue]) -> Vec<u8> {
    let head_len = values.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for value in values {
        match value {
            AbiValue::Uint(n) => {
                let mut word = [0u8; WORD];
                n.to_big_endian(&mut word);
                head.extend_from_slice(&word);
            }
            AbiValue::Str(s) => {
                head.extend_from_slice(&usize_word(head_len + tail.len()));
                tail.extend_from_slice(&encode_bytes(s.as_bytes()));
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Length word followed by content zero-padded to a word boundary
fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded);
    out.extend_from_slice(&usize_word(bytes.len()));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

fn usize_word(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn read_word(data: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * WORD;
    data.get(start..start + WORD)
        .ok_or_else(|| ChainTraceError::Abi(format!("data truncated at word {}", index)))
}

/// Interpret a word as a small offset or length. Values that cannot fit in
/// memory are treated as malformed rather than allocated.
fn word_to_usize(word: &[u8]) -> Result<usize> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(ChainTraceError::Abi("oversized length word".to_string()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    let value = u64::from_be_bytes(buf);
    usize::try_from(value).map_err(|_| ChainTraceError::Abi("oversized length word".to_string()))
}

/// Decode a length-prefixed string at an absolute byte offset
fn decode_string_at(data: &[u8], offset: usize) -> Result<String> {
    let len_word = data
        .get(offset..offset + WORD)
        .ok_or_else(|| ChainTraceError::Abi("string offset out of bounds".to_string()))?;
    let len = word_to_usize(len_word)?;
    let content = data
        .get(offset + WORD..offset + WORD + len)
        .ok_or_else(|| ChainTraceError::Abi("string content out of bounds".to_string()))?;
    String::from_utf8(content.to_vec())
        .map_err(|_| ChainTraceError::Abi("string is not valid UTF-8".to_string()))
}

/// Decode a `string[]` return value
pub fn decode_string_array(data: &[u8]) -> Result<Vec<String>> {
    let array_offset = word_to_usize(read_word(data, 0)?)?;
    let len_word = data
        .get(array_offset..array_offset + WORD)
        .ok_or_else(|| ChainTraceError::Abi("array offset out of bounds".to_string()))?;
    let count = word_to_usize(len_word)?;

    // element offsets are relative to the start of the element area
    let elements_base = array_offset + WORD;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let rel_word = data
            .get(elements_base + i * WORD..elements_base + (i + 1) * WORD)
            .ok_or_else(|| ChainTraceError::Abi("array element table truncated".to_string()))?;
        let rel = word_to_usize(rel_word)?;
        out.push(decode_string_at(data, elements_base + rel)?);
    }
    Ok(out)
}

/// Decode a `(string, bytes32)` return value
pub fn decode_string_bytes32(data: &[u8]) -> Result<(String, [u8; 32])> {
    let string_offset = word_to_usize(read_word(data, 0)?)?;
    let hash_word = read_word(data, 1)?;
    let mut hash = [0u8; 32];
    hash.copy_from_slice(hash_word);
    let s = decode_string_at(data, string_offset)?;
    Ok((s, hash))
}
