//! Register word reassembly.
//!
//! The sensor transmits 32-bit quantities as two registers, low word first,
//! each register carrying its own bytes high-byte first. Floats and `u32`
//! values share that layout.

pub fn decode_u16(words: &[u16], offset: usize) -> u16 {
    words[offset]
}

/// Joins `words[low]` and `words[high]` into one value, `high` in the upper half.
pub fn decode_u32(words: &[u16], low: usize, high: usize) -> u32 {
    u32::from(words[low]) | (u32::from(words[high]) << 16)
}

pub fn decode_float(words: &[u16], offset: usize) -> f32 {
    f32::from_bits(decode_u32(words, offset, offset + 1))
}

pub fn encode_u32(value: u32) -> [u16; 2] {
    let [b0, b1, b2, b3] = value.to_le_bytes();
    [
        u16::from_le_bytes([b0, b1]),
        u16::from_le_bytes([b2, b3]),
    ]
}

pub fn encode_float(value: f32) -> [u16; 2] {
    encode_u32(value.to_bits())
}

/// Unpacks register text, two characters per word, high byte first.
pub fn decode_ascii(words: &[u16]) -> String {
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
    String::from_utf8_lossy(&bytes)
        .trim_end_matches(['\0', ' '])
        .to_string()
}
