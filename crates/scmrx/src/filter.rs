//! Matched filtering and bit slicing
//!
//! A Manchester symbol is one half-symbol of carrier followed by one of
//! silence, or the reverse. The matched filter integrates each half and
//! subtracts, collapsing every symbol pair into a single soft decision
//! whose sign is the transmitted bit.

use crate::waveform::{int_round, SYMBOL_LENGTH};

/// Soft decisions per packet (one per Manchester symbol pair)
pub const SOFT_DECISIONS: usize = 96;

/// Integrate-and-dump matched filter
///
/// For decision `k`, sums the samples of the first half-symbol and
/// subtracts the samples of the second: positive output for `1 → (+,−)`,
/// negative for `0 → (−,+)`. `input` starts at the packet alignment and
/// must cover a full packet plus one half-symbol of slack.
pub fn matched_filter(input: &[f64]) -> [f64; SOFT_DECISIONS] {
    let mut output = [0.0; SOFT_DECISIONS];
    for (k, out) in output.iter_mut().enumerate() {
        let start = k as f64 * 2.0 * SYMBOL_LENGTH;
        let lower = int_round(start) as usize;
        let upper = int_round(start + SYMBOL_LENGTH) as usize;
        for i in 0..(upper - lower) {
            *out += input[lower + i] - input[upper + i];
        }
    }
    output
}

/// Threshold soft decisions at zero
pub fn slice(soft: &[f64; SOFT_DECISIONS]) -> [bool; SOFT_DECISIONS] {
    let mut bits = [false; SOFT_DECISIONS];
    for (bit, &value) in bits.iter_mut().zip(soft.iter()) {
        *bit = value > 0.0;
    }
    bits
}

/// Pack bits into bytes, most significant bit first
///
/// `bits` must hold exactly `8 * out.len()` decisions.
pub fn pack_bits_into(bits: &[bool], out: &mut [u8]) {
    debug_assert_eq!(bits.len(), out.len() * 8);
    for (chunk, byte) in bits.chunks_exact(8).zip(out.iter_mut()) {
        *byte = chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit));
    }
}

/// Unpack bytes into bits, most significant bit first
///
/// The inverse of [`pack_bits_into`]; used to rebuild the frame after
/// in-place error correction.
pub fn unpack_bits_into(bytes: &[u8], bits: &mut [bool]) {
    debug_assert_eq!(bits.len(), bytes.len() * 8);
    for (byte, chunk) in bytes.iter().zip(bits.chunks_exact_mut(8)) {
        for (offset, bit) in chunk.iter_mut().enumerate() {
            *bit = (byte >> (7 - offset)) & 1 == 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::modulate_bits;

    #[test]
    fn test_matched_filter_signs() {
        // an alternating pattern stresses every transition
        let mut bits = [false; SOFT_DECISIONS];
        for (idx, bit) in bits.iter_mut().enumerate() {
            *bit = idx % 2 == 0 || idx % 7 == 0;
        }

        let envelope = modulate_bits(&bits);
        let soft = matched_filter(&envelope);

        for (idx, (&bit, &value)) in bits.iter().zip(soft.iter()).enumerate() {
            assert!(
                (value > 0.0) == bit,
                "decision {}: sent {}, soft {}",
                idx,
                bit,
                value
            );
        }

        // an ideal symbol integrates to roughly the half-symbol length
        assert!(soft.iter().all(|v| v.abs() > 0.9 * SYMBOL_LENGTH));
    }

    #[test]
    fn test_slice_matches_filter_convention() {
        let mut soft = [0.0; SOFT_DECISIONS];
        soft[0] = 62.5;
        soft[1] = -62.5;
        soft[2] = 0.0;
        let bits = slice(&soft);
        assert!(bits[0]);
        assert!(!bits[1]);
        assert!(!bits[2]);
    }

    #[test]
    fn test_pack_unpack() {
        let mut bits = [false; 16];
        bits[0] = true; // 0x80
        bits[7] = true; // 0x01
        bits[9] = true; // 0x40

        let mut bytes = [0u8; 2];
        pack_bits_into(&bits, &mut bytes);
        assert_eq!(bytes, [0x81, 0x40]);

        let mut unpacked = [false; 16];
        unpack_bits_into(&bytes, &mut unpacked);
        assert_eq!(unpacked, bits);
    }
}
