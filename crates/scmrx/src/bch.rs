//! BCH error detection and correction
//!
//! The SCM payload is protected by a shortened binary BCH code with
//! generator polynomial `0x16F63`. Syndromes are computed with a linear
//! feedback shift register over the 80 payload bits. Correction is a
//! table lookup: every error pattern up to the configured weight is
//! enumerated once at startup and indexed by its syndrome.

use std::collections::HashMap;
use std::fmt;

/// Generator polynomial for the SCM checksum
pub const GEN_POLY: u32 = 0x16F63;

/// Protected message length in bytes
pub const MSG_LEN: usize = 10;

/// Error weight corrected by the deployed code
pub const ERROR_COUNT: usize = 1;

/// Shortened BCH codec with a precomputed syndrome table
///
/// Immutable once constructed; [`encode`](Bch::encode) is pure and only
/// [`correct`](Bch::correct) mutates its input buffer.
#[derive(Clone, Debug)]
pub struct Bch {
    gen_poly: u32,
    poly_len: u32,
    syndromes: HashMap<u32, Vec<u32>>,
}

/// Outcome of a correction attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Correction {
    /// Syndrome was already zero; the buffer was left untouched
    Clean,
    /// These bit positions were flipped and the residual syndrome is zero
    Corrected(Vec<u32>),
    /// Nonzero residual syndrome; the message is not recoverable
    Failed(u32),
}

impl Correction {
    /// True unless the residual syndrome is nonzero
    pub fn is_valid(&self) -> bool {
        !matches!(self, Correction::Failed(_))
    }
}

impl Bch {
    /// Build the codec for `gen_poly`, correcting up to `error_count`
    /// bit errors over an `msg_len`-byte message
    ///
    /// The table construction enumerates every error pattern of weight
    /// `≤ error_count`, so the cost grows as `(8·msg_len)^error_count`.
    /// The deployed configuration ([`GEN_POLY`], [`MSG_LEN`],
    /// [`ERROR_COUNT`]) builds 80 entries.
    pub fn new(gen_poly: u32, msg_len: usize, error_count: usize) -> Self {
        let poly_len = 31 - gen_poly.leading_zeros();
        let mut bch = Self {
            gen_poly,
            poly_len,
            syndromes: HashMap::new(),
        };
        bch.compute_syndromes(msg_len, error_count);
        bch
    }

    /// The codec used on SCM payloads
    pub fn new_scm() -> Self {
        Self::new(GEN_POLY, MSG_LEN, ERROR_COUNT)
    }

    /// Syndrome of `data`, zero iff no detected error
    ///
    /// Shift-register long division: shift each message bit into the
    /// register and reduce by the generator whenever the register
    /// reaches the generator's degree.
    pub fn encode(&self, data: &[u8]) -> u32 {
        let mut checksum: u32 = 0;
        for &byte in data {
            for bit in 0..8 {
                checksum = (checksum << 1) | u32::from((byte >> (7 - bit)) & 1);
                if checksum >> self.poly_len != 0 {
                    checksum ^= self.gen_poly;
                }
            }
        }
        checksum & ((1u32 << self.poly_len) - 1)
    }

    /// Correct `data` in place
    ///
    /// Computes the syndrome, looks up the matching error pattern, and
    /// flips the indicated bits. The flipped positions count from the
    /// least significant bit of `data[0]`.
    pub fn correct(&self, data: &mut [u8]) -> Correction {
        let syndrome = self.encode(data);
        if syndrome == 0 {
            return Correction::Clean;
        }

        let positions = match self.syndromes.get(&syndrome) {
            Some(positions) => positions.clone(),
            None => return Correction::Failed(syndrome),
        };
        for &pos in &positions {
            data[(pos >> 3) as usize] ^= 1 << (pos % 8);
        }

        // re-verify: a pattern of the wrong weight leaves a residual
        match self.encode(data) {
            0 => Correction::Corrected(positions),
            residual => Correction::Failed(residual),
        }
    }

    /// Number of correctable syndromes
    pub fn syndrome_count(&self) -> usize {
        self.syndromes.len()
    }

    /// Bit length of the checksum
    pub fn poly_len(&self) -> u32 {
        self.poly_len
    }

    fn compute_syndromes(&mut self, msg_len: usize, error_count: usize) {
        let mut data = vec![0u8; msg_len];
        let mut prefix = Vec::with_capacity(error_count);
        self.compute_helper(msg_len, error_count, &mut prefix, &mut data);
    }

    // Depth-first enumeration of error patterns: toggle a bit, register
    // the syndrome of the pattern so far, recurse for heavier patterns,
    // untoggle. First-seen pattern wins for each syndrome.
    fn compute_helper(
        &mut self,
        msg_len: usize,
        depth: usize,
        prefix: &mut Vec<u32>,
        data: &mut [u8],
    ) {
        if depth == 0 {
            return;
        }

        for pos in 0..(msg_len << 3) as u32 {
            if prefix.contains(&pos) {
                continue;
            }

            data[(pos >> 3) as usize] ^= 1 << (pos % 8);

            let syndrome = self.encode(data);
            if syndrome != 0 && !self.syndromes.contains_key(&syndrome) {
                let mut pattern = prefix.clone();
                pattern.push(pos);
                self.syndromes.insert(syndrome, pattern);
            }

            prefix.push(pos);
            self.compute_helper(msg_len, depth - 1, prefix, data);
            prefix.pop();

            data[(pos >> 3) as usize] ^= 1 << (pos % 8);
        }
    }
}

impl fmt::Display for Bch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{GenPoly:{:X} PolyLen:{} Syndromes:{}}}",
            self.gen_poly,
            self.poly_len,
            self.syndromes.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poly_len() {
        let bch = Bch::new_scm();
        assert_eq!(bch.poly_len(), 16);
    }

    #[test]
    fn test_table_covers_all_single_errors() {
        let bch = Bch::new_scm();
        // 80 distinct weight-one syndromes, none of them zero
        assert_eq!(bch.syndrome_count(), 80);
        assert!(!bch.syndromes.contains_key(&0));
        for positions in bch.syndromes.values() {
            assert_eq!(positions.len(), 1);
        }
    }

    #[test]
    fn test_zero_message() {
        let bch = Bch::new_scm();
        let mut data = [0u8; MSG_LEN];
        assert_eq!(bch.encode(&data), 0);
        assert_eq!(bch.correct(&mut data), Correction::Clean);
        assert_eq!(data, [0u8; MSG_LEN]);
    }

    #[test]
    fn test_single_error_roundtrip() {
        let bch = Bch::new_scm();
        let message: [u8; MSG_LEN] = [0xA5, 0x3C, 0x00, 0xFF, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];

        for pos in 0..(MSG_LEN * 8) as u32 {
            let mut data = message;
            data[(pos >> 3) as usize] ^= 1 << (pos % 8);
            assert_ne!(bch.encode(&data), 0, "flip of bit {} undetected", pos);

            match bch.correct(&mut data) {
                Correction::Corrected(positions) => assert_eq!(positions, vec![pos]),
                other => panic!("bit {}: expected correction, got {:?}", pos, other),
            }
            assert_eq!(data, message, "bit {} not restored", pos);
        }
    }

    #[test]
    fn test_double_error_rejected() {
        let bch = Bch::new_scm();
        let mut data = [0u8; MSG_LEN];
        data[1] ^= 0x01;
        data[7] ^= 0x40;
        assert!(!bch.correct(&mut data).is_valid());
    }

    #[test]
    fn test_encode_linearity() {
        let bch = Bch::new_scm();
        let a: [u8; MSG_LEN] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99];
        let b: [u8; MSG_LEN] = [0xFE, 0xDC, 0xBA, 0x98, 0x76, 0x54, 0x32, 0x10, 0x0F, 0xF0];
        let mut xored = [0u8; MSG_LEN];
        for (out, (&x, &y)) in xored.iter_mut().zip(a.iter().zip(b.iter())) {
            *out = x ^ y;
        }
        assert_eq!(bch.encode(&xored), bch.encode(&a) ^ bch.encode(&b));
    }

    #[test]
    fn test_bit_zero_matches_table() {
        let bch = Bch::new_scm();
        let mut data = [0u8; MSG_LEN];
        data[0] ^= 0x01;
        let syndrome = bch.encode(&data);
        assert_eq!(bch.syndromes.get(&syndrome), Some(&vec![0u32]));

        match bch.correct(&mut data) {
            Correction::Corrected(positions) => assert_eq!(positions, vec![0]),
            other => panic!("expected correction, got {:?}", other),
        }
        assert_eq!(data, [0u8; MSG_LEN]);
    }

    #[test]
    fn test_weight_two_table() {
        // the recursion generalizes past the deployed weight
        let bch = Bch::new(GEN_POLY, 2, 2);
        assert!(bch.syndrome_count() > 16);
        for positions in bch.syndromes.values() {
            assert!(positions.len() <= 2);
        }

        let mut data = [0u8; 2];
        data[0] ^= 0x12;
        let outcome = bch.correct(&mut data);
        assert!(outcome.is_valid());
        assert_eq!(data, [0u8; 2]);
    }
}
