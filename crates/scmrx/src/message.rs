//! The Standard Consumption Message
//!
//! An SCM is a 96-bit frame: a 21-bit preamble, a handful of fixed
//! bitfields, and a 16-bit BCH checksum. This module extracts the typed
//! record from a validated frame and can run the construction in
//! reverse, which meter simulation and the test suite rely on.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

use crate::bch::Bch;
use crate::filter::pack_bits_into;
use crate::waveform::preamble_bits;

/// Bits in a complete SCM frame
pub const FRAME_BITS: usize = 96;

/// Bytes in the BCH-protected payload (frame bits 16..96)
pub const PAYLOAD_BYTES: usize = 10;

// Field offsets within the 96-bit frame.
const ID_HIGH: Range<usize> = 21..23;
const TAMPER_PHY: Range<usize> = 24..26;
const MSG_TYPE: Range<usize> = 26..30;
const TAMPER_ENC: Range<usize> = 30..32;
const CONSUMPTION: Range<usize> = 32..56;
const ID_LOW: Range<usize> = 56..80;
const CHECKSUM: Range<usize> = 80..96;

/// Errors from SCM frame parsing
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A frame of the wrong length reached the parser. The pipeline
    /// always slices exactly [`FRAME_BITS`] decisions, so this is a
    /// programming error rather than a channel condition.
    #[error("malformed frame: expected 96 bits, got {0}")]
    MalformedFrame(usize),
}

/// Endpoint tamper flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tamper {
    /// Physical tamper indicator (2 bits)
    pub phy: u8,
    /// Encoder tamper indicator (2 bits)
    pub enc: u8,
}

impl fmt::Display for Tamper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Phy:{} Enc:{}}}", self.phy, self.enc)
    }
}

/// A decoded Standard Consumption Message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scm {
    /// Endpoint identifier (26 bits)
    pub id: u32,
    /// Commodity / endpoint type (4 bits)
    pub msg_type: u8,
    /// Tamper flags
    pub tamper: Tamper,
    /// Consumption reading (24 bits)
    pub consumption: u32,
    /// BCH checksum as transmitted (16 bits)
    pub checksum: u16,
}

impl Scm {
    /// Parse a validated 96-bit frame
    ///
    /// The endpoint identifier is split across the frame: its two high
    /// bits ride just after the preamble and the low 24 bits sit past
    /// the consumption field.
    pub fn parse(bits: &[bool]) -> Result<Scm, FrameError> {
        if bits.len() != FRAME_BITS {
            return Err(FrameError::MalformedFrame(bits.len()));
        }

        Ok(Scm {
            id: (take_bits(bits, ID_HIGH) << 24 | take_bits(bits, ID_LOW)) as u32,
            msg_type: take_bits(bits, MSG_TYPE) as u8,
            tamper: Tamper {
                phy: take_bits(bits, TAMPER_PHY) as u8,
                enc: take_bits(bits, TAMPER_ENC) as u8,
            },
            consumption: take_bits(bits, CONSUMPTION) as u32,
            checksum: take_bits(bits, CHECKSUM) as u16,
        })
    }

    /// Render this record as a 96-bit frame
    ///
    /// The exact inverse of [`parse`](Scm::parse): preamble, fields at
    /// their fixed offsets, the stored checksum verbatim, reserved bits
    /// zero. Use [`seal`](Scm::seal) afterwards to make the checksum
    /// consistent with the payload.
    pub fn to_frame(&self) -> [bool; FRAME_BITS] {
        let mut bits = [false; FRAME_BITS];
        for (slot, bit) in bits.iter_mut().zip(preamble_bits()) {
            *slot = bit;
        }
        put_bits(&mut bits, ID_HIGH, (self.id >> 24) as u64);
        put_bits(&mut bits, ID_LOW, (self.id & 0x00FF_FFFF) as u64);
        put_bits(&mut bits, TAMPER_PHY, self.tamper.phy as u64);
        put_bits(&mut bits, MSG_TYPE, self.msg_type as u64);
        put_bits(&mut bits, TAMPER_ENC, self.tamper.enc as u64);
        put_bits(&mut bits, CONSUMPTION, self.consumption as u64);
        put_bits(&mut bits, CHECKSUM, self.checksum as u64);
        bits
    }

    /// Recompute the checksum so the frame divides the generator
    ///
    /// Returns a copy of this record whose checksum field makes the
    /// packed 80-bit payload a valid codeword under `bch`.
    pub fn seal(&self, bch: &Bch) -> Scm {
        let mut sealed = *self;
        sealed.checksum = 0;
        let mut payload = [0u8; PAYLOAD_BYTES];
        pack_bits_into(&sealed.to_frame()[16..], &mut payload);
        sealed.checksum = bch.encode(&payload) as u16;
        sealed
    }
}

impl fmt::Display for Scm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ID:{:8} Type:{:2} Tamper:{} Consumption:{:8} Checksum:0x{:04X}}}",
            self.id, self.msg_type, self.tamper, self.consumption, self.checksum
        )
    }
}

// Big-endian read of a bitfield.
fn take_bits(bits: &[bool], range: Range<usize>) -> u64 {
    bits[range]
        .iter()
        .fold(0u64, |acc, &bit| (acc << 1) | u64::from(bit))
}

// Big-endian write of a bitfield.
fn put_bits(bits: &mut [bool], range: Range<usize>, value: u64) {
    let width = range.len();
    for (offset, slot) in bits[range].iter_mut().enumerate() {
        *slot = (value >> (width - 1 - offset)) & 1 == 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record() -> Scm {
        Scm {
            id: 12345678,
            msg_type: 4,
            tamper: Tamper { phy: 1, enc: 2 },
            consumption: 99999,
            checksum: 0x1234,
        }
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert_eq!(Scm::parse(&[false; 95]), Err(FrameError::MalformedFrame(95)));
        assert_eq!(Scm::parse(&[false; 97]), Err(FrameError::MalformedFrame(97)));
    }

    #[test]
    fn test_frame_roundtrip() {
        let scm = test_record();
        let parsed = Scm::parse(&scm.to_frame()).unwrap();
        assert_eq!(parsed, scm);
    }

    #[test]
    fn test_frame_roundtrip_extremes() {
        for scm in [
            Scm::default(),
            Scm {
                id: (1 << 26) - 1,
                msg_type: 15,
                tamper: Tamper { phy: 3, enc: 3 },
                consumption: (1 << 24) - 1,
                checksum: u16::MAX,
            },
        ] {
            assert_eq!(Scm::parse(&scm.to_frame()).unwrap(), scm);
        }
    }

    #[test]
    fn test_frame_has_preamble() {
        let bits = test_record().to_frame();
        assert!(crate::waveform::preamble_matches(&bits));
        // bit 23 is reserved and stays clear
        assert!(!bits[23]);
    }

    #[test]
    fn test_id_split() {
        let scm = Scm {
            id: 0b10_0000_0000_0000_0000_0000_0001,
            ..Scm::default()
        };
        let bits = scm.to_frame();
        assert!(bits[21]);
        assert!(!bits[22]);
        assert!(bits[79]);
        assert_eq!(Scm::parse(&bits).unwrap().id, scm.id);
    }

    #[test]
    fn test_seal_produces_codeword() {
        let bch = Bch::new_scm();
        let sealed = test_record().seal(&bch);
        let mut payload = [0u8; PAYLOAD_BYTES];
        pack_bits_into(&sealed.to_frame()[16..], &mut payload);
        assert_eq!(bch.encode(&payload), 0);
        // sealing only rewrites the checksum
        assert_eq!(
            Scm {
                checksum: test_record().checksum,
                ..sealed
            },
            test_record()
        );
    }

    #[test]
    fn test_display_format() {
        let rendered = test_record().to_string();
        assert_eq!(
            rendered,
            "{ID:12345678 Type: 4 Tamper:{Phy:1 Enc:2} Consumption:   99999 Checksum:0x1234}"
        );
    }
}
