//! The receive pipeline
//!
//! One iteration per sample block: rotate the rings, read and demodulate
//! the new block, locate the preamble, matched-filter from the alignment,
//! slice, validate, correct, parse. Packets that straddle a block
//! boundary are caught by the double-length magnitude ring: any preamble
//! that lands in the first half has its whole body available.

use std::io::{self, Read};
use std::ops::Range;

#[cfg(not(test))]
use log::{debug, trace};

#[cfg(test)]
use std::{println as debug, println as trace};

use thiserror::Error;

use crate::bch::{Bch, Correction};
use crate::demod::MagDemod;
use crate::detector::PreambleDetector;
use crate::filter::{matched_filter, pack_bits_into, slice, unpack_bits_into};
use crate::message::{FrameError, Scm, PAYLOAD_BYTES};
use crate::waveform::{int_round, preamble_matches, BLOCK_SIZE, PACKET_LENGTH, SYMBOL_LENGTH};

/// Fatal receiver errors
///
/// A failed decode is not an error; it surfaces as
/// [`BlockDecode::Miss`] and the loop keeps running.
#[derive(Debug, Error)]
pub enum RxError {
    /// The sample source returned fewer bytes than a whole block
    #[error("sample source exhausted")]
    SourceExhausted(#[source] io::Error),

    /// The tuner refused configuration or dropped the connection
    #[error("tuner protocol failure while {0}")]
    SourceProtocol(&'static str, #[source] io::Error),

    /// A frame of impossible length reached the parser
    #[error(transparent)]
    MalformedFrame(#[from] FrameError),
}

/// Outcome of one block iteration
#[derive(Clone, Debug)]
pub enum BlockDecode {
    /// Nothing decodable in this window
    Miss,
    /// A validated SCM
    Frame(FrameDecode),
}

/// A decoded frame and where it came from
#[derive(Clone, Debug)]
pub struct FrameDecode {
    /// The validated consumption message
    pub scm: Scm,
    /// Sample index of the preamble within the magnitude ring
    pub align: usize,
    /// Payload bit positions flipped by error correction, empty if none
    pub corrected: Vec<u32>,
    /// Byte range of the packet (plus guard) within the raw ring
    pub capture: Range<usize>,
}

/// SCM receiver state
///
/// Owns every buffer the pipeline touches, so iterations allocate only
/// when a frame is actually decoded. The detector and BCH table are
/// built once and live as long as the receiver.
pub struct Receiver {
    demod: MagDemod,
    detector: PreambleDetector,
    bch: Bch,
    /// One block of raw IQ bytes, as read from the source
    block: Vec<u8>,
    /// Two blocks of raw IQ bytes for sample captures
    raw: Vec<u8>,
    /// Two blocks of demodulated magnitudes
    mag: Vec<f64>,
}

impl Receiver {
    pub fn new() -> Self {
        Self {
            demod: MagDemod::new(),
            detector: PreambleDetector::new(),
            bch: Bch::new_scm(),
            block: vec![0u8; BLOCK_SIZE * 2],
            raw: vec![0u8; BLOCK_SIZE * 4],
            mag: vec![0.0; BLOCK_SIZE * 2],
        }
    }

    /// The error-correction stage, for startup diagnostics
    pub fn bch(&self) -> &Bch {
        &self.bch
    }

    /// Run one iteration of the receive pipeline
    ///
    /// Blocks until a whole sample block is read from `source`. A short
    /// read is fatal: it would break the sliding-window invariant.
    pub fn process_block<R: Read>(&mut self, source: &mut R) -> Result<BlockDecode, RxError> {
        // slide the previous block into the first half of both rings
        self.raw.copy_within(BLOCK_SIZE * 2.., 0);
        self.mag.copy_within(BLOCK_SIZE.., 0);

        source
            .read_exact(&mut self.block)
            .map_err(RxError::SourceExhausted)?;
        self.raw[BLOCK_SIZE * 2..].copy_from_slice(&self.block);
        self.demod.execute(&self.block, &mut self.mag[BLOCK_SIZE..]);

        let align = self.detector.detect(&self.mag);
        if align > BLOCK_SIZE {
            // preamble starts in the fresh half: the packet body has not
            // fully arrived, so the next block will re-detect it
            trace!("bad framing at {}, deferring to next block", align);
            return Ok(BlockDecode::Miss);
        }

        let soft = matched_filter(&self.mag[align..]);
        let mut bits = slice(&soft);
        if !preamble_matches(&bits) {
            trace!("correlation peak at {} is not a preamble", align);
            return Ok(BlockDecode::Miss);
        }

        let mut payload = [0u8; PAYLOAD_BYTES];
        pack_bits_into(&bits[16..], &mut payload);

        let corrected = match self.bch.correct(&mut payload) {
            Correction::Clean => Vec::new(),
            Correction::Corrected(positions) => positions,
            Correction::Failed(residual) => {
                debug!("uncorrectable frame at {}: residual {:#06x}", align, residual);
                return Ok(BlockDecode::Miss);
            }
        };

        // fold any corrections back into the frame before parsing
        unpack_bits_into(&payload, &mut bits[16..]);
        let scm = Scm::parse(&bits)?;
        debug!("decoded {} at {}", scm, align);

        Ok(BlockDecode::Frame(FrameDecode {
            scm,
            align,
            corrected,
            capture: capture_bounds(align),
        }))
    }

    /// Raw IQ bytes surrounding a decoded frame
    ///
    /// Valid until the next call to [`process_block`](Receiver::process_block)
    /// rotates the ring.
    pub fn capture(&self, frame: &FrameDecode) -> &[u8] {
        &self.raw[frame.capture.clone()]
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

// Byte bounds of a packet within the raw ring: the packet body plus
// eight symbols of guard on each side, clamped at the ring start.
fn capture_bounds(align: usize) -> Range<usize> {
    let guard = int_round(8.0 * SYMBOL_LENGTH);
    let lower = ((align as i64 - guard) * 2).max(0) as usize;
    let upper = (align as i64 + int_round(PACKET_LENGTH + 8.0 * SYMBOL_LENGTH)) as usize * 2;
    lower..upper
}
