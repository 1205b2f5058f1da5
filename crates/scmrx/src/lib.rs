//! # scmrx: Standard Consumption Message receiver
//!
//! This crate turns the raw IQ byte stream of an rtl_tcp tuner into
//! decoded Standard Consumption Messages (SCM), the payload broadcast by
//! automatic meter-reading endpoints in the 900 MHz ISM band.
//!
//! The pipeline is linear and runs once per 16384-sample block:
//!
//! 1. AM demodulation of interleaved unsigned IQ bytes ([`MagDemod`])
//! 2. Preamble localization by circular cross-correlation through a
//!    half-complex DFT ([`PreambleDetector`])
//! 3. Integrate-and-dump matched filtering of the Manchester symbols
//! 4. Bit slicing, preamble validation, and payload packing
//! 5. BCH single-error correction against a precomputed syndrome table
//!    ([`Bch`])
//! 6. Bitfield extraction into an [`Scm`] record
//!
//! Blocks overlap by design: the receiver keeps a two-block magnitude
//! ring so a packet whose preamble lands in the older half always has
//! its full body available, and one whose preamble lands in the fresh
//! half is simply decoded on the next iteration.
//!
//! ## Example
//!
//! ```no_run
//! use scmrx::{BlockDecode, Receiver, RtlTcp, SAMPLE_RATE};
//!
//! # fn main() -> Result<(), scmrx::RxError> {
//! let mut tuner = RtlTcp::connect("127.0.0.1:1234")?;
//! tuner.set_sample_rate(SAMPLE_RATE)?;
//! tuner.set_center_freq(scmrx::waveform::CENTER_FREQ)?;
//! tuner.set_offset_tuning(true)?;
//! tuner.set_gain_mode(true)?;
//!
//! let mut receiver = Receiver::new();
//! loop {
//!     if let BlockDecode::Frame(frame) = receiver.process_block(&mut tuner)? {
//!         println!("{}", frame.scm);
//!     }
//! }
//! # }
//! ```

mod bch;
mod demod;
mod detector;
mod filter;
mod message;
mod receiver;
mod rtltcp;
pub mod waveform;

pub use bch::{Bch, Correction};
pub use demod::MagDemod;
pub use detector::PreambleDetector;
pub use filter::{matched_filter, slice, SOFT_DECISIONS};
pub use message::{FrameError, Scm, Tamper, FRAME_BITS, PAYLOAD_BYTES};
pub use receiver::{BlockDecode, FrameDecode, Receiver, RxError};
pub use rtltcp::{DongleInfo, RtlTcp};
pub use waveform::{BLOCK_SIZE, CENTER_FREQ, SAMPLE_RATE};
