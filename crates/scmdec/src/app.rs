//! The receive loop
//!
//! Owns the two output sinks and drives [`scmrx::Receiver`] one block at
//! a time until interrupted, expired, or failed. Decoded records go to
//! the log sink; raw IQ captures go to the optional sample sink.

use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Local;
use log::info;

use scmrx::{waveform, BlockDecode, Receiver, RtlTcp, SAMPLE_RATE};

use crate::cli::Args;

/// Local-time stamp with millisecond precision
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Run the receiver against the configured tuner until done
///
/// Returns `Ok(())` on interrupt or elapsed duration; any I/O or
/// protocol failure is fatal and maps to a nonzero exit code upstream.
pub fn run(args: &Args) -> anyhow::Result<()> {
    let mut record_sink = record_sink(args)?;
    let mut sample_sink = match &args.samplefile {
        Some(path) => Some(
            File::create(path)
                .with_context(|| format!("unable to create sample file {:?}", path))?,
        ),
        None => None,
    };

    let mut tuner = RtlTcp::connect(&args.server)
        .with_context(|| format!("unable to reach rtl_tcp at {}", args.server))?;
    info!("GainCount: {}", tuner.info().gain_count);

    tuner.set_sample_rate(SAMPLE_RATE)?;
    tuner.set_center_freq(args.centerfreq)?;
    tuner.set_offset_tuning(true)?;
    tuner.set_gain_mode(true)?;

    let receiver = Receiver::new();
    info!("Config: {:?}", args);
    info!("BlockSize: {}", scmrx::BLOCK_SIZE);
    info!("SampleRate: {}", SAMPLE_RATE);
    info!("DataRate: {}", waveform::DATA_RATE);
    info!("SymbolLength: {}", waveform::SYMBOL_LENGTH);
    info!("PacketSymbols: {}", waveform::PACKET_SYMBOLS);
    info!("PacketLength: {}", waveform::PACKET_LENGTH);
    info!("CenterFreq: {}", args.centerfreq);
    info!("BCH: {}", receiver.bch());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("unable to install interrupt handler")?;
    }

    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));

    info!("Running...");
    receive_loop(
        args,
        receiver,
        &mut tuner,
        &mut record_sink,
        sample_sink.as_mut(),
        &running,
        deadline,
    )
}

fn receive_loop(
    args: &Args,
    mut receiver: Receiver,
    tuner: &mut RtlTcp,
    record_sink: &mut dyn Write,
    mut sample_sink: Option<&mut File>,
    running: &AtomicBool,
    deadline: Option<Instant>,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut capture_offset: u64 = 0;

    while running.load(Ordering::SeqCst) {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                info!("time limit reached after {:?}", start.elapsed());
                break;
            }
        }

        let frame = match receiver.process_block(tuner)? {
            BlockDecode::Miss => continue,
            BlockDecode::Frame(frame) => frame,
        };

        let capture = receiver.capture(&frame);
        if let Some(sink) = sample_sink.as_deref_mut() {
            sink.write_all(capture)
                .context("unable to dump samples")?;
        }

        let stamp = Local::now().format(TIME_FORMAT);
        let written = if frame.corrected.is_empty() {
            writeln!(record_sink, "{} {}", stamp, frame.scm)
        } else {
            writeln!(record_sink, "{} {} {:?}", stamp, frame.scm, frame.corrected)
        };
        written
            .and_then(|_| record_sink.flush())
            .context("unable to write decoded record")?;

        if args.samplefile.is_some() {
            info!("capture: offset {} length {}", capture_offset, capture.len());
            capture_offset += capture.len() as u64;
        }
    }

    Ok(())
}

fn record_sink(args: &Args) -> anyhow::Result<Box<dyn Write>> {
    if args.log_to_stdout() {
        Ok(Box::new(io::stdout()))
    } else {
        let file = File::create(&args.logfile)
            .with_context(|| format!("unable to create log file \"{}\"", args.logfile))?;
        Ok(Box::new(file))
    }
}
