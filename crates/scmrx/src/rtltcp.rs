//! rtl_tcp tuner client
//!
//! An rtl_tcp server greets every connection with a 12-byte dongle
//! descriptor and then streams interleaved unsigned 8-bit I/Q samples.
//! Control commands flow the other way as one command byte followed by a
//! big-endian 32-bit argument. Only the handful of commands the receiver
//! needs at startup are implemented.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::receiver::RxError;

const MAGIC: &[u8; 4] = b"RTL0";

const CMD_CENTER_FREQ: u8 = 0x01;
const CMD_SAMPLE_RATE: u8 = 0x02;
const CMD_GAIN_MODE: u8 = 0x03;
const CMD_OFFSET_TUNING: u8 = 0x0a;

/// Dongle descriptor sent by the server on connect
#[derive(Clone, Copy, Debug)]
pub struct DongleInfo {
    /// Tuner chip identifier
    pub tuner_type: u32,
    /// Number of discrete gain settings the tuner supports
    pub gain_count: u32,
}

impl fmt::Display for DongleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{TunerType:{} GainCount:{}}}",
            self.tuner_type, self.gain_count
        )
    }
}

/// Connection to an rtl_tcp server
///
/// Implements [`Read`] over the sample stream, so the receiver can treat
/// the tuner as any other byte source.
#[derive(Debug)]
pub struct RtlTcp {
    stream: TcpStream,
    info: DongleInfo,
}

impl RtlTcp {
    /// Connect and read the dongle descriptor
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, RxError> {
        let mut stream = TcpStream::connect(addr)
            .map_err(|err| RxError::SourceProtocol("connecting to tuner", err))?;

        let mut magic = [0u8; 4];
        stream
            .read_exact(&mut magic)
            .map_err(|err| RxError::SourceProtocol("reading dongle descriptor", err))?;
        if &magic != MAGIC {
            return Err(RxError::SourceProtocol(
                "reading dongle descriptor",
                io::Error::new(io::ErrorKind::InvalidData, "unrecognized greeting"),
            ));
        }

        let tuner_type = stream
            .read_u32::<BigEndian>()
            .map_err(|err| RxError::SourceProtocol("reading dongle descriptor", err))?;
        let gain_count = stream
            .read_u32::<BigEndian>()
            .map_err(|err| RxError::SourceProtocol("reading dongle descriptor", err))?;

        let info = DongleInfo {
            tuner_type,
            gain_count,
        };
        debug!("dongle descriptor: {}", info);

        Ok(Self { stream, info })
    }

    /// The descriptor the server sent on connect
    pub fn info(&self) -> DongleInfo {
        self.info
    }

    /// Tune to `freq` Hz
    pub fn set_center_freq(&mut self, freq: u32) -> Result<(), RxError> {
        self.command(CMD_CENTER_FREQ, freq, "setting center frequency")
    }

    /// Set the sampling rate in Hz
    pub fn set_sample_rate(&mut self, rate: u32) -> Result<(), RxError> {
        self.command(CMD_SAMPLE_RATE, rate, "setting sample rate")
    }

    /// Enable or disable offset tuning
    pub fn set_offset_tuning(&mut self, enabled: bool) -> Result<(), RxError> {
        self.command(CMD_OFFSET_TUNING, enabled.into(), "setting offset tuning")
    }

    /// Select automatic (`true`) or manual (`false`) tuner gain
    pub fn set_gain_mode(&mut self, auto: bool) -> Result<(), RxError> {
        self.command(CMD_GAIN_MODE, u32::from(!auto), "setting gain mode")
    }

    fn command(&mut self, cmd: u8, arg: u32, context: &'static str) -> Result<(), RxError> {
        debug!("tuner command {:#04x} arg {}", cmd, arg);
        self.stream
            .write_u8(cmd)
            .and_then(|_| self.stream.write_u32::<BigEndian>(arg))
            .map_err(|err| RxError::SourceProtocol(context, err))
    }
}

impl Read for RtlTcp {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpListener;
    use std::thread;

    // Serve one connection: greet, capture command bytes, stream samples.
    fn fake_server(samples: Vec<u8>) -> (std::net::SocketAddr, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().expect("accept");
            conn.write_all(MAGIC).expect("magic");
            conn.write_u32::<BigEndian>(5).expect("tuner type");
            conn.write_u32::<BigEndian>(29).expect("gain count");
            conn.write_all(&samples).expect("samples");

            // four commands of five bytes each
            let mut commands = vec![0u8; 20];
            conn.read_exact(&mut commands).expect("commands");
            commands
        });

        (addr, handle)
    }

    #[test]
    fn test_connect_and_configure() {
        let (addr, server) = fake_server(vec![1, 2, 3, 4]);

        let mut tuner = RtlTcp::connect(addr).expect("connect");
        assert_eq!(tuner.info().tuner_type, 5);
        assert_eq!(tuner.info().gain_count, 29);

        tuner.set_sample_rate(2_048_000).unwrap();
        tuner.set_center_freq(920_299_072).unwrap();
        tuner.set_offset_tuning(true).unwrap();
        tuner.set_gain_mode(true).unwrap();

        let mut samples = [0u8; 4];
        tuner.read_exact(&mut samples).expect("samples");
        assert_eq!(samples, [1, 2, 3, 4]);

        let commands = server.join().expect("server thread");
        assert_eq!(
            commands,
            vec![
                CMD_SAMPLE_RATE, 0x00, 0x1F, 0x40, 0x00,
                CMD_CENTER_FREQ, 0x36, 0xDA, 0xA6, 0x40,
                CMD_OFFSET_TUNING, 0x00, 0x00, 0x00, 0x01,
                CMD_GAIN_MODE, 0x00, 0x00, 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn test_bad_greeting_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().expect("accept");
            conn.write_all(b"NOPE").expect("greeting");
            conn.write_u32::<BigEndian>(0).expect("tuner type");
            conn.write_u32::<BigEndian>(0).expect("gain count");
        });

        match RtlTcp::connect(addr) {
            Err(RxError::SourceProtocol(context, _)) => {
                assert_eq!(context, "reading dongle descriptor")
            }
            Err(other) => panic!("expected protocol error, got {:?}", other),
            Ok(_) => panic!("expected protocol error, got a connection"),
        }
        server.join().expect("server thread");
    }
}
