//! Driving a telemetry session against the inverter.

use chrono::Utc;
use embedded_io::Error as _;

use crate::error::{Error, Result};
use crate::frame::FrameBuffer;
use crate::telemetry::TelemetryReading;

/// Opaque vendor command requesting a telemetry session with reports every
/// 1500 ms. Recovered by observing the vendor software; no internal
/// structure is known.
const CMD_START_SESSION: [u8; 14] = [
    0x3F, 0x23, 0x7E, 0x34, 0x41, 0x7E, 0x32, 0x59, 0x31, 0x35, 0x30, 0x30, 0x23, 0x3F,
];

/// Opaque vendor command asking for the interval data to start flowing.
const CMD_INTERVAL_DATA: [u8; 8] = [0x3F, 0x23, 0x7E, 0x34, 0x42, 0x7E, 0x23, 0x3F];

/// Length of the acknowledgement the inverter sends for a session request.
const ACK_LEN: usize = 5;

/// The report stream is consumed in chunks of this size. A shorter read
/// means the transport timed out mid-stream: the device has gone quiet.
const READ_CHUNK: usize = 10;

/// A Growatt 1500 on the other end of a serial link.
///
/// You can create a `GrowattInverter` using any interface which implements
/// [`embedded_io::Read`] & [`embedded_io::Write`]. The transport's read
/// timeout doubles as end-of-session detection, so it should be configured
/// to a few seconds (see the crate docs).
pub struct GrowattInverter<S: embedded_io::Read + embedded_io::Write> {
    interface: S,
    buffer: FrameBuffer,
}

impl<S: embedded_io::Read + embedded_io::Write> GrowattInverter<S> {
    /// Create a new `GrowattInverter` instance over the given interface.
    pub fn new(interface: S) -> Self {
        Self {
            interface,
            buffer: FrameBuffer::new(),
        }
    }

    /// Request a telemetry session and wait for the inverter's
    /// acknowledgement.
    ///
    /// Returns `Ok(true)` when the full acknowledgement arrived and the
    /// device is alive. `Ok(false)` means the inverter stayed silent - at
    /// night it does not answer at all. Whether and when to retry is the
    /// caller's policy, not this crate's.
    pub fn start_session(&mut self) -> Result<bool, S::Error> {
        self.interface
            .write_all(&CMD_START_SESSION)
            .map_err(Error::Serial)?;

        let mut ack = [0u8; ACK_LEN];
        let got = self.read_until_quiet(&mut ack)?;
        log::debug!("session request answered with {got}/{ACK_LEN} ack bytes");
        Ok(got == ACK_LEN)
    }

    /// Ask the inverter to start streaming interval reports.
    pub fn request_interval_data(&mut self) -> Result<(), S::Error> {
        self.interface
            .write_all(&CMD_INTERVAL_DATA)
            .map_err(Error::Serial)
    }

    /// Pull the next decoded reading off the report stream.
    ///
    /// Blocks on the transport (up to its read timeout) until a full report
    /// has been recovered. `Ok(None)` means the transport went quiet: the
    /// session is over, which the caller interprets (device offline,
    /// nightfall). That is a normal outcome, not an error.
    pub fn next_reading(&mut self) -> Result<Option<TelemetryReading>, S::Error> {
        loop {
            if let Some(frame) = self.buffer.next_frame() {
                return Ok(Some(TelemetryReading::decode(&frame, Utc::now())));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let got = self.read_until_quiet(&mut chunk)?;
            if got < READ_CHUNK {
                log::debug!("transport quiet after {got} bytes, ending session");
                return Ok(None);
            }
            self.buffer.extend(&chunk);
        }
    }

    /// Total line-noise bytes dropped while synchronizing on frame markers.
    pub fn discarded_bytes(&self) -> u64 {
        self.buffer.discarded_bytes()
    }

    /// Fill `buf`, stopping early when the transport goes quiet (timeout or
    /// end of stream). Returns how many bytes actually arrived.
    fn read_until_quiet(&mut self, buf: &mut [u8]) -> Result<usize, S::Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.interface.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::TimedOut | embedded_io::ErrorKind::Other
                    ) {
                        break;
                    }
                    return Err(Error::Serial(e));
                }
            }
        }
        Ok(filled)
    }
}
