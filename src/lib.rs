//! This crate reads usage telemetry from a Growatt 1500 solar micro-inverter
//! over its serial service port and logs qualified readings for later
//! processing.
//!
//! The inverter speaks a proprietary byte-oriented request/response protocol:
//! after a short handshake it streams fixed-length telemetry reports, each 31
//! bytes long and starting with the marker byte `0x57`. The reports carry no
//! checksum, so a corrupted frame is indistinguishable from a good one at the
//! wire level. That is a property of the device, not something this crate
//! tries to paper over: every decoded reading is instead run through the
//! plausibility filter in [`filter`] before it is trusted.
//!
//! The serial port used for inverter comms should be configured like so:
//! * Baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//! * Read timeout: 5 seconds (the timeout doubles as end-of-session
//!   detection; the inverter simply stops answering at sunset)
//!
//! Any interface implementing [`embedded_io::Read`] & [`embedded_io::Write`]
//! can be used as the transport, see [`inverter::GrowattInverter`].

pub mod error;
pub mod filter;
pub mod frame;
pub mod inverter;
pub mod limiter;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod mock_serial;
