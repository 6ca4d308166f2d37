//! Decoding telemetry reports into physical measurements.
//!
//! The byte layout below is a frozen contract derived from reverse
//! engineering the device protocol; any change to an offset or scale is a
//! protocol version break, not a tuning knob. No validation happens here -
//! out-of-range values are representable on the wire and rejecting them is
//! [`crate::filter`]'s job.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frame::RawFrame;

/// Byte offsets of the measurement fields within a 31-byte telemetry report.
///
/// Offset 0 is the frame marker. All multi-byte values are big-endian.
#[derive(Debug, Copy, Clone)]
#[repr(usize)]
pub enum FrameOffset {
    /// __u16 / 10__ - PV string 1 voltage in volts.
    Pv1Voltage = 1,
    /// Unknown auxiliary channel. Present on the wire, not decoded.
    Aux1 = 3,
    /// __u16 / 10__ - PV string 2 voltage in volts.
    Pv2Voltage = 5,
    /// __u16 / 10__ - Grid voltage in volts.
    GridVoltage = 7,
    /// __u16 / 100__ - Grid frequency in hertz.
    GridFreq = 9,
    /// __u16 / 10__ - Output power in watts.
    OutputPower = 11,
    /// __u16 / 10__ - Internal device temperature in degrees Celsius.
    Temperature = 13,
    /// __u8__ - Inverter status code. `0` or `1` in normal operation.
    InverterStatus = 15,
    /// __u8__ - Inverter fault code. `0` or `1` in normal operation.
    InverterFault = 16,
    /// Unknown auxiliary channel. Present on the wire, not decoded.
    Aux2 = 17,
    /// Unknown auxiliary channel. Present on the wire, not decoded.
    Aux3 = 19,
    /// __u16 / 10__ - Energy produced today in kWh.
    EnergyToday = 21,
    /// __u32 / 10__ - Lifetime energy produced in kWh.
    EnergyTotal = 23,
    /// __u32 / 10__ - Lifetime operating time in minutes.
    TotalTimeWorked = 27,
}

fn word(frame: &RawFrame, offset: FrameOffset) -> u16 {
    let bytes = frame.bytes();
    let at = offset as usize;
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn dword(frame: &RawFrame, offset: FrameOffset) -> u32 {
    let bytes = frame.bytes();
    let at = offset as usize;
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// One decoded telemetry report.
///
/// Immutable once constructed. Field declaration order matters: rows are
/// logged with fields sorted by column name so downstream tooling sees a
/// deterministic layout, and serde emits fields in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Energy produced today, kWh.
    pub energy_today: f64,
    /// Lifetime energy produced, kWh.
    pub energy_total: f64,
    /// Grid frequency, Hz.
    pub grid_freq: f64,
    /// Grid voltage, V.
    pub grid_voltage: f64,
    /// Fault code as reported by the inverter.
    pub inverter_fault: u8,
    /// Status code as reported by the inverter.
    pub inverter_status: u8,
    /// Output power, W.
    pub output_power: f64,
    /// PV string 1 voltage, V.
    pub pv1_voltage: f64,
    /// PV string 2 voltage, V.
    pub pv2_voltage: f64,
    /// The original report bytes, base64 encoded for audit/debugging.
    pub raw: String,
    /// Internal device temperature, degrees Celsius.
    pub temperature: f64,
    /// Wall-clock time at decode. The wire carries no timestamp.
    #[serde(rename = "time", with = "chrono::serde::ts_seconds")]
    pub sample_time: DateTime<Utc>,
    /// Lifetime operating time, minutes.
    pub total_time_worked: f64,
}

impl TelemetryReading {
    /// Decode a captured report into physical measurements.
    ///
    /// Pure apart from the caller-supplied timestamp: identical frame bytes
    /// always produce identical field values.
    pub fn decode(frame: &RawFrame, at: DateTime<Utc>) -> Self {
        Self {
            energy_today: f64::from(word(frame, FrameOffset::EnergyToday)) / 10.0,
            energy_total: f64::from(dword(frame, FrameOffset::EnergyTotal)) / 10.0,
            grid_freq: f64::from(word(frame, FrameOffset::GridFreq)) / 100.0,
            grid_voltage: f64::from(word(frame, FrameOffset::GridVoltage)) / 10.0,
            inverter_fault: frame.bytes()[FrameOffset::InverterFault as usize],
            inverter_status: frame.bytes()[FrameOffset::InverterStatus as usize],
            output_power: f64::from(word(frame, FrameOffset::OutputPower)) / 10.0,
            pv1_voltage: f64::from(word(frame, FrameOffset::Pv1Voltage)) / 10.0,
            pv2_voltage: f64::from(word(frame, FrameOffset::Pv2Voltage)) / 10.0,
            raw: BASE64.encode(frame.bytes()),
            temperature: f64::from(word(frame, FrameOffset::Temperature)) / 10.0,
            sample_time: at,
            total_time_worked: f64::from(dword(frame, FrameOffset::TotalTimeWorked)) / 10.0,
        }
    }

    /// Recover the original report bytes from the stored base64 form.
    ///
    /// Returns `None` if the stored value was mangled.
    pub fn raw_bytes(&self) -> Option<Vec<u8>> {
        BASE64.decode(&self.raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FRAME_LEN, FRAME_MARKER};
    use chrono::TimeZone;

    fn sample_frame() -> RawFrame {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = FRAME_MARKER;
        bytes[1..3].copy_from_slice(&300u16.to_be_bytes()); // pv1 30.0 V
        bytes[3..5].copy_from_slice(&1234u16.to_be_bytes()); // aux, ignored
        bytes[5..7].copy_from_slice(&4000u16.to_be_bytes()); // pv2 400.0 V
        bytes[7..9].copy_from_slice(&2300u16.to_be_bytes()); // grid 230.0 V
        bytes[9..11].copy_from_slice(&5001u16.to_be_bytes()); // 50.01 Hz
        bytes[11..13].copy_from_slice(&15000u16.to_be_bytes()); // 1500.0 W
        bytes[13..15].copy_from_slice(&253u16.to_be_bytes()); // 25.3 C
        bytes[15] = 1; // status
        bytes[16] = 0; // fault
        bytes[17..19].copy_from_slice(&77u16.to_be_bytes()); // aux, ignored
        bytes[19..21].copy_from_slice(&88u16.to_be_bytes()); // aux, ignored
        bytes[21..23].copy_from_slice(&105u16.to_be_bytes()); // 10.5 kWh
        bytes[23..27].copy_from_slice(&123456u32.to_be_bytes()); // 12345.6 kWh
        bytes[27..31].copy_from_slice(&987654u32.to_be_bytes()); // 98765.4 min
        RawFrame::from(bytes)
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 7, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn decodes_all_fields_with_documented_scales() {
        let reading = TelemetryReading::decode(&sample_frame(), at());

        assert_eq!(reading.pv1_voltage, 30.0);
        assert_eq!(reading.pv2_voltage, 400.0);
        assert_eq!(reading.grid_voltage, 230.0);
        assert_eq!(reading.grid_freq, 50.01);
        assert_eq!(reading.output_power, 1500.0);
        assert_eq!(reading.temperature, 25.3);
        assert_eq!(reading.inverter_status, 1);
        assert_eq!(reading.inverter_fault, 0);
        assert_eq!(reading.energy_today, 10.5);
        assert_eq!(reading.energy_total, 12345.6);
        assert_eq!(reading.total_time_worked, 98765.4);
        assert_eq!(reading.sample_time, at());
    }

    #[test]
    fn voltage_byte_pair_example() {
        // Literal example from the protocol notes: (0x01, 0x2C) = 300 = 30.0 V.
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = FRAME_MARKER;
        bytes[1] = 0x01;
        bytes[2] = 0x2C;
        let reading = TelemetryReading::decode(&RawFrame::from(bytes), at());
        assert_eq!(reading.pv1_voltage, 30.0);
    }

    #[test]
    fn decode_is_deterministic() {
        let first = TelemetryReading::decode(&sample_frame(), at());
        let second = TelemetryReading::decode(&sample_frame(), at());
        assert_eq!(first, second);
    }

    #[test]
    fn auxiliary_channels_do_not_leak_into_fields() {
        let base = sample_frame();
        let mut changed = *base.bytes();
        for at_aux in [3usize, 4, 17, 18, 19, 20] {
            changed[at_aux] ^= 0x5A;
        }

        let lhs = TelemetryReading::decode(&base, at());
        let rhs = TelemetryReading::decode(&RawFrame::from(changed), at());

        // Every decoded field is untouched; only the raw capture differs.
        assert_ne!(lhs.raw, rhs.raw);
        assert_eq!(lhs.pv1_voltage, rhs.pv1_voltage);
        assert_eq!(lhs.pv2_voltage, rhs.pv2_voltage);
        assert_eq!(lhs.grid_voltage, rhs.grid_voltage);
        assert_eq!(lhs.grid_freq, rhs.grid_freq);
        assert_eq!(lhs.output_power, rhs.output_power);
        assert_eq!(lhs.temperature, rhs.temperature);
        assert_eq!(lhs.inverter_status, rhs.inverter_status);
        assert_eq!(lhs.inverter_fault, rhs.inverter_fault);
        assert_eq!(lhs.energy_today, rhs.energy_today);
        assert_eq!(lhs.energy_total, rhs.energy_total);
        assert_eq!(lhs.total_time_worked, rhs.total_time_worked);
    }

    #[test]
    fn raw_capture_round_trips() {
        let frame = sample_frame();
        let reading = TelemetryReading::decode(&frame, at());
        assert_eq!(reading.raw_bytes().unwrap(), frame.bytes());
    }

    #[test]
    fn serialized_columns_are_sorted_by_name() {
        let reading = TelemetryReading::decode(&sample_frame(), at());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(Vec::new());
        writer.serialize(&reading).unwrap();
        let buf = writer.into_inner().map_err(|e| e.error().to_string()).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let header: Vec<&str> = out.lines().next().unwrap().split(';').collect();

        let mut sorted = header.clone();
        sorted.sort_unstable();
        assert_eq!(header, sorted);
        assert_eq!(header.first(), Some(&"energy_today"));
        assert_eq!(header.last(), Some(&"total_time_worked"));
    }
}
