//! Plausibility filtering of decoded readings.
//!
//! The wire protocol carries no checksum, so a corrupted frame decodes into
//! perfectly well-formed nonsense. The compensating control is this battery
//! of physical-bounds and delta checks: a flat conjunction of individually
//! auditable limits rooted in deployment facts (panel count, indoor
//! placement, grid nominals) rather than a statistical model. A reading is
//! accepted only when every bound holds.
//!
//! The bounds are deployment facts, not protocol facts, so they live in
//! [`FilterLimits`] with the original installation's values as defaults
//! rather than being baked in as literals.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use strum_macros::{Display, EnumIter};

use crate::telemetry::TelemetryReading;

/// The physical bounds a reading must satisfy to be trusted.
///
/// Deserializable so a deployment can load its own limits from
/// configuration; unspecified fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterLimits {
    /// Lowest believable inverter temperature, exclusive. The device sits
    /// indoors, so anything at or below this is a sensor glitch.
    pub temperature_min: f64,
    /// Highest believable inverter temperature, inclusive.
    pub temperature_max: f64,
    /// Highest accepted inverter status code.
    pub max_status_code: u8,
    /// Highest accepted inverter fault code.
    pub max_fault_code: u8,
    /// Cap on lifetime operating minutes. No installation runs longer.
    pub max_operating_minutes: f64,
    /// Peak output the installation can physically deliver, W.
    pub max_output_power: f64,
    /// Installed nameplate capacity, W.
    pub nameplate_watts: f64,
    /// Multiplier on nameplate capacity bounding lifetime production.
    pub lifetime_capacity_factor: f64,
    /// Maximum PV string voltage, V.
    pub max_pv2_voltage: f64,
    /// Gross grid voltage bound, V. Values above this are frame corruption,
    /// not real grid conditions.
    pub max_grid_voltage: f64,
    /// Gross grid frequency bound, Hz.
    pub max_grid_freq: f64,
    /// Window within which daily-energy jumps are scrutinised, seconds.
    /// Over longer real gaps (a restart, say) large deltas are legitimate.
    pub energy_jump_window_secs: i64,
    /// Largest believable `energy_today` increase inside the window, kWh.
    /// Production is smooth and intervals are short.
    pub max_energy_jump: f64,
}

impl Default for FilterLimits {
    /// Bounds for the original installation: six 280 Wp panels on a
    /// Growatt 1500 mounted indoors.
    fn default() -> Self {
        Self {
            temperature_min: 10.0,
            temperature_max: 40.0,
            max_status_code: 1,
            max_fault_code: 1,
            max_operating_minutes: 20.0 * 365.0 * 24.0 * 60.0,
            max_output_power: 2000.0,
            nameplate_watts: 6.0 * 280.0,
            lifetime_capacity_factor: 20.0,
            max_pv2_voltage: 500.0,
            max_grid_voltage: 500.0,
            max_grid_freq: 100.0,
            energy_jump_window_secs: 100,
            max_energy_jump: 1.0,
        }
    }
}

/// Why a reading was rejected. The first failing bound is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Rejection {
    #[strum(serialize = "status code out of range")]
    StatusCode,
    #[strum(serialize = "fault code out of range")]
    FaultCode,
    #[strum(serialize = "temperature outside the indoor band")]
    Temperature,
    #[strum(serialize = "operating time beyond installation lifetime")]
    OperatingTime,
    #[strum(serialize = "operating time of zero")]
    NeverRan,
    #[strum(serialize = "output power above installation maximum")]
    OutputPower,
    #[strum(serialize = "lifetime energy above capacity bound")]
    EnergyTotal,
    #[strum(serialize = "pv2 voltage above string maximum")]
    Pv2Voltage,
    #[strum(serialize = "daily energy jump inside a short window")]
    EnergyJump,
    #[strum(serialize = "grid measurements out of spec")]
    Grid,
}

/// Carried state of one filtering pass: the previously accepted reading's
/// daily energy counter and timestamp.
///
/// `Default` is the "no prior sample" sentinel; the delta check is skipped
/// until a first reading has been accepted. The state belongs to a single
/// pass over a single record sequence and is never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptanceState {
    last_energy_today: f64,
    last_sample: Option<DateTime<Utc>>,
}

impl AcceptanceState {
    /// Fold an accepted reading into the state. Rejected readings must not
    /// be folded in; each decision compares against the last *accepted* row.
    pub fn advance(&mut self, reading: &TelemetryReading) {
        self.last_energy_today = reading.energy_today;
        self.last_sample = Some(reading.sample_time);
    }
}

impl FilterLimits {
    /// Run the full battery against one reading.
    ///
    /// Pure: no side effects, identical inputs give identical verdicts.
    /// On acceptance the caller is responsible for advancing `prior`.
    pub fn check(
        &self,
        reading: &TelemetryReading,
        prior: &AcceptanceState,
    ) -> Option<Rejection> {
        if reading.inverter_status > self.max_status_code {
            return Some(Rejection::StatusCode);
        }
        if reading.inverter_fault > self.max_fault_code {
            return Some(Rejection::FaultCode);
        }
        if reading.temperature > self.temperature_max
            || reading.temperature <= self.temperature_min
        {
            return Some(Rejection::Temperature);
        }
        if reading.total_time_worked > self.max_operating_minutes {
            return Some(Rejection::OperatingTime);
        }
        if reading.total_time_worked == 0.0 {
            // A brand-new device and a corrupted zero read the same.
            return Some(Rejection::NeverRan);
        }
        if reading.output_power > self.max_output_power {
            return Some(Rejection::OutputPower);
        }
        if reading.energy_total > self.lifetime_capacity_factor * self.nameplate_watts {
            return Some(Rejection::EnergyTotal);
        }
        if reading.pv2_voltage > self.max_pv2_voltage {
            return Some(Rejection::Pv2Voltage);
        }
        if let Some(last) = prior.last_sample {
            if (reading.sample_time - last).num_seconds() < self.energy_jump_window_secs
                && reading.energy_today - prior.last_energy_today > self.max_energy_jump
            {
                return Some(Rejection::EnergyJump);
            }
        }
        if reading.grid_freq > self.max_grid_freq || reading.grid_voltage > self.max_grid_voltage
        {
            return Some(Rejection::Grid);
        }
        None
    }

    /// Whether the reading passes every bound.
    pub fn accept(&self, reading: &TelemetryReading, prior: &AcceptanceState) -> bool {
        self.check(reading, prior).is_none()
    }
}

/// Run a plausibility pass over an ordered sequence of readings, yielding
/// the qualified ones lazily and in order.
///
/// This is a stateful left-fold: every decision depends on the immediately
/// preceding accepted reading, so the pass is strictly sequential. Re-running
/// it over the same sequence yields identical decisions.
pub fn qualify<I>(rows: I, limits: FilterLimits) -> impl Iterator<Item = TelemetryReading>
where
    I: IntoIterator<Item = TelemetryReading>,
{
    let mut prior = AcceptanceState::default();
    rows.into_iter()
        .filter(move |reading| match limits.check(reading, &prior) {
            None => {
                prior.advance(reading);
                true
            }
            Some(reason) => {
                log::debug!("rejecting sample at {}: {reason}", reading.sample_time);
                false
            }
        })
}
