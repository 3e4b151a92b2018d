//! Session configuration and the pressure model shared by every calculation.

use serde::{Deserialize, Serialize};

use crate::error::DecoError;

/// Standard gravity (m/s²).
const GRAVITY: f64 = 9.80665;

/// Pascals per bar.
const PA_PER_BAR: f64 = 100_000.0;

/// Metres per foot.
const METERS_PER_FOOT: f64 = 0.3048;

/// Metric stop spacing (m).
const METRIC_STOP_INCREMENT: f64 = 3.0;

/// Imperial stop spacing (10 ft).
const IMPERIAL_STOP_INCREMENT: f64 = 10.0 * METERS_PER_FOOT;

/// How the reported ceiling is derived from tissue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CeilingType {
    /// Ceiling from present tensions only.
    Actual,
    /// Ceiling after simulating the ascent to it.
    Adaptive,
}

/// Spacing of decompression stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopFormatting {
    /// 3 m increments.
    Metric,
    /// 10 ft increments.
    Imperial,
    /// No quantisation.
    Continuous,
}

impl StopFormatting {
    /// Stop increment in metres, `None` for continuous ascents.
    pub fn increment_m(&self) -> Option<f64> {
        match self {
            StopFormatting::Metric => Some(METRIC_STOP_INCREMENT),
            StopFormatting::Imperial => Some(IMPERIAL_STOP_INCREMENT),
            StopFormatting::Continuous => None,
        }
    }
}

/// Immutable configuration of a dive session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiveConfig {
    /// Gradient factor at the first stop (1–100).
    pub gf_low: u8,
    /// Gradient factor at the surface (1–100).
    pub gf_high: u8,
    /// Surface pressure (mbar).
    pub surface_pressure: i32,
    /// Ascent rate used by the planner (m/min).
    pub deco_ascent_rate: f64,
    pub ceiling_type: CeilingType,
    /// Round the reported ceiling up to the next stop increment.
    pub round_ceiling: bool,
    /// Evaluate every compartment along the gradient-factor slope, not only the leading one.
    pub recalc_all_tissues_m_values: bool,
    /// Water density (kg/m³).
    pub water_density: f64,
    pub stop_formatting: StopFormatting,
    /// Shallowest planned stop (m). Snapped to the stop grid by the planner.
    pub last_stop_depth: f64,
    /// Minimum ppO2 a breathing source must deliver to be used at a stop (bar).
    pub min_pp_o2: f64,
    /// Hard ppO2 limit (bar). Segments above it are rejected; `None` only warns.
    pub pp_o2_hard_limit: Option<f64>,
}

impl Default for DiveConfig {
    fn default() -> Self {
        DiveConfig {
            gf_low: 100,
            gf_high: 100,
            surface_pressure: 1013,
            deco_ascent_rate: 10.0,
            ceiling_type: CeilingType::Actual,
            round_ceiling: false,
            recalc_all_tissues_m_values: true,
            water_density: 1030.0,
            stop_formatting: StopFormatting::Metric,
            last_stop_depth: 3.0,
            min_pp_o2: 0.16,
            pp_o2_hard_limit: None,
        }
    }
}

impl DiveConfig {
    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<(), DecoError> {
        for (name, gf) in [("gf_low", self.gf_low), ("gf_high", self.gf_high)] {
            if !(1..=100).contains(&gf) {
                return Err(DecoError::InvalidConfig(format!(
                    "{name} must be within 1-100, got {gf}"
                )));
            }
        }
        if self.gf_low > self.gf_high {
            return Err(DecoError::InvalidConfig(format!(
                "gf_low ({}) must not exceed gf_high ({})",
                self.gf_low, self.gf_high
            )));
        }
        if self.surface_pressure <= 0 {
            return Err(DecoError::InvalidConfig(format!(
                "surface pressure must be positive, got {} mbar",
                self.surface_pressure
            )));
        }
        positive("deco ascent rate", self.deco_ascent_rate)?;
        positive("water density", self.water_density)?;
        positive("minimum ppO2", self.min_pp_o2)?;
        if let Some(limit) = self.pp_o2_hard_limit {
            positive("ppO2 hard limit", limit)?;
            if limit < self.min_pp_o2 {
                return Err(DecoError::InvalidConfig(format!(
                    "ppO2 hard limit {limit} is below the minimum ppO2 {}",
                    self.min_pp_o2
                )));
            }
        }
        if !self.last_stop_depth.is_finite() || self.last_stop_depth < 0.0 {
            return Err(DecoError::InvalidConfig(format!(
                "last stop depth must be >= 0, got {}",
                self.last_stop_depth
            )));
        }
        Ok(())
    }

    pub fn gf_low_fraction(&self) -> f64 {
        self.gf_low as f64 / 100.0
    }

    pub fn gf_high_fraction(&self) -> f64 {
        self.gf_high as f64 / 100.0
    }

    /// Surface pressure in bar.
    pub fn surface_pressure_bar(&self) -> f64 {
        self.surface_pressure as f64 / 1000.0
    }

    /// Pressure increase per metre of water (bar/m).
    fn bar_per_meter(&self) -> f64 {
        self.water_density * GRAVITY / PA_PER_BAR
    }

    /// Absolute ambient pressure (bar) at `depth_m`.
    pub fn ambient_pressure(&self, depth_m: f64) -> f64 {
        self.surface_pressure_bar() + depth_m * self.bar_per_meter()
    }

    /// Depth (m) at which ambient pressure equals `pressure_bar`. Negative above the surface.
    pub fn depth_at_pressure(&self, pressure_bar: f64) -> f64 {
        (pressure_bar - self.surface_pressure_bar()) / self.bar_per_meter()
    }

    /// Round `depth_m` up to the next stop increment.
    pub fn round_to_stop(&self, depth_m: f64) -> f64 {
        match self.stop_formatting.increment_m() {
            Some(increment) if depth_m > 0.0 => {
                // tolerate float noise just above a stop
                ((depth_m - 1e-9) / increment).ceil() * increment
            }
            _ => depth_m.max(0.0),
        }
    }

    /// `last_stop_depth` moved to the nearest stop of the grid.
    ///
    /// A 3 m last stop becomes 10 ft on the imperial grid.
    pub fn last_stop_m(&self) -> f64 {
        match self.stop_formatting.increment_m() {
            Some(increment) => (self.last_stop_depth / increment).round() * increment,
            None => self.last_stop_depth,
        }
    }
}

fn positive(name: &str, value: f64) -> Result<(), DecoError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DecoError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
