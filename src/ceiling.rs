//! Decompression ceiling under gradient factors.
//!
//! The gradient factor follows the diver. Below the first stop (the anchor)
//! it is `gf_low`; from the anchor up it runs linearly to `gf_high` at the
//! surface, truncated to a whole percent. The anchor is the `gf_low` ceiling
//! at the moment the diver first goes into deco and is kept from then on.
//! Outside deco every compartment is held to `gf_high`.

use crate::buhlmann::{TissueState, NUM_COMPARTMENTS};
use crate::config::{CeilingType, DiveConfig};
use crate::gas::BreathingSource;

/// Ascent rounds allowed for the adaptive ceiling to settle.
const ADAPTIVE_MAX_ITERATIONS: usize = 512;

/// Slack when truncating the sloped gradient factor to a whole percent.
const GF_PERCENT_EPSILON: f64 = 1e-9;

/// Compartments that follow the gradient-factor slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeScope {
    /// Every compartment uses the sloped gradient factor.
    All,
    /// Only the leading compartment does; the rest stay at `gf_high`.
    Leading,
}

pub struct CeilingCalculator<'a> {
    config: &'a DiveConfig,
}

impl<'a> CeilingCalculator<'a> {
    pub fn new(config: &'a DiveConfig) -> Self {
        CeilingCalculator { config }
    }

    /// Ceiling (m, ≥ 0) under a single gradient factor, and its leading compartment.
    ///
    /// Ties go to the faster compartment.
    pub fn fixed_gf_ceiling(&self, tissues: &TissueState, gf: f64) -> (f64, usize) {
        let mut max_pressure = f64::MIN;
        let mut leading = 0;
        for i in 0..NUM_COMPARTMENTS {
            let p = tissues.tolerated_ambient(i, gf);
            if p > max_pressure {
                max_pressure = p;
                leading = i;
            }
        }
        (self.config.depth_at_pressure(max_pressure).max(0.0), leading)
    }

    /// Depth of the first stop before rounding: the `gf_low` ceiling.
    pub fn first_stop(&self, tissues: &TissueState) -> f64 {
        self.fixed_gf_ceiling(tissues, self.config.gf_low_fraction()).0
    }

    /// Whether the surface is out of reach under `gf_high`.
    pub fn in_deco(&self, tissues: &TissueState) -> bool {
        self.fixed_gf_ceiling(tissues, self.config.gf_high_fraction())
            .0
            > 0.0
    }

    /// Fix the slope anchor the first time the tissues go into deco.
    ///
    /// A settled anchor is returned unchanged. With `gf_low == gf_high`
    /// there is no slope and the anchor stays unset.
    pub fn settle_anchor(&self, tissues: &TissueState, anchor_m: Option<f64>) -> Option<f64> {
        match anchor_m {
            Some(anchor) => Some(anchor),
            None if self.has_slope() && self.in_deco(tissues) => Some(self.first_stop(tissues)),
            None => None,
        }
    }

    /// Gradient factor (0–1) at `depth_m` for a slope anchored at `anchor_m`.
    pub fn gf_at(&self, depth_m: f64, anchor_m: f64) -> f64 {
        let gf_low = self.config.gf_low as f64;
        let gf_high = self.config.gf_high as f64;
        if anchor_m <= 0.0 {
            return gf_high / 100.0;
        }
        if depth_m > anchor_m {
            return gf_low / 100.0;
        }
        let sloped = gf_high - (gf_high - gf_low) / anchor_m * depth_m.max(0.0);
        (sloped + GF_PERCENT_EPSILON).floor() / 100.0
    }

    /// Gradient factor in force for a diver at `depth_m` with these tissues.
    pub fn gf_for(&self, tissues: &TissueState, depth_m: f64, anchor_m: Option<f64>) -> f64 {
        if !self.has_slope() || !self.in_deco(tissues) {
            return self.config.gf_high_fraction();
        }
        let anchor = anchor_m.unwrap_or_else(|| self.first_stop(tissues));
        self.gf_at(depth_m, anchor)
    }

    /// Ceiling (m, ≥ 0) from present tensions for a diver at `depth_m`,
    /// unclamped and unrounded.
    pub fn raw_ceiling(
        &self,
        tissues: &TissueState,
        depth_m: f64,
        anchor_m: Option<f64>,
        scope: SlopeScope,
    ) -> f64 {
        let gf = self.gf_for(tissues, depth_m, anchor_m);
        match scope {
            SlopeScope::All => self.fixed_gf_ceiling(tissues, gf).0,
            SlopeScope::Leading => {
                let gf_high = self.config.gf_high_fraction();
                let (_, leading) = self.fixed_gf_ceiling(tissues, gf_high);
                let max_pressure = (0..NUM_COMPARTMENTS)
                    .map(|i| tissues.tolerated_ambient(i, if i == leading { gf } else { gf_high }))
                    .fold(f64::MIN, f64::max);
                self.config.depth_at_pressure(max_pressure).max(0.0)
            }
        }
    }

    /// Scope selected by `recalc_all_tissues_m_values`.
    pub fn config_scope(&self) -> SlopeScope {
        if self.config.recalc_all_tissues_m_values {
            SlopeScope::All
        } else {
            SlopeScope::Leading
        }
    }

    /// The ceiling reported to callers for a diver at `depth_m` breathing `gas`.
    pub fn ceiling(
        &self,
        tissues: &TissueState,
        depth_m: f64,
        anchor_m: Option<f64>,
        gas: Option<&BreathingSource>,
    ) -> f64 {
        let raw = self.raw_ceiling(tissues, depth_m, anchor_m, self.config_scope());
        let ceiling = match (self.config.ceiling_type, gas) {
            (CeilingType::Adaptive, Some(gas)) => {
                self.adaptive(tissues, depth_m, anchor_m, gas, raw)
            }
            _ => raw,
        };
        let ceiling = if self.config.round_ceiling {
            self.config.round_to_stop(ceiling)
        } else {
            ceiling
        };
        match self.config.ceiling_type {
            CeilingType::Actual => ceiling.min(depth_m.max(0.0)),
            CeilingType::Adaptive => ceiling,
        }
    }

    /// Ascend a copy of the tissues to the ceiling at the deco ascent rate and
    /// recompute, until the ceiling is no longer above the simulated diver.
    fn adaptive(
        &self,
        tissues: &TissueState,
        depth_m: f64,
        anchor_m: Option<f64>,
        gas: &BreathingSource,
        actual: f64,
    ) -> f64 {
        let rate = self.config.deco_ascent_rate;
        let mut sim = tissues.clone();
        let mut sim_depth = depth_m;
        let mut anchor = anchor_m;
        let mut ceiling = actual;
        for _ in 0..ADAPTIVE_MAX_ITERATIONS {
            if sim_depth <= 0.0 || sim_depth <= ceiling {
                return ceiling;
            }
            let duration_sec = (sim_depth - ceiling) / rate * 60.0;
            sim.apply_ramp(
                duration_sec,
                &gas.inspired(self.config.ambient_pressure(sim_depth)),
                &gas.inspired(self.config.ambient_pressure(ceiling)),
            );
            sim_depth = ceiling;
            anchor = self.settle_anchor(&sim, anchor);
            ceiling = self.raw_ceiling(&sim, sim_depth, anchor, SlopeScope::Leading);
        }
        tracing::debug!(depth_m, ceiling, "adaptive ceiling did not settle");
        ceiling
    }

    fn has_slope(&self) -> bool {
        self.config.gf_low != self.config.gf_high
    }
}
