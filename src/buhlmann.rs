//! Bühlmann ZHL-16C tissue loading.
//!
//! Sixteen compartments track N2 and He tension. Constant-depth exposure uses
//! the Haldane equation; travel between depths uses the Schreiner equation
//! with a linearly changing inspired pressure. Both are exact solutions, so
//! step size never affects the result.

use crate::gas::{InspiredPressures, AIR_FO2};

// ============================================================================
// Physical Constants
// ============================================================================

/// Water vapour pressure in the lungs (bar), at 37°C.
pub const P_WATER_VAPOR: f64 = 0.0627;

/// Fraction of N2 in air.
const AIR_FN2: f64 = 1.0 - AIR_FO2;

// ============================================================================
// ZHL-16C Compartment Constants (Bühlmann / Baker)
// ============================================================================

/// Number of tissue compartments.
pub const NUM_COMPARTMENTS: usize = 16;

/// N2 half-times in minutes for compartments 1–16 (ZHL-16C).
const N2_HALF_TIMES: [f64; NUM_COMPARTMENTS] = [
    5.0, 8.0, 12.5, 18.5, 27.0, 38.3, 54.3, 77.0, 109.0, 146.0, 187.0, 239.0, 305.0, 390.0, 498.0,
    635.0,
];

/// He half-times in minutes for compartments 1–16 (ZHL-16C).
const HE_HALF_TIMES: [f64; NUM_COMPARTMENTS] = [
    1.88, 3.02, 4.72, 6.99, 10.21, 14.48, 20.53, 29.11, 41.20, 55.19, 70.69, 90.34, 115.29, 147.42,
    188.24, 240.03,
];

/// N2 'a' coefficients (bar) for ZHL-16C.
const A_N2: [f64; NUM_COMPARTMENTS] = [
    1.1696, 1.0000, 0.8618, 0.7562, 0.6200, 0.5043, 0.4410, 0.4000, 0.3750, 0.3500, 0.3295, 0.3065,
    0.2835, 0.2610, 0.2480, 0.2327,
];

/// N2 'b' coefficients (dimensionless) for ZHL-16C.
const B_N2: [f64; NUM_COMPARTMENTS] = [
    0.5578, 0.6514, 0.7222, 0.7825, 0.8126, 0.8434, 0.8693, 0.8910, 0.9092, 0.9222, 0.9319, 0.9403,
    0.9477, 0.9544, 0.9602, 0.9653,
];

/// He 'a' coefficients (bar) for ZHL-16C.
const A_HE: [f64; NUM_COMPARTMENTS] = [
    1.6189, 1.3830, 1.1919, 1.0458, 0.9220, 0.8205, 0.7305, 0.6502, 0.5950, 0.5545, 0.5333, 0.5189,
    0.5181, 0.5176, 0.5172, 0.5119,
];

/// He 'b' coefficients (dimensionless) for ZHL-16C.
const B_HE: [f64; NUM_COMPARTMENTS] = [
    0.4770, 0.5747, 0.6527, 0.7223, 0.7582, 0.7957, 0.8279, 0.8553, 0.8757, 0.8903, 0.8997, 0.9073,
    0.9122, 0.9171, 0.9217, 0.9267,
];

/// Rate constant (1/s) for a half-time given in minutes.
fn rate_constant(half_time_min: f64) -> f64 {
    std::f64::consts::LN_2 / (half_time_min * 60.0)
}

/// Haldane: tension after `dt_sec` at constant inspired pressure.
fn haldane(p0: f64, p_inspired: f64, k: f64, dt_sec: f64) -> f64 {
    p_inspired + (p0 - p_inspired) * (-k * dt_sec).exp()
}

/// Schreiner: tension after `dt_sec` with inspired pressure moving linearly
/// from `p_start` at `rate` bar/s.
fn schreiner(p0: f64, p_start: f64, rate: f64, k: f64, dt_sec: f64) -> f64 {
    p_start + rate * (dt_sec - 1.0 / k) - (p_start - p0 - rate / k) * (-k * dt_sec).exp()
}

// ============================================================================
// Tissue State
// ============================================================================

/// Inert gas tension of the 16 compartments.
#[derive(Debug, Clone, PartialEq)]
pub struct TissueState {
    /// N2 partial pressure in each compartment (bar).
    pub p_n2: [f64; NUM_COMPARTMENTS],
    /// He partial pressure in each compartment (bar).
    pub p_he: [f64; NUM_COMPARTMENTS],
}

impl TissueState {
    /// Initialise tissues at surface equilibrium (breathing air).
    pub fn surface_equilibrium(surface_pressure: f64) -> Self {
        let p_n2_surface = (surface_pressure - P_WATER_VAPOR) * AIR_FN2;
        TissueState {
            p_n2: [p_n2_surface; NUM_COMPARTMENTS],
            p_he: [0.0; NUM_COMPARTMENTS],
        }
    }

    /// Hold inspired pressures constant for `dt_sec`.
    pub fn apply_constant(&mut self, dt_sec: f64, inspired: &InspiredPressures) {
        if dt_sec <= 0.0 {
            return;
        }
        for i in 0..NUM_COMPARTMENTS {
            let k_n2 = rate_constant(N2_HALF_TIMES[i]);
            self.p_n2[i] = haldane(self.p_n2[i], inspired.pp_n2, k_n2, dt_sec);

            let k_he = rate_constant(HE_HALF_TIMES[i]);
            self.p_he[i] = haldane(self.p_he[i], inspired.pp_he, k_he, dt_sec);
        }
    }

    /// Move inspired pressures linearly from `start` to `end` over `dt_sec`.
    pub fn apply_ramp(
        &mut self,
        dt_sec: f64,
        start: &InspiredPressures,
        end: &InspiredPressures,
    ) {
        if dt_sec <= 0.0 {
            return;
        }
        let rate_n2 = (end.pp_n2 - start.pp_n2) / dt_sec;
        let rate_he = (end.pp_he - start.pp_he) / dt_sec;
        for i in 0..NUM_COMPARTMENTS {
            let k_n2 = rate_constant(N2_HALF_TIMES[i]);
            self.p_n2[i] = schreiner(self.p_n2[i], start.pp_n2, rate_n2, k_n2, dt_sec);

            let k_he = rate_constant(HE_HALF_TIMES[i]);
            self.p_he[i] = schreiner(self.p_he[i], start.pp_he, rate_he, k_he, dt_sec);
        }
    }

    /// Total inert tension of compartment `i`.
    pub fn tension(&self, i: usize) -> f64 {
        self.p_n2[i] + self.p_he[i]
    }

    /// Tension-weighted a/b coefficients of compartment `i` (Workman/Baker).
    pub fn coefficients(&self, i: usize) -> (f64, f64) {
        let p_total = self.tension(i);
        if p_total > 1e-10 {
            let a = (A_N2[i] * self.p_n2[i] + A_HE[i] * self.p_he[i]) / p_total;
            let b = (B_N2[i] * self.p_n2[i] + B_HE[i] * self.p_he[i]) / p_total;
            (a, b)
        } else {
            (A_N2[i], B_N2[i])
        }
    }

    /// Highest tension compartment `i` may carry at `ambient` under gradient factor `gf` (0–1).
    pub fn tolerated_tension(&self, i: usize, ambient: f64, gf: f64) -> f64 {
        let (a, b) = self.coefficients(i);
        let m_value = a + ambient / b;
        ambient + gf * (m_value - ambient)
    }

    /// Lowest ambient pressure compartment `i` tolerates under a fixed gradient factor.
    pub fn tolerated_ambient(&self, i: usize, gf: f64) -> f64 {
        let (a, b) = self.coefficients(i);
        (self.tension(i) - gf * a) / (gf / b + 1.0 - gf)
    }

    /// Gradient factor (%) of compartment `i` at `ambient`. Negative when undersaturated.
    pub fn compartment_gf(&self, i: usize, ambient: f64) -> f64 {
        let (a, b) = self.coefficients(i);
        let m_value = a + ambient / b;
        let denom = m_value - ambient;

        if denom > 1e-10 {
            ((self.tension(i) - ambient) / denom) * 100.0
        } else {
            0.0
        }
    }

    /// Highest gradient factor (%) at `ambient`, floored at 0, and its compartment.
    pub fn max_gf(&self, ambient: f64) -> (f64, usize) {
        let mut max_gf: f64 = 0.0;
        let mut leading: usize = 0;
        for i in 0..NUM_COMPARTMENTS {
            let gf = self.compartment_gf(i, ambient);
            if gf > max_gf {
                max_gf = gf;
                leading = i;
            }
        }
        (max_gf, leading)
    }
}

// ============================================================================
// Tests
// ============================================================================
