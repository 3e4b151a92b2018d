//! Oxygen exposure: pulmonary (OTU) and central nervous system (CNS%).

use serde::{Deserialize, Serialize};

/// ppO2 (bar) below which neither OTU nor CNS accumulate.
const PP_O2_THRESHOLD: f64 = 0.5;

/// ppO2 (bar) above which exposure is flagged.
pub const PP_O2_WARNING: f64 = 1.6;

/// CNS% elimination half-time while breathing at or below the threshold (min).
const CNS_HALF_TIME_MIN: f64 = 90.0;

/// Exposure limit below the first table entry (min).
const CNS_LIMIT_LOW_MIN: f64 = 720.0;

/// Floor on extrapolated exposure limits (min).
const CNS_LIMIT_FLOOR_MIN: f64 = 1.0;

/// Longest slice used to integrate CNS over a ppO2 ramp (s).
const CNS_SLICE_SEC: f64 = 10.0;

/// Most slices spent on one ramp; longer ramps get longer slices.
const CNS_MAX_SLICES: usize = 1024;

/// NOAA single-exposure limits: (ppO2 bar, minutes).
const CNS_LIMITS: [(f64, f64); 11] = [
    (0.6, 720.0),
    (0.7, 570.0),
    (0.8, 450.0),
    (0.9, 360.0),
    (1.0, 300.0),
    (1.1, 240.0),
    (1.2, 210.0),
    (1.3, 180.0),
    (1.4, 150.0),
    (1.5, 120.0),
    (1.6, 45.0),
];

/// NOAA single-exposure time limit (min) at `pp_o2`, `None` when exposure is harmless.
pub fn cns_limit_min(pp_o2: f64) -> Option<f64> {
    if pp_o2 <= PP_O2_THRESHOLD {
        return None;
    }
    let (first_pp, _) = CNS_LIMITS[0];
    if pp_o2 < first_pp {
        return Some(CNS_LIMIT_LOW_MIN);
    }
    for pair in CNS_LIMITS.windows(2) {
        let (pp_lo, limit_lo) = pair[0];
        let (pp_hi, limit_hi) = pair[1];
        if pp_o2 <= pp_hi {
            let t = (pp_o2 - pp_lo) / (pp_hi - pp_lo);
            return Some(limit_lo + t * (limit_hi - limit_lo));
        }
    }
    // Beyond the table: continue the last segment's slope
    let (pp_a, limit_a) = CNS_LIMITS[CNS_LIMITS.len() - 2];
    let (pp_b, limit_b) = CNS_LIMITS[CNS_LIMITS.len() - 1];
    let slope = (limit_b - limit_a) / (pp_b - pp_a);
    Some((limit_b + slope * (pp_o2 - pp_b)).max(CNS_LIMIT_FLOOR_MIN))
}

/// OTU for ppO2 moving linearly from `pp_start` to `pp_end` over `duration_sec`.
pub fn otu_dose(pp_start: f64, pp_end: f64, duration_sec: f64) -> f64 {
    if duration_sec <= 0.0 {
        return 0.0;
    }
    let minutes = duration_sec / 60.0;
    let lo = pp_start.min(pp_end);
    let hi = pp_start.max(pp_end);
    if hi <= PP_O2_THRESHOLD {
        return 0.0;
    }
    if hi - lo < 1e-9 {
        return minutes * ((hi - PP_O2_THRESHOLD) / PP_O2_THRESHOLD).powf(5.0 / 6.0);
    }

    // Only the part of the ramp above the threshold counts
    let (lo, minutes) = if lo < PP_O2_THRESHOLD {
        (
            PP_O2_THRESHOLD,
            minutes * (hi - PP_O2_THRESHOLD) / (hi - lo),
        )
    } else {
        (lo, minutes)
    };
    let x_hi = (hi - PP_O2_THRESHOLD) / PP_O2_THRESHOLD;
    let x_lo = (lo - PP_O2_THRESHOLD) / PP_O2_THRESHOLD;
    3.0 / 11.0 * minutes / (hi - lo) * (x_hi.powf(11.0 / 6.0) - x_lo.powf(11.0 / 6.0))
}

/// CNS% for ppO2 moving linearly from `pp_start` to `pp_end` over `duration_sec`.
pub fn cns_dose(pp_start: f64, pp_end: f64, duration_sec: f64) -> f64 {
    if duration_sec <= 0.0 {
        return 0.0;
    }
    let slices = if (pp_end - pp_start).abs() < 1e-9 {
        1
    } else {
        (duration_sec / CNS_SLICE_SEC)
            .ceil()
            .clamp(1.0, CNS_MAX_SLICES as f64) as usize
    };
    let slice_min = duration_sec / 60.0 / slices as f64;
    (0..slices)
        .filter_map(|s| {
            let t = (s as f64 + 0.5) / slices as f64;
            cns_limit_min(pp_start + (pp_end - pp_start) * t)
        })
        .map(|limit| slice_min / limit * 100.0)
        .sum()
}

/// Accumulated oxygen exposure of a dive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OxygenExposure {
    pub otu: f64,
    /// CNS clock (%).
    pub cns: f64,
    /// Highest ppO2 breathed so far (bar).
    pub max_pp_o2: f64,
}

impl OxygenExposure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for ppO2 moving linearly from `pp_start` to `pp_end` over `duration_sec`.
    pub fn record(&mut self, pp_start: f64, pp_end: f64, duration_sec: f64) {
        if duration_sec <= 0.0 {
            return;
        }
        let peak = pp_start.max(pp_end);
        self.max_pp_o2 = self.max_pp_o2.max(peak);
        self.otu += otu_dose(pp_start, pp_end, duration_sec);
        if peak <= PP_O2_THRESHOLD {
            self.cns *= 0.5_f64.powf(duration_sec / 60.0 / CNS_HALF_TIME_MIN);
        } else {
            self.cns += cns_dose(pp_start, pp_end, duration_sec);
        }
    }

    /// Whether any recorded exposure exceeded the warning level.
    pub fn warning(&self) -> bool {
        self.max_pp_o2 > PP_O2_WARNING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cns_limit_table() {
        assert_eq!(cns_limit_min(0.4), None);
        assert_eq!(cns_limit_min(0.5), None);
        assert_eq!(cns_limit_min(0.55), Some(720.0));
        assert_eq!(cns_limit_min(1.0), Some(300.0));
        assert_eq!(cns_limit_min(1.6), Some(45.0));
        let mid = cns_limit_min(1.25).unwrap();
        assert!((mid - 195.0).abs() < 1e-9);
        let beyond = cns_limit_min(1.62).unwrap();
        assert!(beyond < 45.0 && beyond >= CNS_LIMIT_FLOOR_MIN);
        assert_eq!(cns_limit_min(3.0), Some(CNS_LIMIT_FLOOR_MIN));
    }

    #[test]
    fn test_otu_constant() {
        // 1.0 bar for 60 min: one OTU per minute
        assert!((otu_dose(1.0, 1.0, 3600.0) - 60.0).abs() < 1e-9);
        assert_eq!(otu_dose(0.4, 0.4, 3600.0), 0.0);
        assert_eq!(otu_dose(1.4, 1.4, 0.0), 0.0);
        let high = otu_dose(1.4, 1.4, 600.0);
        assert!((high - 10.0 * 1.8_f64.powf(5.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_otu_ramp_matches_integration() {
        let exact = otu_dose(0.3, 1.4, 300.0);
        let steps = 30_000;
        let dt = 300.0 / steps as f64;
        let numeric: f64 = (0..steps)
            .map(|s| {
                let p = 0.3 + 1.1 * (s as f64 + 0.5) / steps as f64;
                otu_dose(p, p, dt)
            })
            .sum();
        assert!((exact - numeric).abs() < 1e-3, "{exact} vs {numeric}");
        // Direction of travel does not matter
        assert!((otu_dose(1.4, 0.3, 300.0) - exact).abs() < 1e-12);
    }

    #[test]
    fn test_cns_constant() {
        // Half the 1.0 bar limit
        assert!((cns_dose(1.0, 1.0, 150.0 * 60.0) - 50.0).abs() < 1e-9);
        assert_eq!(cns_dose(0.21, 0.21, 3600.0), 0.0);
    }

    #[test]
    fn test_cns_long_ramp_is_bounded() {
        // A year-long ramp integrates in at most CNS_MAX_SLICES steps
        let year = 365.0 * 24.0 * 3600.0;
        let whole = cns_dose(0.6, 1.4, year);
        assert!(whole.is_finite() && whole > 0.0);
        let halves = cns_dose(0.6, 1.0, year / 2.0) + cns_dose(1.0, 1.4, year / 2.0);
        assert!((whole - halves).abs() / halves < 1e-3, "{whole} vs {halves}");

        // Short ramps keep 10 s slices
        let short = cns_dose(1.0, 1.2, 600.0);
        let fine = cns_dose(1.0, 1.1, 300.0) + cns_dose(1.1, 1.2, 300.0);
        assert!((short - fine).abs() < 1e-9);
    }

    #[test]
    fn test_record_accumulates_and_flags() {
        let mut exposure = OxygenExposure::new();
        exposure.record(1.4, 1.4, 1200.0);
        assert!(exposure.otu > 0.0);
        assert!((exposure.cns - 20.0 / 150.0 * 100.0).abs() < 1e-9);
        assert!(!exposure.warning());

        exposure.record(1.4, 1.7, 60.0);
        assert!(exposure.warning());
        assert!((exposure.max_pp_o2 - 1.7).abs() < 1e-12);
    }

    #[test]
    fn test_cns_surface_elimination() {
        let mut exposure = OxygenExposure::new();
        exposure.record(1.6, 1.6, 45.0 * 60.0);
        assert!((exposure.cns - 100.0).abs() < 1e-9);
        let otu = exposure.otu;
        exposure.record(0.21, 0.21, 90.0 * 60.0);
        assert!((exposure.cns - 50.0).abs() < 1e-9);
        assert_eq!(exposure.otu, otu);
    }
}
