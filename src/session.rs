//! Dive session: configuration, registered sources, tissue and exposure state.
//!
//! Segments are applied strictly in order. Every recording call validates
//! its inputs before touching state, so a rejected call leaves the session
//! exactly as it was. Queries never mutate.

use serde::{Deserialize, Serialize};

use crate::buhlmann::TissueState;
use crate::ceiling::CeilingCalculator;
use crate::config::DiveConfig;
use crate::deco::{DecoPlanner, DecoResult};
use crate::error::DecoError;
use crate::gas::{BreathingSource, GasRegistry};
use crate::ndl;
use crate::oxtox::{OxygenExposure, PP_O2_WARNING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Constant,
    Travel,
}

/// One recorded segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub kind: SegmentKind,
    pub start_depth_m: f64,
    pub end_depth_m: f64,
    pub duration_sec: f64,
    pub gas_index: u32,
}

/// Present loading as a percentage of the allowed supersaturation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Supersaturation {
    /// At the present depth.
    pub gf_99: f64,
    /// Were the diver to surface now.
    pub gf_surf: f64,
}

/// Everything a caller typically reads after a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiveSnapshot {
    pub depth_m: f64,
    pub elapsed_sec: f64,
    pub gas_index: Option<u32>,
    pub ceiling_m: f64,
    pub ndl_sec: Option<f64>,
    pub supersaturation: Supersaturation,
    pub otu: f64,
    pub cns: f64,
    pub max_pp_o2: f64,
    pub pp_o2_warning: bool,
    /// Compartment (1–16) closest to its surface limit, if any is supersaturated.
    pub leading_compartment: Option<u32>,
    pub deco: DecoResult,
}

impl DiveSnapshot {
    pub fn to_json(&self, pretty: bool) -> Result<String, DecoError> {
        let encoded = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        encoded.map_err(|e| DecoError::Encoding(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct DiveSession {
    config: DiveConfig,
    registry: GasRegistry,
    tissues: TissueState,
    exposure: OxygenExposure,
    depth_m: f64,
    elapsed_sec: f64,
    gas_index: Option<u32>,
    /// Gradient-factor anchor (m), fixed the first time the diver goes into deco.
    gf_low_depth: Option<f64>,
    history: Vec<SegmentRecord>,
}

impl DiveSession {
    /// Start a session at the surface with tissues equilibrated to air.
    pub fn new(config: DiveConfig) -> Result<Self, DecoError> {
        config.validate()?;
        let tissues = TissueState::surface_equilibrium(config.surface_pressure_bar());
        Ok(DiveSession {
            config,
            registry: GasRegistry::new(),
            tissues,
            exposure: OxygenExposure::new(),
            depth_m: 0.0,
            elapsed_sec: 0.0,
            gas_index: None,
            gf_low_depth: None,
            history: Vec::new(),
        })
    }

    pub fn config(&self) -> &DiveConfig {
        &self.config
    }

    pub fn add_breathing_source(&mut self, source: BreathingSource) -> Result<u32, DecoError> {
        let index = self.registry.add(source)?;
        tracing::debug!(index, "breathing source registered");
        Ok(index)
    }

    pub fn add_open_circuit(
        &mut self,
        fraction_o2: f64,
        fraction_he: f64,
    ) -> Result<u32, DecoError> {
        self.add_breathing_source(BreathingSource::open_circuit(fraction_o2, fraction_he)?)
    }

    pub fn add_closed_circuit(
        &mut self,
        setpoint: f64,
        diluent_o2: f64,
        diluent_he: f64,
    ) -> Result<u32, DecoError> {
        self.add_breathing_source(BreathingSource::closed_circuit(
            setpoint, diluent_o2, diluent_he,
        )?)
    }

    pub fn breathing_source(&self, index: u32) -> Result<BreathingSource, DecoError> {
        self.registry.get(index).cloned()
    }

    /// Stay at `depth_m` for `duration_sec` on source `gas_index`.
    pub fn record_segment(
        &mut self,
        depth_m: f64,
        duration_sec: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        check_depth(depth_m)?;
        check_positive("duration", duration_sec)?;
        let source = self.registry.get(gas_index)?;
        let ambient = self.config.ambient_pressure(depth_m);
        let pp_o2 = source.pp_o2(ambient);
        self.check_pp_o2(pp_o2)?;

        let inspired = source.inspired(ambient);
        self.tissues.apply_constant(duration_sec, &inspired);
        self.exposure.record(pp_o2, pp_o2, duration_sec);
        self.commit(SegmentRecord {
            kind: SegmentKind::Constant,
            start_depth_m: depth_m,
            end_depth_m: depth_m,
            duration_sec,
            gas_index,
        });
        Ok(())
    }

    /// Travel linearly from the present depth to `depth_m` over `duration_min`.
    pub fn record_travel(
        &mut self,
        depth_m: f64,
        duration_min: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        check_positive("duration", duration_min)?;
        self.travel(depth_m, duration_min * 60.0, gas_index)
    }

    /// Travel from the present depth to `depth_m` at `rate` m/min.
    pub fn record_travel_with_rate(
        &mut self,
        depth_m: f64,
        rate: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        check_depth(depth_m)?;
        check_positive("rate", rate)?;
        let distance = (depth_m - self.depth_m).abs();
        if distance <= 0.0 {
            return Err(DecoError::InvalidSegment(format!(
                "already at {depth_m} m, nothing to travel"
            )));
        }
        self.travel(depth_m, distance / rate * 60.0, gas_index)
    }

    fn travel(
        &mut self,
        depth_m: f64,
        duration_sec: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        check_depth(depth_m)?;
        check_positive("duration", duration_sec)?;
        let source = self.registry.get(gas_index)?;
        let start_ambient = self.config.ambient_pressure(self.depth_m);
        let end_ambient = self.config.ambient_pressure(depth_m);
        let pp_start = source.pp_o2(start_ambient);
        let pp_end = source.pp_o2(end_ambient);
        self.check_pp_o2(pp_start.max(pp_end))?;

        let start = source.inspired(start_ambient);
        let end = source.inspired(end_ambient);
        self.tissues.apply_ramp(duration_sec, &start, &end);
        self.exposure.record(pp_start, pp_end, duration_sec);
        self.commit(SegmentRecord {
            kind: SegmentKind::Travel,
            start_depth_m: self.depth_m,
            end_depth_m: depth_m,
            duration_sec,
            gas_index,
        });
        Ok(())
    }

    fn check_pp_o2(&self, pp_o2: f64) -> Result<(), DecoError> {
        match self.config.pp_o2_hard_limit {
            Some(limit) if pp_o2 > limit => {
                return Err(DecoError::ToxicityExceeded { pp_o2, limit });
            }
            None if pp_o2 > PP_O2_WARNING => {
                tracing::warn!(pp_o2, "ppO2 above {PP_O2_WARNING} bar");
            }
            _ => {}
        }
        if pp_o2 < self.config.min_pp_o2 {
            tracing::warn!(pp_o2, min = self.config.min_pp_o2, "hypoxic ppO2");
        }
        Ok(())
    }

    fn commit(&mut self, record: SegmentRecord) {
        tracing::debug!(
            kind = ?record.kind,
            from = record.start_depth_m,
            to = record.end_depth_m,
            duration_sec = record.duration_sec,
            gas = record.gas_index,
            "segment recorded"
        );
        self.depth_m = record.end_depth_m;
        self.elapsed_sec += record.duration_sec;
        self.gas_index = Some(record.gas_index);
        self.gf_low_depth =
            CeilingCalculator::new(&self.config).settle_anchor(&self.tissues, self.gf_low_depth);
        self.history.push(record);
    }

    fn active_source(&self) -> Option<&BreathingSource> {
        self.gas_index.and_then(|index| self.registry.get(index).ok())
    }

    /// Staged ascent from the present state. Failures are reported in the result.
    pub fn calculate_deco(&self) -> DecoResult {
        DecoPlanner::new(&self.config, &self.registry)
            .plan(
                &self.tissues,
                self.depth_m,
                self.gas_index,
                self.gf_low_depth,
            )
            .into()
    }

    /// Ceiling (m) as configured by `ceiling_type` and `round_ceiling`.
    pub fn current_ceiling(&self) -> f64 {
        CeilingCalculator::new(&self.config).ceiling(
            &self.tissues,
            self.depth_m,
            self.gf_low_depth,
            self.active_source(),
        )
    }

    /// NDL (s) at the present depth on the active source; `None` before any segment.
    pub fn current_ndl(&self) -> Option<f64> {
        let source = self.active_source()?;
        Some(ndl::ndl(&self.config, &self.tissues, self.depth_m, source))
    }

    pub fn supersaturation(&self) -> Supersaturation {
        let (gf_99, _) = self
            .tissues
            .max_gf(self.config.ambient_pressure(self.depth_m));
        let (gf_surf, _) = self.tissues.max_gf(self.config.surface_pressure_bar());
        Supersaturation { gf_99, gf_surf }
    }

    pub fn otu(&self) -> f64 {
        self.exposure.otu
    }

    pub fn cns(&self) -> f64 {
        self.exposure.cns
    }

    pub fn complete_state(&self) -> DiveSnapshot {
        let (gf_surf, leading) = self.tissues.max_gf(self.config.surface_pressure_bar());
        let leading_compartment = (gf_surf > 0.0).then_some(leading as u32 + 1);
        DiveSnapshot {
            depth_m: self.depth_m,
            elapsed_sec: self.elapsed_sec,
            gas_index: self.gas_index,
            ceiling_m: self.current_ceiling(),
            ndl_sec: self.current_ndl(),
            supersaturation: self.supersaturation(),
            otu: self.exposure.otu,
            cns: self.exposure.cns,
            max_pp_o2: self.exposure.max_pp_o2,
            pp_o2_warning: self.exposure.warning(),
            leading_compartment,
            deco: self.calculate_deco(),
        }
    }

    pub fn history(&self) -> &[SegmentRecord] {
        &self.history
    }

    pub fn depth_m(&self) -> f64 {
        self.depth_m
    }

    pub fn elapsed_sec(&self) -> f64 {
        self.elapsed_sec
    }

    pub fn gas_index(&self) -> Option<u32> {
        self.gas_index
    }

    pub fn tissues(&self) -> &TissueState {
        &self.tissues
    }

    /// Depth (m) the gradient-factor slope is anchored at, once in deco.
    pub fn gf_low_depth(&self) -> Option<f64> {
        self.gf_low_depth
    }
}

fn check_depth(depth_m: f64) -> Result<(), DecoError> {
    if depth_m.is_finite() && depth_m >= 0.0 {
        Ok(())
    } else {
        Err(DecoError::InvalidSegment(format!(
            "depth must be >= 0, got {depth_m}"
        )))
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), DecoError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DecoError::InvalidSegment(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
