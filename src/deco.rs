//! Staged ascent planner.
//!
//! From the present tissue state the planner ascends at the configured deco
//! ascent rate to the first stop and holds each stop in whole seconds until
//! the ceiling, evaluated with the gradient factor of the stop being held,
//! reaches the next shallower stop. The richest usable breathing source is
//! picked at every stop and the plan finishes with a direct ascent once the
//! surface is tolerated.

use serde::{Deserialize, Serialize};

use crate::buhlmann::TissueState;
use crate::ceiling::{CeilingCalculator, SlopeScope};
use crate::config::DiveConfig;
use crate::error::DecoError;
use crate::gas::{BreathingSource, GasRegistry};
use crate::oxtox::PP_O2_WARNING;

/// Stop spacing used when stops are not quantised (m).
const CONTINUOUS_STEP_M: f64 = 1.0;

/// Coarse hold step (s).
const HOLD_STEP_SEC: u32 = 60;

/// Longest single stop before the plan is declared unreachable (s).
const MAX_STOP_SEC: u32 = 48 * 3600;

/// Guard on the planner loop.
const MAX_PLAN_ITERATIONS: usize = 10_000;

/// Extra time at the present depth behind `tts_at_5` (s).
const EXTENSION_SEC: f64 = 5.0 * 60.0;

const DEPTH_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoStageType {
    Ascent,
    DecoStop,
    GasSwitch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoStage {
    pub stage_type: DecoStageType,
    pub start_depth_m: f64,
    pub end_depth_m: f64,
    pub duration_sec: f64,
    /// Breathing source in use during the stage.
    pub gas_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecoTable {
    pub stages: Vec<DecoStage>,
    /// Total time to surface (s).
    pub tts_sec: f64,
    /// Time to surface after five more minutes at the present depth on the present source (s).
    pub tts_at_5_sec: f64,
    pub tts_delta_at_5_sec: f64,
}

/// Outcome of a planning request as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoResult {
    pub success: bool,
    pub error: Option<String>,
    pub table: Option<DecoTable>,
}

impl From<Result<DecoTable, DecoError>> for DecoResult {
    fn from(plan: Result<DecoTable, DecoError>) -> Self {
        match plan {
            Ok(table) => DecoResult {
                success: true,
                error: None,
                table: Some(table),
            },
            Err(e) => DecoResult {
                success: false,
                error: Some(e.to_string()),
                table: None,
            },
        }
    }
}

pub struct DecoPlanner<'a> {
    config: &'a DiveConfig,
    registry: &'a GasRegistry,
    calc: CeilingCalculator<'a>,
}

impl<'a> DecoPlanner<'a> {
    pub fn new(config: &'a DiveConfig, registry: &'a GasRegistry) -> Self {
        DecoPlanner {
            config,
            registry,
            calc: CeilingCalculator::new(config),
        }
    }

    /// Plan the ascent of a diver at `depth_m` breathing `gas_index`.
    ///
    /// `anchor_m` is the gradient-factor anchor settled so far during the dive.
    /// A diver at the surface, or one with no active source, gets an empty table.
    pub fn plan(
        &self,
        tissues: &TissueState,
        depth_m: f64,
        gas_index: Option<u32>,
        anchor_m: Option<f64>,
    ) -> Result<DecoTable, DecoError> {
        let gas_index = match gas_index {
            Some(index) if depth_m > 0.0 => index,
            _ => return Ok(DecoTable::default()),
        };
        let source = self.registry.get(gas_index)?;

        let stages = self.simulate(
            tissues,
            depth_m,
            gas_index,
            anchor_m,
            self.calc.config_scope(),
        )?;
        let tts_sec = total_duration(&stages);

        let mut extended = tissues.clone();
        extended.apply_constant(
            EXTENSION_SEC,
            &source.inspired(self.config.ambient_pressure(depth_m)),
        );
        let extended_anchor = self.calc.settle_anchor(&extended, anchor_m);
        let tts_at_5_sec = total_duration(&self.simulate(
            &extended,
            depth_m,
            gas_index,
            extended_anchor,
            SlopeScope::Leading,
        )?);

        tracing::debug!(
            depth_m,
            stages = stages.len(),
            tts_sec,
            tts_at_5_sec,
            "decompression plan computed"
        );
        Ok(DecoTable {
            stages,
            tts_sec,
            tts_at_5_sec,
            tts_delta_at_5_sec: tts_at_5_sec - tts_sec,
        })
    }

    /// `scope` applies to the first ceiling only; the ascent is simulated
    /// with the leading compartment alone on the slope.
    fn simulate(
        &self,
        tissues: &TissueState,
        depth_m: f64,
        gas_index: u32,
        anchor_m: Option<f64>,
        scope: SlopeScope,
    ) -> Result<Vec<DecoStage>, DecoError> {
        let mut sim = tissues.clone();
        let mut depth = depth_m;
        let mut gas_index = gas_index;
        let mut anchor = self.calc.settle_anchor(&sim, anchor_m);
        let mut scope = scope;
        let mut stages = Vec::new();
        let last_stop_m = self.config.last_stop_m();

        for _ in 0..MAX_PLAN_ITERATIONS {
            let ceiling = self.calc.raw_ceiling(&sim, depth, anchor, scope);
            scope = SlopeScope::Leading;
            if ceiling <= 0.0 {
                self.ascend(&mut sim, &mut stages, depth, 0.0, gas_index)?;
                return Ok(stages);
            }

            // A diver already above the stop holds where they are
            let stop = self.stop_depth(ceiling, last_stop_m).min(depth);
            if stop < depth - DEPTH_EPSILON {
                self.ascend(&mut sim, &mut stages, depth, stop, gas_index)?;
                anchor = self.calc.settle_anchor(&sim, anchor);
                depth = stop;
                continue;
            }

            let best = self.select_gas(depth, gas_index)?;
            if best != gas_index {
                push_stage(
                    &mut stages,
                    DecoStage {
                        stage_type: DecoStageType::GasSwitch,
                        start_depth_m: depth,
                        end_depth_m: depth,
                        duration_sec: 0.0,
                        gas_index: best,
                    },
                );
                gas_index = best;
            }

            let next = self.next_stop(depth, last_stop_m);
            let held = self.hold(&mut sim, depth, next, anchor, gas_index)?;
            if held > 0 {
                push_stage(
                    &mut stages,
                    DecoStage {
                        stage_type: DecoStageType::DecoStop,
                        start_depth_m: depth,
                        end_depth_m: depth,
                        duration_sec: held as f64,
                        gas_index,
                    },
                );
            }
        }

        tracing::warn!(depth_m, "decompression plan did not converge");
        Err(DecoError::UnreachablePlan(format!(
            "no convergence after {MAX_PLAN_ITERATIONS} iterations"
        )))
    }

    /// Stop depth for a ceiling: rounded up to the stop grid, never shallower than the last stop.
    fn stop_depth(&self, ceiling_m: f64, last_stop_m: f64) -> f64 {
        if ceiling_m <= last_stop_m {
            last_stop_m
        } else {
            self.config.round_to_stop(ceiling_m).max(last_stop_m)
        }
    }

    /// The stop after `stop_m`: the next grid depth above it, the last stop, then the surface.
    fn next_stop(&self, stop_m: f64, last_stop_m: f64) -> f64 {
        if stop_m <= last_stop_m + DEPTH_EPSILON {
            return 0.0;
        }
        let candidate = match self.config.stop_formatting.increment_m() {
            Some(increment) => ((stop_m - DEPTH_EPSILON) / increment).floor() * increment,
            None => stop_m - CONTINUOUS_STEP_M,
        };
        candidate.max(last_stop_m)
    }

    /// Richest source whose ppO2 at `depth_m` lies within the allowed window.
    fn select_gas(&self, depth_m: f64, current: u32) -> Result<u32, DecoError> {
        let ambient = self.config.ambient_pressure(depth_m);
        let max_pp_o2 = self.config.pp_o2_hard_limit.unwrap_or(PP_O2_WARNING);
        let usable = |source: &BreathingSource| {
            let pp_o2 = source.pp_o2(ambient);
            pp_o2 >= self.config.min_pp_o2 && pp_o2 <= max_pp_o2 + DEPTH_EPSILON
        };

        let mut best: Option<(u32, f64)> = self
            .registry
            .get(current)
            .ok()
            .filter(|source| usable(source))
            .map(|source| (current, source.pp_o2(ambient)));
        for (index, source) in self.registry.iter() {
            if !usable(source) {
                continue;
            }
            let pp_o2 = source.pp_o2(ambient);
            if best.map_or(true, |(_, best_pp)| pp_o2 > best_pp + DEPTH_EPSILON) {
                best = Some((index, pp_o2));
            }
        }

        match best {
            Some((index, _)) => Ok(index),
            None => {
                tracing::warn!(depth_m, "no breathing source usable at stop");
                Err(DecoError::UnreachablePlan(format!(
                    "no breathing source delivers ppO2 within [{:.2}, {:.2}] bar at {:.1} m",
                    self.config.min_pp_o2, max_pp_o2, depth_m
                )))
            }
        }
    }

    fn ascend(
        &self,
        sim: &mut TissueState,
        stages: &mut Vec<DecoStage>,
        from_m: f64,
        to_m: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        if from_m - to_m <= DEPTH_EPSILON {
            return Ok(());
        }
        let source = self.registry.get(gas_index)?;
        let duration_sec = (from_m - to_m) / self.config.deco_ascent_rate * 60.0;
        sim.apply_ramp(
            duration_sec,
            &source.inspired(self.config.ambient_pressure(from_m)),
            &source.inspired(self.config.ambient_pressure(to_m)),
        );
        push_stage(
            stages,
            DecoStage {
                stage_type: DecoStageType::Ascent,
                start_depth_m: from_m,
                end_depth_m: to_m,
                duration_sec,
                gas_index,
            },
        );
        Ok(())
    }

    /// Hold at `depth_m` until the ceiling there reaches `next_m`; returns whole seconds held.
    fn hold(
        &self,
        sim: &mut TissueState,
        depth_m: f64,
        next_m: f64,
        anchor_m: Option<f64>,
        gas_index: u32,
    ) -> Result<u32, DecoError> {
        let inspired = self
            .registry
            .get(gas_index)?
            .inspired(self.config.ambient_pressure(depth_m));
        let clear = |t: &TissueState| {
            self.calc
                .raw_ceiling(t, depth_m, anchor_m, SlopeScope::Leading)
                <= next_m + DEPTH_EPSILON
        };

        let mut held: u32 = 0;
        while !clear(sim) {
            if held >= MAX_STOP_SEC {
                tracing::warn!(depth_m, held, "stop exceeds the maximum duration");
                return Err(DecoError::UnreachablePlan(format!(
                    "stop at {depth_m:.1} m does not clear within {} h",
                    MAX_STOP_SEC / 3600
                )));
            }
            let mut ahead = sim.clone();
            ahead.apply_constant(HOLD_STEP_SEC as f64, &inspired);
            if !clear(&ahead) {
                *sim = ahead;
                held += HOLD_STEP_SEC;
                continue;
            }

            // Clears within this step; find the first whole second that does
            let (mut blocked, mut cleared) = (0, HOLD_STEP_SEC);
            while cleared - blocked > 1 {
                let mid = (blocked + cleared) / 2;
                let mut ahead = sim.clone();
                ahead.apply_constant(mid as f64, &inspired);
                if clear(&ahead) {
                    cleared = mid;
                } else {
                    blocked = mid;
                }
            }
            sim.apply_constant(cleared as f64, &inspired);
            held += cleared;
        }
        Ok(held)
    }
}

/// Append `stage`, folding it into the previous one when both are the same
/// kind of stage on the same source.
fn push_stage(stages: &mut Vec<DecoStage>, stage: DecoStage) {
    if let Some(last) = stages.last_mut() {
        if last.stage_type == stage.stage_type
            && last.gas_index == stage.gas_index
            && (last.end_depth_m - stage.start_depth_m).abs() < DEPTH_EPSILON
        {
            last.end_depth_m = stage.end_depth_m;
            last.duration_sec += stage.duration_sec;
            return;
        }
    }
    stages.push(stage);
}

fn total_duration(stages: &[DecoStage]) -> f64 {
    stages.iter().map(|stage| stage.duration_sec).sum()
}
