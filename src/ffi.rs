//! Foreign-callable session handle.
//!
//! Each handle owns one `DiveSession`; callers hold as many as they need.
//! The generated bindings share the handle across threads, so calls are
//! serialised on an internal mutex.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::DiveConfig;
use crate::deco::DecoResult;
use crate::error::DecoError;
use crate::gas::BreathingSource;
use crate::session::{DiveSession, DiveSnapshot, SegmentRecord, Supersaturation};

pub struct DecoSession {
    inner: Mutex<DiveSession>,
}

impl DecoSession {
    pub fn new(config: DiveConfig) -> Result<Self, DecoError> {
        Ok(DecoSession {
            inner: Mutex::new(DiveSession::new(config)?),
        })
    }

    fn session(&self) -> MutexGuard<'_, DiveSession> {
        // Every mutation validates before writing, so a poisoned lock still holds consistent state
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> DiveConfig {
        self.session().config().clone()
    }

    pub fn add_open_circuit(
        &self,
        fraction_o2: f64,
        fraction_he: f64,
    ) -> Result<u32, DecoError> {
        self.session().add_open_circuit(fraction_o2, fraction_he)
    }

    pub fn add_closed_circuit(
        &self,
        setpoint: f64,
        diluent_o2: f64,
        diluent_he: f64,
    ) -> Result<u32, DecoError> {
        self.session().add_closed_circuit(setpoint, diluent_o2, diluent_he)
    }

    pub fn breathing_source(&self, index: u32) -> Result<BreathingSource, DecoError> {
        self.session().breathing_source(index)
    }

    pub fn record_segment(
        &self,
        depth_m: f64,
        duration_sec: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        self.session().record_segment(depth_m, duration_sec, gas_index)
    }

    pub fn record_travel(
        &self,
        depth_m: f64,
        duration_min: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        self.session().record_travel(depth_m, duration_min, gas_index)
    }

    pub fn record_travel_with_rate(
        &self,
        depth_m: f64,
        rate: f64,
        gas_index: u32,
    ) -> Result<(), DecoError> {
        self.session().record_travel_with_rate(depth_m, rate, gas_index)
    }

    pub fn calculate_deco(&self) -> DecoResult {
        self.session().calculate_deco()
    }

    pub fn current_ceiling(&self) -> f64 {
        self.session().current_ceiling()
    }

    pub fn current_ndl(&self) -> Option<f64> {
        self.session().current_ndl()
    }

    pub fn supersaturation(&self) -> Supersaturation {
        self.session().supersaturation()
    }

    pub fn otu(&self) -> f64 {
        self.session().otu()
    }

    pub fn cns(&self) -> f64 {
        self.session().cns()
    }

    pub fn complete_state(&self) -> DiveSnapshot {
        self.session().complete_state()
    }

    pub fn complete_state_json(&self) -> Result<String, DecoError> {
        self.complete_state().to_json(false)
    }

    pub fn history(&self) -> Vec<SegmentRecord> {
        self.session().history().to_vec()
    }
}

pub fn default_config() -> DiveConfig {
    DiveConfig::default()
}
