//! Breathing gases, open/closed circuit sources and the per-session registry.

use serde::{Deserialize, Serialize};

use crate::buhlmann::P_WATER_VAPOR;
use crate::error::DecoError;

/// Tolerance on the sum of gas fractions.
const FRACTION_EPSILON: f64 = 1e-9;

/// Fraction of O2 in air.
pub const AIR_FO2: f64 = 0.21;

/// A gas mix. Fractions always sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gas {
    pub fraction_o2: f64,
    pub fraction_n2: f64,
    pub fraction_he: f64,
}

impl Gas {
    /// Build a mix from its O2 and He fractions; N2 makes up the balance.
    pub fn new(fraction_o2: f64, fraction_he: f64) -> Result<Self, DecoError> {
        if !fraction_o2.is_finite() || fraction_o2 <= 0.0 || fraction_o2 > 1.0 {
            return Err(DecoError::InvalidGas(format!(
                "O2 fraction must be within (0, 1], got {fraction_o2}"
            )));
        }
        if !fraction_he.is_finite() || !(0.0..=1.0).contains(&fraction_he) {
            return Err(DecoError::InvalidGas(format!(
                "He fraction must be within [0, 1], got {fraction_he}"
            )));
        }
        if fraction_o2 + fraction_he > 1.0 + FRACTION_EPSILON {
            return Err(DecoError::InvalidGas(format!(
                "O2 ({fraction_o2}) + He ({fraction_he}) exceeds 1.0"
            )));
        }
        Ok(Gas {
            fraction_o2,
            fraction_n2: (1.0 - fraction_o2 - fraction_he).max(0.0),
            fraction_he,
        })
    }

    pub fn air() -> Self {
        Gas {
            fraction_o2: AIR_FO2,
            fraction_n2: 1.0 - AIR_FO2,
            fraction_he: 0.0,
        }
    }
}

/// Where the diver's breath comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BreathingSource {
    OpenCircuit { gas: Gas },
    /// Rebreather holding `setpoint` bar of O2 over `diluent`.
    ClosedCircuit { setpoint: f64, diluent: Gas },
}

/// Inspired partial pressures (bar) at a given ambient pressure.
///
/// `pp_n2`/`pp_he` are alveolar values (water vapour removed) and drive
/// tissue loading; `pp_o2` is the dry-gas value used for toxicity and
/// gas selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InspiredPressures {
    pub pp_o2: f64,
    pub pp_n2: f64,
    pub pp_he: f64,
}

impl BreathingSource {
    pub fn open_circuit(fraction_o2: f64, fraction_he: f64) -> Result<Self, DecoError> {
        Ok(BreathingSource::OpenCircuit {
            gas: Gas::new(fraction_o2, fraction_he)?,
        })
    }

    pub fn closed_circuit(
        setpoint: f64,
        diluent_o2: f64,
        diluent_he: f64,
    ) -> Result<Self, DecoError> {
        if !setpoint.is_finite() || setpoint <= 0.0 {
            return Err(DecoError::InvalidGas(format!(
                "setpoint must be positive, got {setpoint}"
            )));
        }
        Ok(BreathingSource::ClosedCircuit {
            setpoint,
            diluent: Gas::new(diluent_o2, diluent_he)?,
        })
    }

    /// Re-check the invariants of a source built outside the constructors.
    pub fn validate(&self) -> Result<(), DecoError> {
        match self {
            BreathingSource::OpenCircuit { gas } => {
                check_fractions(gas)?;
            }
            BreathingSource::ClosedCircuit { setpoint, diluent } => {
                if !setpoint.is_finite() || *setpoint <= 0.0 {
                    return Err(DecoError::InvalidGas(format!(
                        "setpoint must be positive, got {setpoint}"
                    )));
                }
                check_fractions(diluent)?;
            }
        }
        Ok(())
    }

    /// The gas whose inert fractions are breathed.
    pub fn gas(&self) -> &Gas {
        match self {
            BreathingSource::OpenCircuit { gas } => gas,
            BreathingSource::ClosedCircuit { diluent, .. } => diluent,
        }
    }

    /// Oxygen partial pressure (bar) delivered at `ambient_bar`.
    ///
    /// A rebreather cannot deliver less O2 than its diluent nor more than
    /// the ambient pressure, so the setpoint is clamped into that range.
    pub fn pp_o2(&self, ambient_bar: f64) -> f64 {
        match self {
            BreathingSource::OpenCircuit { gas } => gas.fraction_o2 * ambient_bar,
            BreathingSource::ClosedCircuit { setpoint, diluent } => {
                let floor = diluent.fraction_o2 * ambient_bar;
                setpoint.min(ambient_bar).max(floor)
            }
        }
    }

    pub fn inspired(&self, ambient_bar: f64) -> InspiredPressures {
        let alveolar = (ambient_bar - P_WATER_VAPOR).max(0.0);
        let pp_o2 = self.pp_o2(ambient_bar);
        match self {
            BreathingSource::OpenCircuit { gas } => InspiredPressures {
                pp_o2,
                pp_n2: alveolar * gas.fraction_n2,
                pp_he: alveolar * gas.fraction_he,
            },
            BreathingSource::ClosedCircuit { diluent, .. } => {
                let inert_fraction = if ambient_bar > 0.0 {
                    (1.0 - pp_o2 / ambient_bar).max(0.0)
                } else {
                    0.0
                };
                let diluent_inert = diluent.fraction_n2 + diluent.fraction_he;
                if diluent_inert <= FRACTION_EPSILON {
                    return InspiredPressures {
                        pp_o2,
                        pp_n2: 0.0,
                        pp_he: 0.0,
                    };
                }
                let inert = alveolar * inert_fraction;
                InspiredPressures {
                    pp_o2,
                    pp_n2: inert * diluent.fraction_n2 / diluent_inert,
                    pp_he: inert * diluent.fraction_he / diluent_inert,
                }
            }
        }
    }
}

fn check_fractions(gas: &Gas) -> Result<(), DecoError> {
    let rebuilt = Gas::new(gas.fraction_o2, gas.fraction_he)?;
    if (rebuilt.fraction_n2 - gas.fraction_n2).abs() > 1e-6 {
        return Err(DecoError::InvalidGas(format!(
            "fractions sum to {}, expected 1",
            gas.fraction_o2 + gas.fraction_n2 + gas.fraction_he
        )));
    }
    Ok(())
}

/// Append-only store of breathing sources, addressed by insertion index.
#[derive(Debug, Clone, Default)]
pub struct GasRegistry {
    sources: Vec<BreathingSource>,
}

impl GasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source and return its index.
    pub fn add(&mut self, source: BreathingSource) -> Result<u32, DecoError> {
        source.validate()?;
        let index = u32::try_from(self.sources.len())
            .map_err(|_| DecoError::InvalidGas("too many breathing sources".to_string()))?;
        self.sources.push(source);
        Ok(index)
    }

    pub fn get(&self, index: u32) -> Result<&BreathingSource, DecoError> {
        self.sources
            .get(index as usize)
            .ok_or(DecoError::InvalidIndex(index))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BreathingSource)> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, source)| (i as u32, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_fractions() {
        let gas = Gas::new(0.21, 0.35).unwrap();
        assert!((gas.fraction_n2 - 0.44).abs() < 1e-12);
        assert!(
            (gas.fraction_o2 + gas.fraction_n2 + gas.fraction_he - 1.0).abs() < 1e-12
        );

        let oxygen = Gas::new(1.0, 0.0).unwrap();
        assert_eq!(oxygen.fraction_n2, 0.0);
    }

    #[test]
    fn test_invalid_gas() {
        assert!(matches!(Gas::new(0.0, 0.0), Err(DecoError::InvalidGas(_))));
        assert!(matches!(Gas::new(1.2, 0.0), Err(DecoError::InvalidGas(_))));
        assert!(matches!(Gas::new(0.21, -0.1), Err(DecoError::InvalidGas(_))));
        assert!(matches!(Gas::new(0.6, 0.5), Err(DecoError::InvalidGas(_))));
        assert!(BreathingSource::closed_circuit(0.0, 0.21, 0.0).is_err());
    }

    #[test]
    fn test_registry_indices_are_insertion_order() {
        let mut registry = GasRegistry::new();
        assert!(registry.is_empty());
        let air = registry
            .add(BreathingSource::OpenCircuit { gas: Gas::air() })
            .unwrap();
        let ean50 = registry
            .add(BreathingSource::open_circuit(0.5, 0.0).unwrap())
            .unwrap();
        assert_eq!(air, 0);
        assert_eq!(ean50, 1);
        assert_eq!(registry.len(), 2);
        assert!(matches!(registry.get(2), Err(DecoError::InvalidIndex(2))));
    }

    #[test]
    fn test_registry_round_trip() {
        let mut registry = GasRegistry::new();
        let idx = registry
            .add(BreathingSource::open_circuit(0.18, 0.45).unwrap())
            .unwrap();
        let gas = registry.get(idx).unwrap().gas().clone();
        assert!((gas.fraction_o2 - 0.18).abs() < 1e-9);
        assert!((gas.fraction_he - 0.45).abs() < 1e-9);
        assert!((gas.fraction_n2 - 0.37).abs() < 1e-9);
    }

    #[test]
    fn test_registry_rejects_inconsistent_source() {
        let mut registry = GasRegistry::new();
        let bogus = BreathingSource::OpenCircuit {
            gas: Gas {
                fraction_o2: 0.21,
                fraction_n2: 0.21,
                fraction_he: 0.0,
            },
        };
        assert!(registry.add(bogus).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_open_circuit_inspired() {
        let air = BreathingSource::OpenCircuit { gas: Gas::air() };
        let insp = air.inspired(3.0);
        assert!((insp.pp_o2 - 0.63).abs() < 1e-12);
        assert!((insp.pp_n2 - (3.0 - P_WATER_VAPOR) * 0.79).abs() < 1e-12);
        assert_eq!(insp.pp_he, 0.0);
    }

    #[test]
    fn test_closed_circuit_setpoint_clamp() {
        let ccr = BreathingSource::closed_circuit(1.3, 0.21, 0.35).unwrap();

        // Deep: the setpoint holds
        assert!((ccr.pp_o2(5.0) - 1.3).abs() < 1e-12);
        // Shallow: cannot exceed ambient
        assert!((ccr.pp_o2(1.0) - 1.0).abs() < 1e-12);
        // Very deep: diluent alone delivers more than the setpoint
        assert!((ccr.pp_o2(10.0) - 2.1).abs() < 1e-12);

        let insp = ccr.inspired(5.0);
        let inert = (5.0 - P_WATER_VAPOR) * (1.0 - 1.3 / 5.0);
        assert!((insp.pp_n2 + insp.pp_he - inert).abs() < 1e-12);
        // Diluent N2:He ratio is preserved
        assert!((insp.pp_he / insp.pp_n2 - 0.35 / 0.44).abs() < 1e-9);

        let surface = ccr.inspired(1.0);
        assert_eq!(surface.pp_n2, 0.0);
        assert_eq!(surface.pp_he, 0.0);
    }
}
