//! No-decompression limit: time left at the present depth before a ceiling forms.

use crate::buhlmann::TissueState;
use crate::ceiling::CeilingCalculator;
use crate::config::DiveConfig;
use crate::gas::BreathingSource;

/// Upper bound on the reported NDL (min).
pub const NDL_CUT_OFF_MIN: f64 = 99.0;

/// Coarse simulation step (s).
const NDL_STEP_SEC: u32 = 60;

/// Seconds that can still be spent at `depth_m` on `gas` with no ceiling.
///
/// Zero when a ceiling already exists, [`NDL_CUT_OFF_MIN`] in seconds when
/// none forms within the cut-off. `tissues` is left untouched.
pub fn ndl(
    config: &DiveConfig,
    tissues: &TissueState,
    depth_m: f64,
    gas: &BreathingSource,
) -> f64 {
    let calc = CeilingCalculator::new(config);
    let in_deco = |t: &TissueState| calc.in_deco(t);
    if in_deco(tissues) {
        return 0.0;
    }

    let inspired = gas.inspired(config.ambient_pressure(depth_m));
    let cut_off_sec = (NDL_CUT_OFF_MIN * 60.0) as u32;
    let mut sim = tissues.clone();
    let mut elapsed: u32 = 0;

    while elapsed < cut_off_sec {
        let mut next = sim.clone();
        next.apply_constant(NDL_STEP_SEC as f64, &inspired);
        if in_deco(&next) {
            // Ceiling forms within this minute; narrow it down to the second
            let (mut ok, mut bad) = (0, NDL_STEP_SEC);
            while bad - ok > 1 {
                let mid = (ok + bad) / 2;
                let mut ahead = sim.clone();
                ahead.apply_constant(mid as f64, &inspired);
                if in_deco(&ahead) {
                    bad = mid;
                } else {
                    ok = mid;
                }
            }
            return (elapsed + ok) as f64;
        }
        sim = next;
        elapsed += NDL_STEP_SEC;
    }
    cut_off_sec as f64
}
