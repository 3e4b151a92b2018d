pub mod buhlmann;
pub mod ceiling;
pub mod config;
pub mod deco;
pub mod error;
pub mod ffi;
pub mod gas;
pub mod logging;
pub mod ndl;
pub mod oxtox;
pub mod script;
pub mod session;

uniffi::include_scaffolding!("decoplan");

pub use config::{CeilingType, DiveConfig, StopFormatting};
pub use deco::{DecoResult, DecoStage, DecoStageType, DecoTable};
pub use error::{DecoError, ScriptError};
pub use ffi::{default_config, DecoSession};
pub use gas::{BreathingSource, Gas};
pub use session::{DiveSession, DiveSnapshot, SegmentKind, SegmentRecord, Supersaturation};
