use thiserror::Error;

/// Error type for the decompression engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecoError {
    #[error("no breathing source registered at index {0}")]
    InvalidIndex(u32),

    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("decompression plan unreachable: {0}")]
    UnreachablePlan(String),

    #[error("ppO2 {pp_o2:.2} bar exceeds the configured limit of {limit:.2} bar")]
    ToxicityExceeded { pp_o2: f64, limit: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid gas: {0}")]
    InvalidGas(String),

    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// Error type for dive script parsing and execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("line {line}: parse error: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: unknown gas '{name}'")]
    UnknownGas { line: usize, name: String },

    #[error("line {line}: settings must precede the first gas or segment")]
    SettingAfterStart { line: usize },

    #[error("line {line}: {source}")]
    Engine {
        line: usize,
        #[source]
        source: DecoError,
    },
}
