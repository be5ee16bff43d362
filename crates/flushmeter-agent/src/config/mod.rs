//! Agent config loader (strict parsing).

pub mod schema;

use std::fs;

use flushmeter_core::{FlushError, Result};

pub use schema::{
    FlushmeterConfig, NamesSection, RequestSection, RetrySection, ServerSection, TrackerSection,
};

pub fn load_from_file(path: &str) -> Result<FlushmeterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| FlushError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<FlushmeterConfig> {
    let cfg: FlushmeterConfig =
        serde_yaml::from_str(s).map_err(|e| FlushError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
