//! JSON test vector loader for name admission tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NameVector {
    pub description: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Builds the name as `fill` repeated `repeat` times (length-limit vectors).
    #[serde(default)]
    pub fill: Option<Repeat>,
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Repeat {
    pub unit: String,
    pub repeat: usize,
}

impl NameVector {
    pub fn build(&self) -> String {
        match (&self.name, &self.fill) {
            (Some(n), None) => n.clone(),
            (None, Some(f)) => f.unit.repeat(f.repeat),
            _ => panic!("vector must set exactly one of name/fill: {}", self.description),
        }
    }
}
