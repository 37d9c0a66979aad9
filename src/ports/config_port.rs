//! Configuration access port trait.
//!
//! Strategy variants are declarative: every threshold table and voter
//! selection is read through this trait. A missing key yields the default;
//! a present key that does not parse is a [`EngineError::ConfigInvalid`].

use crate::domain::error::EngineError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, EngineError>;

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, EngineError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                EngineError::invalid(section, key, format!("'{raw}' is not an integer"))
            }),
        }
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, EngineError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(EngineError::invalid(section, key, format!("'{raw}' is not a number"))),
            },
        }
    }

    fn require_string(&self, section: &str, key: &str) -> Result<String, EngineError> {
        self.get_string(section, key)
            .ok_or_else(|| EngineError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Comma-separated value split into trimmed, non-empty items.
    fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get_string(section, key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }
}
