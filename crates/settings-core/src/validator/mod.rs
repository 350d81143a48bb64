//! Section validators
//!
//! A validator is registered per top-level section either as a *config*
//! validator, checked against the merged section, or as an *override*
//! validator, checked before a higher layer overrides a lower one. Each
//! registration carries the message reported on failure.
//!
//! The registry is built once per run and is read-only afterwards.

mod rule;

pub use rule::{Rule, ValidatorSpec};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use settings_diff::MergeGuard;

use crate::error::{Error, Result};

/// Predicates for one configuration section.
///
/// Both methods accept by default, so an implementation only overrides the
/// check it cares about.
pub trait SectionValidator: Send + Sync + fmt::Debug {
    /// Whether the merged section is acceptable.
    fn is_valid(&self, _merged: &Value) -> bool {
        true
    }

    /// Whether `overlay` may override `base`.
    fn can_override(&self, _base: &Value, _overlay: &Value) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct Registration {
    validator: Arc<dyn SectionValidator>,
    error: String,
}

/// Validators keyed by section name
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    config: BTreeMap<String, Vec<Registration>>,
    overrides: BTreeMap<String, Vec<Registration>>,
}

impl ValidatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile declared rules into a registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] for a malformed rule.
    pub fn from_specs(config: &[ValidatorSpec], overrides: &[ValidatorSpec]) -> Result<Self> {
        let mut registry = Self::new();
        registry.extend_specs(config, overrides)?;
        Ok(registry)
    }

    /// Add declared rules to the registry.
    pub fn extend_specs(
        &mut self,
        config: &[ValidatorSpec],
        overrides: &[ValidatorSpec],
    ) -> Result<()> {
        for spec in config {
            spec.rule.check_config(&spec.plugin)?;
            self.register_config(&spec.plugin, Arc::new(spec.rule.clone()), &spec.error);
        }
        for spec in overrides {
            spec.rule.check(&spec.plugin)?;
            self.register_override(&spec.plugin, Arc::new(spec.rule.clone()), &spec.error);
        }
        Ok(())
    }

    /// Register a validator for merged values of `section`.
    pub fn register_config(
        &mut self,
        section: impl Into<String>,
        validator: Arc<dyn SectionValidator>,
        error: impl Into<String>,
    ) {
        self.config
            .entry(section.into())
            .or_default()
            .push(Registration {
                validator,
                error: error.into(),
            });
    }

    /// Register a validator for overrides of `section`.
    pub fn register_override(
        &mut self,
        section: impl Into<String>,
        validator: Arc<dyn SectionValidator>,
        error: impl Into<String>,
    ) {
        self.overrides
            .entry(section.into())
            .or_default()
            .push(Registration {
                validator,
                error: error.into(),
            });
    }

    /// Check a merged (or standalone) section value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] with the first failing validator's
    /// message.
    pub fn check_valid(&self, section: &str, value: &Value) -> Result<()> {
        for registration in self.config.get(section).into_iter().flatten() {
            if !registration.validator.is_valid(value) {
                tracing::error!(section = %section, error = %registration.error, "Config validator rejected section");
                return Err(Error::Validation {
                    section: section.to_string(),
                    message: registration.error.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check whether `overlay` may override `base` for `section`.
    pub fn check_override(&self, section: &str, base: &Value, overlay: &Value) -> Result<()> {
        for registration in self.overrides.get(section).into_iter().flatten() {
            if !registration.validator.can_override(base, overlay) {
                tracing::error!(section = %section, error = %registration.error, "Override validator rejected section");
                return Err(Error::Validation {
                    section: section.to_string(),
                    message: registration.error.clone(),
                });
            }
        }
        Ok(())
    }

    /// Sections with at least one validator.
    pub fn sections(&self) -> Vec<&str> {
        let mut sections: Vec<&str> = self
            .config
            .keys()
            .chain(self.overrides.keys())
            .map(String::as_str)
            .collect();
        sections.sort_unstable();
        sections.dedup();
        sections
    }

    /// Number of registered validators.
    pub fn len(&self) -> usize {
        self.config.values().chain(self.overrides.values()).map(Vec::len).sum()
    }

    /// Check if no validator is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MergeGuard for ValidatorRegistry {
    fn can_override(&self, section: &str, base: &Value, overlay: &Value) -> settings_diff::Result<()> {
        self.check_override(section, base, overlay).map_err(rejection)
    }

    fn is_valid(&self, section: &str, merged: &Value) -> settings_diff::Result<()> {
        self.check_valid(section, merged).map_err(rejection)
    }
}

fn rejection(err: Error) -> settings_diff::Error {
    match err {
        Error::Validation { section, message } => settings_diff::Error::rejected(section, message),
        other => settings_diff::Error::rejected("", other.to_string()),
    }
}
