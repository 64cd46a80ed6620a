//! Algorithm configuration.
//!
//! Each algorithm instance is configured by:
//! - an identity ([`TriggerKey`] and instance name),
//! - the registered algorithm type it instantiates,
//! - a string key/value parameter map, validated against the algorithm's
//!   [`ParamSpec`] list,
//! - readout templates applied at emission.
//!
//! Times in parameters are nanoseconds.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ConfigError, ReadoutTemplate};
use crate::payload::{ChannelId, HitType, SourceId, TriggerKey};

/// Configuration for one algorithm instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Instance name, used in logs and statistics.
    pub name: String,
    /// Registered algorithm type (e.g. `SimpleMajorityTrigger`).
    #[serde(rename = "type")]
    pub algorithm: String,
    /// Trigger type stamped on emitted requests.
    pub trigger_type: i32,
    /// Configuration id stamped on emitted requests.
    pub config_id: i32,
    /// Source id stamped on emitted requests.
    pub source: SourceId,
    /// Algorithm parameters.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Readout templates.
    #[serde(default)]
    pub readouts: Vec<ReadoutTemplate>,
}

impl AlgorithmConfig {
    /// Creates a config with no parameters or readouts.
    #[must_use]
    pub fn new(name: impl Into<String>, algorithm: impl Into<String>, key: TriggerKey) -> Self {
        Self {
            name: name.into(),
            algorithm: algorithm.into(),
            trigger_type: key.trigger_type,
            config_id: key.config_id,
            source: key.source,
            params: HashMap::new(),
            readouts: Vec::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value.to_string());
        self
    }

    /// Adds a readout template.
    #[must_use]
    pub fn with_readout(mut self, template: ReadoutTemplate) -> Self {
        self.readouts.push(template);
        self
    }

    /// Identity stamped on emitted requests.
    #[must_use]
    pub fn key(&self) -> TriggerKey {
        TriggerKey::new(self.trigger_type, self.config_id, self.source)
    }

    /// Sets a parameter.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Gets a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Gets a required parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingParam`] if the key is not set.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingParam {
            algorithm: self.name.clone(),
            param: key.to_string(),
        })
    }

    /// Gets a parameter parsed as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the value cannot be parsed.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => self.parse_value(key, v).map(Some),
            None => Ok(None),
        }
    }

    /// Gets a required parameter parsed as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingParam`] if the key is missing, or
    /// [`ConfigError::InvalidValue`] if parsing fails.
    pub fn require_parsed<T: FromStr>(&self, key: &str) -> Result<T, ConfigError>
    where
        T::Err: fmt::Display,
    {
        let value = self.require(key)?;
        self.parse_value(key, value)
    }

    /// Gets a parameter parsed as `T`, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the value cannot be parsed.
    pub fn parsed_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: fmt::Display,
    {
        Ok(self.get_parsed(key)?.unwrap_or(default))
    }

    /// Gets a comma-separated list parameter; empty when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if any element fails to parse.
    pub fn get_list<T: FromStr>(&self, key: &str) -> Result<Vec<T>, ConfigError>
    where
        T::Err: fmt::Display,
    {
        let Some(value) = self.get(key) else {
            return Ok(Vec::new());
        };
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| self.parse_value(key, item))
            .collect()
    }

    /// Builds an out-of-range error for `key`.
    #[must_use]
    pub fn invalid(&self, key: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            algorithm: self.name.clone(),
            param: key.to_string(),
            value: self.get(key).unwrap_or_default().to_string(),
            reason: reason.into(),
        }
    }

    fn parse_value<T: FromStr>(&self, key: &str, value: &str) -> Result<T, ConfigError>
    where
        T::Err: fmt::Display,
    {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                algorithm: self.name.clone(),
                param: key.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    /// Validates parameters and readouts against the algorithm's specs.
    ///
    /// Unknown parameter names, missing required parameters, unparseable
    /// values and out-of-range integers are rejected.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self, specs: &[ParamSpec]) -> Result<(), ConfigError> {
        let mut names: Vec<&String> = self.params.keys().collect();
        names.sort();
        for name in names {
            if !specs.iter().any(|s| s.name == name.as_str()) {
                return Err(ConfigError::UnknownParam {
                    algorithm: self.name.clone(),
                    param: name.clone(),
                });
            }
        }
        for spec in specs {
            match self.get(spec.name) {
                Some(value) => spec.kind.check(self, spec.name, value)?,
                None if spec.required => {
                    return Err(ConfigError::MissingParam {
                        algorithm: self.name.clone(),
                        param: spec.name.to_string(),
                    });
                }
                None => {}
            }
        }
        for template in &self.readouts {
            template.validate(&self.name)?;
        }
        Ok(())
    }
}

/// Expected shape of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Integer within `[min, max]`.
    Integer {
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// A [`HitType`] name or code.
    HitType,
    /// Comma-separated [`ChannelId`]s (`string-position`).
    Channels,
    /// Comma-separated [`TriggerKey`]s (`type:config:source`).
    TriggerKeys,
}

impl ParamKind {
    /// Non-negative integer.
    pub const NON_NEGATIVE: Self = Self::Integer {
        min: 0,
        max: i64::MAX,
    };
    /// Strictly positive integer.
    pub const POSITIVE: Self = Self::Integer {
        min: 1,
        max: i64::MAX,
    };

    fn check(self, config: &AlgorithmConfig, key: &str, value: &str) -> Result<(), ConfigError> {
        match self {
            Self::Integer { min, max } => {
                let v: i64 = config.parse_value(key, value)?;
                if v < min || v > max {
                    return Err(config.invalid(key, format!("must be within [{min}, {max}]")));
                }
            }
            Self::HitType => {
                config.parse_value::<HitType>(key, value)?;
            }
            Self::Channels => {
                config.get_list::<ChannelId>(key)?;
            }
            Self::TriggerKeys => {
                config.get_list::<TriggerKey>(key)?;
            }
        }
        Ok(())
    }
}

/// Specification for one algorithm parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Whether the parameter must be set.
    pub required: bool,
    /// Default applied when unset, for documentation.
    pub default: Option<&'static str>,
    /// Expected value shape.
    pub kind: ParamKind,
}

impl ParamSpec {
    /// A required parameter.
    #[must_use]
    pub const fn required(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            required: true,
            default: None,
            kind,
        }
    }

    /// An optional parameter with a default.
    #[must_use]
    pub const fn optional(
        name: &'static str,
        description: &'static str,
        default: &'static str,
        kind: ParamKind,
    ) -> Self {
        Self {
            name,
            description,
            required: false,
            default: Some(default),
            kind,
        }
    }

    /// An optional parameter whose absence disables a feature.
    #[must_use]
    pub const fn unset(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            required: false,
            default: None,
            kind,
        }
    }
}
