//! Textual option keys, as typed on a command line.

use std::fmt;
use std::str::FromStr;

use tabcaption_core::{OptionUpdate, OptionValues, Options};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionKeyError {
    #[error("unknown option '{0}'")]
    UnknownKey(String),
    #[error("option '{key}' expects {expected}, got '{value}'")]
    InvalidValue {
        key: OptionKey,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    Enabled,
    Template,
    IgnoreBuiltinProjects,
    IgnoreSingleProject,
    Logging,
    LoggingLevel,
}

impl OptionKey {
    pub const ALL: [OptionKey; 6] = [
        OptionKey::Enabled,
        OptionKey::Template,
        OptionKey::IgnoreBuiltinProjects,
        OptionKey::IgnoreSingleProject,
        OptionKey::Logging,
        OptionKey::LoggingLevel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OptionKey::Enabled => "enabled",
            OptionKey::Template => "template",
            OptionKey::IgnoreBuiltinProjects => "ignore-builtin-projects",
            OptionKey::IgnoreSingleProject => "ignore-single-project",
            OptionKey::Logging => "logging",
            OptionKey::LoggingLevel => "logging-level",
        }
    }

    /// Current value rendered as text.
    pub fn read(&self, values: &OptionValues) -> String {
        match self {
            OptionKey::Enabled => values.enabled.to_string(),
            OptionKey::Template => values.template.clone(),
            OptionKey::IgnoreBuiltinProjects => values.ignore_builtin_projects.to_string(),
            OptionKey::IgnoreSingleProject => values.ignore_single_project.to_string(),
            OptionKey::Logging => values.logging.to_string(),
            OptionKey::LoggingLevel => values.logging_level.to_string(),
        }
    }

    /// Parses `value` into an update for this key.
    pub fn parse_update(&self, value: &str) -> Result<OptionUpdate, OptionKeyError> {
        let update = match self {
            OptionKey::Enabled => OptionUpdate::Enabled(self.parse_bool(value)?),
            OptionKey::Template => OptionUpdate::Template(value.to_string()),
            OptionKey::IgnoreBuiltinProjects => {
                OptionUpdate::IgnoreBuiltinProjects(self.parse_bool(value)?)
            }
            OptionKey::IgnoreSingleProject => {
                OptionUpdate::IgnoreSingleProject(self.parse_bool(value)?)
            }
            OptionKey::Logging => OptionUpdate::Logging(self.parse_bool(value)?),
            OptionKey::LoggingLevel => {
                let level = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| self.invalid("an integer", value))?;
                OptionUpdate::LoggingLevel(level)
            }
        };
        Ok(update)
    }

    fn parse_bool(&self, value: &str) -> Result<bool, OptionKeyError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(true),
            "false" | "off" | "no" | "0" => Ok(false),
            _ => Err(self.invalid("a boolean", value)),
        }
    }

    fn invalid(&self, expected: &'static str, value: &str) -> OptionKeyError {
        OptionKeyError::InvalidValue {
            key: *self,
            expected,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts `logging-level`, `logging_level` and `LoggingLevel` alike.
impl FromStr for OptionKey {
    type Err = OptionKeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let folded: String = key
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        OptionKey::ALL
            .into_iter()
            .find(|candidate| candidate.name().replace('-', "") == folded)
            .ok_or_else(|| OptionKeyError::UnknownKey(key.to_string()))
    }
}

/// Applies `update` with the same normalization [`Options`] performs.
/// Returns whether anything changed.
pub fn apply_update(values: &mut OptionValues, update: OptionUpdate) -> bool {
    let mut options = Options::new(values.clone());
    let changed = options.apply(update);
    *values = options.values().clone();
    changed
}
