//! Typed configuration with one notification per effective change.
//! 具型別的設定；只有在值真正改變時才發出通知。

use serde::{Deserialize, Serialize};

use crate::events::{Subscribers, Subscription};
use crate::logging::LogLevel;

/// Default values for every option.
pub mod defaults {
    pub const ENABLED: bool = true;
    pub const TEMPLATE: &str = "$(ProjectName ':')$(FolderPath)$(Filename)";
    pub const IGNORE_BUILTIN_PROJECTS: bool = true;
    pub const IGNORE_SINGLE_PROJECT: bool = true;
    pub const LOGGING: bool = false;
    pub const LOGGING_LEVEL: u8 = 2;
}

/// Plain option values, as persisted by the settings layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValues {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_ignore_builtin_projects")]
    pub ignore_builtin_projects: bool,
    #[serde(default = "default_ignore_single_project")]
    pub ignore_single_project: bool,
    #[serde(default)]
    pub logging: bool,
    #[serde(
        default = "default_logging_level",
        deserialize_with = "deserialize_logging_level"
    )]
    pub logging_level: u8,
}

fn default_enabled() -> bool {
    defaults::ENABLED
}

fn default_template() -> String {
    defaults::TEMPLATE.to_string()
}

fn default_ignore_builtin_projects() -> bool {
    defaults::IGNORE_BUILTIN_PROJECTS
}

fn default_ignore_single_project() -> bool {
    defaults::IGNORE_SINGLE_PROJECT
}

fn default_logging_level() -> u8 {
    defaults::LOGGING_LEVEL
}

/// Out-of-range stored levels load clamped instead of failing the whole file.
fn deserialize_logging_level<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    i64::deserialize(deserializer).map(clamp_level)
}

impl Default for OptionValues {
    fn default() -> Self {
        Self {
            enabled: defaults::ENABLED,
            template: default_template(),
            ignore_builtin_projects: defaults::IGNORE_BUILTIN_PROJECTS,
            ignore_single_project: defaults::IGNORE_SINGLE_PROJECT,
            logging: defaults::LOGGING,
            logging_level: defaults::LOGGING_LEVEL,
        }
    }
}

impl OptionValues {
    /// Applies the same normalization the setters do.
    pub fn sanitize(&mut self) {
        if self.template.is_empty() {
            self.template = default_template();
        }
        self.logging_level = clamp_level(i64::from(self.logging_level));
    }
}

/// Normalizes an empty template to the default.
pub fn normalize_template(template: &str) -> &str {
    if template.is_empty() {
        defaults::TEMPLATE
    } else {
        template
    }
}

fn clamp_level(level: i64) -> u8 {
    level.clamp(0, i64::from(LogLevel::MAX)) as u8
}

/// Which option changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionChange {
    Enabled,
    Template,
    IgnoreBuiltinProjects,
    IgnoreSingleProject,
    Logging,
    LoggingLevel,
}

/// A new value for one option; what hosts send across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionUpdate {
    Enabled(bool),
    Template(String),
    IgnoreBuiltinProjects(bool),
    IgnoreSingleProject(bool),
    Logging(bool),
    LoggingLevel(i64),
}

/// Current options plus their change subscribers.
pub struct Options {
    values: OptionValues,
    subscribers: Subscribers<OptionChange>,
}

impl Default for Options {
    fn default() -> Self {
        Self::new(OptionValues::default())
    }
}

impl Options {
    pub fn new(mut values: OptionValues) -> Self {
        values.sanitize();
        Self {
            values,
            subscribers: Subscribers::new(),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&OptionChange) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn values(&self) -> &OptionValues {
        &self.values
    }

    pub fn enabled(&self) -> bool {
        self.values.enabled
    }

    pub fn template(&self) -> &str {
        &self.values.template
    }

    pub fn ignore_builtin_projects(&self) -> bool {
        self.values.ignore_builtin_projects
    }

    pub fn ignore_single_project(&self) -> bool {
        self.values.ignore_single_project
    }

    pub fn logging(&self) -> bool {
        self.values.logging
    }

    pub fn logging_level(&self) -> u8 {
        self.values.logging_level
    }

    /// Returns whether the value changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.values.enabled == enabled {
            return false;
        }
        self.values.enabled = enabled;
        self.notify(OptionChange::Enabled)
    }

    /// An empty template means the default one.
    pub fn set_template(&mut self, template: impl AsRef<str>) -> bool {
        let template = normalize_template(template.as_ref());
        if self.values.template == template {
            return false;
        }
        self.values.template = template.to_string();
        self.notify(OptionChange::Template)
    }

    pub fn set_ignore_builtin_projects(&mut self, ignore: bool) -> bool {
        if self.values.ignore_builtin_projects == ignore {
            return false;
        }
        self.values.ignore_builtin_projects = ignore;
        self.notify(OptionChange::IgnoreBuiltinProjects)
    }

    pub fn set_ignore_single_project(&mut self, ignore: bool) -> bool {
        if self.values.ignore_single_project == ignore {
            return false;
        }
        self.values.ignore_single_project = ignore;
        self.notify(OptionChange::IgnoreSingleProject)
    }

    pub fn set_logging(&mut self, logging: bool) -> bool {
        if self.values.logging == logging {
            return false;
        }
        self.values.logging = logging;
        self.notify(OptionChange::Logging)
    }

    /// Out-of-range levels are clamped to `[0, 4]`.
    pub fn set_logging_level(&mut self, level: i64) -> bool {
        let level = clamp_level(level);
        if self.values.logging_level == level {
            return false;
        }
        self.values.logging_level = level;
        self.notify(OptionChange::LoggingLevel)
    }

    pub fn apply(&mut self, update: OptionUpdate) -> bool {
        match update {
            OptionUpdate::Enabled(value) => self.set_enabled(value),
            OptionUpdate::Template(value) => self.set_template(value),
            OptionUpdate::IgnoreBuiltinProjects(value) => self.set_ignore_builtin_projects(value),
            OptionUpdate::IgnoreSingleProject(value) => self.set_ignore_single_project(value),
            OptionUpdate::Logging(value) => self.set_logging(value),
            OptionUpdate::LoggingLevel(value) => self.set_logging_level(value),
        }
    }

    /// Replaces every value, notifying once per field that changed.
    pub fn assign(&mut self, values: OptionValues) {
        self.set_template(&values.template);
        self.set_ignore_builtin_projects(values.ignore_builtin_projects);
        self.set_ignore_single_project(values.ignore_single_project);
        self.set_logging(values.logging);
        self.set_logging_level(i64::from(values.logging_level));
        self.set_enabled(values.enabled);
    }

    fn notify(&self, change: OptionChange) -> bool {
        self.subscribers.emit(&change);
        true
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("values", &self.values)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorded(options: &Options) -> (Arc<Mutex<Vec<OptionChange>>>, Subscription) {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let handle = options.subscribe(move |change| sink.lock().push(*change));
        (changes, handle)
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = Options::default();
        assert!(options.enabled());
        assert_eq!(
            options.template(),
            "$(ProjectName ':')$(FolderPath)$(Filename)"
        );
        assert!(options.ignore_builtin_projects());
        assert!(options.ignore_single_project());
        assert!(!options.logging());
        assert_eq!(options.logging_level(), 2);
    }

    #[test]
    fn reassigning_same_value_emits_nothing() {
        let mut options = Options::default();
        let (changes, _handle) = recorded(&options);

        assert!(!options.set_enabled(true));
        assert!(!options.set_logging_level(2));
        assert!(options.set_enabled(false));
        assert!(!options.set_enabled(false));

        assert_eq!(*changes.lock(), vec![OptionChange::Enabled]);
    }

    #[test]
    fn empty_template_normalizes_to_default() {
        let mut options = Options::default();
        let (changes, _handle) = recorded(&options);

        assert!(!options.set_template(""));
        assert!(options.set_template("$(Filename)"));
        assert!(options.set_template(""));
        assert_eq!(options.template(), defaults::TEMPLATE);
        assert_eq!(
            *changes.lock(),
            vec![OptionChange::Template, OptionChange::Template]
        );
    }

    #[test]
    fn logging_level_is_clamped() {
        let mut options = Options::default();
        assert!(options.set_logging_level(42));
        assert_eq!(options.logging_level(), 4);
        assert!(!options.set_logging_level(4));
        assert!(options.set_logging_level(-3));
        assert_eq!(options.logging_level(), 0);
    }

    #[test]
    fn assign_notifies_only_changed_fields() {
        let mut options = Options::default();
        let (changes, _handle) = recorded(&options);

        let mut values = options.values().clone();
        values.ignore_single_project = false;
        values.logging = true;
        options.assign(values);

        assert_eq!(
            *changes.lock(),
            vec![OptionChange::IgnoreSingleProject, OptionChange::Logging]
        );
    }

    #[test]
    fn values_deserialize_with_defaults_and_sanitize() {
        let mut values: OptionValues =
            serde_json::from_str(r#"{ "template": "", "logging_level": 9 }"#).unwrap();
        values.sanitize();
        assert!(values.enabled);
        assert_eq!(values.template, defaults::TEMPLATE);
        assert_eq!(values.logging_level, 4);
    }

    #[test]
    fn out_of_range_levels_load_clamped() {
        let low: OptionValues = serde_json::from_str(r#"{ "logging_level": -1 }"#).unwrap();
        assert_eq!(low.logging_level, 0);
        let high: OptionValues = serde_json::from_str(r#"{ "logging_level": 300 }"#).unwrap();
        assert_eq!(high.logging_level, 4);
        assert!(serde_json::from_str::<OptionValues>(r#"{ "logging_level": "loud" }"#).is_err());
    }
}
