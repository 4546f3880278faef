//! Typed shell variables.
//!
//! The shell keeps its network settings in an explicit struct. Values can
//! only be changed through `ShellVars::set`, which checks the key against a
//! closed set and parses the value with that key's type.

use crate::config::ShellSettings;
use crate::shell::client::NetworkOptions;
use std::time::Duration;

/// Value type expected by a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Non-negative decimal number
    Numeric,
    /// Positive integer
    Integer,
    Boolean,
}

/// Every recognised variable with its type.
pub const KEYS: [(&str, VarKind); 5] = [
    ("network.timeout", VarKind::Numeric),
    ("network.buffer_size", VarKind::Integer),
    ("network.blocking", VarKind::Boolean),
    ("network.continuous", VarKind::Boolean),
    ("network.add_carriage_return", VarKind::Boolean),
];

/// Variable assignment errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarError {
    UnknownKey(String),
    InvalidValue {
        key: &'static str,
        kind: VarKind,
        value: String,
    },
}

impl std::fmt::Display for VarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarError::UnknownKey(key) => write!(f, "Unknown variable: {}", key),
            VarError::InvalidValue { key, kind, value } => {
                let expected = match kind {
                    VarKind::Numeric => "a non-negative number",
                    VarKind::Integer => "a positive integer",
                    VarKind::Boolean => "true or false",
                };
                write!(f, "Invalid value {:?} for {}: expected {}", value, key, expected)
            }
        }
    }
}

impl std::error::Error for VarError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellVars {
    /// `None` when disabled
    timeout: Option<Duration>,
    buffer_size: usize,
    blocking: bool,
    continuous: bool,
    add_carriage_return: bool,
}

impl ShellVars {
    /// Initial variables from the shell configuration.
    pub fn from_settings(settings: &ShellSettings) -> Result<Self, VarError> {
        let timeout = parse_timeout(settings.timeout).ok_or_else(|| VarError::InvalidValue {
            key: "network.timeout",
            kind: VarKind::Numeric,
            value: settings.timeout.to_string(),
        })?;
        if settings.buffer_size == 0 {
            return Err(VarError::InvalidValue {
                key: "network.buffer_size",
                kind: VarKind::Integer,
                value: "0".to_string(),
            });
        }

        Ok(Self {
            timeout,
            buffer_size: settings.buffer_size,
            blocking: settings.blocking,
            continuous: settings.continuous,
            add_carriage_return: settings.add_carriage_return,
        })
    }

    /// Assign `value` to `key`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), VarError> {
        let (key, kind) = KEYS
            .iter()
            .copied()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .ok_or_else(|| VarError::UnknownKey(key.to_string()))?;

        let invalid = || VarError::InvalidValue {
            key,
            kind,
            value: value.to_string(),
        };

        match key {
            "network.timeout" => {
                let secs: f64 = value.parse().map_err(|_| invalid())?;
                self.timeout = parse_timeout(secs).ok_or_else(invalid)?;
            }
            "network.buffer_size" => {
                let size: usize = value.parse().map_err(|_| invalid())?;
                if size == 0 {
                    return Err(invalid());
                }
                self.buffer_size = size;
            }
            "network.blocking" => self.blocking = parse_bool(value).ok_or_else(invalid)?,
            "network.continuous" => self.continuous = parse_bool(value).ok_or_else(invalid)?,
            "network.add_carriage_return" => {
                self.add_carriage_return = parse_bool(value).ok_or_else(invalid)?
            }
            _ => return Err(VarError::UnknownKey(key.to_string())),
        }

        Ok(())
    }

    /// Current value of `key`, formatted for display.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "network.timeout" => self
                .timeout
                .map_or(0.0, |timeout| timeout.as_secs_f64())
                .to_string(),
            "network.buffer_size" => self.buffer_size.to_string(),
            "network.blocking" => self.blocking.to_string(),
            "network.continuous" => self.continuous.to_string(),
            "network.add_carriage_return" => self.add_carriage_return.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// All variables in declaration order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .filter_map(|(key, _)| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    pub fn network_options(&self) -> NetworkOptions {
        NetworkOptions {
            timeout: self.timeout,
            buffer_size: self.buffer_size,
            blocking: self.blocking,
            continuous: self.continuous,
            add_carriage_return: self.add_carriage_return,
        }
    }
}

impl Default for ShellVars {
    fn default() -> Self {
        let settings = ShellSettings::default();
        Self {
            timeout: Duration::try_from_secs_f64(settings.timeout).ok(),
            buffer_size: settings.buffer_size,
            blocking: settings.blocking,
            continuous: settings.continuous,
            add_carriage_return: settings.add_carriage_return,
        }
    }
}

/// Seconds to a timeout, `Some(None)` for 0. Rejects values a `Duration`
/// cannot hold.
fn parse_timeout(secs: f64) -> Option<Option<Duration>> {
    if secs == 0.0 {
        return Some(None);
    }
    Duration::try_from_secs_f64(secs).ok().map(Some)
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let vars = ShellVars::default();
        let options = vars.network_options();
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.buffer_size, 1024);
        assert!(options.blocking);
        assert!(!options.continuous);
        assert!(!options.add_carriage_return);
    }

    #[test]
    fn test_set_typed_values() {
        let mut vars = ShellVars::default();
        vars.set("network.timeout", "0.25").unwrap();
        vars.set("network.buffer_size", "64").unwrap();
        vars.set("NETWORK.BLOCKING", "False").unwrap();
        vars.set("network.continuous", "true").unwrap();

        let options = vars.network_options();
        assert_eq!(options.timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.buffer_size, 64);
        assert!(!options.blocking);
        assert!(options.continuous);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let mut vars = ShellVars::default();
        vars.set("network.timeout", "0").unwrap();
        assert_eq!(vars.network_options().timeout, None);
    }

    #[test]
    fn test_unknown_key() {
        let mut vars = ShellVars::default();
        assert_eq!(
            vars.set("network.colour", "blue"),
            Err(VarError::UnknownKey("network.colour".to_string()))
        );
    }

    #[test]
    fn test_invalid_values_leave_state_alone() {
        let mut vars = ShellVars::default();
        let before = vars.clone();

        for (key, value) in [
            ("network.timeout", "soon"),
            ("network.timeout", "-1"),
            ("network.buffer_size", "0"),
            ("network.buffer_size", "1.5"),
            ("network.blocking", "yes"),
        ] {
            match vars.set(key, value) {
                Err(VarError::InvalidValue { key: k, .. }) => assert_eq!(k, key),
                other => panic!("unexpected: {:?}", other),
            }
        }
        assert_eq!(vars, before);
    }

    #[test]
    fn test_timeout_beyond_duration_range() {
        let mut vars = ShellVars::default();
        for value in ["1e20", "inf", "NaN"] {
            match vars.set("network.timeout", value) {
                Err(VarError::InvalidValue { key, .. }) => assert_eq!(key, "network.timeout"),
                other => panic!("{} accepted: {:?}", value, other),
            }
        }
        assert_eq!(vars.network_options().timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_from_settings_validates() {
        let huge = ShellSettings {
            timeout: 1e20,
            ..ShellSettings::default()
        };
        assert!(matches!(
            ShellVars::from_settings(&huge),
            Err(VarError::InvalidValue { key: "network.timeout", .. })
        ));

        let empty_buffer = ShellSettings {
            buffer_size: 0,
            ..ShellSettings::default()
        };
        assert!(matches!(
            ShellVars::from_settings(&empty_buffer),
            Err(VarError::InvalidValue { key: "network.buffer_size", .. })
        ));

        let disabled = ShellSettings {
            timeout: 0.0,
            ..ShellSettings::default()
        };
        let vars = ShellVars::from_settings(&disabled).unwrap();
        assert_eq!(vars.network_options().timeout, None);
        assert_eq!(vars.get("network.timeout").unwrap(), "0");
    }

    #[test]
    fn test_entries() {
        let vars = ShellVars::default();
        let entries = vars.entries();
        assert_eq!(entries.len(), KEYS.len());
        assert_eq!(entries[0], ("network.timeout", "5".to_string()));
        assert_eq!(entries[2], ("network.blocking", "true".to_string()));
    }
}
