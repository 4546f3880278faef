//! Scripts that build raw requests for `EXEC`.

use std::collections::BTreeMap;

/// Script errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    UnknownMethod(String),
    /// Wrong number of arguments, carries the usage line
    Usage(&'static str),
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::UnknownMethod(method) => write!(f, "Unknown method: {}", method),
            ScriptError::Usage(usage) => write!(f, "Usage: {}", usage),
        }
    }
}

impl std::error::Error for ScriptError {}

pub trait ExecScript {
    fn name(&self) -> &'static str;

    /// Request bytes for `method` with `args`, addressed to `host`.
    fn build(&self, method: &str, args: &[&str], host: &str) -> Result<Vec<u8>, ScriptError>;
}

/// Minimal HTTP/1.1 requests.
pub struct HttpScript;

impl HttpScript {
    fn request(method: &str, target: &str, host: &str) -> Vec<u8> {
        format!("{} {} HTTP/1.1\r\nHost: {}\r\n\r\n", method, target, host).into_bytes()
    }
}

impl ExecScript for HttpScript {
    fn name(&self) -> &'static str {
        "http"
    }

    fn build(&self, method: &str, args: &[&str], host: &str) -> Result<Vec<u8>, ScriptError> {
        let method = method.to_ascii_uppercase();
        match (method.as_str(), args) {
            ("GET", [path]) | ("HEAD", [path]) => Ok(Self::request(&method, path, host)),
            ("GET", _) => Err(ScriptError::Usage("EXEC http get <path>")),
            ("HEAD", _) => Err(ScriptError::Usage("EXEC http head <path>")),
            ("OPTIONS", []) => Ok(Self::request(&method, "*", host)),
            ("OPTIONS", [path]) => Ok(Self::request(&method, path, host)),
            ("OPTIONS", _) => Err(ScriptError::Usage("EXEC http options [path]")),
            _ => Err(ScriptError::UnknownMethod(method)),
        }
    }
}

/// Scripts by name.
pub struct ScriptRegistry {
    scripts: BTreeMap<&'static str, Box<dyn ExecScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self {
            scripts: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HttpScript));
        registry
    }

    pub fn register(&mut self, script: Box<dyn ExecScript>) {
        self.scripts.insert(script.name(), script);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ExecScript> {
        self.scripts
            .get(name.to_ascii_lowercase().as_str())
            .map(|script| script.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.scripts.keys().copied().collect()
    }
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
