//! Hierarchical key/value configuration.
//!
//! A `Configuration` is a layer of string properties with an optional parent.
//! Lookups fall through to the parent when a key is missing, so a job can
//! fork the process-wide defaults and override a few keys without copying.
//! Values are stored as strings and parsed on read by the typed getters.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix shared by every polyflow key (and by environment overrides).
pub const KEY_PREFIX: &str = "polyflow.";

/// Max number of conversion tasks the negotiator may chain on one edge.
pub const MAX_CONVERSION_HOPS: &str = "polyflow.planner.max-conversion-hops";
/// Max platform executions the job runner drives at the same time.
pub const MAX_PARALLEL: &str = "polyflow.exec.max-parallel";
/// Comma-separated operator kinds that fail before evaluation (chaos hook).
pub const FAILPOINTS: &str = "polyflow.exec.failpoints";
/// Directory that backs file-channel instances.
pub const FILE_CHANNEL_DIR: &str = "polyflow.channels.file.dir";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(skip)]
    parent: Option<Arc<Configuration>>,
    properties: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child layer that falls back to `parent` for missing keys.
    pub fn with_parent(parent: Arc<Configuration>) -> Self {
        Self {
            parent: Some(parent),
            properties: BTreeMap::new(),
        }
    }

    /// Freeze this layer and return a fresh child on top of it.
    pub fn fork(self) -> Self {
        Self::with_parent(Arc::new(self))
    }

    /// Build a layer from environment variables, falling back to nothing.
    ///
    /// `POLYFLOW_EXEC_MAX_PARALLEL=8` becomes `polyflow.exec.max-parallel = 8`:
    /// the first underscore after the prefix separates segments and further
    /// underscores become dashes. Deeper keys use `__` as the segment separator:
    /// `POLYFLOW_LOCAL__CPU__MS_PER_UNIT` is `polyflow.local.cpu.ms-per-unit`.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`Configuration::from_env`] but over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cfg = Self::default();
        for (name, value) in vars {
            if let Some(key) = env_name_to_key(&name) {
                cfg.properties.insert(key, value);
            }
        }
        cfg
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Set a key only if no layer defines it yet (used for platform defaults).
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.get_string_property(&key).is_none() {
            self.properties.insert(key, value.into());
        }
    }

    pub fn get_string_property(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(v) => Some(v.as_str()),
            None => self
                .parent
                .as_deref()
                .and_then(|p| p.get_string_property(key)),
        }
    }

    pub fn get_string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_string_property(key).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.parse_with(key, |s| s.parse::<f64>().ok())
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self.get_f64(key)?.unwrap_or(default))
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.parse_with(key, |s| s.parse::<u64>().ok())
    }

    pub fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        Ok(self.get_u64(key)?.unwrap_or(default))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.parse_with(key, |s| match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        })
    }

    /// Keys visible through all layers, starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .parent
            .as_deref()
            .map(|p| p.keys_with_prefix(prefix))
            .unwrap_or_default();
        keys.extend(
            self.properties
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned(),
        );
        keys.sort();
        keys.dedup();
        keys
    }

    fn parse_with<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
        match self.get_string_property(key) {
            None => Ok(None),
            Some(raw) => parse(raw.trim()).map(Some).ok_or_else(|| {
                Error::Config(format!("key '{key}' has malformed value '{raw}'"))
            }),
        }
    }
}

fn env_name_to_key(name: &str) -> Option<String> {
    let rest = name.strip_prefix("POLYFLOW_")?.to_ascii_lowercase();
    let segments: Vec<String> = if rest.contains("__") {
        rest.split("__").map(|s| s.replace('_', "-")).collect()
    } else {
        // EXEC_MAX_PARALLEL -> exec.max-parallel
        let (head, tail) = rest.split_once('_')?;
        vec![head.to_string(), tail.replace('_', "-")]
    };
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(format!("{}{}", KEY_PREFIX, segments.join(".")))
}
