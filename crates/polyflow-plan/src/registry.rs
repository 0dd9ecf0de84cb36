//! Platform registry: identity string -> lazily constructed singleton.
//!
//! Each platform registers a constructor under its identity. `load`
//! constructs it at most once per registry and hands out shared handles.
//! There is no lookup outside the registry; callers pass it explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use polyflow_core::config::Configuration;
use polyflow_cost::parse_specification;

use crate::error::{PlanError, PlatformLoadError};
use crate::platform::Platform;

type Constructor = Box<dyn Fn() -> Result<Arc<dyn Platform>, String> + Send + Sync>;

struct Entry {
    constructor: Constructor,
    instance: OnceCell<Arc<dyn Platform>>,
}

#[derive(Default)]
pub struct PlatformRegistry {
    entries: BTreeMap<String, Entry>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `identity`, replacing any earlier entry.
    pub fn register<F>(&mut self, identity: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Arc<dyn Platform>, String> + Send + Sync + 'static,
    {
        let identity = identity.into();
        debug!(platform = %identity, "registering platform");
        self.entries.insert(
            identity,
            Entry {
                constructor: Box::new(constructor),
                instance: OnceCell::new(),
            },
        );
    }

    /// The singleton for `identity`, constructing it on first use.
    pub fn load(&self, identity: &str) -> Result<Arc<dyn Platform>, PlatformLoadError> {
        let entry = self.entries.get(identity).ok_or_else(|| PlatformLoadError {
            identity: identity.to_string(),
            reason: "no platform registered under this identity".into(),
        })?;
        let platform = entry.instance.get_or_try_init(|| {
            let platform = (entry.constructor)().map_err(|reason| PlatformLoadError {
                identity: identity.to_string(),
                reason,
            })?;
            if platform.name() != identity {
                return Err(PlatformLoadError {
                    identity: identity.to_string(),
                    reason: format!("constructor produced platform '{}'", platform.name()),
                });
            }
            debug!(platform = %identity, "platform loaded");
            Ok(platform)
        })?;
        Ok(Arc::clone(platform))
    }

    pub fn identities(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Platforms constructed so far.
    pub fn loaded(&self) -> Vec<Arc<dyn Platform>> {
        self.entries
            .values()
            .filter_map(|e| e.instance.get().cloned())
            .collect()
    }

    /// Load every registered platform; the first failure aborts.
    pub fn load_all(&self) -> Result<Vec<Arc<dyn Platform>>, PlatformLoadError> {
        self.entries.keys().map(|id| self.load(id)).collect()
    }

    /// Overlay the defaults of every loaded platform onto `cfg`.
    pub fn apply_defaults(&self, cfg: &mut Configuration) {
        for platform in self.loaded() {
            platform.configure_defaults(cfg);
        }
    }

    /// Warm up loaded platforms. Failures are logged and otherwise ignored.
    pub fn warm_up_all(&self, cfg: &Configuration) {
        for platform in self.loaded() {
            if let Err(e) = platform.warm_up(cfg) {
                warn!(platform = %platform.name(), error = %e, "platform warm-up failed");
            }
        }
    }

    /// Parse every load specification and build every time converter of the
    /// loaded platforms, so that bad cost configuration fails before planning.
    pub fn validate_cost_configuration(&self, cfg: &Configuration) -> Result<(), PlanError> {
        for platform in self.loaded() {
            let prefix = format!("polyflow.{}.", platform.name());
            for key in cfg.keys_with_prefix(&prefix) {
                if !key.ends_with(".load") {
                    continue;
                }
                if let Some(spec) = cfg.get_string_property(&key) {
                    parse_specification(spec)?;
                }
            }
            platform.create_load_profile_to_time_converter(cfg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("identities", &self.identities())
            .finish()
    }
}
