//! The command registry: extension → command template + timeout.
//!
//! A [`CommandRegistry`] is immutable once built. Callers can own one and hand
//! it to a [`crate::Converter`], or use the process-wide registry through
//! [`load`] and [`current`].
//!
//! The process-wide registry is an `Arc` behind a `RwLock`. Readers clone the
//! `Arc` and release the lock immediately; [`load`] builds the new registry
//! first and then swaps the pointer. A conversion that started before a
//! reload keeps using the snapshot it took.

use crate::config::{CommandsConfig, MERGE_KEY};
use crate::error::ConvertError;
use crate::template::CommandTemplate;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

static GLOBAL: Lazy<RwLock<Arc<CommandRegistry>>> =
    Lazy::new(|| RwLock::new(Arc::new(CommandRegistry::default())));

/// A resolved command: parsed template and its timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    /// Normalised key the entry was registered under.
    pub key: String,
    pub template: CommandTemplate,
    pub timeout_secs: u64,
}

/// Immutable mapping from extension to [`CommandEntry`].
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    entries: HashMap<String, Arc<CommandEntry>>,
}

impl CommandRegistry {
    /// Build a registry, validating every template.
    ///
    /// Each alias is registered as its own key sharing the entry's template.
    /// A key claimed twice (directly or through an alias) is an error.
    pub fn from_config(config: &CommandsConfig) -> Result<Self, ConvertError> {
        let mut entries: HashMap<String, Arc<CommandEntry>> = HashMap::new();

        for (name, spec) in &config.commands {
            let key = normalize_extension(name);
            if key.is_empty() {
                return Err(ConvertError::InvalidConfig(format!(
                    "command key '{name}' is empty"
                )));
            }

            let template = CommandTemplate::parse(&spec.template)?;
            if key == MERGE_KEY {
                template.validate_for_merge()?;
                if !spec.aliases.is_empty() {
                    return Err(ConvertError::InvalidConfig(
                        "the merge command cannot have aliases".into(),
                    ));
                }
            } else {
                template.validate_for_conversion()?;
            }

            let entry = Arc::new(CommandEntry {
                key: key.clone(),
                template,
                timeout_secs: spec.timeout,
            });

            let aliases = spec.aliases.iter().map(|a| normalize_extension(a));
            for k in std::iter::once(key.clone()).chain(aliases) {
                if k == MERGE_KEY && entry.key != MERGE_KEY {
                    return Err(ConvertError::InvalidConfig(format!(
                        "'{MERGE_KEY}' is reserved for the merge command"
                    )));
                }
                if entries.insert(k.clone(), Arc::clone(&entry)).is_some() {
                    return Err(ConvertError::InvalidConfig(format!(
                        "extension '{k}' is configured more than once"
                    )));
                }
            }
        }

        Ok(Self { entries })
    }

    /// Look up the conversion command for `extension`.
    ///
    /// Case-insensitive; a leading dot is ignored. The merge key never
    /// resolves here.
    pub fn resolve(&self, extension: &str) -> Option<&CommandEntry> {
        let key = normalize_extension(extension);
        if key == MERGE_KEY {
            return None;
        }
        self.entries.get(&key).map(Arc::as_ref)
    }

    /// The merge command, if configured.
    pub fn merge_entry(&self) -> Option<&CommandEntry> {
        self.entries.get(MERGE_KEY).map(Arc::as_ref)
    }

    /// Supported conversion extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .entries
            .keys()
            .map(String::as_str)
            .filter(|k| *k != MERGE_KEY)
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lower-case and strip leading dots: `".DOCX"` → `"docx"`.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Replace the process-wide registry.
///
/// The new registry is fully built and validated before the swap; on error
/// the previous registry stays in place.
pub fn load(config: &CommandsConfig) -> Result<(), ConvertError> {
    let registry = Arc::new(CommandRegistry::from_config(config)?);
    debug!("Loaded command registry: {:?}", registry.extensions());
    info!(
        "Command registry loaded: {} conversion key(s), merge {}",
        registry.extensions().len(),
        if registry.merge_entry().is_some() {
            "configured"
        } else {
            "not configured"
        }
    );

    let mut slot = GLOBAL.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = registry;
    Ok(())
}

/// Snapshot of the process-wide registry. Empty until [`load`] is called.
pub fn current() -> Arc<CommandRegistry> {
    let slot = GLOBAL.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(&*slot)
}
