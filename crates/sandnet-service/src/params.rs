//! Two-tier parameter storage: global defaults plus per-entity overrides.
//!
//! An entity is subscribed as soon as it has an entry in the per-entity
//! table, even an empty one. Lookups consult the entity's overrides first
//! and fall back to the global defaults.

use std::collections::BTreeMap;
use std::fmt;

use sandnet_common::error::{Result, SandnetError};
use sandnet_core::filesystem::mount::MountPoint;
use serde::{Deserialize, Serialize};

/// Well-known parameter keys shared by every service.
pub mod keys {
    /// Command line that starts the service.
    pub const START_CMD: &str = "startCmd";
    /// Command line that stops the service.
    pub const STOP_CMD: &str = "stopCmd";
    /// Start the service automatically when the network comes up.
    pub const AUTO_START: &str = "autoStart";
    /// Stop the service automatically when the network goes down.
    pub const AUTO_STOP: &str = "autoStop";
    /// Turn a failed start into an error instead of a reported status.
    pub const EXCEPTION_ON_START_FAIL: &str = "exceptionOnStartFail";
    /// Replaces every default mount of the service for one node.
    pub const MOUNTS: &str = "mounts";

    /// Keys every service accepts.
    pub const STANDARD: [&str; 6] = [
        START_CMD,
        STOP_CMD,
        AUTO_START,
        AUTO_STOP,
        EXCEPTION_ON_START_FAIL,
        MOUNTS,
    ];
}

/// A parameter value.
///
/// [`ParamValue::Unset`] is a value in its own right: a key explicitly
/// configured as unset is distinct from a key that is not configured at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean flag.
    Bool(bool),
    /// A string, e.g. a command line or a path.
    Text(String),
    /// A list of mount points.
    Mounts(Vec<MountPoint>),
    /// A single mount point.
    Mount(MountPoint),
    /// Explicitly configured as having no value.
    Unset,
}

impl ParamValue {
    /// The string inside a [`ParamValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is `Bool(true)`.
    #[must_use]
    pub const fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// Short name of the variant, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Text(_) => "string",
            Self::Mounts(_) => "mount list",
            Self::Mount(_) => "mount",
            Self::Unset => "unset",
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<MountPoint> for ParamValue {
    fn from(m: MountPoint) -> Self {
        Self::Mount(m)
    }
}

impl From<Vec<MountPoint>> for ParamValue {
    fn from(m: Vec<MountPoint>) -> Self {
        Self::Mounts(m)
    }
}

/// A flat set of parameters.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Builds a [`ParamMap`] from `(key, value)` pairs.
pub fn param_map<K, V, I>(pairs: I) -> ParamMap
where
    K: Into<String>,
    V: Into<ParamValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Global parameters plus per-entity overrides.
#[derive(Debug, Clone)]
pub struct ParameterStore<E> {
    global: ParamMap,
    entities: BTreeMap<E, ParamMap>,
}

impl<E> Default for ParameterStore<E> {
    fn default() -> Self {
        Self {
            global: ParamMap::new(),
            entities: BTreeMap::new(),
        }
    }
}

impl<E: Ord + Clone + fmt::Display> ParameterStore<E> {
    /// Seeds the global parameters with `defaults`, then merges
    /// `overrides` over them.
    #[must_use]
    pub fn with_defaults(defaults: ParamMap, overrides: ParamMap) -> Self {
        let mut store = Self::default();
        store.set_defaults(defaults);
        store.update_globals(overrides);
        store
    }

    /// Seeds the global parameters; existing keys are replaced.
    pub fn set_defaults(&mut self, defaults: ParamMap) {
        self.global.extend(defaults);
    }

    /// Merges `params` into the global parameters, `params` winning.
    pub fn update_globals(&mut self, params: ParamMap) {
        self.global.extend(params);
    }

    /// The global parameters.
    #[must_use]
    pub const fn globals(&self) -> &ParamMap {
        &self.global
    }

    /// Subscribes `entity`.
    ///
    /// Stores a copy of the global parameters (when `include_defaults`)
    /// merged with `overrides`.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Conflict`] if `entity` is already
    /// subscribed; its stored parameters are left untouched.
    pub fn subscribe(&mut self, entity: E, overrides: ParamMap, include_defaults: bool) -> Result<()> {
        if self.entities.contains_key(&entity) {
            return Err(SandnetError::Conflict {
                message: format!(
                    "{entity} already has parameters; update them explicitly instead of subscribing again"
                ),
            });
        }
        let mut params = if include_defaults {
            self.global.clone()
        } else {
            ParamMap::new()
        };
        params.extend(overrides);
        let _ = self.entities.insert(entity, params);
        Ok(())
    }

    /// Merges `params` into the overrides of an existing subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::NotFound`] if `entity` is not subscribed.
    pub fn update_entity(&mut self, entity: &E, params: ParamMap) -> Result<()> {
        let stored = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| SandnetError::NotFound {
                kind: "subscription",
                id: entity.to_string(),
            })?;
        stored.extend(params);
        Ok(())
    }

    /// Whether `entity` has an entry, even an empty one.
    #[must_use]
    pub fn is_subscribed(&self, entity: &E) -> bool {
        self.entities.contains_key(entity)
    }

    /// The overrides stored for `entity`.
    #[must_use]
    pub fn entity_params(&self, entity: &E) -> Option<&ParamMap> {
        self.entities.get(entity)
    }

    /// Subscribed entities, in order.
    pub fn entities(&self) -> impl Iterator<Item = &E> {
        self.entities.keys()
    }

    /// Whether `key` is defined for `entity` or globally.
    #[must_use]
    pub fn contains(&self, entity: &E, key: &str) -> bool {
        self.lookup(entity, key).is_some()
    }

    /// Looks up `key` for `entity`, overrides first.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::KeyNotFound`] if the key is defined nowhere.
    pub fn get(&self, entity: &E, key: &str) -> Result<&ParamValue> {
        self.lookup(entity, key)
            .ok_or_else(|| SandnetError::KeyNotFound {
                entity: entity.to_string(),
                key: key.to_owned(),
            })
    }

    /// Looks up `key` for `entity`, returning `default` if undefined.
    #[must_use]
    pub fn get_or<'a>(&'a self, entity: &E, key: &str, default: &'a ParamValue) -> &'a ParamValue {
        self.lookup(entity, key).unwrap_or(default)
    }

    /// Whether `key` is `Bool(true)` for `entity`.
    #[must_use]
    pub fn flag(&self, entity: &E, key: &str) -> bool {
        self.lookup(entity, key).is_some_and(ParamValue::is_true)
    }

    /// Global parameters with `entity`'s overrides applied.
    #[must_use]
    pub fn resolved(&self, entity: &E) -> ParamMap {
        let mut params = self.global.clone();
        if let Some(own) = self.entities.get(entity) {
            params.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        params
    }

    fn lookup(&self, entity: &E, key: &str) -> Option<&ParamValue> {
        self.entities
            .get(entity)
            .and_then(|own| own.get(key))
            .or_else(|| self.global.get(key))
    }
}
