//! Kind registries for models and clocks.
//!
//! Each registry maps a kind name to a constructor and is populated once,
//! on first use.

use crate::error::{ResolveError, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;

/// Substitution model kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Mk,
    BinaryCtmc,
    Covarion,
    Bsvs,
    Dollo,
}

/// Clock kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    Strict,
    Relaxed,
    RandomLocal,
}

impl ClockKind {
    /// Random local clocks need the full tree on every feature
    #[must_use]
    pub fn supports_pruning(self) -> bool {
        !matches!(self, Self::RandomLocal)
    }
}

pub type Constructor<T> = fn() -> T;

/// Kind name -> constructor table. Lookup is case-insensitive.
pub struct Registry<T> {
    what: &'static str,
    entries: BTreeMap<String, Constructor<T>>,
}

impl<T> Registry<T> {
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            entries: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: &str, constructor: Constructor<T>) -> &mut Self {
        self.entries.insert(kind.to_ascii_lowercase(), constructor);
        self
    }

    pub fn build(&self, kind: &str) -> Result<T> {
        let key = kind.trim().to_ascii_lowercase();
        self.entries.get(&key).map(|ctor| ctor()).ok_or_else(|| {
            ResolveError::config(format!(
                "Unknown {} kind '{}' (expected one of: {})",
                self.what,
                kind,
                self.kinds().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Registry<ModelKind> {
    pub fn with_builtin_models() -> Self {
        let mut registry = Self::new("model");
        registry
            .register("mk", || ModelKind::Mk)
            .register("binaryctmc", || ModelKind::BinaryCtmc)
            .register("covarion", || ModelKind::Covarion)
            .register("bsvs", || ModelKind::Bsvs)
            .register("dollo", || ModelKind::Dollo);
        registry
    }
}

impl Registry<ClockKind> {
    pub fn with_builtin_clocks() -> Self {
        let mut registry = Self::new("clock");
        registry
            .register("strict", || ClockKind::Strict)
            .register("relaxed", || ClockKind::Relaxed)
            .register("random", || ClockKind::RandomLocal);
        registry
    }
}

pub static MODEL_KINDS: Lazy<Registry<ModelKind>> =
    Lazy::new(Registry::<ModelKind>::with_builtin_models);

pub static CLOCK_KINDS: Lazy<Registry<ClockKind>> =
    Lazy::new(Registry::<ClockKind>::with_builtin_clocks);
