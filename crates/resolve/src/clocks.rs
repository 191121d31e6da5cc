use crate::config::{ClockConfig, ModelConfig};
use crate::error::{ResolveError, Result};
use crate::notes::Notes;
use crate::registry::{ClockKind, ModelKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Name of the clock shared by models without an explicit or same-named clock
pub const DEFAULT_CLOCK: &str = "default";

/// Rate used when a clock's mean rate is fixed without a user value
const UNIT_RATE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedClock {
    pub name: String,
    pub kind: ClockKind,

    /// Whether the mean rate is free to be estimated
    pub estimate_rate: bool,

    /// Fixed rate, or the starting value when estimated
    pub rate: f64,

    /// Models bound to this clock, in configuration order
    pub models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModel {
    pub name: String,
    pub kind: ModelKind,
    pub clock: String,
    pub pruned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClockLinkage {
    pub clocks: Vec<ResolvedClock>,
    pub models: Vec<ResolvedModel>,
}

impl ClockLinkage {
    pub fn clock(&self, name: &str) -> Option<&ResolvedClock> {
        self.clocks.iter().find(|c| c.name == name)
    }

    pub fn model(&self, name: &str) -> Option<&ResolvedModel> {
        self.models.iter().find(|m| m.name == name)
    }
}

/// Binds every model to one clock and decides which rates are estimated
pub struct ClockLinkageResolver<'a> {
    models: &'a [ModelConfig],
    clocks: &'a [ClockConfig],
}

impl<'a> ClockLinkageResolver<'a> {
    pub fn new(models: &'a [ModelConfig], clocks: &'a [ClockConfig]) -> Self {
        Self { models, clocks }
    }

    /// `has_time_unit` is true when calibrations or fixed branch lengths
    /// give the tree an absolute time scale.
    pub fn resolve(&self, has_time_unit: bool, notes: &mut Notes) -> Result<ClockLinkage> {
        let mut clocks: Vec<ClockConfig> = Vec::with_capacity(self.clocks.len() + 1);
        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (idx, clock) in self.clocks.iter().enumerate() {
            if by_name.insert(clock.name.as_str(), idx).is_some() {
                return Err(ResolveError::config(format!(
                    "Clock '{}' is declared more than once",
                    clock.name
                )));
            }
            clocks.push(clock.clone());
        }

        let mut bindings: Vec<usize> = Vec::with_capacity(self.models.len());
        let mut default_clock: Option<usize> = by_name.get(DEFAULT_CLOCK).copied();
        for model in self.models {
            let idx = match (&model.clock, by_name.get(model.name.as_str())) {
                (Some(name), _) => *by_name.get(name.as_str()).ok_or_else(|| {
                    ResolveError::config(format!(
                        "Model '{}' refers to unknown clock '{name}'",
                        model.name
                    ))
                })?,
                (None, Some(&idx)) => idx,
                (None, None) => *default_clock.get_or_insert_with(|| {
                    log::debug!("Creating the default strict clock");
                    clocks.push(ClockConfig::new(DEFAULT_CLOCK, ClockKind::Strict));
                    clocks.len() - 1
                }),
            };
            bindings.push(idx);
        }

        let models: Vec<ResolvedModel> = self
            .models
            .iter()
            .zip(&bindings)
            .map(|(model, &idx)| {
                let clock = &clocks[idx];
                let mut pruned = model.pruned;
                if pruned && !clock.kind.supports_pruning() {
                    notes.info(format!(
                        "Disabling pruning for model '{}': it is not compatible with \
                         the random local clock '{}'",
                        model.name, clock.name
                    ));
                    pruned = false;
                }
                ResolvedModel {
                    name: model.name.clone(),
                    kind: model.kind,
                    clock: clock.name.clone(),
                    pruned,
                }
            })
            .collect();

        let used: BTreeSet<usize> = bindings.iter().copied().collect();
        let unused: Vec<&str> = clocks
            .iter()
            .enumerate()
            .filter(|(idx, _)| !used.contains(idx))
            .map(|(_, clock)| clock.name.as_str())
            .collect();
        if !unused.is_empty() {
            notes.info(format!(
                "Dropping clock(s) not used by any model: {}",
                unused.join(", ")
            ));
        }

        let mut resolved: Vec<ResolvedClock> = clocks
            .iter()
            .enumerate()
            .filter(|(idx, _)| used.contains(idx))
            .map(|(idx, clock)| ResolvedClock {
                name: clock.name.clone(),
                kind: clock.kind,
                estimate_rate: clock.estimate_rate.unwrap_or(true),
                rate: clock.rate.unwrap_or(UNIT_RATE),
                models: models
                    .iter()
                    .zip(&bindings)
                    .filter(|(_, bound)| **bound == idx)
                    .map(|(model, _)| model.name.clone())
                    .collect(),
            })
            .collect();

        if !has_time_unit {
            let free = resolved.iter_mut().find(|r| {
                clocks
                    .iter()
                    .any(|c| c.name == r.name && c.estimate_rate.is_none())
            });
            if let Some(clock) = free {
                clock.estimate_rate = false;
                notes.info(format!(
                    "Fixing the mean rate of clock '{}' at {}: nothing else sets the time scale",
                    clock.name, clock.rate
                ));
            }
        }

        for clock in &resolved {
            log::debug!(
                "Clock '{}' ({:?}, {} rate {}) drives: {}",
                clock.name,
                clock.kind,
                if clock.estimate_rate { "estimated" } else { "fixed" },
                clock.rate,
                clock.models.join(", ")
            );
        }

        Ok(ClockLinkage {
            clocks: resolved,
            models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model(name: &str, clock: Option<&str>) -> ModelConfig {
        ModelConfig {
            clock: clock.map(str::to_string),
            ..ModelConfig::new(name, ModelKind::Mk)
        }
    }

    #[test]
    fn binding_order_is_explicit_then_by_name_then_default() {
        let models = vec![
            model("lexicon", Some("slow")),
            model("phonology", None),
            model("grammar", None),
            model("morphology", None),
        ];
        let clocks = vec![
            ClockConfig::new("slow", ClockKind::Relaxed),
            ClockConfig::new("phonology", ClockKind::Strict),
        ];
        let linkage = ClockLinkageResolver::new(&models, &clocks)
            .resolve(true, &mut Notes::new())
            .unwrap();

        let bound: Vec<(&str, &str)> = linkage
            .models
            .iter()
            .map(|m| (m.name.as_str(), m.clock.as_str()))
            .collect();
        assert_eq!(
            bound,
            vec![
                ("lexicon", "slow"),
                ("phonology", "phonology"),
                ("grammar", "default"),
                ("morphology", "default"),
            ]
        );
        assert_eq!(
            linkage.clock("default").unwrap().models,
            vec!["grammar", "morphology"]
        );
        assert_eq!(linkage.clocks.len(), 3);
    }

    #[test]
    fn unknown_clock_is_config_error() {
        let models = vec![model("lexicon", Some("missing"))];
        let err = ClockLinkageResolver::new(&models, &[])
            .resolve(true, &mut Notes::new())
            .unwrap_err();
        assert!(matches!(err, ResolveError::ConfigError(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn unused_clocks_are_dropped_with_a_note() {
        let models = vec![model("lexicon", None)];
        let clocks = vec![ClockConfig::new("spare", ClockKind::Strict)];
        let mut notes = Notes::new();
        let linkage = ClockLinkageResolver::new(&models, &clocks)
            .resolve(true, &mut notes)
            .unwrap();
        assert_eq!(linkage.clocks.len(), 1);
        assert_eq!(linkage.clocks[0].name, DEFAULT_CLOCK);
        assert!(notes.mentions("not used by any model: spare"));
    }

    #[test]
    fn random_local_clock_disables_pruning() {
        let mut pruned = model("lexicon", Some("rlc"));
        pruned.pruned = true;
        let models = vec![pruned];
        let clocks = vec![ClockConfig::new("rlc", ClockKind::RandomLocal)];
        let mut notes = Notes::new();
        let linkage = ClockLinkageResolver::new(&models, &clocks)
            .resolve(true, &mut notes)
            .unwrap();
        assert!(!linkage.model("lexicon").unwrap().pruned);
        assert!(notes.mentions("Disabling pruning"));
    }

    #[test]
    fn free_clocks_are_estimated_when_time_is_calibrated() {
        let models = vec![model("a", Some("c1")), model("b", Some("c2"))];
        let clocks = vec![
            ClockConfig::new("c1", ClockKind::Strict),
            ClockConfig::new("c2", ClockKind::Relaxed),
        ];
        let linkage = ClockLinkageResolver::new(&models, &clocks)
            .resolve(true, &mut Notes::new())
            .unwrap();
        assert!(linkage.clocks.iter().all(|c| c.estimate_rate));
    }

    #[test]
    fn one_free_clock_is_pinned_without_a_time_unit() {
        let models = vec![
            model("a", Some("c1")),
            model("b", Some("c2")),
            model("c", Some("c3")),
        ];
        let mut fixed = ClockConfig::new("c1", ClockKind::Strict);
        fixed.estimate_rate = Some(true);
        let clocks = vec![
            fixed,
            ClockConfig::new("c2", ClockKind::Strict),
            ClockConfig::new("c3", ClockKind::Relaxed),
        ];
        let mut notes = Notes::new();
        let linkage = ClockLinkageResolver::new(&models, &clocks)
            .resolve(false, &mut notes)
            .unwrap();

        let estimated: Vec<(&str, bool, f64)> = linkage
            .clocks
            .iter()
            .map(|c| (c.name.as_str(), c.estimate_rate, c.rate))
            .collect();
        assert_eq!(
            estimated,
            vec![("c1", true, 1.0), ("c2", false, 1.0), ("c3", true, 1.0)]
        );
        assert!(notes.mentions("Fixing the mean rate of clock 'c2'"));
    }

    #[test]
    fn explicit_rate_preferences_are_kept() {
        let models = vec![model("a", Some("c1"))];
        let mut clock = ClockConfig::new("c1", ClockKind::Strict);
        clock.estimate_rate = Some(false);
        clock.rate = Some(0.25);
        let linkage = ClockLinkageResolver::new(&models, &[clock])
            .resolve(false, &mut Notes::new())
            .unwrap();
        assert_eq!(linkage.clocks[0].estimate_rate, false);
        assert_eq!(linkage.clocks[0].rate, 0.25);
    }

    #[test]
    fn duplicate_clock_names_are_rejected() {
        let clocks = vec![
            ClockConfig::new("c", ClockKind::Strict),
            ClockConfig::new("c", ClockKind::Relaxed),
        ];
        assert!(ClockLinkageResolver::new(&[], &clocks)
            .resolve(true, &mut Notes::new())
            .is_err());
    }
}
