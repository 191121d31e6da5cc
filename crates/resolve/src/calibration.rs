use crate::distribution::Distribution;
use crate::error::{ResolveError, Result};
use crate::groups::GroupResolver;
use crate::monophyly::Monophyly;
use crate::notes::Notes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

static ORIGINATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^originate\s*\((?P<inner>.*)\)$").expect("originate pattern is a valid regex")
});

/// What a calibration constrains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationTarget {
    /// Age of the clade's most recent common ancestor
    Clade,
    /// Age of a single leaf
    Tip,
    /// Age of the edge leading into the clade
    Originate,
}

/// Resolved calibration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub id: String,
    pub target: CalibrationTarget,

    /// Sorted language identifiers
    pub languages: Vec<String>,

    pub distribution: Distribution,

    /// Clade specification as written
    pub spec: String,
}

/// Calibrations keyed by identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalibrationSet {
    /// Clade and originate calibrations
    pub clades: BTreeMap<String, Calibration>,
    pub tips: BTreeMap<String, Calibration>,

    /// Set when tip ages are calibrated
    pub requires_coalescent: bool,
}

impl CalibrationSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clades.is_empty() && self.tips.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clades.len() + self.tips.len()
    }

    fn insert(&mut self, calibration: Calibration) -> Result<()> {
        if self.clades.contains_key(&calibration.id) || self.tips.contains_key(&calibration.id) {
            return Err(ResolveError::config(format!(
                "Calibration '{}' is given more than once",
                calibration.id
            )));
        }
        let slot = match calibration.target {
            CalibrationTarget::Tip => &mut self.tips,
            CalibrationTarget::Clade | CalibrationTarget::Originate => &mut self.clades,
        };
        slot.insert(calibration.id.clone(), calibration);
        Ok(())
    }
}

/// Classifies and validates raw calibration entries.
///
/// Needs the group resolver of the current run, and the monophyly tree when
/// constraints are active.
pub struct CalibrationResolver<'r, 'a> {
    groups: &'r mut GroupResolver<'a>,
    monophyly: Option<&'r Monophyly>,
}

impl<'r, 'a> CalibrationResolver<'r, 'a> {
    pub fn new(groups: &'r mut GroupResolver<'a>, monophyly: Option<&'r Monophyly>) -> Self {
        Self { groups, monophyly }
    }

    /// Resolve `clade spec -> distribution spec` pairs
    pub fn resolve(
        &mut self,
        raw: &BTreeMap<String, String>,
        notes: &mut Notes,
    ) -> Result<CalibrationSet> {
        let mut set = CalibrationSet::default();
        for (spec, distribution) in raw {
            if let Some(calibration) = self.resolve_one(spec, distribution, notes)? {
                log::debug!(
                    "Calibration '{}' ({:?}) over {} language(s): {}",
                    calibration.id,
                    calibration.target,
                    calibration.languages.len(),
                    calibration.distribution
                );
                if calibration.target == CalibrationTarget::Tip {
                    set.requires_coalescent = true;
                }
                set.insert(calibration)?;
            }
        }
        Ok(set)
    }

    fn resolve_one(
        &mut self,
        spec: &str,
        distribution: &str,
        notes: &mut Notes,
    ) -> Result<Option<Calibration>> {
        let trimmed = spec.trim();
        let (inner, originate) = match ORIGINATE_PATTERN.captures(trimmed) {
            Some(caps) => (caps["inner"].trim().to_string(), true),
            None => (trimmed.to_string(), false),
        };

        let languages = self.groups.resolve(&inner)?;
        if originate && &languages == self.groups.root() {
            return Err(ResolveError::config(format!(
                "Calibration '{spec}': the root of the tree has no originate edge"
            )));
        }

        let target = match languages.len() {
            0 => {
                notes.info(format!("Skipping calibration '{spec}': it matches no languages"));
                return Ok(None);
            }
            1 if originate => CalibrationTarget::Originate,
            1 if !inner.contains(',') => CalibrationTarget::Tip,
            1 => {
                return Err(ResolveError::config(format!(
                    "Calibration '{spec}' combines several references into a single language, \
                     which is ambiguous. Use originate({inner}) to calibrate its originate \
                     edge, or name one language or clade to calibrate a tip age."
                )))
            }
            _ if originate => CalibrationTarget::Originate,
            _ => CalibrationTarget::Clade,
        };

        if languages.len() > 1 {
            self.check_monophyly(spec, &languages)?;
        }

        let distribution: Distribution = distribution.parse().map_err(|err| match err {
            ResolveError::ConfigError(msg) => {
                ResolveError::config(format!("Calibration '{spec}': {msg}"))
            }
            other => other,
        })?;

        Ok(Some(Calibration {
            id: calibration_id(&inner, originate),
            target,
            languages: languages.into_iter().collect(),
            distribution,
            spec: spec.to_string(),
        }))
    }

    fn check_monophyly(&self, spec: &str, languages: &BTreeSet<String>) -> Result<()> {
        match self.monophyly {
            Some(tree) if !tree.admits(languages) => Err(ResolveError::consistency(format!(
                "Calibration '{spec}' ({}) is not a clade of the monophyly constraint tree {}",
                languages.iter().cloned().collect::<Vec<_>>().join(", "),
                tree.to_newick()
            ))),
            _ => Ok(()),
        }
    }
}

/// Normalized calibration identifier: `Anglic, fra` becomes `Anglic+fra`
fn calibration_id(inner: &str, originate: bool) -> String {
    let id = inner
        .split(',')
        .map(|token| token.split_whitespace().collect::<Vec<_>>().join("_"))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join("+");
    if originate {
        format!("{id}_originate")
    } else {
        id
    }
}
