use crate::calibration::{CalibrationResolver, CalibrationSet};
use crate::clocks::{ClockLinkage, ClockLinkageResolver};
use crate::config::{AnalysisConfig, TreePrior};
use crate::error::{ResolveError, Result};
use crate::groups::GroupResolver;
use crate::languages::{FeatureTable, LanguageSetResolver, ModelLanguages};
use crate::monophyly::{MonophylyBuilder, MonophylyConstraint};
use crate::notes::{Note, Notes};
use phylo_taxonomy::TaxonomyIndex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Model name -> feature data
pub type ModelData = BTreeMap<String, FeatureTable>;

/// Fully resolved analysis, ready for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAnalysis {
    /// Sorted, duplicate-free, non-empty
    pub languages: Vec<String>,

    /// Active monophyly constraint, if any
    pub monophyly: Option<MonophylyConstraint>,

    pub calibrations: CalibrationSet,

    #[serde(flatten)]
    pub linkage: ClockLinkage,

    pub tree_prior: TreePrior,

    /// Resolved user-defined groups
    pub language_groups: BTreeMap<String, Vec<String>>,

    pub notes: Vec<Note>,
}

impl ResolvedAnalysis {
    /// JSON rendering for downstream templating
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| ResolveError::format(format!("Failed to serialize analysis: {err}")))
    }
}

/// Single-pass resolution of an analysis description.
///
/// Stages run strictly in order and the first failure aborts the run:
///
/// ```text
/// languages -> groups -> monophyly -> calibrations -> tree prior -> clocks
/// ```
pub struct Pipeline<'a> {
    config: AnalysisConfig,
    taxonomy: &'a TaxonomyIndex,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: AnalysisConfig, taxonomy: &'a TaxonomyIndex) -> Self {
        Self { config, taxonomy }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Resolve against per-model feature data
    pub fn run(&self, data: &ModelData) -> Result<ResolvedAnalysis> {
        let config = &self.config;
        let mut notes = Notes::new();

        // Stage 1: final language list
        let models = self.model_languages(data)?;
        let languages =
            LanguageSetResolver::new(&config.languages, self.taxonomy).resolve(&models, &mut notes)?;
        log::debug!("Stage languages: {} languages", languages.len());

        // Stage 2: groups over the frozen language list
        let mut groups = GroupResolver::new(&languages, self.taxonomy, &config.language_groups);
        let mut language_groups = BTreeMap::new();
        for name in config.language_groups.keys() {
            let members = groups.resolve(name)?;
            language_groups.insert(name.clone(), members.into_iter().collect::<Vec<_>>());
        }
        log::debug!("Stage groups: {} user-defined groups", language_groups.len());

        // Stage 3: monophyly
        let monophyly =
            MonophylyBuilder::new(&config.monophyly, self.taxonomy).build(&languages, &mut notes)?;
        log::debug!(
            "Stage monophyly: {}",
            monophyly.as_ref().map_or("disabled", |m| m.newick.as_str())
        );

        // Stage 4: calibrations, validated against the constraint tree
        let calibrations = CalibrationResolver::new(&mut groups, monophyly.as_ref().map(|m| &m.tree))
            .resolve(&config.calibrations, &mut notes)?;
        log::debug!("Stage calibrations: {} calibrations", calibrations.len());

        let mut tree_prior = config.tree.prior;
        if calibrations.requires_coalescent && tree_prior != TreePrior::Coalescent {
            notes.info(format!(
                "Switching the tree prior from {tree_prior:?} to Coalescent: \
                 only the coalescent supports calibrated tip ages"
            ));
            tree_prior = TreePrior::Coalescent;
        }

        // Stage 5: clocks
        let has_time_unit = !calibrations.is_empty() || config.tree.has_fixed_branch_lengths();
        let linkage = ClockLinkageResolver::new(&config.models, &config.clocks)
            .resolve(has_time_unit, &mut notes)?;
        log::debug!("Stage clocks: {} clocks in use", linkage.clocks.len());

        log::info!(
            "Resolved analysis: {} languages, {} calibrations, {} models, {} notes",
            languages.len(),
            calibrations.len(),
            linkage.models.len(),
            notes.len()
        );

        Ok(ResolvedAnalysis {
            languages,
            monophyly,
            calibrations,
            linkage,
            tree_prior,
            language_groups,
            notes: notes.into_vec(),
        })
    }

    fn model_languages<'d>(&'d self, data: &'d ModelData) -> Result<Vec<ModelLanguages<'d>>> {
        for name in data.keys() {
            if !self.config.models.iter().any(|m| &m.name == name) {
                log::warn!("Ignoring data for '{name}': no model of that name is configured");
            }
        }
        self.config
            .models
            .iter()
            .map(|model| {
                let table = data.get(&model.name).ok_or_else(|| {
                    ResolveError::config(format!("Model '{}' has no data", model.name))
                })?;
                Ok(ModelLanguages {
                    name: &model.name,
                    table,
                    minimum_data: model.minimum_data,
                })
            })
            .collect()
    }
}
