use crate::config::{LanguageOptions, Overlap};
use crate::error::{ResolveError, Result};
use crate::notes::Notes;
use phylo_taxonomy::TaxonomyIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Language id -> feature name -> raw value
pub type FeatureTable = BTreeMap<String, BTreeMap<String, String>>;

/// Values that count as missing data
const MISSING_VALUES: &[&str] = &["?", "-", ""];

fn is_missing(value: &str) -> bool {
    MISSING_VALUES.contains(&value.trim())
}

/// One data model's view of the languages
#[derive(Debug, Clone, Copy)]
pub struct ModelLanguages<'a> {
    pub name: &'a str,
    pub table: &'a FeatureTable,

    /// Per-model density threshold in percent
    pub minimum_data: f64,
}

impl ModelLanguages<'_> {
    fn feature_count(&self) -> usize {
        self.table
            .values()
            .flat_map(|features| features.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn present_count(&self, lang: &str) -> usize {
        self.table
            .get(lang)
            .map(|features| features.values().filter(|v| !is_missing(v)).count())
            .unwrap_or(0)
    }

    /// Fraction of this model's features for which `lang` has data
    fn coverage(&self, lang: &str) -> f64 {
        let total = self.feature_count();
        if total == 0 {
            return 0.0;
        }
        self.present_count(lang) as f64 / total as f64
    }
}

/// Computes the final, sorted analysis language list
pub struct LanguageSetResolver<'a> {
    options: &'a LanguageOptions,
    taxonomy: &'a TaxonomyIndex,
}

impl<'a> LanguageSetResolver<'a> {
    pub fn new(options: &'a LanguageOptions, taxonomy: &'a TaxonomyIndex) -> Self {
        Self { options, taxonomy }
    }

    pub fn resolve(&self, models: &[ModelLanguages<'_>], notes: &mut Notes) -> Result<Vec<String>> {
        let candidates = if models.is_empty() {
            log::debug!("No data models; taking candidate languages from the taxonomy");
            self.taxonomy.leaves().into_iter().collect()
        } else {
            self.combine(models)?
        };

        let mut languages: Vec<String> = candidates
            .into_iter()
            .filter(|lang| self.passes_filters(lang))
            .filter(|lang| self.has_enough_data(lang, models))
            .collect();
        languages.sort();
        languages.dedup();

        if languages.is_empty() {
            return Err(ResolveError::config(
                "No languages left after applying data overlap and language filters",
            ));
        }

        let languages = self.subsample(languages, notes);
        log::debug!("Resolved {} analysis languages", languages.len());
        Ok(languages)
    }

    fn combine(&self, models: &[ModelLanguages<'_>]) -> Result<BTreeSet<String>> {
        let per_model: Vec<(&str, BTreeSet<String>)> = models
            .iter()
            .map(|model| (model.name, model_languages(model)))
            .collect();

        let mut iter = per_model.iter();
        let Some((_, first)) = iter.next() else {
            return Ok(BTreeSet::new());
        };

        match self.options.overlap {
            Overlap::Union => Ok(per_model
                .iter()
                .flat_map(|(_, langs)| langs.iter().cloned())
                .collect()),
            Overlap::Intersection => Ok(iter.fold(first.clone(), |acc, (_, langs)| {
                acc.intersection(langs).cloned().collect()
            })),
            Overlap::Error => {
                let mismatched: Vec<&str> = per_model
                    .iter()
                    .filter(|(_, langs)| langs != first)
                    .map(|(name, _)| *name)
                    .collect();
                if mismatched.is_empty() {
                    Ok(first.clone())
                } else {
                    Err(ResolveError::config(format!(
                        "Models do not share the same languages (overlap = error): {} differ from {}",
                        mismatched.join(", "),
                        per_model[0].0
                    )))
                }
            }
        }
    }

    fn passes_filters(&self, lang: &str) -> bool {
        let opts = self.options;

        if !opts.languages.is_empty() && !opts.languages.iter().any(|l| l == lang) {
            log::debug!("Dropping {lang}: not in the language list");
            return false;
        }

        if !opts.families.is_empty() {
            let chain = self.taxonomy.classification_or_empty(lang);
            let in_family = opts
                .families
                .iter()
                .any(|family| chain.iter().any(|clade| clade.matches(family)));
            if !in_family {
                log::debug!("Dropping {lang}: not in any selected family");
                return false;
            }
        }

        if !opts.macroareas.is_empty() {
            let areas = self.taxonomy.macroareas(lang);
            let in_area = opts
                .macroareas
                .iter()
                .any(|wanted| areas.iter().any(|a| a.eq_ignore_ascii_case(wanted)));
            if !in_area {
                log::debug!("Dropping {lang}: not in any selected macroarea");
                return false;
            }
        }

        if opts.exclusions.iter().any(|l| l == lang) {
            log::debug!("Dropping {lang}: explicitly excluded");
            return false;
        }

        true
    }

    /// Density is the coverage of the language's best-populated model
    fn has_enough_data(&self, lang: &str, models: &[ModelLanguages<'_>]) -> bool {
        let threshold = self.options.minimum_data;
        if threshold <= 0.0 || models.is_empty() {
            return true;
        }
        let density = models
            .iter()
            .map(|model| model.coverage(lang))
            .fold(0.0_f64, f64::max);
        if density * 100.0 < threshold {
            log::debug!(
                "Dropping {lang}: data density {:.1}% below {threshold}%",
                density * 100.0
            );
            return false;
        }
        true
    }

    fn subsample(&self, languages: Vec<String>, notes: &mut Notes) -> Vec<String> {
        let target = self.options.subsample_size;
        if target == 0 || target >= languages.len() {
            return languages;
        }
        let total = languages.len();
        let sampled = subsample(&languages, target);
        notes.info(format!(
            "Subsampled {target} of {total} languages (deterministic for this language set)"
        ));
        sampled
    }
}

/// Keys of a model's table that meet its own density threshold
fn model_languages(model: &ModelLanguages<'_>) -> BTreeSet<String> {
    model
        .table
        .keys()
        .filter(|lang| {
            model.minimum_data <= 0.0 || model.coverage(lang) * 100.0 >= model.minimum_data
        })
        .cloned()
        .collect()
}

/// Draw `k` languages without replacement, seeded by the language set itself.
///
/// The result is sorted; `k >= languages.len()` returns the input sorted.
#[must_use]
pub fn subsample(languages: &[String], k: usize) -> Vec<String> {
    let mut sorted = languages.to_vec();
    sorted.sort();
    sorted.dedup();
    if k >= sorted.len() {
        return sorted;
    }

    let digest = Sha256::digest(sorted.join(",").as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    let mut rng = StdRng::from_seed(seed);
    let mut sampled: Vec<String> = sorted.choose_multiple(&mut rng, k).cloned().collect();
    sampled.sort();
    sampled
}
