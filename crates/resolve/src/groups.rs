use crate::error::{ResolveError, Result};
use phylo_taxonomy::TaxonomyIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Built-in group containing every language of the analysis
pub const ROOT_GROUP: &str = "root";

/// Resolves group references into concrete language sets.
///
/// A reference is a language identifier, the name of a user-defined or
/// built-in group, a clade name or code, or a comma-separated combination of
/// those. Results are memoized per reference for the lifetime of the
/// resolver, which is scoped to one pipeline run.
pub struct GroupResolver<'a> {
    languages: BTreeSet<String>,
    taxonomy: &'a TaxonomyIndex,
    definitions: BTreeMap<String, String>,
    cache: HashMap<String, BTreeSet<String>>,
    in_progress: HashSet<String>,
}

impl<'a> GroupResolver<'a> {
    /// `languages` must be the final analysis language list
    pub fn new(
        languages: &[String],
        taxonomy: &'a TaxonomyIndex,
        definitions: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            languages: languages.iter().cloned().collect(),
            taxonomy,
            definitions: definitions.clone(),
            cache: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Every analysis language
    #[must_use]
    pub fn root(&self) -> &BTreeSet<String> {
        &self.languages
    }

    /// Names of the user-defined groups
    pub fn defined_groups(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    fn is_known_group(&self, name: &str) -> bool {
        name == ROOT_GROUP
            || self.languages.contains(name)
            || self.definitions.contains_key(name)
            || self.cache.contains_key(name)
    }

    /// Resolve `name` into a non-empty language set
    pub fn resolve(&mut self, name: &str) -> Result<BTreeSet<String>> {
        let name = name.trim();
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }

        let resolved = if name == ROOT_GROUP {
            self.languages.clone()
        } else if self.languages.contains(name) {
            BTreeSet::from([name.to_string()])
        } else if let Some(spec) = self.definitions.get(name).cloned() {
            if !self.in_progress.insert(name.to_string()) {
                return Err(ResolveError::config(format!(
                    "Language group '{name}' is defined in terms of itself"
                )));
            }
            let result = self.resolve_tokens(&spec);
            self.in_progress.remove(name);
            result?
        } else {
            self.resolve_tokens(name)?
        };

        if resolved.is_empty() {
            return Err(ResolveError::config(format!(
                "Language group '{name}' is empty: no analysis language matches it. \
                 Check for a misspelled language, group or clade name."
            )));
        }

        log::debug!("Resolved language group '{name}' to {} languages", resolved.len());
        self.cache.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_tokens(&mut self, spec: &str) -> Result<BTreeSet<String>> {
        let tokens: Vec<&str> = spec
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let mut resolved = BTreeSet::new();
        for token in tokens {
            if self.is_known_group(token) {
                resolved.extend(self.resolve(token)?);
            } else {
                resolved.extend(self.clade_members(token));
            }
        }
        Ok(resolved)
    }

    /// Analysis languages classified under a clade matching `token`
    fn clade_members(&self, token: &str) -> BTreeSet<String> {
        self.languages
            .iter()
            .filter(|lang| {
                self.taxonomy
                    .classification_or_empty(lang)
                    .iter()
                    .any(|clade| clade.matches(token))
                    || self.taxonomy.node(lang).is_some_and(|node| node.matches(token))
            })
            .cloned()
            .collect()
    }
}
