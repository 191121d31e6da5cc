use crate::error::{ResolveError, Result};
use crate::groups::ROOT_GROUP;
use crate::registry::{ClockKind, ModelKind, CLOCK_KINDS, MODEL_KINDS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How per-model language sets are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Overlap {
    #[default]
    Union,
    Intersection,
    /// Abort if the models disagree on their languages
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonophylyDirection {
    #[default]
    TopDown,
    BottomUp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreePrior {
    #[default]
    Yule,
    BirthDeath,
    Coalescent,
    Uniform,
}

/// Language filters and subsampling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageOptions {
    /// Explicit allow-list (empty = everything)
    pub languages: Vec<String>,

    /// Clade names or codes; a language must descend from one of them
    pub families: Vec<String>,

    /// Macroarea allow-list
    pub macroareas: Vec<String>,

    pub exclusions: Vec<String>,

    pub overlap: Overlap,

    /// Target size for deterministic subsampling (0 = off)
    pub subsample_size: usize,

    /// Minimum data density in percent (0 = off)
    pub minimum_data: f64,
}

/// Monophyly constraint options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonophylyOptions {
    pub enabled: bool,
    pub start_depth: usize,
    pub end_depth: Option<usize>,
    pub levels: Option<usize>,
    pub direction: MonophylyDirection,

    /// User-supplied constraint tree, overriding the classification
    pub newick: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeOptions {
    pub prior: TreePrior,
    pub starting_tree: Option<String>,
    pub sample_topology: bool,
    pub sample_branch_lengths: bool,
}

impl TreeOptions {
    /// True if a fixed starting tree with fixed branch lengths sets a time scale
    #[must_use]
    pub fn has_fixed_branch_lengths(&self) -> bool {
        self.starting_tree.is_some() && !self.sample_branch_lengths
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    pub kind: ModelKind,

    /// Explicit clock reference
    pub clock: Option<String>,

    /// Prune the tree per feature to the languages with data
    pub pruned: bool,

    /// Per-model minimum data density in percent
    pub minimum_data: f64,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            clock: None,
            pruned: false,
            minimum_data: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockConfig {
    pub name: String,
    pub kind: ClockKind,

    /// Unset means no user preference
    pub estimate_rate: Option<bool>,

    pub rate: Option<f64>,
}

impl ClockConfig {
    pub fn new(name: impl Into<String>, kind: ClockKind) -> Self {
        Self {
            name: name.into(),
            kind,
            estimate_rate: None,
            rate: None,
        }
    }
}

/// Validated analysis description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisConfig {
    pub languages: LanguageOptions,
    pub monophyly: MonophylyOptions,

    /// Group name -> raw specification
    pub language_groups: BTreeMap<String, String>,

    /// Clade specification -> distribution specification
    pub calibrations: BTreeMap<String, String>,

    /// Sorted by name, whatever the order in the file
    pub models: Vec<ModelConfig>,
    /// Sorted by name
    pub clocks: Vec<ClockConfig>,
    pub tree: TreeOptions,
}

impl AnalysisConfig {
    /// Parse JSON or TOML configuration text
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw = parse_raw(bytes)?;
        Self::from_raw(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            ResolveError::config(format!("Failed to read {}: {err}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }

    fn from_raw(raw: RawAnalysisConfig) -> Result<Self> {
        let RawAnalysisConfig {
            languages: raw_languages,
            language_groups,
            calibration,
            model,
            clock,
            tree,
        } = raw;

        let overlap = resolve_overlap(raw_languages.overlap.as_deref(), raw_languages.intersection)?;
        let minimum_data =
            validate_percent("languages.minimum_data", raw_languages.minimum_data)?;

        let languages = LanguageOptions {
            languages: raw_languages.languages.into_vec(),
            families: raw_languages.families.into_vec(),
            macroareas: raw_languages.macroareas.into_vec(),
            exclusions: raw_languages.exclusions.into_vec(),
            overlap,
            subsample_size: raw_languages.subsample_size.unwrap_or(0),
            minimum_data,
        };

        let direction = match raw_languages.monophyly_direction.as_deref().map(str::trim) {
            None => MonophylyDirection::TopDown,
            Some(s) if s.eq_ignore_ascii_case("top_down") => MonophylyDirection::TopDown,
            Some(s) if s.eq_ignore_ascii_case("bottom_up") => MonophylyDirection::BottomUp,
            Some(other) => {
                return Err(ResolveError::config(format!(
                    "languages.monophyly_direction must be 'top_down' or 'bottom_up', got '{other}'"
                )))
            }
        };
        let start_depth = raw_languages.monophyly_start_depth.unwrap_or(0);
        if let Some(end) = raw_languages.monophyly_end_depth {
            if raw_languages.monophyly_levels.is_some() {
                return Err(ResolveError::config(
                    "languages.monophyly_end_depth and languages.monophyly_levels are mutually exclusive",
                ));
            }
            if end < start_depth {
                return Err(ResolveError::config(format!(
                    "languages.monophyly_end_depth ({end}) is smaller than monophyly_start_depth ({start_depth})"
                )));
            }
        }
        let monophyly = MonophylyOptions {
            enabled: raw_languages.monophyly.unwrap_or(false),
            start_depth,
            end_depth: raw_languages.monophyly_end_depth,
            levels: raw_languages.monophyly_levels,
            direction,
            newick: raw_languages.monophyly_newick.filter(|s| !s.trim().is_empty()),
        };

        for name in language_groups.keys() {
            validate_group_name(name)?;
        }
        for (clade, dist) in &calibration {
            if clade.trim().is_empty() || dist.trim().is_empty() {
                return Err(ResolveError::config(format!(
                    "calibration '{clade}' = '{dist}' has an empty clade or distribution"
                )));
            }
        }

        let mut models = Vec::with_capacity(model.len());
        for (name, raw_model) in model {
            let kind = MODEL_KINDS.build(raw_model.kind.as_deref().unwrap_or("mk"))?;
            let minimum_data =
                validate_percent(&format!("model.{name}.minimum_data"), raw_model.minimum_data)?;
            models.push(ModelConfig {
                kind,
                clock: raw_model.clock.filter(|c| !c.trim().is_empty()),
                pruned: raw_model.pruned.unwrap_or(false),
                minimum_data,
                name,
            });
        }

        let mut clocks = Vec::with_capacity(clock.len());
        for (name, raw_clock) in clock {
            let kind = CLOCK_KINDS.build(raw_clock.kind.as_deref().unwrap_or("strict"))?;
            if let Some(rate) = raw_clock.rate {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(ResolveError::config(format!(
                        "clock.{name}.rate must be a positive number, got {rate}"
                    )));
                }
            }
            clocks.push(ClockConfig {
                kind,
                estimate_rate: raw_clock.estimate_rate,
                rate: raw_clock.rate,
                name,
            });
        }

        let prior = match tree.prior.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
            None => TreePrior::Yule,
            Some(s) => match s.as_str() {
                "yule" => TreePrior::Yule,
                "birthdeath" | "birth_death" => TreePrior::BirthDeath,
                "coalescent" => TreePrior::Coalescent,
                "uniform" => TreePrior::Uniform,
                other => {
                    return Err(ResolveError::config(format!("Unknown tree prior '{other}'")))
                }
            },
        };
        let tree = TreeOptions {
            prior,
            starting_tree: tree.starting_tree.filter(|s| !s.trim().is_empty()),
            sample_topology: tree.sample_topology.unwrap_or(true),
            sample_branch_lengths: tree.sample_branch_lengths.unwrap_or(true),
        };

        Ok(Self {
            languages,
            monophyly,
            language_groups,
            calibrations: calibration,
            models,
            clocks,
            tree,
        })
    }
}

fn resolve_overlap(overlap: Option<&str>, intersection: Option<bool>) -> Result<Overlap> {
    let parsed = match overlap.map(|s| s.trim().to_ascii_lowercase()) {
        None => None,
        Some(s) => Some(match s.as_str() {
            "union" => Overlap::Union,
            "intersection" => Overlap::Intersection,
            "error" => Overlap::Error,
            other => {
                return Err(ResolveError::config(format!(
                    "languages.overlap must be 'union', 'intersection' or 'error', got '{other}'"
                )))
            }
        }),
    };
    let legacy = intersection.map(|flag| {
        if flag {
            Overlap::Intersection
        } else {
            Overlap::Union
        }
    });
    match (parsed, legacy) {
        (Some(a), Some(b)) if a != b => Err(ResolveError::config(format!(
            "languages.overlap = {a:?} conflicts with languages.intersection = {}",
            b == Overlap::Intersection
        ))),
        (Some(a), _) => Ok(a),
        (None, Some(b)) => Ok(b),
        (None, None) => Ok(Overlap::default()),
    }
}

fn validate_percent(key: &str, value: Option<f64>) -> Result<f64> {
    let value = value.unwrap_or(0.0);
    if !(0.0..=100.0).contains(&value) {
        return Err(ResolveError::config(format!(
            "{key} must be a percentage between 0 and 100, got {value}"
        )));
    }
    Ok(value)
}

fn validate_group_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(',') {
        return Err(ResolveError::config(format!(
            "Language group name '{name}' must be non-empty and must not contain ','"
        )));
    }
    if name == ROOT_GROUP {
        return Err(ResolveError::config(format!(
            "Language group name '{ROOT_GROUP}' is reserved"
        )));
    }
    Ok(())
}

/// Either a list or a comma-separated string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StringList {
    List(Vec<String>),
    Joined(String),
}

impl Default for StringList {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl StringList {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            Self::List(items) => items,
            Self::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAnalysisConfig {
    #[serde(default)]
    languages: RawLanguages,
    #[serde(default)]
    language_groups: BTreeMap<String, String>,
    #[serde(default)]
    calibration: BTreeMap<String, String>,
    #[serde(default)]
    model: BTreeMap<String, RawModel>,
    #[serde(default)]
    clock: BTreeMap<String, RawClock>,
    #[serde(default)]
    tree: RawTree,
}

#[derive(Debug, Default, Deserialize)]
struct RawLanguages {
    #[serde(default)]
    languages: StringList,
    #[serde(default)]
    families: StringList,
    #[serde(default)]
    macroareas: StringList,
    #[serde(default)]
    exclusions: StringList,
    overlap: Option<String>,
    intersection: Option<bool>,
    subsample_size: Option<usize>,
    minimum_data: Option<f64>,
    monophyly: Option<bool>,
    monophyly_start_depth: Option<usize>,
    monophyly_end_depth: Option<usize>,
    monophyly_levels: Option<usize>,
    monophyly_direction: Option<String>,
    monophyly_newick: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawModel {
    kind: Option<String>,
    clock: Option<String>,
    pruned: Option<bool>,
    minimum_data: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawClock {
    kind: Option<String>,
    estimate_rate: Option<bool>,
    rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTree {
    prior: Option<String>,
    starting_tree: Option<String>,
    sample_topology: Option<bool>,
    sample_branch_lengths: Option<bool>,
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "languages",
    "language_groups",
    "calibration",
    "model",
    "clock",
    "tree",
];

const LANGUAGE_KEYS: &[&str] = &[
    "languages",
    "families",
    "macroareas",
    "exclusions",
    "overlap",
    "intersection",
    "subsample_size",
    "minimum_data",
    "monophyly",
    "monophyly_start_depth",
    "monophyly_end_depth",
    "monophyly_levels",
    "monophyly_direction",
    "monophyly_newick",
];

const MODEL_KEYS: &[&str] = &["kind", "clock", "pruned", "minimum_data"];

const CLOCK_KEYS: &[&str] = &["kind", "estimate_rate", "rate"];

const TREE_KEYS: &[&str] = &[
    "prior",
    "starting_tree",
    "sample_topology",
    "sample_branch_lengths",
];

fn parse_raw(bytes: &[u8]) -> Result<RawAnalysisConfig> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(json_err) => {
            let utf8 = std::str::from_utf8(bytes)
                .map_err(|err| ResolveError::config(format!("{json_err}; {err}")))?;
            let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                ResolveError::config(format!(
                    "Configuration is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}"
                ))
            })?;
            serde_json::to_value(toml_value).map_err(|err| {
                ResolveError::config(format!("Failed to convert TOML configuration: {err}"))
            })?
        }
    };

    validate_config_value(&value)?;
    serde_json::from_value(value)
        .map_err(|err| ResolveError::config(format!("Configuration parse error: {err}")))
}

fn validate_config_value(value: &serde_json::Value) -> Result<()> {
    fn check_keys(
        unknown: &mut Vec<String>,
        value: Option<&serde_json::Value>,
        base: &str,
        allowed: &[&str],
    ) {
        let Some(obj) = value.and_then(serde_json::Value::as_object) else {
            return;
        };
        for key in obj.keys() {
            if !allowed.iter().any(|a| a == &key.as_str()) {
                if base.is_empty() {
                    unknown.push(key.clone());
                } else {
                    unknown.push(format!("{base}.{key}"));
                }
            }
        }
    }

    let Some(root) = value.as_object() else {
        return Err(ResolveError::config("Configuration must be a table"));
    };

    let mut unknown = Vec::new();
    check_keys(&mut unknown, Some(value), "", TOP_LEVEL_KEYS);
    check_keys(&mut unknown, root.get("languages"), "languages", LANGUAGE_KEYS);
    check_keys(&mut unknown, root.get("tree"), "tree", TREE_KEYS);
    for (section, allowed) in [("model", MODEL_KEYS), ("clock", CLOCK_KEYS)] {
        if let Some(entries) = root.get(section).and_then(serde_json::Value::as_object) {
            for (name, entry) in entries {
                check_keys(&mut unknown, Some(entry), &format!("{section}.{name}"), allowed);
            }
        }
    }

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ResolveError::config(format!(
            "Unknown configuration keys: {}",
            unknown.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const TOML_CONFIG: &str = r#"
[languages]
families = "Germanic, Romance"
exclusions = ["ang"]
overlap = "intersection"
subsample_size = 10
monophyly = true
monophyly_levels = 2
monophyly_direction = "bottom_up"

[language_groups]
north = "isl,nor"

[calibration]
"Germanic" = "normal(2000, 200)"

[model.lexicon]
kind = "covarion"
clock = "lexclock"
pruned = true

[clock.lexclock]
kind = "relaxed"
estimate_rate = false

[tree]
prior = "birthdeath"
"#;

    #[test]
    fn parses_toml_configuration() {
        let config = AnalysisConfig::from_bytes(TOML_CONFIG.as_bytes()).unwrap();

        assert_eq!(config.languages.families, vec!["Germanic", "Romance"]);
        assert_eq!(config.languages.exclusions, vec!["ang"]);
        assert_eq!(config.languages.overlap, Overlap::Intersection);
        assert_eq!(config.languages.subsample_size, 10);
        assert_eq!(
            config.monophyly,
            MonophylyOptions {
                enabled: true,
                start_depth: 0,
                end_depth: None,
                levels: Some(2),
                direction: MonophylyDirection::BottomUp,
                newick: None,
            }
        );
        assert_eq!(config.language_groups["north"], "isl,nor");
        assert_eq!(config.calibrations["Germanic"], "normal(2000, 200)");
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].kind, ModelKind::Covarion);
        assert_eq!(config.models[0].clock.as_deref(), Some("lexclock"));
        assert!(config.models[0].pruned);
        assert_eq!(config.clocks[0].kind, ClockKind::Relaxed);
        assert_eq!(config.clocks[0].estimate_rate, Some(false));
        assert_eq!(config.tree.prior, TreePrior::BirthDeath);
        assert!(config.tree.sample_topology);
    }

    #[test]
    fn parses_json_configuration() {
        let json = br#"{"languages": {"languages": ["eng", "deu"]}, "model": {"m": {}}}"#;
        let config = AnalysisConfig::from_bytes(json).unwrap();
        assert_eq!(config.languages.languages, vec!["eng", "deu"]);
        assert_eq!(config.models[0].kind, ModelKind::Mk);
    }

    #[test]
    fn reports_all_unknown_keys_with_paths() {
        let text = r#"
colour = "blue"
[languages]
famlies = ["Germanic"]
[model.lex]
knd = "mk"
"#;
        let err = AnalysisConfig::from_bytes(text.as_bytes()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("colour"), "{msg}");
        assert!(msg.contains("languages.famlies"), "{msg}");
        assert!(msg.contains("model.lex.knd"), "{msg}");
    }

    #[test]
    fn conflicting_overlap_settings_are_rejected() {
        let text = "[languages]\noverlap = \"union\"\nintersection = true\n";
        let err = AnalysisConfig::from_bytes(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ResolveError::ConfigError(_)), "{err}");

        let text = "[languages]\nintersection = true\n";
        let config = AnalysisConfig::from_bytes(text.as_bytes()).unwrap();
        assert_eq!(config.languages.overlap, Overlap::Intersection);
    }

    #[test]
    fn rejects_bad_values() {
        for text in [
            "[languages]\nminimum_data = 120.0\n",
            "[languages]\nmonophyly_direction = \"sideways\"\n",
            "[languages]\nmonophyly_start_depth = 3\nmonophyly_end_depth = 1\n",
            "[languages]\nmonophyly_end_depth = 3\nmonophyly_levels = 1\n",
            "[model.m]\nkind = \"nonsense\"\n",
            "[clock.c]\nrate = -1.0\n",
            "[tree]\nprior = \"bush\"\n",
            "[language_groups]\nroot = \"eng\"\n",
            "[language_groups]\n\"a,b\" = \"eng\"\n",
            "not valid at all [[[",
        ] {
            let err = AnalysisConfig::from_bytes(text.as_bytes()).unwrap_err();
            assert!(matches!(err, ResolveError::ConfigError(_)), "{text}: {err}");
        }
    }

    #[test]
    fn models_and_clocks_are_ordered_by_name() {
        let text = r#"
[model.lexicon]
[model.grammar]
[model.areal]

[clock.slow]
[clock.fast]
"#;
        let config = AnalysisConfig::from_bytes(text.as_bytes()).unwrap();
        let models: Vec<&str> = config.models.iter().map(|m| m.name.as_str()).collect();
        let clocks: Vec<&str> = config.clocks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(models, vec!["areal", "grammar", "lexicon"]);
        assert_eq!(clocks, vec!["fast", "slow"]);
    }

    #[test]
    fn loads_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOML_CONFIG.as_bytes()).unwrap();
        let config = AnalysisConfig::from_path(file.path()).unwrap();
        assert_eq!(config.models[0].name, "lexicon");

        let missing = AnalysisConfig::from_path(Path::new("/nonexistent/analysis.toml"));
        assert!(matches!(missing, Err(ResolveError::ConfigError(_))));
    }
}
