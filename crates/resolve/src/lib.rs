//! # Phylo Resolve
//!
//! Turns a declarative phylogenetic analysis description plus a taxonomic
//! classification into one internally consistent resolved analysis.
//!
//! ## Features
//!
//! - **Language set** - union/intersection of model data, filters, deterministic subsampling
//! - **Language groups** - clade lookups and nested user-defined groups, memoized per run
//! - **Monophyly** - constraint tree partitioned from the classification
//! - **Calibrations** - clade, tip and originate ages checked against the constraint tree
//! - **Clock linkage** - model/clock binding and rate identifiability
//!
//! ## Architecture
//!
//! ```text
//! AnalysisConfig (JSON/TOML) + TaxonomyIndex + ModelData
//!     │
//!     └──> Pipeline (single pass, first error aborts)
//!            ├─ LanguageSetResolver   -> sorted language list
//!            ├─ GroupResolver         -> named language sets
//!            ├─ MonophylyBuilder      -> constraint tree or none
//!            ├─ CalibrationResolver   -> clade / tip / originate calibrations
//!            └─ ClockLinkageResolver  -> clocks, models, estimated rates
//!                    │
//!                    └──> ResolvedAnalysis + notes
//! ```
//!
//! ## Example
//!
//! ```rust
//! use phylo_resolve::{AnalysisConfig, ModelData, Pipeline};
//! use phylo_taxonomy::TaxonomyIndex;
//! use std::collections::BTreeMap;
//!
//! let taxonomy = TaxonomyIndex::from_newick(
//!     "(('English [stan1293][eng]-l-','Scots [scot1243][sco]-l-')'Anglic [angl1265]',\
//!      'German [stan1295][deu]-l-')'Germanic [germ1287]';",
//! )
//! .unwrap();
//!
//! let config = AnalysisConfig::from_bytes(
//!     br#"
//! [calibration]
//! Anglic = "1000-1500"
//!
//! [model.lexicon]
//! "#,
//! )
//! .unwrap();
//!
//! let row = |value: &str| BTreeMap::from([("hand".to_string(), value.to_string())]);
//! let table = BTreeMap::from([
//!     ("eng".to_string(), row("1")),
//!     ("sco".to_string(), row("1")),
//!     ("deu".to_string(), row("2")),
//! ]);
//! let data: ModelData = BTreeMap::from([("lexicon".to_string(), table)]);
//!
//! let analysis = Pipeline::new(config, &taxonomy).run(&data).unwrap();
//! assert_eq!(analysis.languages, vec!["deu", "eng", "sco"]);
//! assert_eq!(analysis.calibrations.clades["Anglic"].languages, vec!["eng", "sco"]);
//! ```

mod calibration;
mod clocks;
mod config;
mod distribution;
mod error;
mod groups;
mod languages;
mod monophyly;
mod notes;
mod pipeline;
mod registry;

pub use calibration::{Calibration, CalibrationResolver, CalibrationSet, CalibrationTarget};
pub use clocks::{ClockLinkage, ClockLinkageResolver, ResolvedClock, ResolvedModel, DEFAULT_CLOCK};
pub use config::{
    AnalysisConfig, ClockConfig, LanguageOptions, ModelConfig, MonophylyDirection,
    MonophylyOptions, Overlap, TreeOptions, TreePrior,
};
pub use distribution::{Distribution, DistributionKind};
pub use error::{ErrorKind, ResolveError, Result};
pub use groups::{GroupResolver, ROOT_GROUP};
pub use languages::{subsample, FeatureTable, LanguageSetResolver, ModelLanguages};
pub use monophyly::{partition, Monophyly, MonophylyBuilder, MonophylyConstraint};
pub use notes::{Note, NoteLevel, Notes};
pub use pipeline::{ModelData, Pipeline, ResolvedAnalysis};
pub use registry::{ClockKind, ModelKind, Registry, CLOCK_KINDS, MODEL_KINDS};
