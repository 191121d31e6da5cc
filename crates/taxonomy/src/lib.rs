//! # Phylo Taxonomy
//!
//! Lookup structures over an external taxonomic classification: a rooted
//! forest of named clades, one leaf per language.
//!
//! ## Architecture
//!
//! ```text
//! Bracket-tree text
//!     │
//!     ├──> Tree reader (newick)
//!     │      └─ Forest of labelled nodes
//!     │
//!     ├──> Label codec
//!     │      └─ "Name [abcd1234][iso]-l-" -> NodeLabel
//!     │
//!     └──> TaxonomyIndex (petgraph)
//!            ├─ identifier -> classification chain (root..parent)
//!            ├─ clade code -> display name
//!            └─ geography side table (macroareas, locations, back-fill)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use phylo_taxonomy::TaxonomyIndex;
//!
//! let index = TaxonomyIndex::from_newick(
//!     "(('English [stan1293][eng]-l-')'Anglic [angl1265]')'Germanic [germ1287]';",
//! )
//! .unwrap();
//!
//! let chain = index.classification("eng").unwrap();
//! assert_eq!(chain[0].name, "Germanic");
//! assert_eq!(chain[1].code, "angl1265");
//! ```

mod error;
mod geography;
mod index;
mod label;
pub mod newick;

pub use error::{Result, TaxonomyError};
pub use geography::{GeoRecord, Location};
pub use index::{Clade, TaxonomyIndex};
pub use label::NodeLabel;
pub use newick::TreeNode;
