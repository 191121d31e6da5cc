use crate::index::TaxonomyIndex;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

/// Point location in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Geographic metadata for one identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(default)]
    pub macroareas: Vec<String>,

    #[serde(default)]
    pub location: Option<Location>,
}

impl GeoRecord {
    pub fn located(latitude: f64, longitude: f64) -> Self {
        Self {
            macroareas: Vec::new(),
            location: Some(Location {
                latitude,
                longitude,
            }),
        }
    }

    #[must_use]
    pub fn with_macroarea(mut self, macroarea: impl Into<String>) -> Self {
        self.macroareas.push(macroarea.into());
        self
    }
}

impl TaxonomyIndex {
    /// Merge side-table records keyed by clade code or ISO code
    pub fn ingest_geography<I, K>(&mut self, records: I)
    where
        I: IntoIterator<Item = (K, GeoRecord)>,
        K: Into<String>,
    {
        let mut count = 0usize;
        for (id, record) in records {
            let entry = self.geography.entry(id.into()).or_default();
            if !record.macroareas.is_empty() {
                entry.macroareas = record.macroareas;
            }
            if record.location.is_some() {
                entry.location = record.location;
            }
            count += 1;
        }
        log::debug!("Ingested {count} geography records");
    }

    /// Give language- and dialect-level nodes without a location the location
    /// of their nearest located ancestor. Nodes with no located ancestor stay
    /// unlocated.
    pub fn backfill_locations(&mut self) -> usize {
        let pending: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.is_language_level(idx) && self.location_of(idx).is_none())
            .collect();

        let mut filled = 0usize;
        for idx in pending {
            let inherited = self
                .ancestor_indices(idx)
                .find_map(|ancestor| self.location_of(ancestor));
            let Some(location) = inherited else {
                continue;
            };
            let Some(label) = self.graph.node_weight(idx) else {
                continue;
            };
            let code = label.clade_code.clone();
            self.geography.entry(code).or_default().location = Some(location);
            filled += 1;
        }

        log::debug!("Back-filled {filled} dialect locations from ancestors");
        filled
    }

    fn is_language_level(&self, idx: NodeIndex) -> bool {
        let is_leaf = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .next()
            .is_none();
        let marked = self.graph.node_weight(idx).is_some_and(|l| l.is_language);
        is_leaf || marked
    }

    fn location_of(&self, idx: NodeIndex) -> Option<Location> {
        let label = self.graph.node_weight(idx)?;
        label
            .identifiers()
            .find_map(|id| self.geography.get(id).and_then(|r| r.location))
    }

    /// Geographic record for `id`, falling back to the node's other identifier
    #[must_use]
    pub fn geography(&self, id: &str) -> Option<&GeoRecord> {
        if let Some(record) = self.geography.get(id) {
            return Some(record);
        }
        let label = self.node(id)?;
        label.identifiers().find_map(|other| self.geography.get(other))
    }

    #[must_use]
    pub fn macroareas(&self, id: &str) -> &[String] {
        self.geography(id)
            .map(|r| r.macroareas.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn location(&self, id: &str) -> Option<Location> {
        if let Some(location) = self.geography.get(id).and_then(|r| r.location) {
            return Some(location);
        }
        let label = self.node(id)?;
        label
            .identifiers()
            .find_map(|other| self.geography.get(other).and_then(|r| r.location))
    }
}
