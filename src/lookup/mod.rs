//! External identifier lookup.
//!
//! Gene products in a model are typed with identifiers from external
//! databases (`UniProtKB:P12345`) that the class hierarchy does not know.
//! A [`LookupService`] resolves such identifiers to [`LookupEntry`]s carrying
//! label, taxon and an `is_a` closure, from which the coarse
//! [`direct_parent`](LookupEntry::direct_parent) class is derived.
//!
//! Adapters:
//! - [`StaticLookupService`]: an in-memory table, loadable from JSON.
//! - [`CachingLookupService`]: memoizes another service in a `DashMap`.
//! - [`http::HttpLookupService`]: batched GET against a remote service.

pub mod http;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LookupError};
use crate::iri::{CurieMap, Iri};

/// `CHEBI:36080` protein.
pub const PROTEIN: &str = "http://purl.obolibrary.org/obo/CHEBI_36080";
/// `CHEBI:33695` information biomacromolecule (genes, complexes).
pub const INFORMATION_BIOMACROMOLECULE: &str = "http://purl.obolibrary.org/obo/CHEBI_33695";

const PROTEIN_CURIE: &str = "CHEBI:36080";
const INFORMATION_BIOMACROMOLECULE_CURIE: &str = "CHEBI:33695";

/// One resolved identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupEntry {
    pub id: Iri,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub taxon: Option<String>,
    pub isa_closure: Vec<String>,
    direct_parent: Option<Iri>,
}

impl LookupEntry {
    pub fn new(
        id: Iri,
        label: Option<String>,
        kind: Option<String>,
        taxon: Option<String>,
        isa_closure: Vec<String>,
    ) -> Self {
        let direct_parent = derive_direct_parent(&isa_closure);
        Self {
            id,
            label,
            kind,
            taxon,
            isa_closure,
            direct_parent,
        }
    }

    /// Protein if the closure contains `CHEBI:36080`, else information
    /// biomacromolecule if it contains `CHEBI:33695`, else none.
    pub fn direct_parent(&self) -> Option<&Iri> {
        self.direct_parent.as_ref()
    }

    /// Whether the entry belongs to the taxon (`NCBITaxon:9606`, its IRI
    /// form and the bare number all match).
    pub fn in_taxon(&self, taxon: &str) -> bool {
        self.taxon
            .as_deref()
            .is_some_and(|own| taxon_number(own) == taxon_number(taxon))
    }
}

fn derive_direct_parent(closure: &[String]) -> Option<Iri> {
    let has = |wanted: &str, iri: &str| closure.iter().any(|c| c == wanted || c == iri);
    if has(PROTEIN_CURIE, PROTEIN) {
        Some(Iri::new(PROTEIN))
    } else if has(INFORMATION_BIOMACROMOLECULE_CURIE, INFORMATION_BIOMACROMOLECULE) {
        Some(Iri::new(INFORMATION_BIOMACROMOLECULE))
    } else {
        None
    }
}

fn taxon_number(value: &str) -> &str {
    let value = value.trim();
    value
        .rsplit_once("NCBITaxon_")
        .or_else(|| value.rsplit_once("NCBITaxon:"))
        .map(|(_, n)| n)
        .unwrap_or(value)
}

/// Wire/file form of a [`LookupEntry`]; `id` may be a CURIE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupRecord {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub taxon: Option<String>,
    #[serde(default)]
    pub isa_closure: Vec<String>,
}

impl LookupRecord {
    pub fn into_entry(self, curies: &CurieMap) -> Result<LookupEntry, LookupError> {
        let id = curies.expand(&self.id).map_err(|e| LookupError::InvalidResponse {
            message: e.to_string(),
        })?;
        Ok(LookupEntry::new(id, self.label, self.kind, self.taxon, self.isa_closure))
    }
}

/// Resolves external identifiers. Unknown ids produce no entry.
pub trait LookupService: Send + Sync {
    /// Resolve many ids with one request. Works for zero ids.
    fn lookup_batch(&self, ids: &BTreeSet<Iri>) -> Result<BTreeMap<Iri, Vec<LookupEntry>>, LookupError>;

    fn lookup(&self, id: &Iri) -> Result<Vec<LookupEntry>, LookupError> {
        let ids = BTreeSet::from([id.clone()]);
        Ok(self.lookup_batch(&ids)?.remove(id).unwrap_or_default())
    }

    /// The first entry for `id` in the given taxon.
    fn lookup_with_taxon(&self, id: &Iri, taxon: &str) -> Result<Option<LookupEntry>, LookupError> {
        Ok(self.lookup(id)?.into_iter().find(|e| e.in_taxon(taxon)))
    }

    /// Short name for logs.
    fn name(&self) -> &str {
        "lookup"
    }
}

impl<T: LookupService + ?Sized> LookupService for Arc<T> {
    fn lookup_batch(&self, ids: &BTreeSet<Iri>) -> Result<BTreeMap<Iri, Vec<LookupEntry>>, LookupError> {
        (**self).lookup_batch(ids)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ---------------------------------------------------------------------------
// Static table
// ---------------------------------------------------------------------------

/// Lookup against a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticLookupService {
    entries: BTreeMap<Iri, Vec<LookupEntry>>,
}

impl StaticLookupService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: LookupEntry) {
        self.entries.entry(entry.id.clone()).or_default().push(entry);
    }

    pub fn with_entry(mut self, entry: LookupEntry) -> Self {
        self.insert(entry);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a JSON array of [`LookupRecord`]s.
    pub fn from_file(path: &Path, curies: &CurieMap) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let records: Vec<LookupRecord> = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut service = Self::new();
        for record in records {
            let entry = record.into_entry(curies).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            service.insert(entry);
        }
        tracing::info!(path = %path.display(), ids = service.len(), "loaded static lookup table");
        Ok(service)
    }
}

impl LookupService for StaticLookupService {
    fn lookup_batch(&self, ids: &BTreeSet<Iri>) -> Result<BTreeMap<Iri, Vec<LookupEntry>>, LookupError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| (id.clone(), e.clone())))
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoizes another service. Misses (unknown ids) are cached too.
///
/// When the cache reaches `capacity` ids it is cleared before new results
/// are inserted.
pub struct CachingLookupService {
    inner: Arc<dyn LookupService>,
    cache: DashMap<Iri, Vec<LookupEntry>>,
    capacity: usize,
}

impl CachingLookupService {
    pub fn new(inner: Arc<dyn LookupService>, capacity: usize) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl LookupService for CachingLookupService {
    fn lookup_batch(&self, ids: &BTreeSet<Iri>) -> Result<BTreeMap<Iri, Vec<LookupEntry>>, LookupError> {
        let mut found = BTreeMap::new();
        let mut missing = BTreeSet::new();
        for id in ids {
            match self.cache.get(id) {
                Some(hit) => {
                    if !hit.is_empty() {
                        found.insert(id.clone(), hit.value().clone());
                    }
                }
                None => {
                    missing.insert(id.clone());
                }
            }
        }
        if missing.is_empty() {
            return Ok(found);
        }
        let mut fetched = self.inner.lookup_batch(&missing)?;
        if self.cache.len() + missing.len() > self.capacity {
            tracing::debug!(cached = self.cache.len(), "lookup cache full, clearing");
            self.cache.clear();
        }
        for id in missing {
            let entries = fetched.remove(&id).unwrap_or_default();
            self.cache.insert(id.clone(), entries.clone());
            if !entries.is_empty() {
                found.insert(id, entries);
            }
        }
        Ok(found)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
