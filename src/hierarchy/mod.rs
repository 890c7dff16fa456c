//! Class hierarchy: the read-only subclass/superclass oracle.
//!
//! Inference and validation never parse ontologies themselves; they ask a
//! [`HierarchyOracle`] for closures. [`ClassHierarchy`] is the in-memory
//! implementation, backed by two `petgraph` graphs (classes and properties)
//! with edges pointing from child to parent. It is loaded from a small JSON
//! document (see [`HierarchyDocument`]) and is immutable afterwards, so it is
//! shared between threads behind an `Arc` without locking.

pub mod module;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ModelError};
use crate::iri::{CurieMap, Iri};

pub use module::{HierarchyModule, ModuleExtractor};

/// `owl:Thing`.
pub const OWL_THING: &str = "http://www.w3.org/2002/07/owl#Thing";
/// `owl:Nothing`: an individual typed with it makes the model inconsistent.
pub const OWL_NOTHING: &str = "http://www.w3.org/2002/07/owl#Nothing";

/// Object properties relate individuals; data properties carry literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    Object,
    Data,
}

/// What the hierarchy knows about a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub id: Iri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub parents: Vec<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Iri>,
    #[serde(default)]
    pub kind: PropertyKind,
}

impl PropertyInfo {
    pub fn new(id: Iri) -> Self {
        Self {
            id,
            label: None,
            parents: Vec::new(),
            domain: None,
            range: None,
            kind: PropertyKind::Object,
        }
    }
}

/// Read-only closure queries over a class hierarchy.
///
/// Implementations must be cheap to query concurrently; the inference
/// pipeline calls them from blocking worker threads.
pub trait HierarchyOracle: Send + Sync {
    fn contains_class(&self, class: &Iri) -> bool;

    /// Reflexive-transitive superclasses. Unknown classes yield `{class}`.
    fn ancestors(&self, class: &Iri) -> BTreeSet<Iri>;

    /// Reflexive-transitive subclasses. Unknown classes yield `{class}`.
    fn descendants(&self, class: &Iri) -> BTreeSet<Iri>;

    fn direct_parents(&self, class: &Iri) -> Vec<Iri>;

    /// Classes declared disjoint with `class` (symmetric, not inherited).
    fn disjoint_with(&self, class: &Iri) -> Vec<Iri>;

    fn label(&self, id: &Iri) -> Option<String>;

    fn property(&self, id: &Iri) -> Option<PropertyInfo>;

    /// Reflexive-transitive super-properties.
    fn property_ancestors(&self, id: &Iri) -> BTreeSet<Iri>;

    /// Every known property, ordered by id.
    fn properties(&self) -> Vec<PropertyInfo>;
}

/// Counts reported by `causeway hierarchy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HierarchyStats {
    pub classes: usize,
    pub subclass_axioms: usize,
    pub disjoint_pairs: usize,
    pub properties: usize,
}

/// In-memory hierarchy over `petgraph` graphs.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: DiGraph<Iri, ()>,
    class_index: HashMap<Iri, NodeIndex>,
    labels: HashMap<Iri, String>,
    disjoint: BTreeMap<Iri, BTreeSet<Iri>>,
    property_graph: DiGraph<Iri, ()>,
    property_index: HashMap<Iri, NodeIndex>,
    properties: BTreeMap<Iri, PropertyInfo>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    fn class_node(&mut self, class: &Iri) -> NodeIndex {
        if let Some(idx) = self.class_index.get(class) {
            return *idx;
        }
        let idx = self.classes.add_node(class.clone());
        self.class_index.insert(class.clone(), idx);
        idx
    }

    fn property_node(&mut self, property: &Iri) -> NodeIndex {
        if let Some(idx) = self.property_index.get(property) {
            return *idx;
        }
        let idx = self.property_graph.add_node(property.clone());
        self.property_index.insert(property.clone(), idx);
        idx
    }

    /// Declare a class, optionally labelled.
    pub fn add_class(&mut self, class: &Iri, label: Option<&str>) {
        self.class_node(class);
        if let Some(label) = label {
            self.labels.insert(class.clone(), label.to_string());
        }
    }

    /// Assert `child SubClassOf parent`, declaring both classes.
    pub fn add_subclass(&mut self, child: &Iri, parent: &Iri) {
        let c = self.class_node(child);
        let p = self.class_node(parent);
        if c != p && self.classes.find_edge(c, p).is_none() {
            self.classes.add_edge(c, p, ());
        }
    }

    /// Assert that two classes share no instances.
    pub fn add_disjoint(&mut self, a: &Iri, b: &Iri) {
        self.class_node(a);
        self.class_node(b);
        self.disjoint.entry(a.clone()).or_default().insert(b.clone());
        self.disjoint.entry(b.clone()).or_default().insert(a.clone());
    }

    /// Declare a property with its direct parents, domain and range.
    pub fn add_property(&mut self, info: PropertyInfo) {
        let node = self.property_node(&info.id);
        for parent in &info.parents {
            let p = self.property_node(parent);
            if p != node && self.property_graph.find_edge(node, p).is_none() {
                self.property_graph.add_edge(node, p, ());
            }
        }
        if let Some(label) = &info.label {
            self.labels.insert(info.id.clone(), label.clone());
        }
        for class in info.domain.iter().chain(info.range.iter()) {
            self.class_node(class);
        }
        self.properties.insert(info.id.clone(), info);
    }

    pub fn class_count(&self) -> usize {
        self.classes.node_count()
    }

    pub fn stats(&self) -> HierarchyStats {
        HierarchyStats {
            classes: self.classes.node_count(),
            subclass_axioms: self.classes.edge_count(),
            disjoint_pairs: self.disjoint.values().map(BTreeSet::len).sum::<usize>() / 2,
            properties: self.properties.len(),
        }
    }

    /// Build from a parsed document, expanding CURIEs.
    pub fn from_document(document: HierarchyDocument, curies: &CurieMap) -> Result<Self, ModelError> {
        let mut hierarchy = Self::new();
        for record in &document.classes {
            let id = curies.expand(&record.id)?;
            hierarchy.add_class(&id, record.label.as_deref());
            for parent in &record.parents {
                hierarchy.add_subclass(&id, &curies.expand(parent)?);
            }
            for other in &record.disjoint_with {
                hierarchy.add_disjoint(&id, &curies.expand(other)?);
            }
        }
        for record in document.properties {
            let mut info = PropertyInfo::new(curies.expand(&record.id)?);
            info.label = record.label;
            info.kind = record.kind;
            info.parents = record
                .parents
                .iter()
                .map(|p| curies.expand(p))
                .collect::<Result<_, _>>()?;
            info.domain = record.domain.as_deref().map(|d| curies.expand(d)).transpose()?;
            info.range = record.range.as_deref().map(|r| curies.expand(r)).transpose()?;
            hierarchy.add_property(info);
        }
        Ok(hierarchy)
    }

    /// Load a JSON hierarchy file.
    pub fn load(path: &Path, curies: &CurieMap) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let document: HierarchyDocument = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let hierarchy = Self::from_document(document, curies).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(
            path = %path.display(),
            classes = hierarchy.class_count(),
            properties = hierarchy.properties.len(),
            "loaded class hierarchy"
        );
        Ok(hierarchy)
    }

    fn closure(graph: &DiGraph<Iri, ()>, index: &HashMap<Iri, NodeIndex>, start: &Iri, up: bool) -> BTreeSet<Iri> {
        let Some(&idx) = index.get(start) else {
            return BTreeSet::from([start.clone()]);
        };
        let mut out = BTreeSet::new();
        if up {
            let mut bfs = Bfs::new(graph, idx);
            while let Some(nx) = bfs.next(graph) {
                out.insert(graph[nx].clone());
            }
        } else {
            let reversed = Reversed(graph);
            let mut bfs = Bfs::new(reversed, idx);
            while let Some(nx) = bfs.next(reversed) {
                out.insert(graph[nx].clone());
            }
        }
        out
    }
}

impl HierarchyOracle for ClassHierarchy {
    fn contains_class(&self, class: &Iri) -> bool {
        self.class_index.contains_key(class)
    }

    fn ancestors(&self, class: &Iri) -> BTreeSet<Iri> {
        Self::closure(&self.classes, &self.class_index, class, true)
    }

    fn descendants(&self, class: &Iri) -> BTreeSet<Iri> {
        Self::closure(&self.classes, &self.class_index, class, false)
    }

    fn direct_parents(&self, class: &Iri) -> Vec<Iri> {
        let Some(&idx) = self.class_index.get(class) else {
            return Vec::new();
        };
        let mut parents: Vec<Iri> = self
            .classes
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.classes[n].clone())
            .collect();
        parents.sort();
        parents
    }

    fn disjoint_with(&self, class: &Iri) -> Vec<Iri> {
        self.disjoint
            .get(class)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn label(&self, id: &Iri) -> Option<String> {
        self.labels.get(id).cloned()
    }

    fn property(&self, id: &Iri) -> Option<PropertyInfo> {
        self.properties.get(id).cloned()
    }

    fn property_ancestors(&self, id: &Iri) -> BTreeSet<Iri> {
        Self::closure(&self.property_graph, &self.property_index, id, true)
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        self.properties.values().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// JSON document
// ---------------------------------------------------------------------------

/// On-disk hierarchy format.
///
/// ```json
/// {
///   "classes": [
///     {"id": "CHEBI:36080", "label": "protein", "parents": ["CHEBI:33695"]}
///   ],
///   "properties": [
///     {"id": "RO:0002333", "label": "enabled by", "domain": "GO:0003674"}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyDocument {
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub properties: Vec<PropertyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassRecord {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub disjoint_with: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PropertyRecord {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub kind: PropertyKind,
}
