//! Identifiers: absolute IRIs and CURIE expansion.
//!
//! Every individual, class, property and model is named by an [`Iri`]. Clients
//! usually send compact CURIEs (`GO:0003674`); the [`CurieMap`] expands them
//! on the way in and compacts class identifiers on the way out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// OBO PURL namespace shared by most ontology prefixes.
pub const OBO_NS: &str = "http://purl.obolibrary.org/obo/";

/// An opaque absolute IRI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    /// Wrap a string that is already known to be an absolute IRI.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse an absolute IRI, rejecting relative or blank values.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let value = value.trim();
        let Some((scheme, rest)) = value.split_once(':') else {
            return Err(ModelError::InvalidIdentifier {
                value: value.to_string(),
                reason: "not an absolute IRI".into(),
            });
        };
        let scheme_ok = !scheme.is_empty()
            && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok || rest.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(ModelError::InvalidIdentifier {
                value: value.to_string(),
                reason: "not an absolute IRI".into(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this IRI lives under the given namespace prefix.
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.0.starts_with(namespace)
    }
}

impl std::fmt::Display for Iri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Iri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bidirectional prefix map for CURIE expansion and compaction.
#[derive(Debug, Clone)]
pub struct CurieMap {
    prefixes: BTreeMap<String, String>,
}

impl CurieMap {
    /// An empty map: only absolute IRIs are accepted.
    pub fn empty() -> Self {
        Self {
            prefixes: BTreeMap::new(),
        }
    }

    /// Register (or replace) a prefix.
    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    /// Extend with additional prefixes, overriding existing ones.
    pub fn with_prefixes<'a>(mut self, extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (prefix, namespace) in extra {
            self.insert(prefix.clone(), namespace.clone());
        }
        self
    }

    /// Expand a CURIE or pass through an absolute IRI.
    pub fn expand(&self, value: &str) -> Result<Iri, ModelError> {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") || value.starts_with("urn:") {
            return Iri::parse(value);
        }
        let Some((prefix, local)) = value.split_once(':') else {
            return Err(ModelError::InvalidIdentifier {
                value: value.to_string(),
                reason: "neither an IRI nor a CURIE".into(),
            });
        };
        match self.prefixes.get(prefix) {
            Some(namespace) if !local.is_empty() => Iri::parse(&format!("{namespace}{local}")),
            Some(_) => Err(ModelError::InvalidIdentifier {
                value: value.to_string(),
                reason: "empty local part".into(),
            }),
            None => Err(ModelError::InvalidIdentifier {
                value: value.to_string(),
                reason: format!("unknown prefix \"{prefix}\""),
            }),
        }
    }

    /// Compact an IRI to a CURIE using the longest matching namespace.
    ///
    /// Falls back to the full IRI when no namespace matches.
    pub fn compact(&self, iri: &Iri) -> String {
        self.prefixes
            .iter()
            .filter(|(_, ns)| iri.as_str().starts_with(ns.as_str()) && iri.as_str().len() > ns.len())
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{prefix}:{}", &iri.as_str()[ns.len()..]))
            .unwrap_or_else(|| iri.to_string())
    }
}

impl Default for CurieMap {
    /// The OBO prefixes used by causal-activity models.
    fn default() -> Self {
        let mut map = Self::empty();
        for prefix in [
            "GO", "CHEBI", "ECO", "RO", "BFO", "NCBITaxon", "UBERON", "CL", "PR", "SO",
        ] {
            map.insert(prefix, format!("{OBO_NS}{prefix}_"));
        }
        map.insert("obo", OBO_NS);
        map.insert("UniProtKB", "http://identifiers.org/uniprot/");
        map.insert("ZFIN", "http://identifiers.org/zfin/");
        map.insert("WB", "http://identifiers.org/wormbase/");
        map.insert("SGD", "http://identifiers.org/sgd/");
        map.insert("gomodel", "http://model.geneontology.org/");
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_obo_curie() {
        let curies = CurieMap::default();
        let iri = curies.expand("GO:0003674").unwrap();
        assert_eq!(iri.as_str(), "http://purl.obolibrary.org/obo/GO_0003674");
    }

    #[test]
    fn absolute_iri_passes_through() {
        let curies = CurieMap::default();
        let iri = curies.expand("http://example.org/x").unwrap();
        assert_eq!(iri.as_str(), "http://example.org/x");
    }

    #[test]
    fn unknown_prefix_rejected() {
        let curies = CurieMap::default();
        assert!(curies.expand("NOPE:1").is_err());
        assert!(curies.expand("no-colon").is_err());
    }

    #[test]
    fn compact_prefers_longest_namespace() {
        let curies = CurieMap::default();
        let iri = Iri::new("http://purl.obolibrary.org/obo/CHEBI_36080");
        assert_eq!(curies.compact(&iri), "CHEBI:36080");
        let other = Iri::new("http://example.org/y");
        assert_eq!(curies.compact(&other), "http://example.org/y");
    }

    #[test]
    fn parse_rejects_relative_values() {
        assert!(Iri::parse("relative/path").is_err());
        assert!(Iri::parse("1abc:x").is_err());
        assert!(Iri::parse("http://has space").is_err());
        assert!(Iri::parse("urn:x").is_ok());
    }
}
