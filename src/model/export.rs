//! Model serialization: a lossless JSON document and an N-Triples rendering.
//!
//! The JSON [`ModelDocument`] is what `store` writes to disk and what the
//! `json` export format returns. N-Triples is the interchange format: named
//! types become `rdf:type` triples, individual annotations become literal
//! triples and edges become plain triples. Anonymous type expressions and edge
//! annotations have no N-Triples rendering and are dropped there.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::iri::Iri;

use super::diff::AnnotationTarget;
use super::{Annotation, Edge, GraphModel, Individual, TypeExpr};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const OWL_ONTOLOGY: &str = "http://www.w3.org/2002/07/owl#Ontology";
const OWL_NAMED_INDIVIDUAL: &str = "http://www.w3.org/2002/07/owl#NamedIndividual";
const OWL_IMPORTS: &str = "http://www.w3.org/2002/07/owl#imports";
/// Namespace for annotation keys that are not IRIs themselves.
pub const ANNOTATION_NS: &str = "http://geneontology.org/lego/";

/// Export/import format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFormat {
    #[default]
    NTriples,
    Json,
}

impl ModelFormat {
    /// Parse the wire `format` argument. `None` selects N-Triples.
    pub fn parse(value: Option<&str>) -> Result<Self, ModelError> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("ntriples") | Some("n-triples") | Some("nt") => Ok(Self::NTriples),
            Some("json") => Ok(Self::Json),
            Some(other) => Err(ModelError::Import {
                message: format!("unsupported format \"{other}\""),
            }),
        }
    }
}

/// Flat, serializable form of a [`GraphModel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDocument {
    pub id: Iri,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub imports: BTreeSet<Iri>,
    #[serde(default)]
    pub individuals: Vec<Individual>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl ModelDocument {
    pub fn from_model(model: &GraphModel) -> Self {
        Self {
            id: model.id().clone(),
            annotations: model.annotations().to_vec(),
            imports: model.imports().clone(),
            individuals: model.individuals().cloned().collect(),
            edges: model.edges().collect(),
        }
    }

    /// Rebuild a model, validating edge endpoints.
    pub fn into_model(self) -> Result<GraphModel, ModelError> {
        self.into_model_with_id(None)
    }

    /// Rebuild under a different model id (used by `import`).
    pub fn into_model_with_id(self, id: Option<Iri>) -> Result<GraphModel, ModelError> {
        let mut model = GraphModel::new(id.unwrap_or(self.id));
        for annotation in self.annotations {
            let index = model.annotations().len();
            model.insert_annotation(&AnnotationTarget::Model, annotation, index);
        }
        model.replace_imports(self.imports);
        for individual in self.individuals {
            let id = individual.id.clone();
            if !model.insert_individual(individual) {
                return Err(ModelError::Import {
                    message: format!("duplicate individual {id}"),
                });
            }
        }
        for edge in self.edges {
            let key = edge.key.clone();
            if !model.insert_edge(edge) {
                return Err(ModelError::Import {
                    message: format!(
                        "edge {} {} {} references a missing individual or is duplicated",
                        key.subject, key.predicate, key.object
                    ),
                });
            }
        }
        Ok(model)
    }
}

/// Render a model in the given format.
pub fn export_model(model: &GraphModel, format: ModelFormat) -> Result<String, ModelError> {
    match format {
        ModelFormat::Json => serde_json::to_string_pretty(&ModelDocument::from_model(model)).map_err(|e| {
            ModelError::Import {
                message: format!("failed to serialize model: {e}"),
            }
        }),
        ModelFormat::NTriples => Ok(to_ntriples(model)),
    }
}

/// Parse model text. `id` overrides the model id found in the text.
pub fn import_model(text: &str, format: ModelFormat, id: Option<Iri>) -> Result<GraphModel, ModelError> {
    match format {
        ModelFormat::Json => {
            let document: ModelDocument = serde_json::from_str(text).map_err(|e| ModelError::Import {
                message: format!("invalid JSON model: {e}"),
            })?;
            document.into_model_with_id(id)
        }
        ModelFormat::NTriples => from_ntriples(text, id),
    }
}

fn annotation_predicate(key: &str) -> String {
    if Iri::parse(key).is_ok() && key.contains("://") {
        key.to_string()
    } else {
        format!("{ANNOTATION_NS}{key}")
    }
}

fn annotation_key(predicate: &str) -> String {
    predicate
        .strip_prefix(ANNOTATION_NS)
        .unwrap_or(predicate)
        .to_string()
}

fn to_ntriples(model: &GraphModel) -> String {
    let mut out = String::new();
    let m = model.id();
    let _ = writeln!(out, "<{m}> <{RDF_TYPE}> <{OWL_ONTOLOGY}> .");
    for import in model.imports() {
        let _ = writeln!(out, "<{m}> <{OWL_IMPORTS}> <{import}> .");
    }
    for annotation in model.annotations() {
        let _ = writeln!(
            out,
            "<{m}> <{}> \"{}\" .",
            annotation_predicate(&annotation.key),
            escape_literal(&annotation.value)
        );
    }
    for individual in model.individuals() {
        let id = &individual.id;
        let _ = writeln!(out, "<{id}> <{RDF_TYPE}> <{OWL_NAMED_INDIVIDUAL}> .");
        for class in individual.named_types() {
            let _ = writeln!(out, "<{id}> <{RDF_TYPE}> <{class}> .");
        }
        for annotation in &individual.annotations {
            let _ = writeln!(
                out,
                "<{id}> <{}> \"{}\" .",
                annotation_predicate(&annotation.key),
                escape_literal(&annotation.value)
            );
        }
    }
    for edge in model.edges() {
        let _ = writeln!(
            out,
            "<{}> <{}> <{}> .",
            edge.key.subject, edge.key.predicate, edge.key.object
        );
    }
    out
}

#[derive(Debug, PartialEq)]
enum Term {
    Iri(String),
    Literal(String),
}

fn from_ntriples(text: &str, id: Option<Iri>) -> Result<GraphModel, ModelError> {
    let mut triples = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let triple = parse_line(line).map_err(|message| ModelError::Import {
            message: format!("line {}: {message}", line_no + 1),
        })?;
        triples.push(triple);
    }

    let ontology_id = triples.iter().find_map(|(s, p, o)| {
        (p == RDF_TYPE && *o == Term::Iri(OWL_ONTOLOGY.to_string())).then(|| s.clone())
    });
    let model_id = match (id, ontology_id) {
        (Some(id), _) => id,
        (None, Some(found)) => Iri::parse(&found)?,
        (None, None) => {
            return Err(ModelError::Import {
                message: "no owl:Ontology declaration and no model id given".into(),
            });
        }
    };
    let declared: BTreeSet<String> = triples
        .iter()
        .filter(|(_, p, o)| p == RDF_TYPE && *o == Term::Iri(OWL_NAMED_INDIVIDUAL.to_string()))
        .map(|(s, _, _)| s.clone())
        .collect();

    let mut individuals: BTreeMap<String, Individual> = BTreeMap::new();
    for subject in &declared {
        individuals.insert(subject.clone(), Individual::new(Iri::parse(subject)?));
    }
    let mut model_annotations = Vec::new();
    let mut imports = BTreeSet::new();
    let mut edges = Vec::new();

    for (subject, predicate, object) in triples {
        // Triples about anything that is not a declared individual describe the model.
        let is_model = !declared.contains(&subject);
        match object {
            Term::Iri(object) if predicate == RDF_TYPE => {
                if object == OWL_NAMED_INDIVIDUAL || object == OWL_ONTOLOGY {
                    continue;
                }
                if let Some(individual) = individuals.get_mut(&subject) {
                    individual.types.insert(TypeExpr::class(Iri::parse(&object)?));
                }
            }
            Term::Iri(object) if predicate == OWL_IMPORTS && is_model => {
                imports.insert(Iri::parse(&object)?);
            }
            Term::Iri(object) => {
                if declared.contains(&subject) && declared.contains(&object) {
                    edges.push(Edge::new(
                        Iri::parse(&subject)?,
                        Iri::parse(&predicate)?,
                        Iri::parse(&object)?,
                    ));
                }
            }
            Term::Literal(value) => {
                let annotation = Annotation::new(annotation_key(&predicate), value);
                if let Some(individual) = individuals.get_mut(&subject) {
                    individual.annotations.push(annotation);
                } else if is_model {
                    model_annotations.push(annotation);
                }
            }
        }
    }

    ModelDocument {
        id: model_id,
        annotations: model_annotations,
        imports,
        individuals: individuals.into_values().collect(),
        edges,
    }
    .into_model()
}

fn parse_line(line: &str) -> Result<(String, String, Term), String> {
    let rest = line
        .strip_suffix('.')
        .ok_or_else(|| "missing terminating '.'".to_string())?
        .trim_end();
    let (subject, rest) = take_iri(rest)?;
    let (predicate, rest) = take_iri(rest.trim_start())?;
    let rest = rest.trim();
    let object = if rest.starts_with('<') {
        let (iri, tail) = take_iri(rest)?;
        if !tail.trim().is_empty() {
            return Err(format!("unexpected trailing text \"{}\"", tail.trim()));
        }
        Term::Iri(iri)
    } else if rest.starts_with('"') {
        Term::Literal(take_literal(rest)?)
    } else {
        return Err(format!("unsupported object term \"{rest}\""));
    };
    Ok((subject, predicate, object))
}

fn take_iri(input: &str) -> Result<(String, &str), String> {
    let body = input
        .strip_prefix('<')
        .ok_or_else(|| format!("expected IRI at \"{input}\""))?;
    let end = body.find('>').ok_or_else(|| "unterminated IRI".to_string())?;
    Ok((body[..end].to_string(), &body[end + 1..]))
}

/// Parse a quoted literal; datatype and language tags are accepted and ignored.
fn take_literal(input: &str) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = input[1..].chars();
    loop {
        match chars.next() {
            None => return Err("unterminated literal".into()),
            Some('"') => break,
            Some('\\') => match chars.next() {
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                other => return Err(format!("invalid escape {other:?}")),
            },
            Some(c) => value.push(c),
        }
    }
    Ok(value)
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Iri {
        Iri::new(format!("http://example.org/{s}"))
    }

    fn sample() -> GraphModel {
        let mut model = GraphModel::new(iri("m1"));
        model.insert_annotation(&AnnotationTarget::Model, Annotation::new("title", "kinase \"A\""), 0);
        model.replace_imports([iri("go-lego")].into_iter().collect());
        model.insert_individual(
            Individual::new(iri("a"))
                .with_type(TypeExpr::class(iri("GO_0004672")))
                .with_annotation(Annotation::new("comment", "line1\nline2")),
        );
        model.insert_individual(Individual::new(iri("b")).with_type(TypeExpr::class(iri("GO_0005634"))));
        model.insert_edge(Edge::new(iri("a"), iri("occurs_in"), iri("b")));
        model
    }

    #[test]
    fn ntriples_preserves_named_content() {
        let model = sample();
        let text = export_model(&model, ModelFormat::NTriples).unwrap();
        let back = import_model(&text, ModelFormat::NTriples, None).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn json_preserves_anonymous_types() {
        let mut model = sample();
        model.insert_type(
            &iri("a"),
            TypeExpr::SomeValuesFrom {
                property: iri("enabled_by"),
                filler: Box::new(TypeExpr::class(iri("UniProt_P1"))),
            },
        );
        let text = export_model(&model, ModelFormat::Json).unwrap();
        let back = import_model(&text, ModelFormat::Json, Some(iri("m2"))).unwrap();
        assert_eq!(back.id(), &iri("m2"));
        assert_eq!(back.individual(&iri("a")), model.individual(&iri("a")));
    }

    #[test]
    fn ntriples_without_ontology_needs_id() {
        let text = "<http://example.org/a> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2002/07/owl#NamedIndividual> .\n";
        assert!(import_model(text, ModelFormat::NTriples, None).is_err());
        let model = import_model(text, ModelFormat::NTriples, Some(iri("m"))).unwrap();
        assert_eq!(model.individual_count(), 1);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = import_model("<a> <b> oops .\n", ModelFormat::NTriples, Some(iri("m"))).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn format_parsing() {
        assert_eq!(ModelFormat::parse(None).unwrap(), ModelFormat::NTriples);
        assert_eq!(ModelFormat::parse(Some("JSON")).unwrap(), ModelFormat::Json);
        assert!(ModelFormat::parse(Some("turtle")).is_err());
    }
}
