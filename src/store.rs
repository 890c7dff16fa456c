//! File-backed model store.
//!
//! One pretty-printed JSON [`ModelDocument`] per model under `data_dir`.
//! File names are the model id with every byte outside `[A-Za-z0-9._-]`
//! percent-encoded, so distinct ids never share a file.

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::iri::Iri;
use crate::model::GraphModel;
use crate::model::export::ModelDocument;

pub struct FileModelStore {
    root: PathBuf,
}

impl FileModelStore {
    /// Open (and create if needed) a store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &Iri) -> PathBuf {
        let mut name = String::with_capacity(id.as_str().len());
        for byte in id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        self.root.join(format!("{name}.json"))
    }

    /// Write a model, replacing any previous version atomically.
    pub fn save(&self, model: &GraphModel) -> Result<PathBuf, StoreError> {
        let path = self.path_for(model.id());
        let json = serde_json::to_string_pretty(&ModelDocument::from_model(model))
            .map_err(|e| StoreError::Serialization { message: e.to_string() })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(model = %model.id(), path = %path.display(), "stored model");
        Ok(path)
    }

    pub fn load(&self, id: &Iri) -> Result<Option<GraphModel>, StoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    /// Every stored model. Unreadable files are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<GraphModel>, StoreError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.display().to_string(),
            source,
        })?;
        let mut models = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.root.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path) {
                Ok(model) => models.push(model),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unreadable model file"),
            }
        }
        models.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(models)
    }

    /// Delete a stored model. Returns whether a file existed.
    pub fn delete(&self, id: &Iri) -> Result<bool, StoreError> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn read(path: &Path) -> Result<GraphModel, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let document: ModelDocument =
            serde_json::from_str(&text).map_err(|e| StoreError::Serialization { message: e.to_string() })?;
        document
            .into_model()
            .map_err(|e| StoreError::Serialization { message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::diff::AnnotationTarget;
    use crate::model::{Annotation, Edge, Individual, TypeExpr};

    fn model(id: &str) -> GraphModel {
        let mut model = GraphModel::new(Iri::new(id));
        model.insert_annotation(&AnnotationTarget::Model, Annotation::new("title", "t"), 0);
        model.insert_individual(
            Individual::new(Iri::new(format!("{id}/i1"))).with_type(TypeExpr::class(Iri::new("http://purl.obolibrary.org/obo/GO_0003674"))),
        );
        model.insert_individual(Individual::new(Iri::new(format!("{id}/i2"))));
        model.insert_edge(Edge::new(
            Iri::new(format!("{id}/i1")),
            Iri::new("http://purl.obolibrary.org/obo/RO_0002333"),
            Iri::new(format!("{id}/i2")),
        ));
        model
    }

    #[test]
    fn save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        let m = model("http://model.example.org/0001");
        let path = store.save(&m).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("http%3A%2F%2Fmodel.example.org%2F0001"));
        assert_eq!(store.load(m.id()).unwrap(), Some(m.clone()));
        assert!(store.delete(m.id()).unwrap());
        assert!(!store.delete(m.id()).unwrap());
        assert_eq!(store.load(m.id()).unwrap(), None);
    }

    #[test]
    fn similar_ids_keep_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        let nested = model("http://model.example.org/a/b");
        let flat = model("http://model.example.org/a_b");
        let first = store.save(&nested).unwrap();
        let second = store.save(&flat).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.load(nested.id()).unwrap(), Some(nested));
        assert_eq!(store.load(flat.id()).unwrap(), Some(flat));
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn load_all_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        store.save(&model("http://model.example.org/b")).unwrap();
        store.save(&model("http://model.example.org/a")).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let models = store.load_all().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id().as_str(), "http://model.example.org/a");
    }
}
