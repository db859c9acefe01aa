//! Loads and holds the set of extraction schemas available to extractors.
//!
//! Schemas are declared as YAML files under one or more source directories,
//! mirroring the directory-of-modules loading contract the ingestion pipeline
//! this system replaces used for its entity type definitions: an optional
//! selector narrows a source to a comma-separated list of named
//! subdirectories; an absent selector loads everything under the directory,
//! recursively.

use crate::errors::{CoreError, CoreResult};
use crate::types::ExtractionSchema;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One configured schema source: a directory plus an optional subdirectory
/// selector.
#[derive(Debug, Clone)]
pub struct SchemaSource {
    pub directory: PathBuf,
    /// Comma-separated subdirectory names. Empty means "load the whole tree".
    pub selector: String,
}

impl SchemaSource {
    pub fn new(directory: impl Into<PathBuf>, selector: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            selector: selector.into(),
        }
    }

    pub fn whole_tree(directory: impl Into<PathBuf>) -> Self {
        Self::new(directory, "")
    }
}

/// The immutable, process-lifetime set of registered extraction schemas.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Arc<HashMap<String, ExtractionSchema>>,
}

impl SchemaRegistry {
    /// Load every source in order, plus the built-in root schemas when
    /// `include_root` is set. Later sources (and later files within a
    /// source) replace earlier ones by schema name; a replacement is logged
    /// at warn level, never treated as an error.
    pub fn load(
        sources: &[SchemaSource],
        include_root: bool,
        root_dir: &Path,
    ) -> CoreResult<Self> {
        let mut schemas = HashMap::new();

        if include_root {
            load_source(&SchemaSource::whole_tree(root_dir), &mut schemas)?;
        }
        for source in sources {
            load_source(source, &mut schemas)?;
        }

        Ok(Self {
            schemas: Arc::new(schemas),
        })
    }

    /// An empty registry, useful for tests and for servers started without
    /// any extraction schemas configured.
    pub fn empty() -> Self {
        Self {
            schemas: Arc::new(HashMap::new()),
        }
    }

    /// The full registered set.
    pub fn all(&self) -> Arc<HashMap<String, ExtractionSchema>> {
        Arc::clone(&self.schemas)
    }

    /// The subset matching the given names. Names with no matching schema
    /// are silently omitted.
    pub fn subset(&self, names: &[String]) -> HashMap<String, ExtractionSchema> {
        names
            .iter()
            .filter_map(|name| self.schemas.get(name).map(|s| (name.clone(), s.clone())))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn load_source(
    source: &SchemaSource,
    schemas: &mut HashMap<String, ExtractionSchema>,
) -> CoreResult<()> {
    let selector = source.selector.trim();
    if selector.is_empty() {
        load_tree(&source.directory, schemas)
    } else {
        for subdir_name in selector.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let subdir = source.directory.join(subdir_name);
            if !subdir.is_dir() {
                tracing::warn!(
                    directory = %subdir.display(),
                    "configured schema subdirectory does not exist, skipping"
                );
                continue;
            }
            load_tree(&subdir, schemas)?;
        }
        Ok(())
    }
}

fn load_tree(dir: &Path, schemas: &mut HashMap<String, ExtractionSchema>) -> CoreResult<()> {
    if !dir.is_dir() {
        return Err(CoreError::SchemaDirNotFound(dir.display().to_string()));
    }

    let mut entries: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .filter(|path| {
            !path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .starts_with('_')
        })
        .collect();
    entries.sort();

    for path in entries {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read schema file, skipping");
                continue;
            }
        };
        let schema: ExtractionSchema = match serde_yaml::from_str(&raw) {
            Ok(schema) => schema,
            Err(source) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %source,
                    "failed to parse schema file, skipping"
                );
                continue;
            }
        };

        if !schema.is_schema_shaped() {
            tracing::warn!(
                path = %path.display(),
                "schema file has no description or no fields, skipping"
            );
            continue;
        }

        if schemas.contains_key(&schema.name) {
            tracing::warn!(
                name = %schema.name,
                path = %path.display(),
                "duplicate schema name, replacing previously registered schema"
            );
        }
        schemas.insert(schema.name.clone(), schema);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_schema(dir: &Path, filename: &str, name: &str, description: &str) {
        let yaml = format!(
            "name: {name}\ndescription: {description}\nfields:\n  - name: value\n    type: string\n    required: true\n"
        );
        fs::write(dir.join(filename), yaml).unwrap();
    }

    #[test]
    fn loads_all_schemas_in_a_tree_when_selector_is_empty() {
        let tmp = TempDir::new().unwrap();
        write_schema(tmp.path(), "person.yaml", "Person", "A human being");
        fs::create_dir(tmp.path().join("nested")).unwrap();
        write_schema(
            &tmp.path().join("nested"),
            "org.yaml",
            "Organization",
            "A company or institution",
        );

        let registry =
            SchemaRegistry::load(&[SchemaSource::whole_tree(tmp.path())], false, Path::new("/nonexistent"))
                .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.names().contains(&"Person".to_string()));
        assert!(registry.names().contains(&"Organization".to_string()));
    }

    #[test]
    fn selector_narrows_to_named_subdirectories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("wanted")).unwrap();
        fs::create_dir(tmp.path().join("unwanted")).unwrap();
        write_schema(&tmp.path().join("wanted"), "a.yaml", "Alpha", "desc a");
        write_schema(&tmp.path().join("unwanted"), "b.yaml", "Beta", "desc b");

        let registry = SchemaRegistry::load(
            &[SchemaSource::new(tmp.path(), "wanted")],
            false,
            Path::new("/nonexistent"),
        )
        .unwrap();

        assert_eq!(registry.names(), vec!["Alpha".to_string()]);
    }

    #[test]
    fn missing_named_subdirectory_is_skipped_not_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("present")).unwrap();
        write_schema(&tmp.path().join("present"), "a.yaml", "Alpha", "desc a");

        let registry = SchemaRegistry::load(
            &[SchemaSource::new(tmp.path(), "present,missing")],
            false,
            Path::new("/nonexistent"),
        )
        .unwrap();

        assert_eq!(registry.names(), vec!["Alpha".to_string()]);
    }

    #[test]
    fn later_source_replaces_earlier_schema_with_same_name() {
        let tmp1 = TempDir::new().unwrap();
        let tmp2 = TempDir::new().unwrap();
        write_schema(tmp1.path(), "a.yaml", "Alpha", "first version");
        write_schema(tmp2.path(), "a.yaml", "Alpha", "second version");

        let registry = SchemaRegistry::load(
            &[
                SchemaSource::whole_tree(tmp1.path()),
                SchemaSource::whole_tree(tmp2.path()),
            ],
            false,
            Path::new("/nonexistent"),
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        let all = registry.all();
        assert_eq!(all.get("Alpha").unwrap().description, "second version");
    }

    #[test]
    fn schema_without_description_or_fields_is_not_registered() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.yaml"), "name: Empty\ndescription: \"\"\nfields: []\n").unwrap();

        let registry =
            SchemaRegistry::load(&[SchemaSource::whole_tree(tmp.path())], false, Path::new("/nonexistent"))
                .unwrap();

        assert!(registry.is_empty());
    }

    #[test]
    fn unparseable_schema_file_is_skipped_and_loading_continues() {
        let tmp = TempDir::new().unwrap();
        write_schema(tmp.path(), "a.yaml", "Alpha", "desc a");
        fs::write(tmp.path().join("broken.yaml"), "not: [valid, schema\n").unwrap();

        let registry =
            SchemaRegistry::load(&[SchemaSource::whole_tree(tmp.path())], false, Path::new("/nonexistent"))
                .unwrap();

        assert_eq!(registry.names(), vec!["Alpha".to_string()]);
    }

    #[test]
    fn subset_silently_omits_unknown_names() {
        let tmp = TempDir::new().unwrap();
        write_schema(tmp.path(), "a.yaml", "Alpha", "desc a");

        let registry =
            SchemaRegistry::load(&[SchemaSource::whole_tree(tmp.path())], false, Path::new("/nonexistent"))
                .unwrap();

        let subset = registry.subset(&["Alpha".to_string(), "Nonexistent".to_string()]);
        assert_eq!(subset.len(), 1);
        assert!(subset.contains_key("Alpha"));
    }
}
