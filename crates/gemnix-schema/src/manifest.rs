//! Gemset entries, their source descriptors, and atomic gemset files.

use crate::digest::is_base32;
use crate::nix::{to_nix, EncodeError};
use crate::parse::{parse_nix, ParseError};
use crate::value::{Mapping, Value, ValueError};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("gemset I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("gemset must be an attribute set, found {0}")]
    NotAMapping(&'static str),
    #[error("gemset entry '{name}' must be an attribute set, found {kind}")]
    InvalidEntry { name: String, kind: &'static str },
    #[error("gemset value error: {0}")]
    Value(#[from] ValueError),
    #[error("gemset encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("gemset parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Where a package's content is fetched from and how it is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Gem {
        remotes: Vec<String>,
        sha256: String,
    },
    Git {
        url: String,
        rev: String,
        sha256: String,
        fetch_submodules: bool,
    },
    Path {
        path: String,
    },
}

impl SourceDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::Gem { .. } => "gem",
            SourceDescriptor::Git { .. } => "git",
            SourceDescriptor::Path { .. } => "path",
        }
    }

    pub fn sha256(&self) -> Option<&str> {
        match self {
            SourceDescriptor::Gem { sha256, .. } | SourceDescriptor::Git { sha256, .. } => {
                Some(sha256)
            }
            SourceDescriptor::Path { .. } => None,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut m = Mapping::new();
        m.insert("type".to_owned(), self.kind().into());
        match self {
            SourceDescriptor::Gem { remotes, sha256 } => {
                m.insert("remotes".to_owned(), remotes.clone().into());
                m.insert("sha256".to_owned(), sha256.as_str().into());
            }
            SourceDescriptor::Git {
                url,
                rev,
                sha256,
                fetch_submodules,
            } => {
                m.insert("url".to_owned(), url.as_str().into());
                m.insert("rev".to_owned(), rev.as_str().into());
                m.insert("sha256".to_owned(), sha256.as_str().into());
                m.insert("fetchSubmodules".to_owned(), (*fetch_submodules).into());
            }
            SourceDescriptor::Path { path } => {
                m.insert("path".to_owned(), path.as_str().into());
            }
        }
        Value::Mapping(m)
    }
}

/// A freshly resolved gemset entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub version: String,
    pub source: SourceDescriptor,
    /// Only set when dependency tracking is on and the list is non-empty.
    pub dependencies: Option<Vec<String>>,
}

impl ManifestEntry {
    pub fn new(version: impl Into<String>, source: SourceDescriptor) -> Self {
        Self {
            version: version.into(),
            source,
            dependencies: None,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut m = Mapping::new();
        m.insert("version".to_owned(), self.version.as_str().into());
        m.insert("source".to_owned(), self.source.to_value());
        if let Some(deps) = &self.dependencies {
            m.insert("dependencies".to_owned(), deps.clone().into());
        }
        Value::Mapping(m)
    }
}

/// A previous entry is reusable only for the exact locked version and only when
/// its digest is already in base-32 form. Hex digests force re-resolution so
/// gemsets converge on a single encoding.
pub fn is_reusable(entry: &Value, version: &str) -> bool {
    entry.get("version").and_then(Value::as_text) == Some(version)
        && entry
            .get("source")
            .and_then(|s| s.get("sha256"))
            .and_then(Value::as_text)
            .is_some_and(is_base32)
}

/// Package name to entry, in emit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: IndexMap<String, Value>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a loaded gemset. Every entry must itself be an attribute set.
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let Value::Mapping(map) = value else {
            return Err(ManifestError::NotAMapping(value.kind()));
        };
        for (name, entry) in &map {
            if entry.as_mapping().is_none() {
                return Err(ManifestError::InvalidEntry {
                    name: name.clone(),
                    kind: entry.kind(),
                });
            }
        }
        Ok(Self { entries: map })
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, ManifestError> {
        Self::from_value(Value::from_json(json)?)
    }

    pub fn from_nix_str(input: &str) -> Result<Self, ManifestError> {
        Self::from_value(parse_nix(input)?)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Insert or overwrite. An overwritten key keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, entry: Value) {
        self.entries.insert(name.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Mapping(self.entries.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Mapping(self.entries)
    }

    pub fn to_nix(&self) -> Result<String, ManifestError> {
        Ok(to_nix(&self.to_value())?)
    }

    /// Serialize and atomically replace `path`. A failed encode leaves the file untouched.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref();
        let mut content = self.to_nix()?;
        content.push('\n');
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ManifestError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        Self::from_nix_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SHORT: &str = "0mdqa9w1p6cmli6976v4wi0sw9r4p5prkj7lzfd1877wk11c9c73";
    const LONG: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn gem_entry(version: &str, sha256: &str) -> Value {
        ManifestEntry::new(
            version,
            SourceDescriptor::Gem {
                remotes: vec!["https://rubygems.org".to_owned()],
                sha256: sha256.to_owned(),
            },
        )
        .to_value()
    }

    #[test]
    fn gem_entry_renders_in_field_order() {
        let mut entry = ManifestEntry::new(
            "13.0.1",
            SourceDescriptor::Gem {
                remotes: vec!["https://rubygems.org".to_owned()],
                sha256: SHORT.to_owned(),
            },
        );
        entry.dependencies = Some(vec!["rake".to_owned()]);
        let mut manifest = Manifest::new();
        manifest.insert("rails", entry.to_value());
        let expected = format!(
            "{{\n  rails = {{\n    version = \"13.0.1\";\n    source = {{\n      type = \"gem\";\n      remotes = [\"https://rubygems.org\"];\n      sha256 = \"{SHORT}\";\n    }};\n    dependencies = [\"rake\"];\n  }};\n}}"
        );
        assert_eq!(manifest.to_nix().unwrap(), expected);
    }

    #[test]
    fn git_source_fields() {
        let v = SourceDescriptor::Git {
            url: "https://github.com/rails/rails.git".to_owned(),
            rev: "abc".to_owned(),
            sha256: SHORT.to_owned(),
            fetch_submodules: false,
        }
        .to_value();
        let keys: Vec<&str> = v.as_mapping().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["type", "url", "rev", "sha256", "fetchSubmodules"]);
        assert_eq!(v.get("fetchSubmodules"), Some(&Value::Bool(false)));
    }

    #[test]
    fn path_source_has_no_digest() {
        let source = SourceDescriptor::Path {
            path: "engines/billing".to_owned(),
        };
        assert_eq!(source.sha256(), None);
        let entry = ManifestEntry::new("0.1.0", source).to_value();
        assert!(!is_reusable(&entry, "0.1.0"));
    }

    #[test]
    fn reusable_requires_version_and_short_digest() {
        assert!(is_reusable(&gem_entry("13.0.1", SHORT), "13.0.1"));
        assert!(!is_reusable(&gem_entry("13.0.1", SHORT), "13.0.2"));
        assert!(!is_reusable(&gem_entry("13.0.1", LONG), "13.0.1"));
        assert!(!is_reusable(&gem_entry("13.0.1", "sha256-47DEQpj8HBSa="), "13.0.1"));
    }

    #[test]
    fn from_json_keeps_loaded_entries() {
        let manifest = Manifest::from_json(json!({
            "rake": {"source": {"sha256": SHORT, "type": "gem"}, "version": "13.0.1"}
        }))
        .unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(is_reusable(manifest.get("rake").unwrap(), "13.0.1"));
    }

    #[test]
    fn from_value_rejects_non_mapping_entries() {
        let err = Manifest::from_json(json!({"rake": "13.0.1"})).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidEntry { .. }));
        let err = Manifest::from_json(json!(["rake"])).unwrap_err();
        assert!(matches!(err, ManifestError::NotAMapping("sequence")));
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut manifest = Manifest::new();
        manifest.insert("a", gem_entry("1", SHORT));
        manifest.insert("b", gem_entry("1", SHORT));
        manifest.insert("a", gem_entry("2", SHORT));
        assert_eq!(manifest.names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(
            manifest.get("a").and_then(|e| e.get("version")),
            Some(&Value::Text("2".to_owned()))
        );
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gemset.nix");
        let mut manifest = Manifest::new();
        manifest.insert("rake", gem_entry("13.0.1", SHORT));
        manifest.write_to_file(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        assert_eq!(Manifest::read_from_file(&path).unwrap(), manifest);
    }
}
