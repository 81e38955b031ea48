//! Optional per-project `gemnix.toml`.
//!
//! ```toml
//! [convert]
//! gemset = "nix/gemset.nix"
//! deps = true
//! jobs = 4
//!
//! [fetch]
//! resolver = "prefetch"
//! loader = "native"
//! gem_caches = ["vendor/cache"]
//! ```
//!
//! Relative paths are taken relative to the directory holding the file.

use gemnix_fetch::PrefetchSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "gemnix.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub convert: ConvertSection,
    #[serde(default)]
    pub fetch: FetchSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConvertSection {
    #[serde(default)]
    pub gemset: Option<PathBuf>,
    #[serde(default)]
    pub lockfile: Option<PathBuf>,
    #[serde(default)]
    pub deps: Option<bool>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub bootstrap: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FetchSection {
    #[serde(default)]
    pub resolver: Option<String>,
    #[serde(default)]
    pub loader: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub gem_caches: Vec<PathBuf>,
}

impl FetchSection {
    pub fn resolver_name(&self) -> &str {
        self.resolver.as_deref().unwrap_or("prefetch")
    }

    pub fn loader_name(&self) -> &str {
        self.loader.as_deref().unwrap_or("nix")
    }

    /// Prefetch settings; `vendor/cache` beside the lockfile is always searched first.
    pub fn prefetch_settings(&self, lockfile: &Path) -> PrefetchSettings {
        let mut settings = PrefetchSettings::default();
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir.clone_from(dir);
        }
        let lock_dir = lockfile.parent().unwrap_or(Path::new("."));
        settings.gem_caches.push(lock_dir.join("vendor/cache"));
        settings.gem_caches.extend(self.gem_caches.iter().cloned());
        settings
    }
}

impl ProjectConfig {
    pub fn parse_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::parse_str(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Load `gemnix.toml` from `dir` if present.
    pub fn discover(dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.convert.gemset.as_mut() {
            join(p);
        }
        if let Some(p) = self.convert.lockfile.as_mut() {
            join(p);
        }
        if let Some(p) = self.fetch.cache_dir.as_mut() {
            join(p);
        }
        self.fetch.gem_caches.iter_mut().for_each(join);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = ProjectConfig::parse_str(
            r#"
[convert]
gemset = "nix/gemset.nix"
lockfile = "Gemfile.lock"
deps = true
jobs = 4
bootstrap = "bundler"

[fetch]
resolver = "mock"
loader = "native"
cache_dir = "/var/cache/gems"
gem_caches = ["vendor/cache", "/opt/gems"]
"#,
        )
        .unwrap();
        assert_eq!(config.convert.deps, Some(true));
        assert_eq!(config.convert.jobs, Some(4));
        assert_eq!(config.fetch.resolver_name(), "mock");
        assert_eq!(config.fetch.loader_name(), "native");
        assert_eq!(config.fetch.gem_caches.len(), 2);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ProjectConfig::parse_str("").unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.fetch.resolver_name(), "prefetch");
        assert_eq!(config.fetch.loader_name(), "nix");
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(ProjectConfig::parse_str("[convert]\nquiet = true\n").is_err());
    }

    #[test]
    fn load_rebases_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[convert]\ngemset = \"nix/gemset.nix\"\n[fetch]\ngem_caches = [\"/abs\", \"rel\"]\n",
        )
        .unwrap();
        let config = ProjectConfig::discover(dir.path()).unwrap().unwrap();
        assert_eq!(config.convert.gemset, Some(dir.path().join("nix/gemset.nix")));
        assert_eq!(
            config.fetch.gem_caches,
            [PathBuf::from("/abs"), dir.path().join("rel")]
        );
    }

    #[test]
    fn discover_without_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::discover(dir.path()).unwrap().is_none());
    }

    #[test]
    fn prefetch_settings_search_vendor_cache_first() {
        let fetch = FetchSection {
            cache_dir: Some(PathBuf::from("/tmp/gemnix-cache")),
            gem_caches: vec![PathBuf::from("/opt/gems")],
            ..FetchSection::default()
        };
        let settings = fetch.prefetch_settings(Path::new("/src/app/Gemfile.lock"));
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/gemnix-cache"));
        assert_eq!(
            settings.gem_caches,
            [PathBuf::from("/src/app/vendor/cache"), PathBuf::from("/opt/gems")]
        );
    }
}
