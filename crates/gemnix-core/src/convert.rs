use crate::config::ConvertSection;
use crate::merge::{merge, plan, CacheDecision, MergeOptions, StaleReason};
use crate::CoreError;
use gemnix_fetch::{ManifestLoader, SourceResolver};
use gemnix_schema::{parse_lockfile_file, Manifest, BOOTSTRAP_GEM};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-run settings, built once and never mutated during a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Previous gemset to reuse entries from; the caller overwrites it afterwards.
    pub gemset: PathBuf,
    pub lockfile: PathBuf,
    /// Record runtime dependencies of freshly resolved gems.
    pub deps: bool,
    /// Demote the conversion summary from `info` to `debug`; never changes the gemset.
    pub quiet: bool,
    pub jobs: usize,
    pub bootstrap: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            gemset: PathBuf::from("./gemset.nix"),
            lockfile: PathBuf::from("./Gemfile.lock"),
            deps: false,
            quiet: false,
            jobs: 1,
            bootstrap: BOOTSTRAP_GEM.to_owned(),
        }
    }
}

impl ConvertOptions {
    /// Defaults overridden by the `[convert]` section of a project config.
    pub fn from_config(section: &ConvertSection) -> Self {
        let defaults = Self::default();
        Self {
            gemset: section.gemset.clone().unwrap_or(defaults.gemset),
            lockfile: section.lockfile.clone().unwrap_or(defaults.lockfile),
            deps: section.deps.unwrap_or(defaults.deps),
            quiet: defaults.quiet,
            jobs: section.jobs.unwrap_or(defaults.jobs).max(1),
            bootstrap: section.bootstrap.clone().unwrap_or(defaults.bootstrap),
        }
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            track_dependencies: self.deps,
            bootstrap: self.bootstrap.clone(),
            jobs: self.jobs.max(1),
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug)]
pub struct Conversion {
    pub manifest: Manifest,
    pub reused: usize,
    pub resolved: usize,
}

/// What a conversion would do for one package, without resolving anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPackage {
    pub name: String,
    pub version: String,
    pub source: &'static str,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StaleReason>,
}

/// Load previous gemset, parse the lockfile, merge.
pub struct Converter {
    loader: Box<dyn ManifestLoader>,
    resolver: Box<dyn SourceResolver>,
}

impl Converter {
    pub fn new(loader: Box<dyn ManifestLoader>, resolver: Box<dyn SourceResolver>) -> Self {
        Self { loader, resolver }
    }

    pub fn resolver(&self) -> &dyn SourceResolver {
        self.resolver.as_ref()
    }

    pub fn load_previous(&self, options: &ConvertOptions) -> Result<Manifest, CoreError> {
        let previous = self.loader.load(&options.gemset)?;
        debug!(
            "loaded {} previous entries from {} via {}",
            previous.len(),
            options.gemset.display(),
            self.loader.name()
        );
        Ok(previous)
    }

    pub fn plan(&self, options: &ConvertOptions) -> Result<Vec<PlannedPackage>, CoreError> {
        let previous = self.load_previous(options)?;
        let lock = parse_lockfile_file(&options.lockfile)?;
        Ok(plan(&previous, &lock.specs)
            .into_iter()
            .map(|p| {
                let (action, reason) = match p.decision {
                    CacheDecision::Reuse => ("reuse", None),
                    CacheDecision::Resolve(reason) => ("resolve", Some(reason)),
                };
                PlannedPackage {
                    name: p.spec.name.clone(),
                    version: p.spec.version.clone(),
                    source: p.spec.source.kind(),
                    action,
                    reason,
                }
            })
            .collect())
    }

    pub fn convert(&self, options: &ConvertOptions) -> Result<Conversion, CoreError> {
        let previous = self.load_previous(options)?;
        let lock = parse_lockfile_file(&options.lockfile)?;
        if let Some(version) = &lock.bundled_with {
            debug!("lockfile bundled with bundler {version}");
        }

        let resolved = plan(&previous, &lock.specs)
            .iter()
            .filter(|p| p.decision != CacheDecision::Reuse)
            .count();
        let summary = format!(
            "{} specs in {}, {resolved} to resolve with {}",
            lock.specs.len(),
            options.lockfile.display(),
            self.resolver.name()
        );
        if options.quiet {
            debug!("{summary}");
        } else {
            info!("{summary}");
        }

        let manifest = merge(
            &previous,
            &lock.specs,
            &options.merge_options(),
            self.resolver.as_ref(),
        )?;
        Ok(Conversion {
            reused: lock.specs.len() - resolved,
            resolved,
            manifest,
        })
    }
}

/// Serialize and atomically replace the gemset.
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), CoreError> {
    manifest.write_to_file(path)?;
    info!("wrote {} entries to {}", manifest.len(), path.display());
    Ok(())
}
