//! Resolution cache merge.
//!
//! Specs are walked in reverse lockfile order and inserted into an
//! order-preserving map, so on a name collision the last write wins and keeps
//! the position of the first. Bundler lists `GIT` and `PATH` sections before
//! `GEM`, which puts rubygems entries first in the output.
//!
//! The merge runs in two phases. Every spec is classified against the previous
//! gemset and misses are resolved (optionally in parallel); insertion then
//! happens serially in walk order, so output never depends on resolver timing.

use crate::CoreError;
use gemnix_fetch::SourceResolver;
use gemnix_schema::{is_reusable, Manifest, ManifestEntry, PackageSpec, Value, BOOTSTRAP_GEM};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Record each gem's runtime dependencies.
    pub track_dependencies: bool,
    /// Dependency name never recorded.
    pub bootstrap: String,
    /// Worker threads for resolving misses; `1` resolves inline.
    pub jobs: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            track_dependencies: false,
            bootstrap: BOOTSTRAP_GEM.to_owned(),
            jobs: 1,
        }
    }
}

/// Why a previous entry could not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaleReason {
    Missing,
    VersionChanged,
    DigestFormat,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StaleReason::Missing => "not in previous gemset",
            StaleReason::VersionChanged => "version changed",
            StaleReason::DigestFormat => "digest not in base-32 form",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Reuse,
    Resolve(StaleReason),
}

/// One spec in walk order with its cache decision.
#[derive(Debug, Clone, Copy)]
pub struct PlanEntry<'a> {
    pub spec: &'a PackageSpec,
    pub decision: CacheDecision,
    cached: Option<&'a Value>,
}

pub fn classify(previous: &Manifest, spec: &PackageSpec) -> CacheDecision {
    match previous.get(&spec.name) {
        None => CacheDecision::Resolve(StaleReason::Missing),
        Some(entry) if is_reusable(entry, &spec.version) => CacheDecision::Reuse,
        Some(entry)
            if entry.get("version").and_then(Value::as_text) != Some(spec.version.as_str()) =>
        {
            CacheDecision::Resolve(StaleReason::VersionChanged)
        }
        Some(_) => CacheDecision::Resolve(StaleReason::DigestFormat),
    }
}

/// Classify every spec, in reverse lockfile order.
pub fn plan<'a>(previous: &'a Manifest, specs: &'a [PackageSpec]) -> Vec<PlanEntry<'a>> {
    specs
        .iter()
        .rev()
        .map(|spec| {
            let decision = classify(previous, spec);
            let cached = match decision {
                CacheDecision::Reuse => previous.get(&spec.name),
                CacheDecision::Resolve(_) => None,
            };
            PlanEntry {
                spec,
                decision,
                cached,
            }
        })
        .collect()
}

/// Build the new gemset from `specs`, reusing valid entries of `previous` verbatim.
///
/// Any resolver failure aborts the whole merge; no partial gemset is returned.
pub fn merge(
    previous: &Manifest,
    specs: &[PackageSpec],
    options: &MergeOptions,
    resolver: &dyn SourceResolver,
) -> Result<Manifest, CoreError> {
    let planned = plan(previous, specs);

    let entries: Vec<Value> = if options.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()
            .map_err(|e| CoreError::ThreadPool(e.to_string()))?;
        pool.install(|| {
            planned
                .par_iter()
                .map(|p| build_entry(p, options, resolver))
                .collect::<Result<Vec<_>, _>>()
        })?
    } else {
        planned
            .iter()
            .map(|p| build_entry(p, options, resolver))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut manifest = Manifest::new();
    for (p, entry) in planned.iter().zip(entries) {
        manifest.insert(p.spec.name.clone(), entry);
    }
    Ok(manifest)
}

fn build_entry(
    planned: &PlanEntry<'_>,
    options: &MergeOptions,
    resolver: &dyn SourceResolver,
) -> Result<Value, CoreError> {
    let spec = planned.spec;
    if let Some(cached) = planned.cached {
        debug!("reusing {} ({})", spec.name, spec.version);
        return Ok(cached.clone());
    }
    if let CacheDecision::Resolve(reason) = planned.decision {
        info!("resolving {} ({}): {reason}", spec.name, spec.version);
    }

    let source = resolver
        .resolve(spec)
        .map_err(|source| CoreError::Resolve {
            name: spec.name.clone(),
            version: spec.version.clone(),
            source,
        })?;
    let mut entry = ManifestEntry::new(spec.version.clone(), source);
    if options.track_dependencies {
        let deps = spec.dependencies_without(&options.bootstrap);
        if !deps.is_empty() {
            entry.dependencies = Some(deps);
        }
    }
    Ok(entry.to_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemnix_fetch::MockResolver;
    use gemnix_schema::{to_nix, LockSource, SourceDescriptor};

    const SHORT: &str = "0mdqa9w1p6cmli6976v4wi0sw9r4p5prkj7lzfd1877wk11c9c73";
    const LONG: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn gem(name: &str, version: &str, deps: &[&str]) -> PackageSpec {
        PackageSpec {
            name: name.to_owned(),
            version: version.to_owned(),
            platform: None,
            dependencies: deps.iter().map(|d| (*d).to_owned()).collect(),
            source: LockSource::Gem {
                remotes: vec!["https://rubygems.org/".to_owned()],
            },
        }
    }

    fn cached(version: &str, sha256: &str) -> Value {
        ManifestEntry::new(
            version,
            SourceDescriptor::Gem {
                remotes: vec!["https://mirror.example.com".to_owned()],
                sha256: sha256.to_owned(),
            },
        )
        .to_value()
    }

    fn tracking() -> MergeOptions {
        MergeOptions {
            track_dependencies: true,
            ..MergeOptions::default()
        }
    }

    #[test]
    fn reverse_walk_orders_output() {
        let specs = vec![gem("rake", "13.0.1", &[]), gem("rails", "7.0.0", &["rake", "bundler"])];
        let resolver = MockResolver::new();
        let out = merge(&Manifest::new(), &specs, &tracking(), &resolver).unwrap();

        assert_eq!(resolver.calls(), ["rails-7.0.0", "rake-13.0.1"]);
        assert_eq!(out.names().collect::<Vec<_>>(), ["rails", "rake"]);
        let deps = out.get("rails").and_then(|e| e.get("dependencies")).unwrap();
        assert_eq!(deps, &Value::from(vec!["rake".to_owned()]));
        assert!(out.get("rake").and_then(|e| e.get("dependencies")).is_none());
    }

    #[test]
    fn reuses_valid_entry_verbatim() {
        let mut previous = Manifest::new();
        previous.insert("rake", cached("13.0.1", SHORT));
        let resolver = MockResolver::new();
        let out = merge(&previous, &[gem("rake", "13.0.1", &[])], &tracking(), &resolver).unwrap();

        assert!(resolver.calls().is_empty());
        assert_eq!(out.get("rake"), previous.get("rake"));
    }

    #[test]
    fn version_change_forces_resolution() {
        let mut previous = Manifest::new();
        previous.insert("rake", cached("13.0.0", SHORT));
        let resolver = MockResolver::new();
        let out = merge(&previous, &[gem("rake", "13.0.1", &[])], &tracking(), &resolver).unwrap();

        assert_eq!(resolver.calls(), ["rake-13.0.1"]);
        assert_eq!(
            out.get("rake").and_then(|e| e.get("version")),
            Some(&Value::from("13.0.1"))
        );
    }

    #[test]
    fn hex_digest_forces_resolution() {
        let mut previous = Manifest::new();
        previous.insert("rake", cached("13.0.1", LONG));
        let resolver = MockResolver::new();
        let out = merge(&previous, &[gem("rake", "13.0.1", &[])], &tracking(), &resolver).unwrap();

        assert_eq!(resolver.calls(), ["rake-13.0.1"]);
        assert_ne!(out.get("rake"), previous.get("rake"));
    }

    #[test]
    fn bootstrap_only_dependencies_omit_field() {
        let resolver = MockResolver::new();
        let specs = vec![gem("foo", "1.0", &["bundler"]), gem("bar", "1.0", &["bundler", "foo"])];
        let out = merge(&Manifest::new(), &specs, &tracking(), &resolver).unwrap();
        assert!(out.get("foo").and_then(|e| e.get("dependencies")).is_none());
        assert_eq!(
            out.get("bar").and_then(|e| e.get("dependencies")),
            Some(&Value::from(vec!["foo".to_owned()]))
        );
    }

    #[test]
    fn dependencies_omitted_without_tracking() {
        let resolver = MockResolver::new();
        let specs = vec![gem("bar", "1.0", &["foo"])];
        let out = merge(&Manifest::new(), &specs, &MergeOptions::default(), &resolver).unwrap();
        assert!(out.get("bar").and_then(|e| e.get("dependencies")).is_none());
    }

    #[test]
    fn duplicate_names_keep_first_in_lockfile_order() {
        let resolver = MockResolver::new();
        let specs = vec![
            gem("nokogiri", "1.13.8", &[]),
            gem("rake", "13.0.1", &[]),
            gem("nokogiri", "1.13.7", &[]),
        ];
        let out = merge(&Manifest::new(), &specs, &tracking(), &resolver).unwrap();
        assert_eq!(out.names().collect::<Vec<_>>(), ["nokogiri", "rake"]);
        assert_eq!(
            out.get("nokogiri").and_then(|e| e.get("version")),
            Some(&Value::from("1.13.8"))
        );
    }

    #[test]
    fn resolver_failure_aborts_merge() {
        let resolver = MockResolver::new().failing("rails");
        let specs = vec![gem("rake", "13.0.1", &[]), gem("rails", "7.0.0", &[])];
        let err = merge(&Manifest::new(), &specs, &tracking(), &resolver).unwrap_err();
        match err {
            CoreError::Resolve { name, version, .. } => {
                assert_eq!(name, "rails");
                assert_eq!(version, "7.0.0");
            }
            other => panic!("expected resolve error, got {other}"),
        }
    }

    #[test]
    fn parallel_merge_matches_serial() {
        let specs: Vec<PackageSpec> = (0..40)
            .map(|i| gem(&format!("gem{i}"), "1.0.0", &["bundler", "rake"]))
            .collect();
        let serial = merge(&Manifest::new(), &specs, &tracking(), &MockResolver::new()).unwrap();
        let parallel = merge(
            &Manifest::new(),
            &specs,
            &MergeOptions {
                jobs: 8,
                ..tracking()
            },
            &MockResolver::new(),
        )
        .unwrap();
        assert_eq!(
            to_nix(&serial.into_value()).unwrap(),
            to_nix(&parallel.into_value()).unwrap()
        );
    }

    #[test]
    fn parallel_failure_aborts_merge() {
        let specs: Vec<PackageSpec> = (0..10).map(|i| gem(&format!("gem{i}"), "1.0.0", &[])).collect();
        let resolver = MockResolver::new().failing("gem3");
        let options = MergeOptions {
            jobs: 4,
            ..tracking()
        };
        assert!(merge(&Manifest::new(), &specs, &options, &resolver).is_err());
    }

    #[test]
    fn plan_classifies_in_reverse_order() {
        let mut previous = Manifest::new();
        previous.insert("a", cached("1.0", SHORT));
        previous.insert("b", cached("1.0", SHORT));
        previous.insert("c", cached("1.0", LONG));
        let specs = vec![
            gem("a", "1.0", &[]),
            gem("b", "2.0", &[]),
            gem("c", "1.0", &[]),
            gem("d", "1.0", &[]),
        ];
        let decisions: Vec<(&str, CacheDecision)> = plan(&previous, &specs)
            .iter()
            .map(|p| (p.spec.name.as_str(), p.decision))
            .collect();
        assert_eq!(
            decisions,
            [
                ("d", CacheDecision::Resolve(StaleReason::Missing)),
                ("c", CacheDecision::Resolve(StaleReason::DigestFormat)),
                ("b", CacheDecision::Resolve(StaleReason::VersionChanged)),
                ("a", CacheDecision::Reuse),
            ]
        );
    }
}
