use crate::resolver::SourceResolver;
use crate::FetchError;
use gemnix_schema::{nix_base32, LockSource, PackageSpec, SourceDescriptor};
use std::collections::HashSet;
use std::sync::Mutex;

/// Offline resolver with deterministic digests derived from name and version.
#[derive(Default)]
pub struct MockResolver {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make resolution of `name` fail.
    #[must_use]
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_owned());
        self
    }

    /// `name-version` of every resolved spec, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock call log poisoned").clone()
    }

    pub fn digest_for(name: &str, version: &str) -> String {
        let hash = blake3::hash(format!("mock:{name}-{version}").as_bytes());
        nix_base32(hash.as_bytes())
    }
}

impl SourceResolver for MockResolver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn resolve(&self, spec: &PackageSpec) -> Result<SourceDescriptor, FetchError> {
        self.calls
            .lock()
            .expect("mock call log poisoned")
            .push(format!("{}-{}", spec.name, spec.version));
        if self.failing.contains(&spec.name) {
            return Err(FetchError::ExecFailed(format!(
                "mock failure for {}",
                spec.full_name()
            )));
        }

        let sha256 = Self::digest_for(&spec.name, &spec.version);
        Ok(match &spec.source {
            LockSource::Gem { remotes } => SourceDescriptor::Gem {
                remotes: remotes
                    .iter()
                    .map(|r| r.trim_end_matches('/').to_owned())
                    .collect(),
                sha256,
            },
            LockSource::Git {
                remote,
                revision,
                submodules,
                ..
            } => SourceDescriptor::Git {
                url: remote.clone(),
                rev: revision.clone(),
                sha256,
                fetch_submodules: *submodules,
            },
            LockSource::Path { path } => SourceDescriptor::Path { path: path.clone() },
        })
    }
}
