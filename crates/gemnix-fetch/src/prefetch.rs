use crate::resolver::SourceResolver;
use crate::{capture, FetchError, CURL, NIX_PREFETCH_GIT, NIX_PREFETCH_URL};
use gemnix_schema::{to_base32, LockSource, PackageSpec, SourceDescriptor};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PrefetchSettings {
    /// Where downloaded `.gem` files are kept between runs.
    pub cache_dir: PathBuf,
    /// Directories searched for `<full-name>.gem` before any download.
    pub gem_caches: Vec<PathBuf>,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            gem_caches: Vec::new(),
        }
    }
}

/// `$XDG_CACHE_HOME/gemnix`, falling back to `~/.cache/gemnix`.
pub fn default_cache_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("gemnix");
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".cache/gemnix"),
        None => std::env::temp_dir().join("gemnix"),
    }
}

/// Resolves gems with `nix-prefetch-url` and git checkouts with `nix-prefetch-git`.
pub struct PrefetchResolver {
    settings: PrefetchSettings,
}

impl PrefetchResolver {
    pub fn new(settings: PrefetchSettings) -> Self {
        Self { settings }
    }

    fn resolve_gem(
        &self,
        spec: &PackageSpec,
        remotes: &[String],
    ) -> Result<SourceDescriptor, FetchError> {
        let remotes: Vec<String> = remotes
            .iter()
            .map(|r| r.trim_end_matches('/').to_owned())
            .collect();
        let file_name = format!("{}.gem", spec.full_name());

        for dir in &self.settings.gem_caches {
            let path = dir.join(&file_name);
            if !path.is_file() {
                continue;
            }
            match prefetch_file(&path, spec) {
                Ok(sha256) => {
                    info!("{sha256} => {file_name} (local)");
                    return Ok(SourceDescriptor::Gem { remotes, sha256 });
                }
                Err(e) => warn!("ignoring cached {}: {e}", path.display()),
            }
        }

        for remote in &remotes {
            let url = format!("{remote}/gems/{file_name}");
            match self
                .download(&url)
                .and_then(|path| prefetch_file(&path, spec))
            {
                Ok(sha256) => {
                    info!("{sha256} => {file_name}");
                    return Ok(SourceDescriptor::Gem {
                        remotes: vec![remote.clone()],
                        sha256,
                    });
                }
                Err(e) => warn!("ignoring error during fetching {url}: {e}"),
            }
        }

        Err(FetchError::NoDigest(spec.full_name()))
    }

    /// Download `url` into the cache unless a non-empty copy is already there.
    fn download(&self, url: &str) -> Result<PathBuf, FetchError> {
        std::fs::create_dir_all(&self.settings.cache_dir)?;
        let dest = self.settings.cache_dir.join(cache_file_name(url));
        if dest.metadata().is_ok_and(|m| m.len() > 0) {
            debug!("using cached download {}", dest.display());
            return Ok(dest);
        }

        let tmp = tempfile::NamedTempFile::new_in(&self.settings.cache_dir)?;
        capture(
            Command::new(CURL)
                .args(["-fsSL", "--max-time", "300", "-o"])
                .arg(tmp.path())
                .arg(url),
        )?;
        tmp.persist(&dest).map_err(|e| FetchError::Io(e.error))?;
        Ok(dest)
    }

    fn resolve_git(
        spec: &PackageSpec,
        remote: &str,
        revision: &str,
        reference: Option<&str>,
        submodules: bool,
    ) -> Result<SourceDescriptor, FetchError> {
        debug!(
            "prefetching {remote} at {revision} ({})",
            reference.unwrap_or("detached")
        );
        let mut cmd = Command::new(NIX_PREFETCH_GIT);
        cmd.args([
            "--url",
            remote,
            "--rev",
            revision,
            "--hash",
            "sha256",
            "--leave-dotGit",
        ]);
        if submodules {
            cmd.arg("--fetch-submodules");
        }
        // Keep the user's git config out of the checkout.
        cmd.env("HOME", "/homeless-shelter");

        let stdout = capture(&mut cmd)?;
        let report = parse_git_report(&stdout)?;
        let sha256 = to_base32(&report.sha256).ok_or_else(|| FetchError::InvalidDigest {
            package: spec.full_name(),
            digest: report.sha256.clone(),
        })?;
        info!("{sha256} => {remote}");

        Ok(SourceDescriptor::Git {
            url: remote.to_owned(),
            rev: revision.to_owned(),
            sha256,
            fetch_submodules: submodules,
        })
    }
}

impl SourceResolver for PrefetchResolver {
    fn name(&self) -> &'static str {
        "prefetch"
    }

    fn resolve(&self, spec: &PackageSpec) -> Result<SourceDescriptor, FetchError> {
        match &spec.source {
            LockSource::Gem { remotes } => self.resolve_gem(spec, remotes),
            LockSource::Git {
                remote,
                revision,
                reference,
                submodules,
            } => Self::resolve_git(
                spec,
                remote,
                revision,
                reference.as_deref(),
                *submodules,
            ),
            LockSource::Path { path } => Ok(SourceDescriptor::Path { path: path.clone() }),
        }
    }
}

fn prefetch_file(path: &Path, spec: &PackageSpec) -> Result<String, FetchError> {
    let absolute = std::fs::canonicalize(path)?;
    let url = format!("file://{}", absolute.display());
    let stdout = capture(Command::new(NIX_PREFETCH_URL).args(["--type", "sha256", url.as_str()]))?;
    extract_digest(&stdout).ok_or_else(|| FetchError::InvalidDigest {
        package: spec.full_name(),
        digest: stdout,
    })
}

/// The digest is the last line of `nix-prefetch-url` output.
fn extract_digest(stdout: &str) -> Option<String> {
    stdout.lines().last().and_then(|l| to_base32(l.trim()))
}

/// Flatten a URL into a single file name: runs of characters other than word
/// characters and `-` become `_`.
fn cache_file_name(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut in_run = false;
    for c in url.chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct GitReport {
    sha256: String,
}

/// `nix-prefetch-git` ends its stdout with a flat JSON object.
fn parse_git_report(stdout: &str) -> Result<GitReport, FetchError> {
    let start = stdout.rfind('{').ok_or_else(|| FetchError::MalformedOutput {
        tool: NIX_PREFETCH_GIT,
        reason: "no JSON report".to_owned(),
    })?;
    serde_json::from_str(&stdout[start..]).map_err(|e| FetchError::MalformedOutput {
        tool: NIX_PREFETCH_GIT,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: &str = "0mdqa9w1p6cmli6976v4wi0sw9r4p5prkj7lzfd1877wk11c9c73";
    const LONG: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn cache_file_name_collapses_separators() {
        assert_eq!(
            cache_file_name("https://rubygems.org/gems/rake-13.0.1.gem"),
            "https_rubygems_org_gems_rake-13_0_1_gem"
        );
    }

    #[test]
    fn extract_digest_takes_last_line() {
        let out = format!("path is '/nix/store/abc-rake.gem'\n{SHORT}");
        assert_eq!(extract_digest(&out).as_deref(), Some(SHORT));
        assert_eq!(extract_digest(LONG).as_deref(), Some(SHORT));
        assert_eq!(extract_digest("error"), None);
    }

    #[test]
    fn parses_git_report_after_progress_output() {
        let stdout = format!(
            "Initialized empty Git repository\ngit revision is abc\n{{\n  \"url\": \"https://github.com/rails/rails.git\",\n  \"rev\": \"abc\",\n  \"date\": \"2022-01-01T00:00:00+00:00\",\n  \"sha256\": \"{SHORT}\",\n  \"fetchSubmodules\": false,\n  \"leaveDotGit\": true\n}}"
        );
        assert_eq!(parse_git_report(&stdout).unwrap().sha256, SHORT);
    }

    #[test]
    fn git_report_without_json_is_malformed() {
        let err = parse_git_report("fatal: repository not found").unwrap_err();
        assert!(matches!(err, FetchError::MalformedOutput { .. }));
    }

    #[test]
    fn path_sources_need_no_tools() {
        let resolver = PrefetchResolver::new(PrefetchSettings::default());
        let spec = PackageSpec {
            name: "billing".to_owned(),
            version: "0.1.0".to_owned(),
            platform: None,
            dependencies: Vec::new(),
            source: LockSource::Path {
                path: "engines/billing".to_owned(),
            },
        };
        assert_eq!(
            resolver.resolve(&spec).unwrap(),
            SourceDescriptor::Path {
                path: "engines/billing".to_owned()
            }
        );
    }
}
