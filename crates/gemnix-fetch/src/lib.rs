//! External collaborators of the gemset conversion.
//!
//! This crate implements everything that touches the network, version control,
//! or the Nix evaluator: the pluggable `SourceResolver` trait with prefetch
//! (nix-prefetch-url / nix-prefetch-git) and mock resolvers, the
//! `ManifestLoader` trait with nix-instantiate and native loaders, and
//! prerequisite checks for the external tools they shell out to.

pub mod loader;
pub mod mock;
pub mod prefetch;
pub mod prereq;
pub mod resolver;

pub use loader::{select_loader, ManifestLoader, NativeLoader, NixInstantiateLoader};
pub use mock::MockResolver;
pub use prefetch::{PrefetchResolver, PrefetchSettings};
pub use prereq::{check_prereqs, format_missing, MissingPrereq};
pub use resolver::{select_resolver, SourceResolver};

use thiserror::Error;

pub const CURL: &str = "curl";
pub const NIX_INSTANTIATE: &str = "nix-instantiate";
pub const NIX_PREFETCH_URL: &str = "nix-prefetch-url";
pub const NIX_PREFETCH_GIT: &str = "nix-prefetch-git";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command execution failed: {0}")]
    ExecFailed(String),
    #[error("couldn't fetch hash for {0}")]
    NoDigest(String),
    #[error("unrecognized digest '{digest}' for {package}")]
    InvalidDigest { package: String, digest: String },
    #[error("malformed {tool} output: {reason}")]
    MalformedOutput { tool: &'static str, reason: String },
    #[error("previous gemset: {0}")]
    Manifest(#[from] gemnix_schema::ManifestError),
    #[error("unknown resolver '{0}' (expected 'prefetch' or 'mock')")]
    UnknownResolver(String),
    #[error("unknown loader '{0}' (expected 'nix' or 'native')")]
    UnknownLoader(String),
}

/// Run a prepared command and return its trimmed stdout, failing on non-zero exit.
pub(crate) fn capture(cmd: &mut std::process::Command) -> Result<String, FetchError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    tracing::debug!("$ {program} {:?}", cmd.get_args().collect::<Vec<_>>());
    let output = cmd
        .output()
        .map_err(|e| FetchError::ExecFailed(format!("{program}: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!("{program} stderr:\n{stderr}");
        return Err(FetchError::ExecFailed(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
