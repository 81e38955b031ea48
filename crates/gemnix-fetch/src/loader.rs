use crate::{capture, FetchError, NIX_INSTANTIATE};
use gemnix_schema::Manifest;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Loads a previously generated gemset so its entries can be reused.
///
/// A missing file is an empty gemset, not an error.
pub trait ManifestLoader: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, path: &Path) -> Result<Manifest, FetchError>;
}

/// Evaluates the gemset with `nix-instantiate` and decodes the JSON result.
#[derive(Debug, Default)]
pub struct NixInstantiateLoader;

impl ManifestLoader for NixInstantiateLoader {
    fn name(&self) -> &'static str {
        "nix"
    }

    fn load(&self, path: &Path) -> Result<Manifest, FetchError> {
        if !path.is_file() {
            debug!("no previous gemset at {}", path.display());
            return Ok(Manifest::new());
        }
        let absolute = std::fs::canonicalize(path)?;
        let stdout = capture(
            Command::new(NIX_INSTANTIATE)
                .args(["--eval", "--strict", "--json", "-E", "{ path }: import path"])
                .args(["--argstr", "path"])
                .arg(&absolute),
        )?;
        let json: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| FetchError::MalformedOutput {
                tool: NIX_INSTANTIATE,
                reason: e.to_string(),
            })?;
        Ok(Manifest::from_json(json)?)
    }
}

/// Reads the gemset directly, without a Nix evaluator.
///
/// Only understands the literal subset gemnix writes; hand-edited gemsets using
/// `let`, functions, or interpolation need [`NixInstantiateLoader`].
#[derive(Debug, Default)]
pub struct NativeLoader;

impl ManifestLoader for NativeLoader {
    fn name(&self) -> &'static str {
        "native"
    }

    fn load(&self, path: &Path) -> Result<Manifest, FetchError> {
        if !path.is_file() {
            debug!("no previous gemset at {}", path.display());
            return Ok(Manifest::new());
        }
        Ok(Manifest::read_from_file(path)?)
    }
}

pub fn select_loader(name: &str) -> Result<Box<dyn ManifestLoader>, FetchError> {
    match name {
        "nix" => Ok(Box::new(NixInstantiateLoader)),
        "native" => Ok(Box::new(NativeLoader)),
        other => Err(FetchError::UnknownLoader(other.to_owned())),
    }
}
