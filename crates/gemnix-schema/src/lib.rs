//! Value model, Nix rendering, lockfile parsing, and gemset types for gemnix.
//!
//! This crate defines the schema layer: the closed `Value` tree shared by loaded
//! and freshly resolved gemsets, its canonical Nix serializer (`to_nix`) and a
//! reader for the same subset (`parse_nix`), digest encodings, the Bundler
//! lockfile parser (`Lockfile`), and the gemset entry/source types (`Manifest`).

pub mod digest;
pub mod lockfile;
pub mod manifest;
pub mod nix;
pub mod parse;
pub mod value;

pub use digest::{is_base32, nix_base32, to_base32, DigestFormat};
pub use lockfile::{
    parse_lockfile_file, parse_lockfile_str, LockSource, Lockfile, LockfileError, PackageSpec,
    BOOTSTRAP_GEM,
};
pub use manifest::{is_reusable, Manifest, ManifestEntry, ManifestError, SourceDescriptor};
pub use nix::{to_nix, write_value, EncodeError};
pub use parse::{parse_nix, ParseError};
pub use value::{Mapping, Value, ValueError};
