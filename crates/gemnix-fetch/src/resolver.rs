use crate::mock::MockResolver;
use crate::prefetch::{PrefetchResolver, PrefetchSettings};
use crate::FetchError;
use gemnix_schema::{PackageSpec, SourceDescriptor};

/// Computes the authoritative source descriptor for a locked package.
///
/// Implementations may perform network or version-control I/O. They must not
/// share mutable state across calls, so misses can be resolved in parallel.
pub trait SourceResolver: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, spec: &PackageSpec) -> Result<SourceDescriptor, FetchError>;
}

pub fn select_resolver(
    name: &str,
    settings: PrefetchSettings,
) -> Result<Box<dyn SourceResolver>, FetchError> {
    match name {
        "prefetch" => Ok(Box::new(PrefetchResolver::new(settings))),
        "mock" => Ok(Box::new(MockResolver::new())),
        other => Err(FetchError::UnknownResolver(other.to_owned())),
    }
}
