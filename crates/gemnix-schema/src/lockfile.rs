//! Bundler `Gemfile.lock` parsing.
//!
//! Specs are returned in file order. Bundler writes `GIT` and `PATH` sections
//! before `GEM`, so version-control sources come first.

use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name filtered out of recorded dependency lists.
pub const BOOTSTRAP_GEM: &str = "bundler";

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("failed to read lockfile: {0}")]
    Io(#[from] std::io::Error),
    #[error("lockfile line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// Where Bundler locked a spec from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockSource {
    Gem {
        remotes: Vec<String>,
    },
    Git {
        remote: String,
        revision: String,
        /// Branch, tag, or ref the revision was resolved from.
        reference: Option<String>,
        submodules: bool,
    },
    Path {
        path: String,
    },
}

impl LockSource {
    pub fn kind(&self) -> &'static str {
        match self {
            LockSource::Gem { .. } => "gem",
            LockSource::Git { .. } => "git",
            LockSource::Path { .. } => "path",
        }
    }
}

/// A single locked package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    /// Platform suffix such as `x86_64-linux`; `None` for pure-ruby gems.
    pub platform: Option<String>,
    /// Names of runtime dependencies, in lockfile order.
    pub dependencies: Vec<String>,
    pub source: LockSource,
}

impl PackageSpec {
    /// `name-version[-platform]`, the basename of the `.gem` file.
    pub fn full_name(&self) -> String {
        match &self.platform {
            Some(platform) => format!("{}-{}-{platform}", self.name, self.version),
            None => format!("{}-{}", self.name, self.version),
        }
    }

    /// Dependency names with `bootstrap` removed.
    pub fn dependencies_without(&self, bootstrap: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|d| d.as_str() != bootstrap)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    pub specs: Vec<PackageSpec>,
    pub platforms: Vec<String>,
    /// Top-level Gemfile dependency names.
    pub dependencies: Vec<String>,
    pub ruby_version: Option<String>,
    pub bundled_with: Option<String>,
}

pub fn parse_lockfile_file(path: impl AsRef<Path>) -> Result<Lockfile, LockfileError> {
    let content = fs::read_to_string(path)?;
    parse_lockfile_str(&content)
}

pub fn parse_lockfile_str(input: &str) -> Result<Lockfile, LockfileError> {
    let mut lock = Lockfile::default();
    let mut section: Option<Section> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start_matches(' ').len();
        let body = &line[indent..];

        if indent == 0 {
            if let Some(done) = section.take() {
                done.finish(&mut lock)?;
            }
            section = Some(Section::open(body, line_no));
            continue;
        }

        let Some(current) = section.as_mut() else {
            return Err(syntax(line_no, "indented line outside of any section"));
        };
        current.feed(indent, body, line_no, &mut lock)?;
    }

    if let Some(done) = section.take() {
        done.finish(&mut lock)?;
    }
    Ok(lock)
}

fn syntax(line: usize, message: impl Into<String>) -> LockfileError {
    LockfileError::Syntax {
        line,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Gem,
    Git,
    Path,
}

#[derive(Debug)]
struct PendingSpec {
    name: String,
    version: String,
    platform: Option<String>,
    dependencies: Vec<String>,
}

#[derive(Debug)]
enum Section {
    Source {
        kind: SourceKind,
        header_line: usize,
        options: Vec<(String, String)>,
        in_specs: bool,
        specs: Vec<PendingSpec>,
    },
    Platforms,
    Dependencies,
    RubyVersion,
    BundledWith,
    Ignored,
}

impl Section {
    fn open(header: &str, line: usize) -> Self {
        let source = |kind| Section::Source {
            kind,
            header_line: line,
            options: Vec::new(),
            in_specs: false,
            specs: Vec::new(),
        };
        match header.trim_end() {
            "GEM" => source(SourceKind::Gem),
            "GIT" => source(SourceKind::Git),
            "PATH" => source(SourceKind::Path),
            "PLATFORMS" => Section::Platforms,
            "DEPENDENCIES" => Section::Dependencies,
            "RUBY VERSION" => Section::RubyVersion,
            "BUNDLED WITH" => Section::BundledWith,
            _ => Section::Ignored,
        }
    }

    fn feed(
        &mut self,
        indent: usize,
        body: &str,
        line: usize,
        lock: &mut Lockfile,
    ) -> Result<(), LockfileError> {
        match self {
            Section::Source {
                options,
                in_specs,
                specs,
                ..
            } => match indent {
                2 if body == "specs:" => *in_specs = true,
                2 => {
                    let (key, value) = body
                        .split_once(':')
                        .ok_or_else(|| syntax(line, format!("expected 'key: value', got '{body}'")))?;
                    options.push((key.trim().to_owned(), value.trim().to_owned()));
                }
                4 if *in_specs => {
                    let (name, version) = split_name_version(body)
                        .ok_or_else(|| syntax(line, format!("malformed spec line '{body}'")))?;
                    let version =
                        version.ok_or_else(|| syntax(line, format!("spec '{name}' has no version")))?;
                    let (version, platform) = match version.split_once('-') {
                        Some((v, p)) => (v.to_owned(), Some(p.to_owned())),
                        None => (version.to_owned(), None),
                    };
                    specs.push(PendingSpec {
                        name: name.to_owned(),
                        version,
                        platform,
                        dependencies: Vec::new(),
                    });
                }
                6 if *in_specs => {
                    let (name, _) = split_name_version(body)
                        .ok_or_else(|| syntax(line, format!("malformed dependency line '{body}'")))?;
                    let spec = specs
                        .last_mut()
                        .ok_or_else(|| syntax(line, "dependency listed before any spec"))?;
                    spec.dependencies.push(name.to_owned());
                }
                _ => return Err(syntax(line, format!("unexpected line '{body}'"))),
            },
            Section::Platforms => lock.platforms.push(body.trim().to_owned()),
            Section::Dependencies => {
                let (name, _) = split_name_version(body)
                    .ok_or_else(|| syntax(line, format!("malformed dependency '{body}'")))?;
                lock.dependencies.push(name.trim_end_matches('!').to_owned());
            }
            Section::RubyVersion => lock.ruby_version = Some(body.trim().to_owned()),
            Section::BundledWith => lock.bundled_with = Some(body.trim().to_owned()),
            Section::Ignored => {}
        }
        Ok(())
    }

    fn finish(self, lock: &mut Lockfile) -> Result<(), LockfileError> {
        let Section::Source {
            kind,
            header_line,
            options,
            specs,
            ..
        } = self
        else {
            return Ok(());
        };

        let option = |key: &str| {
            options
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let remote =
            option("remote").ok_or_else(|| syntax(header_line, "source section has no 'remote:'"))?;

        let source = match kind {
            SourceKind::Gem => LockSource::Gem {
                remotes: options
                    .iter()
                    .filter(|(k, _)| k == "remote")
                    .map(|(_, v)| v.clone())
                    .collect(),
            },
            SourceKind::Git => LockSource::Git {
                revision: option("revision")
                    .ok_or_else(|| syntax(header_line, "git source has no 'revision:'"))?,
                reference: option("branch")
                    .or_else(|| option("tag"))
                    .or_else(|| option("ref")),
                submodules: option("submodules").as_deref() == Some("true"),
                remote,
            },
            SourceKind::Path => LockSource::Path { path: remote },
        };

        lock.specs.extend(specs.into_iter().map(|s| PackageSpec {
            name: s.name,
            version: s.version,
            platform: s.platform,
            dependencies: s.dependencies,
            source: source.clone(),
        }));
        Ok(())
    }
}

/// Split `name (constraint)` into its parts. The name must not contain spaces.
fn split_name_version(body: &str) -> Option<(&str, Option<&str>)> {
    let body = body.trim_end();
    match body.split_once(' ') {
        None if !body.is_empty() => Some((body, None)),
        None => None,
        Some((name, rest)) => {
            let inner = rest.strip_prefix('(')?;
            let inner = inner.strip_suffix(")!").or_else(|| inner.strip_suffix(')'))?;
            Some((name, Some(inner)))
        }
    }
}
