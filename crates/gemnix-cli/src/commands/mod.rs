pub mod completions;
pub mod convert;
pub mod doctor;
pub mod man_pages;
pub mod plan;

use crate::{ConvertArgs, PathArgs};
use gemnix_core::{ConvertOptions, Converter, FetchSection, ProjectConfig};
use gemnix_fetch::{check_prereqs, format_missing, select_loader, select_resolver};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_LOCKFILE_ERROR: u8 = 2;
pub const EXIT_RESOLVE_ERROR: u8 = 3;

/// Global output flags shared by every subcommand.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    /// Spinners only make sense for humans watching a terminal.
    pub fn spinner(self, msg: &str) -> Option<ProgressBar> {
        if self.json || self.quiet {
            None
        } else {
            Some(spinner(msg))
        }
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_action(action: &str) -> String {
    use console::Style;
    match action {
        "reuse" => Style::new().green().apply_to(action).to_string(),
        "resolve" => Style::new().yellow().bold().apply_to(action).to_string(),
        other => other.to_owned(),
    }
}

/// Effective settings: defaults, then `gemnix.toml`, then command-line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub options: ConvertOptions,
    pub fetch: FetchSection,
    /// The config file that was applied, if any.
    pub config_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_paths(config: Option<&Path>, paths: &PathArgs) -> Result<Self, String> {
        let (project, config_path) = load_config(config)?;
        Ok(Self::with_paths(project, config_path, paths))
    }

    pub fn from_convert_args(config: Option<&Path>, args: &ConvertArgs) -> Result<Self, String> {
        let (project, config_path) = load_config(config)?;
        Ok(Self::with_convert_args(project, config_path, args))
    }

    pub fn with_paths(
        project: ProjectConfig,
        config_path: Option<PathBuf>,
        paths: &PathArgs,
    ) -> Self {
        let mut options = ConvertOptions::from_config(&project.convert);
        let mut fetch = project.fetch;
        if let Some(gemset) = &paths.gemset {
            options.gemset.clone_from(gemset);
        }
        if let Some(lockfile) = &paths.lockfile {
            options.lockfile.clone_from(lockfile);
        }
        if paths.loader.is_some() {
            fetch.loader.clone_from(&paths.loader);
        }
        Self {
            options,
            fetch,
            config_path,
        }
    }

    pub fn with_convert_args(
        project: ProjectConfig,
        config_path: Option<PathBuf>,
        args: &ConvertArgs,
    ) -> Self {
        let mut settings = Self::with_paths(project, config_path, &args.paths);
        if args.deps {
            settings.options.deps = true;
        }
        if let Some(jobs) = args.jobs {
            settings.options.jobs = jobs.max(1);
        }
        if args.resolver.is_some() {
            settings.fetch.resolver.clone_from(&args.resolver);
        }
        settings
    }

    pub fn converter(&self) -> Result<Converter, String> {
        let loader = select_loader(self.fetch.loader_name()).map_err(|e| e.to_string())?;
        let resolver = select_resolver(
            self.fetch.resolver_name(),
            self.fetch.prefetch_settings(&self.options.lockfile),
        )
        .map_err(|e| e.to_string())?;
        Ok(Converter::new(loader, resolver))
    }
}

/// Explicit `--config` must exist; otherwise `./gemnix.toml` is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<(ProjectConfig, Option<PathBuf>), String> {
    if let Some(path) = explicit {
        let config = ProjectConfig::load(path).map_err(|e| format!("{}: {e}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }
    let cwd = std::env::current_dir().map_err(|e| format!("cannot read current dir: {e}"))?;
    match ProjectConfig::discover(&cwd) {
        Ok(Some(config)) => Ok((config, Some(cwd.join(gemnix_core::CONFIG_FILE)))),
        Ok(None) => Ok((ProjectConfig::default(), None)),
        Err(e) => Err(format!("{}: {e}", gemnix_core::CONFIG_FILE)),
    }
}

/// Fail early when the selected backends need tools that are not installed.
pub fn require_prereqs(resolver: &str, loader: &str) -> Result<(), String> {
    if std::env::var("GEMNIX_SKIP_PREREQS").as_deref() == Ok("1") {
        return Ok(());
    }
    let missing = check_prereqs(resolver, loader);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format_missing(&missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"gemset": "gemset.nix"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"gemset\""));
        assert!(result.contains("\"gemset.nix\""));
    }

    #[test]
    fn colorize_action_keeps_text() {
        assert!(colorize_action("reuse").contains("reuse"));
        assert!(colorize_action("resolve").contains("resolve"));
        assert_eq!(colorize_action("other"), "other");
    }

    #[test]
    fn quiet_and_json_suppress_spinner() {
        let quiet = Output {
            json: false,
            quiet: true,
        };
        assert!(quiet.spinner("x").is_none());
        let json = Output {
            json: true,
            quiet: false,
        };
        assert!(json.spinner("x").is_none());
    }

    #[test]
    fn explicit_config_and_flags_layer() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("gemnix.toml");
        std::fs::write(
            &config,
            "[convert]\ngemset = \"nix/gemset.nix\"\njobs = 2\n\n[fetch]\nresolver = \"mock\"\n",
        )
        .unwrap();

        let args = ConvertArgs {
            paths: PathArgs {
                lockfile: Some(PathBuf::from("other.lock")),
                ..PathArgs::default()
            },
            deps: true,
            jobs: Some(0),
            resolver: None,
        };
        let settings = Settings::from_convert_args(Some(&config), &args).unwrap();
        assert_eq!(settings.options.gemset, dir.path().join("nix/gemset.nix"));
        assert_eq!(settings.options.lockfile, PathBuf::from("other.lock"));
        assert!(settings.options.deps);
        assert_eq!(settings.options.jobs, 1);
        assert_eq!(settings.fetch.resolver_name(), "mock");
        assert_eq!(settings.fetch.loader_name(), "nix");
        assert_eq!(settings.config_path.as_deref(), Some(config.as_path()));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.contains("absent.toml"));
    }

    #[test]
    fn unknown_loader_is_rejected() {
        let args = PathArgs {
            loader: Some("yaml".to_owned()),
            ..PathArgs::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("gemnix.toml");
        std::fs::write(&config, "").unwrap();
        let settings = Settings::from_paths(Some(&config), &args).unwrap();
        assert!(settings.converter().is_err());
    }
}
