use super::{Output, Settings, EXIT_FAILURE, EXIT_SUCCESS};
use crate::ConvertArgs;
use gemnix_core::{plan, CacheDecision, ProjectConfig};
use gemnix_fetch::{check_prereqs, format_missing, select_loader, select_resolver};
use gemnix_schema::{parse_lockfile_file, Lockfile, Manifest};
use std::path::Path;

pub fn run(config: Option<&Path>, args: &ConvertArgs, output: Output) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let settings = match Settings::from_convert_args(config, args) {
        Ok(settings) => {
            match &settings.config_path {
                Some(path) => checks.push(Check::pass(
                    "config",
                    &format!("Config loaded from {}", path.display()),
                )),
                None => checks.push(Check::info("config", "No gemnix.toml (using defaults)")),
            }
            settings
        }
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail("config", &format!("Config invalid: {e}")));
            Settings::with_convert_args(ProjectConfig::default(), None, args)
        }
    };

    let tools_ok = check_backends(&settings, &mut checks, &mut all_pass);
    let lock = check_lockfile(&settings, &mut checks, &mut all_pass);
    if tools_ok {
        check_gemset(&settings, lock.as_ref(), &mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "gemset",
            "Gemset not checked (loader prerequisites missing)",
        ));
    }

    print_results(&checks, all_pass, output)
}

fn check_backends(settings: &Settings, checks: &mut Vec<Check>, all_pass: &mut bool) -> bool {
    let resolver = settings.fetch.resolver_name();
    let loader = settings.fetch.loader_name();

    let mut known = true;
    let prefetch = settings.fetch.prefetch_settings(&settings.options.lockfile);
    if let Err(e) = select_resolver(resolver, prefetch) {
        known = false;
        checks.push(Check::fail("resolver", &e.to_string()));
    }
    if let Err(e) = select_loader(loader) {
        known = false;
        checks.push(Check::fail("loader", &e.to_string()));
    }
    if !known {
        *all_pass = false;
        return false;
    }

    let missing = check_prereqs(resolver, loader);
    if missing.is_empty() {
        checks.push(Check::pass(
            "prereqs",
            &format!("Tools for resolver '{resolver}' and loader '{loader}' found"),
        ));
        true
    } else {
        *all_pass = false;
        checks.push(Check::fail("prereqs", &format_missing(&missing)));
        check_prereqs("none", loader).is_empty()
    }
}

fn check_lockfile(
    settings: &Settings,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) -> Option<Lockfile> {
    let path = &settings.options.lockfile;
    if !path.exists() {
        *all_pass = false;
        checks.push(Check::fail(
            "lockfile",
            &format!("Lockfile {} not found", path.display()),
        ));
        return None;
    }
    match parse_lockfile_file(path) {
        Ok(lock) => {
            let git = lock.specs.iter().filter(|s| s.source.kind() == "git").count();
            let local = lock.specs.iter().filter(|s| s.source.kind() == "path").count();
            checks.push(Check::pass(
                "lockfile",
                &format!(
                    "Lockfile {}: {} gems ({git} git, {local} path)",
                    path.display(),
                    lock.specs.len()
                ),
            ));
            checks.push(Check::info("bundle", &describe_bundle(&lock)));
            Some(lock)
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "lockfile",
                &format!("Lockfile {} invalid: {e}", path.display()),
            ));
            None
        }
    }
}

/// Toolchain and platform metadata Bundler recorded alongside the specs.
fn describe_bundle(lock: &Lockfile) -> String {
    let mut parts = vec![format!(
        "{} top-level dependencies",
        lock.dependencies.len()
    )];
    if !lock.platforms.is_empty() {
        parts.push(format!("platforms {}", lock.platforms.join(", ")));
    }
    if let Some(ruby) = &lock.ruby_version {
        parts.push(ruby.clone());
    }
    if let Some(bundler) = &lock.bundled_with {
        parts.push(format!("bundler {bundler}"));
    }
    format!("Bundle: {}", parts.join("; "))
}

fn check_gemset(
    settings: &Settings,
    lock: Option<&Lockfile>,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let path = &settings.options.gemset;
    if !path.exists() {
        checks.push(Check::info(
            "gemset",
            &format!("Gemset {} absent (will be created)", path.display()),
        ));
        return;
    }
    let loaded = select_loader(settings.fetch.loader_name()).and_then(|l| l.load(path));
    let previous: Manifest = match loaded {
        Ok(m) => m,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "gemset",
                &format!("Gemset {} unreadable: {e}", path.display()),
            ));
            return;
        }
    };
    checks.push(Check::pass(
        "gemset",
        &format!("Gemset {}: {} entries", path.display(), previous.len()),
    ));

    if let Some(lock) = lock {
        let planned = plan(&previous, &lock.specs);
        let cached = planned
            .iter()
            .filter(|p| p.decision == CacheDecision::Reuse)
            .count();
        let status: fn(&'static str, &str) -> Check = if cached == planned.len() {
            Check::pass
        } else {
            Check::info
        };
        checks.push(status(
            "cache",
            &format!("{cached} of {} gems cached", planned.len()),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, output: Output) -> Result<u8, String> {
    if output.json {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", super::json_pretty(&json)?);
    } else if !output.quiet {
        println!("gemnix doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
