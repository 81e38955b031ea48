use crate::{CURL, NIX_INSTANTIATE, NIX_PREFETCH_GIT, NIX_PREFETCH_URL};
use std::fmt;
use std::process::Command;

/// A missing external tool with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

pub fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

const NIX_HINT: &str = "install Nix from https://nixos.org/download";

/// Check the tools needed by the selected resolver and loader.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_prereqs(resolver: &str, loader: &str) -> Vec<MissingPrereq> {
    let mut wanted: Vec<(&'static str, &'static str, &'static str)> = Vec::new();
    if resolver == "prefetch" {
        wanted.push((
            CURL,
            "downloading .gem files",
            "zypper install curl | apt install curl | dnf install curl | pacman -S curl",
        ));
        wanted.push((NIX_PREFETCH_URL, "hashing downloaded gems", NIX_HINT));
        wanted.push((
            NIX_PREFETCH_GIT,
            "hashing git checkouts",
            "nix-env -iA nixpkgs.nix-prefetch-git",
        ));
    }
    if loader == "nix" {
        wanted.push((NIX_INSTANTIATE, "reading the previous gemset", NIX_HINT));
    }

    wanted
        .into_iter()
        .filter(|(name, _, _)| !command_exists(name))
        .map(|(name, purpose, install_hint)| MissingPrereq {
            name,
            purpose,
            install_hint,
        })
        .collect()
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ngemnix shells out to these tools to hash sources and read gemsets.");
    msg
}
