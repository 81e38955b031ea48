use super::{json_pretty, spin_fail, spin_ok, Output, Settings, EXIT_SUCCESS};
use crate::ConvertArgs;
use gemnix_core::write_manifest;
use std::path::Path;

pub fn run(config: Option<&Path>, args: &ConvertArgs, output: Output) -> Result<u8, String> {
    let mut settings = Settings::from_convert_args(config, args)?;
    settings.options.quiet = output.quiet;
    super::require_prereqs(settings.fetch.resolver_name(), settings.fetch.loader_name())?;
    let converter = settings.converter()?;
    let options = &settings.options;

    let pb = output.spinner(&format!("converting {}", options.lockfile.display()));
    let result = match converter.convert(options) {
        Ok(result) => result,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "conversion failed");
            }
            return Err(e.to_string());
        }
    };
    write_manifest(&options.gemset, &result.manifest).map_err(|e| e.to_string())?;

    if output.json {
        let json = serde_json::json!({
            "gemset": options.gemset.display().to_string(),
            "lockfile": options.lockfile.display().to_string(),
            "entries": result.manifest.len(),
            "reused": result.reused,
            "resolved": result.resolved,
        });
        println!("{}", json_pretty(&json)?);
    } else if let Some(pb) = &pb {
        spin_ok(
            pb,
            &format!(
                "wrote {} gems to {} ({} reused, {} resolved)",
                result.manifest.len(),
                options.gemset.display(),
                result.reused,
                result.resolved
            ),
        );
    }
    Ok(EXIT_SUCCESS)
}
