use super::{colorize_action, json_pretty, Output, Settings, EXIT_SUCCESS};
use crate::PathArgs;
use std::path::Path;

pub fn run(config: Option<&Path>, paths: &PathArgs, output: Output) -> Result<u8, String> {
    let settings = Settings::from_paths(config, paths)?;
    super::require_prereqs("none", settings.fetch.loader_name())?;
    let converter = settings.converter()?;
    let planned = converter
        .plan(&settings.options)
        .map_err(|e| e.to_string())?;

    if output.json {
        println!("{}", json_pretty(&planned)?);
        return Ok(EXIT_SUCCESS);
    }
    if output.quiet {
        return Ok(EXIT_SUCCESS);
    }

    let width = planned.iter().map(|p| p.name.len()).max().unwrap_or(0);
    for p in &planned {
        let action = colorize_action(p.action);
        // Pad before coloring; escape codes would throw off the width.
        let pad = " ".repeat("resolve".len() - p.action.len());
        match p.reason {
            Some(reason) => println!(
                "  {action}{pad}  {:<width$}  {} ({}, {reason})",
                p.name, p.version, p.source
            ),
            None => println!(
                "  {action}{pad}  {:<width$}  {} ({})",
                p.name, p.version, p.source
            ),
        }
    }
    let resolve = planned.iter().filter(|p| p.action == "resolve").count();
    println!(
        "\n{} to reuse, {resolve} to resolve",
        planned.len() - resolve
    );
    Ok(EXIT_SUCCESS)
}
