use crate::cli_args::CopyArgs;
use crate::{load_config_for_command, resolve_rules_for_command};
use aifeeder_core::{Config, copy_code_files};
use anyhow::{Context, Result};
use colored::Colorize;
use log;
use std::path::{Path, PathBuf};

pub fn handle_copy_command(args: CopyArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", project_root.display());

    let config = load_config_for_command(
        &project_root,
        &args.project_config,
        Some(&args.filters),
        None,
    )
    .context("Failed to load configuration")?;
    let rules =
        resolve_rules_for_command(&config, &project_root, &args.project_config, &args.filters)?;

    let destination = copy_destination(args.output.as_ref(), &config, &project_root);
    let report = copy_code_files(
        &project_root,
        &rules,
        &config.collect_options()?,
        &destination,
    )
    .with_context(|| format!("Failed to copy code files into {}", destination.display()))?;

    if !quiet {
        let shown = pathdiff::diff_paths(&report.destination, &project_root)
            .filter(|p| !p.starts_with(".."))
            .unwrap_or_else(|| report.destination.clone());
        println!(
            "{} Copied {} files to: {} ({} skipped)",
            "✅".green(),
            report.copied.len().to_string().cyan(),
            shown.display().to_string().blue(),
            report.skipped.len()
        );
    }
    Ok(())
}

/// CLI paths are taken as given; the configured directory is relative to the project root.
fn copy_destination(cli_output: Option<&PathBuf>, config: &Config, project_root: &Path) -> PathBuf {
    match cli_output {
        Some(path) => path.clone(),
        None if config.copy.output_dir.is_absolute() => config.copy.output_dir.clone(),
        None => project_root.join(&config.copy.output_dir),
    }
}
