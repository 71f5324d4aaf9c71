use crate::cli_args::DebugArgs;
use crate::output::{print_skip_table, render, write_to_stdout};
use crate::{load_config_for_command, resolve_rules_for_command};
use aifeeder_core::{Collector, Config, RuleSet, SkippedEntry};
use anyhow::{Context, Result};
use colored::*;
use log;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct DebugInfo<'a> {
    effective_config: &'a Config,
    effective_rules: &'a RuleSet,
    admitted_files: Vec<String>,
    skipped: &'a [SkippedEntry],
}

pub fn handle_debug_command(args: DebugArgs) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", project_root.display());

    let config = load_config_for_command(
        &project_root,
        &args.project_config,
        Some(&args.filters),
        Some(&args.format_output),
    )
    .context("Failed to load configuration for debug command")?;
    let rules =
        resolve_rules_for_command(&config, &project_root, &args.project_config, &args.filters)?;

    log::debug!("Debug: Collecting...");
    let collection = config
        .output_dirs(&project_root)
        .into_iter()
        .fold(Collector::new(&rules), |c, dir| c.with_avoided_dir(dir))
        .with_options(config.collect_options()?)
        .with_decoder(config.decoder()?)
        .collect(&project_root)
        .context("Failed to collect files for debug")?;

    let debug_data = DebugInfo {
        effective_config: &config,
        effective_rules: &rules,
        admitted_files: collection
            .tree
            .files()
            .into_iter()
            .map(|(path, _)| path)
            .collect(),
        skipped: &collection.skipped,
    };

    if args.format_output.format.is_none() {
        print_debug_info_pretty(&debug_data)?;
    } else {
        log::debug!(
            "Debug: Printing structured output (format: {:?})...",
            args.format_output.format
        );
        write_to_stdout(&render(&debug_data, &config)?)?;
    }
    Ok(())
}

fn print_debug_info_pretty(debug_info: &DebugInfo) -> Result<()> {
    println!(
        "{}",
        "\n--- Effective Configuration ---"
            .green()
            .bold()
            .underline()
    );
    println!("{}", debug_info.effective_config.to_toml_string()?);

    println!("{}", "\n--- Effective Rules ---".green().bold().underline());
    let rules_toml = toml::to_string_pretty(debug_info.effective_rules)
        .context("Failed to serialize effective rules to TOML")?;
    println!("{}", rules_toml);

    print_skip_table(debug_info.skipped);

    println!("{}", "\n--- Admitted Files ---".green().bold().underline());
    if debug_info.admitted_files.is_empty() {
        println!("{}", "(None)".dimmed());
    } else {
        debug_info
            .admitted_files
            .iter()
            .for_each(|p| println!("- {}", p.cyan()));
    }

    println!("{}", "\n--- End Debug Info ---".green().bold());
    Ok(())
}
