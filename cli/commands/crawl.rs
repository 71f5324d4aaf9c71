use crate::cli_args::CrawlArgs;
use crate::output;
use crate::{load_config_for_command, resolve_rules_for_command};
use aifeeder_core::{Collector, Config, OutputFormat, SkipReason};
use anyhow::{Context, Result};
use colored::Colorize;
use log;
use std::path::{Path, PathBuf};

pub fn handle_crawl_command(args: CrawlArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", project_root.display());

    let config = load_config_for_command(
        &project_root,
        &args.project_config,
        Some(&args.filters),
        Some(&args.format_output),
    )
    .context("Failed to load configuration")?;
    let rules =
        resolve_rules_for_command(&config, &project_root, &args.project_config, &args.filters)?;

    let collector = config
        .output_dirs(&project_root)
        .into_iter()
        .fold(Collector::new(&rules), |c, dir| c.with_avoided_dir(dir))
        .with_options(config.collect_options()?)
        .with_decoder(config.decoder()?);
    let collection = collector
        .collect(&project_root)
        .with_context(|| format!("Failed to collect {}", project_root.display()))?;

    let failures = collection
        .skipped
        .iter()
        .filter(|s| s.reason.is_failure())
        .count();
    if failures > 0 && !quiet {
        eprintln!(
            "{} {} entries could not be read or decoded (run with -v for details).",
            "⚠️".yellow(),
            failures
        );
    }
    log::info!(
        "{} files collected, {} skipped as not code.",
        collection.tree.file_count(),
        collection.skipped_for(SkipReason::NotACodeFile).count()
    );

    let output_path = output_target(&args, &config, &project_root)?;
    output::print_or_save(&collection.tree, &config, output_path.as_deref(), quiet)
}

fn output_target(args: &CrawlArgs, config: &Config, project_root: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = &args.output {
        log::debug!("Output target set to file: {}", path.display());
        return Ok(Some(path.clone()));
    }
    if args.stdout {
        log::debug!("Output target set to stdout (forced).");
        return Ok(None);
    }
    let Some(cli_save) = &args.save else {
        log::debug!("Output target set to stdout (default).");
        return Ok(None);
    };
    let format: OutputFormat = config.output.format.parse()?;
    let (save_dir, filename) = get_save_details(config, cli_save.as_ref(), project_root, format);
    let path = save_dir.join(filename);
    log::debug!("Output target set to file: {}", path.display());
    Ok(Some(path))
}

fn get_save_details(
    config: &Config,
    cli_save_dir: Option<&PathBuf>,
    project_root: &Path,
    format: OutputFormat,
) -> (PathBuf, String) {
    let save_dir_base = match cli_save_dir {
        Some(cli_path) => {
            log::trace!(
                "Save directory explicitly provided via CLI: {}",
                cli_path.display()
            );
            cli_path.clone()
        }
        None => {
            log::trace!(
                "Save flag used without path, using configured/default save directory: {}",
                config.save.output_dir.display()
            );
            config.save.output_dir.clone()
        }
    };

    let save_dir = if save_dir_base.is_absolute() {
        save_dir_base
    } else {
        project_root.join(save_dir_base)
    };
    log::trace!("Resolved absolute save directory: {}", save_dir.display());

    let filename = config.save.filename.clone().unwrap_or_else(|| {
        format!(
            "{}.{}",
            config.get_effective_project_name(project_root),
            format.extension()
        )
    });
    log::trace!("Using save filename: {}", filename);
    (save_dir, filename)
}
