mod cli_args;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use log;
use std::path::Path;
use std::process;

use aifeeder_core::{AppError, Config, RuleSet};
use cli_args::{Cli, Commands, FilterGroup, FormatOutputOpts, ProjectConfigOpts};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    let quiet = cli_args.quiet;

    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(cli_args, quiet) {
        Ok(_) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = exit_code_for(&e);

            // Config and argument problems are always shown, even when quiet.
            if !quiet || exit_code == 1 {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
            } else {
                log::error!("Application failed: {:#}", e);
            }

            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AppError>() {
        Some(AppError::Config(_)) => 1,
        Some(AppError::TomlParse(_)) => 1,
        Some(AppError::Glob(_)) => 1,
        Some(AppError::InvalidArgument(_)) => 1,
        Some(AppError::Cancelled) => 1,
        Some(AppError::TreeConflict(_)) => 1,
        Some(AppError::RootNotFound { .. }) => 2,
        Some(AppError::Io(_)) => 2,
        Some(AppError::FileRead { .. }) => 2,
        Some(AppError::DirCreation { .. }) => 2,
        Some(AppError::JsonSerialize(_)) => 6,
        Some(AppError::YamlError(_)) => 6,
        Some(AppError::TomlSerialize(_)) => 6,
        Some(_) => 1,
        None => 1,
    }
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

fn run_app(cli: Cli, quiet: bool) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    match command {
        Commands::Crawl(args) => {
            log::debug!("Executing 'crawl' command...");
            commands::crawl::handle_crawl_command(args, quiet)?;
        }
        Commands::Copy(args) => {
            log::debug!("Executing 'copy' command...");
            commands::copy::handle_copy_command(args, quiet)?;
        }
        Commands::Debug(args) => {
            log::debug!("Executing 'debug' command...");
            commands::debug::handle_debug_command(args)?;
        }
        Commands::Completion(args) => {
            log::debug!("Executing 'completion' command...");
            commands::completion::handle_completion_command(&args, quiet)?;
        }
        Commands::Config(args) => {
            log::debug!("Executing 'config' command...");
            let project_root =
                Config::determine_project_root(args.project_config.project_root.as_ref())
                    .context("Failed to determine project root for config command")?;
            commands::config::handle_config_command(&args, &project_root, quiet)?;
        }
    }
    Ok(())
}

fn merge_config_with_cli_overrides(
    mut config: Config,
    filters: Option<&FilterGroup>,
    format_opts: Option<&FormatOutputOpts>,
) -> Result<Config> {
    log::trace!("Applying CLI overrides to config...");

    if let Some(filters) = filters {
        if let Some(mode) = &filters.include_mode {
            config.collect.include_mode = mode.parse()?;
        }
        if filters.prune_empty_dirs {
            config.collect.keep_empty_dirs = false;
        }
        if filters.follow_links {
            config.collect.follow_links = true;
        }
        if let Some(size) = &filters.max_file_size {
            config.collect.max_file_size = Some(size.clone());
        }
    }

    if let Some(fmt_opts) = format_opts {
        if let Some(format) = &fmt_opts.format {
            config.output.format = format.clone();
        }
        if fmt_opts.pretty {
            config.output.json_minify = false;
        }
        if fmt_opts.minify {
            config.output.json_minify = true;
        }
    }

    log::trace!("Config after CLI overrides: {:?}", config);
    Ok(config)
}

/// Loads the config file the CLI options point at and applies command-line overrides.
pub fn load_config_for_command(
    project_root: &Path,
    project_opts: &ProjectConfigOpts,
    filters: Option<&FilterGroup>,
    format_override: Option<&FormatOutputOpts>,
) -> Result<Config> {
    let config_path = Config::resolve_config_path(
        project_root,
        project_opts.config_file.as_ref(),
        project_opts.disable_config_file,
    )
    .context("Failed to resolve configuration path")?;

    let mut config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(name) = &project_opts.project_name {
        config.general.project_name = Some(name.clone());
    }
    config = merge_config_with_cli_overrides(config, filters, format_override)?;
    config.general.project_name = Some(config.get_effective_project_name(project_root));

    Ok(config)
}

/// Rules from the config chain, with the CLI filter flags appended.
pub fn resolve_rules_for_command(
    config: &Config,
    project_root: &Path,
    project_opts: &ProjectConfigOpts,
    filters: &FilterGroup,
) -> Result<RuleSet> {
    let rules = config
        .effective_rules(project_root, project_opts.rules_file.as_deref())
        .context("Failed to load rules")?
        .with_includes(&filters.includes)
        .with_excludes(&filters.excludes)
        .with_excluded_extensions(&filters.exclude_extensions)
        .with_code_extensions(&filters.code_extensions)
        .with_no_extension_files(&filters.no_extension_files)
        .with_exclude_globs(&filters.exclude_globs);
    log::debug!("Effective rules: {:?}", rules);
    Ok(rules)
}
