use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectConfigOpts {
    #[arg(
        long,
        help = "Directory to crawl (default: $PROJECT_ROOT or current dir).",
        help_heading = "Project Setup",
        value_name = "PATH"
    )]
    pub project_root: Option<PathBuf>,

    #[arg(
        long,
        help = "Specify path/filename of the TOML config file (default: .aifeeder/aifeeder.toml).",
        value_name = "CONFIG_FILE",
        conflicts_with = "disable_config_file",
        help_heading = "Project Setup"
    )]
    pub config_file: Option<String>,

    #[arg(
        long,
        help = "Disable loading any TOML config file.",
        conflicts_with = "config_file",
        help_heading = "Project Setup"
    )]
    pub disable_config_file: bool,

    #[arg(
        long,
        help = "Load rules from a JSON, YAML or TOML file (overrides config).",
        value_name = "RULES_FILE",
        help_heading = "Project Setup"
    )]
    pub rules_file: Option<PathBuf>,

    #[arg(
        long,
        help = "Specify the project name (overrides config/dir name).",
        value_name = "NAME",
        help_heading = "Project Setup"
    )]
    pub project_name: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterGroup {
    #[arg(long = "include", value_name = "PATTERN", help = "Add an include pattern.", help_heading = "Filters")]
    pub includes: Vec<String>,
    #[arg(long = "exclude", value_name = "PATTERN", help = "Add an excluded directory name or path prefix.", help_heading = "Filters")]
    pub excludes: Vec<String>,
    #[arg(long = "exclude-ext", value_name = "EXT", help = "Add an excluded file suffix (e.g. '.lock').", help_heading = "Filters")]
    pub exclude_extensions: Vec<String>,
    #[arg(long = "code-ext", value_name = "EXT", help = "Add a code file suffix (e.g. '.rs').", help_heading = "Filters")]
    pub code_extensions: Vec<String>,
    #[arg(long = "no-ext-file", value_name = "NAME", help = "Add an extensionless file name to admit (e.g. 'Makefile').", help_heading = "Filters")]
    pub no_extension_files: Vec<String>,
    #[arg(long = "exclude-glob", value_name = "GLOB", help = "Add a glob matched against relative file paths.", help_heading = "Filters")]
    pub exclude_globs: Vec<String>,

    #[arg(
        long,
        value_name = "MODE",
        value_parser = ["prefix", "segment", "either"],
        help = "How include patterns match directories [default: either].",
        help_heading = "Filters"
    )]
    pub include_mode: Option<String>,

    #[arg(
        long,
        help = "Drop directories that end up with no collected files.",
        help_heading = "Filters"
    )]
    pub prune_empty_dirs: bool,

    #[arg(long, help = "Follow symbolic links while walking.", help_heading = "Filters")]
    pub follow_links: bool,

    #[arg(
        long,
        value_name = "SIZE_STRING",
        help = "Skip files larger than this (e.g., '512KB', '1MiB').",
        help_heading = "Filters"
    )]
    pub max_file_size: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FormatOutputOpts {
    #[arg(short = 'f', long, help = "Set the output format.", value_name = "FORMAT", value_parser = ["json", "yaml", "toml"], help_heading = "Output Formatting")]
    pub format: Option<String>,

    #[arg(
        long,
        help = "Pretty-print JSON output.",
        conflicts_with = "minify",
        help_heading = "Output Formatting"
    )]
    pub pretty: bool,

    #[arg(
        long,
        help = "Compact JSON output.",
        conflicts_with = "pretty",
        help_heading = "Output Formatting"
    )]
    pub minify: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "aifeeder",
    author,
    version,
    about = "Collect a repository's code files into one structured document.",
    long_about = "aifeeder walks a project directory, applies include/exclude/extension rules, \nand emits a nested mapping of directories to file contents (JSON, YAML or TOML). \nIt can also copy the admitted files into a separate directory.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  aifeeder crawl --project-root ./repo -o repo.json\n  aifeeder crawl --include src -f yaml --save\n  aifeeder copy --output /tmp/code\n  aifeeder debug --exclude-glob '*.test.*'",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase message verbosity (-v, -vv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(
        visible_alias = "c",
        about = "Collect the project's code files into a tree document."
    )]
    Crawl(CrawlArgs),

    #[command(
        visible_alias = "cp",
        about = "Copy the admitted code files into another directory."
    )]
    Copy(CopyArgs),

    #[command(
        visible_alias = "d",
        about = "Show effective rules, skip decisions and admitted files."
    )]
    Debug(DebugArgs),

    #[command(about = "Generate or save shell completion scripts.")]
    Completion(CompletionArgs),

    #[command(about = "Show or save the default configuration file structure.")]
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub filters: FilterGroup,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,

    #[arg(
        long,
        help = "Force output to standard output.",
        help_heading = "Output Control",
        conflicts_with_all = ["save", "output"]
    )]
    pub stdout: bool,

    #[arg(
        short = 's', long, value_name = "SAVE_DIR",
        num_args = 0..=1,
        help_heading = "Output Control",
        conflicts_with = "output",
        help = "Save the tree. Optional SAVE_DIR overrides config/default logic.",
    )]
    pub save: Option<Option<PathBuf>>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help_heading = "Output Control",
        help = "Write the tree to exactly this file."
    )]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CopyArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub filters: FilterGroup,

    #[arg(
        short = 'o',
        long,
        value_name = "DIR",
        help = "Destination directory (default: [copy].output_dir)."
    )]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DebugArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub filters: FilterGroup,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(
        long,
        value_name = "SHELL",
        help = "Shell to generate completions for (fish, bash, zsh) [default: fish]"
    )]
    pub shell: Option<String>,
    #[arg(
        long,
        help = "Save completion script to default location (prompts overwrite)."
    )]
    pub save: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[arg(
        long,
        help = "Save default config structure to default path (prompts overwrite)."
    )]
    pub save: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn crawl_flags_parse() {
        let cli = Cli::try_parse_from([
            "aifeeder", "-vv", "crawl", "--include", "src", "--include", "lib", "--code-ext",
            ".rs", "--prune-empty-dirs", "-f", "yaml", "-s",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Some(Commands::Crawl(args)) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.filters.includes, vec!["src", "lib"]);
        assert_eq!(args.filters.code_extensions, vec![".rs"]);
        assert!(args.filters.prune_empty_dirs);
        assert_eq!(args.format_output.format.as_deref(), Some("yaml"));
        assert_eq!(args.save, Some(None));
    }

    #[test]
    fn stdout_conflicts_with_output_file() {
        assert!(
            Cli::try_parse_from(["aifeeder", "crawl", "--stdout", "-o", "tree.json"]).is_err()
        );
    }

    #[test]
    fn copy_alias_parses() {
        let cli = Cli::try_parse_from(["aifeeder", "cp", "--output", "/tmp/out"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Copy(CopyArgs { output: Some(_), .. }))
        ));
    }
}
