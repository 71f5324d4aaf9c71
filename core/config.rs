use crate::decode::DetectingDecoder;
use crate::error::{AppError, Result};
use crate::gather::CollectOptions;
use crate::rules::{IncludeMode, RuleFile, RuleSet};
use byte_unit::Byte;
use log;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_DIR: &str = ".aifeeder";
pub const DEFAULT_CONFIG_FILENAME: &str = "aifeeder.toml";
pub const DEFAULT_SAVE_DIR: &str = ".aifeeder/output";
pub const DEFAULT_COPY_DIR: &str = ".aifeeder/collected";
pub const DEFAULT_ENCODING_FALLBACK: &str = "windows-1252";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RulesConfig>,
    #[serde(default)]
    pub collect: CollectConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub save: SaveConfig,
    #[serde(default)]
    pub copy: CopyConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Rule file (JSON, YAML or TOML) relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct RulesConfig {
    /// Merge these rules over the builtin defaults instead of replacing them.
    #[serde(default)]
    pub extend_builtin: bool,
    #[serde(flatten)]
    pub rules: RuleFile,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CollectConfig {
    #[serde(default)]
    pub include_mode: IncludeMode,
    #[serde(default = "default_true")]
    pub keep_empty_dirs: bool,
    #[serde(default)]
    pub follow_links: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<String>,
    /// WHATWG label of the legacy encoding tried after UTF-8, or "none".
    #[serde(default = "default_encoding_fallback")]
    pub encoding_fallback: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub json_minify: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SaveConfig {
    #[serde(default = "default_save_dir")]
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CopyConfig {
    #[serde(default = "default_copy_dir")]
    pub output_dir: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_format() -> String {
    "json".to_string()
}
fn default_encoding_fallback() -> String {
    DEFAULT_ENCODING_FALLBACK.to_string()
}
fn default_save_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SAVE_DIR)
}
fn default_copy_dir() -> PathBuf {
    PathBuf::from(DEFAULT_COPY_DIR)
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            include_mode: IncludeMode::default(),
            keep_empty_dirs: default_true(),
            follow_links: false,
            max_file_size: None,
            encoding_fallback: default_encoding_fallback(),
        }
    }
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            json_minify: false,
        }
    }
}
impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            output_dir: default_save_dir(),
            filename: None,
        }
    }
}
impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            output_dir: default_copy_dir(),
        }
    }
}

impl Config {
    /// Default configuration with the builtin rules spelled out, for `config` output.
    pub fn template() -> Self {
        Self {
            rules: Some(RulesConfig {
                extend_builtin: false,
                rules: RuleFile::from(&RuleSet::builtin()),
            }),
            ..Self::default()
        }
    }

    /// Configured save and copy directories, resolved against `project_root`.
    /// A crawl never walks into these.
    pub fn output_dirs(&self, project_root: &Path) -> Vec<PathBuf> {
        [&self.save.output_dir, &self.copy.output_dir]
            .into_iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.clone()
                } else {
                    project_root.join(dir)
                }
            })
            .collect()
    }

    pub fn determine_project_root(cli_project_root: Option<&PathBuf>) -> Result<PathBuf> {
        let path_str_opt = cli_project_root
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| env::var("PROJECT_ROOT").ok().filter(|s| !s.is_empty()));

        let path_to_resolve = match path_str_opt {
            Some(p_str) => PathBuf::from(shellexpand::tilde(&p_str).as_ref()),
            None => env::current_dir().map_err(AppError::Io)?,
        };

        path_to_resolve
            .canonicalize()
            .map_err(|e| AppError::RootNotFound {
                path: path_to_resolve.clone(),
                reason: e.to_string(),
            })
    }

    pub fn resolve_config_path(
        project_root: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Option<PathBuf>> {
        if cli_disable_config {
            log::debug!("Config file loading disabled via CLI flag.");
            return Ok(None);
        }

        let Some(p_str) = cli_config_file else {
            let default_path = Self::default_config_path(project_root);
            if default_path.exists() {
                log::debug!("Using default config file path: {}", default_path.display());
                return Ok(Some(default_path));
            }
            log::debug!(
                "No config file specified and default not found at: {}",
                default_path.display()
            );
            return Ok(None);
        };

        let mut path = PathBuf::from(shellexpand::tilde(p_str).as_ref());
        let looks_like_path =
            path.is_absolute() || path.components().count() > 1 || p_str.contains(['/', '\\']);

        if looks_like_path {
            if !path.exists() && path.extension().is_none() {
                path.set_extension("toml");
            }
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "Specified config file not found at path: {}",
                    path.display()
                )));
            }
            log::debug!("Using specified config file path: {}", path.display());
            return Ok(Some(path));
        }

        let filename = if path.extension().is_none_or(|e| e != "toml") {
            format!("{}.toml", path.to_string_lossy())
        } else {
            path.to_string_lossy().to_string()
        };
        let full_path = project_root.join(DEFAULT_CONFIG_DIR).join(filename);
        if !full_path.exists() {
            return Err(AppError::Config(format!(
                "Specified config file '{}' not found in default directory: {}",
                path.display(),
                project_root.join(DEFAULT_CONFIG_DIR).display()
            )));
        }
        log::debug!(
            "Using specified config filename in default directory: {}",
            full_path.display()
        );
        Ok(Some(full_path))
    }

    pub fn default_config_path(project_root: &Path) -> PathBuf {
        project_root
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILENAME)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let toml_content = fs::read_to_string(config_path).map_err(|e| AppError::FileRead {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&toml_content).map_err(|e| {
            AppError::TomlParse(format!(
                "Error parsing config file '{}': {}. Check TOML syntax and structure.",
                config_path.display(),
                e
            ))
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).map_err(|e| AppError::TomlParse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rule precedence: explicit file, `[general].rules_file`, `[rules]`, builtin.
    pub fn effective_rules(
        &self,
        project_root: &Path,
        cli_rules_file: Option<&Path>,
    ) -> Result<RuleSet> {
        if let Some(path) = cli_rules_file {
            log::debug!("Using rules file from command line: {}", path.display());
            return RuleSet::load_from_path(path);
        }
        if let Some(rel) = &self.general.rules_file {
            let path = if rel.is_absolute() {
                rel.clone()
            } else {
                project_root.join(rel)
            };
            log::debug!("Using rules file from config: {}", path.display());
            return RuleSet::load_from_path(&path);
        }
        match &self.rules {
            Some(table) if table.extend_builtin => {
                log::debug!("Extending builtin rules with [rules] table.");
                Ok(RuleSet::builtin().merge(&RuleSet::from(table.rules.clone())))
            }
            Some(table) => {
                log::debug!("Using [rules] table from config.");
                Ok(RuleSet::from(table.rules.clone()))
            }
            None => {
                log::debug!("No rules configured, using builtin defaults.");
                Ok(RuleSet::builtin())
            }
        }
    }

    pub fn collect_options(&self) -> Result<CollectOptions> {
        let max_file_size = self
            .collect
            .max_file_size
            .as_deref()
            .map(parse_size)
            .transpose()?;
        Ok(CollectOptions {
            include_mode: self.collect.include_mode,
            keep_empty_dirs: self.collect.keep_empty_dirs,
            follow_links: self.collect.follow_links,
            max_file_size,
        })
    }

    pub fn decoder(&self) -> Result<DetectingDecoder> {
        let label = self.collect.encoding_fallback.trim();
        if label.is_empty() || label.eq_ignore_ascii_case("none") {
            return Ok(DetectingDecoder::new(None));
        }
        DetectingDecoder::with_fallback_label(label).ok_or_else(|| {
            AppError::Config(format!("Unknown encoding_fallback label '{}'", label))
        })
    }

    pub fn get_effective_project_name(&self, project_root: &Path) -> String {
        self.general.project_name.clone().unwrap_or_else(|| {
            project_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "UnknownProject".to_string())
        })
    }
}

/// Parses human-readable sizes such as `512KB` or `1 MiB` into bytes.
pub fn parse_size(size_str: &str) -> Result<u64> {
    let byte_value = Byte::from_str(size_str).map_err(|e| {
        AppError::InvalidArgument(format!(
            "Invalid size format '{}': {}. Use KB, MB, etc.",
            size_str, e
        ))
    })?;
    Ok(byte_value.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.collect.keep_empty_dirs);
        assert_eq!(config.output.format, "json");
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("[watch]\ndelay = \"1s\""),
            Err(AppError::TomlParse(_))
        ));
    }

    #[test]
    fn rules_table_replaces_builtin_by_default() {
        let config = Config::from_toml_str(
            r#"
            [rules]
            codeExtensions = [".go"]
            "#,
        )
        .unwrap();
        let rules = config.effective_rules(Path::new("."), None).unwrap();
        assert_eq!(rules.code_extensions().len(), 1);
        assert!(rules.excludes().is_empty());
    }

    #[test]
    fn rules_table_can_extend_builtin() {
        let config = Config::from_toml_str(
            r#"
            [rules]
            extend_builtin = true
            code_extensions = ["zig"]
            "#,
        )
        .unwrap();
        let rules = config.effective_rules(Path::new("."), None).unwrap();
        assert!(rules.code_extensions().contains(".zig"));
        assert!(rules.code_extensions().contains(".py"));
    }

    #[test]
    fn rules_file_in_config_is_relative_to_project_root() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".crawler-config"),
            r#"{"codeExtensions": [".tf"], "excludes": [".terraform"]}"#,
        )
        .unwrap();
        let config = Config::from_toml_str("[general]\nrules_file = \".crawler-config\"").unwrap();
        let rules = config.effective_rules(dir.path(), None).unwrap();
        assert!(rules.code_extensions().contains(".tf"));
        assert!(rules.excludes().contains(".terraform"));
    }

    #[test]
    fn collect_options_parse_sizes() {
        let config = Config::from_toml_str(
            r#"
            [collect]
            include_mode = "segment"
            keep_empty_dirs = false
            max_file_size = "1KB"
            "#,
        )
        .unwrap();
        let options = config.collect_options().unwrap();
        assert_eq!(options.include_mode, IncludeMode::Segment);
        assert!(!options.keep_empty_dirs);
        assert_eq!(options.max_file_size, Some(1000));
    }

    #[test]
    fn bad_size_is_invalid_argument() {
        assert!(matches!(
            parse_size("lots"),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn encoding_fallback_none_disables_fallback() {
        let mut config = Config::default();
        config.collect.encoding_fallback = "none".into();
        assert!(config.decoder().unwrap().fallback().is_none());
        config.collect.encoding_fallback = "not-an-encoding".into();
        assert!(config.decoder().is_err());
    }

    #[test]
    fn config_path_resolution() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            Config::resolve_config_path(dir.path(), None, false).unwrap(),
            None
        );
        let default_path = Config::default_config_path(dir.path());
        fs::create_dir_all(default_path.parent().unwrap()).unwrap();
        fs::write(&default_path, "").unwrap();
        assert_eq!(
            Config::resolve_config_path(dir.path(), None, false).unwrap(),
            Some(default_path.clone())
        );
        assert_eq!(
            Config::resolve_config_path(dir.path(), None, true).unwrap(),
            None
        );
        let named = "aifeeder".to_string();
        assert_eq!(
            Config::resolve_config_path(dir.path(), Some(&named), false).unwrap(),
            Some(default_path)
        );
        let missing = "nope".to_string();
        assert!(Config::resolve_config_path(dir.path(), Some(&missing), false).is_err());
    }

    #[test]
    fn output_dirs_resolve_under_the_root() {
        let mut config = Config::default();
        config.save.output_dir = PathBuf::from("/tmp/elsewhere");
        assert_eq!(
            config.output_dirs(Path::new("/repo")),
            vec![
                PathBuf::from("/tmp/elsewhere"),
                PathBuf::from("/repo/.aifeeder/collected")
            ]
        );
    }

    #[test]
    fn template_round_trips_through_toml() {
        let template = Config::template();
        let text = template.to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        let rules = parsed.effective_rules(Path::new("."), None).unwrap();
        assert_eq!(rules, RuleSet::builtin());
    }

    #[test]
    fn missing_project_root_is_root_not_found() {
        let missing = PathBuf::from("/no/such/project/root");
        assert!(matches!(
            Config::determine_project_root(Some(&missing)),
            Err(AppError::RootNotFound { .. })
        ));
    }
}
