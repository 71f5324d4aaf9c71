use crate::error::{AppError, Result};
use indexmap::IndexSet;
use log;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub mod admission;

pub use admission::{Admission, DirVerdict, FileVerdict, SkipReason};

/// How include patterns are compared against a directory's relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeMode {
    /// The `/`-joined relative path starts with the pattern.
    Prefix,
    /// Some path segment equals the pattern.
    Segment,
    /// Either of the above.
    #[default]
    Either,
}

impl IncludeMode {
    pub fn matches_prefix(self) -> bool {
        matches!(self, IncludeMode::Prefix | IncludeMode::Either)
    }

    pub fn matches_segment(self) -> bool {
        matches!(self, IncludeMode::Segment | IncludeMode::Either)
    }
}

impl std::str::FromStr for IncludeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "prefix" => Ok(IncludeMode::Prefix),
            "segment" => Ok(IncludeMode::Segment),
            "either" => Ok(IncludeMode::Either),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown include mode '{}'. Use 'prefix', 'segment' or 'either'.",
                other
            ))),
        }
    }
}

/// The on-disk shape of a rule file. Every list is optional; `ignores` is the
/// older single-list format and is folded into `excludes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excludes: Option<Vec<String>>,
    #[serde(
        default,
        alias = "excludes_by_extension",
        skip_serializing_if = "Option::is_none"
    )]
    pub excludes_by_extension: Option<Vec<String>>,
    #[serde(
        default,
        alias = "code_extensions",
        skip_serializing_if = "Option::is_none"
    )]
    pub code_extensions: Option<Vec<String>>,
    #[serde(
        default,
        alias = "no_extension_files",
        skip_serializing_if = "Option::is_none"
    )]
    pub no_extension_files: Option<Vec<String>>,
    #[serde(
        default,
        alias = "exclude_globs",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_globs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignores: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFileFormat {
    Json,
    Yaml,
    Toml,
}

impl RuleFileFormat {
    /// Extensionless files (e.g. `.crawler-config`) are read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("toml") => RuleFileFormat::Toml,
            Some("yaml") | Some("yml") => RuleFileFormat::Yaml,
            _ => RuleFileFormat::Json,
        }
    }
}

/// Inclusion and exclusion rules for a single crawl.
///
/// Every list is an ordered set: entries keep the order they were given in and
/// duplicates collapse. Extensions are stored with a leading `.`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    includes: IndexSet<String>,
    excludes: IndexSet<String>,
    excludes_by_extension: IndexSet<String>,
    code_extensions: IndexSet<String>,
    #[serde(rename = "noExtensionFiles")]
    no_extension_allow_list: IndexSet<String>,
    exclude_globs: IndexSet<String>,
}

static BUILTIN_RULES: Lazy<RuleFile> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../data/default_rules.yaml"
    ));
    serde_yml::from_str(yaml_content).expect("Failed to parse embedded data/default_rules.yaml")
});

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults shipped with the binary.
    pub fn builtin() -> Self {
        Self::from(BUILTIN_RULES.clone())
    }

    pub fn with_includes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_patterns(&mut self.includes, patterns);
        self
    }

    pub fn with_excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_patterns(&mut self.excludes, patterns);
        self
    }

    pub fn with_excluded_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_extensions(&mut self.excludes_by_extension, extensions);
        self
    }

    pub fn with_code_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_extensions(&mut self.code_extensions, extensions);
        self
    }

    pub fn with_no_extension_files<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_names(&mut self.no_extension_allow_list, names);
        self
    }

    pub fn with_exclude_globs<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_names(&mut self.exclude_globs, globs);
        self
    }

    /// Appends every entry of `other` that is not already present.
    pub fn merge(self, other: &RuleSet) -> Self {
        self.with_includes(&other.includes)
            .with_excludes(&other.excludes)
            .with_excluded_extensions(&other.excludes_by_extension)
            .with_code_extensions(&other.code_extensions)
            .with_no_extension_files(&other.no_extension_allow_list)
            .with_exclude_globs(&other.exclude_globs)
    }

    pub fn includes(&self) -> &IndexSet<String> {
        &self.includes
    }
    pub fn excludes(&self) -> &IndexSet<String> {
        &self.excludes
    }
    pub fn excludes_by_extension(&self) -> &IndexSet<String> {
        &self.excludes_by_extension
    }
    pub fn code_extensions(&self) -> &IndexSet<String> {
        &self.code_extensions
    }
    pub fn no_extension_allow_list(&self) -> &IndexSet<String> {
        &self.no_extension_allow_list
    }
    pub fn exclude_globs(&self) -> &IndexSet<String> {
        &self.exclude_globs
    }

    pub fn from_str_with_format(content: &str, format: RuleFileFormat) -> Result<Self> {
        let file: RuleFile = match format {
            RuleFileFormat::Json => serde_json::from_str(content)
                .map_err(|e| AppError::Config(format!("Invalid JSON rule file: {}", e)))?,
            RuleFileFormat::Yaml => serde_yml::from_str(content)
                .map_err(|e| AppError::Config(format!("Invalid YAML rule file: {}", e)))?,
            RuleFileFormat::Toml => {
                toml::from_str(content).map_err(|e| AppError::TomlParse(e.to_string()))?
            }
        };
        Ok(Self::from(file))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        log::info!("Loading rules from: {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| AppError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let format = RuleFileFormat::from_path(path);
        log::trace!("Rule file format detected as {:?}", format);
        Self::from_str_with_format(&content, format).map_err(|e| {
            AppError::Config(format!(
                "Error loading rule file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

impl From<RuleFile> for RuleSet {
    fn from(file: RuleFile) -> Self {
        let rules = RuleSet::new()
            .with_includes(file.includes.unwrap_or_default())
            .with_excludes(file.excludes.unwrap_or_default())
            .with_excludes(file.ignores.unwrap_or_default())
            .with_excluded_extensions(file.excludes_by_extension.unwrap_or_default())
            .with_code_extensions(file.code_extensions.unwrap_or_default())
            .with_no_extension_files(file.no_extension_files.unwrap_or_default())
            .with_exclude_globs(file.exclude_globs.unwrap_or_default());
        log::trace!("Rule set built: {:?}", rules);
        rules
    }
}

impl From<&RuleSet> for RuleFile {
    fn from(rules: &RuleSet) -> Self {
        let to_vec = |set: &IndexSet<String>| Some(set.iter().cloned().collect::<Vec<_>>());
        RuleFile {
            includes: to_vec(&rules.includes),
            excludes: to_vec(&rules.excludes),
            excludes_by_extension: to_vec(&rules.excludes_by_extension),
            code_extensions: to_vec(&rules.code_extensions),
            no_extension_files: to_vec(&rules.no_extension_allow_list),
            exclude_globs: to_vec(&rules.exclude_globs),
            ignores: None,
        }
    }
}

/// Path patterns drop a leading `./` and trailing slashes; `.` means the root.
pub fn normalize_pattern(pattern: &str) -> Option<String> {
    let mut p = pattern.trim().replace('\\', "/");
    while let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }
    let p = p.trim_end_matches('/');
    match p {
        "" if pattern.trim().is_empty() => None,
        "." | "" => Some(String::new()),
        other => Some(other.to_string()),
    }
}

pub fn normalize_extension(extension: &str) -> Option<String> {
    let ext = extension.trim();
    if ext.is_empty() || ext == "." {
        None
    } else if ext.starts_with('.') {
        Some(ext.to_string())
    } else {
        Some(format!(".{}", ext))
    }
}

fn extend_patterns<I, S>(set: &mut IndexSet<String>, patterns: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    set.extend(
        patterns
            .into_iter()
            .filter_map(|p| normalize_pattern(p.as_ref())),
    );
}

fn extend_extensions<I, S>(set: &mut IndexSet<String>, extensions: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    set.extend(
        extensions
            .into_iter()
            .filter_map(|e| normalize_extension(e.as_ref())),
    );
}

fn extend_names<I, S>(set: &mut IndexSet<String>, names: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    set.extend(
        names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty()),
    );
}
