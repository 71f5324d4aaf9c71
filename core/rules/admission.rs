// Directory and file admission shared by the tree collector and the copier.
use super::{IncludeMode, RuleSet};
use crate::error::{AppError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use log;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Filesystem bookkeeping files that are never collected.
pub const METADATA_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Why an entry was left out of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotIncluded,
    Excluded,
    ExcludedExtension,
    ExcludedGlob,
    MetadataFile,
    NotACodeFile,
    TooLarge,
    DecodeFailure,
    UnreadableDirectory,
    UnreadableFile,
    /// Name is not valid UTF-8 and cannot become a tree key.
    InvalidName,
    /// Name collides with an existing tree node of the other kind.
    NameConflict,
    /// Symlink to a directory, socket, fifo or dangling link.
    SpecialFile,
    OutputDirectory,
}

impl SkipReason {
    pub fn code(self) -> &'static str {
        match self {
            SkipReason::NotIncluded => "not-included",
            SkipReason::Excluded => "excluded",
            SkipReason::ExcludedExtension => "excluded-extension",
            SkipReason::ExcludedGlob => "excluded-glob",
            SkipReason::MetadataFile => "metadata-file",
            SkipReason::NotACodeFile => "not-a-code-file",
            SkipReason::TooLarge => "too-large",
            SkipReason::DecodeFailure => "decode-failure",
            SkipReason::UnreadableDirectory => "unreadable-directory",
            SkipReason::UnreadableFile => "unreadable-file",
            SkipReason::InvalidName => "invalid-name",
            SkipReason::NameConflict => "name-conflict",
            SkipReason::SpecialFile => "special-file",
            SkipReason::OutputDirectory => "output-directory",
        }
    }

    /// Failures worth a warning rather than a debug line.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            SkipReason::DecodeFailure
                | SkipReason::UnreadableDirectory
                | SkipReason::UnreadableFile
                | SkipReason::InvalidName
                | SkipReason::NameConflict
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirVerdict {
    /// Files inside are candidates and the directory gets a tree node.
    Admit,
    /// Walked only to reach included descendants; own files are not admitted.
    PassThrough,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileVerdict {
    Candidate,
    Skip(SkipReason),
}

/// A rule set prepared for repeated admission checks during one walk.
#[derive(Debug)]
pub struct Admission<'r> {
    rules: &'r RuleSet,
    mode: IncludeMode,
    exclude_globs: GlobSet,
}

impl<'r> Admission<'r> {
    pub fn new(rules: &'r RuleSet, mode: IncludeMode) -> Result<Self> {
        let exclude_globs = build_glob_set(rules.exclude_globs())?;
        Ok(Self {
            rules,
            mode,
            exclude_globs,
        })
    }

    /// Decides whether a directory (given as segments relative to the root) is walked.
    pub fn admit_dir(&self, segments: &[String]) -> DirVerdict {
        let rel = segments.join("/");
        let inclusion = self.inclusion(&rel, segments);
        if let DirVerdict::Skip(_) = inclusion {
            return inclusion;
        }
        if self.is_excluded(segments) {
            return DirVerdict::Skip(SkipReason::Excluded);
        }
        inclusion
    }

    fn inclusion(&self, rel: &str, segments: &[String]) -> DirVerdict {
        let includes = self.rules.includes();
        if includes.is_empty() {
            return DirVerdict::Admit;
        }
        let by_prefix =
            self.mode.matches_prefix() && includes.iter().any(|p| rel.starts_with(p.as_str()));
        let by_segment = self.mode.matches_segment()
            && segments.iter().any(|s| includes.contains(s.as_str()));
        if by_prefix || by_segment {
            return DirVerdict::Admit;
        }
        if segments.is_empty() {
            // The root is always walked; its own files need an explicit match.
            return DirVerdict::PassThrough;
        }
        let is_ancestor = self.mode.matches_prefix()
            && includes.iter().any(|p| {
                p.strip_prefix(rel)
                    .is_some_and(|rest| rest.starts_with('/'))
            });
        if is_ancestor {
            DirVerdict::PassThrough
        } else {
            DirVerdict::Skip(SkipReason::NotIncluded)
        }
    }

    fn is_excluded(&self, segments: &[String]) -> bool {
        self.rules.excludes().iter().any(|pattern| {
            if pattern.contains('/') {
                let parts: Vec<&str> = pattern.split('/').collect();
                segments.len() >= parts.len()
                    && segments.iter().zip(&parts).all(|(s, p)| s.as_str() == *p)
            } else {
                segments.iter().any(|s| s == pattern)
            }
        })
    }

    /// File checks that do not need the file's contents, in the order they apply.
    pub fn admit_file(&self, relative_path: &Path, file_name: &str) -> FileVerdict {
        if METADATA_FILES.contains(&file_name) {
            return FileVerdict::Skip(SkipReason::MetadataFile);
        }
        if self
            .rules
            .excludes_by_extension()
            .iter()
            .any(|ext| file_name.ends_with(ext.as_str()))
        {
            return FileVerdict::Skip(SkipReason::ExcludedExtension);
        }
        if self.exclude_globs.is_match(relative_path) {
            return FileVerdict::Skip(SkipReason::ExcludedGlob);
        }
        if self.is_code_file(file_name) {
            FileVerdict::Candidate
        } else {
            FileVerdict::Skip(SkipReason::NotACodeFile)
        }
    }

    pub fn is_code_file(&self, file_name: &str) -> bool {
        self.rules
            .code_extensions()
            .iter()
            .any(|ext| file_name.ends_with(ext.as_str()))
            || self.rules.no_extension_allow_list().contains(file_name)
            || is_bare_dotfile(file_name)
    }
}

/// `.env`, `.gitignore`: a leading dot and no other dot after it.
pub fn is_bare_dotfile(file_name: &str) -> bool {
    file_name
        .strip_prefix('.')
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('.'))
}

fn build_glob_set<'a, I>(patterns: I) -> Result<GlobSet>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut builder = GlobSetBuilder::new();
    for pattern_str in patterns {
        let mut processed_pattern = pattern_str.trim().to_string();
        if processed_pattern.ends_with('/') && processed_pattern.len() > 1 {
            processed_pattern.push_str("**");
        }
        match Glob::new(&processed_pattern) {
            Ok(glob) => {
                log::trace!(
                    "Adding exclude glob: {} (processed as {})",
                    pattern_str,
                    processed_pattern
                );
                builder.add(glob);
            }
            Err(e) => {
                log::error!("Invalid glob pattern \"{}\": {}", pattern_str, e);
                return Err(AppError::Glob(format!(
                    "Invalid glob pattern \"{}\" (processed as \"{}\"): {}",
                    pattern_str, processed_pattern, e
                )));
            }
        }
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').map(String::from).collect()
        }
    }

    fn code_rules() -> RuleSet {
        RuleSet::new()
            .with_code_extensions([".py", ".js"])
            .with_no_extension_files(["Dockerfile"])
    }

    #[test]
    fn empty_includes_admit_every_directory() {
        let rules = code_rules();
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        for dir in ["", "a", "a/b/c", "docs"] {
            assert_eq!(adm.admit_dir(&segs(dir)), DirVerdict::Admit, "{dir}");
        }
    }

    #[test]
    fn prefix_mode_matches_string_prefix() {
        let rules = code_rules().with_includes(["src"]);
        let adm = Admission::new(&rules, IncludeMode::Prefix).unwrap();
        assert_eq!(adm.admit_dir(&segs("src")), DirVerdict::Admit);
        assert_eq!(adm.admit_dir(&segs("src/lib")), DirVerdict::Admit);
        assert_eq!(
            adm.admit_dir(&segs("lib/src")),
            DirVerdict::Skip(SkipReason::NotIncluded)
        );
    }

    #[test]
    fn segment_mode_matches_any_segment() {
        let rules = code_rules().with_includes(["src"]);
        let adm = Admission::new(&rules, IncludeMode::Segment).unwrap();
        assert_eq!(adm.admit_dir(&segs("lib/src")), DirVerdict::Admit);
        assert_eq!(
            adm.admit_dir(&segs("srcgen")),
            DirVerdict::Skip(SkipReason::NotIncluded)
        );
    }

    #[test]
    fn root_is_pass_through_when_includes_are_set() {
        let rules = code_rules().with_includes(["src"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(adm.admit_dir(&[]), DirVerdict::PassThrough);
    }

    #[test]
    fn ancestors_of_nested_prefix_are_pass_through() {
        let rules = code_rules().with_includes(["src/core"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(adm.admit_dir(&segs("src")), DirVerdict::PassThrough);
        assert_eq!(adm.admit_dir(&segs("src/core")), DirVerdict::Admit);
        assert_eq!(
            adm.admit_dir(&segs("src/other")),
            DirVerdict::Skip(SkipReason::NotIncluded)
        );
        assert_eq!(
            adm.admit_dir(&segs("sr")),
            DirVerdict::Skip(SkipReason::NotIncluded)
        );
    }

    #[test]
    fn excluded_segment_skips_directory() {
        let rules = code_rules().with_excludes(["node_modules"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(
            adm.admit_dir(&segs("web/node_modules")),
            DirVerdict::Skip(SkipReason::Excluded)
        );
        assert_eq!(adm.admit_dir(&segs("web/node")), DirVerdict::Admit);
    }

    #[test]
    fn exclude_with_separator_matches_path_prefix() {
        let rules = code_rules().with_excludes(["src/generated"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(
            adm.admit_dir(&segs("src/generated/proto")),
            DirVerdict::Skip(SkipReason::Excluded)
        );
        assert_eq!(adm.admit_dir(&segs("generated")), DirVerdict::Admit);
    }

    #[test]
    fn inclusion_is_checked_before_exclusion() {
        let rules = code_rules().with_includes(["src"]).with_excludes(["docs"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(
            adm.admit_dir(&segs("docs")),
            DirVerdict::Skip(SkipReason::NotIncluded)
        );
    }

    #[test]
    fn metadata_files_are_skipped_first() {
        let rules = code_rules().with_no_extension_files([".DS_Store"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(
            adm.admit_file(Path::new(".DS_Store"), ".DS_Store"),
            FileVerdict::Skip(SkipReason::MetadataFile)
        );
    }

    #[test]
    fn excluded_extension_beats_code_extension() {
        let rules = code_rules().with_excluded_extensions([".min.js"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(
            adm.admit_file(Path::new("app.min.js"), "app.min.js"),
            FileVerdict::Skip(SkipReason::ExcludedExtension)
        );
        assert_eq!(
            adm.admit_file(Path::new("app.js"), "app.js"),
            FileVerdict::Candidate
        );
    }

    #[test]
    fn exclude_globs_match_relative_paths() {
        let rules = code_rules().with_exclude_globs(["*.test.*"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert_eq!(
            adm.admit_file(Path::new("src/app.test.js"), "app.test.js"),
            FileVerdict::Skip(SkipReason::ExcludedGlob)
        );
    }

    #[test]
    fn invalid_glob_is_an_error() {
        let rules = code_rules().with_exclude_globs(["a[b"]);
        assert!(matches!(
            Admission::new(&rules, IncludeMode::Either),
            Err(AppError::Glob(_))
        ));
    }

    #[test]
    fn candidates_by_extension_allow_list_or_dotfile() {
        let rules = code_rules();
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert!(adm.is_code_file("main.py"));
        assert!(adm.is_code_file("Dockerfile"));
        assert!(adm.is_code_file(".env"));
        assert!(!adm.is_code_file(".tar.gz"));
        assert!(!adm.is_code_file("README.md"));
        assert_eq!(
            adm.admit_file(Path::new("README.md"), "README.md"),
            FileVerdict::Skip(SkipReason::NotACodeFile)
        );
    }

    #[test]
    fn multi_dot_dotfile_can_still_match_code_extension() {
        let rules = RuleSet::new().with_code_extensions([".gz"]);
        let adm = Admission::new(&rules, IncludeMode::Either).unwrap();
        assert!(adm.is_code_file(".tar.gz"));
    }

    #[test]
    fn bare_dotfile_rules() {
        assert!(is_bare_dotfile(".gitignore"));
        assert!(!is_bare_dotfile("."));
        assert!(!is_bare_dotfile(".eslintrc.json"));
        assert!(!is_bare_dotfile("env"));
    }

    #[test]
    fn reason_codes_are_kebab_case() {
        assert_eq!(SkipReason::DecodeFailure.to_string(), "decode-failure");
        assert_eq!(SkipReason::NotACodeFile.code(), "not-a-code-file");
        assert_eq!(
            serde_json::to_string(&SkipReason::ExcludedExtension).unwrap(),
            "\"excluded-extension\""
        );
        assert!(SkipReason::UnreadableFile.is_failure());
        assert!(!SkipReason::Excluded.is_failure());
        assert_eq!(SkipReason::InvalidName.code(), "invalid-name");
        assert!(SkipReason::NameConflict.is_failure());
        assert!(!SkipReason::OutputDirectory.is_failure());
        assert_eq!(SkipReason::SpecialFile.code(), "special-file");
    }
}
