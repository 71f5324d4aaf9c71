use crate::decode::{DetectingDecoder, TextDecoder};
use crate::error::{AppError, Result};
use crate::rules::{Admission, DirVerdict, FileVerdict, IncludeMode, RuleSet, SkipReason};
use crate::tree::OutputTree;
use log;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

/// Knobs that shape a walk without changing the rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOptions {
    pub include_mode: IncludeMode,
    /// Admitted directories get a node even when no file ends up inside.
    pub keep_empty_dirs: bool,
    pub follow_links: bool,
    /// Files larger than this many bytes are skipped before reading.
    pub max_file_size: Option<u64>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            include_mode: IncludeMode::default(),
            keep_empty_dirs: true,
            follow_links: false,
            max_file_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub reason: SkipReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of a collection: the tree and every skip decision made on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub tree: OutputTree,
    pub skipped: Vec<SkippedEntry>,
}

impl Collection {
    pub fn skipped_for(&self, reason: SkipReason) -> impl Iterator<Item = &SkippedEntry> {
        self.skipped.iter().filter(move |s| s.reason == reason)
    }
}

/// A file that passed every rule that can be checked without reading it.
#[derive(Debug, Clone)]
pub(crate) struct AdmittedFile {
    pub absolute: PathBuf,
    pub relative: PathBuf,
    pub dir_segments: Vec<String>,
    pub name: String,
}

pub(crate) enum Visit {
    Done,
    Skipped(SkipReason, String),
}

/// Receives the admitted parts of a walk. Per-entry problems come back as
/// `Visit::Skipped` so one bad entry never ends the walk.
pub(crate) trait WalkVisitor {
    fn enter_dir(&mut self, _segments: &[String]) -> Visit {
        Visit::Done
    }

    fn dir_unreadable(&mut self, _segments: &[String]) {}

    fn visit_file(&mut self, file: &AdmittedFile) -> Visit;
}

/// One read-only, depth-first pass over `root` applying the admission rules.
pub(crate) struct Walk<'a> {
    pub admission: &'a Admission<'a>,
    pub options: &'a CollectOptions,
    pub cancel: Option<&'a AtomicBool>,
    /// Subtrees never entered, e.g. output directories inside the root.
    pub avoid: &'a [PathBuf],
}

impl Walk<'_> {
    pub fn run<V: WalkVisitor>(&self, root: &Path, visitor: &mut V) -> Result<Vec<SkippedEntry>> {
        let root = resolve_root(root)?;
        log::info!("Walking directory: {}", root.display());
        let mut skipped = Vec::new();

        // Entries are compared against canonical paths; missing ones cannot be hit.
        let avoid: Vec<PathBuf> = self
            .avoid
            .iter()
            .filter_map(|p| p.canonicalize().ok())
            .filter(|p| *p != root)
            .collect();

        let root_verdict = self.admission.admit_dir(&[]);
        log::debug!("Root admission: {:?}", root_verdict);
        if root_verdict == DirVerdict::Admit {
            visitor.enter_dir(&[]);
        }
        // Verdicts of the directories on the current path, indexed by depth.
        let mut verdicts: Vec<DirVerdict> = vec![root_verdict];

        let mut walker = WalkDir::new(&root)
            .follow_links(self.options.follow_links)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry_result) = walker.next() {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    self.handle_walk_error(&root, e, visitor, &mut skipped);
                    continue;
                }
            };
            let depth = entry.depth();
            if depth == 0 {
                continue;
            }
            let path = entry.path();
            let Some(relative_path) = pathdiff::diff_paths(path, &root) else {
                log::warn!("Could not get relative path for: {}", path.display());
                continue;
            };
            let is_dir = entry.file_type().is_dir();

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                record_skip(
                    &mut skipped,
                    relative_path,
                    is_dir,
                    SkipReason::InvalidName,
                    Some("name is not valid UTF-8".to_string()),
                );
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            };
            // Ancestors were admitted by name, so every segment is valid UTF-8.
            let segments = path_segments(&relative_path);

            if is_dir {
                if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    log::info!("Walk cancelled at {}", relative_path.display());
                    return Err(AppError::Cancelled);
                }
                if avoid.iter().any(|a| a == path) {
                    record_skip(
                        &mut skipped,
                        relative_path,
                        true,
                        SkipReason::OutputDirectory,
                        None,
                    );
                    walker.skip_current_dir();
                    continue;
                }
                let verdict = self.admission.admit_dir(&segments);
                verdicts.truncate(depth);
                match verdict {
                    DirVerdict::Admit => {
                        log::trace!("Entering directory: {}", relative_path.display());
                        if let Visit::Skipped(reason, detail) = visitor.enter_dir(&segments) {
                            record_skip(&mut skipped, relative_path, true, reason, Some(detail));
                            walker.skip_current_dir();
                            verdicts.push(DirVerdict::Skip(reason));
                            continue;
                        }
                    }
                    DirVerdict::PassThrough => {
                        log::trace!("Passing through directory: {}", relative_path.display());
                    }
                    DirVerdict::Skip(reason) => {
                        record_skip(&mut skipped, relative_path, true, reason, None);
                        walker.skip_current_dir();
                    }
                }
                verdicts.push(verdict);
                continue;
            }

            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && path.is_file());
            if !is_file {
                if let Some(DirVerdict::Admit) = verdicts.get(depth - 1) {
                    let kind = if entry.path_is_symlink() {
                        "symlink not followed"
                    } else {
                        "not a regular file"
                    };
                    record_skip(
                        &mut skipped,
                        relative_path,
                        false,
                        SkipReason::SpecialFile,
                        Some(kind.to_string()),
                    );
                }
                continue;
            }

            match verdicts.get(depth - 1) {
                Some(DirVerdict::Admit) => {}
                Some(DirVerdict::PassThrough) => {
                    record_skip(
                        &mut skipped,
                        relative_path,
                        false,
                        SkipReason::NotIncluded,
                        None,
                    );
                    continue;
                }
                _ => continue,
            }

            if let FileVerdict::Skip(reason) = self.admission.admit_file(&relative_path, &name) {
                record_skip(&mut skipped, relative_path, false, reason, None);
                continue;
            }

            if let Some(limit) = self.options.max_file_size {
                match fs::metadata(path) {
                    Ok(meta) if meta.len() > limit => {
                        let detail = format!("{} bytes exceeds limit of {}", meta.len(), limit);
                        record_skip(
                            &mut skipped,
                            relative_path,
                            false,
                            SkipReason::TooLarge,
                            Some(detail),
                        );
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        record_skip(
                            &mut skipped,
                            relative_path,
                            false,
                            SkipReason::UnreadableFile,
                            Some(e.to_string()),
                        );
                        continue;
                    }
                }
            }

            let mut dir_segments = segments;
            dir_segments.pop();
            let admitted = AdmittedFile {
                absolute: path.to_path_buf(),
                relative: relative_path,
                dir_segments,
                name,
            };
            match visitor.visit_file(&admitted) {
                Visit::Done => log::trace!("Admitted file: {}", admitted.relative.display()),
                Visit::Skipped(reason, detail) => {
                    record_skip(&mut skipped, admitted.relative, false, reason, Some(detail))
                }
            }
        }

        log::info!("Walk complete. {} entries skipped.", skipped.len());
        Ok(skipped)
    }

    fn handle_walk_error<V: WalkVisitor>(
        &self,
        root: &Path,
        err: walkdir::Error,
        visitor: &mut V,
        skipped: &mut Vec<SkippedEntry>,
    ) {
        let Some(path) = err.path().map(Path::to_path_buf) else {
            log::warn!("Error walking directory: {}", err);
            return;
        };
        let relative_path = pathdiff::diff_paths(&path, root).unwrap_or_else(|| path.clone());
        let segments = path_segments(&relative_path);
        let is_dir = err.loop_ancestor().is_some() || path.is_dir();
        if is_dir {
            visitor.dir_unreadable(&segments);
        }
        let reason = if is_dir {
            SkipReason::UnreadableDirectory
        } else {
            SkipReason::UnreadableFile
        };
        record_skip(skipped, relative_path, is_dir, reason, Some(err.to_string()));
    }
}

/// Canonical form of the scan root; anything missing or unlistable is fatal.
pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf> {
    let not_found = |reason: String| AppError::RootNotFound {
        path: root.to_path_buf(),
        reason,
    };
    let canonical = root.canonicalize().map_err(|e| not_found(e.to_string()))?;
    if !canonical.is_dir() {
        return Err(not_found("not a directory".to_string()));
    }
    fs::read_dir(&canonical).map_err(|e| not_found(e.to_string()))?;
    Ok(canonical)
}

fn path_segments(relative_path: &Path) -> Vec<String> {
    relative_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn record_skip(
    skipped: &mut Vec<SkippedEntry>,
    path: PathBuf,
    is_dir: bool,
    reason: SkipReason,
    detail: Option<String>,
) {
    let suffix = detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default();
    if reason.is_failure() {
        log::warn!("Skipping {} [reason={}]{}", path.display(), reason, suffix);
    } else {
        log::debug!("Skipping {} [reason={}]{}", path.display(), reason, suffix);
    }
    skipped.push(SkippedEntry {
        path,
        is_dir,
        reason,
        detail,
    });
}

/// Builds an [`OutputTree`] from a directory and a [`RuleSet`].
pub struct Collector<'r> {
    rules: &'r RuleSet,
    options: CollectOptions,
    decoder: Box<dyn TextDecoder + 'r>,
    cancel: Option<Arc<AtomicBool>>,
    avoid: Vec<PathBuf>,
}

impl<'r> Collector<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self {
            rules,
            options: CollectOptions::default(),
            decoder: Box::new(DetectingDecoder::default()),
            cancel: None,
            avoid: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: CollectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_decoder<D: TextDecoder + 'r>(mut self, decoder: D) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    /// Checked before each directory; once set the walk stops with `Cancelled`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// A directory the walk never enters, such as an output directory inside the root.
    pub fn with_avoided_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.avoid.push(path.into());
        self
    }

    pub fn collect(&self, root: &Path) -> Result<Collection> {
        log::debug!("Starting collection in {}", root.display());
        let admission = Admission::new(self.rules, self.options.include_mode)?;
        let walk = Walk {
            admission: &admission,
            options: &self.options,
            cancel: self.cancel.as_deref(),
            avoid: &self.avoid,
        };
        let mut builder = TreeBuilder {
            tree: OutputTree::new(),
            decoder: self.decoder.as_ref(),
            keep_empty_dirs: self.options.keep_empty_dirs,
        };
        let skipped = walk.run(root, &mut builder)?;
        log::info!(
            "Collected {} files in {} directories ({} skipped).",
            builder.tree.file_count(),
            builder.tree.dir_count(),
            skipped.len()
        );
        Ok(Collection {
            tree: builder.tree,
            skipped,
        })
    }
}

/// Collects `root` with default options and the detecting decoder.
pub fn collect(root: &Path, rules: &RuleSet) -> Result<OutputTree> {
    Collector::new(rules).collect(root).map(|c| c.tree)
}

struct TreeBuilder<'d> {
    tree: OutputTree,
    decoder: &'d dyn TextDecoder,
    keep_empty_dirs: bool,
}

impl WalkVisitor for TreeBuilder<'_> {
    fn enter_dir(&mut self, segments: &[String]) -> Visit {
        if !self.keep_empty_dirs {
            return Visit::Done;
        }
        match self.tree.ensure_dir(segments) {
            Ok(_) => Visit::Done,
            Err(e) => Visit::Skipped(SkipReason::NameConflict, e.to_string()),
        }
    }

    fn dir_unreadable(&mut self, segments: &[String]) {
        if !segments.is_empty() {
            self.tree.remove(segments);
        }
    }

    fn visit_file(&mut self, file: &AdmittedFile) -> Visit {
        let bytes = match fs::read(&file.absolute) {
            Ok(bytes) => bytes,
            Err(e) => return Visit::Skipped(SkipReason::UnreadableFile, e.to_string()),
        };
        let text = match self.decoder.decode(&bytes) {
            Ok(text) => text,
            Err(e) => return Visit::Skipped(SkipReason::DecodeFailure, e.to_string()),
        };
        match self
            .tree
            .insert_file(&file.dir_segments, &file.name, text.trim().to_string())
        {
            Ok(()) => Visit::Done,
            Err(e) => Visit::Skipped(SkipReason::NameConflict, e.to_string()),
        }
    }
}
