use crate::error::{AppError, Result};
use crate::gather::{AdmittedFile, CollectOptions, SkippedEntry, Visit, Walk, WalkVisitor};
use crate::rules::{Admission, RuleSet, SkipReason};
use log;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyReport {
    pub destination: PathBuf,
    /// Relative paths of the copied files, in walk order.
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
}

/// Copies every file admitted by `rules` from `root` into `destination`,
/// keeping each file's path relative to `root`.
pub fn copy_code_files(
    root: &Path,
    rules: &RuleSet,
    options: &CollectOptions,
    destination: &Path,
) -> Result<CopyReport> {
    fs::create_dir_all(destination).map_err(|e| AppError::DirCreation {
        path: destination.to_path_buf(),
        source: e,
    })?;
    let destination = destination.canonicalize().map_err(|e| AppError::DirCreation {
        path: destination.to_path_buf(),
        source: e,
    })?;
    log::info!("Copying code files into: {}", destination.display());

    let admission = Admission::new(rules, options.include_mode)?;
    let walk = Walk {
        admission: &admission,
        options,
        cancel: None,
        avoid: std::slice::from_ref(&destination),
    };
    let mut copier = Copier {
        destination: &destination,
        copied: Vec::new(),
    };
    let skipped = walk.run(root, &mut copier)?;
    let copied = copier.copied;
    log::info!("Copied {} files ({} skipped).", copied.len(), skipped.len());
    Ok(CopyReport {
        destination,
        copied,
        skipped,
    })
}

struct Copier<'a> {
    destination: &'a Path,
    copied: Vec<PathBuf>,
}

impl WalkVisitor for Copier<'_> {
    fn visit_file(&mut self, file: &AdmittedFile) -> Visit {
        let target = self.destination.join(&file.relative);
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                let detail = format!("cannot create {}: {}", parent.display(), e);
                return Visit::Skipped(SkipReason::UnreadableFile, detail);
            }
        }
        match fs::copy(&file.absolute, &target) {
            Ok(_) => {
                log::debug!("Copied: {}", file.relative.display());
                self.copied.push(file.relative.clone());
                Visit::Done
            }
            Err(e) => Visit::Skipped(SkipReason::UnreadableFile, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn copies_admitted_files_preserving_layout() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(repo.path(), "src/app.py", "print(1)");
        write(repo.path(), "src/app.test.py", "assert True");
        write(repo.path(), "README.md", "# readme");
        write(repo.path(), "node_modules/x/index.js", "module.exports = 1");

        let rules = RuleSet::new()
            .with_code_extensions([".py", ".js"])
            .with_excludes(["node_modules"])
            .with_exclude_globs(["*.test.*"]);
        let report =
            copy_code_files(repo.path(), &rules, &CollectOptions::default(), out.path()).unwrap();

        assert_eq!(report.copied, vec![PathBuf::from("src/app.py")]);
        assert_eq!(
            fs::read_to_string(out.path().join("src/app.py")).unwrap(),
            "print(1)"
        );
        assert!(!out.path().join("node_modules").exists());
        assert!(!out.path().join("README.md").exists());
    }

    #[test]
    fn destination_inside_root_is_not_walked() {
        let repo = TempDir::new().unwrap();
        write(repo.path(), "lib/a.py", "a = 1");
        let dest = repo.path().join("collected");
        let rules = RuleSet::new().with_code_extensions([".py"]);

        copy_code_files(repo.path(), &rules, &CollectOptions::default(), &dest).unwrap();
        let second =
            copy_code_files(repo.path(), &rules, &CollectOptions::default(), &dest).unwrap();

        assert_eq!(second.copied, vec![PathBuf::from("lib/a.py")]);
        assert!(!dest.join("collected").exists());
    }

    #[test]
    fn destination_is_reported_as_an_output_directory() {
        let repo = TempDir::new().unwrap();
        write(repo.path(), "lib/a.py", "a = 1");
        let dest = repo.path().join("collected");
        let rules = RuleSet::new().with_code_extensions([".py"]);

        let report =
            copy_code_files(repo.path(), &rules, &CollectOptions::default(), &dest).unwrap();

        let avoided: Vec<_> = report
            .skipped
            .iter()
            .filter(|s| s.reason == SkipReason::OutputDirectory)
            .map(|s| s.path.clone())
            .collect();
        assert_eq!(avoided, vec![PathBuf::from("collected")]);
    }

    #[test]
    fn copied_bytes_are_not_decoded() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let path = repo.path().join("blob.py");
        fs::write(&path, [0u8, 159, 146, 150]).unwrap();
        let rules = RuleSet::new().with_code_extensions([".py"]);
        copy_code_files(repo.path(), &rules, &CollectOptions::default(), out.path()).unwrap();
        assert_eq!(
            fs::read(out.path().join("blob.py")).unwrap(),
            vec![0u8, 159, 146, 150]
        );
    }
}
