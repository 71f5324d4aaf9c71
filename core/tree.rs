use crate::error::{AppError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// A node of the collected tree: a subdirectory or a file's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TreeEntry {
    Dir(OutputTree),
    File(String),
}

/// Nested mapping mirroring the walked directories, with file contents at the
/// leaves. Keys are kept sorted so serialized output is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutputTree {
    entries: BTreeMap<String, TreeEntry>,
}

impl OutputTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &TreeEntry)> {
        self.entries.iter()
    }

    /// Returns the directory node at `segments`, creating missing levels.
    pub fn ensure_dir(&mut self, segments: &[String]) -> Result<&mut OutputTree> {
        let mut current = self;
        for segment in segments {
            let entry = current
                .entries
                .entry(segment.clone())
                .or_insert_with(|| TreeEntry::Dir(OutputTree::new()));
            current = match entry {
                TreeEntry::Dir(dir) => dir,
                TreeEntry::File(_) => {
                    return Err(AppError::TreeConflict(format!(
                        "'{}' is a file but a directory was expected",
                        segment
                    )));
                }
            };
        }
        Ok(current)
    }

    /// Places `content` at `dir_segments/file_name`, replacing any previous text.
    pub fn insert_file(
        &mut self,
        dir_segments: &[String],
        file_name: &str,
        content: String,
    ) -> Result<()> {
        let dir = self.ensure_dir(dir_segments)?;
        if let Some(TreeEntry::Dir(_)) = dir.entries.get(file_name) {
            return Err(AppError::TreeConflict(format!(
                "'{}' is a directory but a file was expected",
                file_name
            )));
        }
        dir.entries
            .insert(file_name.to_string(), TreeEntry::File(content));
        Ok(())
    }

    /// Drops the node at `segments` together with everything below it.
    pub fn remove(&mut self, segments: &[String]) -> Option<TreeEntry> {
        let (last, parents) = segments.split_last()?;
        let mut current = self;
        for segment in parents {
            current = match current.entries.get_mut(segment) {
                Some(TreeEntry::Dir(dir)) => dir,
                _ => return None,
            };
        }
        current.entries.remove(last)
    }

    pub fn get<S: AsRef<str>>(&self, segments: &[S]) -> Option<&TreeEntry> {
        let (last, parents) = segments.split_last()?;
        let mut current = self;
        for segment in parents {
            current = match current.entries.get(segment.as_ref()) {
                Some(TreeEntry::Dir(dir)) => dir,
                _ => return None,
            };
        }
        current.entries.get(last.as_ref())
    }

    /// Text of the file at `segments`, if there is one.
    pub fn file<S: AsRef<str>>(&self, segments: &[S]) -> Option<&str> {
        match self.get(segments) {
            Some(TreeEntry::File(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Every file as a `/`-joined relative path with its text, in key order.
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        self.collect_files("", &mut out);
        out
    }

    fn collect_files<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, entry) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            match entry {
                TreeEntry::File(text) => out.push((path, text.as_str())),
                TreeEntry::Dir(dir) => dir.collect_files(&path, out),
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                TreeEntry::File(_) => 1,
                TreeEntry::Dir(dir) => dir.file_count(),
            })
            .sum()
    }

    pub fn dir_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                TreeEntry::File(_) => 0,
                TreeEntry::Dir(dir) => 1 + dir.dir_count(),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_creates_intermediate_directories() {
        let mut tree = OutputTree::new();
        tree.insert_file(&segs(&["src", "lib"]), "mod.rs", "pub mod a;".into())
            .unwrap();
        assert_eq!(tree.file(&["src", "lib", "mod.rs"]), Some("pub mod a;"));
        assert!(matches!(tree.get(&["src"]), Some(TreeEntry::Dir(_))));
        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.dir_count(), 2);
    }

    #[test]
    fn file_where_directory_expected_is_a_conflict() {
        let mut tree = OutputTree::new();
        tree.insert_file(&[], "src", "oops".into()).unwrap();
        assert!(matches!(
            tree.ensure_dir(&segs(&["src"])),
            Err(AppError::TreeConflict(_))
        ));
        tree.ensure_dir(&segs(&["lib"])).unwrap();
        assert!(matches!(
            tree.insert_file(&[], "lib", "x".into()),
            Err(AppError::TreeConflict(_))
        ));
    }

    #[test]
    fn remove_drops_subtree() {
        let mut tree = OutputTree::new();
        tree.insert_file(&segs(&["a", "b"]), "c.py", "x".into())
            .unwrap();
        assert!(tree.remove(&segs(&["a", "b"])).is_some());
        assert!(tree.get(&["a", "b"]).is_none());
        assert!(tree.get(&["a"]).is_some());
        assert!(tree.remove(&segs(&["missing", "x"])).is_none());
    }

    #[test]
    fn files_are_listed_with_joined_paths() {
        let mut tree = OutputTree::new();
        tree.insert_file(&[], "setup.py", "1".into()).unwrap();
        tree.insert_file(&segs(&["pkg"]), "a.py", "2".into()).unwrap();
        let files: Vec<String> = tree.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(files, vec!["pkg/a.py".to_string(), "setup.py".to_string()]);
    }

    #[test]
    fn serializes_as_nested_mapping() {
        let mut tree = OutputTree::new();
        tree.insert_file(&segs(&["src"]), "app.py", "print(1)".into())
            .unwrap();
        tree.ensure_dir(&segs(&["empty"])).unwrap();
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"empty":{},"src":{"app.py":"print(1)"}}"#);
    }
}
