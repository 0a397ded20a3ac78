use std::path::{Path, PathBuf};

use bkp_api_types::{Node, NodeType};
use log::warn;
use walkdir::WalkDir;

use crate::node_builder::build_node;

/// One walk result: either a fully built node, or a path that could not be
/// read (e.g. it disappeared between enumeration and open). The caller
/// (backup engine) counts the latter as a report error without aborting.
pub enum WalkOutcome {
    Entry(Node),
    Error { path: PathBuf, message: String },
}

/// Depth-first traversal of a root directory. Symlinks are recorded, never
/// followed. `relative_path` is rooted at the base directory's own
/// basename, so the top-level folder name survives into the index.
pub struct Walker {
    base_path: PathBuf,
    base_name: String,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let base_path = root.into();
        let base_name = base_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| base_path.to_string_lossy().into_owned());
        Self { base_path, base_name }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Walks depth-first, yielding one outcome per entry. Stops enumerating
    /// entirely only on an error enumerating a directory itself; individual
    /// unreadable files are reported and skipped.
    pub fn walk(&self) -> impl Iterator<Item = WalkOutcome> + '_ {
        WalkDir::new(&self.base_path)
            .follow_links(false)
            .same_file_system(true)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => Some(self.build_outcome(entry.path())),
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warn!("walk error at {}: {}", path.display(), err);
                    Some(WalkOutcome::Error {
                        path,
                        message: err.to_string(),
                    })
                }
            })
    }

    fn build_outcome(&self, path: &Path) -> WalkOutcome {
        let relative_path = self.relative_path(path);

        let node_type = match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    NodeType::Symlink
                } else if meta.is_dir() {
                    NodeType::Dir
                } else {
                    NodeType::File
                }
            }
            Err(err) => {
                warn!("failed to stat {}: {}", path.display(), err);
                return WalkOutcome::Error {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                };
            }
        };

        match build_node(path, node_type, &self.base_path, &relative_path) {
            Ok(node) => WalkOutcome::Entry(node),
            Err(err) => {
                warn!("failed to build node for {}: {}", path.display(), err);
                WalkOutcome::Error {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                }
            }
        }
    }

    fn relative_path(&self, path: &Path) -> String {
        if path == self.base_path {
            return self.base_name.clone();
        }
        let suffix = path.strip_prefix(&self.base_path).unwrap_or(path);
        let mut rel = PathBuf::from(&self.base_name);
        rel.push(suffix);
        rel.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_files_dirs_and_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::write(root.join("sub").join("b.txt"), b"world").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("link")).unwrap();

        let walker = Walker::new(&root);
        let mut files = 0;
        let mut dirs = 0;
        let mut symlinks = 0;
        for outcome in walker.walk() {
            match outcome {
                WalkOutcome::Entry(node) => {
                    assert!(node.relative_path.starts_with("data"));
                    match node.node_type {
                        NodeType::File => files += 1,
                        NodeType::Dir => dirs += 1,
                        NodeType::Symlink => symlinks += 1,
                    }
                }
                WalkOutcome::Error { path, message } => panic!("unexpected error at {path:?}: {message}"),
            }
        }
        assert_eq!(files, 2);
        assert!(dirs >= 2); // root + sub
        #[cfg(unix)]
        assert_eq!(symlinks, 1);
    }

    #[test]
    fn relative_path_keeps_base_dir_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("mydata");
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("nested").join("f"), b"x").unwrap();

        let walker = Walker::new(&root);
        let found = walker.walk().find_map(|outcome| match outcome {
            WalkOutcome::Entry(node) if node.name == "f" => Some(node.relative_path),
            _ => None,
        });
        assert_eq!(found, Some("mydata/nested/f".to_string()));
    }
}
