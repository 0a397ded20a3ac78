use serde::{Deserialize, Serialize};

/// One filesystem entry captured in an [`Index`](crate::index::Index).
///
/// Directory and symlink nodes carry no [`content`](Node::content); they are
/// still recorded so the restore engine can recreate attributes and empty
/// directories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,

    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub user: Option<String>,
    pub group: Option<String>,

    /// Formatted `YYYY-MM-DD HH:MM:SS.ffffff`, compared to microsecond
    /// precision when deciding whether a file is unchanged.
    pub mtime: String,
    pub atime: String,
    pub ctime: String,

    /// Files only.
    pub size: Option<u64>,
    /// Symlinks only.
    pub link_target: Option<String>,

    pub absolute_path: String,
    pub base_path: String,
    pub relative_path: String,

    /// Files only: ordered, contiguous chunk references.
    pub content: Vec<ChunkRef>,
    /// Files only: SHA-256 over the concatenated chunk bytes in offset order.
    pub sha256_hash: Option<String>,
}

impl Node {
    /// `size == sum(content[].length)` and chunks are contiguous from 0.
    pub fn content_is_contiguous(&self) -> bool {
        let mut expected = 0u64;
        for chunk in &self.content {
            if chunk.offset != expected {
                return false;
            }
            expected += chunk.length;
        }
        match self.size {
            Some(size) => size == expected,
            None => expected == 0,
        }
    }
}

/// Tagged variant, never a stringly-typed field: an unknown tag fails to
/// deserialize instead of panicking somewhere downstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    File,
    Dir,
    Symlink,
}

/// A positional reference into the content-addressed chunk store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRef {
    pub offset: u64,
    pub length: u64,
    /// MD5 hex of the chunk bytes; also the object-store key.
    pub etag: String,
}

/// Platform-uniform attributes returned by the walker's attribute capability
/// (POSIX `lstat`/uid-gid lookup on Unix, `MetadataExt` on Windows with
/// uid/gid filled with zero).
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeAttributes {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime_us: i64,
    pub atime_us: i64,
    pub ctime_us: i64,
}
