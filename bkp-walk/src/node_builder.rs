use std::path::Path;

use anyhow::{Context, Result};
use bkp_api_types::{Node, NodeType};

use crate::attrs;
use crate::time::format_us;

/// Builds a `Node` for one path. `sha256_hash` is always `None` here; the
/// backup engine computes it lazily while streaming chunks.
pub fn build_node(
    path: &Path,
    node_type: NodeType,
    base_path: &Path,
    relative_path: &str,
) -> Result<Node> {
    let attributes = attrs::read_attributes(path).with_context(|| format!("stat {}", path.display()))?;

    let link_target = if node_type == NodeType::Symlink {
        Some(
            std::fs::read_link(path)
                .with_context(|| format!("readlink {}", path.display()))?
                .to_string_lossy()
                .into_owned(),
        )
    } else {
        None
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative_path.to_string());

    Ok(Node {
        name,
        node_type,
        mode: attributes.mode,
        uid: attributes.uid,
        gid: attributes.gid,
        user: attrs::user_name(attributes.uid),
        group: attrs::group_name(attributes.gid),
        mtime: format_us(attributes.mtime_us),
        atime: format_us(attributes.atime_us),
        ctime: format_us(attributes.ctime_us),
        size: if node_type == NodeType::File {
            Some(attributes.size)
        } else {
            None
        },
        link_target,
        absolute_path: path.to_string_lossy().into_owned(),
        base_path: base_path.to_string_lossy().into_owned(),
        relative_path: relative_path.to_string(),
        content: Vec::new(),
        sha256_hash: None,
    })
}
