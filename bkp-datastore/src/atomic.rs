use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Writes `data` to `target` atomically: create a unique temp file under
/// `tmp_dir`, write the full contents, fsync, then rename over `target`.
/// Rename replaces an existing file atomically on both POSIX and Windows,
/// so a concurrent reader never observes a partial file.
pub fn write_atomic(tmp_dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    fs::create_dir_all(tmp_dir).with_context(|| format!("creating {}", tmp_dir.display()))?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tmpfile");
    let unique = format!(
        "{}.{}.{:?}.tmp",
        file_name,
        std::process::id(),
        std::thread::current().id()
    );
    let tmp_path = tmp_dir.join(unique);

    {
        let mut file =
            File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("fsync {}", tmp_path.display()))?;
    }

    fs::rename(&tmp_path, target)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), target.display()))?;
    Ok(())
}
