use std::path::Path;

use anyhow::Result;
use bkp_api_types::NodeAttributes;

#[cfg(unix)]
pub fn read_attributes(path: &Path) -> Result<NodeAttributes> {
    use anyhow::Context;
    use nix::sys::stat::lstat;

    let st = lstat(path).with_context(|| format!("lstat {}", path.display()))?;
    Ok(NodeAttributes {
        mode: st.st_mode as u32,
        uid: st.st_uid,
        gid: st.st_gid,
        size: st.st_size.max(0) as u64,
        mtime_us: st.st_mtime * 1_000_000 + st.st_mtime_nsec / 1_000,
        atime_us: st.st_atime * 1_000_000 + st.st_atime_nsec / 1_000,
        ctime_us: st.st_ctime * 1_000_000 + st.st_ctime_nsec / 1_000,
    })
}

#[cfg(unix)]
pub fn user_name(uid: u32) -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|u| u.name)
}

#[cfg(unix)]
pub fn group_name(gid: u32) -> Option<String> {
    nix::unistd::Group::from_gid(nix::unistd::Gid::from_raw(gid))
        .ok()
        .flatten()
        .map(|g| g.name)
}

#[cfg(windows)]
pub fn read_attributes(path: &Path) -> Result<NodeAttributes> {
    use std::os::windows::fs::MetadataExt;
    // FILETIME: 100ns intervals since 1601-01-01; convert to Unix epoch
    // microseconds the same way the rest of the engine timestamps things.
    const FILETIME_TO_UNIX_US_OFFSET: i64 = 11_644_473_600_000_000;

    let meta = std::fs::symlink_metadata(path)?;
    let to_us = |filetime: u64| (filetime as i64 / 10) - FILETIME_TO_UNIX_US_OFFSET;

    Ok(NodeAttributes {
        mode: if meta.is_dir() { 0o755 } else { 0o644 },
        uid: 0,
        gid: 0,
        size: meta.file_size(),
        mtime_us: to_us(meta.last_write_time()),
        atime_us: to_us(meta.last_access_time()),
        ctime_us: to_us(meta.creation_time()),
    })
}

#[cfg(windows)]
pub fn user_name(_uid: u32) -> Option<String> {
    None
}

#[cfg(windows)]
pub fn group_name(_gid: u32) -> Option<String> {
    None
}
