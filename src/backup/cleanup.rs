use std::fs;
use std::io;
use std::path::Path;

/// Removes empty directories below `root`, deepest first. `root` itself is
/// kept. Returns how many directories were removed.
pub fn remove_empty_dirs(root: &Path) -> io::Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            removed += prune(&entry.path())?;
        }
    }
    Ok(removed)
}

fn prune(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            removed += prune(&entry.path())?;
        }
    }

    if fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
        tracing::debug!(path = %dir.display(), "Removed empty staging directory");
        removed += 1;
    }
    Ok(removed)
}
