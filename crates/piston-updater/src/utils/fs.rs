use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Remove a file if present. Failures are logged, not returned.
pub fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("Couldn't delete {:?}: {}", path, e);
        }
    }
}

/// True when the last modification of `path` is older than `max_age`.
/// Paths whose timestamp can't be read are never considered old.
pub fn is_older_than(path: &Path, max_age: Duration) -> bool {
    let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };

    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

/// Delete every empty directory below `root` (never `root` itself), repeating until
/// a sweep finds nothing so parents emptied by the previous sweep go too.
pub fn delete_empty_directories(root: &Path) -> io::Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut deleted = 0;
    loop {
        let empty: Vec<_> = WalkDir::new(root)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| is_empty_dir(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        if empty.is_empty() {
            return Ok(deleted);
        }

        let mut progressed = false;
        for dir in empty {
            log::info!("Deleting empty directory {:?}", dir);
            match std::fs::remove_dir(&dir) {
                Ok(()) => {
                    deleted += 1;
                    progressed = true;
                }
                Err(e) => log::warn!("Couldn't delete empty directory {:?}: {}", dir, e),
            }
        }

        if !progressed {
            return Ok(deleted);
        }
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
