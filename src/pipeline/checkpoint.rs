/// Progress checkpoint file
///
/// A plain text file holding a single integer: the last successfully
/// completed page number. Absent on first run; overwritten after each
/// completed page; unreadable or garbage content is treated as absent so a
/// corrupted file restarts the run from page 1 instead of crashing it.
///
/// The write is not transactional with the vector-store upserts it guards —
/// a crash between the two reprocesses one page, and the upsert-by-id makes
/// that idempotent.

use std::path::Path;

use crate::errors::ArgoError;

/// Read the last completed page number, or None when the file is absent or
/// does not contain an integer.
pub fn load(path: &Path) -> Option<u32> {
    let contents = std::fs::read_to_string(path).ok()?;
    match contents.trim().parse::<u32>() {
        Ok(page) => Some(page),
        Err(_) => {
            tracing::warn!(
                path = %path.display(),
                "Checkpoint file exists but is not an integer, starting from page 1"
            );
            None
        }
    }
}

/// Overwrite the checkpoint with the given page number.
pub fn store(path: &Path, page: u32) -> Result<(), ArgoError> {
    std::fs::write(path, page.to_string())
        .map_err(|e| ArgoError::Internal(format!("Failed to write checkpoint {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(&dir.path().join("progress.log")), None);
    }

    #[test]
    fn stores_and_reloads_page_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");

        for page in 1..=5 {
            store(&path, page).unwrap();
        }

        // After N completed pages the file holds exactly N.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "5");
        assert_eq!(load(&path), Some(5));
    }

    #[test]
    fn failure_on_page_k_leaves_k_minus_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");

        // Pages 1 and 2 complete, page 3 fails before its checkpoint write.
        store(&path, 1).unwrap();
        store(&path, 2).unwrap();

        assert_eq!(load(&path), Some(2));
        // The next run resumes at the failed page.
        assert_eq!(load(&path).map(|p| p + 1), Some(3));
    }

    #[test]
    fn garbage_content_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");
        std::fs::write(&path, "not a number").unwrap();
        assert_eq!(load(&path), None);
    }
}
