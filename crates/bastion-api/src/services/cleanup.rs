//! Best-effort removal of stored objects whose rows are already gone.

use futures::future::join_all;
use tracing::warn;

use bastion_core::StorageBackend;

/// Delete every object in `paths`, logging failures. Returns the failure count.
pub async fn remove_objects(storage: &dyn StorageBackend, paths: &[String], op: &str) -> usize {
    let results = join_all(paths.iter().map(|path| storage.delete(path))).await;
    let mut failed = 0;
    for (path, result) in paths.iter().zip(results) {
        if let Err(e) = result {
            failed += 1;
            warn!(
                subsystem = "api",
                component = "storage",
                op,
                path = %path,
                error = %e,
                "Failed to delete stored object"
            );
        }
    }
    failed
}
