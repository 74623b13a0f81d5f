// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspace persistence between instance generations.
//!
//! The agent's working directory only lives as long as its machine. A copy
//! is kept on the durable volume so the next instance for the same user
//! picks up where the previous one stopped: restored on boot, backed up
//! periodically and once more on shutdown.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Copies the agent workspace to and from its backup location.
///
/// Both directions are plain tree copies. Files deleted from the source
/// are not removed from an existing target copy.
#[derive(Debug, Clone)]
pub struct DirSync {
    workspace_dir: PathBuf,
    backup_dir: PathBuf,
}

impl DirSync {
    /// Create a sync pair over the given workspace and backup directories.
    pub fn new(workspace_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Copy the backup into the workspace.
    ///
    /// Returns the number of files copied. A missing backup directory is
    /// not an error, there is simply nothing to restore.
    pub async fn restore(&self) -> std::io::Result<u64> {
        copy_tree(&self.backup_dir, &self.workspace_dir).await
    }

    /// Copy the workspace into the backup directory.
    ///
    /// Returns the number of files copied. A missing workspace is not an
    /// error, the agent may not have written anything yet.
    pub async fn backup(&self) -> std::io::Result<u64> {
        copy_tree(&self.workspace_dir, &self.backup_dir).await
    }
}

/// Copy `src` into `dst` recursively, creating directories as needed.
/// Symlinks and special files are skipped.
async fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<u64> {
    let mut copied = 0u64;
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&from).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %from.display(), "Source directory does not exist, nothing to copy");
                continue;
            }
            Err(e) => return Err(e),
        };

        tokio::fs::create_dir_all(&to).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let source = entry.path();
            let target = to.join(entry.file_name());

            if file_type.is_dir() {
                stack.push((source, target));
            } else if file_type.is_file() {
                tokio::fs::copy(&source, &target).await?;
                copied += 1;
            }
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_restore_copies_nested_tree() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backup = temp_dir.path().join("backup");
        let workspace = temp_dir.path().join("workspace");

        tokio::fs::create_dir_all(backup.join("notes")).await.unwrap();
        tokio::fs::write(backup.join("plan.md"), "step one").await.unwrap();
        tokio::fs::write(backup.join("notes/today.md"), "call back").await.unwrap();

        let sync = DirSync::new(&workspace, &backup);
        let copied = sync.restore().await.unwrap();

        assert_eq!(copied, 2);
        let plan = tokio::fs::read_to_string(workspace.join("plan.md")).await.unwrap();
        assert_eq!(plan, "step one");
        let note = tokio::fs::read_to_string(workspace.join("notes/today.md"))
            .await
            .unwrap();
        assert_eq!(note, "call back");
    }

    #[tokio::test]
    async fn test_restore_with_no_backup_copies_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backup = temp_dir.path().join("backup");
        let workspace = temp_dir.path().join("workspace");

        let sync = DirSync::new(&workspace, &backup);
        let copied = sync.restore().await.unwrap();

        assert_eq!(copied, 0);
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_backup_overwrites_stale_copy() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backup = temp_dir.path().join("backup");
        let workspace = temp_dir.path().join("workspace");

        tokio::fs::create_dir_all(&workspace).await.unwrap();
        tokio::fs::write(workspace.join("plan.md"), "revised").await.unwrap();
        tokio::fs::create_dir_all(&backup).await.unwrap();
        tokio::fs::write(backup.join("plan.md"), "original").await.unwrap();
        tokio::fs::write(backup.join("removed.md"), "old").await.unwrap();

        let sync = DirSync::new(&workspace, &backup);
        let copied = sync.backup().await.unwrap();

        assert_eq!(copied, 1);
        let plan = tokio::fs::read_to_string(backup.join("plan.md")).await.unwrap();
        assert_eq!(plan, "revised");
        // Plain copy semantics: files gone from the workspace stay in the backup.
        assert!(backup.join("removed.md").exists());
    }

    #[tokio::test]
    async fn test_backup_with_no_workspace_copies_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backup = temp_dir.path().join("backup");
        let workspace = temp_dir.path().join("workspace");

        let sync = DirSync::new(&workspace, &backup);
        let copied = sync.backup().await.unwrap();

        assert_eq!(copied, 0);
    }
}
