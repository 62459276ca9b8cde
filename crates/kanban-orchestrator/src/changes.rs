use git2::{DiffFormat, DiffOptions, DiffStatsFormat, ErrorCode, Repository, Status, StatusOptions};
use kanban_core::{KanbanError, KanbanResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

const MAX_DIFF_CHARS: usize = 50_000;

/// Status of one changed path, staged and unstaged folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    /// Content or mode changed.
    Modified,
    /// New in the index.
    Added,
    /// Removed from the tree or the index.
    Deleted,
    /// Renamed in the index or the tree.
    Renamed,
    /// Present on disk, unknown to git.
    Untracked,
}

/// One entry of `git status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    /// Relative to the repository root.
    pub path: String,
    /// Kind of change.
    pub status: FileChangeKind,
}

/// Uncommitted changes in a project directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingTreeChanges {
    /// False for a directory outside any git repository.
    pub is_repository: bool,
    /// Any staged, unstaged or untracked change.
    pub has_changes: bool,
    /// Changed paths, in `git status` order.
    pub files: Vec<ChangedFile>,
    /// `git diff --stat` style summary.
    pub summary: String,
    /// Unified diff against `HEAD`, truncated for large trees.
    pub diff: String,
}

impl WorkingTreeChanges {
    /// Nothing to commit in a real repository.
    pub fn is_clean_repository(&self) -> bool {
        self.is_repository && !self.has_changes
    }
}

fn git_err(e: git2::Error) -> KanbanError {
    KanbanError::Git(e.message().to_string())
}

fn classify(status: Status) -> Option<FileChangeKind> {
    if status.is_wt_new() {
        Some(FileChangeKind::Untracked)
    } else if status.is_index_new() {
        Some(FileChangeKind::Added)
    } else if status.is_index_deleted() || status.is_wt_deleted() {
        Some(FileChangeKind::Deleted)
    } else if status.is_index_renamed() || status.is_wt_renamed() {
        Some(FileChangeKind::Renamed)
    } else if status.intersects(
        Status::INDEX_MODIFIED
            | Status::WT_MODIFIED
            | Status::INDEX_TYPECHANGE
            | Status::WT_TYPECHANGE
            | Status::CONFLICTED,
    ) {
        Some(FileChangeKind::Modified)
    } else {
        None
    }
}

/// Inspect `path`. A directory outside any repository reports
/// `is_repository = false` rather than an error.
pub fn inspect(path: &Path) -> KanbanResult<WorkingTreeChanges> {
    let repo = match Repository::discover(path) {
        Ok(repo) => repo,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(WorkingTreeChanges::default()),
        Err(e) => return Err(git_err(e)),
    };

    let mut status_opts = StatusOptions::new();
    status_opts
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut status_opts)).map_err(git_err)?;

    let files: Vec<ChangedFile> = statuses
        .iter()
        .filter_map(|entry| {
            let status = classify(entry.status())?;
            let path = entry.path()?.to_string();
            Some(ChangedFile { path, status })
        })
        .collect();

    let head_tree = repo.head().ok().and_then(|head| head.peel_to_tree().ok());
    let mut diff_opts = DiffOptions::new();
    diff_opts
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);
    let diff = repo
        .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut diff_opts))
        .map_err(git_err)?;

    let summary = diff
        .stats()
        .and_then(|stats| stats.to_buf(DiffStatsFormat::FULL, 80))
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .map_err(git_err)?;

    let mut patch = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if patch.len() >= MAX_DIFF_CHARS {
            return true;
        }
        if matches!(line.origin(), '+' | '-' | ' ') {
            patch.push(line.origin());
        }
        patch.push_str(&String::from_utf8_lossy(line.content()));
        true
    })
    .map_err(git_err)?;
    if patch.len() > MAX_DIFF_CHARS {
        let mut cut = MAX_DIFF_CHARS;
        while !patch.is_char_boundary(cut) {
            cut -= 1;
        }
        patch.truncate(cut);
        patch.push_str("\n... (diff truncated)\n");
    }

    Ok(WorkingTreeChanges {
        is_repository: true,
        has_changes: !files.is_empty(),
        files,
        summary,
        diff: patch,
    })
}

/// [`inspect`] on the blocking pool.
pub async fn inspect_async(path: PathBuf) -> KanbanResult<WorkingTreeChanges> {
    tokio::task::spawn_blocking(move || inspect(&path))
        .await
        .map_err(|e| KanbanError::Git(format!("inspection task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commit_all(repo: &Repository, message: &str) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn test_plain_directory_is_not_a_repository() {
        let tmp = TempDir::new().unwrap();
        let changes = inspect(tmp.path()).unwrap();
        assert!(!changes.is_repository);
        assert!(!changes.is_clean_repository());
    }

    #[test]
    fn test_clean_repository() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("README.md"), "hello\n").unwrap();
        commit_all(&repo, "init");

        let changes = inspect(tmp.path()).unwrap();
        assert!(changes.is_clean_repository());
        assert!(changes.files.is_empty());
    }

    #[test]
    fn test_modified_and_untracked_files() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("README.md"), "hello\n").unwrap();
        commit_all(&repo, "init");

        std::fs::write(tmp.path().join("README.md"), "hello world\n").unwrap();
        std::fs::write(tmp.path().join("new.txt"), "fresh\n").unwrap();

        let changes = inspect(tmp.path()).unwrap();
        assert!(changes.has_changes);
        let kind_of = |p: &str| changes.files.iter().find(|f| f.path == p).map(|f| f.status);
        assert_eq!(kind_of("README.md"), Some(FileChangeKind::Modified));
        assert_eq!(kind_of("new.txt"), Some(FileChangeKind::Untracked));
        assert!(changes.diff.contains("+hello world"));
        assert!(changes.summary.contains("README.md"));
    }
}
