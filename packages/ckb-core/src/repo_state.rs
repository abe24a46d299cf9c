//! RepoState fingerprinting: a cheap, deterministic cache key for "what does
//! the working tree currently look like" without re-walking the full tree.

use chrono::{DateTime, Utc};
use git2::{DiffOptions, Repository, StatusOptions};
use sha2::{Digest, Sha256};

use crate::errors::{CkbError, Result};
use crate::hashing::SHA256_EMPTY;

/// Fingerprint of a repository's HEAD commit plus everything not yet
/// committed: staged changes, unstaged changes, and untracked files.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoState {
    pub head_commit: String,
    pub staged_diff_hash: String,
    pub working_tree_diff_hash: String,
    pub untracked_list_hash: String,
    pub dirty: bool,
    pub computed_at: DateTime<Utc>,
    pub repo_state_id: String,
}

/// Compute the current `RepoState` for the repository at `repo_root`.
///
/// Returns `CkbError` with kind `InvalidParameter` if `repo_root` is not
/// inside a Git working tree.
pub fn compute_repo_state(repo_root: impl AsRef<std::path::Path>) -> Result<RepoState> {
    let repo = Repository::open(repo_root.as_ref()).map_err(|e| {
        CkbError::invalid_parameter(format!(
            "{} is not a git repository: {e}",
            repo_root.as_ref().display()
        ))
        .with_fix("git init", false)
    })?;

    let head_commit = match repo.head() {
        Ok(head) => head
            .peel_to_commit()
            .map_err(|e| CkbError::internal(format!("failed to resolve HEAD: {e}")))?
            .id()
            .to_string(),
        // A brand-new repo with no commits yet has no HEAD; treat it as the
        // hash of nothing so repo_state_id is still well-defined.
        Err(_) => SHA256_EMPTY.to_string(),
    };

    let staged_diff_hash = diff_hash_for(&repo, DiffTarget::Staged)?;
    let working_tree_diff_hash = diff_hash_for(&repo, DiffTarget::WorkingTree)?;
    let untracked_list_hash = untracked_list_hash(&repo)?;

    let dirty = staged_diff_hash != SHA256_EMPTY
        || working_tree_diff_hash != SHA256_EMPTY
        || untracked_list_hash != SHA256_EMPTY;

    let repo_state_id = compute_repo_state_id(
        &head_commit,
        &staged_diff_hash,
        &working_tree_diff_hash,
        &untracked_list_hash,
    );

    Ok(RepoState {
        head_commit,
        staged_diff_hash,
        working_tree_diff_hash,
        untracked_list_hash,
        dirty,
        computed_at: Utc::now(),
        repo_state_id,
    })
}

fn compute_repo_state_id(head: &str, staged: &str, working: &str, untracked: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(head.as_bytes());
    hasher.update(b":");
    hasher.update(staged.as_bytes());
    hasher.update(b":");
    hasher.update(working.as_bytes());
    hasher.update(b":");
    hasher.update(untracked.as_bytes());
    format!("{:x}", hasher.finalize())
}

enum DiffTarget {
    /// index vs. HEAD
    Staged,
    /// workdir vs. index
    WorkingTree,
}

fn diff_hash_for(repo: &Repository, target: DiffTarget) -> Result<String> {
    let mut opts = DiffOptions::new();
    opts.include_untracked(false);

    let diff = match target {
        DiffTarget::Staged => {
            let tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
            repo.diff_tree_to_index(tree.as_ref(), None, Some(&mut opts))
        }
        DiffTarget::WorkingTree => repo.diff_index_to_workdir(None, Some(&mut opts)),
    }
    .map_err(|e| CkbError::internal(format!("failed to compute diff: {e}")))?;

    let mut hasher = Sha256::new();
    let mut saw_any = false;
    diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
        saw_any = true;
        hasher.update(line.content());
        true
    })
    .map_err(|e| CkbError::internal(format!("failed to render diff: {e}")))?;

    if saw_any {
        Ok(format!("{:x}", hasher.finalize()))
    } else {
        Ok(SHA256_EMPTY.to_string())
    }
}

fn untracked_list_hash(repo: &Repository) -> Result<String> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);

    let statuses = repo
        .statuses(Some(&mut opts))
        .map_err(|e| CkbError::internal(format!("failed to list statuses: {e}")))?;

    let mut paths: Vec<&str> = statuses
        .iter()
        .filter(|s| s.status().is_wt_new())
        .filter_map(|s| s.path())
        .collect();
    paths.sort_unstable();

    if paths.is_empty() {
        return Ok(SHA256_EMPTY.to_string());
    }

    let mut hasher = Sha256::new();
    for path in paths {
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}
