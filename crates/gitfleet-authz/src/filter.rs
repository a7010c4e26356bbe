//! Filter helpers applied to fetched results.
//!
//! Every helper is an identity transform when the checker is disabled or
//! the actor is internal, so instances without sub-repo permissions pay
//! no per-path overhead.

use gitfleet_types::{Commit, FileInfo, RepoName};

use crate::{can_skip_checks, Actor, Perms, RepoContent, Result, SubRepoPermissionChecker};

/// A commit together with the paths it touches.
///
/// The touched-path list only exists to drive permission filtering; it is
/// not part of the public [`Commit`] value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitWithFiles {
    /// The commit itself.
    pub commit: Commit,
    /// Paths modified by the commit.
    pub files: Vec<String>,
}

/// Returns whether the actor may read `path` within `repo`.
///
/// Used as the single-path gate for file reads and stats. Callers map a
/// denial to their not-found case rather than a permission error, so a
/// restricted path is indistinguishable from a missing one.
pub async fn check_path(
    checker: &dyn SubRepoPermissionChecker,
    actor: &Actor,
    repo: &RepoName,
    path: &str,
) -> Result<bool> {
    if can_skip_checks(checker, actor) {
        return Ok(true);
    }
    let perms = checker
        .permissions(
            actor,
            &RepoContent {
                repo: repo.clone(),
                path: path.to_string(),
            },
        )
        .await?;
    Ok(perms.include_read())
}

/// Retains only the paths the actor may read, preserving order.
pub async fn filter_paths(
    checker: &dyn SubRepoPermissionChecker,
    actor: &Actor,
    repo: &RepoName,
    paths: Vec<String>,
) -> Result<Vec<String>> {
    if can_skip_checks(checker, actor) {
        return Ok(paths);
    }
    let mut visible = Vec::with_capacity(paths.len());
    for path in paths {
        if check_path(checker, actor, repo, &path).await? {
            visible.push(path);
        }
    }
    Ok(visible)
}

/// Retains only the directory entries the actor may read, preserving order.
///
/// Restricted entries are omitted rather than nulled: a listing is a set
/// of names, and an explicit placeholder would itself leak the name.
pub async fn filter_file_infos(
    checker: &dyn SubRepoPermissionChecker,
    actor: &Actor,
    repo: &RepoName,
    infos: Vec<FileInfo>,
) -> Result<Vec<FileInfo>> {
    if can_skip_checks(checker, actor) {
        return Ok(infos);
    }
    let mut visible = Vec::with_capacity(infos.len());
    for info in infos {
        // Directory permissions are checked with a trailing slash so
        // checkers can express subtree rules.
        let path = if info.is_dir() && !info.path.ends_with('/') {
            format!("{}/", info.path)
        } else {
            info.path.clone()
        };
        if check_path(checker, actor, repo, &path).await? {
            visible.push(info);
        }
    }
    Ok(visible)
}

/// Returns whether the actor may see a commit at all.
///
/// Commit visibility is all-or-nothing: a commit touching no files is
/// visible, and a commit is visible as soon as the actor can read any one
/// of its touched files. There is no partial redaction of a commit.
pub async fn has_access_to_commit(
    checker: &dyn SubRepoPermissionChecker,
    actor: &Actor,
    repo: &RepoName,
    commit: &CommitWithFiles,
) -> Result<bool> {
    if can_skip_checks(checker, actor) {
        return Ok(true);
    }
    if commit.files.is_empty() {
        return Ok(true);
    }
    for file in &commit.files {
        if check_path(checker, actor, repo, file).await? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Filters a commit list, dropping commits the actor may not see.
pub async fn filter_commits(
    checker: &dyn SubRepoPermissionChecker,
    actor: &Actor,
    repo: &RepoName,
    commits: Vec<CommitWithFiles>,
) -> Result<Vec<Commit>> {
    if can_skip_checks(checker, actor) {
        return Ok(commits.into_iter().map(|c| c.commit).collect());
    }
    let mut visible = Vec::with_capacity(commits.len());
    for commit in commits {
        if has_access_to_commit(checker, actor, repo, &commit).await? {
            visible.push(commit.commit);
        }
    }
    Ok(visible)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use gitfleet_types::{Commit, CommitId, FileMode, ObjectId, Signature};

    use super::*;
    use crate::{AuthzError, NoopChecker};

    /// Checker denying a fixed set of paths for every non-internal actor.
    struct DenyPaths {
        denied: HashSet<String>,
    }

    impl DenyPaths {
        fn new(paths: &[&str]) -> Self {
            Self {
                denied: paths.iter().map(|p| p.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl SubRepoPermissionChecker for DenyPaths {
        fn enabled(&self) -> bool {
            true
        }

        async fn permissions(
            &self,
            _actor: &Actor,
            content: &RepoContent,
        ) -> std::result::Result<Perms, AuthzError> {
            if self.denied.contains(&content.path) {
                Ok(Perms::None)
            } else {
                Ok(Perms::Read)
            }
        }
    }

    fn commit(id_byte: u8, files: &[&str]) -> CommitWithFiles {
        let hex: String = format!("{:02x}", id_byte).repeat(20);
        CommitWithFiles {
            commit: Commit {
                id: CommitId::from_hex(&hex).unwrap(),
                author: Signature {
                    name: "a".into(),
                    email: "a@example.com".into(),
                    date: 0,
                },
                committer: Signature {
                    name: "c".into(),
                    email: "c@example.com".into(),
                    date: 0,
                },
                message: "m".into(),
                parents: vec![],
            },
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn entry(path: &str, mode: FileMode) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            size: 0,
            mode,
            oid: ObjectId::from_bytes([0; 20]),
            submodule: None,
        }
    }

    #[tokio::test]
    async fn disabled_checker_is_identity() {
        let checker = NoopChecker;
        let repo = RepoName::new("r");
        let actor = Actor::user(1);
        let infos = vec![entry("secret.txt", FileMode::REGULAR)];
        let out = filter_file_infos(&checker, &actor, &repo, infos.clone())
            .await
            .unwrap();
        assert_eq!(out, infos);
    }

    #[tokio::test]
    async fn internal_actor_bypasses_enabled_checker() {
        let checker = DenyPaths::new(&["secret.txt"]);
        let repo = RepoName::new("r");
        let paths = vec!["secret.txt".to_string(), "ok.txt".to_string()];
        let out = filter_paths(&checker, &Actor::internal(), &repo, paths.clone())
            .await
            .unwrap();
        assert_eq!(out, paths);
    }

    #[tokio::test]
    async fn suppresses_exactly_denied_entries() {
        let checker = DenyPaths::new(&["secret.txt", "sub/"]);
        let repo = RepoName::new("r");
        let actor = Actor::user(1);
        let infos = vec![
            entry("ok.txt", FileMode::REGULAR),
            entry("secret.txt", FileMode::REGULAR),
            entry("sub", FileMode::DIR),
        ];
        let out = filter_file_infos(&checker, &actor, &repo, infos).await.unwrap();
        let paths: Vec<_> = out.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["ok.txt"]);
    }

    #[tokio::test]
    async fn commit_visible_if_any_file_readable() {
        let checker = DenyPaths::new(&["secret.txt"]);
        let repo = RepoName::new("r");
        let actor = Actor::user(1);

        // All files denied: hidden.
        let hidden = commit(1, &["secret.txt"]);
        assert!(!has_access_to_commit(&checker, &actor, &repo, &hidden)
            .await
            .unwrap());

        // One readable file is enough.
        let mixed = commit(2, &["secret.txt", "ok.txt"]);
        assert!(has_access_to_commit(&checker, &actor, &repo, &mixed)
            .await
            .unwrap());

        // No files at all: visible.
        let empty = commit(3, &[]);
        assert!(has_access_to_commit(&checker, &actor, &repo, &empty)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn filter_commits_drops_only_hidden() {
        let checker = DenyPaths::new(&["secret.txt"]);
        let repo = RepoName::new("r");
        let actor = Actor::user(1);
        let commits = vec![commit(1, &["ok.txt"]), commit(2, &["secret.txt"])];
        let out = filter_commits(&checker, &actor, &repo, commits).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id.as_str(), "01".repeat(20));
    }
}
