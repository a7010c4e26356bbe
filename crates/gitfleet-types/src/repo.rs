//! Repository naming types.

use serde::{Deserialize, Serialize};

/// The name of a repository, unique within the platform.
///
/// Repository names act as the routing key for the fleet: the address
/// resolver hashes the name to pick the replica that owns the clone.
/// Names are normalized on construction so that routing and comparisons
/// are insensitive to a trailing `.git` suffix and to the case of the
/// host segment (hostnames are case-insensitive; repo paths are not).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoName(String);

impl RepoName {
    /// Creates a normalized repository name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let name = name.strip_suffix(".git").unwrap_or(&name);
        let normalized = match name.split_once('/') {
            Some((host, rest)) => format!("{}/{rest}", host.to_ascii_lowercase()),
            None => name.to_ascii_lowercase(),
        };
        Self(normalized)
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the name is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for RepoName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One unit of work in a batched commit lookup.
///
/// The revision is a spec (`HEAD`, `deadbeef`, a full id, ...) resolved
/// server-side; responses preserve the position of each pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCommit {
    /// The repository to look the commit up in.
    pub repo: RepoName,
    /// The revision spec to resolve.
    pub commit: String,
}

impl RepoCommit {
    /// Creates a new repo/commit pair.
    pub fn new(repo: impl Into<RepoName>, commit: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            commit: commit.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_git_suffix() {
        assert_eq!(
            RepoName::new("github.com/x/y.git"),
            RepoName::new("github.com/x/y")
        );
        assert_eq!(RepoName::new("github.com/x/y").as_str(), "github.com/x/y");
    }

    #[test]
    fn lowercases_the_host_segment_only() {
        assert_eq!(
            RepoName::new("GitHub.com/Org/Repo"),
            RepoName::new("github.com/Org/Repo")
        );
        // Path case is significant and preserved.
        assert_eq!(
            RepoName::new("GitHub.com/Org/Repo").as_str(),
            "github.com/Org/Repo"
        );
        assert_ne!(
            RepoName::new("github.com/org/repo"),
            RepoName::new("github.com/Org/Repo")
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let name = RepoName::new("github.com/x/y");
        assert_eq!(
            serde_json::to_string(&name).unwrap(),
            "\"github.com/x/y\""
        );
    }
}
