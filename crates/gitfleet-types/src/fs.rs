//! Tree entry types: file modes and directory listings.

use serde::{Deserialize, Serialize};

use crate::{CommitId, ObjectId};

/// Git tree entry mode bits.
///
/// These are the raw octal modes git prints in `ls-tree` output. The
/// gitlink mode (`160000`) marks a submodule entry pinned to a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMode(pub u32);

impl FileMode {
    /// Regular non-executable file.
    pub const REGULAR: FileMode = FileMode(0o100644);
    /// Executable file.
    pub const EXECUTABLE: FileMode = FileMode(0o100755);
    /// Directory (tree entry).
    pub const DIR: FileMode = FileMode(0o040000);
    /// Symbolic link.
    pub const SYMLINK: FileMode = FileMode(0o120000);
    /// Gitlink: a submodule pinned to a commit.
    pub const GITLINK: FileMode = FileMode(0o160000);

    /// Parses the octal mode string from ls-tree output.
    #[must_use]
    pub fn from_octal(s: &str) -> Option<Self> {
        u32::from_str_radix(s, 8).ok().map(Self)
    }

    /// Returns true for directory entries.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.0 & 0o170000 == 0o040000
    }

    /// Returns true for symbolic links.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.0 & 0o170000 == 0o120000
    }

    /// Returns true for submodule (gitlink) entries.
    #[must_use]
    pub fn is_submodule(&self) -> bool {
        self.0 & 0o170000 == 0o160000
    }
}

/// Submodule information attached to a gitlink entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submodule {
    /// The submodule clone URL, when known from `.gitmodules`.
    pub url: String,
    /// The commit the superproject pins the submodule to.
    pub commit: CommitId,
}

/// One entry of a tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Repo-relative path of the entry.
    pub path: String,
    /// Size in bytes; zero for trees and gitlinks.
    pub size: u64,
    /// Git mode bits.
    pub mode: FileMode,
    /// Object id of the entry for tree identity.
    pub oid: ObjectId,
    /// Submodule data, present only when `mode.is_submodule()`.
    pub submodule: Option<Submodule>,
}

impl FileInfo {
    /// Returns the last path component.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns true for directory entries.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}
