//! Parsers for git command output.
//!
//! The replicas run real git; the client owns turning its output into
//! typed values. Malformed output is always a protocol error, never a
//! panic, and never silently skipped.

use std::collections::HashMap;

use gitfleet_authz::CommitWithFiles;
use gitfleet_types::{
    Commit, CommitId, FileInfo, FileMode, ObjectId, Signature, Submodule,
};

use crate::{ClientError, Result};

/// Log format producing NUL-separated fields and RS-separated records.
///
/// Fields: hash, author name/email/date, committer name/email/date, raw
/// body, parent hashes. `%x1e` (ASCII record separator) precedes every
/// record; with `--name-only` the touched paths follow the final NUL.
pub const COMMIT_LOG_FORMAT: &str =
    "--format=format:%x1e%H%x00%aN%x00%aE%x00%at%x00%cN%x00%cE%x00%ct%x00%B%x00%P%x00";

const PARTS_PER_COMMIT: usize = 10;

/// Parses `git log` output produced with [`COMMIT_LOG_FORMAT`].
///
/// # Errors
///
/// Returns [`ClientError::Protocol`] for records with missing fields,
/// unparsable hashes, or unparsable timestamps.
pub fn parse_commit_log(output: &str) -> Result<Vec<CommitWithFiles>> {
    let mut commits = Vec::new();
    for record in output.split('\x1e') {
        let record = record.trim_start_matches('\n');
        if record.is_empty() {
            continue;
        }
        let parts: Vec<&str> = record.splitn(PARTS_PER_COMMIT, '\x00').collect();
        if parts.len() < PARTS_PER_COMMIT {
            return Err(ClientError::Protocol(format!(
                "git log record has {} fields, want {PARTS_PER_COMMIT}",
                parts.len()
            )));
        }

        let id = parse_commit_id(parts[0])?;
        let author = parse_signature(parts[1], parts[2], parts[3])?;
        let committer = parse_signature(parts[4], parts[5], parts[6])?;
        let message = parts[7].trim_end().to_string();
        let parents = parts[8]
            .split_whitespace()
            .map(parse_commit_id)
            .collect::<Result<Vec<_>>>()?;
        let files = parts[9]
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        commits.push(CommitWithFiles {
            commit: Commit {
                id,
                author,
                committer,
                message,
                parents,
            },
            files,
        });
    }
    Ok(commits)
}

fn parse_commit_id(s: &str) -> Result<CommitId> {
    CommitId::from_hex(s.trim())
        .map_err(|e| ClientError::Protocol(format!("git log output: {e}")))
}

fn parse_signature(name: &str, email: &str, date: &str) -> Result<Signature> {
    let date: i64 = date
        .trim()
        .parse()
        .map_err(|_| ClientError::Protocol(format!("bad commit timestamp: {date:?}")))?;
    Ok(Signature {
        name: name.to_string(),
        email: email.to_string(),
        date,
    })
}

/// Parses `git ls-tree --long -z` output into tree entries.
///
/// Each NUL-terminated record is `mode SP type SP oid SP size TAB path`;
/// size is `-` for trees and gitlinks. Gitlink entries carry the pinned
/// submodule commit as their object id; URLs are attached separately from
/// `.gitmodules` by the caller.
///
/// # Errors
///
/// Returns [`ClientError::Protocol`] for malformed records.
pub fn parse_ls_tree(output: &str) -> Result<Vec<FileInfo>> {
    let mut entries = Vec::new();
    for record in output.split('\x00') {
        if record.is_empty() {
            continue;
        }
        let (meta, path) = record
            .split_once('\t')
            .ok_or_else(|| ClientError::Protocol(format!("ls-tree record without tab: {record:?}")))?;
        let fields: Vec<&str> = meta.split_whitespace().collect();
        let [mode, _object_type, oid, size] = fields.as_slice() else {
            return Err(ClientError::Protocol(format!(
                "ls-tree record has {} meta fields, want 4: {record:?}",
                fields.len()
            )));
        };

        let mode = FileMode::from_octal(mode)
            .ok_or_else(|| ClientError::Protocol(format!("bad ls-tree mode: {mode:?}")))?;
        let oid = ObjectId::from_hex(oid)
            .map_err(|e| ClientError::Protocol(format!("ls-tree output: {e}")))?;
        let size = if *size == "-" {
            0
        } else {
            size.parse()
                .map_err(|_| ClientError::Protocol(format!("bad ls-tree size: {size:?}")))?
        };

        let submodule = if mode.is_submodule() {
            Some(Submodule {
                url: String::new(),
                commit: parse_commit_id(&oid.to_hex())?,
            })
        } else {
            None
        };

        entries.push(FileInfo {
            path: path.to_string(),
            size,
            mode,
            oid,
            submodule,
        });
    }
    Ok(entries)
}

/// Parses `.gitmodules` content into a path → URL map.
///
/// Tolerant by design: unknown keys and malformed sections are skipped,
/// since a broken `.gitmodules` must not fail a directory listing.
#[must_use]
pub fn parse_gitmodules(content: &str) -> HashMap<String, String> {
    let mut urls = HashMap::new();
    let mut path: Option<String> = None;
    let mut url: Option<String> = None;

    let mut flush = |path: &mut Option<String>, url: &mut Option<String>,
                     urls: &mut HashMap<String, String>| {
        if let (Some(p), Some(u)) = (path.take(), url.take()) {
            urls.insert(p, u);
        }
    };

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("[submodule") {
            flush(&mut path, &mut url, &mut urls);
        } else if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "path" => path = Some(value.trim().to_string()),
                "url" => url = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    flush(&mut path, &mut url, &mut urls);
    urls
}

/// Parses the single commit id printed by `git rev-parse`.
pub fn parse_rev_parse(output: &str) -> Result<CommitId> {
    parse_commit_id(output)
}
