//! Facade behavior over an in-memory fake gitserver.
//!
//! The fake implements [`GitserverTransport`] directly, so these tests
//! exercise routing, retry, deadlines, parsing, and permission filtering
//! without a network or a real git.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use prost::Message as _;

use gitfleet_client::authz::{
    Actor, AuthzError, NoopChecker, Perms, RepoContent, SubRepoPermissionChecker,
};
use gitfleet_client::proto::{
    Band, BatchLogRequest, BatchLogResponse, BatchLogResult, ExecRequest, ExecStatus, Frame,
    IsRepoCloneableRequest, IsRepoCloneableResponse, P4ExecRequest, RepoCloneProgressRequest,
    RepoCloneProgressResponse, RepoUpdateRequest, RepoUpdateResponse,
};
use gitfleet_client::types::{CommitId, RepoCommit, RepoName};
use gitfleet_client::{
    Client, ClientConfig, ClientError, ExecStream, GitserverAddress, GitserverTransport,
};

const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn exec_stream(exit_code: i32, stdout: &[u8], stderr: &str) -> ExecStream {
    let mut frames = Vec::new();
    if !stdout.is_empty() {
        frames.push(Ok(Frame {
            band: Band::Stdout,
            payload: Bytes::copy_from_slice(stdout),
        }));
    }
    let status = ExecStatus {
        exit_code,
        stderr: stderr.to_string(),
    };
    frames.push(Ok(Frame {
        band: Band::Status,
        payload: status.encode_to_vec().into(),
    }));
    ExecStream::new(futures::stream::iter(frames).boxed())
}

/// One record in the batch-log wire format the client's parser expects.
fn log_record(hash: &str, files: &[&str]) -> String {
    format!(
        "\x1e{hash}\x00Alice\x00alice@example.com\x001700000000\x00Bob\x00bob@example.com\x001700000100\x00fix the thing\x00\x00{}",
        files.join("\n")
    )
}

/// A scripted gitserver fleet: canned revs, trees, blobs, and log
/// records, plus injectable transient failures and hangs.
#[derive(Default)]
struct FakeGitserver {
    /// rev-parse argument (as sent, e.g. `HEAD^0`) to commit hex.
    revs: HashMap<String, String>,
    /// ls-tree pathspec (the argument after `--`, or empty) to `-z` output.
    trees: HashMap<String, String>,
    /// `commit:path` to blob content.
    blobs: HashMap<String, Vec<u8>>,
    /// `repo@commit` to raw log output.
    log_records: HashMap<String, String>,
    /// `repo@commit` to per-item failure message.
    log_errors: HashMap<String, String>,
    update: Option<RepoUpdateResponse>,
    cloneable: Option<IsRepoCloneableResponse>,
    /// Number of leading exec calls to fail with a transient error.
    transient_execs: AtomicU32,
    hang_exec: bool,
    exec_calls: Mutex<Vec<Vec<String>>>,
    batch_calls: Mutex<Vec<(String, BatchLogRequest)>>,
}

#[async_trait]
impl GitserverTransport for FakeGitserver {
    async fn exec(
        &self,
        _addr: &GitserverAddress,
        req: ExecRequest,
    ) -> gitfleet_client::Result<ExecStream> {
        self.exec_calls.lock().push(req.args.clone());
        if self.hang_exec {
            futures::future::pending::<()>().await;
        }
        if self
            .transient_execs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ClientError::Transient("connection refused".into()));
        }

        let args: Vec<&str> = req.args.iter().map(String::as_str).collect();
        match args.first().copied() {
            Some("rev-parse") => {
                let spec = args[args.len() - 1];
                match self.revs.get(spec) {
                    Some(hex) => Ok(exec_stream(0, hex.as_bytes(), "")),
                    None => Ok(exec_stream(
                        128,
                        b"",
                        "fatal: ambiguous argument: unknown revision",
                    )),
                }
            }
            Some("ls-tree") => {
                let pathspec = args
                    .iter()
                    .position(|a| *a == "--")
                    .and_then(|i| args.get(i + 1))
                    .copied()
                    .unwrap_or("");
                let out = self.trees.get(pathspec).cloned().unwrap_or_default();
                Ok(exec_stream(0, out.as_bytes(), ""))
            }
            Some("cat-file") => match self.blobs.get(args[2]) {
                Some(content) => Ok(exec_stream(0, content, "")),
                None => Ok(exec_stream(128, b"", "fatal: path does not exist")),
            },
            other => panic!("unscripted git command: {other:?}"),
        }
    }

    async fn p4_exec(
        &self,
        _addr: &GitserverAddress,
        _req: P4ExecRequest,
    ) -> gitfleet_client::Result<ExecStream> {
        Ok(exec_stream(0, b"User bob\n", ""))
    }

    async fn batch_log(
        &self,
        addr: &GitserverAddress,
        req: BatchLogRequest,
    ) -> gitfleet_client::Result<BatchLogResponse> {
        self.batch_calls.lock().push((addr.to_string(), req.clone()));
        let results = req
            .repo_commits
            .iter()
            .map(|rc| {
                let key = format!("{}@{}", rc.repo, rc.commit);
                BatchLogResult {
                    repo: rc.repo.clone(),
                    commit: rc.commit.clone(),
                    output: self.log_records.get(&key).cloned().unwrap_or_default(),
                    error: self.log_errors.get(&key).cloned().unwrap_or_default(),
                }
            })
            .collect();
        Ok(BatchLogResponse { results })
    }

    async fn repo_update(
        &self,
        _addr: &GitserverAddress,
        _req: RepoUpdateRequest,
    ) -> gitfleet_client::Result<RepoUpdateResponse> {
        Ok(self.update.clone().unwrap())
    }

    async fn is_repo_cloneable(
        &self,
        _addr: &GitserverAddress,
        _req: IsRepoCloneableRequest,
    ) -> gitfleet_client::Result<IsRepoCloneableResponse> {
        Ok(self.cloneable.clone().unwrap())
    }

    async fn repo_clone_progress(
        &self,
        _addr: &GitserverAddress,
        _req: RepoCloneProgressRequest,
    ) -> gitfleet_client::Result<RepoCloneProgressResponse> {
        unimplemented!("not scripted")
    }
}

/// Denies every path under a prefix, allows the rest.
struct DenyPrefix(&'static str);

#[async_trait]
impl SubRepoPermissionChecker for DenyPrefix {
    fn enabled(&self) -> bool {
        true
    }

    async fn permissions(
        &self,
        _actor: &Actor,
        content: &RepoContent,
    ) -> Result<Perms, AuthzError> {
        if content.path.starts_with(self.0) {
            Ok(Perms::None)
        } else {
            Ok(Perms::Read)
        }
    }
}

fn config(addrs: &[&str]) -> ClientConfig {
    ClientConfig::new(addrs.iter().copied().map(GitserverAddress::new).collect())
}

fn client_with(fake: Arc<FakeGitserver>, checker: Arc<dyn SubRepoPermissionChecker>) -> Client {
    Client::with_transport(config(&["gitserver-1:3178"]), checker, fake).unwrap()
}

fn open_client(fake: Arc<FakeGitserver>) -> Client {
    client_with(fake, Arc::new(NoopChecker))
}

#[tokio::test]
async fn head_resolves_the_default_branch() {
    let mut fake = FakeGitserver::default();
    fake.revs.insert("HEAD^0".into(), HASH_A.into());
    let client = open_client(Arc::new(fake));

    let repo = RepoName::new("github.com/x/y");
    let head = client.head(&repo).await.unwrap();
    assert_eq!(head, Some(CommitId::from_hex(HASH_A).unwrap()));
    // Reads are idempotent against an unchanged replica.
    assert_eq!(client.head(&repo).await.unwrap(), head);
}

#[tokio::test]
async fn head_of_an_empty_repo_is_none() {
    let client = open_client(Arc::new(FakeGitserver::default()));

    let head = client.head(&RepoName::new("github.com/x/empty")).await.unwrap();
    assert_eq!(head, None);
}

#[tokio::test]
async fn unknown_revision_is_revision_not_found() {
    let client = open_client(Arc::new(FakeGitserver::default()));

    let err = client
        .resolve_revision(&RepoName::new("r"), "no-such-branch")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RevisionNotFound { .. }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn flag_like_specs_are_rejected_before_any_call() {
    let fake = Arc::new(FakeGitserver::default());
    let client = open_client(Arc::clone(&fake));

    let err = client
        .resolve_revision(&RepoName::new("r"), "--upload-pack=/bin/sh")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidSpec(_)));
    assert!(fake.exec_calls.lock().is_empty());
}

#[tokio::test]
async fn read_dir_omits_restricted_entries() {
    let mut fake = FakeGitserver::default();
    fake.trees.insert(
        String::new(),
        format!(
            "100644 blob {HASH_A} 12\tREADME.md\x00040000 tree {HASH_B} -\tsecret\x00040000 tree {HASH_B} -\tsrc\x00"
        ),
    );
    let fake = Arc::new(fake);
    let client = client_with(Arc::clone(&fake), Arc::new(DenyPrefix("secret")));
    let commit = CommitId::from_hex(HASH_A).unwrap();
    let repo = RepoName::new("r");

    let entries = client
        .read_dir(&Actor::Anonymous, &repo, &commit, "", false)
        .await
        .unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(names, ["README.md", "src"]);

    // Internal actors bypass filtering entirely.
    let entries = client
        .read_dir(&Actor::Internal, &repo, &commit, "", false)
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn stat_keys_directory_permissions_like_read_dir() {
    let mut fake = FakeGitserver::default();
    fake.trees.insert(
        String::new(),
        format!("040000 tree {HASH_B} -\tsub\x00040000 tree {HASH_B} -\tsrc\x00"),
    );
    fake.trees
        .insert("sub".into(), format!("040000 tree {HASH_B} -\tsub\x00"));
    fake.trees
        .insert("src".into(), format!("040000 tree {HASH_B} -\tsrc\x00"));
    let client = client_with(Arc::new(fake), Arc::new(DenyPrefix("sub/")));
    let commit = CommitId::from_hex(HASH_A).unwrap();
    let repo = RepoName::new("r");

    // A directory the listing omits must not exist for stat either.
    let entries = client
        .read_dir(&Actor::Anonymous, &repo, &commit, "", false)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "src");

    let err = client
        .stat(&Actor::Anonymous, &repo, &commit, "sub")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::PathNotFound { .. }));

    let visible = client
        .stat(&Actor::Anonymous, &repo, &commit, "src")
        .await
        .unwrap();
    assert_eq!(visible.path, "src");
}

#[tokio::test]
async fn restricted_file_reads_as_missing() {
    let mut fake = FakeGitserver::default();
    fake.blobs
        .insert(format!("{HASH_A}:secret/key"), b"hunter2".to_vec());
    fake.blobs
        .insert(format!("{HASH_A}:README.md"), b"# hello".to_vec());
    let client = client_with(Arc::new(fake), Arc::new(DenyPrefix("secret")));
    let commit = CommitId::from_hex(HASH_A).unwrap();
    let repo = RepoName::new("r");

    let err = client
        .read_file(&Actor::Anonymous, &repo, &commit, "secret/key")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::PathNotFound { .. }));

    let content = client
        .read_file(&Actor::Anonymous, &repo, &commit, "README.md")
        .await
        .unwrap();
    assert_eq!(&content[..], b"# hello");
}

#[tokio::test]
async fn get_commits_answers_positionally() {
    let mut fake = FakeGitserver::default();
    fake.log_records
        .insert(format!("r@{HASH_A}"), log_record(HASH_A, &[]));
    fake.log_errors.insert(
        format!("r@{HASH_B}"),
        "fatal: bad object".into(),
    );
    let client = open_client(Arc::new(fake));
    let pairs = [
        RepoCommit::new("r", HASH_A),
        RepoCommit::new("r", HASH_B),
    ];

    let commits = client
        .get_commits(&Actor::Anonymous, &pairs, true)
        .await
        .unwrap();
    assert_eq!(commits.len(), 2);
    let first = commits[0].as_ref().unwrap();
    assert_eq!(first.id, CommitId::from_hex(HASH_A).unwrap());
    assert_eq!(first.author.name, "Alice");
    assert_eq!(first.message, "fix the thing");
    assert!(commits[1].is_none());

    // Without ignore_errors the same per-item failure aborts the batch.
    let err = client
        .get_commits(&Actor::Anonymous, &pairs, false)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn get_commits_redacts_unreadable_commits() {
    let mut fake = FakeGitserver::default();
    fake.log_records.insert(
        format!("r@{HASH_A}"),
        log_record(HASH_A, &["secret/creds.txt"]),
    );
    fake.log_records
        .insert(format!("r@{HASH_B}"), log_record(HASH_B, &["src/main.rs"]));
    let client = client_with(Arc::new(fake), Arc::new(DenyPrefix("secret")));
    let pairs = [
        RepoCommit::new("r", HASH_A),
        RepoCommit::new("r", HASH_B),
    ];

    let commits = client
        .get_commits(&Actor::Anonymous, &pairs, true)
        .await
        .unwrap();
    assert!(commits[0].is_none());
    assert!(commits[1].is_some());

    let exists = client
        .commits_exist(&Actor::Anonymous, &pairs)
        .await
        .unwrap();
    assert_eq!(exists, [false, true]);
}

#[tokio::test]
async fn get_commits_shards_by_replica() {
    let mut fake = FakeGitserver::default();
    fake.log_records
        .insert(format!("repo-a@{HASH_A}"), log_record(HASH_A, &[]));
    fake.log_records
        .insert(format!("repo-b@{HASH_B}"), log_record(HASH_B, &[]));
    let fake = Arc::new(fake);

    let mut config = config(&["addr-1:3178", "addr-2:3178"]);
    config
        .pinned
        .insert(RepoName::new("repo-a"), GitserverAddress::new("addr-1:3178"));
    config
        .pinned
        .insert(RepoName::new("repo-b"), GitserverAddress::new("addr-2:3178"));
    let client =
        Client::with_transport(config, Arc::new(NoopChecker), fake.clone()).unwrap();

    let pairs = [
        RepoCommit::new("repo-a", HASH_A),
        RepoCommit::new("repo-b", HASH_B),
    ];
    let commits = client
        .get_commits(&Actor::Anonymous, &pairs, false)
        .await
        .unwrap();
    assert!(commits[0].is_some());
    assert!(commits[1].is_some());

    let calls = fake.batch_calls.lock();
    assert_eq!(calls.len(), 2, "one batch per owning replica");
    let mut addrs: Vec<&str> = calls.iter().map(|(a, _)| a.as_str()).collect();
    addrs.sort_unstable();
    assert_eq!(addrs, ["addr-1:3178", "addr-2:3178"]);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let mut fake = FakeGitserver::default();
    fake.revs.insert("HEAD^0".into(), HASH_A.into());
    fake.transient_execs = AtomicU32::new(2);
    let fake = Arc::new(fake);
    let client = open_client(Arc::clone(&fake));

    let head = client.head(&RepoName::new("r")).await.unwrap();
    assert!(head.is_some());
    assert_eq!(fake.exec_calls.lock().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn a_hung_replica_hits_the_call_deadline() {
    let mut fake = FakeGitserver::default();
    fake.hang_exec = true;
    let mut config = config(&["gitserver-1:3178"]);
    config.default_timeout = Duration::from_millis(50);
    let client =
        Client::with_transport(config, Arc::new(NoopChecker), Arc::new(fake)).unwrap();

    let err = client.head(&RepoName::new("r")).await.unwrap_err();
    assert!(matches!(err, ClientError::DeadlineExceeded(_)));
}

#[tokio::test]
async fn repo_update_maps_sentinel_zeroes_to_none() {
    let mut fake = FakeGitserver::default();
    fake.update = Some(RepoUpdateResponse {
        last_fetched_millis: 0,
        last_changed_millis: 1_700_000_000_000,
        error: String::new(),
    });
    let client = open_client(Arc::new(fake));

    let info = client
        .request_repo_update(&RepoName::new("r"), Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(info.last_fetched_millis, None);
    assert_eq!(info.last_changed_millis, Some(1_700_000_000_000));
    assert_eq!(info.error, None);
}

#[tokio::test]
async fn an_uncloneable_repo_is_repo_not_found() {
    let mut fake = FakeGitserver::default();
    fake.cloneable = Some(IsRepoCloneableResponse {
        cloneable: false,
        cloned: false,
        reason: "remote repository does not exist".into(),
    });
    let client = open_client(Arc::new(fake));

    let err = client
        .is_repo_cloneable(&RepoName::new("github.com/x/gone"))
        .await
        .unwrap_err();
    match err {
        ClientError::RepoNotFound { reason, .. } => {
            assert_eq!(reason, "remote repository does not exist");
        }
        other => panic!("want RepoNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn p4_exec_streams_output() {
    let client = open_client(Arc::new(FakeGitserver::default()));

    let stream = client
        .p4_exec("ssl:p4.example.com:1666", "bob", "tiger", &["users".into()])
        .await
        .unwrap();
    let (out, status) = stream.collect().await.unwrap();
    assert_eq!(&out[..], b"User bob\n");
    assert_eq!(status.exit_code, 0);
}
