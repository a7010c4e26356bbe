//! The client facade.
//!
//! Every public operation composes the same three layers: resolve the
//! owning replica address, dispatch over the configured transport with
//! bounded retry and a call deadline, then post-process results through
//! the sub-repo permission filter. The facade never reclassifies
//! transport errors; it only narrows generic not-found into the precise
//! variant it has context for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gitfleet_authz::{
    check_path, filter_file_infos, has_access_to_commit, Actor, SubRepoPermissionChecker,
};
use gitfleet_proto::{
    BatchLogCommit, BatchLogRequest, ExecRequest, ExecStatus, IsRepoCloneableRequest,
    P4ExecRequest, RepoCloneProgress, RepoCloneProgressRequest, RepoUpdateRequest,
};
use gitfleet_types::{CommitId, FileInfo, FileMode, GitObject, ObjectId, ObjectType, RepoCommit, RepoName};

use crate::addr::AddressResolver;
use crate::config::{ClientConfig, WireProtocol};
use crate::parse::{
    parse_commit_log, parse_gitmodules, parse_ls_tree, parse_rev_parse, COMMIT_LOG_FORMAT,
};
use crate::retry::RetryPolicy;
use crate::transport::{ExecStream, GitserverTransport, HttpTransport, RpcTransport};
use crate::{ClientError, GitserverAddress, Result};

/// Outcome of a repo update request.
///
/// Repeated updates are idempotent in effect (the clone converges to the
/// origin state) but not in timing: each call may trigger a fresh fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUpdateInfo {
    /// When the repository was last fetched, unix millis.
    pub last_fetched_millis: Option<i64>,
    /// When the repository content last changed, unix millis.
    pub last_changed_millis: Option<i64>,
    /// Server-reported failure, if the update could not be scheduled.
    pub error: Option<String>,
}

struct Inner {
    resolver: AddressResolver,
    transport: Arc<dyn GitserverTransport>,
    checker: Arc<dyn SubRepoPermissionChecker>,
    retry: RetryPolicy,
    default_timeout: Duration,
}

/// The gitserver fleet client.
///
/// Cheap to clone and safe for concurrent use: all shared state is
/// immutable after construction, apart from pooled transport
/// connections.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Creates a client for the given fleet, choosing the transport from
    /// `config.protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyFleet`] for an empty address list and
    /// [`ClientError::InvalidConfig`] for a zero deadline.
    pub fn new(config: ClientConfig, checker: Arc<dyn SubRepoPermissionChecker>) -> Result<Self> {
        let transport: Arc<dyn GitserverTransport> = match config.protocol {
            WireProtocol::Json => Arc::new(HttpTransport::new(config.connect_timeout)?),
            WireProtocol::Proto => Arc::new(RpcTransport::new(config.connect_timeout)),
        };
        Self::with_transport(config, checker, transport)
    }

    /// Creates a client over an explicit transport.
    ///
    /// This is the seam tests use to substitute an in-memory fake; there
    /// are no global mock hooks.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Client::new`].
    pub fn with_transport(
        config: ClientConfig,
        checker: Arc<dyn SubRepoPermissionChecker>,
        transport: Arc<dyn GitserverTransport>,
    ) -> Result<Self> {
        if config.default_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "default_timeout must be non-zero".into(),
            ));
        }
        let resolver = AddressResolver::new(config.addrs, config.pinned, config.scheme)?;
        tracing::info!(
            fleet_size = resolver.addrs().len(),
            protocol = ?config.protocol,
            "gitserver client constructed"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                resolver,
                transport,
                checker,
                retry: config.retry,
                default_timeout: config.default_timeout,
            }),
        })
    }

    /// Returns the full fleet list.
    #[must_use]
    pub fn addrs(&self) -> &[GitserverAddress] {
        self.inner.resolver.addrs()
    }

    /// Returns the replica owning `repo`.
    #[must_use]
    pub fn addr_for_repo(&self, repo: &RepoName) -> &GitserverAddress {
        self.inner.resolver.resolve(repo)
    }

    /// Resolves the tip commit of the default branch.
    ///
    /// Returns `None` for repositories without a `HEAD` commit (empty
    /// repositories), which is an expected state, not an error.
    pub async fn head(&self, repo: &RepoName) -> Result<Option<CommitId>> {
        match self.resolve_revision(repo, "HEAD").await {
            Ok(id) => Ok(Some(id)),
            Err(ClientError::RevisionNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves a revision spec (`HEAD`, `HEAD~1`, an abbreviated or full
    /// hash, a ref name) to a commit id, server-side.
    ///
    /// Unknown and ambiguous revisions are
    /// [`ClientError::RevisionNotFound`], never transport errors.
    pub async fn resolve_revision(&self, repo: &RepoName, spec: &str) -> Result<CommitId> {
        check_spec_safety(spec)?;
        let (out, status) = self
            .run_git(repo, vec!["rev-parse".into(), format!("{spec}^0")])
            .await?;
        if status.exit_code != 0 {
            return Err(ClientError::RevisionNotFound {
                repo: repo.clone(),
                spec: spec.to_string(),
            });
        }
        parse_rev_parse(&String::from_utf8_lossy(&out))
    }

    /// Lists a tree, optionally recursively.
    ///
    /// Entries the actor may not read are omitted; submodule entries
    /// carry their pinned commit and, when `.gitmodules` resolves, their
    /// clone URL.
    pub async fn read_dir(
        &self,
        actor: &Actor,
        repo: &RepoName,
        commit: &CommitId,
        path: &str,
        recurse: bool,
    ) -> Result<Vec<FileInfo>> {
        let mut args = vec![
            "ls-tree".into(),
            "--long".into(),
            "-z".into(),
            "--full-name".into(),
        ];
        if recurse {
            args.push("-r".into());
        }
        args.push(commit.as_str().into());
        args.push("--".into());
        if !path.is_empty() {
            // A trailing slash lists the directory's children rather than
            // the directory entry itself.
            args.push(format!("{}/", path.trim_end_matches('/')));
        }

        let (out, status) = self.run_git(repo, args).await?;
        if status.exit_code != 0 {
            return Err(ClientError::RevisionNotFound {
                repo: repo.clone(),
                spec: commit.as_str().to_string(),
            });
        }
        let mut entries = parse_ls_tree(&String::from_utf8_lossy(&out))?;
        self.attach_submodule_urls(repo, commit, &mut entries).await;
        filter_file_infos(self.inner.checker.as_ref(), actor, repo, entries)
            .await
            .map_err(ClientError::from)
    }

    /// Stats a single path at a commit.
    ///
    /// The empty path stats the root tree. A path the actor may not read
    /// reports [`ClientError::PathNotFound`], indistinguishable from a
    /// missing one.
    pub async fn stat(
        &self,
        actor: &Actor,
        repo: &RepoName,
        commit: &CommitId,
        path: &str,
    ) -> Result<FileInfo> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            let (out, status) = self
                .run_git(repo, vec!["rev-parse".into(), format!("{commit}^{{tree}}")])
                .await?;
            if status.exit_code != 0 {
                return Err(ClientError::RevisionNotFound {
                    repo: repo.clone(),
                    spec: commit.as_str().to_string(),
                });
            }
            let oid = ObjectId::from_hex(String::from_utf8_lossy(&out).trim())
                .map_err(|e| ClientError::Protocol(format!("rev-parse output: {e}")))?;
            return Ok(FileInfo {
                path: String::new(),
                size: 0,
                mode: FileMode::DIR,
                oid,
                submodule: None,
            });
        }

        let args = vec![
            "ls-tree".into(),
            "--long".into(),
            "-z".into(),
            "--full-name".into(),
            commit.as_str().into(),
            "--".into(),
            path.to_string(),
        ];
        let (out, status) = self.run_git(repo, args).await?;
        if status.exit_code != 0 {
            return Err(ClientError::RevisionNotFound {
                repo: repo.clone(),
                spec: commit.as_str().to_string(),
            });
        }
        let entry = parse_ls_tree(&String::from_utf8_lossy(&out))?
            .into_iter()
            .find(|e| e.path == path)
            .ok_or_else(|| not_found_path(repo, path))?;

        // Filter the fetched entry the same way read_dir filters its
        // listing, so a directory denied under the trailing-slash keying
        // is equally invisible here.
        filter_file_infos(self.inner.checker.as_ref(), actor, repo, vec![entry])
            .await?
            .pop()
            .ok_or_else(|| not_found_path(repo, path))
    }

    /// Reads a file's full contents at a commit.
    pub async fn read_file(
        &self,
        actor: &Actor,
        repo: &RepoName,
        commit: &CommitId,
        path: &str,
    ) -> Result<Bytes> {
        if !check_path(self.inner.checker.as_ref(), actor, repo, path).await? {
            return Err(not_found_path(repo, path));
        }
        let (out, status) = self
            .run_git(repo, vec!["cat-file".into(), "blob".into(), format!("{commit}:{path}")])
            .await?;
        if status.exit_code != 0 {
            return Err(not_found_path(repo, path));
        }
        Ok(out)
    }

    /// Opens a file as a lazy byte stream.
    ///
    /// The stream is finite and non-restartable; drop it to release the
    /// connection. A missing (or unreadable) path surfaces as a nonzero
    /// exit status when the stream ends.
    pub async fn file_reader(
        &self,
        actor: &Actor,
        repo: &RepoName,
        commit: &CommitId,
        path: &str,
    ) -> Result<ExecStream> {
        if !check_path(self.inner.checker.as_ref(), actor, repo, path).await? {
            return Err(not_found_path(repo, path));
        }
        let req = ExecRequest {
            repo: repo.to_string(),
            args: vec!["cat-file".into(), "blob".into(), format!("{commit}:{path}")],
            stdin: Vec::new(),
        };
        self.open_stream("file_reader", repo, req).await
    }

    /// Looks up an arbitrary git object by name, returning its id, type
    /// and contents.
    pub async fn get_object(&self, repo: &RepoName, name: &str) -> Result<(GitObject, Bytes)> {
        check_spec_safety(name)?;

        let (out, status) = self
            .run_git(repo, vec!["rev-parse".into(), "--verify".into(), name.into()])
            .await?;
        if status.exit_code != 0 {
            return Err(ClientError::RevisionNotFound {
                repo: repo.clone(),
                spec: name.to_string(),
            });
        }
        let oid = ObjectId::from_hex(String::from_utf8_lossy(&out).trim())
            .map_err(|e| ClientError::Protocol(format!("rev-parse output: {e}")))?;

        let (out, status) = self
            .run_git(repo, vec!["cat-file".into(), "-t".into(), oid.to_hex()])
            .await?;
        if status.exit_code != 0 {
            return Err(ClientError::RevisionNotFound {
                repo: repo.clone(),
                spec: name.to_string(),
            });
        }
        let object_type = ObjectType::from_str(String::from_utf8_lossy(&out).trim())
            .map_err(|e| ClientError::Protocol(format!("cat-file -t output: {e}")))?;

        let (content, status) = self
            .run_git(
                repo,
                vec!["cat-file".into(), object_type.to_string(), oid.to_hex()],
            )
            .await?;
        if status.exit_code != 0 {
            return Err(ClientError::RevisionNotFound {
                repo: repo.clone(),
                spec: name.to_string(),
            });
        }

        Ok((GitObject { id: oid, object_type }, content))
    }

    /// Resolves a batch of repo/commit pairs to commits.
    ///
    /// The response has exactly the length and order of the request; an
    /// unresolvable or permission-filtered entry is `None`. With
    /// `ignore_errors`, per-item git failures degrade to `None`; without
    /// it, the first per-item failure aborts the batch. Transport and
    /// permission-checker failures always abort: they are infrastructure
    /// errors, not item state.
    pub async fn get_commits(
        &self,
        actor: &Actor,
        repo_commits: &[RepoCommit],
        ignore_errors: bool,
    ) -> Result<Vec<Option<gitfleet_types::Commit>>> {
        for rc in repo_commits {
            check_spec_safety(&rc.commit)?;
        }

        // Partition the batch by owning replica, preserving each item's
        // original index for reassembly.
        let mut shards: HashMap<&GitserverAddress, Vec<usize>> = HashMap::new();
        for (i, rc) in repo_commits.iter().enumerate() {
            shards
                .entry(self.inner.resolver.resolve(&rc.repo))
                .or_default()
                .push(i);
        }

        let mut commits: Vec<Option<gitfleet_types::Commit>> = vec![None; repo_commits.len()];
        for (addr, indexes) in shards {
            let req = BatchLogRequest {
                repo_commits: indexes
                    .iter()
                    .map(|&i| BatchLogCommit {
                        repo: repo_commits[i].repo.to_string(),
                        commit: repo_commits[i].commit.clone(),
                    })
                    .collect(),
                format: COMMIT_LOG_FORMAT.to_string(),
            };

            let transport = Arc::clone(&self.inner.transport);
            let response = self
                .with_deadline(self.inner.retry.execute("batch_log", || {
                    let req = req.clone();
                    let transport = Arc::clone(&transport);
                    async move { transport.batch_log(addr, req).await }
                }))
                .await?;

            if response.results.len() != indexes.len() {
                return Err(ClientError::Protocol(format!(
                    "batch-log returned {} results for {} requests",
                    response.results.len(),
                    indexes.len()
                )));
            }

            for (result, &index) in response.results.iter().zip(&indexes) {
                let rc = &repo_commits[index];
                if result.repo != rc.repo.as_str() || result.commit != rc.commit {
                    return Err(ClientError::Protocol(format!(
                        "batch-log result echoes {}@{}, want {}@{}",
                        result.repo, result.commit, rc.repo, rc.commit
                    )));
                }

                if !result.error.is_empty() {
                    if ignore_errors {
                        continue;
                    }
                    return Err(ClientError::NotFound(format!(
                        "{}@{}: {}",
                        rc.repo, rc.commit, result.error
                    )));
                }

                let parsed = match parse_commit_log(&result.output) {
                    Ok(parsed) => parsed,
                    Err(e) if ignore_errors => {
                        tracing::warn!(repo = %rc.repo, commit = %rc.commit, error = %e,
                            "ignoring unparsable batch-log output");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                // An ambiguous rev expanding to several commits is a
                // visible problem regardless of permissions.
                if parsed.len() > 1 {
                    return Err(ClientError::Protocol(format!(
                        "batch-log for {}@{}: expected 1 commit, got {}",
                        rc.repo,
                        rc.commit,
                        parsed.len()
                    )));
                }
                let Some(wrapped) = parsed.into_iter().next() else {
                    continue;
                };

                if has_access_to_commit(self.inner.checker.as_ref(), actor, &rc.repo, &wrapped)
                    .await?
                {
                    commits[index] = Some(wrapped.commit);
                }
            }
        }

        Ok(commits)
    }

    /// Reports which of the given repo/commit pairs resolve to a commit
    /// the actor can see.
    pub async fn commits_exist(
        &self,
        actor: &Actor,
        repo_commits: &[RepoCommit],
    ) -> Result<Vec<bool>> {
        let commits = self.get_commits(actor, repo_commits, true).await?;
        Ok(commits.iter().map(Option::is_some).collect())
    }

    /// Schedules a fetch of the repository from its origin, debounced by
    /// `since` on the server side.
    pub async fn request_repo_update(
        &self,
        repo: &RepoName,
        since: Duration,
    ) -> Result<RepoUpdateInfo> {
        let addr = self.inner.resolver.resolve(repo);
        let req = RepoUpdateRequest {
            repo: repo.to_string(),
            since_millis: since.as_millis() as i64,
        };
        let transport = Arc::clone(&self.inner.transport);
        let resp = self
            .with_deadline(self.inner.retry.execute("repo_update", || {
                let req = req.clone();
                let transport = Arc::clone(&transport);
                async move { transport.repo_update(addr, req).await }
            }))
            .await
            .map_err(|e| narrow_repo_not_found(e, repo))?;

        Ok(RepoUpdateInfo {
            last_fetched_millis: (resp.last_fetched_millis != 0).then_some(resp.last_fetched_millis),
            last_changed_millis: (resp.last_changed_millis != 0).then_some(resp.last_changed_millis),
            error: (!resp.error.is_empty()).then(|| resp.error),
        })
    }

    /// Checks that the repository either is cloned or can be cloned from
    /// its origin.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RepoNotFound`] with the server's reason
    /// when it cannot.
    pub async fn is_repo_cloneable(&self, repo: &RepoName) -> Result<()> {
        let addr = self.inner.resolver.resolve(repo);
        let req = IsRepoCloneableRequest {
            repo: repo.to_string(),
        };
        let transport = Arc::clone(&self.inner.transport);
        let resp = self
            .with_deadline(self.inner.retry.execute("is_repo_cloneable", || {
                let req = req.clone();
                let transport = Arc::clone(&transport);
                async move { transport.is_repo_cloneable(addr, req).await }
            }))
            .await
            .map_err(|e| narrow_repo_not_found(e, repo))?;

        if resp.cloneable || resp.cloned {
            Ok(())
        } else {
            Err(ClientError::RepoNotFound {
                repo: repo.clone(),
                reason: resp.reason,
            })
        }
    }

    /// Reports clone progress for the given repositories, fanned out to
    /// each owning replica.
    pub async fn repo_clone_progress(
        &self,
        repos: &[RepoName],
    ) -> Result<HashMap<RepoName, RepoCloneProgress>> {
        let mut shards: HashMap<&GitserverAddress, Vec<&RepoName>> = HashMap::new();
        for repo in repos {
            shards
                .entry(self.inner.resolver.resolve(repo))
                .or_default()
                .push(repo);
        }

        let mut progress = HashMap::new();
        for (addr, repos) in shards {
            let req = RepoCloneProgressRequest {
                repos: repos.iter().map(|r| r.to_string()).collect(),
            };
            let transport = Arc::clone(&self.inner.transport);
            let resp = self
                .with_deadline(self.inner.retry.execute("repo_clone_progress", || {
                    let req = req.clone();
                    let transport = Arc::clone(&transport);
                    async move { transport.repo_clone_progress(addr, req).await }
                }))
                .await?;
            for (repo, state) in resp.results {
                progress.insert(RepoName::new(repo), state);
            }
        }
        Ok(progress)
    }

    /// Proxies a Perforce command through the fleet, streaming its
    /// output. Perforce proxying is not repo-addressed; the first fleet
    /// address serves it.
    pub async fn p4_exec(
        &self,
        host: &str,
        user: &str,
        password: &str,
        args: &[String],
    ) -> Result<ExecStream> {
        let addr = &self.inner.resolver.addrs()[0];
        let req = P4ExecRequest {
            host: host.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            args: args.to_vec(),
        };
        let transport = Arc::clone(&self.inner.transport);
        self.with_deadline(self.inner.retry.execute("p4_exec", || {
            let req = req.clone();
            let transport = Arc::clone(&transport);
            async move { transport.p4_exec(addr, req).await }
        }))
        .await
    }

    /// Runs a git command to completion on the repository's replica.
    async fn run_git(&self, repo: &RepoName, args: Vec<String>) -> Result<(Bytes, ExecStatus)> {
        let addr = self.inner.resolver.resolve(repo);
        let req = ExecRequest {
            repo: repo.to_string(),
            args,
            stdin: Vec::new(),
        };
        tracing::debug!(repo = %repo, addr = %addr, args = ?req.args, "exec");

        let transport = Arc::clone(&self.inner.transport);
        self.with_deadline(self.inner.retry.execute("exec", || {
            let req = req.clone();
            let transport = Arc::clone(&transport);
            async move { transport.exec(addr, req).await?.collect().await }
        }))
        .await
        .map_err(|e| narrow_repo_not_found(e, repo))
    }

    /// Opens a streaming call; retry covers only establishing the stream.
    async fn open_stream(
        &self,
        op: &'static str,
        repo: &RepoName,
        req: ExecRequest,
    ) -> Result<ExecStream> {
        let addr = self.inner.resolver.resolve(repo);
        let transport = Arc::clone(&self.inner.transport);
        self.with_deadline(self.inner.retry.execute(op, || {
            let req = req.clone();
            let transport = Arc::clone(&transport);
            async move { transport.exec(addr, req).await }
        }))
        .await
        .map_err(|e| narrow_repo_not_found(e, repo))
    }

    /// Applies the configured call deadline.
    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = self.inner.default_timeout;
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| ClientError::DeadlineExceeded(deadline))?
    }

    /// Fills in submodule URLs from `.gitmodules`, best-effort.
    async fn attach_submodule_urls(
        &self,
        repo: &RepoName,
        commit: &CommitId,
        entries: &mut [FileInfo],
    ) {
        if !entries.iter().any(|e| e.mode.is_submodule()) {
            return;
        }
        let result = self
            .run_git(
                repo,
                vec!["cat-file".into(), "blob".into(), format!("{commit}:.gitmodules")],
            )
            .await;
        let urls = match result {
            Ok((out, status)) if status.exit_code == 0 => {
                parse_gitmodules(&String::from_utf8_lossy(&out))
            }
            // A missing or unreadable .gitmodules leaves URLs empty; the
            // pinned commits are still reported.
            _ => return,
        };
        for entry in entries.iter_mut() {
            if let Some(sub) = entry.submodule.as_mut() {
                if let Some(url) = urls.get(&entry.path) {
                    sub.url = url.clone();
                }
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addrs", &self.inner.resolver.addrs())
            .finish_non_exhaustive()
    }
}

/// Rejects revision specs that could be parsed as command flags.
fn check_spec_safety(spec: &str) -> Result<()> {
    if spec.is_empty() || spec.starts_with('-') {
        return Err(ClientError::InvalidSpec(spec.to_string()));
    }
    Ok(())
}

fn not_found_path(repo: &RepoName, path: &str) -> ClientError {
    ClientError::PathNotFound {
        repo: repo.clone(),
        path: path.to_string(),
    }
}

/// Narrows a transport-level generic not-found to the repository the
/// call was about.
fn narrow_repo_not_found(e: ClientError, repo: &RepoName) -> ClientError {
    match e {
        ClientError::NotFound(reason) => ClientError::RepoNotFound {
            repo: repo.clone(),
            reason,
        },
        other => other,
    }
}
