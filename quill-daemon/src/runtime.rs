use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use quill_core::{config, Config, Note, SenderId, SyncResult};
use quill_sync::{Pipeline, RepoState, Reply, VcsTool};

use crate::error::{io_err, DaemonError};
use crate::paths::{quill_root, socket_path, QUEUE_DEPTH};
use crate::protocol::{DaemonRequest, DaemonResponse};

#[derive(Debug, Clone)]
enum JobKind {
    Note(Note),
    Start(SenderId),
    Sync(String),
}

impl JobKind {
    fn label(&self) -> &'static str {
        match self {
            JobKind::Note(_) => "note",
            JobKind::Start(_) => "start",
            JobKind::Sync(_) => "sync",
        }
    }

    fn from_request(request: &DaemonRequest) -> Result<Self, String> {
        let sender = || {
            request
                .sender_id
                .map(SenderId)
                .ok_or_else(|| format!("'{}' requires sender_id", request.cmd))
        };
        match request.cmd.as_str() {
            "note" => Ok(JobKind::Note(Note::received(
                request.text.as_deref().unwrap_or_default(),
                sender()?,
            ))),
            "start" => Ok(JobKind::Start(sender()?)),
            "sync" => request
                .file
                .clone()
                .map(JobKind::Sync)
                .ok_or_else(|| "'sync' requires file".to_string()),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

struct Job {
    kind: JobKind,
    respond_to: oneshot::Sender<JobOutcome>,
}

/// Result of one queued job, sent back as `data`.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub replies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncResult>,
    pub duration_ms: u128,
}

/// What `status` reports about the pipeline between jobs.
#[derive(Debug, Clone, Serialize)]
struct PipelineSnapshot {
    processed: u64,
    last_job_at_unix: u64,
    sync_enabled: bool,
    repo: Option<RepoState>,
    working_dir: PathBuf,
}

impl PipelineSnapshot {
    fn of<T: VcsTool>(pipeline: &Pipeline<T>, processed: u64, last_job_at_unix: u64) -> Self {
        Self {
            processed,
            last_job_at_unix,
            sync_enabled: pipeline.sync_enabled(),
            repo: pipeline.repo_state().cloned(),
            working_dir: pipeline.working_dir().to_path_buf(),
        }
    }
}

type SharedSnapshot = Arc<RwLock<PipelineSnapshot>>;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let config = config::load_at(home)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon with a `git`-backed pipeline.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    let pipeline = Pipeline::from_config(&config)?;
    serve(home, pipeline).await
}

async fn serve<T>(home: PathBuf, pipeline: Pipeline<T>) -> Result<(), DaemonError>
where
    T: VcsTool + Send + 'static,
{
    ensure_runtime_dirs(&home)?;
    let started_at_unix = unix_seconds_now();
    let snapshot: SharedSnapshot = Arc::new(RwLock::new(PipelineSnapshot::of(&pipeline, 0, 0)));

    let (job_tx, job_rx) = mpsc::channel::<Job>(QUEUE_DEPTH);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tracing::info!(
        home = %home.display(),
        sync_enabled = pipeline.sync_enabled(),
        "quill daemon starting",
    );

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let snapshot = snapshot.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = pipeline_processor_task(pipeline, snapshot, job_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let snapshot = snapshot.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                snapshot,
                job_tx,
                shutdown.clone(),
                shutdown_rx,
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (processor_result, socket_result, signal_result) =
        tokio::join!(processor_handle, socket_handle, signal_handle);

    handle_join("pipeline_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("quill daemon stopped");
    Ok(())
}

/// Sole owner of the pipeline. Jobs run one at a time in arrival order.
async fn pipeline_processor_task<T>(
    mut pipeline: Pipeline<T>,
    snapshot: SharedSnapshot,
    mut job_rx: mpsc::Receiver<Job>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    T: VcsTool + Send + 'static,
{
    let mut processed = 0u64;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();
                let kind = job.kind;
                let label = kind.label();

                let (returned, mut outcome) = tokio::task::spawn_blocking(move || {
                    let outcome = process(&mut pipeline, kind);
                    (pipeline, outcome)
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("pipeline task join error: {err}")))?;
                pipeline = returned;

                processed += 1;
                outcome.duration_ms = started.elapsed().as_millis();
                *snapshot.write().await = PipelineSnapshot::of(&pipeline, processed, unix_seconds_now());

                tracing::info!(
                    job = label,
                    file = outcome.file_name.as_deref().unwrap_or("-"),
                    synced = outcome.sync.as_ref().map(|r| r.ok),
                    duration_ms = outcome.duration_ms,
                    "job completed",
                );
                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

fn process<T: VcsTool>(pipeline: &mut Pipeline<T>, kind: JobKind) -> JobOutcome {
    let mut outcome = JobOutcome {
        replies: Vec::new(),
        file_name: None,
        sync: None,
        duration_ms: 0,
    };
    let replies = match kind {
        JobKind::Note(note) => {
            let ingested = pipeline.ingest(&note);
            let replies = Reply::for_ingest(&ingested);
            if let Ok(ingested) = ingested {
                outcome.file_name = Some(ingested.file_name);
                outcome.sync = ingested.sync;
            }
            replies
        }
        JobKind::Start(sender) => vec![pipeline.greet(sender)],
        JobKind::Sync(file_name) => {
            let replies = match pipeline.sync(&file_name) {
                Ok(None) => vec![Reply::SyncDisabled],
                Ok(Some(result)) => {
                    let replies = Reply::for_sync(&result, &file_name).into_iter().collect();
                    outcome.sync = Some(result);
                    replies
                }
                Err(err) => vec![Reply::Failure(format!("❌ Failed to sync {file_name}: {err}"))],
            };
            outcome.file_name = Some(file_name);
            replies
        }
    };
    outcome.replies = replies.iter().map(Reply::to_string).collect();
    outcome
}

async fn socket_server_task(
    home: PathBuf,
    snapshot: SharedSnapshot,
    job_tx: mpsc::Sender<Job>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let snapshot = snapshot.clone();
                let job_tx = job_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        snapshot,
                        job_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    snapshot: SharedSnapshot,
    job_tx: mpsc::Sender<Job>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => {
                DaemonResponse::ok(build_status_payload(&home, &snapshot, started_at_unix).await)
            }
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            _ => match JobKind::from_request(&request) {
                Ok(kind) => match enqueue(&job_tx, kind).await {
                    Ok(outcome) => DaemonResponse::ok(json!(outcome)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
                Err(message) => DaemonResponse::error(message),
            },
        };
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(home: &Path, snapshot: &SharedSnapshot, started_at_unix: u64) -> Value {
    let snapshot = snapshot.read().await.clone();
    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": started_at_unix,
        "processed": snapshot.processed,
        "last_job_at_unix": snapshot.last_job_at_unix,
        "sync_enabled": snapshot.sync_enabled,
        "repo": snapshot.repo,
        "working_dir": snapshot.working_dir.display().to_string(),
        "socket": socket_path(home).display().to_string(),
    })
}

async fn enqueue(job_tx: &mpsc::Sender<Job>, kind: JobKind) -> Result<JobOutcome, DaemonError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(Job {
            kind,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("pipeline queue"))?;
    rx.await
        .map_err(|_| DaemonError::ChannelClosed("pipeline response"))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = quill_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the fmt subscriber (`RUST_LOG`, default `info`) on stderr.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use quill_core::config::parse_allowed_ids;
    use quill_sync::VcsError;
    use tempfile::TempDir;

    const OWNER: i64 = 5;

    /// Records commit messages across threads.
    #[derive(Clone, Default)]
    struct RecordingVcs {
        commits: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingVcs {
        fn commits(&self) -> Vec<String> {
            self.commits.lock().unwrap().clone()
        }
    }

    impl VcsTool for RecordingVcs {
        fn clone_repo(&self, _remote_url: &str, dest: &Path) -> Result<(), VcsError> {
            fs::create_dir_all(dest.join(".git")).map_err(|source| VcsError::Spawn {
                args: "clone".to_string(),
                source,
            })
        }
        fn add(&self, _workdir: &Path, _file: &str) -> Result<(), VcsError> {
            Ok(())
        }
        fn has_staged_changes(&self, _workdir: &Path) -> Result<bool, VcsError> {
            Ok(true)
        }
        fn commit(&self, _workdir: &Path, message: &str) -> Result<(), VcsError> {
            self.commits.lock().unwrap().push(message.to_string());
            Ok(())
        }
        fn pull_rebase(&self, _workdir: &Path, _branch: &str) -> Result<(), VcsError> {
            Ok(())
        }
        fn push(&self, _workdir: &Path, _branch: &str) -> Result<(), VcsError> {
            Ok(())
        }
    }

    fn pipeline(home: &Path, tool: RecordingVcs) -> Pipeline<RecordingVcs> {
        let mut config = Config::defaults_at(home);
        config.remote_url = Some("git@example.com:me/notes.git".to_string());
        config.allowed_ids = parse_allowed_ids(&OWNER.to_string());
        Pipeline::with_tool(&config, tool).expect("pipeline")
    }

    fn spawn_processor(
        pipeline: Pipeline<RecordingVcs>,
    ) -> (mpsc::Sender<Job>, SharedSnapshot, broadcast::Sender<()>) {
        let snapshot = Arc::new(RwLock::new(PipelineSnapshot::of(&pipeline, 0, 0)));
        let (job_tx, job_rx) = mpsc::channel(QUEUE_DEPTH);
        let (shutdown_tx, _) = broadcast::channel(4);
        tokio::spawn(pipeline_processor_task(
            pipeline,
            snapshot.clone(),
            job_rx,
            shutdown_tx.subscribe(),
        ));
        (job_tx, snapshot, shutdown_tx)
    }

    #[tokio::test]
    async fn queue_preserves_arrival_order() {
        let home = TempDir::new().unwrap();
        let tool = RecordingVcs::default();
        let (job_tx, snapshot, shutdown) = spawn_processor(pipeline(home.path(), tool.clone()));

        let mut pending = Vec::new();
        for text in ["first idea", "second idea", "third idea"] {
            let (tx, rx) = oneshot::channel();
            job_tx
                .send(Job {
                    kind: JobKind::Note(Note::received(text, OWNER)),
                    respond_to: tx,
                })
                .await
                .unwrap();
            pending.push(rx);
        }
        for rx in pending {
            let outcome = rx.await.unwrap();
            assert!(outcome.sync.is_some_and(|r| r.ok));
        }

        assert_eq!(
            tool.commits(),
            [
                "Added idea: first_idea.md",
                "Added idea: second_idea.md",
                "Added idea: third_idea.md",
            ]
        );
        assert_eq!(snapshot.read().await.processed, 3);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn note_outcome_carries_reply_strings() {
        let home = TempDir::new().unwrap();
        let (job_tx, _snapshot, shutdown) =
            spawn_processor(pipeline(home.path(), RecordingVcs::default()));

        let outcome = enqueue(&job_tx, JobKind::Note(Note::received("hello there", OWNER)))
            .await
            .unwrap();
        assert_eq!(outcome.replies, ["✅ Idea saved as hello_there.md"]);
        assert_eq!(outcome.file_name.as_deref(), Some("hello_there.md"));

        let denied = enqueue(&job_tx, JobKind::Note(Note::received("hello", SenderId(99))))
            .await
            .unwrap();
        assert_eq!(denied.replies, ["⛔️ You are not authorized to use this bot."]);
        assert!(denied.file_name.is_none());
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn start_greets_allowed_sender() {
        let home = TempDir::new().unwrap();
        let (job_tx, _snapshot, shutdown) =
            spawn_processor(pipeline(home.path(), RecordingVcs::default()));

        let outcome = enqueue(&job_tx, JobKind::Start(SenderId(OWNER))).await.unwrap();
        assert_eq!(
            outcome.replies,
            ["👋 Send me a message and I'll save it as a Markdown idea!"]
        );
        let _ = shutdown.send(());
    }

    #[test]
    fn requests_map_to_jobs() {
        let note = JobKind::from_request(&DaemonRequest::note(OWNER, "idea")).unwrap();
        assert!(matches!(note, JobKind::Note(n) if n.raw_text == "idea"));

        let sync = JobKind::from_request(&DaemonRequest::sync("a.md")).unwrap();
        assert!(matches!(sync, JobKind::Sync(f) if f == "a.md"));

        let err = JobKind::from_request(&DaemonRequest::command("note")).unwrap_err();
        assert_eq!(err, "'note' requires sender_id");

        let err = JobKind::from_request(&DaemonRequest::command("dance")).unwrap_err();
        assert_eq!(err, "unknown command 'dance'");
    }

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let home = TempDir::new().unwrap();
        let socket = home.path().join("daemon.sock");
        fs::write(&socket, "").unwrap();
        prepare_socket_for_bind(&socket).expect("stale socket cleared");
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn status_payload_reports_pipeline_snapshot() {
        let home = TempDir::new().unwrap();
        let pipeline = pipeline(home.path(), RecordingVcs::default());
        let snapshot = Arc::new(RwLock::new(PipelineSnapshot::of(&pipeline, 2, 10)));

        let payload = build_status_payload(home.path(), &snapshot, 1).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["processed"], json!(2));
        assert_eq!(payload["sync_enabled"], json!(true));
        assert_eq!(payload["repo"], json!({ "state": "uninitialized" }));
    }
}
