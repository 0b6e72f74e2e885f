use crate::config::PipelineConfig;
use crate::error::DistributorError;
use crate::orchestrator::{FileOutcome, Pipeline};
use crate::registry::StageRegistry;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, error, info, warn};

/// Line a worker prints once its pipeline is built
const READY: &str = "ready";

/// One entry of the work queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    File(PathBuf),
    /// Tells the worker pulling it to stop
    Stop,
}

struct QueueState {
    items: VecDeque<WorkItem>,
    /// Items handed out or queued but not yet acknowledged
    unfinished: usize,
}

/// Blocking FIFO shared by the feeder threads.
///
/// Every item taken with [`WorkQueue::get`] must be acknowledged with
/// [`WorkQueue::task_done`]; [`WorkQueue::join`] blocks until all of them are.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    finished: Condvar,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
            }),
            available: Condvar::new(),
            finished: Condvar::new(),
        }
    }

    // A panicking feeder never leaves the queue half-updated
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, item: WorkItem) {
        let mut state = self.lock();
        state.items.push_back(item);
        state.unfinished += 1;
        self.available.notify_one();
    }

    /// Take the next item, waiting for one if the queue is empty
    pub fn get(&self) -> WorkItem {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return item;
            }
            state = self.available.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn task_done(&self) {
        let mut state = self.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.finished.notify_all();
        }
    }

    pub fn join(&self) {
        let mut state = self.lock();
        while state.unfinished > 0 {
            state = self.finished.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Result of one file, as reported by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Done,
    Skipped,
    Failed(String),
}

impl FileStatus {
    /// Wire form: `done`, `skipped` or `failed\t<message>`, one line
    pub fn to_line(&self) -> String {
        match self {
            FileStatus::Done => "done".to_string(),
            FileStatus::Skipped => "skipped".to_string(),
            FileStatus::Failed(msg) => format!("failed\t{}", msg.replace(['\n', '\r'], " ")),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        match line.trim_end_matches(['\n', '\r']) {
            "done" => Some(FileStatus::Done),
            "skipped" => Some(FileStatus::Skipped),
            other => other
                .strip_prefix("failed\t")
                .map(|msg| FileStatus::Failed(msg.to_string())),
        }
    }
}

/// Counts of files by outcome for one run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    fn record(&mut self, status: &FileStatus) {
        match status {
            FileStatus::Done => self.processed += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: RunSummary) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// A running worker that owns its own pipeline.
///
/// `process` only fails when the worker itself is gone; per-file errors
/// come back as [`FileStatus::Failed`].
pub trait Worker: Send {
    fn process(&mut self, path: &Path) -> Result<FileStatus, DistributorError>;

    fn shutdown(self: Box<Self>);
}

/// Starts workers; shared by all feeder threads
pub trait WorkerLauncher: Sync {
    fn launch(&self, id: usize) -> Result<Box<dyn Worker>, DistributorError>;
}

/// Run one file and turn the outcome into a status, logging failures
fn run_file(pipeline: &mut Pipeline, path: &Path) -> FileStatus {
    match pipeline.process_file(path) {
        Ok(FileOutcome::Completed(summary)) => {
            debug!("{}: {} frames, {} artifacts", path.display(), summary.frames, summary.artifacts.len());
            FileStatus::Done
        }
        Ok(FileOutcome::Skipped) => FileStatus::Skipped,
        Err(e) => {
            error!("{:#}", e);
            FileStatus::Failed(format!("{:#}", e))
        }
    }
}

/// Launches workers as threads of the current process.
pub struct InProcessLauncher {
    config: PipelineConfig,
    registry: StageRegistry,
    input_root: PathBuf,
    output_root: PathBuf,
}

impl InProcessLauncher {
    pub fn new(
        config: PipelineConfig,
        registry: StageRegistry,
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            registry,
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }
}

impl WorkerLauncher for InProcessLauncher {
    fn launch(&self, id: usize) -> Result<Box<dyn Worker>, DistributorError> {
        let pipeline = Pipeline::from_config(&self.config, &self.registry, &self.input_root, &self.output_root)?;
        debug!("Worker {} ready with stages {:?}", id, pipeline.stage_names());
        Ok(Box::new(InProcessWorker { pipeline }))
    }
}

struct InProcessWorker {
    pipeline: Pipeline,
}

impl Worker for InProcessWorker {
    fn process(&mut self, path: &Path) -> Result<FileStatus, DistributorError> {
        Ok(run_file(&mut self.pipeline, path))
    }

    fn shutdown(self: Box<Self>) {}
}

/// Launches workers as child processes running the hidden `worker` subcommand
pub struct ProcessLauncher {
    exe: PathBuf,
    input_root: PathBuf,
    output_root: PathBuf,
    config_path: PathBuf,
}

impl ProcessLauncher {
    pub fn new(
        exe: impl Into<PathBuf>,
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            exe: exe.into(),
            input_root: input_root.into(),
            output_root: output_root.into(),
            config_path: config_path.into(),
        }
    }

    /// Launcher re-running the binary of the current process
    pub fn current_exe(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
    ) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, input_root, output_root, config_path))
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, id: usize) -> Result<Box<dyn Worker>, DistributorError> {
        let mut child = Command::new(&self.exe)
            .arg("worker")
            .arg(&self.input_root)
            .arg(&self.output_root)
            .arg(&self.config_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DistributorError::Spawn(id, e))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(DistributorError::Startup(id, "worker pipes unavailable".to_string()));
        };

        let mut worker = ProcessWorker {
            id,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        };

        match worker.read_line() {
            Ok(line) if line.trim_end() == READY => {
                debug!("Worker {} (pid {}) ready", id, worker.child.id());
                Ok(Box::new(worker))
            }
            Ok(line) => {
                let status = worker.stop();
                let reason = if line.is_empty() {
                    format!("exited before reporting ready ({})", status)
                } else {
                    format!("unexpected handshake '{}'", line.trim_end())
                };
                Err(DistributorError::Startup(id, reason))
            }
            Err(e) => {
                worker.stop();
                Err(DistributorError::Startup(id, e.to_string()))
            }
        }
    }
}

struct ProcessWorker {
    id: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ProcessWorker {
    fn read_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        self.stdout.read_line(&mut line)?;
        Ok(line)
    }

    /// Close stdin and wait for the child, describing how it ended
    fn stop(&mut self) -> String {
        self.stdin = None;
        match self.child.wait() {
            Ok(status) => status.to_string(),
            Err(e) => {
                let _ = self.child.kill();
                e.to_string()
            }
        }
    }
}

impl Worker for ProcessWorker {
    fn process(&mut self, path: &Path) -> Result<FileStatus, DistributorError> {
        let Some(line) = path.to_str().filter(|p| !p.contains(['\n', '\r'])) else {
            let msg = format!("{} cannot be sent to a worker", path.display());
            error!("{}", msg);
            return Ok(FileStatus::Failed(msg));
        };

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(DistributorError::Lost(self.id, "worker already stopped".to_string()));
        };
        writeln!(stdin, "{}", line)
            .and_then(|_| stdin.flush())
            .map_err(|e| DistributorError::Lost(self.id, e.to_string()))?;

        let reply = self
            .read_line()
            .map_err(|e| DistributorError::Lost(self.id, e.to_string()))?;
        if reply.is_empty() {
            return Err(DistributorError::Lost(self.id, "worker exited".to_string()));
        }
        FileStatus::parse(&reply)
            .ok_or_else(|| DistributorError::Lost(self.id, format!("unexpected reply '{}'", reply.trim_end())))
    }

    fn shutdown(mut self: Box<Self>) {
        let status = self.stop();
        debug!("Worker {} stopped: {}", self.id, status);
    }
}

/// Worker side of the process transport.
///
/// Builds the pipeline, announces readiness, then answers one status line
/// per path line until `input` closes.
pub fn run_worker(
    config: &PipelineConfig,
    registry: &StageRegistry,
    input_root: &Path,
    output_root: &Path,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<()> {
    let mut pipeline = Pipeline::from_config(config, registry, input_root, output_root)?;
    writeln!(output, "{}", READY)?;
    output.flush()?;

    for line in input.lines() {
        let line = line.context("failed to read work item")?;
        if line.is_empty() {
            continue;
        }
        let status = run_file(&mut pipeline, Path::new(&line));
        writeln!(output, "{}", status.to_line())?;
        output.flush()?;
    }

    Ok(())
}

/// All regular files under `root`, recursively, in sorted order.
///
/// Links to files are listed; links to directories are not descended into.
pub fn enumerate_files(root: &Path) -> Result<Vec<PathBuf>, DistributorError> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| DistributorError::Enumerate(e, dir.clone()))?;
        for entry in entries {
            let entry = entry.map_err(|e| DistributorError::Enumerate(e, dir.clone()))?;
            let file_type = entry
                .file_type()
                .map_err(|e| DistributorError::Enumerate(e, entry.path()))?;
            let path = entry.path();
            if file_type.is_dir() {
                dirs.push(path);
            } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
                files.push(path);
            } else if file_type.is_symlink() {
                debug!("Not following directory link {}", path.display());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Number of workers to start for `files` input files
pub fn worker_count(requested: Option<usize>, files: usize) -> usize {
    requested.unwrap_or_else(num_cpus::get).clamp(1, files.max(1))
}

/// Spreads the files of an input tree over a fixed set of workers.
///
/// Each file is owned start to finish by one worker; which worker gets which
/// file is up to scheduling.
pub struct WorkDistributor<L> {
    launcher: L,
    workers: Option<usize>,
}

impl<L: WorkerLauncher> WorkDistributor<L> {
    /// `workers` of `None` means one per logical CPU
    pub fn new(launcher: L, workers: Option<usize>) -> Self {
        Self { launcher, workers }
    }

    pub fn distribute(&self, input_root: &Path) -> Result<RunSummary, DistributorError> {
        let files = enumerate_files(input_root)?;
        let count = worker_count(self.workers, files.len());
        info!("Distributing {} files over {} workers", files.len(), count);

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            match self.launcher.launch(id) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    for worker in workers {
                        worker.shutdown();
                    }
                    return Err(e);
                }
            }
        }

        let queue = WorkQueue::new();
        for file in files {
            queue.put(WorkItem::File(file));
        }
        for _ in 0..count {
            queue.put(WorkItem::Stop);
        }

        let mut summary = RunSummary::default();
        let mut crashed = false;
        thread::scope(|s| {
            let handles: Vec<_> = workers
                .into_iter()
                .enumerate()
                .map(|(id, worker)| {
                    let queue = &queue;
                    s.spawn(move || self.feed(id, worker, queue))
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(tally) => summary.merge(tally),
                    Err(_) => crashed = true,
                }
            }
        });

        // A crashed feeder may have left its item unacknowledged
        if crashed {
            error!("A worker thread panicked; some files were not processed");
        } else {
            queue.join();
        }

        info!(
            "Processed {} files ({} skipped, {} failed)",
            summary.processed, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Forward queue items to one worker until it pulls a stop item
    fn feed(&self, id: usize, worker: Box<dyn Worker>, queue: &WorkQueue) -> RunSummary {
        let mut worker = Some(worker);
        let mut tally = RunSummary::default();

        loop {
            let WorkItem::File(path) = queue.get() else {
                queue.task_done();
                break;
            };

            let status = match worker.as_mut() {
                Some(w) => match w.process(&path) {
                    Ok(status) => status,
                    Err(e) => {
                        error!("{} while processing {}", e, path.display());
                        if let Some(dead) = worker.take() {
                            dead.shutdown();
                        }
                        worker = self.relaunch(id);
                        FileStatus::Failed(e.to_string())
                    }
                },
                None => {
                    let msg = format!("no worker {} available", id);
                    error!("Failed {}: {}", path.display(), msg);
                    FileStatus::Failed(msg)
                }
            };

            tally.record(&status);
            queue.task_done();
        }

        if let Some(worker) = worker {
            worker.shutdown();
        }
        tally
    }

    fn relaunch(&self, id: usize) -> Option<Box<dyn Worker>> {
        match self.launcher.launch(id) {
            Ok(worker) => {
                warn!("Restarted worker {}", id);
                Some(worker)
            }
            Err(e) => {
                error!("Could not restart worker {}: {}", id, e);
                None
            }
        }
    }
}
