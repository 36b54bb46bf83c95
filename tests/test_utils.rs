//! Test utilities: scratch directories and an in-memory container runtime
//!
//! `FakeManager` implements the runtime traits without Docker. Its containers
//! keep their filesystem in a scratch directory and move files with the real
//! archive codec, record every call, and fail on request.

#![allow(dead_code)]

use async_trait::async_trait;
use contman::archive::{decode_into, encode_dir};
use contman::{Config, Container, ContmanError, Deadline, Manager, Mount, Result};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Temporary directory removed when dropped
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(prefix: &str) -> Self {
        let path = std::env::temp_dir().join(format!("contman-{}-{}", prefix, Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path).expect("scratch dir should be creatable");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Runtime operations a test can make fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Pull,
    Create,
    CopyTo,
    Start,
    Wait,
    CopyFrom,
    Inspect,
    Stop,
    Remove,
}

/// Everything the fake runtime was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pull(String),
    Create(Config),
    CopyTo(PathBuf, String),
    Start,
    Wait(bool),
    CopyFrom(String, PathBuf),
    IsRunning,
    Stop(Duration),
    Remove,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<Call>>,
    running: AtomicBool,
}

impl Shared {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn injected(step: Step) -> ContmanError {
    ContmanError::Io(io::Error::other(format!("injected {:?} failure", step)))
}

/// In-memory [`Manager`] whose containers live in a scratch directory
pub struct FakeManager {
    shared: Arc<Shared>,
    failures: HashSet<Step>,
    exit_code: i64,
    keep_running: bool,
    deadline: Deadline,
    rootfs: ScratchDir,
}

impl FakeManager {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            failures: HashSet::new(),
            exit_code: 0,
            keep_running: false,
            deadline: Deadline::none(),
            rootfs: ScratchDir::new("rootfs"),
        }
    }

    pub fn failing(mut self, step: Step) -> Self {
        self.failures.insert(step);
        self
    }

    pub fn with_exit_code(mut self, exit_code: i64) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Report the container as running even after the wait returned
    pub fn keep_running(mut self) -> Self {
        self.keep_running = true;
        self
    }

    /// Bound start, wait and copies of created containers, like `DockerContainer`
    pub fn with_container_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub fn removals(&self) -> usize {
        self.count(|call| matches!(call, Call::Remove))
    }

    pub fn created_config(&self) -> Option<Config> {
        self.calls().into_iter().find_map(|call| match call {
            Call::Create(config) => Some(config),
            _ => None,
        })
    }

    /// Path inside the fake container filesystem
    pub fn container_path(&self, path: &str) -> PathBuf {
        self.rootfs.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Manager for FakeManager {
    async fn pull_image(&self, image: &str) -> Result<()> {
        self.shared.record(Call::Pull(image.to_string()));
        if self.failures.contains(&Step::Pull) {
            return Err(injected(Step::Pull));
        }
        Ok(())
    }

    async fn has_image(&self, image: &str) -> bool {
        !image.is_empty()
    }

    async fn create_container(&self, config: Config) -> Result<Box<dyn Container>> {
        self.shared.record(Call::Create(config));
        if self.failures.contains(&Step::Create) {
            return Err(injected(Step::Create));
        }
        Ok(Box::new(FakeContainer {
            id: format!("fake-{}", Uuid::new_v4().simple()),
            shared: self.shared.clone(),
            failures: self.failures.clone(),
            exit_code: self.exit_code,
            keep_running: self.keep_running,
            deadline: self.deadline,
            rootfs: self.rootfs.path().to_path_buf(),
            removed: AtomicBool::new(false),
        }))
    }

    fn system_mounts(&self) -> Vec<Mount> {
        vec![Mount::new("/var/run/docker.sock", "/var/run/docker.sock", false)]
    }
}

pub struct FakeContainer {
    id: String,
    shared: Arc<Shared>,
    failures: HashSet<Step>,
    exit_code: i64,
    keep_running: bool,
    deadline: Deadline,
    rootfs: PathBuf,
    removed: AtomicBool,
}

impl FakeContainer {
    fn check(&self, step: Step) -> Result<()> {
        if self.removed.load(Ordering::SeqCst) {
            return Err(ContmanError::ContainerRemoved(self.id.clone()));
        }
        if self.failures.contains(&step) {
            return Err(injected(step));
        }
        Ok(())
    }

    fn inside(&self, path: &str) -> PathBuf {
        self.rootfs.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Container for FakeContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<()> {
        self.shared.record(Call::Start);
        self.check(Step::Start)?;
        self.deadline
            .run(async {
                self.shared.running.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
    }

    async fn stop(&self, timeout: Duration) -> Result<()> {
        self.shared.record(Call::Stop(timeout));
        self.check(Step::Stop)?;
        self.shared.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.shared.record(Call::Remove);
        self.check(Step::Remove)?;
        self.removed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_running(&self) -> Result<bool> {
        self.shared.record(Call::IsRunning);
        self.check(Step::Inspect)?;
        Ok(self.shared.running.load(Ordering::SeqCst))
    }

    async fn wait(&self, dump_logs: bool) -> Result<i64> {
        self.shared.record(Call::Wait(dump_logs));
        self.check(Step::Wait)?;
        self.deadline
            .run(async {
                if !self.keep_running {
                    self.shared.running.store(false, Ordering::SeqCst);
                }
                Ok(self.exit_code)
            })
            .await
    }

    async fn copy_from(&self, src: &str, dest: &Path) -> Result<()> {
        self.shared.record(Call::CopyFrom(src.to_string(), dest.to_path_buf()));
        self.check(Step::CopyFrom)?;
        self.deadline.run(async { Ok(()) }).await?;
        let archive = encode_dir(&self.inside(src), Vec::new())?;
        std::fs::create_dir_all(dest)?;
        decode_into(archive.as_slice(), dest)?;
        Ok(())
    }

    async fn copy_to(&self, src: &Path, dest: &str) -> Result<()> {
        self.shared.record(Call::CopyTo(src.to_path_buf(), dest.to_string()));
        self.check(Step::CopyTo)?;
        self.deadline.run(async { Ok(()) }).await?;
        let archive = encode_dir(src, Vec::new())?;
        let target = self.inside(dest);
        std::fs::create_dir_all(&target)?;
        decode_into(archive.as_slice(), &target)?;
        Ok(())
    }
}

/// Result type for test operations
pub type TestResult<T = ()> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
