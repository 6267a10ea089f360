//! Extraction sessions.
//!
//! An [`Extractor`] opens an archive, exposes its file listing, and runs the
//! actual extraction on a background worker thread. Consumers follow along
//! through per-entry readiness: an entry becomes ready the moment its
//! extraction attempt completes, successfully or not, and [`WaitHandle`]
//! lets any thread block until a particular entry is ready.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{self, Backend};
use crate::error::UnpackError;
use crate::probe::{archive_kind, ArchiveKind};
use crate::safety::sanitize_entry_path;

/// How an entry's extraction attempt ended.
///
/// Both outcomes count as "ready": a failed entry will never become ready
/// again, so waiters must not keep blocking on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOutcome {
    /// The entry was written to the destination directory.
    Extracted,
    /// The extraction attempt failed; the entry is skipped.
    Failed,
}

/// State shared between the session, its worker thread, and wait handles.
struct Shared {
    state: Mutex<ReadyState>,
    cond: Condvar,
    cancel: AtomicBool,
}

struct ReadyState {
    outcomes: HashMap<String, EntryOutcome>,
    finished: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ReadyState {
                outcomes: HashMap::new(),
                finished: false,
            }),
            cond: Condvar::new(),
            cancel: AtomicBool::new(false),
        }
    }

    /// Records an outcome and wakes every waiter. The first outcome recorded
    /// for an entry wins; later reports are ignored.
    fn record(&self, name: &str, outcome: EntryOutcome) {
        let mut state = self.state.lock();
        state.outcomes.entry(name.to_string()).or_insert(outcome);
        self.cond.notify_all();
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        self.cond.notify_all();
    }

    fn outcome(&self, name: &str) -> Option<EntryOutcome> {
        self.state.lock().outcomes.get(name).copied()
    }
}

/// A cloneable handle for blocking on entry readiness.
///
/// Handles stay valid after the [`Extractor`] that created them is dropped;
/// they simply observe whatever state the session reached.
#[derive(Clone)]
pub struct WaitHandle {
    shared: Arc<Shared>,
}

impl WaitHandle {
    /// Returns `true` if the entry has an outcome, successful or not.
    pub fn is_ready(&self, name: &str) -> bool {
        self.shared.outcome(name).is_some()
    }

    /// Returns the entry's outcome, or `None` while it is still pending.
    pub fn entry_outcome(&self, name: &str) -> Option<EntryOutcome> {
        self.shared.outcome(name)
    }

    /// Returns `true` once the worker has processed its whole worklist or
    /// was stopped.
    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().finished
    }

    /// Blocks until the entry is ready.
    ///
    /// # Returns
    ///
    /// `true` once the entry has an outcome. `false` if the session finished
    /// without ever producing one, which happens when the entry is not on
    /// the worklist or the session was stopped first.
    pub fn wait_until_ready(&self, name: &str) -> bool {
        let mut state = self.shared.state.lock();
        loop {
            if state.outcomes.contains_key(name) {
                return true;
            }
            if state.finished {
                return false;
            }
            self.shared.cond.wait(&mut state);
        }
    }

    /// Like [`WaitHandle::wait_until_ready`] but gives up after `timeout`.
    ///
    /// Returns `true` only if the entry became ready in time.
    pub fn wait_timeout(&self, name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.outcomes.contains_key(name) {
                return true;
            }
            if state.finished {
                return false;
            }
            if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                return state.outcomes.contains_key(name);
            }
        }
    }
}

/// An archive extraction session.
///
/// A session is created with [`Extractor::setup`], optionally narrowed or
/// reordered with [`Extractor::set_files`], and started with
/// [`Extractor::extract`]. Extraction runs on a dedicated worker thread;
/// the session remains usable for queries while it runs.
///
/// # Examples
///
/// ```no_run
/// use cbx_unpack::Extractor;
///
/// let mut session = Extractor::setup("comic.cbz", "/tmp/comic")?;
/// let files = session.get_files();
/// session.extract();
/// let handle = session.wait_handle();
/// if handle.wait_until_ready(&files[0]) {
///     println!("{} is ready", files[0]);
/// }
/// # Ok::<(), cbx_unpack::UnpackError>(())
/// ```
pub struct Extractor {
    src: PathBuf,
    dst: PathBuf,
    kind: ArchiveKind,
    backend: Arc<Mutex<Box<dyn Backend>>>,
    files: Vec<String>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("kind", &self.kind)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    /// Opens an archive and prepares a session extracting into `dst`.
    ///
    /// Probes the archive format, opens the matching backend, reads the
    /// file listing, and creates the destination directory. For a plain
    /// directory source every entry is marked ready immediately since the
    /// files already exist in place.
    ///
    /// # Arguments
    ///
    /// * `src` - Path to the archive file or directory
    /// * `dst` - Directory extracted entries are written into
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not exist, its format is not
    /// recognized, a required external tool is missing, or the archive
    /// cannot be opened or listed.
    pub fn setup(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Result<Self, UnpackError> {
        let src = src.into();
        let dst = dst.into();
        if !src.exists() {
            return Err(UnpackError::NotFound(src));
        }
        let kind = archive_kind(&src).ok_or_else(|| UnpackError::UnsupportedFormat(src.clone()))?;
        info!(archive = %src.display(), %kind, "opening archive");

        let mut backend = backend::open(&src, kind)?;
        let files = backend.list()?;
        fs::create_dir_all(&dst)?;

        let shared = Arc::new(Shared::new());
        if kind == ArchiveKind::Directory {
            for name in &files {
                shared.record(name, EntryOutcome::Extracted);
            }
        }

        Ok(Self {
            src,
            dst,
            kind,
            backend: Arc::new(Mutex::new(backend)),
            files,
            shared,
            worker: None,
        })
    }

    /// Like [`Extractor::setup`], reporting failure as a user-facing
    /// message instead of an error value.
    ///
    /// Front ends that surface setup problems verbatim (dialog, status
    /// line) get the message through `report`; the session is simply
    /// absent on failure.
    pub fn setup_with_warnings(
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        report: &dyn Fn(&str),
    ) -> Option<Self> {
        match Self::setup(src, dst) {
            Ok(session) => Some(session),
            Err(error) => {
                report(&error.to_string());
                None
            }
        }
    }

    /// Returns the probed format of the archive.
    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Returns the current worklist in extraction order.
    pub fn get_files(&self) -> Vec<String> {
        self.files.clone()
    }

    /// Replaces the worklist.
    ///
    /// Entries are extracted in the order given here, so callers can put
    /// the files they need first at the front. Calling this after
    /// [`Extractor::extract`] has no effect on the running worker.
    ///
    /// # Arguments
    ///
    /// * `files` - The entry names to extract, in the desired order
    /// * `already_extracted` - When `true`, the named entries are marked
    ///   ready at once and nothing will be written for them
    ///
    /// Single-stream archives (gzip, bzip2) cannot seek between members, so
    /// for those the request only narrows the listing and its order is kept.
    pub fn set_files(&mut self, files: Vec<String>, already_extracted: bool) {
        if already_extracted {
            for name in &files {
                self.shared.record(name, EntryOutcome::Extracted);
            }
            self.files = files;
        } else if matches!(self.kind, ArchiveKind::Gzip | ArchiveKind::Bzip2) {
            self.files.retain(|name| files.contains(name));
        } else {
            self.files = files;
        }
    }

    /// Starts the background worker extracting the current worklist.
    ///
    /// Does nothing if the worker is already running. Entries that were
    /// marked ready beforehand keep their recorded outcome.
    pub fn extract(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let worklist = self.get_files();
        info!(
            archive = %self.src.display(),
            entries = worklist.len(),
            "starting extraction"
        );

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let dst = self.dst.clone();
        self.worker = Some(thread::spawn(move || {
            worker_main(&backend, &shared, &worklist, &dst);
            debug!("extraction worker finished");
        }));
    }

    /// Returns `true` if the entry has an outcome, successful or not.
    pub fn is_ready(&self, name: &str) -> bool {
        self.shared.outcome(name).is_some()
    }

    /// Returns the entry's outcome, or `None` while it is still pending.
    pub fn entry_outcome(&self, name: &str) -> Option<EntryOutcome> {
        self.shared.outcome(name)
    }

    /// Creates a handle other threads can use to block on readiness.
    pub fn wait_handle(&self) -> WaitHandle {
        WaitHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Blocks until the entry is ready; see [`WaitHandle::wait_until_ready`].
    pub fn wait_until_ready(&self, name: &str) -> bool {
        self.wait_handle().wait_until_ready(name)
    }

    /// Asks the worker to stop and waits for it to exit.
    ///
    /// The worker checks for the stop request between entries, so the entry
    /// being extracted still completes. Remaining entries are left without
    /// an outcome, every waiter is released, and the backend is closed.
    pub fn stop(&mut self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("extraction worker panicked");
            }
        }
        // Covers sessions whose worker never ran; after a join both calls
        // are no-ops.
        self.backend.lock().close();
        self.shared.finish();
    }

    /// Tears the session down; equivalent to [`Extractor::stop`].
    ///
    /// Safe whether or not [`Extractor::extract`] ever ran, and safe to
    /// call more than once.
    pub fn close(&mut self) {
        self.stop();
    }

    /// Opens a single entry for reading.
    ///
    /// Prefers the extracted file on disk. If the entry has not been
    /// written yet, the bytes are read straight from the archive without
    /// waiting for the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry name is unsafe or the entry cannot be
    /// read from either place.
    pub fn extract_file_io(&self, name: &str) -> Result<Box<dyn Read + Send>, UnpackError> {
        if let Ok(path) = sanitize_entry_path(&self.dst, name) {
            if path.is_file() {
                return Ok(Box::new(fs::File::open(path)?));
            }
        }
        if self.kind == ArchiveKind::Directory {
            let path = sanitize_entry_path(&self.src, name)?;
            return Ok(Box::new(fs::File::open(path)?));
        }
        let bytes = self.backend.lock().read_entry(name)?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

/// Body of the extraction worker thread. The drop guard closes the
/// backend and broadcasts completion even when a decoder panics
/// mid-entry, so waiters are released on every exit path.
fn worker_main(
    backend: &Mutex<Box<dyn Backend>>,
    shared: &Shared,
    worklist: &[String],
    dst: &Path,
) {
    struct Teardown<'a> {
        backend: &'a Mutex<Box<dyn Backend>>,
        shared: &'a Shared,
    }

    impl Drop for Teardown<'_> {
        fn drop(&mut self) {
            self.backend.lock().close();
            self.shared.finish();
        }
    }

    let _teardown = Teardown { backend, shared };
    run_worklist(backend, shared, worklist, dst);
}

/// Worker loop: drains the worklist, recording an outcome per entry.
///
/// Backends that prefer one bulk run get a single extraction call whose
/// outcome is fanned out to every entry. The backend lock is held only for
/// the duration of one extraction unit so that concurrent direct reads can
/// interleave.
fn run_worklist(
    backend: &Mutex<Box<dyn Backend>>,
    shared: &Shared,
    worklist: &[String],
    dst: &Path,
) {
    if worklist.is_empty() {
        return;
    }

    if backend.lock().prefers_bulk() {
        if shared.cancel.load(Ordering::Relaxed) {
            return;
        }
        let outcome = match backend.lock().extract_bulk(dst) {
            Ok(()) => EntryOutcome::Extracted,
            Err(error) => {
                warn!(%error, "bulk extraction failed");
                EntryOutcome::Failed
            }
        };
        for name in worklist {
            shared.record(name, outcome);
        }
        return;
    }

    for name in worklist {
        if shared.cancel.load(Ordering::Relaxed) {
            return;
        }
        // Entries marked ready up front stay untouched on disk.
        if shared.outcome(name).is_some() {
            continue;
        }
        let outcome = match backend.lock().extract_entry(name, dst) {
            Ok(()) => EntryOutcome::Extracted,
            Err(error) => {
                warn!(entry = name.as_str(), %error, "entry failed to extract");
                EntryOutcome::Failed
            }
        };
        shared.record(name, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_recorded_outcome_wins() {
        let shared = Shared::new();
        shared.record("page.png", EntryOutcome::Failed);
        shared.record("page.png", EntryOutcome::Extracted);
        assert_eq!(shared.outcome("page.png"), Some(EntryOutcome::Failed));
    }

    #[test]
    fn test_wait_returns_false_for_missing_entry_after_finish() {
        let handle = WaitHandle {
            shared: Arc::new(Shared::new()),
        };
        handle.shared.finish();
        assert!(!handle.wait_until_ready("never-listed.png"));
        assert!(handle.is_finished());
    }

    #[test]
    fn test_wait_timeout_expires_on_pending_entry() {
        let handle = WaitHandle {
            shared: Arc::new(Shared::new()),
        };
        assert!(!handle.wait_timeout("pending.png", Duration::from_millis(10)));
    }

    struct PanickingBackend;

    impl Backend for PanickingBackend {
        fn list(&mut self) -> Result<Vec<String>, UnpackError> {
            Ok(vec!["a.png".to_string()])
        }

        fn extract_entry(&mut self, _name: &str, _dst: &Path) -> Result<(), UnpackError> {
            panic!("decoder fault");
        }

        fn read_entry(&mut self, _name: &str) -> Result<Vec<u8>, UnpackError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_backend_panic_still_releases_waiters() {
        let backend: Arc<Mutex<Box<dyn Backend>>> =
            Arc::new(Mutex::new(Box::new(PanickingBackend)));
        let shared = Arc::new(Shared::new());
        let worklist = vec!["a.png".to_string()];

        let worker = {
            let backend = Arc::clone(&backend);
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                worker_main(&backend, &shared, &worklist, Path::new("unused"));
            })
        };
        assert!(worker.join().is_err());

        let handle = WaitHandle { shared };
        assert!(handle.is_finished());
        assert!(!handle.wait_until_ready("a.png"));
    }
}
