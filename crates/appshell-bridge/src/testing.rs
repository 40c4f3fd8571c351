//! Test doubles for the bridge's collaborators.

use crate::request::ScriptCallback;
use crate::services::{
    DialogSelection, ExternalViewer, FileDialogs, OpenDialogOptions, ViewerProcess, WindowHost,
};
use appshell_core::ErrorCode;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Viewer whose process table the test controls.
#[derive(Default)]
pub struct FakeViewer {
    processes: Mutex<Vec<ViewerProcess>>,
    exit_on_close: bool,
    pub launches: Mutex<Vec<(String, bool)>>,
    pub close_requests: AtomicUsize,
}

impl FakeViewer {
    /// Processes ignore close requests.
    pub fn stubborn(pids: &[u32]) -> Self {
        Self {
            processes: Mutex::new(pids.iter().map(|&pid| ViewerProcess { pid }).collect()),
            ..Default::default()
        }
    }

    /// Processes exit as soon as they are asked to.
    pub fn obedient(pids: &[u32]) -> Self {
        Self {
            exit_on_close: true,
            ..Self::stubborn(pids)
        }
    }

    pub fn exit_all(&self) {
        self.processes.lock().unwrap().clear();
    }
}

impl ExternalViewer for FakeViewer {
    fn launch(&self, url: &str, enable_debug_port: bool) -> io::Result<()> {
        if url.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no url"));
        }
        self.launches
            .lock()
            .unwrap()
            .push((url.to_string(), enable_debug_port));
        Ok(())
    }

    fn running(&self) -> Vec<ViewerProcess> {
        self.processes.lock().unwrap().clone()
    }

    fn request_close(&self, process: &ViewerProcess) -> io::Result<()> {
        self.close_requests.fetch_add(1, Ordering::SeqCst);
        if self.exit_on_close {
            self.processes.lock().unwrap().retain(|p| p != process);
        }
        Ok(())
    }
}

/// Dialog that always returns the same selection.
pub struct FakeDialogs {
    pub selection: DialogSelection,
    pub seen: Arc<Mutex<Vec<OpenDialogOptions>>>,
}

impl FakeDialogs {
    pub fn returning(selection: DialogSelection) -> Self {
        Self {
            selection,
            seen: Arc::default(),
        }
    }
}

impl FileDialogs for FakeDialogs {
    fn pick(&self, options: &OpenDialogOptions) -> DialogSelection {
        self.seen.lock().unwrap().push(options.clone());
        self.selection.clone()
    }
}

/// Counts window requests.
#[derive(Default, Clone)]
pub struct RecordingWindow {
    pub dev_tools: Arc<AtomicUsize>,
    pub quits: Arc<AtomicUsize>,
}

impl WindowHost for RecordingWindow {
    fn show_developer_tools(&self) {
        self.dev_tools.fetch_add(1, Ordering::SeqCst);
    }

    fn quit(&self) {
        self.quits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Callback that records every code it is fired with.
pub fn recording_callback() -> (ScriptCallback, Arc<Mutex<Vec<ErrorCode>>>) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let callback = ScriptCallback::new(move |code| sink.lock().unwrap().push(code));
    (callback, fired)
}
