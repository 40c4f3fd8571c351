//! Script call dispatch.
//!
//! [`Dispatcher::dispatch`] routes a named call to its handler and keeps the
//! code of the last handled call for `GetLastError`.

use crate::coordinator::CloseCoordinator;
use crate::normalize::{fix_separators, strip_trailing_separator, JsonEscaping};
use crate::request::{CallArg, CallValue, ShellRequest, GET_LAST_ERROR};
use crate::services::{fs, ExternalViewer, FileDialogs, HandlerResult, WindowHost};
use appshell_common::Timers;
use appshell_core::{Access, ErrorCode, ShellConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Outcome of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// No handler has this name; the caller falls back to its default.
    Unhandled,
    /// A handler ran (or rejected the arguments). Carries the result value,
    /// if any.
    Handled(Option<CallValue>),
}

/// Collaborators the handlers talk to.
pub struct Services {
    pub viewer: Arc<dyn ExternalViewer>,
    pub dialogs: Box<dyn FileDialogs>,
    pub window: Box<dyn WindowHost>,
}

/// Routes script calls to native handlers. One per host.
pub struct Dispatcher {
    last_error: ErrorCode,
    started_at: Instant,
    escaping: JsonEscaping,
    viewer: Arc<dyn ExternalViewer>,
    dialogs: Box<dyn FileDialogs>,
    window: Box<dyn WindowHost>,
    coordinator: CloseCoordinator,
    timers: Timers,
}

impl Dispatcher {
    pub fn new(config: &ShellConfig, services: Services, timers: Timers) -> Self {
        let coordinator =
            CloseCoordinator::new(services.viewer.clone(), timers.clone(), &config.close);

        Self {
            last_error: ErrorCode::None,
            started_at: Instant::now(),
            escaping: JsonEscaping::from_legacy_flag(config.bridge.legacy_json_escaping),
            viewer: services.viewer,
            dialogs: services.dialogs,
            window: services.window,
            coordinator,
            timers,
        }
    }

    /// Count elapsed time from `started_at` instead of from creation. The
    /// host passes its own start time.
    pub fn with_start_time(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    /// Code of the most recent handled call.
    pub fn last_error(&self) -> ErrorCode {
        self.last_error
    }

    /// Time since the start time.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn coordinator(&self) -> &CloseCoordinator {
        &self.coordinator
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Dispatch one script call.
    pub fn dispatch(&mut self, name: &str, args: Vec<CallArg>) -> Dispatch {
        if name == GET_LAST_ERROR {
            return Dispatch::Handled(Some(CallValue::Int(self.last_error.as_i32())));
        }

        let request = match ShellRequest::parse(name, args) {
            None => {
                trace!(name, "Unhandled call");
                return Dispatch::Unhandled;
            }
            Some(Err(err)) => {
                warn!(%err, "Rejected call");
                self.last_error = ErrorCode::InvalidParams;
                return Dispatch::Handled(None);
            }
            Some(Ok(request)) => request,
        };

        let (code, value) = match self.handle(request) {
            Ok(value) => (ErrorCode::None, value),
            Err(code) => (code, None),
        };

        debug!(name, %code, "Handled call");
        self.last_error = code;
        Dispatch::Handled(value)
    }

    fn handle(&mut self, request: ShellRequest) -> HandlerResult<Option<CallValue>> {
        match request {
            ShellRequest::OpenExternalViewer {
                url,
                enable_debug_port,
            } => {
                self.viewer
                    .launch(&url, enable_debug_port)
                    .map_err(|err| {
                        warn!(%err, %url, "Failed to launch external viewer");
                        ErrorCode::from_io_error(&err, Access::Read)
                    })?;
                Ok(None)
            }
            ShellRequest::CloseExternalViewer { callback } => {
                match self.coordinator.close_all(callback) {
                    ErrorCode::None => Ok(None),
                    code => Err(code),
                }
            }
            ShellRequest::ShowOpenDialog(options) => {
                let selection = self.dialogs.pick(&options);
                Ok(Some(CallValue::String(selection.to_json(self.escaping))))
            }
            ShellRequest::ReadDirectory { path } => {
                fs::read_directory(&fix_separators(&path), self.escaping)
                    .map(|json| Some(CallValue::String(json)))
            }
            ShellRequest::IsDirectory { path } => {
                fs::is_directory(&fix_separators(&path))
                    .map(|is_dir| Some(CallValue::Bool(is_dir)))
            }
            ShellRequest::ReadFile { path, encoding } => {
                fs::read_file(&fix_separators(&path), &encoding)
                    .map(|contents| Some(CallValue::String(contents)))
            }
            ShellRequest::WriteFile {
                path,
                data,
                encoding,
            } => fs::write_file(&fix_separators(&path), &data, &encoding).map(|()| None),
            ShellRequest::SetPermissions { path, mode } => {
                fs::set_permissions(&fix_separators(&path), mode).map(|()| None)
            }
            ShellRequest::GetModificationTime { path } => {
                let path = fix_separators(strip_trailing_separator(&path));
                fs::modification_time(&path).map(|time| Some(CallValue::Timestamp(time)))
            }
            ShellRequest::DeleteFileOrDirectory { path } => {
                fs::delete(&fix_separators(&path)).map(|()| None)
            }
            ShellRequest::GetElapsedMilliseconds => {
                Ok(Some(CallValue::Number(self.elapsed().as_millis() as f64)))
            }
            ShellRequest::ShowDeveloperTools => {
                self.window.show_developer_tools();
                Ok(None)
            }
            ShellRequest::QuitApplication => {
                self.window.quit();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Command, ScriptCallback};
    use crate::services::{DialogSelection, OpenDialogOptions};
    use crate::testing::{recording_callback, FakeDialogs, FakeViewer, RecordingWindow};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Harness {
        dispatcher: Dispatcher,
        viewer: Arc<FakeViewer>,
        window: RecordingWindow,
        dialogs_seen: Arc<Mutex<Vec<OpenDialogOptions>>>,
    }

    fn harness_with(config: ShellConfig, selection: DialogSelection) -> Harness {
        let viewer = Arc::new(FakeViewer::default());
        let window = RecordingWindow::default();
        let dialogs = FakeDialogs::returning(selection);
        let dialogs_seen = dialogs.seen.clone();
        let services = Services {
            viewer: viewer.clone(),
            dialogs: Box::new(dialogs),
            window: Box::new(window.clone()),
        };
        Harness {
            dispatcher: Dispatcher::new(&config, services, Timers::current()),
            viewer,
            window,
            dialogs_seen,
        }
    }

    fn harness() -> Harness {
        harness_with(ShellConfig::default(), DialogSelection::Cancelled)
    }

    fn s(value: impl Into<String>) -> CallArg {
        CallArg::String(value.into())
    }

    fn last_error(dispatcher: &mut Dispatcher) -> Dispatch {
        dispatcher.dispatch(GET_LAST_ERROR, vec![])
    }

    #[tokio::test]
    async fn test_unknown_call_is_unhandled_and_keeps_last_error() {
        let mut h = harness();
        h.dispatcher.dispatch("IsDirectory", vec![CallArg::Int(3)]);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::InvalidParams);

        assert_eq!(
            h.dispatcher.dispatch("Explode", vec![s("x")]),
            Dispatch::Unhandled
        );
        assert_eq!(h.dispatcher.last_error(), ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn test_get_last_error_reports_without_changing_it() {
        let mut h = harness();
        assert_eq!(
            last_error(&mut h.dispatcher),
            Dispatch::Handled(Some(CallValue::Int(0)))
        );

        h.dispatcher
            .dispatch("ReadFile", vec![s("/definitely/not/here.txt"), s("utf8")]);
        let expected = Dispatch::Handled(Some(CallValue::Int(ErrorCode::NotFound.as_i32())));
        assert_eq!(last_error(&mut h.dispatcher), expected);
        assert_eq!(last_error(&mut h.dispatcher), expected);

        // Arguments are ignored
        assert_eq!(
            h.dispatcher.dispatch(GET_LAST_ERROR, vec![s("anything")]),
            expected
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_the_handler() {
        let mut h = harness();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let result = h.dispatcher.dispatch(
            "WriteFile",
            vec![s(path.to_string_lossy()), s("data")],
        );
        assert_eq!(result, Dispatch::Handled(None));
        assert_eq!(h.dispatcher.last_error(), ErrorCode::InvalidParams);
        assert!(!path.exists());

        h.dispatcher
            .dispatch("OpenExternalViewer", vec![s("http://x"), CallArg::Int(1)]);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::InvalidParams);
        assert!(h.viewer.launches.lock().unwrap().is_empty());

        h.dispatcher.dispatch("QuitApplication", vec![CallArg::Bool(true)]);
        assert_eq!(h.window.quits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_command_rejects_wrong_argument_types() {
        let mut h = harness();
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();

        for command in Command::ALL {
            // Reset to a known non-error code between commands
            h.dispatcher.dispatch("IsDirectory", vec![s(&root)]);
            assert_eq!(h.dispatcher.last_error(), ErrorCode::None);

            let result = h.dispatcher.dispatch(command.name(), vec![CallArg::Object]);
            assert_eq!(result, Dispatch::Handled(None), "{}", command.name());
            assert_eq!(
                h.dispatcher.last_error(),
                ErrorCode::InvalidParams,
                "{}",
                command.name()
            );
        }

        assert!(h.viewer.launches.lock().unwrap().is_empty());
        assert_eq!(h.viewer.close_requests.load(Ordering::SeqCst), 0);
        assert!(!h.dispatcher.coordinator().is_pending());
        assert!(h.dialogs_seen.lock().unwrap().is_empty());
        assert_eq!(h.window.dev_tools.load(Ordering::SeqCst), 0);
        assert_eq!(h.window.quits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_file_round_trip_through_dispatch() {
        let mut h = harness();
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.txt").to_string_lossy().into_owned();
        let data = "line one\nzwei ✓\u{7f}\t\"end\"";

        assert_eq!(
            h.dispatcher
                .dispatch("WriteFile", vec![s(&path), s(data), s("utf8")]),
            Dispatch::Handled(None)
        );
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);

        assert_eq!(
            h.dispatcher.dispatch("ReadFile", vec![s(&path), s("utf8")]),
            Dispatch::Handled(Some(CallValue::String(data.to_string())))
        );
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);
    }

    #[tokio::test]
    async fn test_failed_handler_returns_no_value() {
        let mut h = harness();
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "x").unwrap();

        let result = h
            .dispatcher
            .dispatch("ReadFile", vec![s(path.to_string_lossy()), s("latin1")]);
        assert_eq!(result, Dispatch::Handled(None));
        assert_eq!(h.dispatcher.last_error(), ErrorCode::UnsupportedEncoding);
    }

    #[tokio::test]
    async fn test_read_directory_and_is_directory() {
        let mut h = harness();
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let root = dir.path().to_string_lossy().into_owned();

        assert_eq!(
            h.dispatcher.dispatch("ReadDirectory", vec![s(&root)]),
            Dispatch::Handled(Some(CallValue::String(r#"["a","b.txt"]"#.to_string())))
        );
        assert_eq!(
            h.dispatcher.dispatch("IsDirectory", vec![s(&root)]),
            Dispatch::Handled(Some(CallValue::Bool(true)))
        );
    }

    #[tokio::test]
    async fn test_modification_time_ignores_trailing_separator() {
        let mut h = harness();
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();

        let plain = h.dispatcher.dispatch("GetModificationTime", vec![s(&root)]);
        let trailing = h
            .dispatcher
            .dispatch("GetModificationTime", vec![s(format!("{}/", root))]);

        assert!(matches!(plain, Dispatch::Handled(Some(CallValue::Timestamp(_)))));
        assert_eq!(plain, trailing);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);
    }

    #[tokio::test]
    async fn test_set_permissions_on_directory() {
        let mut h = harness();
        let dir = tempdir().unwrap();

        let result = h.dispatcher.dispatch(
            "SetPermissions",
            vec![s(dir.path().to_string_lossy()), CallArg::Int(0o444)],
        );
        assert_eq!(result, Dispatch::Handled(None));
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);
        assert!(!std::fs::metadata(dir.path()).unwrap().permissions().readonly());
    }

    #[tokio::test]
    async fn test_delete() {
        let mut h = harness();
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, "x").unwrap();
        let path = path.to_string_lossy().into_owned();

        h.dispatcher.dispatch("DeleteFileOrDirectory", vec![s(&path)]);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);

        h.dispatcher.dispatch("DeleteFileOrDirectory", vec![s(&path)]);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_open_external_viewer() {
        let mut h = harness();

        h.dispatcher
            .dispatch("OpenExternalViewer", vec![s("http://localhost/"), CallArg::Bool(true)]);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);
        assert_eq!(
            *h.viewer.launches.lock().unwrap(),
            vec![("http://localhost/".to_string(), true)]
        );

        // The fake refuses an empty URL as "not found"
        h.dispatcher
            .dispatch("OpenExternalViewer", vec![s(""), CallArg::Bool(false)]);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_external_viewer() {
        let mut h = harness();
        let (callback, fired) = recording_callback();

        let result = h
            .dispatcher
            .dispatch("CloseExternalViewer", vec![CallArg::Function(callback)]);
        assert_eq!(result, Dispatch::Handled(None));
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);
        assert!(h.dispatcher.coordinator().is_pending());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*fired.lock().unwrap(), vec![ErrorCode::None]);

        h.dispatcher
            .dispatch("CloseExternalViewer", vec![s("not a function")]);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::InvalidParams);

        h.dispatcher.dispatch(
            "CloseExternalViewer",
            vec![
                CallArg::Function(ScriptCallback::new(|_| {})),
                CallArg::Null,
            ],
        );
        assert_eq!(h.dispatcher.last_error(), ErrorCode::InvalidParams);
        assert!(!h.dispatcher.coordinator().is_pending());
    }

    #[tokio::test]
    async fn test_window_requests() {
        let mut h = harness();

        h.dispatcher.dispatch("ShowDeveloperTools", vec![]);
        h.dispatcher.dispatch("QuitApplication", vec![]);
        assert_eq!(h.window.dev_tools.load(Ordering::SeqCst), 1);
        assert_eq!(h.window.quits.load(Ordering::SeqCst), 1);
        assert_eq!(h.dispatcher.last_error(), ErrorCode::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_milliseconds() {
        let mut h = harness();
        match h.dispatcher.dispatch("GetElapsedMilliseconds", vec![]) {
            Dispatch::Handled(Some(CallValue::Number(ms))) => assert!(ms >= 0.0),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_elapsed_counts_from_start_time() {
        let started_at = Instant::now() - Duration::from_secs(3);
        let mut h = harness();
        h.dispatcher = h.dispatcher.with_start_time(started_at);

        match h.dispatcher.dispatch("GetElapsedMilliseconds", vec![]) {
            Dispatch::Handled(Some(CallValue::Number(ms))) => assert!(ms >= 3000.0),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_show_open_dialog_json() {
        let selection = DialogSelection::Files {
            directory: PathBuf::from("/work"),
            names: vec!["a.js".to_string(), "b.js".to_string()],
        };
        let mut h = harness_with(ShellConfig::default(), selection);

        let result = h.dispatcher.dispatch(
            "ShowOpenDialog",
            vec![
                CallArg::Bool(true),
                CallArg::Bool(false),
                s("Open"),
                s(""),
                s("js"),
            ],
        );
        let Dispatch::Handled(Some(CallValue::String(json))) = result else {
            panic!("unexpected result: {:?}", result);
        };
        let paths: Vec<PathBuf> = serde_json::from_str::<Vec<String>>(&json)
            .unwrap()
            .into_iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/work").join("a.js"), PathBuf::from("/work").join("b.js")]
        );
    }

    #[tokio::test]
    async fn test_show_open_dialog_cancelled() {
        let mut h = harness();
        let result = h.dispatcher.dispatch(
            "ShowOpenDialog",
            vec![
                CallArg::Bool(false),
                CallArg::Bool(true),
                s("Pick a folder"),
                s("/tmp"),
                s(""),
            ],
        );
        assert_eq!(
            result,
            Dispatch::Handled(Some(CallValue::String("[]".to_string())))
        );
    }

    #[tokio::test]
    #[cfg(not(windows))]
    async fn test_legacy_escaping_is_configurable() {
        let mut config = ShellConfig::default();
        config.bridge.legacy_json_escaping = true;
        let selection = DialogSelection::Directory(PathBuf::from("/odd\\name"));
        let mut h = harness_with(config, selection);

        let result = h.dispatcher.dispatch(
            "ShowOpenDialog",
            vec![
                CallArg::Bool(false),
                CallArg::Bool(true),
                s("Open"),
                s(""),
                s(""),
            ],
        );
        assert_eq!(
            result,
            Dispatch::Handled(Some(CallValue::String(r#"["/odd/name"]"#.to_string())))
        );
    }
}
