//! External viewer processes (live preview browser).
//!
//! Viewer processes are recognized by their executable:
//! - Linux: `/proc/<pid>/exe`, or the command name for viewers started
//!   through a wrapper script
//! - other Unix: the command column of `ps`
//! - Windows: the image of every process owning a top-level window, which
//!   is also where close requests (`WM_CLOSE`) are posted

use appshell_core::config::ViewerConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

/// A running process recognized as the external viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerProcess {
    pub pid: u32,
}

/// Launches, finds and closes external viewer processes.
///
/// Called from timer tasks as well as the script thread.
pub trait ExternalViewer: Send + Sync {
    /// Start a viewer on `url`. Does not wait for it.
    fn launch(&self, url: &str, enable_debug_port: bool) -> io::Result<()>;

    /// Viewer processes currently running.
    fn running(&self) -> Vec<ViewerProcess>;

    /// Ask one process to close. Returns once the request is delivered.
    fn request_close(&self, process: &ViewerProcess) -> io::Result<()>;
}

/// The configured viewer executable, driven through the OS.
#[derive(Debug, Clone)]
pub struct SystemViewer {
    executable: PathBuf,
    remote_debugging_port: u16,
    debug_args: Vec<String>,
}

impl SystemViewer {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            remote_debugging_port: config.remote_debugging_port,
            debug_args: config.debug_args.clone(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command-line arguments for a launch.
    pub fn launch_args(&self, url: &str, enable_debug_port: bool) -> Vec<String> {
        let mut args = Vec::new();
        if enable_debug_port {
            args.push(format!(
                "--remote-debugging-port={}",
                self.remote_debugging_port
            ));
            args.extend(self.debug_args.iter().cloned());
        }
        args.push(url.to_string());
        args
    }

    /// Whether `candidate` is the configured executable.
    pub fn is_viewer_executable(&self, candidate: &Path) -> bool {
        same_executable(candidate, &self.executable)
    }
}

impl ExternalViewer for SystemViewer {
    fn launch(&self, url: &str, enable_debug_port: bool) -> io::Result<()> {
        let mut command = Command::new(&self.executable);
        command.args(self.launch_args(url, enable_debug_port));

        let pid = spawn_detached(command)?;
        info!(pid, url, "Launched external viewer");
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn running(&self) -> Vec<ViewerProcess> {
        let own_pid = std::process::id();
        let entries = match fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(err) => {
                debug!(%err, "Cannot enumerate processes");
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
                if pid == own_pid {
                    return None;
                }
                // Fails for zombies and other users' processes
                let exe = fs::read_link(entry.path().join("exe")).ok();
                let matches = exe.is_some_and(|exe| self.is_viewer_executable(&exe))
                    || fs::read(entry.path().join("cmdline"))
                        .ok()
                        .and_then(|cmdline| command_path(&cmdline))
                        .is_some_and(|argv0| self.is_viewer_executable(&argv0));
                matches.then_some(ViewerProcess { pid })
            })
            .collect()
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn running(&self) -> Vec<ViewerProcess> {
        let own_pid = std::process::id();
        let output = match Command::new("ps")
            .args(["-axo", "pid=,comm="])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(err) => {
                debug!(%err, "Cannot enumerate processes");
                return Vec::new();
            }
        };

        parse_ps_listing(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .filter(|(pid, command)| *pid != own_pid && self.is_viewer_executable(command))
            .map(|(pid, _)| ViewerProcess { pid })
            .collect()
    }

    #[cfg(windows)]
    fn running(&self) -> Vec<ViewerProcess> {
        let own_pid = std::process::id();
        let windows = match top_level::enumerate() {
            Ok(windows) => windows,
            Err(err) => {
                debug!(%err, "Cannot enumerate windows");
                return Vec::new();
            }
        };

        let mut pids: Vec<u32> = windows.into_iter().map(|(_, pid)| pid).collect();
        pids.sort_unstable();
        pids.dedup();

        pids.into_iter()
            .filter(|&pid| pid != own_pid)
            .filter(|&pid| {
                top_level::image_path(pid).is_some_and(|image| self.is_viewer_executable(&image))
            })
            .map(|pid| ViewerProcess { pid })
            .collect()
    }

    #[cfg(not(any(unix, windows)))]
    fn running(&self) -> Vec<ViewerProcess> {
        debug!("Process enumeration is not supported on this platform");
        Vec::new()
    }

    #[cfg(unix)]
    fn request_close(&self, process: &ViewerProcess) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(process.pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM)?;
        debug!(pid, "Sent close request");
        Ok(())
    }

    #[cfg(windows)]
    fn request_close(&self, process: &ViewerProcess) -> io::Result<()> {
        let mut posted = 0;
        for (window, pid) in top_level::enumerate()? {
            if pid == process.pid {
                top_level::post_close(window)?;
                posted += 1;
            }
        }

        if posted == 0 {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("process {} has no windows", process.pid),
            ));
        }
        debug!(pid = process.pid, windows = posted, "Sent close request");
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn request_close(&self, process: &ViewerProcess) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot close process {} on this platform", process.pid),
        ))
    }
}

/// Start `command` without stdio and reap it from a background thread once
/// it exits. Returns the child's pid.
fn spawn_detached(mut command: Command) -> io::Result<u32> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = child.id();

    let reaper = thread::Builder::new()
        .name("viewer-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => debug!(pid, %status, "External viewer exited"),
            Err(err) => debug!(pid, %err, "Cannot wait for external viewer"),
        });
    if let Err(err) = reaper {
        warn!(pid, %err, "External viewer will not be reaped");
    }
    Ok(pid)
}

/// First element of a NUL-separated `/proc/<pid>/cmdline`, if it is an
/// absolute path. Wrapper scripts that `exec -a "$0"` leave their own path
/// there.
#[cfg(any(target_os = "linux", test))]
fn command_path(cmdline: &[u8]) -> Option<PathBuf> {
    let argv0 = cmdline.split(|&byte| byte == 0).next()?;
    let argv0 = PathBuf::from(String::from_utf8_lossy(argv0).into_owned());
    argv0.is_absolute().then_some(argv0)
}

/// `pid command` lines as printed by `ps -o pid=,comm=`.
#[cfg(any(all(unix, not(target_os = "linux")), test))]
fn parse_ps_listing(listing: &str) -> Vec<(u32, PathBuf)> {
    listing
        .lines()
        .filter_map(|line| {
            let (pid, command) = line.trim_start().split_once(char::is_whitespace)?;
            let command = command.trim();
            if command.is_empty() {
                return None;
            }
            Some((pid.parse().ok()?, PathBuf::from(command)))
        })
        .collect()
}

/// Top-level windows and the processes owning them.
#[cfg(windows)]
mod top_level {
    use std::ffi::OsString;
    use std::io;
    use std::os::windows::ffi::OsStringExt;
    use std::path::PathBuf;
    use windows::core::PWSTR;
    use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowThreadProcessId, PostMessageW, WM_CLOSE,
    };

    /// Every top-level window with the id of its process.
    pub fn enumerate() -> io::Result<Vec<(HWND, u32)>> {
        let mut found: Vec<(HWND, u32)> = Vec::new();
        // SAFETY: enumeration is synchronous and `found` outlives it.
        unsafe {
            EnumWindows(
                Some(collect_window),
                LPARAM(&mut found as *mut Vec<(HWND, u32)> as isize),
            )
        }
        .map_err(to_io_error)?;
        Ok(found)
    }

    unsafe extern "system" fn collect_window(window: HWND, found: LPARAM) -> BOOL {
        let found = &mut *(found.0 as *mut Vec<(HWND, u32)>);
        let mut pid = 0u32;
        GetWindowThreadProcessId(window, Some(&mut pid as *mut u32));
        if pid != 0 {
            found.push((window, pid));
        }
        BOOL::from(true)
    }

    /// Full path of the executable `pid` runs. `None` for processes this
    /// user may not query.
    pub fn image_path(pid: u32) -> Option<PathBuf> {
        let mut buffer = [0u16; 1024];
        let mut len = buffer.len() as u32;

        // SAFETY: the handle is closed before returning; `buffer` and `len`
        // describe a valid buffer for the duration of the call.
        unsafe {
            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
            let queried = QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buffer.as_mut_ptr()),
                &mut len,
            );
            let _ = CloseHandle(process);
            queried.ok()?;
        }

        Some(PathBuf::from(OsString::from_wide(&buffer[..len as usize])))
    }

    fn to_io_error(err: windows::core::Error) -> io::Error {
        io::Error::other(err.to_string())
    }

    /// Ask `window` to close, as its close button would.
    pub fn post_close(window: HWND) -> io::Result<()> {
        // SAFETY: posting to a window that is already gone only fails.
        unsafe { PostMessageW(window, WM_CLOSE, WPARAM(0), LPARAM(0)) }.map_err(to_io_error)
    }
}

/// Compare executable paths after resolving links. Windows paths compare
/// case-insensitively.
fn same_executable(a: &Path, b: &Path) -> bool {
    let a = fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let b = fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());

    if cfg!(windows) {
        a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
    } else {
        a == b
    }
}
