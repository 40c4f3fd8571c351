//! AppShell - host application entry point
//!
//! Loads a script application into the embedded engine, installs the native
//! binding and then runs the event loop:
//! - script callbacks posted by native code (close operations)
//! - window requests from script (quit, developer tools)
//! - Ctrl-C, asked of script as "close window"
//! - `SIGHUP`/`SIGUSR1`, asked of script as "refresh window"/"about"
//!
//! A reload evaluates the script again in a fresh engine. The dispatcher,
//! with its last error code and start time, stays the same.

mod host;
mod signals;

use anyhow::{Context, Result};
use appshell_bridge::{
    dispatch_command, Dispatcher, RfdDialogs, Services, ShellBinding, ShellCommand, SystemViewer,
};
use appshell_common::{init_logging, LogConfig, Timers};
use appshell_core::{ShellConfig, ShellError, ShellResult};
use appshell_js::{JsError, JsRuntime};
use clap::Parser;
use host::{AppWindow, HostEvent};
use signals::{HostSignal, HostSignals};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "appshell")]
#[command(about = "Native shell host for a script application")]
struct Args {
    /// Script application to run
    script: PathBuf,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log filter directives, e.g. "appshell_bridge=debug"
    #[arg(long)]
    log_filter: Option<String>,

    /// Verbose logging with source locations
    #[arg(long)]
    debug: bool,
}

/// A loaded script application and its binding.
struct Shell {
    runtime: JsRuntime,
    binding: ShellBinding,
}

impl Shell {
    /// First load: a new dispatcher for the lifetime of the host.
    fn start(
        script: &Path,
        config: &ShellConfig,
        started_at: Instant,
        host_events: &UnboundedSender<HostEvent>,
    ) -> ShellResult<Self> {
        let services = Services {
            viewer: Arc::new(SystemViewer::new(&config.viewer)),
            dialogs: Box::new(RfdDialogs),
            window: Box::new(AppWindow::new(host_events.clone())),
        };
        let dispatcher =
            Dispatcher::new(config, services, Timers::current()).with_start_time(started_at);

        Self::load(script, |runtime| ShellBinding::install(runtime, dispatcher))
    }

    /// Load the script again, bound to the same dispatcher.
    fn reload(&self, script: &Path) -> ShellResult<Self> {
        Self::load(script, |runtime| self.binding.rebind(runtime))
    }

    fn load<F>(script: &Path, bind: F) -> ShellResult<Self>
    where
        F: FnOnce(&mut JsRuntime) -> Result<ShellBinding, JsError>,
    {
        let source = std::fs::read_to_string(script)?;

        let script_error =
            |err: JsError| ShellError::script(format!("{}: {}", script.display(), err));
        let mut runtime = JsRuntime::new().map_err(script_error)?;
        let binding = bind(&mut runtime).map_err(script_error)?;
        runtime.evaluate_script(&source).map_err(script_error)?;

        info!(script = %script.display(), "Script application loaded");
        Ok(Self { runtime, binding })
    }

    /// Ask script whether the default action for `command` may go ahead.
    fn allows(&mut self, command: ShellCommand) -> bool {
        dispatch_command(Some(&mut self.runtime), command)
    }
}

fn main() -> ExitCode {
    let started_at = Instant::now();
    let args = Args::parse();

    let config = match ShellConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("appshell: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut log_config = if args.debug {
        LogConfig::debug()
    } else {
        LogConfig::from_settings(
            &config.logging.level,
            &config.logging.format,
            config.logging.filter.as_deref(),
        )
    };
    if let Some(filter) = args.log_filter.clone() {
        log_config = log_config.with_filter(filter);
    }
    if let Some(level) = config.logging.script_level.as_deref() {
        match level.parse() {
            Ok(level) => log_config = log_config.with_script_level(level),
            Err(_) => eprintln!("appshell: ignoring logging.script_level '{}'", level),
        }
    }
    if let Err(err) = init_logging(log_config) {
        eprintln!("appshell: failed to initialize logging: {}", err);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&args.script, &config, started_at)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(script: &Path, config: &ShellConfig, started_at: Instant) -> Result<()> {
    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    let mut signals = HostSignals::new().context("Failed to install signal handlers")?;

    let mut shell = Shell::start(script, config, started_at, &host_tx)
        .with_context(|| format!("Failed to load {}", script.display()))?;

    loop {
        tokio::select! {
            Some(event) = shell.binding.next_event() => {
                shell.binding.deliver(&mut shell.runtime, event);
            }
            Some(event) = host_rx.recv() => match event {
                HostEvent::Quit => {
                    info!("Quit requested by script");
                    return Ok(());
                }
                HostEvent::ShowDeveloperTools => {
                    warn!(
                        port = config.viewer.remote_debugging_port,
                        "No developer tools in this host, attach a remote debugger"
                    );
                }
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                if shell.allows(ShellCommand::CloseWindow) {
                    info!("Closing");
                    return Ok(());
                }
                info!("Close prevented by script");
            }
            signal = signals.recv() => match signal {
                HostSignal::Reload => {
                    if shell.allows(ShellCommand::RefreshWindow) {
                        match shell.reload(script) {
                            Ok(reloaded) => shell = reloaded,
                            Err(err) => error!("Reload failed, keeping current script: {:#}", err),
                        }
                    }
                }
                HostSignal::About => {
                    if shell.allows(ShellCommand::About) {
                        info!(version = env!("CARGO_PKG_VERSION"), "AppShell");
                    }
                }
            },
        }
    }
}
