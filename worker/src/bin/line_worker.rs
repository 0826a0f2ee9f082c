// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Runs a worker that serves [`LineProtocol`] and echoes every line back.
//!
//! ```text
//! $ cargo run --bin line_worker -- --bind 127.0.0.1:8000 --max-requests 100
//! $ printf 'hello\nbye close\n' | nc 127.0.0.1 8000
//! ```
//!
//! Send `SIGQUIT` for a graceful shutdown, `SIGTERM` or `SIGINT` to stop right away.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use r3bl_worker::{Application, Body, DisplayPreference, FileHeartbeat, LineProtocol,
                  LineRequest, Listener, RequestEnv, ResponseHead, TracingConfig, Worker,
                  WorkerConfig, ok, setup_default_miette_global_report_handler,
                  spawn_signal_listener};
use tracing_core::LevelFilter;

const FOOTER: &str = "Run `line_worker --help` to see all options.";

#[derive(Parser, Debug)]
#[command(author, version, about = "Echo worker that serves one text line per request")]
struct Cli {
    /// TCP address to listen on. Repeat to listen on several.
    #[arg(long, short = 'b', default_value = "127.0.0.1:8000")]
    bind: Vec<SocketAddr>,

    /// Also listen on this unix socket path.
    #[cfg(unix)]
    #[arg(long)]
    uds: Option<PathBuf>,

    /// Maximum number of connections served at the same time, per listening socket.
    #[arg(long, default_value_t = r3bl_worker::DEFAULT_WORKER_CONNECTIONS)]
    worker_connections: usize,

    /// Seconds between heartbeats and parent checks.
    #[arg(long, default_value_t = 30.0)]
    timeout: f64,

    /// Seconds an idle connection is kept open. `0` disables the timeout.
    #[arg(long, default_value_t = 2.0)]
    keepalive: f64,

    /// Seconds in-flight connections get to finish after SIGQUIT.
    #[arg(long, default_value_t = 30.0)]
    graceful_timeout: f64,

    /// Requests served before the worker retires itself. `0` means unlimited.
    #[arg(long, default_value_t = 0)]
    max_requests: u64,

    /// Send full error reports back to clients.
    #[arg(long)]
    debug: bool,

    /// File whose modification time is bumped on every heartbeat.
    #[arg(long)]
    heartbeat_file: Option<PathBuf>,

    /// Also write logs to this file.
    #[arg(long)]
    log_file: Option<String>,

    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn worker_config(&self) -> miette::Result<WorkerConfig> {
        let keepalive = seconds(self.keepalive)?;
        ok!(WorkerConfig::default()
            .with_worker_connections(self.worker_connections)
            .with_timeout(seconds(self.timeout)?)
            .with_keepalive((!keepalive.is_zero()).then_some(keepalive))
            .with_graceful_timeout(seconds(self.graceful_timeout)?)
            .with_max_requests(self.max_requests)
            .with_debug(self.debug))
    }

    fn tracing_config(&self) -> miette::Result<TracingConfig> {
        let level_filter = self.log_level.parse::<LevelFilter>().into_diagnostic()?;
        ok!(match &self.log_file {
            Some(file) => TracingConfig::new_file_and_display(
                Some(file.clone()),
                DisplayPreference::Stderr,
                level_filter,
            ),
            None => TracingConfig::new_display(DisplayPreference::Stderr, level_filter),
        })
    }
}

fn seconds(value: f64) -> miette::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .into_diagnostic()
        .wrap_err_with(|| format!("{value} is not a valid number of seconds"))
}

/// Echoes the request line, and reports how many requests this worker has served.
#[derive(Debug)]
struct EchoApp;

impl Application<LineRequest> for EchoApp {
    async fn call(
        &self,
        env: RequestEnv<'_, LineRequest>,
        start_response: &mut ResponseHead,
    ) -> miette::Result<Body> {
        start_response
            .header("x-requests-served", env.worker.requests_served().to_string())
            .header("x-peer", env.peer_addr.to_string());
        ok!(Body::from_chunks([format!("{}\n", env.request.line)]))
    }
}

// Note: The `tokio::main` macro internally calls `.expect("Failed building the Runtime")`
// when initializing the Tokio runtime. This is unavoidable and safe, as runtime creation
// failure is a fatal error that should panic. The lint must be suppressed here.
#[tokio::main(flavor = "current_thread")]
#[allow(clippy::unwrap_in_result)]
async fn main() -> miette::Result<()> {
    setup_default_miette_global_report_handler(FOOTER);

    let cli = Cli::parse();
    cli.tracing_config()?.install_global()?;

    let mut listeners = vec![];
    for addr in &cli.bind {
        let listener = tokio::net::TcpListener::bind(*addr)
            .await
            .into_diagnostic()?;
        listeners.push(Listener::from(listener));
    }
    #[cfg(unix)]
    if let Some(path) = &cli.uds {
        let listener = tokio::net::UnixListener::bind(path).into_diagnostic()?;
        listeners.push(Listener::from(listener));
    }

    let mut worker = Worker::new(cli.worker_config()?, LineProtocol, EchoApp)?;
    if let Some(path) = &cli.heartbeat_file {
        worker = worker.with_heartbeat(FileHeartbeat::create(path)?);
    }

    let signal_listener = spawn_signal_listener(worker.state(), worker.wakeup())?;

    let exit = worker.run(listeners).await?;
    signal_listener.abort();

    tracing::info!(?exit, "Bye");

    #[cfg(unix)]
    if let Some(path) = &cli.uds
        && let Err(error) = std::fs::remove_file(path)
    {
        tracing::debug!(%error, "Could not remove unix socket file");
    }

    ok!()
}
