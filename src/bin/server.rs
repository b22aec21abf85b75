//! Entry point: parses configuration, optionally daemonizes, binds the listener, and runs
//! the accept loop.

use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use scgi_templar::acceptor;
use scgi_templar::config::Config;
use scgi_templar::pool::WorkerPool;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Argument error: non-zero but distinct from a bind failure, for operators grepping logs.
const EXIT_CONFIG_ERROR: u8 = 1;
/// Could not bind the listening socket.
const EXIT_BIND_ERROR: u8 = 2;
/// Daemonizing child process could not be spawned.
const EXIT_FORK_ERROR: u8 = 3;

fn main() -> ExitCode {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {}", e);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    init_tracing(config.verbose);

    if config.fork {
        return daemonize();
    }

    run(config)
}

/// Re-execs the current binary without `--fork`, detached from the parent's stdio, and
/// prints the child's PID, matching the source's "fork and report PID" daemonization
/// contract without relying on a POSIX `fork(2)` binding.
fn daemonize() -> ExitCode {
    let exe = match std::env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("could not resolve current executable: {}", e);
            return ExitCode::from(EXIT_FORK_ERROR);
        }
    };
    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|a| a != "--fork")
        .collect();

    match std::process::Command::new(exe)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(child) => {
            println!("{}", child.id());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to daemonize: {}", e);
            ExitCode::from(EXIT_FORK_ERROR)
        }
    }
}

fn run(config: Config) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_BIND_ERROR);
        }
    };

    match runtime.block_on(serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::from(EXIT_BIND_ERROR)
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.addr, config.port)
        .parse()
        .with_context(|| format!("invalid address '{}:{}'", config.addr, config.port))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, "scgi-templar listening");

    let pool = WorkerPool::new(
        config.max_threads,
        config.min_threads,
        config.thread_keepalive_duration(),
    );

    tokio::select! {
        _ = acceptor::run(listener, pool, config.script_path.clone(), config.conn_keepalive_duration()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
