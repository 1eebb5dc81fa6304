//! taskchain control plane server.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use taskchain_control_plane::{executor_fn, http, AppState, Config, Scheduler, TaskContext};
use taskchain_core::RetryPolicy;

/// taskchain control plane: task queue, worker pool and audit chain.
#[derive(Parser, Debug)]
#[command(name = "taskchain-control-plane", about = "taskchain control plane server")]
struct Args {
    /// HTTP server address
    #[arg(long, env = "TASKCHAIN_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// SQLite URL (e.g. sqlite://taskchain.db?mode=rwc); in-memory when unset
    #[arg(long, env = "TASKCHAIN_DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of tasks executing at once
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Default maxRetries for submissions that omit it
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// First automatic retry delay in milliseconds
    #[arg(long, default_value = "1000")]
    retry_base_ms: u64,

    /// Upper bound on the retry delay in milliseconds
    #[arg(long, default_value = "300000")]
    retry_max_ms: u64,

    /// Execution timeout for tasks without their own timeoutMs
    #[arg(long)]
    task_timeout_ms: Option<u64>,

    /// Seconds to wait for running tasks on shutdown
    #[arg(long, default_value = "30")]
    shutdown_timeout_secs: u64,

    /// Days to keep finished tasks (0 keeps them forever)
    #[arg(long, default_value = "7")]
    retention_days: u64,

    /// Keep the attempt count when a failed task is retried manually
    #[arg(long)]
    preserve_attempts_on_retry: bool,
}

impl Args {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            http_bind_addr: self.http_addr,
            database_url: self.database_url,
            concurrency: self.concurrency,
            default_max_retries: self.max_retries,
            retry_policy: RetryPolicy::new(
                Duration::from_millis(self.retry_base_ms),
                defaults.retry_policy.multiplier,
                Duration::from_millis(self.retry_max_ms),
            ),
            reset_attempts_on_manual_retry: !self.preserve_attempts_on_retry,
            task_timeout: self.task_timeout_ms.map(Duration::from_millis),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            retention: (self.retention_days > 0)
                .then(|| Duration::from_secs(self.retention_days * 24 * 60 * 60)),
            ..defaults
        }
    }
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
    }
    info!("Shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("taskchain=info".parse()?))
        .init();

    let config = args.into_config();
    let http_addr: SocketAddr = config.http_bind_addr.parse()?;
    let maintenance = config.maintenance();

    let state = AppState::connect(config).await?;

    state
        .pool
        .register_executor(
            "noop",
            executor_fn(|ctx: TaskContext| async move { Ok(ctx.payload) }),
        )
        .await;

    let recovered = state.queue.recover().await?;
    info!(recovered, "Startup recovery finished");

    state.pool.start().await;

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(state.queue.clone(), maintenance).spawn(shutdown.clone());

    let router = http::create_router(state.clone());
    let listener = TcpListener::bind(http_addr).await?;
    info!(http_addr = %http_addr, "taskchain control plane listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = scheduler.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }
    if !state.pool.stop().await {
        info!("Unfinished tasks will be recovered on next start");
    }
    Ok(())
}
