use anyhow::Context;
use clap::{Parser, Subcommand};
use distributed_calls::calls::client::HttpControlPlane;
use distributed_calls::calls::handlers::router;
use distributed_calls::calls::plane::ControlPlane;
use distributed_calls::calls::store::CallStore;
use distributed_calls::calls::types::{Arguments, CallId};
use distributed_calls::config::*;
use distributed_calls::pipeline::register_pipeline;
use distributed_calls::proxy::{Dispatcher, FunctionRegistry, WaitOptions};
use distributed_calls::worker::{CallWorker, WorkerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "distributed-calls", version, about = "Call-based distributed execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane HTTP server.
    Serve {
        #[arg(long, env = BIND_ENV_VAR, default_value = DEFAULT_BIND)]
        bind: SocketAddr,
    },
    /// Poll the control plane and execute the bundled demo functions.
    Worker {
        #[arg(long, env = CONTROL_PLANE_URL_ENV_VAR, default_value = DEFAULT_CONTROL_PLANE_URL)]
        control_plane: String,
        #[arg(long, env = WORKER_ID_ENV_VAR)]
        worker_id: Option<String>,
        #[arg(long, env = WORKER_CONCURRENCY_ENV_VAR, default_value_t = DEFAULT_WORKER_CONCURRENCY)]
        concurrency: usize,
        #[arg(long, env = POLL_INTERVAL_ENV_VAR, default_value_t = DEFAULT_WORKER_POLL_INTERVAL.as_millis() as u64)]
        poll_interval_ms: u64,
    },
    /// Invoke a function through the control plane and print its result.
    Call {
        function: String,
        /// Positional arguments as a JSON array.
        #[arg(long, default_value = "[]")]
        args: String,
        /// Keyword arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        kwargs: String,
        #[arg(long, env = CONTROL_PLANE_URL_ENV_VAR, default_value = DEFAULT_CONTROL_PLANE_URL)]
        control_plane: String,
        /// Give up waiting after this many seconds (the call keeps running).
        #[arg(long)]
        max_wait_secs: Option<u64>,
    },
    /// Show a call and its direct children.
    Status {
        id: u64,
        #[arg(long, env = CONTROL_PLANE_URL_ENV_VAR, default_value = DEFAULT_CONTROL_PLANE_URL)]
        control_plane: String,
    },
    /// Run a function in-process, without a control plane.
    Standalone {
        function: String,
        #[arg(long, default_value = "[]")]
        args: String,
        #[arg(long, default_value = "{}")]
        kwargs: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
                shutdown.cancel();
            }
        });
    }

    match cli.command {
        Command::Serve { bind } => serve(ServerConfig { bind }, shutdown).await,
        Command::Worker {
            control_plane,
            worker_id,
            concurrency,
            poll_interval_ms,
        } => {
            let registry = FunctionRegistry::new();
            register_pipeline(&registry);

            let config = WorkerConfig {
                worker_id: worker_id.unwrap_or_else(generate_worker_id),
                concurrency,
                poll_interval: Duration::from_millis(poll_interval_ms),
                ..WorkerConfig::default()
            };
            tracing::info!("Server: {}", control_plane);
            tracing::info!("Poll interval: {:?}", config.poll_interval);

            let plane: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(&control_plane));
            CallWorker::new(plane, registry, config).run(shutdown).await;
            Ok(())
        }
        Command::Call {
            function,
            args,
            kwargs,
            control_plane,
            max_wait_secs,
        } => {
            let arguments = parse_arguments(&args, &kwargs)?;
            let mut options = WaitOptions::default().with_cancellation(shutdown);
            if let Some(secs) = max_wait_secs {
                options = options.with_max_wait(Duration::from_secs(secs));
            }

            let plane: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(&control_plane));
            let dispatcher = Dispatcher::distributed(FunctionRegistry::new(), plane, options);
            let result = dispatcher.invoke(&function, arguments).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Status { id, control_plane } => {
            let plane = HttpControlPlane::new(&control_plane);
            let call = plane.get_call(CallId(id)).await?;
            let children = plane.list_children(CallId(id)).await?;
            println!("{}", serde_json::to_string_pretty(&call)?);
            for child in children {
                println!(
                    "  -> {} {} [{}]",
                    child.id, child.function_name, child.status
                );
            }
            Ok(())
        }
        Command::Standalone {
            function,
            args,
            kwargs,
        } => {
            let registry = FunctionRegistry::new();
            register_pipeline(&registry);

            let arguments = parse_arguments(&args, &kwargs)?;
            let result = Dispatcher::standalone(registry)
                .invoke(&function, arguments)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store = CallStore::new();
    let app = router(store.clone());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("Control plane listening on {}", listener.local_addr()?);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    let counts = store.status_counts();
    tracing::info!(
        "Control plane stopped: {} calls ({} pending, {} running, {} completed, {} failed)",
        counts.total(),
        counts.pending,
        counts.running,
        counts.completed,
        counts.failed
    );
    Ok(())
}

fn parse_arguments(args: &str, kwargs: &str) -> anyhow::Result<Arguments> {
    let value = serde_json::json!({
        "args": serde_json::from_str::<serde_json::Value>(args).context("--args is not valid JSON")?,
        "kwargs": serde_json::from_str::<serde_json::Value>(kwargs).context("--kwargs is not valid JSON")?,
    });
    Ok(Arguments::from_value(value)?)
}
