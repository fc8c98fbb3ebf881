/*
pressroom - single-binary main.rs
This binary starts the Rocket HTTP server and runs the background worker inside the same process.
*/

use anyhow::Context;
use clap::Parser;
use common::{init_db_pool, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pressroom::agents::Agents;
use pressroom::coordinator::{CheckOutcome, Coordinator};
use pressroom::llm::remote::RemoteLlmProvider;
use pressroom::llm::{LlmProvider, ModelGateway, RetryPolicy};
use pressroom::monitor::{MonitorSettings, SourceMonitor};
use pressroom::pipeline::PipelineDriver;
use pressroom::scraping::HttpPageFetcher;
use pressroom::server::{self, AppState};
use pressroom::storage::Store;

#[derive(Parser, Debug)]
#[command(name = "pressroom", about = "Pressroom single-binary server + worker")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable background worker (run server only)
    #[arg(long)]
    no_worker: bool,

    /// Run worker only (do not bind HTTP server)
    #[arg(long)]
    worker_only: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = match Config::load_with_defaults(
        default_path.exists().then_some(default_path.as_path()),
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let db_pool = match init_db_pool(&config.database.path).await {
        Ok(p) => p,
        Err(e) => {
            error!(%e, db_path = %config.database.path, "failed to initialize database pool");
            return Err(e);
        }
    };
    let store = Store::new(db_pool);
    store.ensure_schema().await?;

    let provider = match config.llm.as_ref() {
        Some(llm_config) => create_llm_provider(llm_config)?,
        None => None,
    };
    let retry = config
        .llm
        .as_ref()
        .map(|l| RetryPolicy {
            max_attempts: l.retry_attempts.unwrap_or(3),
            base_delay: Duration::from_millis(l.retry_base_delay_ms.unwrap_or(500)),
        })
        .unwrap_or_default();
    let gateway = Arc::new(ModelGateway::new(provider).with_retry(retry));

    let pages = Arc::new(HttpPageFetcher::new(config.fetch_timeout_seconds(), &config.user_agent())?);
    let monitor = SourceMonitor::new(store.clone(), pages, MonitorSettings::from_config(&config));
    let coordinator = Arc::new(Coordinator::new(store.clone(), Arc::new(monitor)));
    let agents = Agents::from_config(&config, gateway).context("failed to build pipeline agents")?;
    let driver = PipelineDriver::new(store.clone(), Arc::new(agents));

    let shutdown_notify = Arc::new(Notify::new());

    if args.worker_only {
        info!("Starting in worker-only mode");
        let worker = run_worker(coordinator.clone(), driver.clone(), config.clone(), shutdown_notify.clone());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, notifying worker to shutdown");
                shutdown_notify.notify_one();
            }
            res = worker => {
                if let Err(e) = res {
                    error!(%e, "worker encountered an error");
                }
            }
        }
        info!("worker-only run finished");
        return Ok(());
    }

    let mut worker_handle = None;
    if !args.no_worker {
        info!("Spawning background worker task");
        let w_coordinator = coordinator.clone();
        let w_driver = driver.clone();
        let w_cfg = config.clone();
        let w_shutdown = shutdown_notify.clone();
        worker_handle = Some(tokio::spawn(async move {
            let res = run_worker(w_coordinator, w_driver, w_cfg, w_shutdown).await;
            if let Err(e) = &res {
                error!(%e, "background worker failed");
            }
            res
        }));
    } else {
        info!("Background worker disabled via CLI (--no-worker)");
    }

    let state = AppState {
        store,
        coordinator,
        driver,
    };

    info!("Launching Rocket HTTP server");
    if let Err(e) = server::launch_rocket(state, Some(&config)).await {
        error!(%e, "Rocket server failed");
    }

    info!("HTTP server stopped; notifying worker to shutdown");
    shutdown_notify.notify_one();

    if let Some(handle) = worker_handle {
        match tokio::time::timeout(Duration::from_secs(20), handle).await {
            Ok(Ok(Ok(()))) => info!("worker exited cleanly"),
            Ok(Ok(Err(e))) => error!(%e, "worker task returned an error"),
            Ok(Err(join_err)) => error!(%join_err, "worker task panicked"),
            Err(_) => info!("Timed out waiting for worker to exit; continuing shutdown"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Build the model provider. A missing credential is not an error: stages run on fallback text.
fn create_llm_provider(llm_config: &common::LlmConfig) -> anyhow::Result<Option<Arc<dyn LlmProvider>>> {
    let adapter = llm_config.adapter.as_deref().unwrap_or("none");
    match adapter {
        "remote" => {
            let remote = llm_config
                .remote
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Remote adapter selected but [llm.remote] is missing"))?;

            let api_key_env = remote.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            let api_key = match std::env::var(api_key_env) {
                Ok(key) if !key.trim().is_empty() => key,
                _ => {
                    warn!("LLM API key env var '{}' not set; running without a model", api_key_env);
                    return Ok(None);
                }
            };

            let model = remote.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            let api_url = remote
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

            let provider = RemoteLlmProvider::new(api_url.clone(), api_key, model.clone()).with_defaults(
                remote.timeout_seconds.unwrap_or(30),
                remote.max_tokens.unwrap_or(2000),
                remote.temperature.unwrap_or(0.7),
            );
            info!("LLM provider initialized: remote ({}) at {}", model, api_url);
            let provider: Arc<dyn LlmProvider> = Arc::new(provider);
            Ok(Some(provider))
        }
        "none" => {
            info!("LLM adapter 'none': stages will use fallback responses");
            Ok(None)
        }
        _ => anyhow::bail!("Unknown LLM adapter type: {}", adapter),
    }
}

/// Periodic source check. Runs until `shutdown_notify` is signalled; a signal sent
/// mid-check is kept as a permit and ends the loop once the check returns.
async fn run_worker(
    coordinator: Arc<Coordinator>,
    driver: PipelineDriver,
    config: Config,
    shutdown_notify: Arc<Notify>,
) -> anyhow::Result<()> {
    let interval = Duration::from_secs(config.poll_interval_minutes().max(1) * 60);
    let auto_process = config.monitor.as_ref().and_then(|m| m.auto_process).unwrap_or(false);
    info!("worker: checking sources every {:?} (auto_process: {})", interval, auto_process);

    loop {
        info!("worker: checking sources for updates");
        match coordinator.process_new_updates().await {
            Ok(CheckOutcome::NoUpdates) => info!("worker: no new updates"),
            Ok(CheckOutcome::UpdatesProcessed { updates_found, content_plans }) => {
                info!("worker: {} new content plans", updates_found);
                if auto_process {
                    for plan in &content_plans {
                        match driver.run(&plan.content_id, false).await {
                            Ok(status) => info!(
                                "worker: pipeline {} finished with {}",
                                plan.content_id,
                                status.status.as_str()
                            ),
                            Err(e) => error!("worker: pipeline {} not run: {}", plan.content_id, e),
                        }
                    }
                }
            }
            Err(e) => error!("worker: source check failed: {:#}", e),
        }

        select! {
            _ = tokio::time::sleep(interval) => {},
            _ = shutdown_notify.notified() => {
                info!("worker: shutdown requested, exiting loop");
                break;
            }
        }
    }

    info!("worker: cleanup complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressroom::monitor::UpdateSource;
    use pressroom::types::Update;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Signals `started`, then takes a while to report nothing new.
    struct SlowSource {
        started: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl UpdateSource for SlowSource {
        async fn check(&self) -> anyhow::Result<Vec<Update>> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn shutdown_during_a_check_stops_the_worker() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let store = Store::new(pool);
        store.ensure_schema().await.expect("schema");

        let config = Config {
            database: common::DatabaseConfig {
                path: ":memory:".to_string(),
            },
            server: None,
            monitor: None,
            politeness: None,
            llm: None,
            research: None,
            publishing: None,
        };
        let started = Arc::new(Notify::new());
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            Arc::new(SlowSource {
                started: started.clone(),
            }),
        ));
        let agents = Agents::from_config(&config, Arc::new(ModelGateway::offline())).expect("agents");
        let driver = PipelineDriver::new(store, Arc::new(agents));

        let shutdown = Arc::new(Notify::new());
        let worker = tokio::spawn(run_worker(coordinator, driver, config, shutdown.clone()));

        started.notified().await;
        shutdown.notify_one();

        let finished = tokio::time::timeout(Duration::from_secs(2), worker).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));
    }
}
