use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aigate_limits::Enforcer;
use aigate_mgmt::{management_router, MgmtState};
use aigate_provider::{CopilotExecutor, CredentialStore, ProviderRegistry};
use aigate_router::{proxy_router, ProxyState};
use aigate_usage::{FileStore, RequestStatistics};

mod cli;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

// Exit codes: 1 = config load failure, 2 = listener bind failure.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = cli::Cli::parse();
    let config_path = PathBuf::from(&cli.config);
    let mut config = match aigate_config::load_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(event = "config.load_failed", path = %config_path.display(), error = %err);
            return ExitCode::from(1);
        }
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let stats = Arc::new(RequestStatistics::new());
    let usage_store = open_usage_store(&config_path, config.usage_statistics_dir.as_deref());
    if let Some(store) = &usage_store {
        match store.load() {
            Ok(Some(snapshot)) => {
                if let Err(err) = stats.load(&snapshot) {
                    warn!(event = "usage.load_failed", error = %err);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(event = "usage.load_failed", error = %err),
        }
    }

    let registry = match aigate_translator::builtin_registry() {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            error!(event = "translator.registry_failed", error = %err);
            return ExitCode::from(1);
        }
    };

    let enforcer = Arc::new(Enforcer::new(config.api_key_limits.clone(), stats.clone()));
    let credentials = Arc::new(CredentialStore::from_configs(&config.credentials));

    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(CopilotExecutor::new(
        registry.clone(),
        stats.clone(),
        config.payload_config.clone(),
        config.proxy_url.clone(),
    )));
    let providers = Arc::new(providers);

    let bind = format!("{}:{}", config.host, config.port);
    let shared_config = Arc::new(ArcSwap::from_pointee(config));

    let proxy_state = ProxyState {
        config: shared_config.clone(),
        providers,
        credentials,
        enforcer: enforcer.clone(),
        stats: stats.clone(),
    };
    let mgmt_state = MgmtState::new(shared_config.clone(), config_path.clone(), enforcer);

    let app = axum::Router::new()
        .merge(proxy_router(proxy_state))
        .merge(management_router(mgmt_state));

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(event = "listen.bind_failed", bind = %bind, error = %err);
            return ExitCode::from(2);
        }
    };
    info!(event = "listen.started", bind = %bind);

    if let Some(store) = usage_store.clone() {
        let stats = stats.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = store.save(&stats.snapshot()) {
                    warn!(event = "usage.snapshot_failed", error = %err);
                }
            }
        });
    }

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());
    if let Err(err) = serve.await {
        error!(event = "serve.failed", error = %err);
        return ExitCode::from(1);
    }

    if let Some(store) = &usage_store {
        if let Err(err) = store.save(&stats.snapshot()) {
            warn!(event = "usage.snapshot_failed", error = %err);
        }
    }
    info!(event = "shutdown.clean");
    ExitCode::SUCCESS
}

fn open_usage_store(config_path: &Path, configured: Option<&str>) -> Option<Arc<FileStore>> {
    let dir = match configured {
        Some(dir) => PathBuf::from(dir),
        None => config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    match FileStore::new(&dir) {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            warn!(event = "usage.store_unavailable", error = %err);
            None
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!(event = "shutdown.signal_unavailable");
    }
}
