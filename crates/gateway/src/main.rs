use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cb_domain::config::{Config, CorsConfig};
use cb_gateway::api;
use cb_gateway::bootstrap;
use cb_gateway::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // No subcommand means serve.
        None | Some(Command::Serve) => {
            let (config, config_path) = cb_gateway::cli::load_config()?;
            init_tracing();
            run_server(Arc::new(config), config_path).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cb_gateway::cli::load_config()?;
            let valid = cb_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cb_gateway::cli::load_config()?;
            cb_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("chatbridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the `serve` command. `RUST_LOG` wins when
/// set; otherwise the gateway logs at debug and everything else at info.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cb_gateway=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>, config_path: String) -> anyhow::Result<()> {
    tracing::info!("ChatBridge starting");

    let state = bootstrap::build_app_state(config.clone())?;
    tracing::info!(config = %config_path, "configuration loaded");

    // ── Middleware stack ─────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // Per-IP token-bucket throttle via tower_governor. The layer type
    // carries the key-extractor generics, so it is built where inference
    // can see it.
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit values must be non-zero");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP request throttling on"
        );

        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });

    let max_concurrent = std::env::var("CB_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = match governor_layer {
        Some(gov) => router.layer(gov).with_state(state),
        None => {
            tracing::info!("request throttling off — no [server.rate_limit] table");
            router.with_state(state)
        }
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "ChatBridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    tracing::info!("shutdown complete");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM so axum can drain in-flight requests.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        )
        .expect("SIGTERM handler registration failed");

        tokio::select! {
            _ = ctrl_c => tracing::info!("SIGINT — shutting down"),
            _ = sigterm.recv() => tracing::info!("SIGTERM — shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("SIGINT — shutting down");
    }
}

/// Translate the configured origin list into a [`CorsLayer`].
///
/// An entry like `http://localhost:*` accepts that host on any port, so
/// the Vite dev server keeps working wherever it lands. A lone `"*"`
/// switches to fully permissive mode, which also forces credentials off —
/// browsers reject credentialed responses paired with a wildcard origin.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS open to every origin (\"*\" configured)");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut port_wildcards: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if let Some(host) = origin.strip_suffix(":*") {
            port_wildcards.push(format!("{host}:"));
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "unparseable CORS origin ignored");
        }
    }

    let allow_origin = if port_wildcards.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            let origin_str = origin.to_str().unwrap_or("");
            port_wildcards
                .iter()
                .any(|prefix| wildcard_port_match(origin_str, prefix))
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}

/// True when `origin` is `prefix` followed by a bare port number.
fn wildcard_port_match(origin: &str, prefix: &str) -> bool {
    match origin.strip_prefix(prefix) {
        Some(port) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
