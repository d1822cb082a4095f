mod dispatch;
mod handlers;

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, Request, StatusCode, header},
};
use runbot_core::config::Config;
use runbot_executor::HttpExecutor;
use runbot_github::{GitHub, webhook::DELIVERY_HEADER};
use tokio::{net::TcpListener, signal};
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    catch_panic::CatchPanicLayer,
    normalize_path::NormalizePathLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::{Level, Span};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{dispatch::Dispatcher, handlers::build_router};

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    /// Deliveries acknowledged with 202 but not yet reported.
    tasks: TaskTracker,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let config = Arc::new(Config::load().expect("Failed to load configuration"));
    tracing::debug!("Configuration: {:?}", config);
    let github = GitHub::new(&config.github).await.expect("Failed to create GitHub client");
    let executor =
        HttpExecutor::new(&config.executor).expect("Failed to create execution service client");
    tracing::info!(
        "Executing code via {} (timeout {}s), trigger {:?}",
        executor.url(),
        config.executor.timeout_secs,
        config.command.trigger
    );
    let dispatcher = Arc::new(Dispatcher::new(&config, Arc::new(executor), github));
    let tasks = TaskTracker::new();
    let state = AppState { config: config.clone(), dispatcher, tasks: tasks.clone() };

    let router = app(state).into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));
    tracing::info!("Web server: Listening on {}", addr);
    let listener = TcpListener::bind(addr).await.expect("bind error");

    if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!("Web server error: {e}");
    }
    if drain(&tasks, config.server.shutdown_grace()).await {
        tracing::info!("Shut down gracefully");
    } else {
        tracing::warn!("Shut down with {} delivery task(s) still running", tasks.len());
    }
}

/// Stop accepting delivery tasks and wait for the running ones to post their
/// comment. Returns false if `grace` ran out first.
async fn drain(tasks: &TaskTracker, grace: Duration) -> bool {
    tasks.close();
    if !tasks.is_empty() {
        tracing::info!("Waiting for {} delivery task(s) to finish", tasks.len());
    }
    tokio::time::timeout(grace, tasks.wait()).await.is_ok()
}

fn app(state: AppState) -> Router {
    let sensitive_headers: Arc<[_]> =
        vec![header::AUTHORIZATION, HeaderName::from_static("x-hub-signature-256")].into();
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers(sensitive_headers.clone())
        .sensitive_response_headers(sensitive_headers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DeliveryMakeSpan { level: Level::INFO })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Deliveries are acknowledged before processing, so this only bounds verification
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(CatchPanicLayer::new());
    build_router().with_state(state).layer(middleware)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {e}"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryMakeSpan {
    level: Level,
}

impl<B> MakeSpan<B> for DeliveryMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let get_header = |name: &str| {
            request.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("[unknown]")
        };
        let delivery = get_header(DELIVERY_HEADER);
        let user_agent = get_header(header::USER_AGENT.as_str());
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    delivery = %delivery,
                    user_agent = %user_agent,
                )
            }
        }
        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}
