use anyhow::Result;
use bytes::Bytes;
use http_body_util::Full;
use std::convert::Infallible;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_tungstenite::accept_async;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod health;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod store;
pub mod utils;

use auth::AuthManager;
use config::Config;
use context::AppContext;
use handlers::handle_websocket;
use registry::ConnectionRegistry;
use resolver::ChannelResolver;
use router::MessageRouter;
use store::postgres::{DbPool, PgStore, create_pool};

type HttpResult = Result<Response<Full<Bytes>>, Infallible>;

async fn http_handler(req: Request<IncomingBody>, db_pool: Arc<DbPool>) -> HttpResult {
    let response = match req.uri().path() {
        "/health" => match health::health_check(&db_pool).await {
            Ok(_) => Response::new(Full::new(Bytes::from("OK"))),
            Err(e) => {
                tracing::error!("Health check failed: {}", e);
                let mut res = Response::new(Full::new(Bytes::from("Service Unavailable")));
                *res.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                res
            }
        },
        "/metrics" => match metrics::gather_metrics() {
            Ok(metrics_data) => {
                let mut res = Response::new(Full::new(Bytes::from(metrics_data)));
                res.headers_mut()
                    .insert("Content-Type", "text/plain; version=0.0.4".parse().unwrap());
                res
            }
            Err(e) => {
                tracing::error!("Failed to gather metrics: {}", e);
                let mut res = Response::new(Full::new(Bytes::from("Internal Server Error")));
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                res
            }
        },
        _ => {
            let mut not_found = Response::new(Full::new(Bytes::from("Not Found")));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            not_found
        }
    };
    Ok(response)
}

pub async fn run_http_server(config: Arc<Config>, db_pool: Arc<DbPool>) -> Result<()> {
    let http_addr = format!("0.0.0.0:{}", config.health_port);
    let listener = TcpListener::bind(&http_addr).await?;
    tracing::info!("HTTP server listening on http://{}", http_addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        let db_pool_clone = db_pool.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| http_handler(req, db_pool_clone.clone()));

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Error serving HTTP connection: {:?}", err);
            }
        });
    }
}

pub async fn run_websocket_server(app_context: AppContext, listener: TcpListener) {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to accept socket: {}", e);
                continue;
            }
        };

        let ctx = app_context.clone();

        tokio::spawn(async move {
            if let Ok(ws_stream) = accept_async(socket).await {
                handle_websocket(ws_stream, addr, ctx).await;
            }
        });
    }
}

pub async fn run() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = Arc::new(config);

    let bind_address = format!("0.0.0.0:{}", app_config.port);

    // Connect to database
    let db_pool = Arc::new(create_pool(&app_config.database_url).await?);
    tracing::info!("Connected to database");

    // Apply database migrations
    tracing::info!("Applying database migrations...");
    sqlx::migrate!().run(&*db_pool).await?;
    tracing::info!("Database migrations applied successfully.");

    // Wire the routing subsystem. The registry lives here for the whole
    // process lifetime; a restart drops all presence and clients
    // re-register on reconnect.
    let pg_store = Arc::new(PgStore::new(db_pool.as_ref().clone()));
    let auth_manager = Arc::new(AuthManager::new(
        &app_config.jwt_secret,
        &app_config.jwt_issuer,
    )?);
    let registry = Arc::new(ConnectionRegistry::new());
    let resolver = ChannelResolver::new(pg_store.clone());
    let router = Arc::new(MessageRouter::new(
        pg_store.clone(),
        pg_store.clone(),
        resolver.clone(),
        registry.clone(),
        app_config.channel_echo_to_sender,
    ));

    let app_context = AppContext::new(
        app_config.clone(),
        auth_manager,
        registry,
        router,
        pg_store,
        resolver,
    );

    // WebSocket listener
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!("Courier server listening on {} (WebSocket)", bind_address);

    let websocket_server = run_websocket_server(app_context, listener);
    let http_server = run_http_server(app_config, db_pool);

    tokio::select! {
        _ = websocket_server => {
            tracing::info!("WebSocket server shut down.");
        },
        res = http_server => {
            if let Err(e) = res {
                tracing::error!("HTTP server failed: {}", e);
            }
        },
        _ = signal::ctrl_c() => {
            tracing::info!("Shutdown signal received. Shutting down...");
        }
    }

    Ok(())
}
