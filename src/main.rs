//! Dues Back binary entrypoint wiring REST, SSE, and the payment storage backends.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use futures::future::BoxFuture;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dues_back::{
    config::AppConfig,
    dao::{
        payment_store::{PaymentStore, memory::MemoryPaymentStore},
        storage::StorageError,
    },
    routes,
    services::{sse_events, storage_supervisor},
    state::{AppState, SharedState},
};

type ConnectFuture = BoxFuture<'static, Result<Arc<dyn PaymentStore>, StorageError>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    // Held for the lifetime of the process so payment changes keep reaching SSE clients.
    let _payment_forwarder = sse_events::forward_payment_changes(&app_state);
    tokio::spawn(sse_events::relay_degraded_changes(app_state.clone()));

    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "mongo".into());
    info!(%backend, "selected storage backend");
    let connect = storage_connector(&backend)?;
    tokio::spawn(storage_supervisor::run(app_state.clone(), connect));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Build the connect closure the storage supervisor retries for `backend`.
fn storage_connector(
    backend: &str,
) -> anyhow::Result<impl FnMut() -> ConnectFuture + Send + 'static> {
    let backend = match backend {
        #[cfg(feature = "mongo-store")]
        "mongo" | "mongodb" => Backend::Mongo,
        #[cfg(feature = "couch-store")]
        "couch" | "couchdb" => Backend::Couch,
        "memory" => Backend::Memory(MemoryPaymentStore::new()),
        other => anyhow::bail!("unsupported STORAGE_BACKEND `{other}`"),
    };

    Ok(move || backend.connect())
}

enum Backend {
    #[cfg(feature = "mongo-store")]
    Mongo,
    #[cfg(feature = "couch-store")]
    Couch,
    Memory(MemoryPaymentStore),
}

impl Backend {
    fn connect(&self) -> ConnectFuture {
        match self {
            #[cfg(feature = "mongo-store")]
            Backend::Mongo => Box::pin(async {
                use dues_back::dao::payment_store::mongodb::{MongoConfig, MongoPaymentStore};

                let config = MongoConfig::from_env().await?;
                let store = MongoPaymentStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PaymentStore>)
            }),
            #[cfg(feature = "couch-store")]
            Backend::Couch => Box::pin(async {
                use dues_back::dao::payment_store::couchdb::{CouchConfig, CouchPaymentStore};

                let config = CouchConfig::from_env()?;
                let store = CouchPaymentStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PaymentStore>)
            }),
            Backend::Memory(store) => {
                let store = store.clone();
                Box::pin(async move { Ok(Arc::new(store) as Arc<dyn PaymentStore>) })
            }
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
