//! Checkout relay for landing pages.
//!
//! Accepts cash-on-delivery checkout forms and turns them into storefront
//! orders, reports paid orders to the ad platform and hands new orders to
//! the courier. Repeat checkouts from the same phone, address or device are
//! refused for a window (24h by default) by the [`guard`].

use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod phone;
pub mod shopify;
pub mod signature;
pub mod state;
pub mod steadfast;
pub mod tiktok;
pub mod upstream;

use config::Args;
use handlers::{
    create_order_handler, get_order_handler, health_handler, manual_fire_handler,
    metrics_handler, order_paid_handler, shopify_webhook_handler,
};
use state::AppState;

// Browser-facing routes only; webhooks are server to server.
// With no configured origins only the read-only lookup falls back to `*`;
// checkout then sends no allow-origin header at all.
fn cors_layer(origins: &[String], any_when_empty: bool) -> CorsLayer {
    let allow_origin = if origins.is_empty() && any_when_empty {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60))
}

pub fn router(state: Arc<AppState>) -> Router {
    let origins = state.config.allowed_origins();
    let checkout_routes = Router::new()
        .route("/api/create-order", post(create_order_handler))
        .layer(cors_layer(&origins, false));
    let lookup_routes = Router::new()
        .route("/api/get-order", get(get_order_handler))
        .layer(cors_layer(&origins, true));

    Router::new()
        .merge(checkout_routes)
        .merge(lookup_routes)
        .route("/api/manual-fire", post(manual_fire_handler))
        .route("/api/shopify-order-paid", post(order_paid_handler))
        .route("/api/shopify-webhook", post(shopify_webhook_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let port = args.port;
    let state = AppState::from_args(args).await?;
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("Order relay running on http://localhost:{port}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
