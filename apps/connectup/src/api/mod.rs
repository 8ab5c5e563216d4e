//! # HTTP API
//!
//! axum router over the core store. Handlers are thin: parse the request,
//! run one core operation in one transaction, deliver any notifications the
//! operation produced, and serialize the result.
//!
//! ## Route groups
//!
//! | Prefix | Module | Guard |
//! |---|---|---|
//! | `/health`, `/files` | this module, [`uploads`] | none |
//! | `/api` (register, login, otp, ...) | [`public`] | none |
//! | `/api/user` | [`user`], [`realtime`] | [`AuthUser`] |
//! | `/api/chat` | [`chat`] | [`AuthUser`] |
//! | `/api/groups`, `/api/group` | [`groups`] | [`AuthUser`] |
//! | `/api/showcase` | [`showcase`] | [`AuthUser`] |
//! | `/api/admin` | [`admin`] | [`AdminUser`] |

use crate::config::{Config, DynamicConfig};
use crate::hub::{HubMessage, RealtimeHub, TOPIC_NOTIFICATION};
use crate::providers::{
    BlobStore, LocalBlobStore, LogMailer, LogPush, Mailer, PushMessage, PushSender,
};
use axum::{Json, Router, extract::DefaultBodyLimit, middleware as axum_mw, routing::get};
use connectup_core::cache::{DEFAULT_CACHE_SIZE, LruCache, RateCounter};
use connectup_core::notifications::Notification;
use connectup_core::storage::ReadTx;
use connectup_core::users::User;
use connectup_core::{CoreResult, Reader, Store, Timestamp, Utc, WriteTx, sessions};
use governor::DefaultDirectRateLimiter;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod admin;
pub mod chat;
pub mod error;
pub mod extract;
pub mod groups;
pub mod middleware;
pub mod public;
pub mod realtime;
pub mod showcase;
pub mod uploads;
pub mod user;

pub use error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult};
pub use extract::{AdminUser, AuthUser, UserContext};

/// How long a resolved user context stays cached.
pub const CONTEXT_TTL_MINUTES: i64 = 5;

/// Key of the global email/OTP send counter.
const SEND_COUNTER_KEY: &str = "outbound-email";

pub(crate) fn now() -> Timestamp {
    Utc::now()
}

/// Shared server state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
    pub flags: Arc<DynamicConfig>,
    pub hub: Arc<RealtimeHub>,
    pub mailer: Arc<dyn Mailer>,
    pub push: Arc<dyn PushSender>,
    pub blobs: Arc<dyn BlobStore>,
    pub contexts: Arc<Mutex<LruCache<String, UserContext>>>,
    pub sends: Arc<Mutex<RateCounter>>,
    pub limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    /// State with logging providers and blobs on the local filesystem.
    pub fn new(store: Store, config: Config) -> Self {
        let blobs = LocalBlobStore::new(config.upload_dir.clone(), config.public_url.clone());
        let flags = DynamicConfig::from_config(&config);
        let limiter = middleware::rate_limiter(config.rate_limit_per_sec, config.rate_limit_burst);
        Self {
            store: Arc::new(store),
            flags: Arc::new(flags),
            hub: Arc::new(RealtimeHub::new()),
            mailer: Arc::new(LogMailer),
            push: Arc::new(LogPush),
            blobs: Arc::new(blobs),
            contexts: Arc::new(Mutex::new(
                LruCache::new(DEFAULT_CACHE_SIZE)
                    .with_ttl(chrono::Duration::minutes(CONTEXT_TTL_MINUTES)),
            )),
            sends: Arc::new(Mutex::new(RateCounter::new(chrono::Duration::minutes(1)))),
            limiter: Arc::new(limiter),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn with_push(mut self, push: Arc<dyn PushSender>) -> Self {
        self.push = push;
        self
    }

    #[must_use]
    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn read<T>(&self, f: impl FnOnce(&ReadTx) -> CoreResult<T>) -> ApiResult<T> {
        Ok(self.store.read(f)?)
    }

    pub fn write<T>(&self, f: impl FnOnce(&WriteTx) -> CoreResult<T>) -> ApiResult<T> {
        Ok(self.store.write(f)?)
    }

    /// Count one outbound email/OTP against the per-minute limit.
    pub fn check_send_limit(&self) -> ApiResult<()> {
        let sent = self.sends.lock().hit(SEND_COUNTER_KEY, now());
        if sent > self.flags.email_limit() {
            warn!(sent, limit = self.flags.email_limit(), "outbound email limit reached");
            return Err(ApiError::too_many_requests());
        }
        Ok(())
    }

    /// Device tokens of `user`, empty when they turned notifications off.
    fn notification_tokens(&self, tx: &impl Reader, user: &User) -> CoreResult<Vec<String>> {
        if !user.settings.notifications_enabled {
            return Ok(Vec::new());
        }
        sessions::push_tokens(tx, user.id)
    }

    /// Publish committed notifications on the hub and push them to devices.
    ///
    /// Delivery failures are logged; the notifications are already stored.
    pub fn deliver(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let recipient = notification.user_id;
            let payload = serde_json::to_value(&notification).unwrap_or_else(|_| json!({}));
            let kind = payload
                .get("kind")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            let msg = HubMessage::new(TOPIC_NOTIFICATION, payload)
                .header("kind", kind)
                .to([recipient]);
            self.hub.publish(msg);

            let tokens = self.store.read(|tx| {
                let user = tx.require::<User>(recipient.0)?;
                self.notification_tokens(tx, &user)
            });
            match tokens {
                Ok(tokens) if tokens.is_empty() => {}
                Ok(tokens) => {
                    let mut push =
                        PushMessage::new(tokens, notification.title.clone(), notification.body.clone());
                    push.data = notification.data.clone();
                    if let Err(e) = self.push.push(push) {
                        warn!(user = %recipient, error = %e, "push delivery failed");
                    }
                }
                Err(e) => warn!(user = %recipient, error = %e, "push tokens unavailable"),
            }
        }
    }

    /// Push to a set of users directly (chat messages).
    pub fn push_to(&self, users: &[connectup_core::UserId], title: &str, body: &str) {
        for user in users {
            let tokens = self.store.read(|tx| {
                let user = tx.require::<User>(user.0)?;
                self.notification_tokens(tx, &user)
            });
            match tokens {
                Ok(tokens) if tokens.is_empty() => {}
                Ok(tokens) => {
                    if let Err(e) = self.push.push(PushMessage::new(tokens, title, body)) {
                        warn!(%user, error = %e, "push delivery failed");
                    }
                }
                Err(e) => warn!(%user, error = %e, "push tokens unavailable"),
            }
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Full application router.
pub fn router(state: AppState) -> Router {
    let max_body = state.config.max_upload_bytes();
    let mut api = Router::new()
        .merge(public::routes())
        .nest("/user", user::routes().merge(realtime::routes()))
        .nest("/chat", chat::routes())
        .merge(groups::routes())
        .nest("/showcase", showcase::routes())
        .nest("/admin", admin::routes());
    if state.config.env == crate::config::Environment::Local {
        api = api.merge(public::local_routes());
    }

    Router::new()
        .route("/health", get(health))
        .merge(uploads::file_routes())
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive().max_age(Duration::from_secs(60 * 60)))
                .layer(DefaultBodyLimit::max(max_body))
                .layer(axum_mw::from_fn(middleware::timing))
                .layer(axum_mw::from_fn_with_state(state.clone(), middleware::rate_limit)),
        )
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let address = format!("0.0.0.0:{}", state.config.port);
    info!(env = %state.config.env, "Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
