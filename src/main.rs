use axum::{
    Router,
    routing::{delete, get, post, put},
};
use time::Duration;
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};
use tracing_subscriber::EnvFilter;

use split_ledger_server::{activities, auth, backup, bills, config::Config, constants,
    database::{self, AppState}, recharges};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let db = database::init_app_db(&config.data_path)
        .await
        .expect("Failed to initialize database");

    let store = MemoryStore::default();
    // TODO: Consider adding periodic session cleanup for long-running deployments
    // to prevent memory growth with accumulated expired sessions
    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_name(constants::SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(
            constants::SESSION_EXPIRY_DAYS,
        )))
        .with_signed(
            Key::try_from(config.session_secret.as_bytes()).expect("Invalid session secret"),
        );

    if config.backup_enabled {
        backup::spawn_backup_task(db.clone(), config.data_path.clone());
    }

    let app = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route(
            "/activities",
            post(activities::create_activity).get(activities::get_activities),
        )
        .route(
            "/activities/{id}",
            get(activities::get_activity)
                .put(activities::update_activity)
                .delete(activities::delete_activity),
        )
        .route("/activities/{id}/bills", post(bills::create_bill))
        .route(
            "/bills/{id}",
            put(bills::update_bill).delete(bills::delete_bill),
        )
        .route(
            "/activities/{id}/recharges",
            post(recharges::create_recharge),
        )
        .route("/recharges/{id}", delete(recharges::delete_recharge))
        .route("/admin/backup", post(backup::backup_handler))
        .route("/admin/restore", post(backup::restore_handler))
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            db,
            data_path: config.data_path.clone(),
        });

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .expect("Failed to bind server address");
    tracing::info!("Server running on http://{}", bind_address);

    axum::serve(listener, app).await.expect("Server error");
}
