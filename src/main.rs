use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fermata::{
    api,
    auth::AuthService,
    config::Settings,
    notifications::Mailer,
    payments::{CheckoutGateway, StripeClient},
    repository::{
        SqliteInstrumentRepository, SqlitePaymentRepository, SqliteReservationRepository,
        SqliteUserRepository,
    },
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fermata=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!(
        "Starting Fermata server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    // Initialize repositories
    let reservation_repo = Arc::new(SqliteReservationRepository::new(db_pool.clone()));
    let payment_repo = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
    let instrument_repo = Arc::new(SqliteInstrumentRepository::new(db_pool.clone()));
    let user_repo = Arc::new(SqliteUserRepository::new(db_pool.clone()));

    let auth_service = Arc::new(AuthService::new(db_pool.clone()));

    // Initialize Stripe client if configured
    let stripe_client = if settings.stripe.enabled {
        if let (Some(api_key), Some(webhook_secret)) = (
            settings.stripe.secret_key.clone(),
            settings.stripe.webhook_secret.clone(),
        ) {
            tracing::info!("Stripe payment processing enabled");
            Some(Arc::new(StripeClient::new(api_key, webhook_secret)))
        } else {
            tracing::warn!("Stripe enabled but missing configuration");
            None
        }
    } else {
        tracing::info!("Stripe payment processing disabled");
        None
    };

    // Initialize the mailer if configured; notifications degrade to logs
    // without it.
    let mailer = match settings.email.as_ref() {
        Some(email) => match Mailer::new(email) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                tracing::warn!("Failed to configure mailer: {}. Emails disabled.", e);
                None
            }
        },
        None => None,
    };

    if settings.cron.secret.is_none() {
        tracing::warn!("No cron secret configured; /cron/expire-reservations will refuse requests");
    }

    // Create service context
    let gateway = stripe_client
        .clone()
        .map(|client| client as Arc<dyn CheckoutGateway>);

    let service_context = Arc::new(ServiceContext::new(
        reservation_repo,
        payment_repo,
        instrument_repo,
        user_repo,
        auth_service,
        gateway,
        mailer,
        &settings.booking,
        settings.server.base_url.clone(),
        db_pool.clone(),
    ));

    let app = api::create_app(service_context, stripe_client, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))
    .await?;

    tracing::info!(
        "Server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
