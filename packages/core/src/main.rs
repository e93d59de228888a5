use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;

use weather_subscriptions::api::{self, AppState};
use weather_subscriptions::cli::Cli;
use weather_subscriptions::config::Config;
use weather_subscriptions::db::create_pool;
use weather_subscriptions::error::AppError;
use weather_subscriptions::logging::init_logging;
use weather_subscriptions::metrics::AppMetrics;
use weather_subscriptions::repository::SubscriptionRepository;
use weather_subscriptions::scheduler::{SchedulerConfig, UpdateDispatcher, UpdateScheduler};
use weather_subscriptions::services::notifier::{EmailComposer, SmtpNotifier, SmtpSettings};
use weather_subscriptions::services::subscriptions::SubscriptionService;
use weather_subscriptions::services::weather::WeatherApiClient;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()
        .map(|config| config.with_cli(&cli))
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });

    tracing::info!("Service starting with config: {:?}", config);

    if let Err(err) = run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let metrics = Arc::new(
        AppMetrics::new()
            .map_err(|err| AppError::dependency("Failed to register metrics", err.to_string()))?,
    );

    let pool = create_pool(&config.database_url)
        .await
        .map_err(|err| AppError::dependency("Failed to open database", err))?;
    let store = Arc::new(SubscriptionRepository::new(pool));

    let weather = Arc::new(
        WeatherApiClient::new(
            config.weather.api_url.clone(),
            config.weather.api_key.clone(),
            config.weather.timeout,
        )
        .map_err(|err| AppError::dependency("Failed to build weather client", err))?,
    );

    let notifier = Arc::new(
        SmtpNotifier::new(
            SmtpSettings {
                host: config.smtp.host.clone(),
                port: config.smtp.port,
                username: config.smtp.username.clone(),
                password: config.smtp.password.clone(),
                from_email: config.smtp.from_email.clone(),
            },
            EmailComposer::new(config.website_url.clone()),
        )
        .map_err(|err| AppError::dependency("Failed to configure SMTP", err))?,
    );

    let scheduler_config = SchedulerConfig::default();
    let scheduler = UpdateScheduler::new(
        UpdateDispatcher::new(
            store.clone(),
            weather.clone(),
            notifier.clone(),
            metrics.clone(),
            scheduler_config.per_subscriber_timeout,
        ),
        scheduler_config,
    );
    scheduler.start();

    let state = AppState {
        subscriptions: Arc::new(SubscriptionService::new(store, notifier, metrics.clone())),
        weather,
        metrics,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::dependency(format!("Failed to bind {}", addr), err))?;
    tracing::info!("HTTP server listening on {}", addr);

    let served = axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.stop();

    served.map_err(|err| AppError::dependency("HTTP server error", err))?;
    tracing::info!("Service stopped cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
