use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use academy_api::{app, state::{AppState, Repositories, Settings}};
use academy_catalog::CatalogCache;
use academy_core::events::EventPublisher;
use academy_store::{Config, DbClient, PgCatalogRepository, RedisClient, RedisEventPublisher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "academy_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Academy API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = Arc::new(RedisClient::new(&config.redis.url).context("Invalid Redis URL")?);
    if let Err(e) = redis.ping().await {
        tracing::warn!("Redis not reachable, events and rate limiting degrade: {}", e);
    }

    let events = event_publisher(&config, &redis)?;

    let catalog = CatalogCache::warmup(
        &PgCatalogRepository::new(db.pool.clone()),
        config.catalog.listed_subjects.clone(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to load catalog: {}", e))?;

    let state = AppState::new(
        Repositories::postgres(db.pool.clone(), events),
        catalog,
        Settings::from(&config),
        Some(redis),
    );

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &Config, redis: &Arc<RedisClient>) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = academy_store::EventProducer::new(&kafka.brokers)
                .context("Failed to create Kafka producer")?;
            tracing::info!("Publishing events to Kafka at {}", kafka.brokers);
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(RedisEventPublisher::new(redis.as_ref().clone()))),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(_config: &Config, redis: &Arc<RedisClient>) -> anyhow::Result<Arc<dyn EventPublisher>> {
    Ok(Arc::new(RedisEventPublisher::new(redis.as_ref().clone())))
}
