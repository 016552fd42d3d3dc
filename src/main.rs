//! CustomiseMe UK commerce service

use anyhow::Result;
use customiseme_commerce::api::{self, AppState};
use customiseme_commerce::config::Config;
use customiseme_commerce::notifications::NotificationDispatcher;
use customiseme_commerce::payment::{PaymentGateway, SimulatedProcessor, StripeGateway};
use customiseme_commerce::scheduler::Scheduler;
use customiseme_commerce::store::{MailQueue, MemoryStore, NatsMailQueue, PgStore, Stores};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let nats_mail: Option<Arc<dyn MailQueue>> = match &config.nats_url {
        Some(url) => Some(Arc::new(NatsMailQueue::connect(url, config.mail_subject.clone()).await?) as Arc<dyn MailQueue>),
        None => None,
    };

    let stores = match &config.database_url {
        Some(url) => {
            let pg = Arc::new(PgStore::connect(url, 10).await?);
            pg.migrate().await?;
            let mail = nats_mail.unwrap_or_else(|| pg.clone() as Arc<dyn MailQueue>);
            Stores::from_backend(pg, mail)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let memory = Arc::new(MemoryStore::new());
            let mail = nats_mail.unwrap_or_else(|| memory.clone() as Arc<dyn MailQueue>);
            Stores::from_backend(memory, mail)
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeGateway::new(key.clone())?),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, using the simulated payment processor");
            Arc::new(SimulatedProcessor::new())
        }
    };

    let scheduler = Scheduler::new(stores.carts.clone(), stores.orders.clone(), NotificationDispatcher::new(stores.mail.clone()), config.sweep_settings());
    let mut background = scheduler.spawn();

    let state = AppState::new(&config, stores, gateway);
    background.push(api::rate_limit::spawn_pruner(state.limiter.clone(), Duration::from_secs(60)));
    let app = api::router(state);
    let port = config.port;
    tracing::info!("🚀 CustomiseMe commerce listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app)
        .with_graceful_shutdown(async { tokio::signal::ctrl_c().await.ok(); })
        .await?;

    for task in background {
        task.abort();
    }
    tracing::info!("shutdown complete");
    Ok(())
}
