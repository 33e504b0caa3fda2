use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront_bot::admin::{self, AdminState};
use storefront_bot::bot::{run_dispatcher, ConversationEngine, EngineSettings, TelegramGateway};
use storefront_bot::cart::SessionCarts;
use storefront_bot::config::{CartStorage, Config};
use storefront_bot::db::{init_database_schema, seed_default_products, PgStore};
use storefront_bot::localization::init_localization;
use storefront_bot::memory_store::MemoryStore;
use storefront_bot::scheduler::BroadcastScheduler;
use storefront_bot::store::{CartStore, CatalogStore, UserStore};

/// How often idle carts and user locks are reclaimed
const JANITOR_INTERVAL: Duration = Duration::from_secs(10 * 60);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storefront_bot=debug"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file before reading RUST_LOG
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting Storefront Telegram Bot");

    let config = Config::from_env()?;
    init_localization(&config.default_language);

    // Pick the stores: Postgres when configured, memory otherwise
    let pg_store = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            init_database_schema(store.pool()).await?;
            info!("Connected to PostgreSQL, schema ready");
            Some(store)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            None
        }
    };

    let users: Arc<dyn UserStore>;
    let catalog: Arc<dyn CatalogStore>;
    match &pg_store {
        Some(store) => {
            users = Arc::new(store.clone());
            catalog = Arc::new(store.clone());
        }
        None => {
            let store = Arc::new(MemoryStore::new());
            users = store.clone();
            catalog = store;
        }
    }

    let carts: Arc<dyn CartStore> = match (config.cart_storage, &pg_store) {
        (CartStorage::Database, Some(store)) => Arc::new(store.clone()),
        (CartStorage::Database, None) => {
            warn!("CART_STORAGE=database needs DATABASE_URL, keeping carts in memory");
            Arc::new(SessionCarts::new(config.cart_ttl))
        }
        (CartStorage::Memory, _) => Arc::new(SessionCarts::new(config.cart_ttl)),
    };

    seed_default_products(catalog.as_ref()).await?;

    let bot = Bot::new(&config.bot_token);
    let gateway = Arc::new(TelegramGateway::new(
        bot.clone(),
        config.payment_provider_token.clone(),
    ));
    if config.payment_provider_token.is_none() {
        warn!("PAYMENT_PROVIDER_TOKEN not set, online payments are disabled");
    }

    let engine = Arc::new(ConversationEngine::new(
        users.clone(),
        catalog.clone(),
        carts.clone(),
        gateway.clone(),
        EngineSettings::from_config(&config),
    ));

    let mut background = Vec::new();

    let scheduler = BroadcastScheduler::new(
        users.clone(),
        catalog.clone(),
        gateway,
        config.broadcast_interval,
        config.broadcast_send_delay,
    );
    background.push(tokio::spawn(scheduler.run()));

    background.push(tokio::spawn({
        let engine = Arc::clone(&engine);
        let carts = carts.clone();
        async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            loop {
                ticker.tick().await;
                match carts.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "Purged expired carts"),
                    Err(e) => warn!(error = %e, "Failed to purge expired carts"),
                }
                engine.release_idle_locks();
            }
        }
    }));

    match &config.admin_api_token {
        Some(token) => {
            let state = AdminState::new(users.clone(), catalog.clone(), token);
            let port = config.admin_api_port;
            background.push(tokio::spawn(async move {
                if let Err(e) = admin::serve(state, port).await {
                    error!(error = %e, "Admin API stopped");
                }
            }));
        }
        None => warn!("API_SECRET_KEY not set, the admin API is disabled"),
    }

    info!("Bot initialized, starting dispatcher");
    run_dispatcher(bot, engine).await;

    for task in background {
        task.abort();
    }
    info!("Shut down");
    Ok(())
}
