use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomsearch_core::storage::ModerationRepository;
use roomsearch_core::{
    load_config, validate_config, Blocklist, Cache, Client, Crawler, Data, DataFacade, Indexer,
    LanguageDetector, Scheduler, Search, SearchIndex, Stats,
};

use roomsearch_server::api::create_router;
use roomsearch_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("ROOMSEARCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    // Storage and moderation state
    let data = Arc::new(
        Data::open(&config.database.path, config.batch.rooms)
            .context("Failed to open data repository")?,
    );
    let banned = data.get_banned_rooms().unwrap_or_else(|e| {
        warn!(error = %e, "cannot load banned rooms");
        Vec::new()
    });
    let block = Arc::new(
        Blocklist::new(
            config.blocklist.servers.clone(),
            config.blocklist.ids.clone(),
        )
        .with_banned_ids(banned),
    );
    info!(entries = block.len(), "blocklist loaded");

    // Search index
    let search_index =
        Arc::new(SearchIndex::open(&config.index.path).context("Failed to open search index")?);
    let indexer = Arc::new(Indexer::new(search_index.clone(), config.batch.rooms));
    let search = Search::new(search_index.clone());

    // Matrix client and crawler
    let detector = Arc::new(LanguageDetector::new());
    let client = Arc::new(Client::new(&config.matrix).context("Failed to build matrix client")?);
    let crawler = Arc::new(Crawler::new(
        config.servers.clone(),
        config.public.api.clone(),
        client.clone(),
        block.clone(),
        data.clone(),
        detector,
    ));

    // Background discovery hook: servers resolved on the side are fed back
    // into the crawler one by one
    let (discover_tx, mut discover_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    client.set_discover_hook(discover_tx);
    {
        let crawler = crawler.clone();
        tokio::spawn(async move {
            while let Some(name) = discover_rx.recv().await {
                crawler.add_server(&name).await;
            }
        });
    }

    // Stats, cache, pipeline
    let stats = Arc::new(Stats::new(
        data.clone(),
        indexer.clone(),
        block.clone(),
        config.webhooks.stats.clone(),
        config.public.ui.clone(),
    ));
    let cache = Arc::new(Cache::new(&config.cache, stats.clone()).await);
    let facade = Arc::new(DataFacade::new(
        crawler.clone(),
        indexer.clone(),
        stats.clone(),
        cache.clone(),
        data.clone(),
    ));

    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        config.workers.clone(),
        facade.clone(),
    );
    scheduler.start();

    // HTTP API
    let state = Arc::new(AppState::new(
        config.clone(),
        search,
        stats,
        crawler,
        facade,
        cache,
    ));
    let mut app = create_router(state).layer(TraceLayer::new_for_http());
    if config.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    scheduler.stop();
    Ok(())
}
