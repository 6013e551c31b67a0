use std::sync::Arc;

use roomsearch_core::{Cache, Config, Crawler, DataFacade, SanitizedConfig, Search, Stats};

/// Shared application state
pub struct AppState {
    config: Config,
    search: Search,
    stats: Arc<Stats>,
    crawler: Arc<Crawler>,
    facade: Arc<DataFacade>,
    cache: Arc<Cache>,
}

impl AppState {
    pub fn new(
        config: Config,
        search: Search,
        stats: Arc<Stats>,
        crawler: Arc<Crawler>,
        facade: Arc<DataFacade>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            config,
            search,
            stats,
            crawler,
            facade,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn search(&self) -> &Search {
        &self.search
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn crawler(&self) -> &Arc<Crawler> {
        &self.crawler
    }

    pub fn facade(&self) -> &Arc<DataFacade> {
        &self.facade
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}
