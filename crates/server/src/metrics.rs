//! Metrics registry and text exposition for the `/metrics` route.

use once_cell::sync::Lazy;
use prometheus::{Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in roomsearch_core::metrics::all_metrics() {
        let _ = registry.register(metric);
    }
    registry
});

pub fn render() -> String {
    TextEncoder::new()
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_core_metrics() {
        let text = render();
        assert!(text.contains("roomsearch_servers_online"));
        assert!(text.contains("roomsearch_rooms_indexed_total"));
    }
}
