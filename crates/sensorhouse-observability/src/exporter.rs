use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// Content type of [`render`] output.
pub fn content_type() -> &'static str {
    prometheus::TEXT_FORMAT
}

/// Encode every registered metric in the Prometheus text exposition format.
pub fn render() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to encode metrics: {}", e)))
}
