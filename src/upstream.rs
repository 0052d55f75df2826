use reqwest::RequestBuilder;
use serde_json::Value;
use std::time::Instant;
use tracing::warn;

use crate::error::UpstreamError;
use crate::metrics::UPSTREAM_LATENCY;

/// Send a request and read the JSON answer. Non-2xx statuses become
/// `UpstreamError::Status`, keeping the body when it parsed.
pub async fn send_json(service: &'static str, req: RequestBuilder) -> Result<Value, UpstreamError> {
    let start = Instant::now();

    let res = req.send().await.inspect_err(|e| {
        warn!(service, error = %e, "Upstream request failed");
    })?;
    let status = res.status();
    // errors sometimes come back with an empty body
    let json = res.json::<Value>().await.ok();

    UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());

    if !status.is_success() {
        warn!(service, status = status.as_u16(), "Upstream returned an error");
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body: json,
        });
    }

    json.ok_or_else(|| UpstreamError::Malformed(format!("{service} sent no JSON")))
}
