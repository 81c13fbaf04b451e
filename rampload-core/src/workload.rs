use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::runner::{HttpRequestMeta, IterationContext};
use crate::{HttpClient, RequestSpec};
use rampload_http::PreparedRequest;

/// Sends one prepared request per iteration and records the outcome.
///
/// Transport errors and error statuses end up in the scenario stats. They never fail the
/// iteration, so the run keeps going regardless of how the target behaves.
#[derive(Debug, Clone)]
pub struct Workload {
    client: Arc<HttpClient>,
    template: PreparedRequest,
}

impl Workload {
    pub fn new(client: Arc<HttpClient>, spec: &RequestSpec) -> Result<Self> {
        let template = client.prepare(spec.to_http_request()?)?;
        Ok(Self { client, template })
    }

    pub fn request(&self) -> &PreparedRequest {
        &self.template
    }

    pub async fn run_iteration(&self, ctx: IterationContext) -> std::result::Result<(), Infallible> {
        let started = Instant::now();
        let outcome = self.client.send(&self.template).await;
        let elapsed = started.elapsed();

        let meta = match outcome {
            Ok(res) => HttpRequestMeta {
                status: Some(res.status),
                transport_error_kind: None,
                elapsed,
                bytes_received: res.bytes_received,
                bytes_sent: res.bytes_sent,
            },
            Err(err) => {
                tracing::debug!(
                    scenario = %ctx.scenario,
                    vu = ctx.vu_id,
                    error = %err,
                    "request failed"
                );
                HttpRequestMeta {
                    status: None,
                    transport_error_kind: Some(err.transport_error_kind()),
                    elapsed,
                    bytes_received: 0,
                    bytes_sent: 0,
                }
            }
        };

        ctx.stats.record_http_request(meta);
        Ok(())
    }
}
