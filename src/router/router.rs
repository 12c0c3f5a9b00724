//! Request dispatch over the balancer's active connection.
//!
//! # Responsibilities
//! - Acquire the current connection (dialing if needed) within the
//!   caller's context and at most the dial timeout
//! - Run the caller's exchange against it
//! - Report transport failures to the balancer before propagating them
//!
//! # Design Decisions
//! - Never retries; see `resilience::retries` for opt-in retries
//! - Cancellation and deadline expiry are not reported: they say nothing
//!   about the endpoint
//! - A failure on a connection that was already replaced is reported too;
//!   the balancer discards it as stale

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::balancer::{Balancer, Connection};
use crate::error::{ClientError, ClientResult, TransportError};
use crate::observability::metrics;
use crate::protocol::{Request, ResponseBody};
use crate::resilience::timeouts::run_with_context;
use crate::router::RequestContext;

/// Routes requests through a [`Balancer`].
#[derive(Debug, Clone)]
pub struct Router {
    balancer: Balancer,
}

impl Router {
    pub fn new(balancer: Balancer) -> Self {
        Self { balancer }
    }

    pub fn balancer(&self) -> &Balancer {
        &self.balancer
    }

    /// Acquire a connection and run `f` against it, both bounded by `ctx`.
    /// Acquiring is additionally bounded by the dial timeout.
    pub async fn with_connection<T, F, Fut>(&self, ctx: &RequestContext, f: F) -> ClientResult<T>
    where
        F: FnOnce(Arc<Connection>) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let conn = run_with_context(ctx, self.balancer.acquire()).await?;

        let exchange = f(conn.clone());
        let result = run_with_context(ctx, async {
            exchange.await.map_err(|source| ClientError::Transport {
                endpoint: conn.endpoint().to_string(),
                source,
            })
        })
        .await;

        if let Err(ClientError::Transport { source, .. }) = &result {
            self.balancer.report_failure(&conn, source);
        }
        result
    }

    /// Send one request and return the response body. Application-level
    /// errors from the member become [`ClientError::Remote`].
    pub async fn call(&self, ctx: &RequestContext, request: Request) -> ClientResult<ResponseBody> {
        let op = request.body.name();
        let start = Instant::now();

        let result = self
            .with_connection(ctx, |conn| async move { conn.call(&request).await })
            .await
            .and_then(|response| match response.body {
                ResponseBody::Error { message } => Err(ClientError::Remote(message)),
                body => Ok(body),
            });

        let outcome = match &result {
            Ok(_) => "success",
            Err(ClientError::Transport { .. }) => "transport_error",
            Err(ClientError::Dial(_)) => "dial_error",
            Err(ClientError::Canceled) => "canceled",
            Err(ClientError::DeadlineExceeded) => "deadline_exceeded",
            Err(ClientError::Remote(_)) => "remote_error",
            Err(_) => "error",
        };
        metrics::record_request(op, outcome, start);

        if let Err(e) = &result {
            tracing::debug!(op, error = %e, "Request failed");
        }
        result
    }
}
