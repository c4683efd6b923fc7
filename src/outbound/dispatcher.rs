//! Rate-limited, chunked fan-out of a templated message.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::error::MessagingError;

use super::limiter::SlidingWindowLimiter;
use super::provider::{MessagingProvider, Recipient, TemplateMessage};

/// Sends a templated message to one or many recipients without exceeding
/// the provider's request-rate ceiling.
///
/// Recipients are partitioned into fixed-size chunks; sends within a chunk
/// run concurrently (each individually rate-limited) with a short pause
/// between chunks to smooth bursts. A failed recipient is logged and
/// skipped; it never aborts the batch.
pub struct OutboundDispatcher {
    provider: Arc<dyn MessagingProvider>,
    limiter: SlidingWindowLimiter,
    config: DispatchConfig,
}

impl OutboundDispatcher {
    pub fn new(provider: Arc<dyn MessagingProvider>, config: DispatchConfig) -> Self {
        Self {
            provider,
            limiter: SlidingWindowLimiter::new(config.max_requests, config.window),
            config,
        }
    }

    /// Send to a single recipient, rate-limited.
    pub async fn send_one(
        &self,
        recipient: &Recipient,
        content_sid: &str,
    ) -> Result<String, MessagingError> {
        self.limiter.acquire().await;
        let message = TemplateMessage::with_name(content_sid, &recipient.name);
        self.provider
            .send_template(&recipient.to_number, &message)
            .await
    }

    /// Fan a template out to `recipients`.
    ///
    /// Returns the delivery ids of the successful sends only; ordering is
    /// not guaranteed to match the input when sends run concurrently.
    pub async fn broadcast(&self, content_sid: &str, recipients: &[Recipient]) -> Vec<String> {
        let mut delivered = Vec::new();
        let chunk_size = self.config.chunk_size.max(1);
        let chunks: Vec<&[Recipient]> = recipients.chunks(chunk_size).collect();
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let sends = chunk.iter().map(|recipient| async move {
                match self.send_one(recipient, content_sid).await {
                    Ok(sid) => Some(sid),
                    Err(e) => {
                        warn!(to = %recipient.to_number, error = %e, "Send failed, skipping recipient");
                        None
                    }
                }
            });
            delivered.extend(join_all(sends).await.into_iter().flatten());

            if index + 1 < chunk_count {
                tokio::time::sleep(self.config.chunk_pause).await;
            }
        }

        info!(
            requested = recipients.len(),
            delivered = delivered.len(),
            "Broadcast finished"
        );
        delivered
    }
}
