use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use log::*;
use seller_gateway_engine::events::MarketplaceEvent;

/// Tracks webhook processing that is still running after its 200 was sent.
///
/// Nothing waits on these tasks during normal operation; the counter only matters at
/// shutdown, where in-flight reconciliations get a bounded grace period before the
/// process exits. An abandoned reconciliation is safe to reprocess on redelivery (it
/// never partially writes an order record).
#[derive(Clone, Default)]
pub struct WebhookJobs {
    active: Arc<AtomicI64>,
}

impl WebhookJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> JobGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        JobGuard { active: Arc::clone(&self.active) }
    }

    pub fn active(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until all jobs finish or the grace period runs out. Returns true if the
    /// queue drained in time.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        while self.active() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("📬️ Abandoning {} in-flight webhook job(s) after the shutdown grace period", self.active());
                return false;
            }
            debug!("📬️ Waiting for {} webhook job(s) to complete", self.active());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        true
    }
}

pub struct JobGuard {
    active: Arc<AtomicI64>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Render an event as a server-sent-events frame.
pub fn sse_frame(event: &MarketplaceEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(e) => {
            error!("📡️ Could not serialize event: {e}");
            Bytes::from_static(b"data: {}\n\n")
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn jobs_drain_when_guards_drop() {
        let jobs = WebhookJobs::new();
        let guard = jobs.begin();
        let other = jobs.begin();
        assert_eq!(jobs.active(), 2);
        drop(guard);
        drop(other);
        assert!(jobs.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn wait_idle_gives_up_after_the_grace_period() {
        let jobs = WebhookJobs::new();
        let _guard = jobs.begin();
        assert!(!jobs.wait_idle(Duration::from_millis(50)).await);
    }

    #[test]
    fn sse_frames_are_newline_terminated_data_lines() {
        let event = MarketplaceEvent {
            user_id: sgw_common::UserId(1),
            topic: meli_tools::NotificationTopic::Orders,
            resource: "/orders/1".to_string(),
            published_at: chrono::Utc::now(),
        };
        let frame = sse_frame(&event);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"resource\":\"/orders/1\""));
    }
}
