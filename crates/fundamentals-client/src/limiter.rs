use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window: at most `max_per_minute` requests in flight
/// within any 60s span. Free-tier fundamentals keys allow 5/min.
pub(crate) struct RequestLimiter {
    max_per_minute: usize,
    sent: Mutex<Vec<Instant>>,
}

impl RequestLimiter {
    pub(crate) fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute: max_per_minute.max(1),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn acquire(&self) {
        loop {
            let mut sent = self.sent.lock().await;
            let now = Instant::now();
            sent.retain(|t| now.duration_since(*t) < WINDOW);

            if sent.len() < self.max_per_minute {
                sent.push(now);
                return;
            }

            let wait = WINDOW.saturating_sub(now.duration_since(sent[0])) + Duration::from_millis(25);
            drop(sent);
            tracing::debug!(
                "waiting {:.1}s for a fundamentals request slot",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }
}
