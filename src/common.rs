use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Global request pacing: each caller claims the next start slot and
/// sleeps until it opens.
pub async fn wait_for_rate_slot(next_slot: &Arc<Mutex<Instant>>, min_interval: Duration) {
    if min_interval.is_zero() {
        return;
    }
    let mut guard = next_slot.lock().await;
    let now = Instant::now();
    if *guard > now {
        sleep(*guard - now).await;
    }
    *guard = Instant::now() + min_interval;
}

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_chars = 300usize;
    match trimmed.char_indices().nth(max_chars) {
        None => trimmed.to_string(),
        Some((end, _)) => format!("{}...", &trimmed[..end]),
    }
}
