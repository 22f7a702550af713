use std::sync::Arc;

/// Source of "now" in milliseconds since the epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn system_clock() -> Clock {
    Arc::new(now_millis)
}
