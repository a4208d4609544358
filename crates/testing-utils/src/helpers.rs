//! Test helper utilities
//!
//! Small utilities shared by unit and integration tests across the
//! workspace.

use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;

/// Test environment utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to become true, polling until the timeout
    ///
    /// Useful for integration tests that wait on asynchronous loops to
    /// make progress.
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }

    /// Generate unique test names based on timestamp
    pub fn unique_name(prefix: &str) -> String {
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{}_{}", prefix, timestamp)
    }
}

/// Build a string map from literal pairs
pub fn string_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
