use reqwest::Client;
use std::time::Duration;

use crate::metrics::RESULT_REPORTS_TOTAL;
use crate::models::game::SessionSummary;
use crate::utils::retry::{retry_with_backoff, RetryConfig};

/// Posts final summaries to the external results collector.
///
/// Submission runs on its own task: the caller never waits for it and a
/// failure is only logged.
#[derive(Clone)]
pub struct ResultReporter {
    http_client: Client,
    url: Option<String>,
    retry: RetryConfig,
}

impl ResultReporter {
    pub fn new(url: Option<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url,
            retry: RetryConfig::reporting(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Returns the spawned task so tests can await delivery.
    pub fn submit(&self, summary: SessionSummary) -> Option<tokio::task::JoinHandle<bool>> {
        let Some(url) = self.url.clone() else {
            tracing::debug!(
                "Results collector not configured, skipping summary for team {}",
                summary.team_name
            );
            RESULT_REPORTS_TOTAL.with_label_values(&["skipped"]).inc();
            return None;
        };

        let client = self.http_client.clone();
        let retry = self.retry.clone();

        Some(tokio::spawn(async move {
            let team = summary.team_name.clone();
            let result = retry_with_backoff(retry, || {
                let client = client.clone();
                let url = url.clone();
                let summary = &summary;
                async move {
                    let response = client.post(&url).json(summary).send().await?;
                    response.error_for_status().map(|_| ())
                }
            })
            .await;

            match result {
                Ok(()) => {
                    tracing::info!("Result summary delivered for team {}", team);
                    RESULT_REPORTS_TOTAL.with_label_values(&["delivered"]).inc();
                    true
                }
                Err(e) => {
                    tracing::error!("Failed to deliver result summary for team {}: {}", team, e);
                    RESULT_REPORTS_TOTAL.with_label_values(&["failed"]).inc();
                    false
                }
            }
        }))
    }
}
