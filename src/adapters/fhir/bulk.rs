//! FHIR Bulk Data export kickoff and status polling
//!
//! The asynchronous request pattern works in two steps:
//!
//! 1. `GET {base}/Group/{id}/$export` with `Prefer: respond-async`. The server
//!    answers `202 Accepted` with a `Content-Location` status URL.
//! 2. The status URL is polled. `202` means the job is still running, `200`
//!    carries the completion manifest, and error statuses end the job.
//!
//! The polling protocol is an explicit state machine ([`PollState`]) whose
//! transition function is pure. [`BulkExportPoller`] only performs the HTTP
//! requests, feeds their outcome into [`PollState::advance`] and sleeps.

use super::client::{FhirClient, FHIR_JSON};
use crate::adapters::auth::AccessToken;
use crate::config::PollConfig;
use crate::domain::{BulkExportError, ExportRequest, Manifest, PollLocation};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_LOCATION, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::watch;

/// Polling state of one export job
#[derive(Debug)]
pub enum PollState {
    /// Kickoff accepted, no status check yet
    Submitted,
    /// Job still running
    Polling {
        attempt: u32,
        consecutive_failures: u32,
    },
    /// Manifest received
    Complete(Manifest),
    /// Terminal failure
    Failed(BulkExportError),
}

/// Outcome of one status check, reduced to what the state machine needs
#[derive(Debug)]
pub enum PollObservation {
    /// 200 with a parseable manifest
    Completed(Manifest),
    /// 200 whose body is not a manifest
    InvalidManifest(String),
    /// 202, optionally with an `X-Progress` value
    InProgress { progress: Option<String> },
    /// Transport error, 429, 5xx or an unexpected status
    Transient(String),
    /// 404, 410 or another client error: the job is gone
    Rejected { status: u16, message: String },
}

impl PollState {
    /// Applies one status check to the current state
    ///
    /// Terminal states are returned unchanged.
    pub fn advance(self, observation: PollObservation, policy: &PollConfig) -> PollState {
        let (attempt, consecutive_failures) = match self {
            PollState::Submitted => (0, 0),
            PollState::Polling {
                attempt,
                consecutive_failures,
            } => (attempt, consecutive_failures),
            terminal => return terminal,
        };
        let attempt = attempt.saturating_add(1);

        match observation {
            PollObservation::Completed(manifest) => PollState::Complete(manifest),
            PollObservation::InvalidManifest(reason) => {
                PollState::Failed(BulkExportError::InvalidManifest(reason))
            }
            PollObservation::Rejected { status, message } => {
                PollState::Failed(BulkExportError::JobFailed { status, message })
            }
            PollObservation::InProgress { .. } => {
                if attempt >= policy.max_attempts {
                    PollState::Failed(BulkExportError::Timeout { attempts: attempt })
                } else {
                    PollState::Polling {
                        attempt,
                        consecutive_failures: 0,
                    }
                }
            }
            PollObservation::Transient(last_error) => {
                let consecutive_failures = consecutive_failures.saturating_add(1);
                if consecutive_failures > policy.max_consecutive_failures {
                    PollState::Failed(BulkExportError::TooManyFailures {
                        attempts: consecutive_failures,
                        last_error,
                    })
                } else if attempt >= policy.max_attempts {
                    PollState::Failed(BulkExportError::Timeout { attempts: attempt })
                } else {
                    PollState::Polling {
                        attempt,
                        consecutive_failures,
                    }
                }
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Complete(_) | PollState::Failed(_))
    }

    /// Number of status checks performed so far
    pub fn attempt(&self) -> u32 {
        match self {
            PollState::Polling { attempt, .. } => *attempt,
            _ => 0,
        }
    }
}

/// Maps a status response onto a [`PollObservation`]
pub fn observe_status(status: StatusCode, progress: Option<String>, body: &str) -> PollObservation {
    match status {
        StatusCode::OK => match serde_json::from_str::<Manifest>(body) {
            Ok(manifest) => PollObservation::Completed(manifest),
            Err(e) => PollObservation::InvalidManifest(e.to_string()),
        },
        StatusCode::ACCEPTED => PollObservation::InProgress { progress },
        StatusCode::TOO_MANY_REQUESTS => {
            PollObservation::Transient(format!("Status endpoint throttled the request ({status})"))
        }
        s if s.is_server_error() => {
            PollObservation::Transient(format!("Status endpoint returned {s}: {}", snippet(body)))
        }
        s if s.is_client_error() => PollObservation::Rejected {
            status: s.as_u16(),
            message: snippet(body),
        },
        s => PollObservation::Transient(format!("Unexpected status {s}")),
    }
}

/// Delay before the next status check
///
/// `interval * multiplier^(attempt - 1)`, capped at the maximum. A larger
/// server `Retry-After` hint wins, also capped.
pub fn poll_delay(policy: &PollConfig, attempt: u32, retry_after: Option<u64>) -> Duration {
    let max = policy.max_interval_seconds as f64;
    let exponent = attempt.saturating_sub(1).min(64) as i32;
    let computed = (policy.interval_seconds as f64 * policy.backoff_multiplier.powi(exponent)).min(max);
    let seconds = match retry_after {
        Some(hint) if hint as f64 > computed => (hint as f64).min(max),
        _ => computed,
    };
    Duration::from_secs_f64(seconds)
}

fn snippet(body: &str) -> String {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Bulk Data export client
///
/// # Example
///
/// ```no_run
/// use labwatch::adapters::auth::AccessToken;
/// use labwatch::adapters::fhir::{BulkExportPoller, FhirClient};
/// use labwatch::config::FhirConfig;
/// use labwatch::domain::ExportRequest;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = FhirConfig::default();
/// let poller = BulkExportPoller::new(FhirClient::new(&config)?, config.poll.clone());
///
/// let request = ExportRequest::new("group-1").with_types(["Patient", "Observation"]);
/// let token = AccessToken::new("token");
/// let location = poller.start_export(&request, &token).await?;
/// let manifest = poller.await_completion(&location, &token).await?;
/// println!("{} output files", manifest.output.len());
/// # Ok(())
/// # }
/// ```
pub struct BulkExportPoller {
    client: FhirClient,
    policy: PollConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl BulkExportPoller {
    pub fn new(client: FhirClient, policy: PollConfig) -> Self {
        Self {
            client,
            policy,
            shutdown: None,
        }
    }

    /// Aborts polling sleeps when the channel turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn kickoff_url(&self, request: &ExportRequest) -> String {
        format!(
            "{}/Group/{}/$export",
            self.client.base_url(),
            request.group_id()
        )
    }

    /// Submits the export request and returns the status URL
    pub async fn start_export(
        &self,
        request: &ExportRequest,
        token: &AccessToken,
    ) -> Result<PollLocation, BulkExportError> {
        let url = self.kickoff_url(request);

        let mut query: Vec<(&str, String)> = Vec::new();
        if !request.resource_types().is_empty() {
            query.push(("_type", request.type_param()));
        }
        if !request.type_filters().is_empty() {
            query.push((request.type_filter_key(), request.type_filter_param()));
        }

        tracing::info!(
            url = %url,
            types = %request.type_param(),
            type_filter = %request.type_filter_param(),
            "Starting bulk export"
        );

        let response = self
            .client
            .get(&url, token)
            .query(&query)
            .header(ACCEPT, FHIR_JSON)
            .header("Prefer", "respond-async")
            .send()
            .await
            .map_err(|e| BulkExportError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkExportError::KickoffFailed {
                status: status.as_u16(),
                message: snippet(&body),
            });
        }

        let location = response
            .headers()
            .get(CONTENT_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(BulkExportError::MissingContentLocation)?;

        let location = self.resolve_location(location)?;

        tracing::info!(status = status.as_u16(), location = %location, "Bulk export accepted");
        Ok(location)
    }

    /// Relative `Content-Location` values are resolved against the base URL
    fn resolve_location(&self, location: &str) -> Result<PollLocation, BulkExportError> {
        let absolute = match url::Url::parse(location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = url::Url::parse(&format!("{}/", self.client.base_url()))
                    .map_err(|_| BulkExportError::MissingContentLocation)?;
                base.join(location)
                    .map_err(|_| BulkExportError::MissingContentLocation)?
            }
            Err(_) => return Err(BulkExportError::MissingContentLocation),
        };
        PollLocation::new(absolute.to_string()).map_err(|_| BulkExportError::MissingContentLocation)
    }

    /// Polls the status URL until the job completes or fails
    pub async fn await_completion(
        &self,
        location: &PollLocation,
        token: &AccessToken,
    ) -> Result<Manifest, BulkExportError> {
        let mut state = PollState::Submitted;

        loop {
            let (observation, retry_after) = self.check_status(location, token).await;

            state = match state.advance(observation, &self.policy) {
                PollState::Complete(manifest) => {
                    tracing::info!(
                        outputs = manifest.output.len(),
                        errors = manifest.error.len(),
                        transaction_time = ?manifest.transaction_time,
                        "Bulk export complete"
                    );
                    return Ok(manifest);
                }
                PollState::Failed(error) => {
                    tracing::error!(error = %error, "Bulk export failed");
                    return Err(error);
                }
                next => next,
            };

            let attempt = state.attempt();
            let delay = poll_delay(&self.policy, attempt, retry_after);
            tracing::info!(
                attempt = attempt,
                max_attempts = self.policy.max_attempts,
                delay_secs = delay.as_secs_f64(),
                "Waiting before next export status check"
            );
            self.sleep_or_cancel(delay).await?;
        }
    }

    /// Kickoff followed by polling
    pub async fn export(
        &self,
        request: &ExportRequest,
        token: &AccessToken,
    ) -> Result<Manifest, BulkExportError> {
        let location = self.start_export(request, token).await?;
        self.await_completion(&location, token).await
    }

    async fn check_status(
        &self,
        location: &PollLocation,
        token: &AccessToken,
    ) -> (PollObservation, Option<u64>) {
        let response = match self
            .client
            .get(location.as_str(), token)
            .header(ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %location, error = %e, "Export status request failed");
                return (PollObservation::Transient(e.to_string()), None);
            }
        };

        let status = response.status();
        let progress = header_str(response.headers(), "x-progress");
        let retry_after = retry_after_seconds(response.headers());
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(url = %location, error = %e, "Failed to read export status body");
                return (PollObservation::Transient(e.to_string()), retry_after);
            }
        };

        crate::log_poll_attempt!(location, status.as_u16(), progress);

        (observe_status(status, progress, &body), retry_after)
    }

    async fn sleep_or_cancel(&self, delay: Duration) -> Result<(), BulkExportError> {
        let Some(mut shutdown) = self.shutdown.clone() else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        if *shutdown.borrow() {
            return Err(BulkExportError::Cancelled);
        }

        let cancelled = async move {
            // A dropped sender never cancels
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancelled => {
                tracing::info!("Export polling interrupted by shutdown");
                Err(BulkExportError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FhirConfig;

    fn policy() -> PollConfig {
        PollConfig {
            interval_seconds: 1,
            max_interval_seconds: 8,
            backoff_multiplier: 2.0,
            max_attempts: 5,
            max_consecutive_failures: 2,
        }
    }

    fn in_progress() -> PollObservation {
        PollObservation::InProgress { progress: None }
    }

    fn transient() -> PollObservation {
        PollObservation::Transient("503".to_string())
    }

    #[test]
    fn test_in_progress_then_complete() {
        let policy = policy();
        let state = PollState::Submitted
            .advance(in_progress(), &policy)
            .advance(in_progress(), &policy);
        assert_eq!(state.attempt(), 2);

        let state = state.advance(PollObservation::Completed(Manifest::default()), &policy);
        assert!(matches!(state, PollState::Complete(_)));
    }

    #[test]
    fn test_in_progress_resets_failures() {
        let policy = policy();
        let state = PollState::Submitted
            .advance(transient(), &policy)
            .advance(transient(), &policy)
            .advance(in_progress(), &policy);
        assert!(matches!(
            state,
            PollState::Polling {
                attempt: 3,
                consecutive_failures: 0
            }
        ));

        let state = state.advance(transient(), &policy);
        assert!(matches!(
            state,
            PollState::Polling {
                consecutive_failures: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_too_many_consecutive_failures() {
        let policy = policy();
        let state = PollState::Submitted
            .advance(transient(), &policy)
            .advance(transient(), &policy)
            .advance(transient(), &policy);
        match state {
            PollState::Failed(BulkExportError::TooManyFailures { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "503");
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_timeout_after_max_attempts() {
        let policy = policy();
        let mut state = PollState::Submitted;
        for _ in 0..4 {
            state = state.advance(in_progress(), &policy);
            assert!(!state.is_terminal());
        }
        let state = state.advance(in_progress(), &policy);
        assert!(matches!(
            state,
            PollState::Failed(BulkExportError::Timeout { attempts: 5 })
        ));
    }

    #[test]
    fn test_rejected_is_terminal() {
        let state = PollState::Submitted.advance(
            PollObservation::Rejected {
                status: 410,
                message: "gone".to_string(),
            },
            &policy(),
        );
        assert!(matches!(
            state,
            PollState::Failed(BulkExportError::JobFailed { status: 410, .. })
        ));
    }

    #[test]
    fn test_terminal_state_unchanged() {
        let state = PollState::Complete(Manifest::default()).advance(transient(), &policy());
        assert!(matches!(state, PollState::Complete(_)));
    }

    #[test]
    fn test_observe_status() {
        let manifest = r#"{"transactionTime":"2024-01-01T00:00:00Z","request":"x","requiresAccessToken":true,"output":[{"type":"Patient","url":"http://x/1.ndjson"}],"error":[]}"#;
        assert!(matches!(
            observe_status(StatusCode::OK, None, manifest),
            PollObservation::Completed(m) if m.output.len() == 1
        ));
        assert!(matches!(
            observe_status(StatusCode::OK, None, "not json"),
            PollObservation::InvalidManifest(_)
        ));
        assert!(matches!(
            observe_status(StatusCode::ACCEPTED, Some("50%".to_string()), ""),
            PollObservation::InProgress { progress: Some(p) } if p == "50%"
        ));
        assert!(matches!(
            observe_status(StatusCode::TOO_MANY_REQUESTS, None, ""),
            PollObservation::Transient(_)
        ));
        assert!(matches!(
            observe_status(StatusCode::BAD_GATEWAY, None, ""),
            PollObservation::Transient(_)
        ));
        assert!(matches!(
            observe_status(StatusCode::NOT_FOUND, None, "missing"),
            PollObservation::Rejected { status: 404, .. }
        ));
        assert!(matches!(
            observe_status(StatusCode::NO_CONTENT, None, ""),
            PollObservation::Transient(_)
        ));
    }

    #[test]
    fn test_poll_delay() {
        let policy = policy();
        assert_eq!(poll_delay(&policy, 1, None), Duration::from_secs(1));
        assert_eq!(poll_delay(&policy, 2, None), Duration::from_secs(2));
        assert_eq!(poll_delay(&policy, 3, None), Duration::from_secs(4));
        assert_eq!(poll_delay(&policy, 10, None), Duration::from_secs(8));
        assert_eq!(poll_delay(&policy, 1, Some(5)), Duration::from_secs(5));
        assert_eq!(poll_delay(&policy, 1, Some(60)), Duration::from_secs(8));
        assert_eq!(poll_delay(&policy, 3, Some(2)), Duration::from_secs(4));
    }

    #[test]
    fn test_poll_delay_fixed_by_default() {
        let policy = PollConfig::default();
        assert_eq!(poll_delay(&policy, 1, None), Duration::from_secs(30));
        assert_eq!(poll_delay(&policy, 50, None), Duration::from_secs(30));
    }

    fn poller(base_url: &str) -> BulkExportPoller {
        let config = FhirConfig {
            base_url: base_url.to_string(),
            group_id: "g1".to_string(),
            ..Default::default()
        };
        BulkExportPoller::new(FhirClient::new(&config).unwrap(), policy())
    }

    #[test]
    fn test_resolve_relative_location() {
        let poller = poller("https://fhir.example.com/R4");
        let location = poller.resolve_location("/bulk/status/1").unwrap();
        assert_eq!(location.as_str(), "https://fhir.example.com/bulk/status/1");
        let location = poller
            .resolve_location("https://other.example.com/status/2")
            .unwrap();
        assert_eq!(location.as_str(), "https://other.example.com/status/2");
    }

    #[tokio::test]
    async fn test_cancelled_while_sleeping() {
        let (tx, rx) = watch::channel(false);
        let poller = poller("http://localhost").with_shutdown(rx);

        let sleeper = poller.sleep_or_cancel(Duration::from_secs(30));
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        };
        let (result, _) = tokio::join!(sleeper, trigger);
        assert!(matches!(result, Err(BulkExportError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_does_not_cancel() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let poller = poller("http://localhost").with_shutdown(rx);
        assert!(poller.sleep_or_cancel(Duration::from_millis(10)).await.is_ok());
    }
}
