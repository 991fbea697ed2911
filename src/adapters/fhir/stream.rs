//! NDJSON download streaming and record delivery
//!
//! [`StreamCorrelator::correlate`] opens one download per manifest entry of the
//! requested type. Each reader parses its body line by line and pushes the
//! parsed documents into a bounded channel; a single consumer hands them to the
//! caller's callback, so the callback never runs concurrently with itself.
//!
//! A failing entry (bad status, broken connection, idle timeout) is logged and
//! counted as drained. Records it delivered before failing are kept and sibling
//! entries keep streaming.

use super::client::FhirClient;
use crate::adapters::auth::AccessToken;
use crate::domain::{OutputEntry, StreamEntryError};
use futures::TryStreamExt;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

const FHIR_NDJSON: &str = "application/fhir+ndjson";

/// Result of streaming one manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub record_type: String,
    pub url: String,
    /// Records delivered to the callback
    pub records: u64,
    /// Lines that were not valid JSON
    pub malformed: u64,
    pub error: Option<StreamEntryError>,
}

impl EntryOutcome {
    fn for_entry(entry: &OutputEntry) -> Self {
        Self {
            record_type: entry.record_type.clone(),
            url: entry.url.clone(),
            records: 0,
            malformed: 0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-entry outcomes of one `correlate` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    pub entries: Vec<EntryOutcome>,
}

impl CorrelationSummary {
    /// Total records delivered across all entries
    pub fn records(&self) -> u64 {
        self.entries.iter().map(|e| e.records).sum()
    }

    pub fn malformed(&self) -> u64 {
        self.entries.iter().map(|e| e.malformed).sum()
    }

    pub fn failed_entries(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries.iter().filter(|e| !e.is_success())
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(EntryOutcome::is_success)
    }
}

/// Streams manifest entries into a record callback
pub struct StreamCorrelator {
    client: FhirClient,
    buffer: usize,
}

impl StreamCorrelator {
    /// `buffer` is the capacity of the channel between readers and the consumer
    pub fn new(client: FhirClient, buffer: usize) -> Self {
        Self {
            client,
            buffer: buffer.max(1),
        }
    }

    /// Streams every entry whose type equals `record_type` and calls
    /// `on_record` once per parsed record
    ///
    /// Resolves after every selected entry has finished, successfully or not.
    pub async fn correlate<F>(
        &self,
        entries: &[OutputEntry],
        record_type: &str,
        token: &AccessToken,
        mut on_record: F,
    ) -> CorrelationSummary
    where
        F: FnMut(Value),
    {
        let selected: Vec<&OutputEntry> = entries
            .iter()
            .filter(|entry| entry.record_type == record_type)
            .collect();

        if selected.is_empty() {
            tracing::info!(record_type = %record_type, "No manifest entries for record type");
            return CorrelationSummary::default();
        }

        tracing::info!(
            record_type = %record_type,
            entries = selected.len(),
            "Streaming manifest entries"
        );

        let (tx, mut rx) = mpsc::channel::<Value>(self.buffer);

        let readers: Vec<_> = selected
            .iter()
            .map(|entry| self.read_entry(entry, token, tx.clone()))
            .collect();
        // Only the readers hold senders now, so the consumer ends when they do
        drop(tx);

        let producers = futures::future::join_all(readers);
        let consumer = async {
            while let Some(record) = rx.recv().await {
                on_record(record);
            }
        };

        let (outcomes, ()) = tokio::join!(producers, consumer);
        let summary = CorrelationSummary { entries: outcomes };

        tracing::info!(
            record_type = %record_type,
            records = summary.records(),
            malformed = summary.malformed(),
            failed_entries = summary.failed_entries().count(),
            "Finished streaming record type"
        );

        summary
    }

    async fn read_entry(
        &self,
        entry: &OutputEntry,
        token: &AccessToken,
        tx: mpsc::Sender<Value>,
    ) -> EntryOutcome {
        let mut outcome = EntryOutcome::for_entry(entry);

        if let Err(error) = self.stream_entry(entry, token, &tx, &mut outcome).await {
            crate::log_entry_failure!(&entry.url, &entry.record_type, &error, outcome.records);
            outcome.error = Some(error);
        } else {
            tracing::debug!(
                url = %entry.url,
                records = outcome.records,
                malformed = outcome.malformed,
                "Entry drained"
            );
        }

        outcome
    }

    async fn stream_entry(
        &self,
        entry: &OutputEntry,
        token: &AccessToken,
        tx: &mpsc::Sender<Value>,
        outcome: &mut EntryOutcome,
    ) -> Result<(), StreamEntryError> {
        let request = self
            .client
            .stream_get(&entry.url, token)
            .header(ACCEPT, FHIR_NDJSON)
            .send();

        let response = tokio::time::timeout(self.client.request_timeout(), request)
            .await
            .map_err(|_| {
                StreamEntryError::Transport(format!(
                    "No response within {} seconds",
                    self.client.request_timeout().as_secs()
                ))
            })?
            .map_err(|e| StreamEntryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamEntryError::Status(status.as_u16()));
        }

        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));

        drain_lines(
            StreamReader::new(Box::pin(body)),
            self.client.line_limits(),
            tx,
            outcome,
        )
        .await
    }
}

/// Bounds applied while reading one NDJSON body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLimits {
    /// Longest wait for the next chunk of bytes
    pub idle_timeout: Duration,
    /// Longest line buffered before it is skipped as malformed
    pub max_line_bytes: usize,
}

/// Reads NDJSON lines from `reader` and sends each parsed document to `tx`
///
/// Blank lines are skipped; lines that are not valid JSON or exceed
/// `limits.max_line_bytes` are logged and counted in `outcome.malformed`. A
/// final line without a trailing newline is still parsed. The idle timeout
/// applies to each read, so a long line that keeps arriving is not cut off.
/// Returns early without error if the receiver is gone.
pub async fn drain_lines<R>(
    mut reader: R,
    limits: LineLimits,
    tx: &mpsc::Sender<Value>,
    outcome: &mut EntryOutcome,
) -> Result<(), StreamEntryError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut oversized = false;
    let mut line_no: u64 = 0;

    loop {
        let chunk = tokio::time::timeout(limits.idle_timeout, reader.fill_buf())
            .await
            .map_err(|_| StreamEntryError::IdleTimeout(limits.idle_timeout.as_secs()))?
            .map_err(|e| StreamEntryError::Transport(e.to_string()))?;

        if chunk.is_empty() {
            if oversized || !line.is_empty() {
                line_no += 1;
                deliver_line(&line, oversized, line_no, limits, tx, outcome).await;
            }
            return Ok(());
        }

        let (take, complete) = match chunk.iter().position(|&b| b == b'\n') {
            Some(newline) => (newline + 1, true),
            None => (chunk.len(), false),
        };

        if !oversized {
            if line.len() + take > limits.max_line_bytes {
                oversized = true;
                line = Vec::new();
            } else {
                line.extend_from_slice(&chunk[..take]);
            }
        }
        reader.consume(take);

        if complete {
            line_no += 1;
            let open = deliver_line(&line, oversized, line_no, limits, tx, outcome).await;
            line.clear();
            oversized = false;
            if !open {
                tracing::debug!("Record consumer closed, stopping stream");
                return Ok(());
            }
        }
    }
}

/// Parses and forwards one line; `false` once the receiver is gone
async fn deliver_line(
    line: &[u8],
    oversized: bool,
    line_no: u64,
    limits: LineLimits,
    tx: &mpsc::Sender<Value>,
    outcome: &mut EntryOutcome,
) -> bool {
    if oversized {
        outcome.malformed += 1;
        tracing::warn!(
            url = %outcome.url,
            line = line_no,
            max_line_bytes = limits.max_line_bytes,
            "Skipping oversized NDJSON line"
        );
        return true;
    }

    let line = trim_line(line);
    if line.is_empty() {
        return true;
    }

    match serde_json::from_slice::<Value>(line) {
        Ok(record) => {
            if tx.send(record).await.is_err() {
                return false;
            }
            outcome.records += 1;
        }
        Err(e) => {
            outcome.malformed += 1;
            tracing::warn!(
                url = %outcome.url,
                line = line_no,
                error = %e,
                "Skipping malformed NDJSON line"
            );
        }
    }
    true
}

fn trim_line(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
