//! PostgREST-backed store.
//!
//! Tables are reached at `{url}/rest/v1/{table}` with the project's API key
//! in both the `apikey` and `Authorization` headers. Live updates are
//! delivered by polling for rows newer than the last one seen.

use crate::error::{Result, SurveyError};
use crate::models::{BatchRow, InterestEmail, ResponseBatch};
use crate::store::{BatchStore, CreateOutcome};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SUBSCRIBER_BUFFER: usize = 64;

/// Connection settings for the REST backend.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub url: String,
    pub api_key: String,
    pub batch_table: String,
    pub interest_table: String,
    pub timeout_seconds: u64,
    pub poll_interval_seconds: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            batch_table: "decisions_batch".to_string(),
            interest_table: "interest_emails".to_string(),
            timeout_seconds: 30,
            poll_interval_seconds: 5,
        }
    }
}

/// Store backed by a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct RestStore {
    config: RestConfig,
    http_client: reqwest::Client,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Result<Self> {
        info!("Using REST backend at {}", config.url);
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// `{url}/rest/v1/{table}`
    pub fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http_client
            .request(method, self.endpoint(table))
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    fn batches(&self, method: Method) -> RequestBuilder {
        self.request(method, &self.config.batch_table)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SurveyError::Backend { status, body });
        }
        Ok(response)
    }

    async fn fetch_rows(&self, request: RequestBuilder) -> Result<Vec<BatchRow>> {
        let response = self.send(request).await?;
        Ok(response.json::<Vec<BatchRow>>().await?)
    }

    /// Convert rows, skipping (and logging) any that fail validation.
    fn parse_rows(rows: Vec<BatchRow>) -> Vec<ResponseBatch> {
        rows.into_iter()
            .filter_map(|row| {
                let id = row.batch_id.clone();
                match ResponseBatch::try_from(row) {
                    Ok(batch) => Some(batch),
                    Err(e) => {
                        warn!("Skipping batch {}: {}", id, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Drop batches at or before `since` and return the newest timestamp seen.
    fn newer_than(
        since: Option<DateTime<Utc>>,
        batches: Vec<ResponseBatch>,
    ) -> (Vec<ResponseBatch>, Option<DateTime<Utc>>) {
        let fresh: Vec<ResponseBatch> = batches
            .into_iter()
            .filter(|b| since.is_none() || b.submitted_at > since)
            .collect();
        let newest = fresh.iter().map(|b| b.submitted_at).fold(since, Ord::max);
        (fresh, newest)
    }

    async fn rows_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ResponseBatch>> {
        let mut request = self
            .batches(Method::GET)
            .query(&[("select", "*"), ("order", "submitted_at.asc")]);
        if let Some(since) = since {
            request = request.query(&[(
                "submitted_at",
                format!("gt.{}", since.to_rfc3339_opts(SecondsFormat::Micros, true)),
            )]);
        }
        Ok(Self::parse_rows(self.fetch_rows(request).await?))
    }

    async fn newest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let newest = self.recent(1).await?;
        Ok(newest.first().and_then(|b| b.submitted_at))
    }
}

#[async_trait]
impl BatchStore for RestStore {
    async fn find_by_username(&self, username: &str) -> Result<ResponseBatch> {
        let request = self.batches(Method::GET).query(&[
            ("select", "*".to_string()),
            ("username", format!("eq.{}", username)),
            ("limit", "1".to_string()),
        ]);
        let rows = self.fetch_rows(request).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| SurveyError::NotFound(format!("no batch for username '{}'", username)))?;
        ResponseBatch::try_from(row)
    }

    async fn create_if_absent(&self, batch: &ResponseBatch) -> Result<CreateOutcome> {
        let request = self
            .batches(Method::POST)
            .query(&[("on_conflict", "username")])
            .header(
                "Prefer",
                "return=representation,resolution=ignore-duplicates",
            )
            .json(&vec![BatchRow::from(batch)]);
        let inserted = self.fetch_rows(request).await?;

        if inserted.is_empty() {
            let username = batch.username.as_deref().unwrap_or_default();
            debug!("Username '{}' already has a batch", username);
            return Ok(CreateOutcome::Existing(
                self.find_by_username(username).await?,
            ));
        }
        Ok(CreateOutcome::Created)
    }

    async fn insert(&self, batch: &ResponseBatch) -> Result<()> {
        let request = self
            .batches(Method::POST)
            .header("Prefer", "return=minimal")
            .json(&BatchRow::from(batch));
        self.send(request).await?;
        debug!("Inserted batch {}", batch.batch_id);
        Ok(())
    }

    async fn update(&self, batch: &ResponseBatch) -> Result<()> {
        let request = self
            .batches(Method::PATCH)
            .query(&[("batch_id", format!("eq.{}", batch.batch_id))])
            .header("Prefer", "return=representation")
            .json(&BatchRow::from(batch));
        let updated = self.fetch_rows(request).await?;
        if updated.is_empty() {
            return Err(SurveyError::NotFound(format!("batch {}", batch.batch_id)));
        }
        Ok(())
    }

    async fn delete(&self, batch_id: Uuid) -> Result<()> {
        let request = self
            .batches(Method::DELETE)
            .query(&[("batch_id", format!("eq.{}", batch_id))]);
        self.send(request).await?;
        debug!("Deleted batch {}", batch_id);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ResponseBatch>> {
        let request = self.batches(Method::GET).query(&[
            ("select", "*".to_string()),
            ("order", "submitted_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Ok(Self::parse_rows(self.fetch_rows(request).await?))
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ResponseBatch>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let store = self.clone();
        let mut since = self.newest_timestamp().await?;
        let interval = Duration::from_secs(self.config.poll_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                match store.rows_since(since).await {
                    Ok(batches) => {
                        let (fresh, newest) = Self::newer_than(since, batches);
                        since = newest;
                        for batch in fresh {
                            if tx.send(batch).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("Polling for new batches failed: {}", e),
                }
            }
            debug!("Batch subscription closed");
        });

        Ok(rx)
    }

    async fn save_interest_email(&self, email: &InterestEmail) -> Result<()> {
        let request = self
            .request(Method::POST, &self.config.interest_table)
            .header("Prefer", "return=minimal")
            .json(email);
        self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionRow;
    use chrono::TimeZone;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned JSON body per connection, in order, and hand back the
    /// request lines that were received.
    async fn stub_backend(bodies: Vec<&'static str>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut request_lines = Vec::new();
            for body in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut received = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    received.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&received).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let content_length = text[..end]
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                if !name.eq_ignore_ascii_case("content-length") {
                                    return None;
                                }
                                value.trim().parse::<usize>().ok()
                            })
                            .unwrap_or(0);
                        if received.len() >= end + 4 + content_length {
                            break;
                        }
                    }
                }
                let text = String::from_utf8_lossy(&received).to_string();
                request_lines.push(text.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            request_lines
        });

        (url, handle)
    }

    fn at(minute: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap())
    }

    fn batch_at(minute: u32) -> ResponseBatch {
        let mut batch = ResponseBatch::new(Some(format!("user{}", minute)), None);
        batch.submitted_at = at(minute);
        batch
    }

    const ROW_AT_10_00: &str = r#"[{"batch_id":"6f1c1c8e-5b7a-4c39-9a55-2f0a3e1d7b11","username":"ada","completed":false,"submitted_at":"2025-03-01T10:00:00Z"}]"#;
    const ROW_AT_10_05: &str = r#"[{"batch_id":"0b5d7a6e-3c2f-4e8a-8f61-9d4b2c7e1a05","username":"grace","completed":true,"submitted_at":"2025-03-01T10:05:00Z"}]"#;

    fn store(url: &str) -> RestStore {
        RestStore::new(RestConfig {
            url: url.to_string(),
            api_key: "anon".to_string(),
            ..RestConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let s = store("https://project.example.co/");
        assert_eq!(
            s.endpoint("decisions_batch"),
            "https://project.example.co/rest/v1/decisions_batch"
        );
    }

    #[test]
    fn test_request_carries_api_key() {
        let s = store("https://project.example.co");
        let request = s.batches(Method::GET).build().unwrap();
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["Authorization"], "Bearer anon");
    }

    #[test]
    fn test_parse_rows_skips_malformed() {
        let good = BatchRow::from(&ResponseBatch::new(Some("ada".to_string()), None));
        let bad = BatchRow {
            responses: Some(vec![DecisionRow {
                offense_name: "Arson".to_string(),
                decision_level: "Purple".to_string(),
                look_back_period: None,
                notes: None,
            }]),
            ..good.clone()
        };

        let parsed = RestStore::parse_rows(vec![good, bad]);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_newer_than_advances_cursor() {
        let (fresh, newest) = RestStore::newer_than(
            at(5),
            vec![batch_at(3), batch_at(5), batch_at(9), batch_at(7)],
        );
        let minutes: Vec<_> = fresh.iter().map(|b| b.submitted_at).collect();
        assert_eq!(minutes, vec![at(9), at(7)]);
        assert_eq!(newest, at(9));

        let (fresh, newest) = RestStore::newer_than(at(9), vec![]);
        assert!(fresh.is_empty());
        assert_eq!(newest, at(9));
    }

    #[test]
    fn test_newer_than_without_cursor_keeps_everything() {
        let (fresh, newest) = RestStore::newer_than(None, vec![batch_at(1), batch_at(2)]);
        assert_eq!(fresh.len(), 2);
        assert_eq!(newest, at(2));
    }

    #[tokio::test]
    async fn test_create_if_absent_returns_existing_row_on_duplicate() {
        let (url, server) = stub_backend(vec!["[]", ROW_AT_10_00]).await;
        let s = store(&url);

        let outcome = s
            .create_if_absent(&ResponseBatch::new(Some("ada".to_string()), None))
            .await
            .unwrap();
        match outcome {
            CreateOutcome::Existing(existing) => {
                assert_eq!(
                    existing.batch_id,
                    Uuid::parse_str("6f1c1c8e-5b7a-4c39-9a55-2f0a3e1d7b11").unwrap()
                );
                assert_eq!(existing.username.as_deref(), Some("ada"));
            }
            CreateOutcome::Created => panic!("expected the existing batch"),
        }

        let lines = server.await.unwrap();
        assert!(lines[0].starts_with("POST /rest/v1/decisions_batch?on_conflict=username"));
        assert!(lines[1].starts_with("GET /rest/v1/decisions_batch?"));
        assert!(lines[1].contains("username=eq.ada"));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_only_newer_rows() {
        let (url, server) = stub_backend(vec![ROW_AT_10_00, ROW_AT_10_05, "[]"]).await;
        let s = RestStore::new(RestConfig {
            url,
            api_key: "anon".to_string(),
            poll_interval_seconds: 1,
            ..RestConfig::default()
        })
        .unwrap();

        let mut rx = s.subscribe().await.unwrap();
        let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.username.as_deref(), Some("grace"));
        assert_eq!(delivered.submitted_at, at(5));

        let lines = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        let lines: Vec<String> = lines.iter().map(|l| l.replace("%3A", ":")).collect();
        assert!(lines[0].contains("order=submitted_at.desc"));
        assert!(lines[1].contains("submitted_at=gt.2025-03-01T10:00:00.000000Z"));
        assert!(lines[2].contains("submitted_at=gt.2025-03-01T10:05:00.000000Z"));
        drop(rx);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_http_error() {
        let s = RestStore::new(RestConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
            ..RestConfig::default()
        })
        .unwrap();
        let err = s.recent(10).await.unwrap_err();
        assert!(matches!(err, SurveyError::Http(_)));
    }
}
