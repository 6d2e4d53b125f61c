//! HTTP + WebSocket access to the execution engine.
#![allow(clippy::result_large_err)]

use crate::core::approval::ApprovalAction;
use crate::core::config::EngineConfig;
use crate::core::error::AppError;
use crate::core::runs::RunRecord;
use crate::core::types::ErrorCategory;
use crate::session::event::{ConnectionState, ConnectionStatus, SessionEvent};
use crate::session::message::LiveMessage;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// ASCII set for encoding path segments (slashes included).
const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'%');

const MAX_BACKOFF: StdDuration = StdDuration::from_secs(60);

/// Operations the session needs from the engine. Failures are transport failures.
#[async_trait]
pub trait EngineApi: Send + Sync {
    async fn list_runs(&self, flow_id: &str) -> Result<Vec<RunRecord>, AppError>;

    async fn get_run(&self, flow_id: &str, run_id: &str) -> Result<RunRecord, AppError>;

    async fn submit_decision(&self, action: &ApprovalAction) -> Result<(), AppError>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid engine url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    fn code(&self) -> &'static str {
        match self {
            ClientError::Http { .. } => "FL-ENGINE-001",
            ClientError::Status { .. } => "FL-ENGINE-002",
            ClientError::Decode { .. } => "FL-ENGINE-003",
            ClientError::Url(_) => "FL-ENGINE-004",
        }
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        let code = err.code();
        let category = match err {
            ClientError::Url(_) => ErrorCategory::ConfigError,
            _ => ErrorCategory::TransportFailure,
        };
        let message = err.to_string();
        let error = match category {
            ErrorCategory::TransportFailure => AppError::transport(message),
            _ => AppError::new(category, message),
        };
        error.with_code(code)
    }
}

#[derive(Serialize)]
struct DecisionPayload<'a> {
    approver: &'a str,
    source: &'a str,
}

/// reqwest/tokio-tungstenite client for one engine instance.
#[derive(Clone)]
pub struct EngineClient {
    http: reqwest::Client,
    http_url: Url,
    ws_url: Url,
    history_limit: usize,
}

impl EngineClient {
    pub fn new(http_url: Url, ws_url: Url, history_limit: usize) -> Self {
        EngineClient {
            http: reqwest::Client::new(),
            http_url,
            ws_url,
            history_limit,
        }
    }

    pub fn from_config(engine: &EngineConfig, history_limit: usize) -> Result<Self, AppError> {
        let http_url = Url::parse(&engine.http_url).map_err(ClientError::from)?;
        let ws_url = Url::parse(&engine.ws_url).map_err(ClientError::from)?;
        Ok(EngineClient::new(http_url, ws_url, history_limit))
    }

    pub fn events_url(&self, flow_id: &str) -> String {
        join_path(&self.ws_url, &["api", "flows", &encode_segment(flow_id), "events"])
    }

    fn runs_url(&self, flow_id: &str) -> String {
        join_path(&self.http_url, &["api", "flows", &encode_segment(flow_id), "runs"])
    }

    async fn get_json(&self, url: &str) -> Result<Value, ClientError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ClientError::Http {
                url: url.to_string(),
                source,
            })?;
        let resp = ensure_success(url, resp).await?;
        resp.json::<Value>().await.map_err(|e| ClientError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn fetch_runs(&self, flow_id: &str) -> Result<Vec<RunRecord>, ClientError> {
        let url = format!("{}?limit={}", self.runs_url(flow_id), self.history_limit);
        let value = self.get_json(&url).await?;

        let entries = match value {
            Value::Array(entries) => entries,
            Value::Object(mut map) => match map.remove("runs") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(ClientError::Decode {
                        url,
                        message: "expected an array of runs".to_string(),
                    })
                }
            },
            _ => {
                return Err(ClientError::Decode {
                    url,
                    message: "expected an array of runs".to_string(),
                })
            }
        };

        let total = entries.len();
        let records: Vec<RunRecord> = entries
            .into_iter()
            .filter_map(|entry| match RunRecord::from_value(entry) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(flow_id, error = %err.message, "skipping unreadable run record");
                    None
                }
            })
            .collect();
        tracing::debug!(flow_id, total, kept = records.len(), "fetched run history");
        Ok(records)
    }

    async fn fetch_run(&self, flow_id: &str, run_id: &str) -> Result<Option<RunRecord>, ClientError> {
        let url = join_path(
            &self.http_url,
            &["api", "flows", &encode_segment(flow_id), "runs", &encode_segment(run_id)],
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::Http {
                url: url.clone(),
                source,
            })?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(&url, resp).await?;
        let value = resp.json::<Value>().await.map_err(|e| ClientError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let record = RunRecord::from_value(value).map_err(|e| ClientError::Decode {
            url,
            message: e.message,
        })?;
        Ok(Some(record))
    }

    async fn post_decision(&self, action: &ApprovalAction) -> Result<(), ClientError> {
        let url = join_path(
            &self.http_url,
            &[
                "api",
                "flows",
                &encode_segment(&action.flow_id),
                "runs",
                &encode_segment(&action.run_id),
                action.decision.as_str(),
            ],
        );
        let payload = DecisionPayload {
            approver: &action.approver.id,
            source: &action.approver.source,
        };
        let resp = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| ClientError::Http {
                url: url.clone(),
                source,
            })?;
        ensure_success(&url, resp).await?;
        Ok(())
    }
}

#[async_trait]
impl EngineApi for EngineClient {
    async fn list_runs(&self, flow_id: &str) -> Result<Vec<RunRecord>, AppError> {
        Ok(self.fetch_runs(flow_id).await?)
    }

    /// Single-run endpoint first; engines without it are served by filtering the list.
    async fn get_run(&self, flow_id: &str, run_id: &str) -> Result<RunRecord, AppError> {
        if let Some(record) = self.fetch_run(flow_id, run_id).await? {
            return Ok(record);
        }
        tracing::debug!(flow_id, run_id, "run endpoint returned 404; searching history");
        self.fetch_runs(flow_id)
            .await?
            .into_iter()
            .find(|record| record.id == run_id)
            .ok_or_else(|| {
                AppError::transport(format!("run {} not found for flow {}", run_id, flow_id))
                    .with_code("FL-ENGINE-005")
            })
    }

    async fn submit_decision(&self, action: &ApprovalAction) -> Result<(), AppError> {
        tracing::info!(
            flow_id = %action.flow_id,
            run_id = %action.run_id,
            decision = %action.decision,
            approver = %action.approver.id,
            "submitting approval decision"
        );
        Ok(self.post_decision(action).await?)
    }
}

async fn ensure_success(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        url: url.to_string(),
        status,
        body,
    })
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT_ENCODE_SET).to_string()
}

fn join_path(base: &Url, segments: &[&str]) -> String {
    let mut url = base.as_str().trim_end_matches('/').to_string();
    for segment in segments {
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    url
}

/// Subscribe to the flow's push channel, reconnecting with exponential backoff.
///
/// Returns once the session queue is closed.
pub async fn websocket_loop(client: EngineClient, flow_id: String, event_tx: UnboundedSender<SessionEvent>) {
    let url = client.events_url(&flow_id);
    let mut backoff = StdDuration::from_secs(1);
    loop {
        let connecting = ConnectionStatus::new(ConnectionState::Connecting, url.clone());
        if event_tx.send(SessionEvent::Connection(connecting)).is_err() {
            return;
        }

        let connected = tokio::select! {
            _ = event_tx.closed() => return,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((stream, _)) => {
                let _ = event_tx.send(SessionEvent::Connection(ConnectionStatus::new(
                    ConnectionState::Connected,
                    "connected",
                )));
                backoff = StdDuration::from_secs(1);
                let (mut writer, mut reader) = stream.split();

                loop {
                    let message = tokio::select! {
                        _ = event_tx.closed() => return,
                        message = reader.next() => message,
                    };
                    match message {
                        Some(Ok(Message::Text(txt))) => forward_frame(&txt, &event_tx),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(txt) => forward_frame(&txt, &event_tx),
                            Err(_) => tracing::debug!("ignoring non-utf8 binary frame"),
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = writer.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = event_tx.send(SessionEvent::Connection(ConnectionStatus::new(
                                ConnectionState::Disconnected,
                                "closed by engine",
                            )));
                            break;
                        }
                        Some(Err(err)) => {
                            tracing::error!("event socket error: {}", err);
                            let _ = event_tx.send(SessionEvent::Connection(ConnectionStatus::new(
                                ConnectionState::Disconnected,
                                err.to_string(),
                            )));
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
            Err(err) => {
                tracing::warn!(url = %url, "event socket connect failed: {}", err);
                let _ = event_tx.send(SessionEvent::Connection(ConnectionStatus::new(
                    ConnectionState::Disconnected,
                    format!("connect failed: {}", err),
                )));
            }
        }

        tokio::select! {
            _ = event_tx.closed() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
    }
}

fn forward_frame(txt: &str, event_tx: &UnboundedSender<SessionEvent>) {
    match LiveMessage::parse(txt) {
        Ok(message) => {
            let _ = event_tx.send(SessionEvent::Live(message));
        }
        Err(err) => tracing::warn!("dropping unparseable live frame: {} - Raw: {}", err, txt),
    }
}
