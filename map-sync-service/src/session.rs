//! Recorded map sessions replayed against a running engine.
//!
//! A session is NDJSON, one step per line:
//!
//! ```text
//! {"after_ms": 0,   "event": {"type": "viewport_changed", "viewport": {...}}}
//! {"after_ms": 40,  "event": {"type": "district_selected", "district_id": "Distrito 10"}}
//! ```
//!
//! `after_ms` is the pause before the event, relative to the previous step.
//! Blank lines and lines starting with `#` are skipped.

use std::{path::PathBuf, pin::Pin, time::Duration};

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
};

use crate::engine::{EngineHandle, MapEvent};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("failed to read session: {0}")]
    Read(String),
    #[error("invalid session step on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("engine stopped before the session finished")]
    EngineStopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStep {
    pub after: Duration,
    pub event: MapEvent,
}

#[derive(Deserialize)]
struct RecordedStep {
    #[serde(default)]
    after_ms: u64,
    event: MapEvent,
}

pub type SessionStream = Pin<Box<dyn Stream<Item = Result<SessionStep, SessionError>> + Send>>;

#[derive(Debug, Clone)]
pub enum SessionSource {
    File(PathBuf),
    Stdin,
}

impl SessionSource {
    pub fn new(path: Option<&str>) -> Self {
        match path {
            Some(p) if p != "-" => Self::File(PathBuf::from(p)),
            _ => Self::Stdin,
        }
    }

    pub fn stream(&self) -> SessionStream {
        match self.clone() {
            Self::File(path) => {
                let s = stream! {
                    match File::open(&path).await {
                        Ok(file) => {
                            let mut steps = parse_steps(BufReader::new(file));
                            while let Some(step) = steps.next().await {
                                yield step;
                            }
                        }
                        Err(e) => {
                            yield Err(SessionError::Read(format!("failed to open {}: {e}", path.display())));
                        }
                    }
                };
                Box::pin(s)
            }
            Self::Stdin => parse_steps(BufReader::new(tokio::io::stdin())),
        }
    }
}

/// Decode session steps from any buffered reader. The stream ends at the first
/// unreadable or malformed line.
pub fn parse_steps<R>(reader: R) -> SessionStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let s = stream! {
        let mut lines = reader.lines();
        let mut line_no = 0usize;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    yield Err(SessionError::Read(e.to_string()));
                    break;
                }
            };
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            match serde_json::from_str::<RecordedStep>(trimmed) {
                Ok(recorded) => {
                    yield Ok(SessionStep {
                        after: Duration::from_millis(recorded.after_ms),
                        event: recorded.event,
                    });
                }
                Err(e) => {
                    metrics::counter!("session_parse_errors_total").increment(1);
                    yield Err(SessionError::Parse {
                        line: line_no,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }
    };

    Box::pin(s)
}

/// Feed every step to the engine, honoring the recorded pauses. Returns the
/// number of events delivered.
pub async fn replay<S>(mut steps: S, engine: &EngineHandle) -> Result<usize, SessionError>
where
    S: Stream<Item = Result<SessionStep, SessionError>> + Unpin,
{
    let mut delivered = 0usize;
    while let Some(step) = steps.next().await {
        let step = step?;
        if !step.after.is_zero() {
            tokio::time::sleep(step.after).await;
        }
        tracing::debug!(event = ?step.event, "replaying session step");
        engine
            .send(step.event)
            .await
            .map_err(|_| SessionError::EngineStopped)?;
        delivered += 1;
        metrics::counter!("session_events_replayed_total").increment(1);
    }
    Ok(delivered)
}
