//! Progress stream extraction.
//!
//! Interprets the encoder's line-oriented `key=value` progress stream and
//! turns it into throttled store updates. The true percentage of total
//! duration is not reliably known up front, so each accepted sample applies
//! a small fixed increment; the store's clamp keeps the value below 100
//! until the worker records an explicit success.

use crate::state::ConversionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::Instant;

/// Sentinel value of the `progress` key that terminates the stream.
const END_SENTINEL: &str = "end";

/// Fixed increment applied per accepted progress sample.
const INCREMENT: f32 = 1.0;

/// Minimum spacing between store updates.
const DEFAULT_THROTTLE: Duration = Duration::from_millis(300);

pub struct ProgressExtractor {
    store: Arc<ConversionStore>,
    conversion_id: String,
    throttle: Duration,
}

impl ProgressExtractor {
    pub fn new(store: Arc<ConversionStore>, conversion_id: impl Into<String>) -> Self {
        Self {
            store,
            conversion_id: conversion_id.into(),
            throttle: DEFAULT_THROTTLE,
        }
    }

    /// Override the update throttle.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Consume the progress stream until the end sentinel or EOF.
    ///
    /// A read error is logged and ends extraction; it does not fail the
    /// conversion — the worker's wait on the process is authoritative.
    pub async fn run<R: AsyncRead + Unpin>(self, stream: R) {
        let mut lines = BufReader::new(stream).lines();
        let mut pct: f32 = 0.0;
        let mut last_update: Option<Instant> = None;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        conversion_id = %self.conversion_id,
                        "Error reading encoder progress stream: {e}"
                    );
                    break;
                }
            };

            // Each progress record ends with a `progress=continue|end` line;
            // every other key, known or unknown, is ignored.
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            if key != "progress" {
                continue;
            }

            let accept = last_update.map_or(true, |t| t.elapsed() >= self.throttle);
            if accept {
                pct = (pct + INCREMENT).min(99.0);
                self.store
                    .set_progress_percentage(&self.conversion_id, pct);
                last_update = Some(Instant::now());
            }

            if value == END_SENTINEL {
                break;
            }
        }
    }
}
