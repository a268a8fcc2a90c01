//! Conversion orchestration.
//!
//! This module drives the actual media conversions:
//!
//! - A bounded worker pool pulling jobs from a shared queue
//! - ffmpeg invocation with quality presets and per-job feature flags
//! - Progress extraction from the encoder's progress stream
//! - User-initiated abort of running conversions

mod abort;
mod encoder;
mod pool;
mod progress;

pub use abort::{abort_conversion, AbortError};
pub use encoder::{build_encode_args, check_tools, EncoderSettings, ToolStatus};
pub use pool::{QueueError, WorkerPool};
pub use progress::ProgressExtractor;
