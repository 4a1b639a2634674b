//! Sample Result: the unit of telemetry produced by one measured execution.
//!
//! Timing follows a small state machine driven by the sampling thread:
//! `sample_start` -> (`sample_pause` -> `sample_resume`)* -> `sample_end`.
//! Out-of-sequence calls are programming errors in the caller. They are
//! reported through `tracing` and otherwise ignored, so a broken sampler
//! still produces a best-effort measurement instead of crashing its thread.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Data type of a textual response payload.
pub const TEXT: &str = "text";

/// Data type of a binary response payload.
pub const BINARY: &str = "bin";

/// Media type prefixes whose payload is treated as binary.
const BINARY_PREFIXES: [&str; 3] = ["image/", "audio/", "video/"];

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// One measured unit of work.
///
/// Descriptive attributes are public. Timing and rollup counters are private
/// because their invariants are maintained by the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Sample label, usually the sampler name.
    pub label: String,
    /// Whether the sample succeeded.
    pub success: bool,
    /// Protocol response code.
    #[serde(default)]
    pub response_code: String,
    /// Protocol response message.
    #[serde(default)]
    pub response_message: String,
    /// Name of the sampling thread.
    #[serde(default)]
    pub thread_name: String,
    /// Response payload. Empty once stripped.
    #[serde(default)]
    pub response_data: Vec<u8>,
    /// Received byte count.
    #[serde(default)]
    pub bytes: u64,
    /// Sent byte count.
    #[serde(default)]
    pub sent_bytes: u64,
    /// Time to first byte in milliseconds.
    #[serde(default)]
    pub latency: i64,
    /// Connection establishment time in milliseconds.
    #[serde(default)]
    pub connect_time: i64,
    /// [`TEXT`], [`BINARY`] or empty when unknown.
    #[serde(default)]
    pub data_type: String,
    /// Character set of the payload, when the response declared one.
    #[serde(default)]
    pub data_encoding: Option<String>,
    /// Marks samples produced by monitoring samplers.
    #[serde(default)]
    pub monitor: bool,

    start_time: i64,
    end_time: i64,
    idle_time: i64,
    #[serde(default)]
    pause_time: i64,
    elapsed: i64,
    sample_count: u32,
    #[serde(default)]
    error_count: Option<u32>,
    #[serde(default)]
    sub_results: Vec<SampleResult>,
}

impl Default for SampleResult {
    fn default() -> Self {
        Self {
            label: String::new(),
            success: false,
            response_code: String::new(),
            response_message: String::new(),
            thread_name: String::new(),
            response_data: Vec::new(),
            bytes: 0,
            sent_bytes: 0,
            latency: 0,
            connect_time: 0,
            data_type: String::new(),
            data_encoding: None,
            monitor: false,
            start_time: 0,
            end_time: 0,
            idle_time: 0,
            pause_time: 0,
            elapsed: 0,
            sample_count: 1,
            error_count: None,
            sub_results: Vec::new(),
        }
    }
}

impl SampleResult {
    /// Creates an empty, unsuccessful sample with the given label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    #[must_use]
    pub fn with_response_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.response_data = data.into();
        self
    }

    #[must_use]
    pub fn with_response_code(mut self, code: impl Into<String>) -> Self {
        self.response_code = code.into();
        self
    }

    #[must_use]
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    /// Sets explicit timestamps (epoch milliseconds) and recomputes elapsed.
    #[must_use]
    pub fn with_timing(mut self, start_time: i64, end_time: i64, idle_time: i64) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self.idle_time = idle_time;
        self.pause_time = 0;
        self.recompute_elapsed();
        self
    }

    /// Overrides the rollup counters. Used when a result stands for many samples.
    #[must_use]
    pub fn with_counts(mut self, sample_count: u32, error_count: u32) -> Self {
        self.sample_count = sample_count;
        self.error_count = Some(error_count);
        self
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn idle_time(&self) -> i64 {
        self.idle_time
    }

    /// Elapsed time in milliseconds: end - start - idle.
    pub fn elapsed(&self) -> i64 {
        self.elapsed
    }

    /// Number of samples this result represents (1 unless aggregated).
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Number of failed samples this result represents.
    pub fn error_count(&self) -> u32 {
        self.error_count.unwrap_or(u32::from(!self.success))
    }

    pub fn sub_results(&self) -> &[SampleResult] {
        &self.sub_results
    }

    pub fn is_paused(&self) -> bool {
        self.pause_time != 0
    }

    /// Records the start of the sample.
    pub fn sample_start(&mut self) {
        if self.start_time != 0 {
            tracing::error!(label = %self.label, "sample_start called twice");
            return;
        }
        self.start_time = now_millis();
    }

    /// Records the end of the sample and computes the elapsed time.
    pub fn sample_end(&mut self) {
        if self.end_time != 0 {
            tracing::error!(label = %self.label, "sample_end called twice");
            return;
        }
        let now = now_millis();
        if self.start_time == 0 {
            tracing::error!(label = %self.label, "sample_end called before sample_start");
            self.start_time = now;
        }
        if self.pause_time != 0 {
            tracing::error!(label = %self.label, "sample_end called while paused");
            self.idle_time += now - self.pause_time;
            self.pause_time = 0;
        }
        self.end_time = now;
        self.recompute_elapsed();
    }

    /// Marks the beginning of an interval excluded from the elapsed time.
    pub fn sample_pause(&mut self) {
        if self.pause_time != 0 {
            tracing::error!(label = %self.label, "sample_pause called twice");
            return;
        }
        self.pause_time = now_millis();
    }

    /// Ends the current pause and accumulates it into the idle time.
    pub fn sample_resume(&mut self) {
        if self.pause_time == 0 {
            tracing::error!(label = %self.label, "sample_resume called without sample_pause");
            return;
        }
        self.idle_time += now_millis() - self.pause_time;
        self.pause_time = 0;
    }

    /// Appends a child result.
    ///
    /// The child runs within or after the parent, so the parent's end time
    /// extends to cover it and its elapsed time is recomputed. Byte counts
    /// are summed.
    pub fn add_sub_result(&mut self, child: SampleResult) {
        if self.start_time == 0 {
            self.start_time = child.start_time;
        }
        self.end_time = self.end_time.max(child.end_time);
        self.bytes += child.bytes;
        self.sent_bytes += child.sent_bytes;
        self.recompute_elapsed();
        self.sub_results.push(child);
    }

    /// Derives data type and encoding from a `Content-Type` header value.
    ///
    /// `None` leaves both untouched.
    pub fn set_encoding_and_type(&mut self, content_type: Option<&str>) {
        let Some(content_type) = content_type else {
            return;
        };

        let lower = content_type.to_ascii_lowercase();
        if let Some(idx) = lower.find("charset=") {
            let raw = &content_type[idx + "charset=".len()..];
            let raw = raw.split(';').next().unwrap_or_default().trim();
            let charset = raw.trim_matches('"');
            if !charset.is_empty() {
                self.data_encoding = Some(charset.to_string());
            }
        }

        let media = lower.trim_start();
        self.data_type = if BINARY_PREFIXES.iter().any(|p| media.starts_with(p)) {
            BINARY.to_string()
        } else {
            TEXT.to_string()
        };
    }

    /// Drops the response payload of this result.
    pub fn strip_response_data(&mut self) {
        self.response_data = Vec::new();
    }

    /// Drops the payload of this result and of every successful sub-result.
    /// Failed sub-results keep their payload for diagnosis.
    pub fn strip_successful(&mut self) {
        if self.success {
            self.strip_response_data();
        }
        for child in &mut self.sub_results {
            child.strip_successful();
        }
    }

    fn recompute_elapsed(&mut self) {
        self.elapsed = self.end_time - self.start_time - self.idle_time;
    }
}
