//! Statistical sender: per-key rolling aggregation
//!
//! Instead of shipping every sample, samples sharing a key (label plus thread
//! group, or label plus thread name) are folded into one [`AggregateResult`].
//! A flush ships one aggregate per key seen since the previous flush, in the
//! order the keys first appeared, and then forgets every key.

use async_trait::async_trait;
use loadrelay_core::{
    BatchSettings, CoreResult, HostContext, RemoteListener, SampleEvent, SampleResult,
    StatisticalSettings,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::sender::{absorb_transport_error, SampleSender};
use crate::threshold::FlushTrigger;

/// Rolling merge of every sample sharing one key.
#[derive(Debug, Clone)]
pub struct AggregateResult {
    key: String,
    thread_group: String,
    result: SampleResult,
    sample_count: u32,
    error_count: u32,
}

impl AggregateResult {
    /// Starts an empty aggregate that takes its descriptive fields from the
    /// first sample of the key. Timing and counters start at zero.
    pub fn new(key: impl Into<String>, first: &SampleEvent) -> Self {
        let template = first.result();
        let mut result = SampleResult::new(template.label.clone())
            .with_success(true)
            .with_thread_name(template.thread_name.clone())
            .with_response_code(template.response_code.clone());
        result.response_message = template.response_message.clone();
        result.data_type = template.data_type.clone();

        Self {
            key: key.into(),
            thread_group: first.thread_group().to_string(),
            result,
            sample_count: 0,
            error_count: 0,
        }
    }

    /// Aggregation key for an event.
    pub fn key_for(event: &SampleEvent, key_on_thread_name: bool) -> String {
        let result = event.result();
        let suffix = if key_on_thread_name {
            result.thread_name.as_str()
        } else {
            event.thread_group()
        };
        format!("{}-{}", result.label, suffix)
    }

    /// Folds one sample into the aggregate.
    ///
    /// Start is the earliest start, end the latest end and idle the sum, so
    /// elapsed always equals end - start - idle rather than a sum of elapsed
    /// times.
    pub fn merge(&mut self, sample: &SampleResult) {
        let start = if self.sample_count == 0 || self.result.start_time() == 0 {
            sample.start_time()
        } else {
            self.result.start_time().min(sample.start_time())
        };
        let end = self.result.end_time().max(sample.end_time());
        let idle = self.result.idle_time() + sample.idle_time();

        let mut merged = std::mem::take(&mut self.result).with_timing(start, end, idle);
        merged.bytes += sample.bytes;
        merged.sent_bytes += sample.sent_bytes;
        merged.latency += sample.latency;
        merged.connect_time += sample.connect_time;
        if !sample.success {
            merged.success = false;
            self.error_count += 1;
        }
        self.result = merged;
        self.sample_count += sample.sample_count();
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn result(&self) -> &SampleResult {
        &self.result
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Wraps the aggregate in an event ready for delivery.
    pub fn into_event(self, ctx: &HostContext) -> SampleEvent {
        let result = self.result.with_counts(self.sample_count, self.error_count);
        SampleEvent::new(result, self.thread_group, ctx)
    }
}

/// Aggregates keyed by [`AggregateResult::key_for`], kept in first-seen order.
#[derive(Debug, Default)]
pub struct AggregationTable {
    /// One entry per distinct key, appended when the key first appears.
    store: Vec<AggregateResult>,
    index: HashMap<String, usize>,
}

impl AggregationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the event under `key`, creating the aggregate lazily.
    ///
    /// Returns true when the key was new since the last drain.
    pub fn merge(&mut self, key: String, event: &SampleEvent) -> bool {
        if let Some(&slot) = self.index.get(&key) {
            self.store[slot].merge(event.result());
            return false;
        }

        let mut aggregate = AggregateResult::new(key.clone(), event);
        aggregate.merge(event.result());
        self.index.insert(key, self.store.len());
        self.store.push(aggregate);
        true
    }

    pub fn get(&self, key: &str) -> Option<&AggregateResult> {
        self.index.get(key).map(|&slot| &self.store[slot])
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Removes and returns every aggregate in first-seen order.
    pub fn drain(&mut self) -> Vec<AggregateResult> {
        self.index.clear();
        std::mem::take(&mut self.store)
    }
}

/// Sender that ships per-key aggregates instead of raw samples.
pub struct StatisticalSender {
    listener: Arc<dyn RemoteListener>,
    ctx: HostContext,
    key_on_thread_name: bool,
    state: Mutex<StatisticalState>,
}

struct StatisticalState {
    table: AggregationTable,
    /// Raw samples merged since the last flush.
    sample_count: usize,
    trigger: FlushTrigger,
}

impl StatisticalSender {
    pub fn new(
        listener: Arc<dyn RemoteListener>,
        batch: &BatchSettings,
        settings: &StatisticalSettings,
        ctx: HostContext,
    ) -> Self {
        let trigger = FlushTrigger::from_settings(batch);
        tracing::info!(
            hostname = ctx.hostname(),
            num_threshold = ?trigger.count(),
            time_threshold_ms = ?trigger.period().map(|p| p.as_millis()),
            key_on_thread_name = settings.key_on_thread_name,
            "Using statistical sample sender"
        );

        Self {
            listener,
            ctx,
            key_on_thread_name: settings.key_on_thread_name,
            state: Mutex::new(StatisticalState {
                table: AggregationTable::new(),
                sample_count: 0,
                trigger,
            }),
        }
    }

    /// Distinct keys and raw samples accumulated since the last flush.
    pub async fn pending(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.table.len(), state.sample_count)
    }

    async fn flush(&self, state: &mut StatisticalState) -> CoreResult<()> {
        let raw = state.sample_count;
        state.sample_count = 0;
        let events: Vec<SampleEvent> = state
            .table
            .drain()
            .into_iter()
            .map(|aggregate| aggregate.into_event(&self.ctx))
            .collect();
        if events.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            aggregates = events.len(),
            samples = raw,
            "Flushing aggregated samples"
        );
        absorb_transport_error(self.listener.process_batch(events).await, "process_batch")
    }
}

#[async_trait]
impl SampleSender for StatisticalSender {
    fn name(&self) -> &str {
        "Statistical"
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        let key = AggregateResult::key_for(&event, self.key_on_thread_name);

        let mut state = self.state.lock().await;
        if state.table.merge(key, &event) {
            tracing::trace!(label = %event.result().label, "New aggregation key");
        }
        state.sample_count += 1;

        let now = Instant::now();
        let buffered = state.sample_count;
        if !state.trigger.should_flush(buffered, now) {
            return Ok(());
        }

        state.trigger.flushed(now);
        self.flush(&mut state).await
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        {
            let mut state = self.state.lock().await;
            self.flush(&mut state).await?;
        }

        absorb_transport_error(self.listener.test_ended(host).await, "test_ended")?;
        tracing::info!(host = host.unwrap_or(self.ctx.hostname()), "Test ended");
        Ok(())
    }
}
