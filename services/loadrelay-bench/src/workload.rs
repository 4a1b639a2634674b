//! Synthetic sample producer

use chrono::Utc;
use loadrelay_core::{CoreResult, HostContext, SampleEvent, SampleResult};
use loadrelay_sender::SampleSender;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct Workload {
    pub samples: usize,
    pub failure_rate: f64,
    pub payload_bytes: usize,
    pub labels: usize,
    pub seed: u64,
}

impl Workload {
    /// Produces `samples` events for one producer, stopping at the first error.
    pub async fn run(
        &self,
        producer: usize,
        sender: &dyn SampleSender,
        ctx: &HostContext,
    ) -> CoreResult<()> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(producer as u64));
        let thread_name = format!("Thread Group 1-{}", producer + 1);

        for i in 0..self.samples {
            let result = self.sample(&mut rng, &thread_name, i % self.labels);
            sender
                .sample_occurred(SampleEvent::new(result, "Thread Group 1", ctx))
                .await?;

            if i % 1_000 == 999 {
                tokio::task::yield_now().await;
            }
        }

        tracing::debug!(producer, samples = self.samples, "Producer finished");
        Ok(())
    }

    fn sample(&self, rng: &mut StdRng, thread_name: &str, label: usize) -> SampleResult {
        let success = !rng.gen_bool(self.failure_rate);
        let elapsed: i64 = rng.gen_range(5..250);
        let end = Utc::now().timestamp_millis();

        let mut result = SampleResult::new(format!("request-{label}"))
            .with_success(success)
            .with_thread_name(thread_name)
            .with_response_code(if success { "200" } else { "500" })
            .with_response_data(vec![b'x'; self.payload_bytes])
            .with_bytes(self.payload_bytes as u64)
            .with_timing(end - elapsed, end, 0);
        result.latency = elapsed / 2;
        result.set_encoding_and_type(Some("text/html; charset=UTF-8"));
        result
    }
}
