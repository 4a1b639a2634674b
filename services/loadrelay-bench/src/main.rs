use clap::Parser;
use loadrelay_core::telemetry::{init_tracing, DEFAULT_DIRECTIVE};
use loadrelay_core::{HostContext, RemoteListener, SenderSettings};
use loadrelay_sender::{SampleSender, SenderFactory};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

mod listener;
mod workload;

use listener::CountingListener;
use workload::Workload;

#[derive(Parser, Debug)]
#[command(name = "loadrelay-bench")]
#[command(about = "Drive a sample sender with synthetic producers", long_about = None)]
#[command(version)]
struct Cli {
    /// Sender mode, overrides the configured one
    #[arg(long)]
    mode: Option<String>,

    /// Configuration file; the layered sources are used when absent
    #[arg(long, env = "LOADRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Number of concurrent producers
    #[arg(long, default_value = "8")]
    producers: usize,

    /// Samples generated by each producer
    #[arg(long, default_value = "10000")]
    samples: usize,

    /// Share of samples marked as failed, between 0 and 1
    #[arg(long, default_value = "0.02")]
    failure_rate: f64,

    /// Response payload size in bytes
    #[arg(long, default_value = "512")]
    payload_bytes: usize,

    /// Distinct sample labels per producer
    #[arg(long, default_value = "5")]
    labels: usize,

    /// RNG seed for reproducible runs
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(DEFAULT_DIRECTIVE)?;

    let args = Cli::parse();
    if !(0.0..=1.0).contains(&args.failure_rate) {
        return Err(format!("failure rate must be within [0, 1], got {}", args.failure_rate).into());
    }

    let mut settings = match &args.config {
        Some(path) => SenderSettings::from_file(path)?,
        None => SenderSettings::load()?,
    };
    if let Some(mode) = &args.mode {
        settings.mode = mode.clone();
        settings.hold_samples = false;
    }

    let ctx = HostContext::resolve();
    let counting = Arc::new(CountingListener::new());
    let listener: Arc<dyn RemoteListener> = counting.clone();

    let sender = Arc::new(SenderFactory::new(settings, ctx.clone()).create(Arc::clone(&listener))?);
    info!(
        mode = sender.name(),
        producers = args.producers,
        samples = args.samples,
        "Starting bench run"
    );

    let workload = Workload {
        samples: args.samples,
        failure_rate: args.failure_rate,
        payload_bytes: args.payload_bytes,
        labels: args.labels.max(1),
        seed: args.seed,
    };

    listener.test_started(Some(ctx.hostname())).await?;
    let started = Instant::now();

    let mut handles = Vec::with_capacity(args.producers);
    for producer in 0..args.producers {
        let sender = Arc::clone(&sender);
        let ctx = ctx.clone();
        let workload = workload.clone();
        handles.push(tokio::spawn(async move {
            workload.run(producer, &**sender, &ctx).await
        }));
    }
    for handle in handles {
        handle.await??;
    }
    let produced_in = started.elapsed();

    sender.test_ended(Some(ctx.hostname())).await?;
    let total = started.elapsed();

    let stats = counting.snapshot();
    let generated = args.producers * args.samples;
    let throughput = generated as f64 / total.as_secs_f64().max(f64::EPSILON);

    println!("mode:              {}", sender.name());
    println!("generated:         {generated}");
    println!("delivered events:  {}", stats.events);
    println!("represented:       {}", stats.represented);
    println!("remote calls:      {}", stats.calls);
    println!("end signals:       {}", counting.ended());
    println!("payload bytes:     {}", stats.payload_bytes);
    println!("production time:   {:.3}s", produced_in.as_secs_f64());
    println!("total time:        {:.3}s", total.as_secs_f64());
    println!("throughput:        {throughput:.0} samples/s");

    info!(
        delivered = stats.events,
        represented = stats.represented,
        calls = stats.calls,
        "Bench run finished"
    );
    Ok(())
}
