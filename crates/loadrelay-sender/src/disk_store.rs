//! Disk store sender: spill every sample to a temporary file, replay at test end
//!
//! A single writer task owns the spill file and appends one JSON document per
//! line, in the order samples were handed over. Producers never wait on the
//! controller or on disk. At test end the file is closed, replayed line by
//! line through the listener and deleted.

use async_trait::async_trait;
use loadrelay_core::{
    CoreError, CoreResult, DiskStoreSettings, HostContext, RemoteListener, SampleEvent,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::sender::{absorb_transport_error, SampleSender};

const SPILL_PREFIX: &str = "loadrelay-spill-";
const SPILL_SUFFIX: &str = ".jsonl";

/// Destination of spilled records, owned by the writer task.
#[async_trait]
pub(crate) trait SpillSink: Send {
    /// Appends one complete record line.
    async fn append(&mut self, line: &[u8]) -> std::io::Result<()>;

    /// Makes everything appended so far durable.
    async fn finish(&mut self) -> std::io::Result<()>;
}

/// Buffered spill file.
pub(crate) struct FileSink(BufWriter<File>);

#[async_trait]
impl SpillSink for FileSink {
    async fn append(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.0.write_all(line).await
    }

    async fn finish(&mut self) -> std::io::Result<()> {
        self.0.flush().await?;
        self.0.get_mut().sync_all().await
    }
}

enum WriterCommand {
    Write(SampleEvent),
    /// Flush and stop; acknowledged with the number of records written.
    Close(oneshot::Sender<CoreResult<u64>>),
}

pub struct DiskStoreSender {
    listener: Arc<dyn RemoteListener>,
    ctx: HostContext,
    close_timeout: Duration,
    path: PathBuf,
    tx: Mutex<Option<mpsc::UnboundedSender<WriterCommand>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    /// Deletes the spill file when closed or dropped.
    spill: Mutex<Option<TempPath>>,
}

impl DiskStoreSender {
    /// Creates the spill file and starts its writer.
    ///
    /// # Errors
    /// `CoreError::Resource` when the file cannot be created or no tokio
    /// runtime is available for the writer.
    pub fn new(
        listener: Arc<dyn RemoteListener>,
        settings: &DiskStoreSettings,
        ctx: HostContext,
    ) -> CoreResult<Self> {
        Self::with_sink(listener, settings, ctx, |sink| Box::new(sink))
    }

    /// Like `new`, with the spill file sink wrapped by `wrap`.
    pub(crate) fn with_sink<F>(
        listener: Arc<dyn RemoteListener>,
        settings: &DiskStoreSettings,
        ctx: HostContext,
        wrap: F,
    ) -> CoreResult<Self>
    where
        F: FnOnce(FileSink) -> Box<dyn SpillSink>,
    {
        let handle = Handle::try_current()
            .map_err(|e| CoreError::Resource(format!("cannot start spill writer: {e}")))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix(SPILL_PREFIX).suffix(SPILL_SUFFIX);
        let spill = match &settings.spill_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| CoreError::Resource(format!("cannot create spill file: {e}")))?;

        let (file, temp_path) = spill.into_parts();
        let path = temp_path.to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = wrap(FileSink(BufWriter::new(File::from_std(file))));
        let writer = handle.spawn(run_writer(rx, sink));

        tracing::info!(
            hostname = ctx.hostname(),
            path = %path.display(),
            "Using disk store sample sender"
        );

        Ok(Self {
            listener,
            ctx,
            close_timeout: settings.close_timeout(),
            path,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            spill: Mutex::new(Some(temp_path)),
        })
    }

    /// Location of the spill file. The file no longer exists after `test_ended`.
    pub fn spill_path(&self) -> &Path {
        &self.path
    }

    fn enqueue(&self, event: SampleEvent) -> CoreResult<()> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(CoreError::invalid_state("sample received after test end"));
        };
        tx.send(WriterCommand::Write(event))
            .map_err(|_| CoreError::internal("spill writer stopped"))
    }

    /// Asks the writer to flush and stop, waiting at most `close_timeout`.
    /// A writer that misses the deadline is aborted.
    async fn close_writer(&self, tx: mpsc::UnboundedSender<WriterCommand>) {
        let writer = self.writer.lock().take();
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(WriterCommand::Close(ack_tx)).is_err() {
            tracing::error!("Spill writer already stopped, replaying what reached disk");
            return;
        }
        drop(tx);

        match tokio::time::timeout(self.close_timeout, ack_rx).await {
            Ok(Ok(Ok(written))) => tracing::debug!(records = written, "Spill file closed"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Failed to flush spill file"),
            Ok(Err(_)) => tracing::error!("Spill writer stopped without acknowledging close"),
            Err(_) => {
                let err = CoreError::ShutdownTimeout {
                    what: "spill file close",
                    timeout_ms: u64::try_from(self.close_timeout.as_millis()).unwrap_or(u64::MAX),
                };
                tracing::error!(error = %err, "Replaying spill file anyway");
                if let Some(writer) = writer {
                    writer.abort();
                }
            }
        }
    }
}

async fn run_writer(mut rx: mpsc::UnboundedReceiver<WriterCommand>, mut out: Box<dyn SpillSink>) {
    let mut written = 0u64;

    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Write(event) => match write_record(out.as_mut(), &event).await {
                Ok(()) => written += 1,
                Err(e) => tracing::error!(
                    error = %e,
                    label = %event.result().label,
                    "Failed to spill sample, dropping it"
                ),
            },
            WriterCommand::Close(ack) => {
                let result = out.finish().await.map(|()| written).map_err(CoreError::from);
                let _ = ack.send(result);
                return;
            }
        }
    }

    // Sender dropped without closing.
    if let Err(e) = out.finish().await {
        tracing::warn!(error = %e, "Failed to flush abandoned spill file");
    }
}

async fn write_record(out: &mut dyn SpillSink, event: &SampleEvent) -> CoreResult<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    out.append(&line).await?;
    Ok(())
}

/// Replays a spill file through the listener in write order.
///
/// Returns the number of records delivered. A record that cannot be read or
/// parsed ends the replay; everything after it is lost.
pub async fn replay_file(listener: &dyn RemoteListener, path: &Path) -> CoreResult<u64> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut delivered = 0u64;
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(line = line_no + 1, error = %e, "Unreadable spill record, replay truncated");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event: SampleEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(line = line_no, error = %e, "Corrupt spill record, replay truncated");
                break;
            }
        };
        absorb_transport_error(listener.sample_occurred(event).await, "sample_occurred")?;
        delivered += 1;
    }

    Ok(delivered)
}

#[async_trait]
impl SampleSender for DiskStoreSender {
    fn name(&self) -> &str {
        "DiskStore"
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        self.enqueue(event)
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        let tx = self.tx.lock().take();
        let Some(tx) = tx else {
            return Err(CoreError::invalid_state("test_ended called twice"));
        };
        self.close_writer(tx).await;

        let spill = self.spill.lock().take();
        let replayed = match &spill {
            Some(path) => replay_file(self.listener.as_ref(), path).await,
            None => Ok(0),
        };

        if let Some(path) = spill {
            if let Err(e) = path.close() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete spill file");
            }
        }
        let replayed = replayed?;

        absorb_transport_error(self.listener.test_ended(host).await, "test_ended")?;
        tracing::info!(
            host = host.unwrap_or(self.ctx.hostname()),
            samples = replayed,
            "Test ended, spilled samples replayed"
        );
        Ok(())
    }
}
