use bytes::BytesMut;
use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::codec::FrameCodec;
use crate::frame::{self, Frame};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("failed to open append-only file {path:?}")]
    Open { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("corrupt append-only file: {0}")]
    Corrupt(frame::Error),
    #[error("append-only file is closed")]
    Closed,
}

impl From<frame::Error> for Error {
    fn from(err: frame::Error) -> Self {
        match err {
            frame::Error::Io(err) => Error::Io(err),
            err => Error::Corrupt(err),
        }
    }
}

/// The append-only file: every accepted write command, in the order it was accepted, encoded
/// exactly as it travels on the wire. Replaying the file through the command dispatcher rebuilds
/// the keyspace after a restart.
///
/// Appends only hand the bytes to the OS. A background task forces them to stable storage every
/// sync interval, so appends never wait on the disk. Whatever was appended since the last sync
/// may be lost on power failure.
///
/// The handle is cheap to clone; the file is closed once the last clone is dropped.
#[derive(Clone)]
pub struct Aof {
    inner: Arc<InnerAof>,
}

struct InnerAof {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    /// Only changed while holding the file lock.
    closed: AtomicBool,
    syncer: JoinHandle<()>,
}

impl Drop for InnerAof {
    fn drop(&mut self) {
        self.syncer.abort();
    }
}

impl Aof {
    /// Opens the file at `path` for reading and appending, creating it if needed, and starts the
    /// periodic sync task. Must be called from within a tokio runtime.
    pub async fn open(path: impl AsRef<Path>, sync_interval: Duration) -> Result<Aof, Error> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;

        let file = Arc::new(Mutex::new(file));
        let syncer = tokio::spawn(sync_periodically(file.clone(), sync_interval));

        info!(path = %path.display(), ?sync_interval, "Opened append-only file");

        Ok(Aof {
            inner: Arc::new(InnerAof {
                path,
                file,
                closed: AtomicBool::new(false),
                syncer,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Appends the wire encoding of `frame` to the end of the file. Fails with [`Error::Closed`]
    /// once any clone of the handle was closed.
    pub async fn append(&self, frame: &Frame) -> Result<(), Error> {
        let bytes = frame.serialize();

        let mut file = self.inner.file.lock().await;
        if self.inner.closed.load(Ordering::Relaxed) {
            return Err(Error::Closed);
        }
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(())
    }

    /// Decodes every record from the start of the file and hands it to `f`, in order. Returns the
    /// number of records replayed.
    ///
    /// A record cut short at the very end of the file is what a crash in the middle of an append
    /// leaves behind: it is dropped and the file truncated to the last whole record, so later
    /// appends don't land after garbage. Anything else that fails to decode aborts the replay.
    pub async fn replay<F>(&self, mut f: F) -> Result<usize, Error>
    where
        F: FnMut(Frame),
    {
        let mut file = self.inner.file.lock().await;
        file.seek(SeekFrom::Start(0)).await?;

        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::with_capacity(8 * 1024);
        let mut read: u64 = 0;
        // End of the last whole record.
        let mut offset: u64 = 0;
        let mut count = 0;

        loop {
            while let Some(frame) = codec.decode(&mut buf)? {
                offset = read - buf.len() as u64;
                count += 1;
                f(frame);
            }

            let n = file.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
            read += n as u64;
        }

        let pending = codec.pending(&buf);
        if pending > 0 {
            warn!(
                path = %self.inner.path.display(),
                offset,
                discarded = pending,
                "Truncating incomplete record at the end of the append-only file"
            );
            file.set_len(offset).await?;
        }

        file.seek(SeekFrom::End(0)).await?;
        debug!(records = count, "Replayed append-only file");

        Ok(count)
    }

    /// Stops the sync task and forces everything appended so far to stable storage.
    ///
    /// Closing is shared by every clone: appends through clones still held elsewhere, such as by
    /// connections that are winding down, fail from here on instead of landing unsynced.
    pub async fn close(self) -> Result<(), Error> {
        self.inner.syncer.abort();

        let mut file = self.inner.file.lock().await;
        self.inner.closed.store(true, Ordering::Relaxed);
        file.flush().await?;
        file.sync_all().await?;

        info!(path = %self.inner.path.display(), "Closed append-only file");
        Ok(())
    }
}

async fn sync_periodically(file: Arc<Mutex<File>>, period: Duration) {
    let file = &file;
    every(period, move || async move { file.lock().await.sync_all().await }).await
}

/// Runs `tick` every `period` until the task is aborted. A failed tick is logged and the next one
/// still runs on schedule.
async fn every<F, Fut>(period: Duration, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    // `interval` panics on a zero period.
    let mut interval = time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        if let Err(err) = tick().await {
            warn!(%err, "Failed to sync append-only file");
        }
    }
}

#[cfg(test)]
impl Aof {
    fn syncer_finished(&self) -> bool {
        self.inner.syncer.is_finished()
    }

    fn file_handle(&self) -> std::sync::Weak<Mutex<File>> {
        Arc::downgrade(&self.inner.file)
    }
}
