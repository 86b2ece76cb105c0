//! WAL file operations
//!
//! Append-only log of [`Intent`] frames. Durability modes mirror the
//! teacher's: `Strict` fsyncs every append, `Batched` (default) fsyncs by
//! count or time, `Async` defers to a background thread. See spec §4.1.

use crate::framing::{decode_frame, encode_frame, FrameError};
use crate::intent::Intent;
use entitydb_core::Error;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const INTENT_FRAME_TYPE: u8 = 1;

/// Controls when `fsync` is called on WAL appends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurabilityMode {
    /// fsync after every append. Slowest, safest.
    Strict,
    /// fsync every `batch_size` appends or every `interval_ms`, whichever
    /// comes first.
    Batched {
        /// Max milliseconds between fsyncs.
        interval_ms: u64,
        /// Max appends between fsyncs.
        batch_size: usize,
    },
    /// A background thread fsyncs every `interval_ms`; appends only flush
    /// to the OS buffer.
    Async {
        /// Milliseconds between background fsyncs.
        interval_ms: u64,
    },
}

impl Default for DurabilityMode {
    fn default() -> Self {
        DurabilityMode::Batched {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

/// The write-ahead log.
pub struct Wal {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
    current_offset: Arc<AtomicU64>,
    durability_mode: DurabilityMode,
    last_fsync: Arc<Mutex<Instant>>,
    writes_since_fsync: Arc<AtomicU64>,
    fsync_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, durability_mode: DurabilityMode) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let current_offset = Arc::new(AtomicU64::new(file.metadata()?.len()));
        let writer = Arc::new(Mutex::new(BufWriter::new(file)));
        let last_fsync = Arc::new(Mutex::new(Instant::now()));
        let writes_since_fsync = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let fsync_thread = if let DurabilityMode::Async { interval_ms } = durability_mode {
            let writer = Arc::clone(&writer);
            let shutdown = Arc::clone(&shutdown);
            let interval = Duration::from_millis(interval_ms);
            Some(thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Ok(mut w) = writer.lock() {
                        let _ = w.flush();
                        let _ = w.get_mut().sync_all();
                    }
                }
            }))
        } else {
            None
        };

        Ok(Wal {
            path,
            writer,
            current_offset,
            durability_mode,
            last_fsync,
            writes_since_fsync,
            fsync_thread,
            shutdown,
        })
    }

    /// Append an intent, applying the configured durability mode.
    pub fn append(&mut self, intent: &Intent) -> Result<u64, Error> {
        let offset = self.current_offset.load(Ordering::SeqCst);
        let encoded = encode_frame(INTENT_FRAME_TYPE, intent)?;
        {
            let mut writer = self.writer.lock().unwrap();
            writer.write_all(&encoded)?;
        }
        self.current_offset
            .fetch_add(encoded.len() as u64, Ordering::SeqCst);

        match self.durability_mode {
            DurabilityMode::Strict => self.fsync()?,
            DurabilityMode::Batched {
                interval_ms,
                batch_size,
            } => {
                self.writes_since_fsync.fetch_add(1, Ordering::SeqCst);
                let should_fsync = {
                    let last = self.last_fsync.lock().unwrap();
                    last.elapsed().as_millis() as u64 >= interval_ms
                        || self.writes_since_fsync.load(Ordering::SeqCst) >= batch_size as u64
                };
                if should_fsync {
                    self.fsync()?;
                    self.writes_since_fsync.store(0, Ordering::SeqCst);
                    *self.last_fsync.lock().unwrap() = Instant::now();
                }
            }
            DurabilityMode::Async { .. } => {
                let mut writer = self.writer.lock().unwrap();
                writer.flush()?;
            }
        }
        Ok(offset)
    }

    /// Flush buffered writes to the OS (not necessarily to disk).
    pub fn flush(&mut self) -> Result<(), Error> {
        let mut writer = self.writer.lock().unwrap();
        writer.flush()?;
        Ok(())
    }

    /// Flush and fsync to disk.
    pub fn fsync(&self) -> Result<(), Error> {
        let mut writer = self.writer.lock().unwrap();
        writer.flush()?;
        writer.get_mut().sync_all()?;
        Ok(())
    }

    /// Read every intent from the start of the WAL, stopping cleanly at the
    /// first incomplete trailing frame (a partial write) and erroring on
    /// genuine corruption (bad CRC, bad length).
    pub fn read_all(&self) -> Result<Vec<Intent>, Error> {
        {
            let mut writer = self.writer.lock().unwrap();
            writer.flush()?;
        }
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;

        let mut intents = Vec::new();
        let mut buf = Vec::new();
        let mut read_buf = vec![0u8; 64 * 1024];

        loop {
            let n = reader.read(&mut read_buf)?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&read_buf[..n]);

            let mut pos = 0;
            loop {
                match decode_frame(&buf[pos..]) {
                    Ok((_, payload, consumed)) => {
                        let intent: Intent = bincode::deserialize(payload)
                            .map_err(|e| Error::Corrupted(format!("WAL intent decode: {e}")))?;
                        intents.push(intent);
                        pos += consumed;
                    }
                    Err(FrameError::Incomplete) => break,
                    Err(FrameError::Corrupt(msg)) => {
                        return Err(Error::Corrupted(format!("WAL corrupt at offset {pos}: {msg}")))
                    }
                }
            }
            buf.drain(..pos);
        }
        Ok(intents)
    }

    /// Truncate the WAL to empty. Called after a successful checkpoint or
    /// after recovery has replayed every outstanding intent (spec §4.9:
    /// `applied -> truncated`).
    pub fn truncate(&mut self) -> Result<(), Error> {
        let file = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
        *self.writer.lock().unwrap() = BufWriter::new(file);
        self.current_offset.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Current size in bytes.
    pub fn size(&self) -> u64 {
        self.current_offset.load(Ordering::SeqCst)
    }

    /// Path to the WAL file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.fsync_thread.take() {
            let _ = handle.join();
        }
        let _ = self.fsync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentBody;
    use entitydb_core::EntityId;
    use tempfile::TempDir;

    fn sample_intent(lsn: u64) -> Intent {
        Intent {
            lsn,
            body: IntentBody::Write {
                id: EntityId::from("e1"),
                new_tags: vec![],
                content: None,
            },
        }
    }

    #[test]
    fn append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut wal = Wal::open(dir.path().join("wal"), DurabilityMode::default()).unwrap();
        wal.append(&sample_intent(1)).unwrap();
        wal.append(&sample_intent(2)).unwrap();
        wal.flush().unwrap();

        let entries = wal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].lsn, 1);
        assert_eq!(entries[1].lsn, 2);
    }

    #[test]
    fn truncate_empties_the_log() {
        let dir = TempDir::new().unwrap();
        let mut wal = Wal::open(dir.path().join("wal"), DurabilityMode::default()).unwrap();
        wal.append(&sample_intent(1)).unwrap();
        wal.flush().unwrap();
        wal.truncate().unwrap();
        assert_eq!(wal.size(), 0);
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn reopen_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal");
        {
            let mut wal = Wal::open(&path, DurabilityMode::Strict).unwrap();
            wal.append(&sample_intent(1)).unwrap();
        }
        let wal = Wal::open(&path, DurabilityMode::Strict).unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 1);
    }
}
