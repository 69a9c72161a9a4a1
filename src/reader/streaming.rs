// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Reader over a blocking byte source, filled by a background thread

use super::ReaderInterface;
use crate::Error;
use std::{
    collections::VecDeque,
    io::Read,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Lifecycle of a [`StreamingReader`]'s download
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    /// Producer is still fetching data
    Downloading,

    /// Source was read to its end
    Finished,

    /// Source failed, timed out or was aborted
    Failed,
}

/// Configuration of a [`StreamingReader`]
#[derive(Clone, Debug)]
pub struct StreamingReaderConfig {
    /// Size of each buffer handed from producer to consumer
    pub(crate) buffer_size: usize,

    /// Number of buffers in the pool
    pub(crate) buffer_pool_size: usize,

    /// Maximum time until the first byte arrives
    pub(crate) connection_timeout: Duration,

    /// Maximum time for the whole download
    pub(crate) overall_timeout: Option<Duration>,
}

impl Default for StreamingReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1_024,
            buffer_pool_size: 8,
            connection_timeout: Duration::from_secs(10),
            overall_timeout: None,
        }
    }
}

impl StreamingReaderConfig {
    /// Sets the size of each download buffer.
    ///
    /// Default = 64 KiB
    #[must_use]
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.max(1);
        self
    }

    /// Sets how many buffers may be in flight between producer and consumer.
    ///
    /// Default = 8
    #[must_use]
    pub fn buffer_pool_size(mut self, n: usize) -> Self {
        self.buffer_pool_size = n.max(2);
        self
    }

    /// Sets the maximum time until the first byte arrives.
    ///
    /// Default = 10 seconds
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the maximum time for the whole download.
    ///
    /// Default = no limit
    #[must_use]
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }
}

struct Pool {
    /// Buffers holding data, in download order
    filled: VecDeque<Vec<u8>>,

    /// Buffers the producer may fill
    free: Vec<Vec<u8>>,

    state: StreamState,
    error: Option<String>,
}

struct Shared {
    pool: Mutex<Pool>,

    /// Signaled when a buffer was returned to `free`
    buffer_freed: Condvar,

    /// Signaled when a buffer was pushed to `filled`, or the state changed
    buffer_filled: Condvar,

    abort: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pool> {
        // NOTE: Neither side panics while holding the lock
        self.pool
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn finish(&self, state: StreamState, error: Option<String>) {
        let mut pool = self.lock();
        if pool.state == StreamState::Downloading {
            pool.state = state;
            pool.error = error;
        }
        drop(pool);
        self.buffer_filled.notify_all();
    }
}

/// Reader over a blocking byte source that is drained by a background thread
///
/// The producer thread downloads into a bounded pool of fixed-size buffers,
/// the consumer-facing [`ReaderInterface`] blocks until data is available,
/// the source is exhausted, or a timeout elapses.
#[allow(clippy::module_name_repetitions)]
pub struct StreamingReader {
    shared: Arc<Shared>,
    config: StreamingReaderConfig,

    current: Vec<u8>,
    current_pos: usize,

    /// Whether `current` was taken from the pool
    holds_buffer: bool,

    pos: u64,
    started_at: Instant,
    received_any: bool,

    producer: Option<JoinHandle<()>>,
}

impl StreamingReader {
    /// Spawns the producer thread, which calls `connect` and then drains the
    /// returned source.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the thread can't be spawned.
    pub fn spawn<F, S>(connect: F, config: StreamingReaderConfig) -> crate::Result<Self>
    where
        F: FnOnce() -> std::io::Result<S> + Send + 'static,
        S: Read,
    {
        let shared = Arc::new(Shared {
            pool: Mutex::new(Pool {
                filled: VecDeque::with_capacity(config.buffer_pool_size),
                free: (0..config.buffer_pool_size).map(|_| Vec::new()).collect(),
                state: StreamState::Downloading,
                error: None,
            }),
            buffer_freed: Condvar::new(),
            buffer_filled: Condvar::new(),
            abort: AtomicBool::new(false),
        });

        let producer = {
            let shared = shared.clone();
            let buffer_size = config.buffer_size;

            std::thread::Builder::new()
                .name("log-archive-stream".into())
                .spawn(move || produce(&shared, connect, buffer_size))?
        };

        Ok(Self {
            shared,
            config,
            current: Vec::new(),
            current_pos: 0,
            holds_buffer: false,
            pos: 0,
            started_at: Instant::now(),
            received_any: false,
            producer: Some(producer),
        })
    }

    /// Returns the download state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.shared.lock().state
    }

    /// Asks the producer to stop; all further reads fail.
    pub fn abort(&self) {
        self.shared.abort.store(true, Ordering::Release);
        self.shared
            .finish(StreamState::Failed, Some("aborted".into()));
        self.shared.buffer_freed.notify_all();
    }

    fn deadline(&self) -> Option<Instant> {
        let overall = self
            .config
            .overall_timeout
            .map(|timeout| self.started_at + timeout);

        if self.received_any {
            overall
        } else {
            let connection = self.started_at + self.config.connection_timeout;
            Some(overall.map_or(connection, |overall| overall.min(connection)))
        }
    }

    /// Swaps in the next filled buffer, blocking until one is ready.
    ///
    /// Returns `false` at the end of the stream.
    fn next_buffer(&mut self) -> crate::Result<bool> {
        let deadline = self.deadline();
        let mut pool = self.shared.lock();

        // Hand the consumed buffer back to the producer
        if self.holds_buffer {
            pool.free.push(std::mem::take(&mut self.current));
            self.holds_buffer = false;
            self.shared.buffer_freed.notify_one();
        }
        self.current_pos = 0;

        loop {
            if let Some(buffer) = pool.filled.pop_front() {
                self.current = buffer;
                self.holds_buffer = true;
                self.received_any = true;
                return Ok(true);
            }

            match pool.state {
                StreamState::Finished => return Ok(false),
                StreamState::Failed => {
                    return Err(Error::Failure(
                        pool.error.clone().unwrap_or_else(|| "stream failed".into()),
                    ));
                }
                StreamState::Downloading => {}
            }

            pool = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        drop(pool);
                        log::warn!("Streaming reader timed out after {:?}", now - self.started_at);
                        self.shared.abort.store(true, Ordering::Release);
                        self.shared
                            .finish(StreamState::Failed, Some("timed out".into()));
                        self.shared.buffer_freed.notify_all();
                        return Err(Error::Timeout);
                    }

                    self.shared
                        .buffer_filled
                        .wait_timeout(pool, deadline - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .0
                }
                None => self
                    .shared
                    .buffer_filled
                    .wait(pool)
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
            };
        }
    }
}

fn produce<F, S>(shared: &Shared, connect: F, buffer_size: usize)
where
    F: FnOnce() -> std::io::Result<S>,
    S: Read,
{
    let mut source = match connect() {
        Ok(source) => source,
        Err(e) => {
            log::debug!("Streaming source failed to connect: {e}");
            shared.finish(StreamState::Failed, Some(e.to_string()));
            return;
        }
    };

    loop {
        let mut buffer = {
            let mut pool = shared.lock();

            loop {
                if shared.abort.load(Ordering::Acquire) {
                    return;
                }
                if let Some(buffer) = pool.free.pop() {
                    break buffer;
                }
                pool = shared
                    .buffer_freed
                    .wait(pool)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
            }
        };

        buffer.clear();
        buffer.resize(buffer_size, 0);

        let mut filled = 0;
        let mut eof = false;

        while filled < buffer_size {
            if shared.abort.load(Ordering::Acquire) {
                return;
            }

            match source.read(buffer.get_mut(filled..).unwrap_or_default()) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    shared.finish(StreamState::Failed, Some(e.to_string()));
                    return;
                }
            }
        }

        buffer.truncate(filled);

        {
            let mut pool = shared.lock();
            if buffer.is_empty() {
                pool.free.push(buffer);
            } else {
                pool.filled.push_back(buffer);
            }
        }
        shared.buffer_filled.notify_one();

        if eof {
            shared.finish(StreamState::Finished, None);
            return;
        }
    }
}

impl Drop for StreamingReader {
    fn drop(&mut self) {
        self.shared.abort.store(true, Ordering::Release);
        self.shared.buffer_freed.notify_all();

        if let Some(producer) = self.producer.take() {
            // NOTE: Only join if the producer is done, it may be stuck in a blocking read
            if producer.is_finished() {
                let _ = producer.join();
            }
        }
    }
}

impl ReaderInterface for StreamingReader {
    fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current_pos >= self.current.len() {
            if !self.next_buffer()? {
                return Err(Error::EndOfFile);
            }
        }

        let available = self.current.get(self.current_pos..).unwrap_or_default();
        let n = available.len().min(buf.len());

        if let (Some(dst), Some(src)) = (buf.get_mut(..n), available.get(..n)) {
            dst.copy_from_slice(src);
        }

        self.current_pos += n;
        self.pos += n as u64;
        Ok(n)
    }

    fn try_seek_from_begin(&mut self, pos: u64) -> crate::Result<()> {
        if pos < self.pos {
            return Err(Error::Unsupported);
        }

        let mut scratch = [0u8; 4_096];

        while self.pos < pos {
            #[allow(clippy::cast_possible_truncation)]
            let chunk = ((pos - self.pos) as usize).min(scratch.len());

            match self.try_read(scratch.get_mut(..chunk).unwrap_or_default()) {
                Ok(_) => {}
                Err(Error::EndOfFile) => return Err(Error::Truncated),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn try_get_pos(&mut self) -> crate::Result<u64> {
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::buffered::BufferedReader;
    use test_log::test;

    #[test]
    fn streaming_reader_reads_everything() -> crate::Result<()> {
        let data: Vec<u8> = (0..100_000u32).flat_map(u32::to_be_bytes).collect();
        let expected = data.clone();

        let mut reader = StreamingReader::spawn(
            move || Ok(std::io::Cursor::new(data)),
            StreamingReaderConfig::default()
                .buffer_size(1_000)
                .buffer_pool_size(3),
        )?;

        let mut out = vec![0; expected.len()];
        reader.try_read_exact(&mut out)?;
        assert_eq!(expected, out);

        let mut buf = [0; 1];
        assert!(matches!(reader.try_read(&mut buf), Err(Error::EndOfFile)));
        assert_eq!(StreamState::Finished, reader.state());

        Ok(())
    }

    #[test]
    fn streaming_reader_pool_size_is_stable() -> crate::Result<()> {
        let data = vec![7; 10_000];

        let mut reader = StreamingReader::spawn(
            move || Ok(std::io::Cursor::new(data)),
            StreamingReaderConfig::default()
                .buffer_size(100)
                .buffer_pool_size(3),
        )?;

        let mut buf = [0; 64];
        while reader.try_read(&mut buf).is_ok() {}

        for _ in 0..3 {
            assert!(matches!(reader.try_read(&mut buf), Err(Error::EndOfFile)));
        }

        let pool = reader.shared.lock();
        assert_eq!(StreamState::Finished, pool.state);
        assert_eq!(3, pool.free.len() + pool.filled.len());

        Ok(())
    }

    #[test]
    fn streaming_reader_connect_failure() -> crate::Result<()> {
        let mut reader = StreamingReader::spawn(
            || -> std::io::Result<std::io::Empty> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "refused"))
            },
            StreamingReaderConfig::default(),
        )?;

        let mut buf = [0; 8];
        assert!(matches!(reader.try_read(&mut buf), Err(Error::Failure(_))));
        assert_eq!(StreamState::Failed, reader.state());

        Ok(())
    }

    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(0)
        }
    }

    #[test]
    fn streaming_reader_connection_timeout() -> crate::Result<()> {
        let mut reader = StreamingReader::spawn(
            || Ok(Stalled),
            StreamingReaderConfig::default().connection_timeout(Duration::from_millis(20)),
        )?;

        let mut buf = [0; 8];
        assert!(matches!(reader.try_read(&mut buf), Err(Error::Timeout)));
        assert_eq!(StreamState::Failed, reader.state());

        Ok(())
    }

    #[test]
    fn streaming_reader_with_checkpoint() -> crate::Result<()> {
        let text = "first line\nsecond line\nthird line\n".repeat(100);
        let bytes = text.clone().into_bytes();

        let reader = StreamingReader::spawn(
            move || Ok(std::io::Cursor::new(bytes)),
            StreamingReaderConfig::default().buffer_size(7),
        )?;
        let mut reader = BufferedReader::new(reader)?;

        let mut line = vec![];
        reader.try_read_to_delimiter(b'\n', false, false, &mut line)?;
        assert_eq!(b"first line", &line[..]);

        let checkpoint = reader.set_checkpoint();
        reader.try_read_to_delimiter(b'\n', false, false, &mut line)?;
        assert_eq!(b"second line", &line[..]);

        reader.try_seek_from_begin(checkpoint)?;
        reader.try_read_to_delimiter(b'\n', false, false, &mut line)?;
        assert_eq!(b"second line", &line[..]);

        Ok(())
    }
}
