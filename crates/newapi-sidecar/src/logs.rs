use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed-capacity FIFO of diagnostic lines. The oldest entry is evicted when
/// a push would exceed capacity.
#[derive(Clone, Debug)]
pub struct LogRingBuffer {
    entries: VecDeque<String>,
    capacity: usize,
}

impl LogRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

pub type SharedLogBuffer = Arc<Mutex<LogRingBuffer>>;

pub fn shared_buffer(capacity: usize) -> SharedLogBuffer {
    Arc::new(Mutex::new(LogRingBuffer::new(capacity)))
}

/// Bytes requested per read, and the most an unterminated line may hold
/// before it is pushed anyway.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// An unterminated line is pushed once the stream stays quiet this long.
const PARTIAL_LINE_FLUSH: Duration = Duration::from_millis(50);

pub struct CrashLogCollector;

impl CrashLogCollector {
    /// Streams stderr into `buffer` as it arrives and mirrors it to the host
    /// log. Complete lines become one entry each; text without a trailing
    /// newline is pushed after a short quiet period. The task ends at EOF.
    pub fn attach<R>(stderr: R, buffer: SharedLogBuffer) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(for_each_line(stderr, move |line| {
            warn!(target: "backend", "{}", line);
            buffer.lock().push(line);
        }))
    }

    /// Drains stdout so the pipe never fills; lines only go to the host log.
    pub fn mirror_stdout<R>(stdout: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(for_each_line(stdout, |line| {
            info!(target: "backend", "{}", line);
        }))
    }
}

async fn for_each_line<R, F>(mut stream: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let read = if pending.is_empty() {
            stream.read(&mut chunk).await
        } else {
            match tokio::time::timeout(PARTIAL_LINE_FLUSH, stream.read(&mut chunk)).await {
                Ok(read) => read,
                Err(_) => {
                    emit(&pending, &mut on_line);
                    pending.clear();
                    continue;
                }
            }
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    emit(&line, &mut on_line);
                }
                if pending.len() >= READ_CHUNK_SIZE {
                    emit(&pending, &mut on_line);
                    pending.clear();
                }
            }
            Err(e) => {
                debug!("Backend output stream closed: {}", e);
                break;
            }
        }
    }

    emit(&pending, &mut on_line);
}

fn emit<F: FnMut(&str)>(raw: &[u8], on_line: &mut F) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    if !line.is_empty() {
        on_line(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_eviction_keeps_last_hundred() {
        let mut buffer = LogRingBuffer::new(100);
        for i in 0..150 {
            buffer.push(format!("line {}", i));
            assert!(buffer.len() <= 100);
        }

        let entries = buffer.snapshot();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries.first().map(String::as_str), Some("line 50"));
        assert_eq!(entries.last().map(String::as_str), Some("line 149"));
    }

    #[test]
    fn test_tail() {
        let mut buffer = LogRingBuffer::new(10);
        for i in 0..5 {
            buffer.push(format!("{}", i));
        }
        assert_eq!(buffer.tail(2), vec!["3".to_string(), "4".to_string()]);
        assert_eq!(buffer.tail(20).len(), 5);
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut buffer = LogRingBuffer::new(0);
        buffer.push("dropped");
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_collector_streams_lines() {
        let buffer = shared_buffer(3);
        let input: &'static [u8] = b"first\r\n\nsecond\nthird\nfourth";

        CrashLogCollector::attach(input, buffer.clone()).await.unwrap();

        assert_eq!(
            buffer.lock().snapshot(),
            vec!["second".to_string(), "third".to_string(), "fourth".to_string()]
        );
    }

    #[tokio::test]
    async fn test_collector_tolerates_invalid_utf8() {
        let buffer = shared_buffer(10);
        let input: &'static [u8] = b"bad \xff byte\nok\n";

        CrashLogCollector::attach(input, buffer.clone()).await.unwrap();

        let entries = buffer.lock().snapshot();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("bad "));
        assert_eq!(entries[1], "ok");
    }

    #[tokio::test]
    async fn test_unterminated_output_is_pushed_while_stream_open() {
        let buffer = shared_buffer(10);
        let (mut writer, reader) = tokio::io::duplex(64);

        let collector = CrashLogCollector::attach(reader, buffer.clone());
        writer
            .write_all(b"listen tcp :3000: bind: address already in use")
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while buffer.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            buffer.lock().snapshot(),
            vec!["listen tcp :3000: bind: address already in use".to_string()]
        );

        drop(writer);
        collector.await.unwrap();
        assert_eq!(buffer.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_long_unterminated_line_is_capped() {
        let buffer = shared_buffer(10);
        let input = vec![b'x'; READ_CHUNK_SIZE * 2 + 10];

        CrashLogCollector::attach(std::io::Cursor::new(input), buffer.clone())
            .await
            .unwrap();

        let entries = buffer.lock().snapshot();
        assert!(entries.len() >= 2);
        assert!(entries.iter().all(|e| e.len() <= READ_CHUNK_SIZE * 2));
        assert_eq!(
            entries.iter().map(String::len).sum::<usize>(),
            READ_CHUNK_SIZE * 2 + 10
        );
    }

    proptest! {
        #[test]
        fn prop_length_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..256) {
            let mut buffer = LogRingBuffer::new(capacity);
            for i in 0..pushes {
                buffer.push(i.to_string());
                prop_assert!(buffer.len() <= capacity);
            }
            let expected_first = pushes.saturating_sub(capacity);
            let entries = buffer.snapshot();
            prop_assert_eq!(entries.len(), pushes.min(capacity));
            if let Some(first) = entries.first() {
                prop_assert_eq!(first, &expected_first.to_string());
            }
        }
    }
}
