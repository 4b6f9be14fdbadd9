//! Progress reporting for blob transfers
//!
//! [`ProgressSink`] is what transfers report bytes to. [`ProgressWriter`] wraps
//! a blob destination so that every byte written by the registry client is
//! counted, and [`TransferBar`] renders a sink as a terminal progress bar.

use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// Receiver of byte-level transfer progress
pub trait ProgressSink: Send + Sync {
    /// Start (or restart) tracking a transfer of `total` bytes
    fn init(&self, total: u64);
    fn incr_by(&self, n: u64);
    /// The transfer completed
    fn finish(&self);
    /// The transfer failed; leave the bar without marking it complete
    fn abort(&self);
}

impl<S: ProgressSink + ?Sized> ProgressSink for Arc<S> {
    fn init(&self, total: u64) {
        (**self).init(total)
    }

    fn incr_by(&self, n: u64) {
        (**self).incr_by(n)
    }

    fn finish(&self) {
        (**self).finish()
    }

    fn abort(&self) {
        (**self).abort()
    }
}

/// Terminal progress bar for downloads and uploads
#[derive(Debug, Clone)]
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(message.to_string());
        Self { bar }
    }
}

impl ProgressSink for TransferBar {
    fn init(&self, total: u64) {
        self.bar.reset();
        self.bar.set_length(total);
    }

    fn incr_by(&self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&self) {
        self.bar.finish();
    }

    fn abort(&self) {
        self.bar.abandon();
    }
}

/// `AsyncWrite` adapter reporting every written byte to a [`ProgressSink`]
pub struct ProgressWriter<W> {
    inner: W,
    sink: Arc<dyn ProgressSink>,
}

impl<W> ProgressWriter<W> {
    pub fn new(inner: W, sink: Arc<dyn ProgressSink>) -> Self {
        Self { inner, sink }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            self.sink.incr_by(*n as u64);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;

    /// Sink recording every call, for assertions
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<String>>,
        pub bytes: Mutex<u64>,
    }

    impl ProgressSink for RecordingSink {
        fn init(&self, total: u64) {
            self.events.lock().unwrap().push(format!("init:{}", total));
        }

        fn incr_by(&self, n: u64) {
            *self.bytes.lock().unwrap() += n;
        }

        fn finish(&self) {
            self.events.lock().unwrap().push("finish".to_string());
        }

        fn abort(&self) {
            self.events.lock().unwrap().push("abort".to_string());
        }
    }

    #[tokio::test]
    async fn test_progress_writer_counts_bytes() {
        let sink = Arc::new(RecordingSink::default());
        let mut out = Vec::new();
        let mut writer = ProgressWriter::new(&mut out, sink.clone());

        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"world").await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        assert_eq!(*sink.bytes.lock().unwrap(), 11);
        assert_eq!(out, b"hello world".to_vec());
    }

    #[test]
    fn test_transfer_bar_lifecycle() {
        let bar = TransferBar::new("test");
        bar.init(100);
        bar.incr_by(40);
        bar.incr_by(60);
        assert_eq!(bar.bar.position(), 100);
        bar.finish();
        assert!(bar.bar.is_finished());
    }
}
