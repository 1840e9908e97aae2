//! Adaptive stream pacing.
//!
//! [`paced_stream`] relays an upstream byte stream at a typing-like cadence.
//! Chunks that contain a newline are held back for a delay taken from
//! [`PacingCurve`]: short while many lines are buffered, long near the tail.
//! Chunks without a newline pass straight through, and a chunk whose trimmed
//! text repeats the previous emission is dropped.
//!
//! ## Task layout
//!
//! ```text
//! upstream ──next()──┐
//!                    v
//!           ┌────────────────┐  unbounded   ┌─────────────┐
//!           │  pacer worker  │ ───────────> │ PacedStream │ ──> consumer
//!           │ (PendingQueue) │    mpsc      └─────────────┘
//!           └────────────────┘
//! ```
//!
//! One tokio task per stream owns all pacing state. It `select!`s over
//! downstream closure, the next upstream chunk, and the single in-flight
//! pacing sleep, so upstream keeps being read while a chunk is waiting out
//! its delay. At most one chunk is ever in flight, which keeps output FIFO.

mod curve;
mod decode;
mod queue;

pub use curve::{FixedJitter, Jitter, PacingCurve, RandomJitter};
pub use decode::{Utf8StreamDecoder, count_newlines};
pub use queue::{DrainStep, PendingQueue};

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PacingConfig;

/// Lifecycle of a single paced stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    /// Upstream still open; chunks may be queued and emitting.
    DrainingUpstream,
    /// Upstream finished; emitting what is left in the queue.
    DrainingQueue,
    Closed,
    Errored,
    Cancelled,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::DrainingUpstream => write!(f, "draining-upstream"),
            LifecycleState::DrainingQueue => write!(f, "draining-queue"),
            LifecycleState::Closed => write!(f, "closed"),
            LifecycleState::Errored => write!(f, "errored"),
            LifecycleState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-stream counters, logged when the stream finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacingStats {
    pub received: usize,
    pub emitted: usize,
    pub suppressed: usize,
    pub dropped: usize,
    pub total_delay: Duration,
    pub state: LifecycleState,
}

/// Paced view of an upstream byte stream.
///
/// Yields the upstream chunks in order, minus adjacent duplicates, with
/// pacing delays applied. An upstream error is yielded once and ends the
/// stream. Dropping the stream or calling [`PacedStream::cancel`] stops the
/// worker.
#[derive(Debug)]
pub struct PacedStream<E> {
    rx: mpsc::UnboundedReceiver<Result<Bytes, E>>,
    cancelled: bool,
}

impl<E> PacedStream<E> {
    /// Stop emission and discard anything still queued. Safe to call more
    /// than once and after the stream has finished.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<E> Stream for PacedStream<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

/// Pace `upstream` with the default curve and random jitter.
///
/// Returns immediately; the pacing worker is spawned on the current tokio
/// runtime.
pub fn paced_stream<S, E>(upstream: S) -> PacedStream<E>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    paced_stream_with(upstream, &PacingConfig::default(), RandomJitter)
}

/// Pace `upstream` with an explicit configuration and jitter source.
pub fn paced_stream_with<S, E, J>(upstream: S, config: &PacingConfig, jitter: J) -> PacedStream<E>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
    J: Jitter + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let pacer = Pacer::new(PacingCurve::from(config), jitter);
    tokio::spawn(pacer.run(upstream, tx));
    PacedStream {
        rx,
        cancelled: false,
    }
}

/// Owns the pending queue for one stream and runs its drain loop.
struct Pacer<J> {
    queue: PendingQueue,
    curve: PacingCurve,
    jitter: J,
    stats: PacingStats,
}

impl<J: Jitter> Pacer<J> {
    fn new(curve: PacingCurve, jitter: J) -> Self {
        Self {
            queue: PendingQueue::new(),
            curve,
            jitter,
            stats: PacingStats::default(),
        }
    }

    async fn run<S, E>(
        mut self,
        upstream: S,
        tx: mpsc::UnboundedSender<Result<Bytes, E>>,
    ) -> PacingStats
    where
        S: Stream<Item = Result<Bytes, E>>,
    {
        let mut upstream = std::pin::pin!(upstream);
        let mut upstream_done = false;
        let mut in_flight: Option<Bytes> = None;
        let sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sleep);

        self.stats.state = LifecycleState::DrainingUpstream;

        loop {
            if in_flight.is_none() && !tx.is_closed() {
                in_flight = self.drain_until_paced(&tx, sleep.as_mut());
            }

            if upstream_done && in_flight.is_none() && self.queue.is_empty() {
                return self.finish(LifecycleState::Closed);
            }

            tokio::select! {
                biased;

                _ = tx.closed() => {
                    let dropped = self.queue.clear() + usize::from(in_flight.take().is_some());
                    self.stats.dropped += dropped;
                    return self.finish(LifecycleState::Cancelled);
                }

                () = &mut sleep, if in_flight.is_some() => {
                    if let Some(chunk) = in_flight.take() {
                        self.emit(&tx, chunk);
                    }
                }

                item = upstream.next(), if !upstream_done => match item {
                    Some(Ok(chunk)) => {
                        self.stats.received += 1;
                        self.queue.push(chunk);
                    }
                    Some(Err(err)) => {
                        let dropped = self.queue.clear() + usize::from(in_flight.take().is_some());
                        self.stats.dropped += dropped;
                        warn!(dropped, "Upstream failed, forwarding error");
                        let _ = tx.send(Err(err));
                        return self.finish(LifecycleState::Errored);
                    }
                    None => {
                        upstream_done = true;
                        self.stats.state = LifecycleState::DrainingQueue;
                    }
                },
            }
        }
    }

    /// Emit queued chunks until one needs a pacing delay. That chunk is
    /// returned with `sleep` armed for its deadline.
    fn drain_until_paced<E>(
        &mut self,
        tx: &mpsc::UnboundedSender<Result<Bytes, E>>,
        sleep: Pin<&mut tokio::time::Sleep>,
    ) -> Option<Bytes> {
        while let Some(step) = self.queue.pop() {
            match step {
                DrainStep::Suppressed(_) => self.stats.suppressed += 1,
                DrainStep::Immediate(chunk) => self.emit(tx, chunk),
                DrainStep::Paced {
                    chunk,
                    remaining_lines,
                } => {
                    let delay = self.curve.delay_for(remaining_lines, self.jitter.sample());
                    debug!(
                        delay_ms = delay.as_millis() as u64,
                        remaining_lines,
                        queued = self.queue.len(),
                        "Pacing chunk"
                    );
                    self.stats.total_delay += delay;
                    sleep.reset(Instant::now() + delay);
                    return Some(chunk);
                }
            }
        }
        None
    }

    fn emit<E>(&mut self, tx: &mpsc::UnboundedSender<Result<Bytes, E>>, chunk: Bytes) {
        // A closed receiver means the consumer cancelled; nothing to report.
        if tx.send(Ok(chunk)).is_ok() {
            self.stats.emitted += 1;
        }
    }

    fn finish(mut self, state: LifecycleState) -> PacingStats {
        self.stats.state = state;
        info!(
            state = %state,
            received = self.stats.received,
            emitted = self.stats.emitted,
            suppressed = self.stats.suppressed,
            dropped = self.stats.dropped,
            total_delay_ms = self.stats.total_delay.as_millis() as u64,
            "Paced stream finished"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::io;

    fn chunks(items: &[&'static str]) -> Vec<Result<Bytes, io::Error>> {
        items
            .iter()
            .map(|s| Ok(Bytes::from_static(s.as_bytes())))
            .collect()
    }

    fn fixed_stream(items: Vec<Result<Bytes, io::Error>>) -> PacedStream<io::Error> {
        paced_stream_with(stream::iter(items), &PacingConfig::default(), FixedJitter(0.5))
    }

    async fn collect_ok(mut paced: PacedStream<io::Error>) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(item) = paced.next().await {
            out.push(item.unwrap());
        }
        out
    }

    async fn run_pacer(items: Vec<Result<Bytes, io::Error>>) -> (Vec<Bytes>, PacingStats) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pacer = Pacer::new(PacingCurve::default(), FixedJitter(0.5));
        let stats = pacer.run(stream::iter(items), tx).await;
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item.unwrap());
        }
        (out, stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_preserved() {
        let input = ["alpha\n", "beta", " gamma\n", "delta\n", "epsilon"];
        let out = collect_ok(fixed_stream(chunks(&input))).await;
        assert_eq!(out, input.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjacent_duplicate_is_dropped() {
        let out = collect_ok(fixed_stream(chunks(&["foo\n", "foo\n", "bar\n"]))).await;
        assert_eq!(out, vec!["foo\n", "bar\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_newline_chunk_is_not_delayed() {
        let mut paced = fixed_stream(chunks(&["partial-token"]));
        let start = Instant::now();
        let chunk = paced.next().await.unwrap().unwrap();
        assert_eq!(chunk, "partial-token");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_line_waits_max_delay() {
        let mut paced = fixed_stream(chunks(&["Hello\n"]));
        let start = Instant::now();
        paced.next().await.unwrap().unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1510), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_non_adjacent_repeat() {
        let (out, stats) = run_pacer(chunks(&["Hello\n", "World\n", "Hello\n"])).await;
        assert_eq!(out, vec!["Hello\n", "World\n", "Hello\n"]);
        assert_eq!(stats.state, LifecycleState::Closed);
        assert_eq!(stats.received, 3);
        assert_eq!(stats.emitted, 3);
        assert_eq!(stats.suppressed, 0);
        // Each dequeue leaves at most one line behind it, so every line is
        // paced at the top of the curve.
        assert_eq!(stats.total_delay, Duration::from_millis(4500));
    }

    #[test]
    fn test_large_backlog_is_paced_faster() {
        let mut backlog = String::new();
        for i in 0..40 {
            backlog.push_str(&format!("line {i}\n"));
        }
        let mut queue = PendingQueue::new();
        queue.push(Bytes::from_static(b"head\n"));
        queue.push(Bytes::from(backlog));

        let curve = PacingCurve::default();
        let head = match queue.pop() {
            Some(DrainStep::Paced { remaining_lines, .. }) => {
                assert_eq!(remaining_lines, 40);
                curve.delay_for(remaining_lines, 0.5)
            }
            other => panic!("Expected Paced, got {:?}", other),
        };
        let tail = match queue.pop() {
            Some(DrainStep::Paced { remaining_lines, .. }) => curve.delay_for(remaining_lines, 0.5),
            other => panic!("Expected Paced, got {:?}", other),
        };
        assert!(head < Duration::from_millis(110), "head {:?}", head);
        assert_eq!(tail, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_closes_once_after_drain() {
        let mut paced = fixed_stream(chunks(&["a\n", "b"]));
        assert_eq!(paced.next().await.unwrap().unwrap(), "a\n");
        assert_eq!(paced.next().await.unwrap().unwrap(), "b");
        assert!(paced.next().await.is_none());
        assert!(paced.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_is_forwarded() {
        let items = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream reset")),
            Ok(Bytes::from_static(b"never\n")),
        ];
        let mut paced = fixed_stream(items);
        assert_eq!(paced.next().await.unwrap().unwrap(), "partial");
        let err = paced.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(paced.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_drops_pending_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let items = vec![
            Ok(Bytes::from_static(b"waiting\n")),
            Err(io::Error::other("boom")),
        ];
        let pacer = Pacer::new(PacingCurve::default(), FixedJitter(0.5));
        let stats = pacer.run(stream::iter(items), tx).await;

        assert_eq!(stats.state, LifecycleState::Errored);
        assert_eq!(stats.dropped, 1);
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_emission() {
        let upstream = stream::iter(chunks(&["one\n", "two\n", "three\n"])).chain(stream::pending());
        let mut paced = paced_stream_with(upstream, &PacingConfig::default(), FixedJitter(0.5));
        assert_eq!(paced.next().await.unwrap().unwrap(), "one\n");

        paced.cancel();
        paced.cancel();
        assert!(paced.is_cancelled());
        assert!(paced.next().await.is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(paced.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_completion_is_noop() {
        let mut paced = fixed_stream(chunks(&["done"]));
        assert_eq!(paced.next().await.unwrap().unwrap(), "done");
        assert!(paced.next().await.is_none());
        paced.cancel();
        paced.cancel();
        assert!(paced.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_receiver_cancels_worker() {
        let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, io::Error>>();
        let upstream = stream::iter(chunks(&["a\n", "b\n"])).chain(stream::pending());
        let pacer = Pacer::new(PacingCurve::default(), FixedJitter(0.5));
        let handle = tokio::spawn(pacer.run(upstream, tx));

        drop(rx);
        let stats = handle.await.unwrap();
        assert_eq!(stats.state, LifecycleState::Cancelled);
        assert_eq!(stats.emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingestion_continues_during_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (up_tx, up_rx) = mpsc::unbounded_channel::<Result<Bytes, io::Error>>();
        let upstream = stream::unfold(up_rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        let pacer = Pacer::new(PacingCurve::default(), FixedJitter(0.5));
        let handle = tokio::spawn(pacer.run(upstream, tx));

        up_tx.send(Ok(Bytes::from_static(b"first\n"))).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The first line is now waiting out its delay; more input must still
        // be accepted.
        up_tx.send(Ok(Bytes::from_static(b"second"))).unwrap();
        up_tx.send(Ok(Bytes::from_static(b"third\n"))).unwrap();
        drop(up_tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.state, LifecycleState::Closed);

        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item.unwrap());
        }
        assert_eq!(out, vec!["first\n", "second", "third\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_multibyte_passes_through() {
        let bytes = "naïve\n".as_bytes();
        let items = vec![
            Ok(Bytes::copy_from_slice(&bytes[..3])),
            Ok(Bytes::copy_from_slice(&bytes[3..])),
        ];
        let out = collect_ok(fixed_stream(items)).await;
        let joined: Vec<u8> = out.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(joined, bytes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_paced_stream_yields_all_bytes() {
        let upstream = stream::iter(chunks(&["x\n", "y\n"]));
        let paced = paced_stream(upstream);
        let out = collect_ok(paced).await;
        assert_eq!(out, vec!["x\n", "y\n"]);
    }
}
