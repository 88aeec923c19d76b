//! Stream and timing-event pool
//!
//! A fixed set of independent, non-blocking streams plus one start/stop
//! event pair per event index. Stream `EVENT_STREAM` is the shared default
//! used whenever no explicit stream is supplied; the indices below it are
//! worker streams with like-numbered event pairs.

use std::sync::Arc;

use crate::driver::{EventHandle, GpuDriver, StreamHandle};
use crate::error::{GpuError, GpuResult};

/// Reserved index of the shared default/synchronization stream
pub const EVENT_STREAM: usize = 4;
/// Number of streams the pool creates
pub const NUM_STREAMS: usize = EVENT_STREAM + 1;
/// Number of start/stop event pairs; one per stream
pub const NUM_EVENTS: usize = NUM_STREAMS;

#[derive(Debug)]
pub struct StreamPool {
    driver: Arc<dyn GpuDriver>,
    streams: Vec<StreamHandle>,
    event_start: Vec<EventHandle>,
    event_stop: Vec<EventHandle>,
}

impl StreamPool {
    /// Create `NUM_STREAMS` streams and `NUM_EVENTS` event pairs.
    ///
    /// On any platform failure, everything created so far is destroyed
    /// before the error is returned.
    pub fn new(driver: Arc<dyn GpuDriver>) -> GpuResult<Self> {
        let mut streams = Vec::with_capacity(NUM_STREAMS);
        let mut event_start = Vec::with_capacity(NUM_EVENTS);
        let mut event_stop = Vec::with_capacity(NUM_EVENTS);

        let result: GpuResult<()> = (|| {
            for _ in 0..NUM_STREAMS {
                streams.push(driver.stream_create()?);
            }
            for _ in 0..NUM_EVENTS {
                event_start.push(driver.event_create()?);
                event_stop.push(driver.event_create()?);
            }
            Ok(())
        })();

        if let Err(e) = result {
            for stream in &streams {
                driver.stream_destroy(*stream);
            }
            for event in event_start.iter().chain(event_stop.iter()) {
                driver.event_destroy(*event);
            }
            return Err(e);
        }

        tracing::debug!(
            "stream pool ready: {} streams, {} event pairs",
            streams.len(),
            event_start.len()
        );
        Ok(StreamPool {
            driver,
            streams,
            event_start,
            event_stop,
        })
    }

    /// Stream handle for `index`. An out-of-range index maps to the shared
    /// `EVENT_STREAM` instead of failing.
    pub fn stream(&self, index: usize) -> StreamHandle {
        let index = if index >= self.streams.len() {
            EVENT_STREAM
        } else {
            index
        };
        self.streams[index]
    }

    fn start_event(&self, index: usize) -> GpuResult<EventHandle> {
        self.event_start
            .get(index)
            .copied()
            .ok_or(GpuError::EventOutOfRange {
                index,
                limit: NUM_EVENTS,
            })
    }

    fn stop_event(&self, index: usize) -> GpuResult<EventHandle> {
        self.event_stop
            .get(index)
            .copied()
            .ok_or(GpuError::EventOutOfRange {
                index,
                limit: NUM_EVENTS,
            })
    }

    /// Make `stream_index` wait, device-side, until the stop marker of
    /// `event_index` has fired. Establishes a cross-stream ordering edge
    /// without blocking the host.
    pub fn stream_wait(&self, stream_index: usize, event_index: usize) -> GpuResult<()> {
        self.driver
            .stream_wait_event(self.stream(stream_index), self.stop_event(event_index)?)
    }

    /// Record the start marker of `event_index`. A `None` stream defaults
    /// to `min(event_index, EVENT_STREAM)`: low-numbered events pin to
    /// their like-numbered worker stream, extras land on the shared one.
    pub fn timer_start(&self, event_index: usize, stream_index: Option<usize>) -> GpuResult<()> {
        let event = self.start_event(event_index)?;
        let stream_index = stream_index.unwrap_or_else(|| event_index.min(EVENT_STREAM));
        self.driver.event_record(event, self.stream(stream_index))
    }

    /// Record the stop marker of `event_index`; same default stream rule
    /// as [`timer_start`](Self::timer_start).
    pub fn timer_stop(&self, event_index: usize, stream_index: Option<usize>) -> GpuResult<()> {
        let event = self.stop_event(event_index)?;
        let stream_index = stream_index.unwrap_or_else(|| event_index.min(EVENT_STREAM));
        self.driver.event_record(event, self.stream(stream_index))
    }

    /// Milliseconds between the start and stop markers of `event_index`.
    ///
    /// For stream-aligned events (`event_index <= EVENT_STREAM`) the stop
    /// marker's completion is forced first; reading it early would yield
    /// undefined timing. This is a host suspension point.
    pub fn timer_elapsed(&self, event_index: usize) -> GpuResult<f32> {
        let start = self.start_event(event_index)?;
        let stop = self.stop_event(event_index)?;
        if event_index <= EVENT_STREAM {
            self.stream_wait(event_index, event_index)?;
            self.driver.event_synchronize(stop)?;
        }
        self.driver.event_elapsed(start, stop)
    }

    /// Block the host until the stream's outstanding work completes
    pub fn flush(&self, stream_index: usize) -> GpuResult<()> {
        self.driver.stream_synchronize(self.stream(stream_index))
    }

    /// Block the host until all streams across the device complete
    pub fn flush_device(&self) -> GpuResult<()> {
        self.driver.device_synchronize()
    }

    /// Flush every stream in index order; failures are logged and do not
    /// stop the remaining flushes. Used on teardown paths.
    pub fn flush_all(&self) {
        for (index, stream) in self.streams.iter().enumerate() {
            if let Err(e) = self.driver.stream_synchronize(*stream) {
                tracing::error!("flush of stream {} failed during teardown: {}", index, e);
            }
        }
    }
}

impl Drop for StreamPool {
    fn drop(&mut self) {
        // Flush everything before destroying any stream or event.
        self.flush_all();
        for stream in &self.streams {
            self.driver.stream_destroy(*stream);
        }
        for event in self.event_start.iter().chain(self.event_stop.iter()) {
            self.driver.event_destroy(*event);
        }
        tracing::debug!("stream pool destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::host::HostDriver;

    fn pool() -> (Arc<HostDriver>, StreamPool) {
        let driver = Arc::new(HostDriver::new());
        let pool = StreamPool::new(driver.clone() as Arc<dyn GpuDriver>).unwrap();
        (driver, pool)
    }

    #[test]
    fn out_of_range_stream_clamps_to_event_stream() {
        let (_driver, pool) = pool();
        assert_eq!(pool.stream(NUM_STREAMS + 3), pool.stream(EVENT_STREAM));
        assert_ne!(pool.stream(0), pool.stream(1));
    }

    #[test]
    fn out_of_range_event_is_an_error() {
        let (_driver, pool) = pool();
        match pool.stream_wait(0, NUM_EVENTS) {
            Err(GpuError::EventOutOfRange { index, limit }) => {
                assert_eq!(index, NUM_EVENTS);
                assert_eq!(limit, NUM_EVENTS);
            }
            other => panic!("expected EventOutOfRange, got {:?}", other),
        }
        assert!(pool.timer_start(NUM_EVENTS, None).is_err());
        assert!(pool.timer_elapsed(NUM_EVENTS).is_err());
    }

    #[test]
    fn timer_elapsed_is_non_negative() {
        let (_driver, pool) = pool();
        pool.timer_start(2, None).unwrap();
        pool.timer_stop(2, None).unwrap();
        // No explicit flush: elapsed itself forces stop-marker completion.
        let ms = pool.timer_elapsed(2).unwrap();
        assert!(ms >= 0.0);
    }

    #[test]
    fn timer_default_stream_rule() {
        let (_driver, pool) = pool();
        // The tie case: event EVENT_STREAM records on the shared stream.
        pool.timer_start(EVENT_STREAM, None).unwrap();
        pool.timer_stop(EVENT_STREAM, None).unwrap();
        assert!(pool.timer_elapsed(EVENT_STREAM).unwrap() >= 0.0);
    }

    #[test]
    fn flush_paths_succeed() {
        let (_driver, pool) = pool();
        pool.flush(0).unwrap();
        pool.flush(EVENT_STREAM).unwrap();
        pool.flush(NUM_STREAMS + 10).unwrap(); // clamps, still valid
        pool.flush_device().unwrap();
        pool.flush_all();
    }

    #[test]
    fn drop_destroys_all_handles() {
        let driver = Arc::new(HostDriver::new());
        {
            let _pool = StreamPool::new(driver.clone() as Arc<dyn GpuDriver>).unwrap();
        }
        // Handles released: a fresh pool on the same driver works.
        let pool = StreamPool::new(driver as Arc<dyn GpuDriver>).unwrap();
        pool.flush_device().unwrap();
    }
}
