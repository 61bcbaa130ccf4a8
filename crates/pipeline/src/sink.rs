//! Clock-driven audio sink
//!
//! A real-time simulated output device: samples are accepted into a bounded
//! buffer and "played" by the wall clock. The playback head advances only
//! while playing and freezes across pause/stop, which is exactly the
//! contract the player's progress accounting and drain watchdog rely on.
//! Useful for headless hosts and for every test in this workspace; a real
//! device adapter implements the same [`SinkFactory`] port.

use std::sync::Arc;
use std::time::{Duration, Instant};

use narrator_core::{AudioSink, Error, Result, SinkFactory, SinkState};

pub struct ClockSink {
    sample_rate: u32,
    buffer_capacity: usize,
    state: SinkState,
    volume: f32,
    /// Total samples accepted since open.
    written: u64,
    /// Head position at the last state change.
    head_base: u64,
    playing_since: Option<Instant>,
}

impl ClockSink {
    fn new(sample_rate: u32, buffer_capacity: usize) -> Self {
        Self {
            sample_rate,
            buffer_capacity,
            state: SinkState::Stopped,
            volume: 1.0,
            written: 0,
            head_base: 0,
            playing_since: None,
        }
    }

    fn head_now(&self) -> u64 {
        match self.playing_since {
            Some(since) => {
                let elapsed = since.elapsed().as_secs_f64();
                let advanced = (elapsed * f64::from(self.sample_rate)) as u64;
                (self.head_base + advanced).min(self.written)
            }
            None => self.head_base.min(self.written),
        }
    }

    fn buffered(&self) -> usize {
        (self.written - self.head_now()) as usize
    }

    /// Freeze the head at its current position.
    fn anchor_head(&mut self) {
        self.head_base = self.head_now();
        self.playing_since = None;
    }
}

impl AudioSink for ClockSink {
    fn play(&mut self) {
        if self.state != SinkState::Playing {
            self.state = SinkState::Playing;
            self.playing_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if self.state == SinkState::Playing {
            self.anchor_head();
        }
        self.state = SinkState::Paused;
    }

    fn stop(&mut self) {
        if self.state == SinkState::Playing {
            self.anchor_head();
        }
        self.state = SinkState::Stopped;
    }

    fn flush(&mut self) {
        self.anchor_head();
        self.written = self.head_base;
    }

    fn set_volume(&mut self, v: f32) {
        self.volume = v.clamp(0.0, 1.0);
    }

    fn write(&mut self, samples: &[i16]) -> usize {
        if samples.is_empty() {
            return 0;
        }

        // Block only while playing: a paused or stopped device never drains,
        // so blocking there would deadlock the writer.
        if self.state == SinkState::Playing {
            let target = samples.len().min(self.buffer_capacity);
            while self.buffer_capacity.saturating_sub(self.buffered()) < target {
                std::thread::sleep(Duration::from_millis(1));
            }
            self.written += target as u64;
            return target;
        }

        let space = self.buffer_capacity.saturating_sub(self.buffered());
        let accepted = space.min(samples.len());
        self.written += accepted as u64;
        accepted
    }

    fn playback_head_position(&self) -> u64 {
        self.head_now()
    }

    fn play_state(&self) -> SinkState {
        self.state
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Opens [`ClockSink`]s with a fixed buffer size.
#[derive(Debug, Clone)]
pub struct ClockSinkFactory {
    buffer_samples: usize,
}

impl ClockSinkFactory {
    pub fn new(buffer_samples: usize) -> Arc<Self> {
        Arc::new(Self { buffer_samples })
    }
}

impl SinkFactory for ClockSinkFactory {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        if sample_rate == 0 {
            return Err(Error::Sink("sample rate must be non-zero".into()));
        }
        Ok(Box::new(ClockSink::new(sample_rate, self.buffer_samples)))
    }
}
