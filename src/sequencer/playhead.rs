// Playhead reporter - Samples the transport each frame and publishes bar position

use super::timeline::{seconds_to_bars, MusicalTime, TimeSignature};
use super::transport::TransportClock;
use crate::messaging::channels::PlayheadProducer;
use ringbuf::traits::Producer;
use tracing::trace;

/// Playhead position published once per frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayheadUpdate {
    /// Position in (fractional) bars from the song start
    pub bars: f64,
    pub seconds: f64,
    /// Tempo the position was computed with
    pub bpm: f64,
    pub position: MusicalTime,
}

/// Converts transport time to bars for the UI
///
/// Uses the transport's live tempo; the project's tempo field can lag
/// behind during a tempo transition.
pub struct PlayheadReporter {
    producer: PlayheadProducer,
    time_signature: TimeSignature,
    active: bool,
}

impl PlayheadReporter {
    pub fn new(producer: PlayheadProducer) -> Self {
        Self {
            producer,
            time_signature: TimeSignature::default(),
            active: false,
        }
    }

    pub fn start(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        self.active = true;
    }

    /// Cancel reporting. Later frames publish nothing until `start`.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    /// Sample the transport. A frame seen while the transport is not running
    /// stops the reporter.
    pub fn on_frame<T: TransportClock + ?Sized>(&mut self, transport: &T) -> Option<PlayheadUpdate> {
        if !self.active {
            return None;
        }
        if !transport.is_running() {
            self.stop();
            return None;
        }

        let seconds = transport.elapsed_seconds();
        let bpm = transport.bpm();
        let bars = seconds_to_bars(seconds, &self.time_signature, bpm);
        let update = PlayheadUpdate {
            bars,
            seconds,
            bpm,
            position: MusicalTime::from_bars(bars, &self.time_signature),
        };

        if self.producer.try_push(update).is_err() {
            trace!("Playhead channel full, update dropped");
        }
        Some(update)
    }
}
