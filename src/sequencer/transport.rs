// Transport - Playback clock and event firing
// Advances musical time at the live tempo and fires registered callbacks in tick order

use super::timeline::{seconds_to_ticks, ticks_to_seconds, Tempo};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Transport state (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    /// Check if transport is advancing
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    /// Check if transport is stopped or paused
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Paused)
    }
}

/// Handle returned by [`TransportClock::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(u64);

impl EventHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Callback fired once, receiving the transport's elapsed seconds at firing time
pub type EventCallback = Box<dyn FnOnce(f64) + Send>;

/// The clock the scheduler and playhead consume
///
/// Positions are absolute ticks (480 per quarter note), which do not depend
/// on tempo. `set_bpm` may be applied lazily by the host; callers that need
/// the new tempo in effect must read `bpm()` back and verify.
pub trait TransportClock {
    fn bpm(&self) -> f64;
    fn set_bpm(&mut self, bpm: f64);
    fn elapsed_seconds(&self) -> f64;
    fn position_ticks(&self) -> f64;
    fn is_running(&self) -> bool;
    fn start(&mut self);
    fn stop(&mut self);

    /// Register a callback at an absolute tick
    fn schedule(&mut self, at_tick: u64, callback: EventCallback) -> EventHandle;

    /// Release a registration. Unknown, fired and already disposed handles
    /// are ignored.
    fn dispose(&mut self, handle: EventHandle);
}

/// In-process transport
///
/// Time only moves on [`Transport::advance`], which the host drives from its
/// audio or animation clock. Tempo writes are queued and land at the start
/// of the next advance.
pub struct Transport {
    state: TransportState,
    tempo: Tempo,
    pending_tempo: Option<Tempo>,
    elapsed_seconds: f64,
    position_ticks: f64,
    queue: BTreeMap<(u64, u64), EventCallback>,
    handles: HashMap<u64, u64>,
    next_handle: u64,
}

impl Transport {
    /// Create a stopped transport at the given tempo
    pub fn new(tempo: Tempo) -> Self {
        Self {
            state: TransportState::Stopped,
            tempo,
            pending_tempo: None,
            elapsed_seconds: 0.0,
            position_ticks: 0.0,
            queue: BTreeMap::new(),
            handles: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Get current state
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Pause, keeping position and registered events
    pub fn pause(&mut self) {
        if self.state.is_playing() {
            self.state = TransportState::Paused;
        }
    }

    /// Number of registered, not yet fired events
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Move time forward by `seconds`. Returns the number of events fired.
    ///
    /// Events are fired in (tick, registration) order. Each callback gets the
    /// elapsed time at its own tick, interpolated at the current tempo.
    pub fn advance(&mut self, seconds: f64) -> usize {
        if let Some(tempo) = self.pending_tempo.take() {
            debug!(bpm = tempo.bpm(), "Transport tempo applied");
            self.tempo = tempo;
        }

        if !self.state.is_playing() || seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }

        let bpm = self.tempo.bpm();
        let start_ticks = self.position_ticks;
        let start_seconds = self.elapsed_seconds;
        let end_ticks = start_ticks + seconds_to_ticks(seconds, bpm);

        let mut fired = 0;
        while let Some(entry) = self.queue.first_entry() {
            let (tick, id) = *entry.key();
            if tick as f64 > end_ticks {
                break;
            }
            let callback = entry.remove();
            self.handles.remove(&id);

            let offset = (tick as f64 - start_ticks).max(0.0);
            let at = start_seconds + ticks_to_seconds(offset, bpm);
            trace!(tick, at, "Firing transport event");
            callback(at);
            fired += 1;
        }

        self.position_ticks = end_ticks;
        self.elapsed_seconds = start_seconds + seconds;
        fired
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(Tempo::default())
    }
}

impl TransportClock for Transport {
    fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    fn set_bpm(&mut self, bpm: f64) {
        // The clock never runs outside the tempo range
        let bpm = if bpm.is_nan() { Tempo::default().bpm() } else { bpm };
        self.pending_tempo = Some(Tempo::new(bpm.clamp(Tempo::MIN_BPM, Tempo::MAX_BPM)));
    }

    fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    fn position_ticks(&self) -> f64 {
        self.position_ticks
    }

    fn is_running(&self) -> bool {
        self.state.is_playing()
    }

    fn start(&mut self) {
        self.state = TransportState::Playing;
    }

    /// Stop and rewind. Registered events stay until disposed.
    fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.position_ticks = 0.0;
        self.elapsed_seconds = 0.0;
    }

    fn schedule(&mut self, at_tick: u64, callback: EventCallback) -> EventHandle {
        let id = self.next_handle;
        self.next_handle += 1;
        self.queue.insert((at_tick, id), callback);
        self.handles.insert(id, at_tick);
        EventHandle(id)
    }

    fn dispose(&mut self, handle: EventHandle) {
        if let Some(tick) = self.handles.remove(&handle.0) {
            self.queue.remove(&(tick, handle.0));
        }
    }
}
