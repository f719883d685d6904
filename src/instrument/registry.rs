// Instrument registry - One instrument per track, owned by the composition root

use super::{Instrument, InstrumentKind, RecordingBackend, SharedInstrument, TriggerLog};
use crate::project::{Project, Track, TrackId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Builds instruments for tracks
pub trait InstrumentFactory: Send {
    /// Return None when the identifier cannot be resolved
    fn create(&self, track: &Track, instrument_id: &str) -> Option<Instrument>;
}

/// Factory whose instruments log their triggers to a shared [`TriggerLog`]
#[derive(Clone, Default)]
pub struct RecordingFactory {
    log: TriggerLog,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> TriggerLog {
        Arc::clone(&self.log)
    }
}

impl InstrumentFactory for RecordingFactory {
    fn create(&self, track: &Track, instrument_id: &str) -> Option<Instrument> {
        let kind = InstrumentKind::from_id(instrument_id)?;
        let backend = RecordingBackend::new(track.id.as_str(), Arc::clone(&self.log));
        Some(kind.build(Box::new(backend)))
    }
}

struct Entry {
    instrument_id: String,
    instrument: SharedInstrument,
}

/// Instruments keyed by track id
///
/// Created lazily, shared by playback and preview, and disposed only when
/// the owning track leaves the project.
pub struct InstrumentRegistry {
    factory: Box<dyn InstrumentFactory>,
    entries: HashMap<TrackId, Entry>,
}

impl InstrumentRegistry {
    pub fn new(factory: Box<dyn InstrumentFactory>) -> Self {
        Self {
            factory,
            entries: HashMap::new(),
        }
    }

    /// Build a fresh instrument for `track`, replacing (and disposing) any
    /// previous one. None when the track has no resolvable instrument.
    pub fn create(&mut self, track: &Track) -> Option<SharedInstrument> {
        let instrument_id = track.instrument.as_deref()?;
        let Some(instrument) = self.factory.create(track, instrument_id) else {
            trace!(track = %track.id, instrument_id, "Instrument could not be resolved");
            return None;
        };

        let shared = Arc::new(Mutex::new(instrument));
        let previous = self.entries.insert(
            track.id.clone(),
            Entry {
                instrument_id: instrument_id.to_string(),
                instrument: Arc::clone(&shared),
            },
        );
        if let Some(previous) = previous {
            previous.instrument.lock().dispose();
        }
        debug!(track = %track.id, instrument_id, "Instrument created");
        Some(shared)
    }

    pub fn get(&self, track_id: &TrackId) -> Option<SharedInstrument> {
        self.entries
            .get(track_id)
            .map(|entry| Arc::clone(&entry.instrument))
    }

    /// Cached instrument, or a new one when missing or when the track now
    /// names a different instrument
    pub fn get_or_create(&mut self, track: &Track) -> Option<SharedInstrument> {
        let wanted = track.instrument.as_deref()?;
        match self.entries.get(&track.id) {
            Some(entry) if entry.instrument_id == wanted => Some(Arc::clone(&entry.instrument)),
            _ => self.create(track),
        }
    }

    /// Dispose instruments whose track no longer exists. Returns how many.
    pub fn dispose_for_removed_tracks(&mut self, project: &Project) -> usize {
        let live: HashSet<&TrackId> = project.tracks.iter().map(|t| &t.id).collect();
        let stale: Vec<TrackId> = self
            .entries
            .keys()
            .filter(|id| !live.contains(id))
            .cloned()
            .collect();

        for id in &stale {
            if let Some(entry) = self.entries.remove(id) {
                entry.instrument.lock().dispose();
                debug!(track = %id, "Instrument disposed for removed track");
            }
        }
        stale.len()
    }

    pub fn dispose_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.instrument.lock().dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for InstrumentRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
