// Instrument layer - Playable sound sources addressed by the scheduler
// A closed set of voice kinds over a pluggable backend

pub mod preview;
pub mod registry;

pub use preview::NotePreview;
pub use registry::{InstrumentFactory, InstrumentRegistry, RecordingFactory};

use crate::sequencer::note::NoteName;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Gain floor used for silence
pub const SILENCE_DB: f64 = -96.0;

/// Per-trigger gain in decibels: `20 * log10(velocity / 127 * volume)`,
/// floored at -96 dB
pub fn gain_db(velocity: u8, track_volume: f32) -> f64 {
    let linear = velocity as f64 / 127.0 * track_volume.clamp(0.0, 1.0) as f64;
    if linear <= 0.0 {
        return SILENCE_DB;
    }
    (20.0 * linear.log10()).max(SILENCE_DB)
}

/// Sound engine behind an instrument
///
/// `time` is the transport time in seconds the trigger belongs to and
/// `duration` is in seconds. Gain is passed per call; backends never keep
/// a global volume that one trigger could change for another.
pub trait VoiceBackend: Send {
    fn trigger_chord(&mut self, notes: &[NoteName], duration: f64, time: f64, gain_db: f64);
    fn trigger_note(&mut self, note: NoteName, duration: f64, time: f64, gain_db: f64);

    /// Called once when the owning instrument is disposed
    fn release(&mut self) {}
}

/// A backend slot that can be disposed exactly once
pub struct Voice {
    backend: Option<Box<dyn VoiceBackend>>,
}

impl Voice {
    pub fn new(backend: Box<dyn VoiceBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.backend.is_none()
    }

    fn backend(&mut self) -> Option<&mut (dyn VoiceBackend + 'static)> {
        self.backend.as_deref_mut()
    }

    fn dispose(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Playable instrument
#[derive(Debug)]
pub enum Instrument {
    /// Many simultaneous voices; accepts chords
    Polyphonic(Voice),
    /// One voice at a time; chords degrade to single notes
    Monophonic(Voice),
    /// Sample player; accepts chords
    Sampled(Voice),
}

/// Instrument shared between the scheduler, preview and the registry
pub type SharedInstrument = Arc<Mutex<Instrument>>;

impl Instrument {
    fn voice(&mut self) -> &mut Voice {
        match self {
            Instrument::Polyphonic(voice)
            | Instrument::Monophonic(voice)
            | Instrument::Sampled(voice) => voice,
        }
    }

    fn voice_ref(&self) -> &Voice {
        match self {
            Instrument::Polyphonic(voice)
            | Instrument::Monophonic(voice)
            | Instrument::Sampled(voice) => voice,
        }
    }

    pub fn supports_chords(&self) -> bool {
        matches!(self, Instrument::Polyphonic(_) | Instrument::Sampled(_))
    }

    pub fn is_disposed(&self) -> bool {
        self.voice_ref().is_disposed()
    }

    /// Play several notes as one event. Monophonic instruments fall back to
    /// one note call per pitch.
    pub fn trigger_chord(&mut self, notes: &[NoteName], duration: f64, time: f64, gain_db: f64) {
        let chords = self.supports_chords();
        let Some(backend) = self.voice().backend() else {
            trace!("Trigger on disposed instrument ignored");
            return;
        };
        if chords {
            backend.trigger_chord(notes, duration, time, gain_db);
        } else {
            for note in notes {
                backend.trigger_note(*note, duration, time, gain_db);
            }
        }
    }

    pub fn trigger_note(&mut self, note: NoteName, duration: f64, time: f64, gain_db: f64) {
        match self.voice().backend() {
            Some(backend) => backend.trigger_note(note, duration, time, gain_db),
            None => trace!("Trigger on disposed instrument ignored"),
        }
    }

    /// Release the backend. Safe to call any number of times.
    pub fn dispose(&mut self) {
        self.voice().dispose();
    }
}

/// Instrument families the project and the MIDI codec agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Piano,
    Bass,
    Strings,
    Guitar,
    Organ,
    Brass,
    Lead,
    Pad,
    Drums,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 9] = [
        InstrumentKind::Piano,
        InstrumentKind::Bass,
        InstrumentKind::Strings,
        InstrumentKind::Guitar,
        InstrumentKind::Organ,
        InstrumentKind::Brass,
        InstrumentKind::Lead,
        InstrumentKind::Pad,
        InstrumentKind::Drums,
    ];

    /// Identifier stored in `Track::instrument`
    pub fn id(&self) -> &'static str {
        match self {
            InstrumentKind::Piano => "piano",
            InstrumentKind::Bass => "bass",
            InstrumentKind::Strings => "strings",
            InstrumentKind::Guitar => "guitar",
            InstrumentKind::Organ => "organ",
            InstrumentKind::Brass => "brass",
            InstrumentKind::Lead => "lead",
            InstrumentKind::Pad => "pad",
            InstrumentKind::Drums => "drums",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.id().eq_ignore_ascii_case(id))
    }

    /// General MIDI program (0-based) written on export
    pub fn gm_program(&self) -> u8 {
        match self {
            InstrumentKind::Piano => 0,
            InstrumentKind::Organ => 16,
            InstrumentKind::Guitar => 24,
            InstrumentKind::Bass => 33,
            InstrumentKind::Strings => 48,
            InstrumentKind::Brass => 61,
            InstrumentKind::Lead => 80,
            InstrumentKind::Pad => 88,
            InstrumentKind::Drums => 0,
        }
    }

    /// Wrap a backend in the variant this family plays with
    pub fn build(&self, backend: Box<dyn VoiceBackend>) -> Instrument {
        let voice = Voice::new(backend);
        match self {
            InstrumentKind::Drums => Instrument::Sampled(voice),
            InstrumentKind::Bass | InstrumentKind::Lead => Instrument::Monophonic(voice),
            _ => Instrument::Polyphonic(voice),
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One call received by a [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRecord {
    pub source: String,
    pub chord: bool,
    pub notes: Vec<NoteName>,
    pub duration: f64,
    pub time: f64,
    pub gain_db: f64,
}

/// Shared log written by recording backends
pub type TriggerLog = Arc<Mutex<Vec<TriggerRecord>>>;

/// Backend that appends every trigger to a shared log instead of making sound
pub struct RecordingBackend {
    source: String,
    log: TriggerLog,
}

impl RecordingBackend {
    pub fn new(source: impl Into<String>, log: TriggerLog) -> Self {
        Self {
            source: source.into(),
            log,
        }
    }
}

impl VoiceBackend for RecordingBackend {
    fn trigger_chord(&mut self, notes: &[NoteName], duration: f64, time: f64, gain_db: f64) {
        self.log.lock().push(TriggerRecord {
            source: self.source.clone(),
            chord: true,
            notes: notes.to_vec(),
            duration,
            time,
            gain_db,
        });
    }

    fn trigger_note(&mut self, note: NoteName, duration: f64, time: f64, gain_db: f64) {
        self.log.lock().push(TriggerRecord {
            source: self.source.clone(),
            chord: false,
            notes: vec![note],
            duration,
            time,
            gain_db,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(kind: InstrumentKind) -> (Instrument, TriggerLog) {
        let log = TriggerLog::default();
        let instrument = kind.build(Box::new(RecordingBackend::new("t", Arc::clone(&log))));
        (instrument, log)
    }

    #[test]
    fn test_gain_db() {
        assert_eq!(gain_db(127, 1.0), 0.0);
        assert_eq!(gain_db(0, 1.0), SILENCE_DB);
        assert_eq!(gain_db(100, 0.0), SILENCE_DB);
        assert!((gain_db(127, 0.5) - (-6.0206)).abs() < 1e-3);
        assert!(gain_db(110, 0.8) > gain_db(90, 0.8));
    }

    #[test]
    fn test_variant_capabilities() {
        assert!(recording(InstrumentKind::Piano).0.supports_chords());
        assert!(recording(InstrumentKind::Drums).0.supports_chords());
        assert!(!recording(InstrumentKind::Bass).0.supports_chords());
        assert!(matches!(recording(InstrumentKind::Drums).0, Instrument::Sampled(_)));
    }

    #[test]
    fn test_monophonic_chord_degrades_to_notes() {
        let (mut bass, log) = recording(InstrumentKind::Bass);
        bass.trigger_chord(&[NoteName(40), NoteName(47)], 0.5, 1.0, -3.0);

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|r| !r.chord));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (mut piano, log) = recording(InstrumentKind::Piano);
        piano.dispose();
        piano.dispose();
        assert!(piano.is_disposed());

        piano.trigger_note(NoteName(60), 0.5, 0.0, 0.0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_kind_ids() {
        for kind in InstrumentKind::ALL {
            assert_eq!(InstrumentKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(InstrumentKind::from_id(" Strings "), Some(InstrumentKind::Strings));
        assert_eq!(InstrumentKind::from_id("theremin"), None);
        assert_eq!(InstrumentKind::Bass.gm_program(), 33);
    }
}
