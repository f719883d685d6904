// Seqdaw - Library exports for the CLI, tests and benchmarks

pub mod config;
pub mod instrument;
pub mod messaging;
pub mod midi;
pub mod project;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use config::{CodecConfig, EngineConfig, PlaybackConfig, SchedulerConfig};
pub use instrument::{Instrument, InstrumentKind, InstrumentRegistry, NotePreview};
pub use messaging::{create_playhead_channel, PlayheadConsumer, PlayheadProducer};
pub use midi::{export_midi, import_midi, MidiCodecError, MidiExport, MidiImport};
pub use project::{Project, ProjectEdit, ProjectError, ProjectManager};
pub use sequencer::{
    EventScheduler, MidiNote, MusicalTime, PlaybackState, PlayheadReporter, PlayheadUpdate,
    SequencerPlayer, Tempo, TimeBase, TimeSignature, Transport, TransportClock, TransportState,
};
