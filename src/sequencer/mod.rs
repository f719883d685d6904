// Sequencer module
// Time base, transport, scheduling and playhead reporting

pub mod note;
pub mod pattern;
pub mod player;
pub mod playhead;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use note::{MidiNote, NoteName};
pub use pattern::{Pattern, PatternChannel};
pub use player::{PlaybackState, SequencerPlayer};
pub use playhead::{PlayheadReporter, PlayheadUpdate};
pub use scheduler::{EventScheduler, PlanContext, ScheduleSummary, Trigger, TriggerGroup};
pub use timeline::{MusicalTime, Tempo, TimeBase, TimeSignature, TICKS_PER_QUARTER};
pub use transport::{EventCallback, EventHandle, Transport, TransportClock, TransportState};
