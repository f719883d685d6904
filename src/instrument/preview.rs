// Live note preview - Plays a single note through the track's shared instrument

use super::{gain_db, InstrumentRegistry};
use crate::project::Track;
use crate::sequencer::note::{clamp_midi, NoteName};
use crate::sequencer::timeline::ticks_to_seconds;
use tracing::trace;

/// Preview player used by editors when a note is drawn or clicked
#[derive(Debug, Clone, Copy)]
pub struct NotePreview {
    /// Length of a preview note in ticks
    pub duration_ticks: u64,
}

impl Default for NotePreview {
    fn default() -> Self {
        // An eighth note
        Self { duration_ticks: 240 }
    }
}

impl NotePreview {
    /// Trigger `pitch` immediately (`now` is the caller's transport time).
    /// Returns false when the track has no playable instrument.
    pub fn play(
        &self,
        registry: &mut InstrumentRegistry,
        track: &Track,
        pitch: i64,
        velocity: i64,
        bpm: f64,
        now: f64,
    ) -> bool {
        let Some(instrument) = registry.get_or_create(track) else {
            trace!(track = %track.id, "No instrument to preview on");
            return false;
        };

        let duration = ticks_to_seconds(self.duration_ticks as f64, bpm);
        let gain = gain_db(clamp_midi(velocity), track.volume);
        instrument
            .lock()
            .trigger_note(NoteName(clamp_midi(pitch)), duration, now, gain);
        true
    }
}
