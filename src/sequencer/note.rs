// Note representation for the sequencer
// A note is pitch, clip-relative tick position, duration and velocity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest valid MIDI data value (pitch, velocity, controller value)
pub const MIDI_MAX: u8 = 127;

/// Largest clip-relative start or duration a note can carry (about 52 days
/// at 120 BPM). Absolute ticks built from these never overflow `u64`.
pub const MAX_NOTE_TICK: u64 = u32::MAX as u64;

/// Clamp any integer into the MIDI data range [0, 127]
pub fn clamp_midi(value: i64) -> u8 {
    value.clamp(0, MIDI_MAX as i64) as u8
}

/// A note inside a MIDI clip
///
/// Positions are clip-relative ticks at 480 ticks per quarter note.
/// Pitch and velocity are always within [0, 127]: every constructor and the
/// serde path clamp, so no other code needs to re-check them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawMidiNote")]
pub struct MidiNote {
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// Start position relative to the clip start
    pub start_tick: u64,

    /// Duration in ticks, always > 0
    pub duration_tick: u64,

    /// MIDI velocity (0-127, where 127 = maximum)
    pub velocity: u8,

    /// MIDI channel (0-15)
    #[serde(default)]
    pub channel: u8,
}

/// Unvalidated wire form. Agent payloads and hand-edited files may carry
/// out-of-range or negative values.
#[derive(Deserialize)]
#[serde(rename = "MidiNote")]
struct RawMidiNote {
    pitch: i64,
    start_tick: i64,
    duration_tick: i64,
    velocity: i64,
    #[serde(default)]
    channel: i64,
}

impl From<RawMidiNote> for MidiNote {
    fn from(raw: RawMidiNote) -> Self {
        Self::clamped(
            raw.pitch,
            raw.start_tick,
            raw.duration_tick,
            raw.velocity,
            raw.channel,
        )
    }
}

impl MidiNote {
    /// Creates a new note on channel 0. Out-of-range values are clamped,
    /// ticks to [`MAX_NOTE_TICK`].
    pub fn new(pitch: u8, start_tick: u64, duration_tick: u64, velocity: u8) -> Self {
        Self {
            pitch: pitch.min(MIDI_MAX),
            start_tick: start_tick.min(MAX_NOTE_TICK),
            duration_tick: duration_tick.clamp(1, MAX_NOTE_TICK),
            velocity: velocity.min(MIDI_MAX),
            channel: 0,
        }
    }

    /// Builds a note from arbitrary integers, clamping every field
    pub fn clamped(pitch: i64, start_tick: i64, duration_tick: i64, velocity: i64, channel: i64) -> Self {
        Self {
            pitch: clamp_midi(pitch),
            start_tick: start_tick.clamp(0, MAX_NOTE_TICK as i64) as u64,
            duration_tick: duration_tick.clamp(1, MAX_NOTE_TICK as i64) as u64,
            velocity: clamp_midi(velocity),
            channel: channel.clamp(0, 15) as u8,
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel.min(15);
        self
    }

    /// Clip-relative end tick (exclusive)
    pub fn end_tick(&self) -> u64 {
        self.start_tick.saturating_add(self.duration_tick)
    }

    /// Check if this note sounds at a given clip-relative tick
    pub fn contains_tick(&self, tick: u64) -> bool {
        tick >= self.start_tick && tick < self.end_tick()
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> NoteName {
        NoteName(self.pitch)
    }
}

/// Scientific pitch name of a MIDI note number, as instruments expect it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteName(pub u8);

impl NoteName {
    const NAMES: [&'static str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    pub fn pitch(&self) -> u8 {
        self.0
    }

    pub fn octave(&self) -> i32 {
        (self.0 / 12) as i32 - 1
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::NAMES[(self.0 % 12) as usize], self.octave())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_creation() {
        let note = MidiNote::new(60, 0, 480, 100);

        assert_eq!(note.pitch, 60);
        assert_eq!(note.velocity, 100);
        assert_eq!(note.duration_tick, 480);
        assert_eq!(note.channel, 0);
    }

    #[test]
    fn test_note_contains_tick() {
        let note = MidiNote::new(60, 960, 480, 100);

        assert_eq!(note.end_tick(), 1440);
        assert!(note.contains_tick(960));
        assert!(note.contains_tick(1439));
        assert!(!note.contains_tick(1440));
        assert!(!note.contains_tick(0));
    }

    #[test]
    fn test_note_clamping() {
        let note = MidiNote::new(200, 0, 0, 255);
        assert_eq!(note.pitch, 127);
        assert_eq!(note.velocity, 127);
        assert_eq!(note.duration_tick, 1);

        let note = MidiNote::clamped(-5, -100, -1, 300, 99);
        assert_eq!(note.pitch, 0);
        assert_eq!(note.start_tick, 0);
        assert_eq!(note.duration_tick, 1);
        assert_eq!(note.velocity, 127);
        assert_eq!(note.channel, 15);

        let note = MidiNote::clamped(60, i64::MAX, i64::MAX, 100, 0);
        assert_eq!(note.start_tick, MAX_NOTE_TICK);
        assert_eq!(note.duration_tick, MAX_NOTE_TICK);
        assert_eq!(note.end_tick(), 2 * MAX_NOTE_TICK);

        let note = MidiNote::new(60, u64::MAX, u64::MAX, 100);
        assert_eq!((note.start_tick, note.duration_tick), (MAX_NOTE_TICK, MAX_NOTE_TICK));
    }

    #[test]
    fn test_with_channel() {
        let note = MidiNote::new(38, 0, 120, 90).with_channel(9);
        assert_eq!(note.channel, 9);
        assert_eq!(note.with_channel(42).channel, 15);
    }

    #[test]
    fn test_deserialization_clamps() {
        let json = r#"{"pitch":140,"start_tick":-20,"duration_tick":0,"velocity":-3}"#;
        let note: MidiNote = serde_json::from_str(json).unwrap();
        assert_eq!(note, MidiNote::clamped(127, 0, 1, 0, 0));
    }

    #[test]
    fn test_note_name() {
        // Middle C (C4) = MIDI note 60
        assert_eq!(MidiNote::new(60, 0, 1, 100).note_name().to_string(), "C4");

        // A4 (440 Hz) = MIDI note 69
        assert_eq!(NoteName(69).to_string(), "A4");

        // C#5 = MIDI note 73
        assert_eq!(NoteName(73).to_string(), "C#5");

        assert_eq!(NoteName(0).to_string(), "C-1");
        assert_eq!(NoteName(127).to_string(), "G9");
    }
}
