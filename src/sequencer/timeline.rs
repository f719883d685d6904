// Timeline - Musical time representation
// Single source of truth for tick <-> bar <-> second arithmetic

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticks per quarter note (PPQN). Fixed MIDI resolution, never varies.
pub const TICKS_PER_QUARTER: u64 = 480;

/// Ticks per bar on the legacy 4/4-only path
pub const LEGACY_TICKS_PER_BAR: u64 = 1920;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSignature")]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

#[derive(Deserialize)]
#[serde(rename = "TimeSignature")]
struct RawTimeSignature {
    numerator: u8,
    denominator: u8,
}

impl TryFrom<RawTimeSignature> for TimeSignature {
    type Error = String;

    fn try_from(raw: RawTimeSignature) -> Result<Self, Self::Error> {
        Self::try_new(raw.numerator, raw.denominator).ok_or_else(|| {
            format!(
                "invalid time signature {}/{}",
                raw.numerator, raw.denominator
            )
        })
    }
}

impl TimeSignature {
    /// Largest denominator that still yields a whole number of ticks per beat
    pub const MAX_DENOMINATOR: u8 = 64;

    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Self {
        assert!(numerator > 0, "Time signature numerator must be > 0");
        assert!(
            denominator.is_power_of_two() && denominator <= Self::MAX_DENOMINATOR,
            "Time signature denominator must be a power of 2 up to 64"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Fallible constructor for values coming from files or edits
    pub fn try_new(numerator: u8, denominator: u8) -> Option<Self> {
        if numerator == 0
            || !denominator.is_power_of_two()
            || denominator > Self::MAX_DENOMINATOR
        {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Ticks in one beat of this signature (480 for quarter-note beats)
    pub fn ticks_per_beat(&self) -> u64 {
        TICKS_PER_QUARTER * 4 / self.denominator as u64
    }

    /// `numerator * 480 * 4 / denominator`
    pub fn ticks_per_bar(&self) -> u64 {
        self.numerator as u64 * self.ticks_per_beat()
    }

    /// Denominator as the power-of-two exponent used by MIDI meta events
    pub fn denominator_exponent(&self) -> u8 {
        self.denominator.trailing_zeros() as u8
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (quarter notes per minute)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 1.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo
    /// BPM must be in range [1.0, 999.0]
    pub fn new(bpm: f64) -> Self {
        assert!(
            (Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm),
            "BPM must be between 1 and 999"
        );
        Self { bpm }
    }

    /// Fallible constructor, rejects NaN and out of range values
    pub fn try_new(bpm: f64) -> Option<Self> {
        (Self::MIN_BPM..=Self::MAX_BPM)
            .contains(&bpm)
            .then_some(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one quarter note in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one bar in seconds at given time signature
    pub fn bar_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        bars_to_seconds(1.0, time_signature, self.bpm)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl TryFrom<f64> for Tempo {
    type Error = String;

    fn try_from(bpm: f64) -> Result<Self, Self::Error> {
        Self::try_new(bpm).ok_or_else(|| format!("tempo {} BPM is out of range", bpm))
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Bars spanned by `ticks`
pub fn ticks_to_bars(ticks: f64, time_signature: &TimeSignature) -> f64 {
    ticks / time_signature.ticks_per_bar() as f64
}

/// Ticks spanned by `bars`
pub fn bars_to_ticks(bars: f64, time_signature: &TimeSignature) -> f64 {
    bars * time_signature.ticks_per_bar() as f64
}

/// `(ticks / 480) * (60 / bpm)`. Independent of the time signature.
pub fn ticks_to_seconds(ticks: f64, bpm: f64) -> f64 {
    (ticks / TICKS_PER_QUARTER as f64) * (60.0 / bpm)
}

/// Exact inverse of [`ticks_to_seconds`]: `seconds * bpm / 60 * 480`
pub fn seconds_to_ticks(seconds: f64, bpm: f64) -> f64 {
    seconds * bpm / 60.0 * TICKS_PER_QUARTER as f64
}

pub fn bars_to_seconds(bars: f64, time_signature: &TimeSignature, bpm: f64) -> f64 {
    ticks_to_seconds(bars_to_ticks(bars, time_signature), bpm)
}

pub fn seconds_to_bars(seconds: f64, time_signature: &TimeSignature, bpm: f64) -> f64 {
    ticks_to_bars(seconds_to_ticks(seconds, bpm), time_signature)
}

/// The one place fractional ticks become integers: round half away from
/// zero, negatives saturate at tick 0.
pub fn round_ticks(ticks: f64) -> u64 {
    if ticks.is_nan() || ticks <= 0.0 {
        return 0;
    }
    ticks.round() as u64
}

/// Tempo plus time signature, the full context needed for conversions.
/// Copy type: any change produces a new value, nothing derived is cached.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeBase {
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
}

impl TimeBase {
    pub fn new(tempo: Tempo, time_signature: TimeSignature) -> Self {
        Self {
            tempo,
            time_signature,
        }
    }

    pub fn ticks_per_bar(&self) -> u64 {
        self.time_signature.ticks_per_bar()
    }

    pub fn ticks_to_seconds(&self, ticks: f64) -> f64 {
        ticks_to_seconds(ticks, self.tempo.bpm())
    }

    pub fn seconds_to_ticks(&self, seconds: f64) -> f64 {
        seconds_to_ticks(seconds, self.tempo.bpm())
    }

    pub fn ticks_to_bars(&self, ticks: f64) -> f64 {
        ticks_to_bars(ticks, &self.time_signature)
    }

    pub fn bars_to_ticks(&self, bars: f64) -> f64 {
        bars_to_ticks(bars, &self.time_signature)
    }

    pub fn bars_to_seconds(&self, bars: f64) -> f64 {
        bars_to_seconds(bars, &self.time_signature, self.tempo.bpm())
    }

    pub fn seconds_to_bars(&self, seconds: f64) -> f64 {
        seconds_to_bars(seconds, &self.time_signature, self.tempo.bpm())
    }

    /// Absolute tick of a bar boundary
    pub fn bar_start_tick(&self, bar: u32) -> u64 {
        bar as u64 * self.ticks_per_bar()
    }
}

/// Musical time representation
/// Represents a position in the timeline using bars, beats, and ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MusicalTime {
    pub bar: u32,  // Bar number (1-based)
    pub beat: u8,  // Beat within bar (1-based)
    pub tick: u16, // Tick within beat (0-based)
}

impl MusicalTime {
    /// Creates a new musical time position
    pub fn new(bar: u32, beat: u8, tick: u16) -> Self {
        Self { bar, beat, tick }
    }

    /// Zero position (bar 1, beat 1, tick 0)
    pub fn zero() -> Self {
        Self::new(1, 1, 0)
    }

    /// Convert to total ticks from start
    pub fn to_total_ticks(&self, time_signature: &TimeSignature) -> u64 {
        let ticks_per_beat = time_signature.ticks_per_beat();
        let bar_0 = self.bar.saturating_sub(1) as u64;
        let beat_0 = self.beat.saturating_sub(1) as u64;

        bar_0 * time_signature.ticks_per_bar() + beat_0 * ticks_per_beat + self.tick as u64
    }

    /// Create from total ticks
    pub fn from_total_ticks(total_ticks: u64, time_signature: &TimeSignature) -> Self {
        let ticks_per_beat = time_signature.ticks_per_beat();
        let ticks_per_bar = time_signature.ticks_per_bar();

        let bar = (total_ticks / ticks_per_bar) + 1;
        let remaining_after_bars = total_ticks % ticks_per_bar;
        let beat = (remaining_after_bars / ticks_per_beat) + 1;
        let tick = remaining_after_bars % ticks_per_beat;

        Self::new(bar as u32, beat as u8, tick as u16)
    }

    /// Position from fractional bars (as reported by the playhead)
    pub fn from_bars(bars: f64, time_signature: &TimeSignature) -> Self {
        let ticks = round_ticks(bars_to_ticks(bars, time_signature));
        Self::from_total_ticks(ticks, time_signature)
    }
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:03}", self.bar, self.beat, self.tick)
    }
}
