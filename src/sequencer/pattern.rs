// Pattern - Step sequencer grid
// A pattern is a set of channels, each a row of on/off steps on a 16th-note grid

use crate::project::PatternId;
use crate::sequencer::timeline::TICKS_PER_QUARTER;
use serde::{Deserialize, Serialize};

/// Ticks covered by one step (a sixteenth note)
pub const TICKS_PER_STEP: u64 = TICKS_PER_QUARTER / 4;

/// Default number of steps for a new pattern (one 4/4 bar)
pub const DEFAULT_STEPS: usize = 16;

/// One row of the step grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternChannel {
    pub id: String,
    pub steps: Vec<bool>,
    pub volume: f32,
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
}

impl PatternChannel {
    pub fn new(id: impl Into<String>, steps: usize) -> Self {
        Self {
            id: id.into(),
            steps: vec![false; steps],
            volume: 0.8,
            pan: 0.0,
            mute: false,
            solo: false,
        }
    }

    /// Ticks (relative to the pattern start) of every active step
    pub fn active_ticks(&self) -> impl Iterator<Item = u64> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(index, _)| step_to_tick(index))
    }
}

/// A step sequencer pattern
///
/// `steps` is always a positive multiple of 4 and every channel's step row
/// has exactly `steps` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier
    pub id: PatternId,

    /// Pattern name
    pub name: String,

    steps: usize,

    channels: Vec<PatternChannel>,
}

impl Pattern {
    /// Create a new empty pattern, rounding `steps` up to a multiple of 4
    pub fn new(id: PatternId, name: impl Into<String>, steps: usize) -> Self {
        Self {
            id,
            name: name.into(),
            steps: normalize_steps(steps),
            channels: Vec::new(),
        }
    }

    /// Create a new pattern with the default length (16 steps)
    pub fn new_default(id: PatternId, name: impl Into<String>) -> Self {
        Self::new(id, name, DEFAULT_STEPS)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn channels(&self) -> &[PatternChannel] {
        &self.channels
    }

    pub fn channel(&self, id: &str) -> Option<&PatternChannel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Add a channel, padding or truncating its row to the pattern length
    pub fn add_channel(&mut self, mut channel: PatternChannel) {
        channel.steps.resize(self.steps, false);
        self.channels.push(channel);
    }

    pub fn remove_channel(&mut self, id: &str) -> Option<PatternChannel> {
        let index = self.channels.iter().position(|c| c.id == id)?;
        Some(self.channels.remove(index))
    }

    /// Change the step count; existing rows keep their leading steps
    pub fn resize(&mut self, steps: usize) {
        self.steps = normalize_steps(steps);
        for channel in &mut self.channels {
            channel.steps.resize(self.steps, false);
        }
    }

    /// Flip a step. Returns the new state, or None if channel/step is unknown.
    pub fn toggle_step(&mut self, channel_id: &str, step: usize) -> Option<bool> {
        let channel = self.channels.iter_mut().find(|c| c.id == channel_id)?;
        let cell = channel.steps.get_mut(step)?;
        *cell = !*cell;
        Some(*cell)
    }

    /// Pattern length in ticks
    pub fn length_ticks(&self) -> u64 {
        self.steps as u64 * TICKS_PER_STEP
    }

    /// Channels audible under mute/solo rules
    pub fn audible_channels(&self) -> impl Iterator<Item = &PatternChannel> {
        let any_solo = self.channels.iter().any(|c| c.solo);
        self.channels
            .iter()
            .filter(move |c| !c.mute && (!any_solo || c.solo))
    }

    /// Restore the length invariant after deserialization or external edits
    pub(crate) fn normalize(&mut self) {
        self.resize(self.steps);
    }
}

/// Tick offset of a step index on the 16th-note grid
pub fn step_to_tick(step: usize) -> u64 {
    step as u64 * TICKS_PER_STEP
}

fn normalize_steps(steps: usize) -> usize {
    steps.max(4).div_ceil(4) * 4
}
