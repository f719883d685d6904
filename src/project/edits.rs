// Structured project edits from the UI or an external agent
// A batch applies completely or not at all

use crate::project::types::*;
use crate::project::ProjectError;
use crate::sequencer::note::MidiNote;
use crate::sequencer::pattern::Pattern;
use crate::sequencer::timeline::{Tempo, TimeSignature};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One edit operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProjectEdit {
    AddTrack {
        /// Caller-chosen id so later edits in the batch can reference it
        #[serde(default)]
        id: Option<TrackId>,
        name: String,
        #[serde(default)]
        track_type: TrackType,
        #[serde(default)]
        instrument: Option<String>,
        #[serde(default)]
        volume: Option<f32>,
        #[serde(default)]
        pan: Option<f32>,
    },
    /// New clip placed on the arrangement at `start_bar`
    AddMidiClip {
        track_id: TrackId,
        #[serde(default)]
        start_bar: u32,
        /// Derived from the last note end when absent
        #[serde(default)]
        length_bars: Option<u32>,
        notes: Vec<MidiNote>,
    },
    AddPattern {
        track_id: TrackId,
        pattern: Pattern,
        #[serde(default)]
        start_bar: u32,
        #[serde(default = "default_pattern_bars")]
        length_bars: u32,
    },
    ReplaceNotes {
        clip_id: ClipId,
        notes: Vec<MidiNote>,
    },
    RemoveTrack {
        track_id: TrackId,
    },
    SetTempo {
        bpm: f64,
    },
    SetTimeSignature {
        numerator: u8,
        denominator: u8,
    },
}

fn default_pattern_bars() -> u32 {
    1
}

/// Apply a single edit in place. On error the project may be partially
/// edited; use [`apply_edits`] for atomic batches.
pub fn apply_edit(project: &mut Project, edit: ProjectEdit) -> Result<(), ProjectError> {
    match edit {
        ProjectEdit::AddTrack {
            id,
            name,
            track_type,
            instrument,
            volume,
            pan,
        } => {
            let mut track = Track::new(name, track_type);
            if let Some(id) = id {
                track.id = id;
            }
            track.instrument = instrument;
            if let Some(volume) = volume {
                track.volume = volume;
            }
            if let Some(pan) = pan {
                track.pan = pan;
            }
            project.add_track(track)
        }
        ProjectEdit::AddMidiClip {
            track_id,
            start_bar,
            length_bars,
            notes,
        } => {
            let ticks_per_bar = project.time_signature.ticks_per_bar();
            let length_bars = length_bars.unwrap_or_else(|| {
                let span = notes.iter().map(MidiNote::end_tick).max().unwrap_or(0);
                u32::try_from(span.div_ceil(ticks_per_bar)).unwrap_or(u32::MAX)
            });
            let clip = MidiClip::new(track_id.clone(), length_bars, notes);
            let placement = ArrangementClip::midi(track_id, &clip, start_bar);
            project.add_midi_clip(clip)?;
            project.add_arrangement_clip(placement)
        }
        ProjectEdit::AddPattern {
            track_id,
            pattern,
            start_bar,
            length_bars,
        } => {
            let placement =
                ArrangementClip::pattern(track_id, pattern.id.clone(), start_bar, length_bars);
            project.add_pattern(pattern)?;
            project.add_arrangement_clip(placement)
        }
        ProjectEdit::ReplaceNotes { clip_id, notes } => project.replace_clip_notes(&clip_id, notes),
        ProjectEdit::RemoveTrack { track_id } => project
            .remove_track(&track_id)
            .map(|_| ())
            .ok_or_else(|| ProjectError::InvalidStructure(format!("Unknown track {}", track_id))),
        ProjectEdit::SetTempo { bpm } => {
            if bpm.is_nan() {
                return Err(ProjectError::InvalidStructure("Tempo is not a number".to_string()));
            }
            project.set_tempo(Tempo::new(bpm.clamp(Tempo::MIN_BPM, Tempo::MAX_BPM)));
            Ok(())
        }
        ProjectEdit::SetTimeSignature {
            numerator,
            denominator,
        } => {
            let time_signature = TimeSignature::try_new(numerator, denominator).ok_or_else(|| {
                ProjectError::InvalidStructure(format!(
                    "Invalid time signature {}/{}",
                    numerator, denominator
                ))
            })?;
            project.set_time_signature(time_signature);
            Ok(())
        }
    }
}

/// Apply every edit or none of them
pub fn apply_edits(
    project: &mut Project,
    edits: impl IntoIterator<Item = ProjectEdit>,
) -> Result<usize, ProjectError> {
    let mut staged = project.clone();
    let mut applied = 0;
    for edit in edits {
        apply_edit(&mut staged, edit)?;
        applied += 1;
    }
    *project = staged;
    debug!(applied, "Project edits applied");
    Ok(applied)
}

/// Parse a JSON array of edits
pub fn edits_from_json(json_data: &str) -> Result<Vec<ProjectEdit>, ProjectError> {
    serde_json::from_str(json_data)
        .map_err(|e| ProjectError::SerializationError(format!("Invalid project edits: {}", e)))
}
