// Project model and persistence
// ZIP container (manifest.json + project.ron), MIDI file import/export, edits

pub mod edits;
pub mod manager;
pub mod serialization;
pub mod types;

pub use edits::{apply_edit, apply_edits, ProjectEdit};
pub use manager::{ImportSummary, ProjectError, ProjectLoadOptions, ProjectManager};
pub use types::{
    ArrangementClip, ArrangementClipId, ClipId, ClipSource, MidiClip, PatternId, Project,
    ProjectAdditions, ProjectInstance, ProjectMetadata, ProjectVersion, Track, TrackId, TrackType,
};

use std::collections::HashSet;
use std::hash::Hash;

const MAX_NAME_LEN: usize = 255;

fn check_name(kind: &str, id: &dyn std::fmt::Display, name: &str) -> Result<(), ProjectError> {
    if name.trim().is_empty() {
        return Err(ProjectError::InvalidStructure(format!(
            "{} {} name cannot be empty",
            kind, id
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ProjectError::InvalidStructure(format!(
            "{} {} name cannot exceed 255 characters",
            kind, id
        )));
    }
    Ok(())
}

fn check_unique<'a, T: Hash + Eq + std::fmt::Display + 'a>(
    kind: &str,
    ids: impl Iterator<Item = &'a T>,
) -> Result<(), ProjectError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ProjectError::InvalidStructure(format!(
                "Duplicate {} ID: {}",
                kind, id
            )));
        }
    }
    Ok(())
}

/// Helper function to validate project structure
pub fn validate_project_structure(project: &Project) -> Result<(), ProjectError> {
    // Check project metadata
    if project.metadata.name.trim().is_empty() {
        return Err(ProjectError::InvalidStructure(
            "Project name cannot be empty".to_string(),
        ));
    }

    if project.metadata.name.len() > MAX_NAME_LEN {
        return Err(ProjectError::InvalidStructure(
            "Project name cannot exceed 255 characters".to_string(),
        ));
    }

    if project.metadata.version.major < 1 {
        return Err(ProjectError::InvalidStructure(
            "Invalid project version".to_string(),
        ));
    }

    check_unique("track", project.tracks.iter().map(|t| &t.id))?;
    check_unique("MIDI clip", project.midi_clips.iter().map(|c| &c.id))?;
    check_unique("arrangement clip", project.arrangement_clips.iter().map(|c| &c.id))?;
    check_unique("pattern", project.patterns.iter().map(|p| &p.id))?;

    // Validate tracks
    for track in &project.tracks {
        check_name("Track", &track.id, &track.name)?;

        if !(0.0..=1.0).contains(&track.volume) {
            return Err(ProjectError::InvalidStructure(format!(
                "Track {} volume must be between 0.0 and 1.0",
                track.id
            )));
        }

        if !(-1.0..=1.0).contains(&track.pan) {
            return Err(ProjectError::InvalidStructure(format!(
                "Track {} pan must be between -1.0 and 1.0",
                track.id
            )));
        }
    }

    // Validate clips
    for clip in &project.midi_clips {
        if project.track(&clip.track_id).is_none() {
            return Err(ProjectError::InvalidStructure(format!(
                "MIDI clip {} references missing track {}",
                clip.id, clip.track_id
            )));
        }
        if clip.length_bars == 0 {
            return Err(ProjectError::InvalidStructure(format!(
                "MIDI clip {} length must be at least 1 bar",
                clip.id
            )));
        }
        if let Some(note) = clip.notes.iter().find(|n| n.duration_tick == 0) {
            return Err(ProjectError::InvalidStructure(format!(
                "Note {} in clip {} has zero duration",
                note.note_name(),
                clip.id
            )));
        }
    }

    for clip in &project.arrangement_clips {
        if project.track(&clip.track_id).is_none() {
            return Err(ProjectError::InvalidStructure(format!(
                "Arrangement clip {} references missing track {}",
                clip.id, clip.track_id
            )));
        }
        let source_exists = match &clip.source {
            ClipSource::Midi(id) => project.midi_clip(id).is_some(),
            ClipSource::Pattern(id) => project.pattern(id).is_some(),
        };
        if !source_exists {
            return Err(ProjectError::InvalidStructure(format!(
                "Arrangement clip {} references missing source {:?}",
                clip.id, clip.source
            )));
        }
    }

    // Validate patterns
    for pattern in &project.patterns {
        check_name("Pattern", &pattern.id, &pattern.name)?;

        if pattern.steps() == 0 || pattern.steps() % 4 != 0 {
            return Err(ProjectError::InvalidStructure(format!(
                "Pattern {} step count must be a positive multiple of 4",
                pattern.id
            )));
        }

        if let Some(channel) = pattern
            .channels()
            .iter()
            .find(|c| c.steps.len() != pattern.steps())
        {
            return Err(ProjectError::InvalidStructure(format!(
                "Pattern {} channel {} has {} steps, expected {}",
                pattern.id,
                channel.id,
                channel.steps.len(),
                pattern.steps()
            )));
        }
    }

    Ok(())
}
