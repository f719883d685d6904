// Types for the project data model and its persistence

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::midi::MidiImport;
use crate::project::ProjectError;
use crate::sequencer::note::MidiNote;
use crate::sequencer::pattern::Pattern;
use crate::sequencer::timeline::{TimeBase, Tempo, TimeSignature};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh random identifier
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), uuid::Uuid::new_v4()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// Track identifier
    TrackId,
    "track"
);
entity_id!(
    /// MIDI clip identifier
    ClipId,
    "clip"
);
entity_id!(
    /// Arrangement placement identifier
    ArrangementClipId,
    "arr"
);
entity_id!(
    /// Step pattern identifier
    PatternId,
    "pattern"
);

/// Project version information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProjectVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for ProjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Project name
    pub name: String,
    /// Version of the project format
    pub version: ProjectVersion,
    /// Creation timestamp
    pub created: String,
    /// Last modification timestamp
    pub modified: String,
    /// Author/creator information
    #[serde(default)]
    pub author: Option<String>,
    /// Project description
    #[serde(default)]
    pub description: Option<String>,
}

impl ProjectMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.into(),
            version: ProjectVersion::current(),
            created: now.clone(),
            modified: now,
            author: None,
            description: None,
        }
    }
}

/// Track type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    /// Melodic instrument track
    #[default]
    Instrument,
    /// Percussion track, exported on MIDI channel 10
    Drums,
    /// Parameter automation, never scheduled
    Automation,
}

/// Track configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// Track identifier
    pub id: TrackId,
    /// Track name
    pub name: String,
    /// Track color (optional, for UI)
    #[serde(default)]
    pub color: Option<[u8; 3]>,
    /// Track type
    pub track_type: TrackType,
    /// Instrument identifier, resolved through the instrument registry
    #[serde(default)]
    pub instrument: Option<String>,
    /// Track volume (0.0 - 1.0)
    pub volume: f32,
    /// Track pan (-1.0 left, 0.0 center, 1.0 right)
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub arm: bool,
}

impl Track {
    pub fn new(name: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            id: TrackId::generate(),
            name: name.into(),
            color: None,
            track_type,
            instrument: None,
            volume: 0.8,
            pan: 0.0,
            mute: false,
            solo: false,
            arm: false,
        }
    }

    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    /// Clamp volume into [0, 1] and pan into [-1, 1]
    pub fn clamp_levels(&mut self) {
        self.volume = if self.volume.is_nan() { 0.0 } else { self.volume.clamp(0.0, 1.0) };
        self.pan = if self.pan.is_nan() { 0.0 } else { self.pan.clamp(-1.0, 1.0) };
    }
}

/// Note container. Only audible when placed by an [`ArrangementClip`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MidiClip {
    pub id: ClipId,
    pub track_id: TrackId,
    /// Default placement for new arrangement clips
    #[serde(default)]
    pub start_bar: u32,
    pub length_bars: u32,
    pub notes: Vec<MidiNote>,
}

impl MidiClip {
    pub fn new(track_id: TrackId, length_bars: u32, notes: Vec<MidiNote>) -> Self {
        Self {
            id: ClipId::generate(),
            track_id,
            start_bar: 0,
            length_bars: length_bars.max(1),
            notes,
        }
    }

    /// Notes sorted by start tick, then pitch
    pub fn sorted_notes(&self) -> Vec<MidiNote> {
        let mut notes = self.notes.clone();
        notes.sort_by_key(|n| (n.start_tick, n.pitch));
        notes
    }
}

/// What an arrangement clip places on the timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClipSource {
    Midi(ClipId),
    Pattern(PatternId),
}

/// Placement of a MIDI clip or pattern at an absolute bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArrangementClip {
    pub id: ArrangementClipId,
    pub track_id: TrackId,
    pub start_bar: u32,
    pub length_bars: u32,
    pub source: ClipSource,
}

impl ArrangementClip {
    pub fn midi(track_id: TrackId, clip: &MidiClip, start_bar: u32) -> Self {
        Self {
            id: ArrangementClipId::generate(),
            track_id,
            start_bar,
            length_bars: clip.length_bars,
            source: ClipSource::Midi(clip.id.clone()),
        }
    }

    pub fn pattern(track_id: TrackId, pattern_id: PatternId, start_bar: u32, length_bars: u32) -> Self {
        Self {
            id: ArrangementClipId::generate(),
            track_id,
            start_bar,
            length_bars: length_bars.max(1),
            source: ClipSource::Pattern(pattern_id),
        }
    }

    pub fn midi_clip_id(&self) -> Option<&ClipId> {
        match &self.source {
            ClipSource::Midi(id) => Some(id),
            ClipSource::Pattern(_) => None,
        }
    }

    pub fn end_bar(&self) -> u32 {
        self.start_bar.saturating_add(self.length_bars)
    }
}

/// New entities to insert in one step (MIDI import, agent proposals)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectAdditions {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub midi_clips: Vec<MidiClip>,
    #[serde(default)]
    pub arrangement_clips: Vec<ArrangementClip>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

impl ProjectAdditions {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
            && self.midi_clips.is_empty()
            && self.arrangement_clips.is_empty()
            && self.patterns.is_empty()
    }

    pub fn note_count(&self) -> usize {
        self.midi_clips.iter().map(|c| c.notes.len()).sum()
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one in-memory project value
///
/// Never persisted. Loaded and cloned projects get a fresh identity, so two
/// projects with equal revisions are still told apart.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ProjectInstance(u64);

impl ProjectInstance {
    fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for ProjectInstance {
    fn default() -> Self {
        Self::next()
    }
}

impl Clone for ProjectInstance {
    fn clone(&self) -> Self {
        Self::next()
    }
}

/// Main project structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project metadata
    pub metadata: ProjectMetadata,
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    /// All tracks, in display order
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub midi_clips: Vec<MidiClip>,
    #[serde(default)]
    pub arrangement_clips: Vec<ArrangementClip>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    /// Explicit song length in bars; derived from the arrangement when None
    #[serde(default)]
    pub song_length: Option<u32>,
    #[serde(skip)]
    revision: u64,
    #[serde(skip)]
    instance: ProjectInstance,
}

impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled Project")
    }
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ProjectMetadata::new(name),
            tempo: Tempo::default(),
            time_signature: TimeSignature::default(),
            tracks: Vec::new(),
            midi_clips: Vec::new(),
            arrangement_clips: Vec::new(),
            patterns: Vec::new(),
            song_length: None,
            revision: 0,
            instance: ProjectInstance::default(),
        }
    }

    /// Counter bumped by every mutating method. Playback compares it to
    /// decide when to reschedule.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Identity of this in-memory value; paired with [`Project::revision`]
    /// it pins down exactly what a schedule was built from
    pub fn instance(&self) -> u64 {
        self.instance.id()
    }

    /// Mark the project as changed after editing public fields directly
    pub fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.metadata.modified = chrono::Utc::now().to_rfc3339();
    }

    pub fn time_base(&self) -> TimeBase {
        TimeBase::new(self.tempo, self.time_signature)
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
        self.touch();
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        self.touch();
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| &t.id == id)
    }

    pub fn track_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.revision = self.revision.wrapping_add(1);
        self.tracks.iter_mut().find(|t| &t.id == id)
    }

    pub fn midi_clip(&self, id: &ClipId) -> Option<&MidiClip> {
        self.midi_clips.iter().find(|c| &c.id == id)
    }

    pub fn pattern(&self, id: &PatternId) -> Option<&Pattern> {
        self.patterns.iter().find(|p| &p.id == id)
    }

    pub fn arrangement_clips_for<'a>(
        &'a self,
        track_id: &'a TrackId,
    ) -> impl Iterator<Item = &'a ArrangementClip> + 'a {
        self.arrangement_clips
            .iter()
            .filter(move |c| &c.track_id == track_id)
    }

    /// True when any track is soloed
    pub fn has_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// Mute/solo rule: unmuted, and soloed whenever any track is soloed
    pub fn is_track_audible(&self, track: &Track) -> bool {
        !track.mute && (!self.has_solo() || track.solo)
    }

    /// Song length in bars: explicit value, or the end of the last
    /// arrangement clip
    pub fn song_length_bars(&self) -> u32 {
        self.song_length.unwrap_or_else(|| {
            self.arrangement_clips
                .iter()
                .map(ArrangementClip::end_bar)
                .max()
                .unwrap_or(0)
        })
    }

    pub fn add_track(&mut self, mut track: Track) -> Result<(), ProjectError> {
        if self.track(&track.id).is_some() {
            return Err(ProjectError::InvalidStructure(format!(
                "Duplicate track ID: {}",
                track.id
            )));
        }
        track.clamp_levels();
        self.tracks.push(track);
        self.touch();
        Ok(())
    }

    pub fn add_midi_clip(&mut self, clip: MidiClip) -> Result<(), ProjectError> {
        if self.track(&clip.track_id).is_none() {
            return Err(ProjectError::InvalidStructure(format!(
                "MIDI clip {} references missing track {}",
                clip.id, clip.track_id
            )));
        }
        if self.midi_clip(&clip.id).is_some() {
            return Err(ProjectError::InvalidStructure(format!(
                "Duplicate MIDI clip ID: {}",
                clip.id
            )));
        }
        self.midi_clips.push(clip);
        self.touch();
        Ok(())
    }

    pub fn add_pattern(&mut self, mut pattern: Pattern) -> Result<(), ProjectError> {
        if self.pattern(&pattern.id).is_some() {
            return Err(ProjectError::InvalidStructure(format!(
                "Duplicate pattern ID: {}",
                pattern.id
            )));
        }
        pattern.normalize();
        self.patterns.push(pattern);
        self.touch();
        Ok(())
    }

    pub fn add_arrangement_clip(&mut self, clip: ArrangementClip) -> Result<(), ProjectError> {
        if self.track(&clip.track_id).is_none() {
            return Err(ProjectError::InvalidStructure(format!(
                "Arrangement clip {} references missing track {}",
                clip.id, clip.track_id
            )));
        }
        if self.arrangement_clips.iter().any(|c| c.id == clip.id) {
            return Err(ProjectError::InvalidStructure(format!(
                "Duplicate arrangement clip ID: {}",
                clip.id
            )));
        }
        match &clip.source {
            ClipSource::Midi(id) if self.midi_clip(id).is_none() => {
                return Err(ProjectError::InvalidStructure(format!(
                    "Arrangement clip {} references missing MIDI clip {}",
                    clip.id, id
                )));
            }
            ClipSource::Pattern(id) if self.pattern(id).is_none() => {
                return Err(ProjectError::InvalidStructure(format!(
                    "Arrangement clip {} references missing pattern {}",
                    clip.id, id
                )));
            }
            _ => {}
        }
        self.arrangement_clips.push(clip);
        self.touch();
        Ok(())
    }

    /// Insert every addition or none of them
    pub fn apply_additions(&mut self, additions: ProjectAdditions) -> Result<(), ProjectError> {
        let mut staged = self.clone();
        for track in additions.tracks {
            staged.add_track(track)?;
        }
        for pattern in additions.patterns {
            staged.add_pattern(pattern)?;
        }
        for clip in additions.midi_clips {
            staged.add_midi_clip(clip)?;
        }
        for clip in additions.arrangement_clips {
            staged.add_arrangement_clip(clip)?;
        }
        *self = staged;
        Ok(())
    }

    /// Take over an imported file's tempo and meter and merge its tracks.
    /// Leaves the project untouched when any addition is rejected.
    pub fn apply_midi_import(&mut self, import: MidiImport) -> Result<(), ProjectError> {
        let mut staged = self.clone();
        staged.tempo = import.tempo;
        staged.time_signature = import.time_signature;
        staged.apply_additions(import.additions)?;
        *self = staged;
        Ok(())
    }

    /// Swap a clip's notes wholesale
    pub fn replace_clip_notes(&mut self, clip_id: &ClipId, notes: Vec<MidiNote>) -> Result<(), ProjectError> {
        let clip = self
            .midi_clips
            .iter_mut()
            .find(|c| &c.id == clip_id)
            .ok_or_else(|| ProjectError::InvalidStructure(format!("Unknown MIDI clip {}", clip_id)))?;
        clip.notes = notes;
        self.touch();
        Ok(())
    }

    /// Remove a track and everything placed on or owned by it
    pub fn remove_track(&mut self, id: &TrackId) -> Option<Track> {
        let index = self.tracks.iter().position(|t| &t.id == id)?;
        let track = self.tracks.remove(index);

        let removed_clips: HashSet<ClipId> = self
            .midi_clips
            .iter()
            .filter(|c| &c.track_id == id)
            .map(|c| c.id.clone())
            .collect();
        self.midi_clips.retain(|c| &c.track_id != id);
        self.arrangement_clips.retain(|c| {
            &c.track_id != id
                && c.midi_clip_id().is_none_or(|clip| !removed_clips.contains(clip))
        });

        self.touch();
        Some(track)
    }

    /// Total number of notes across all MIDI clips
    pub fn note_count(&self) -> usize {
        self.midi_clips.iter().map(|c| c.notes.len()).sum()
    }
}
