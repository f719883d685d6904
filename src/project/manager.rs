// Project manager for loading and saving projects

use crate::config::CodecConfig;
use crate::instrument::InstrumentKind;
use crate::midi::{export_midi, import_midi, ExportSummary, MidiCodecError};
use crate::project::serialization::*;
use crate::project::types::*;
use crate::sequencer::pattern::Pattern;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::{ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const PROJECT_ENTRY: &str = "project.ron";

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("File system error: {0}")]
    FileSystemError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid project format version")]
    InvalidVersion,

    #[error("Missing required files in project")]
    MissingFiles,

    #[error("Project validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MIDI error: {0}")]
    Codec(#[from] MidiCodecError),
}

/// Options for loading a project
#[derive(Debug, Clone)]
pub struct ProjectLoadOptions {
    /// Whether to validate the project structure
    pub validate: bool,
}

impl Default for ProjectLoadOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Outcome of merging a MIDI file into a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub tracks: usize,
    pub notes: usize,
}

/// Project manager - handles saving/loading projects and MIDI files
pub struct ProjectManager {
    codec: CodecConfig,
}

impl ProjectManager {
    /// Create a new project manager
    pub fn new(codec: CodecConfig) -> Self {
        Self { codec }
    }

    pub fn codec_config(&self) -> &CodecConfig {
        &self.codec
    }

    /// Create a new project with one empty piano track and a default pattern
    pub fn create_new_project(&self, name: String) -> Project {
        let mut project = Project::new(name);

        let mut track = Track::new("Track 1", TrackType::Instrument)
            .with_instrument(InstrumentKind::Piano.id());
        track.color = Some([100, 150, 200]);
        project.tracks.push(track);
        project
            .patterns
            .push(Pattern::new_default(PatternId::generate(), "Default Pattern"));

        project
    }

    /// Save project to a ZIP container holding `manifest.json` and `project.ron`
    pub fn save_project<P: AsRef<Path>>(
        &self,
        project: &Project,
        project_path: P,
    ) -> Result<(), ProjectError> {
        let project_path = project_path.as_ref();
        if let Some(parent) = project_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProjectError::FileSystemError(format!("Failed to create project directory: {}", e))
            })?;
        }

        let manifest_json = serialize_metadata_to_json(&project.metadata)?;
        let project_ron = serialize_to_ron(project)?;

        let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        zip_writer.start_file(MANIFEST_ENTRY, options)?;
        zip_writer.write_all(manifest_json.as_bytes())?;
        zip_writer.start_file(PROJECT_ENTRY, options)?;
        zip_writer.write_all(project_ron.as_bytes())?;
        let archive = zip_writer.finish()?.into_inner();

        std::fs::write(project_path, &archive).map_err(|e| {
            ProjectError::FileSystemError(format!("Failed to write project file: {}", e))
        })?;

        info!(
            path = %project_path.display(),
            tracks = project.tracks.len(),
            bytes = archive.len(),
            "Project saved"
        );
        Ok(())
    }

    /// Load project from a ZIP container
    ///
    /// Out-of-range track levels are clamped and pattern rows resized
    /// before validation runs.
    pub fn load_project<P: AsRef<Path>>(
        &self,
        project_path: P,
        options: &ProjectLoadOptions,
    ) -> Result<Project, ProjectError> {
        let project_path = project_path.as_ref();
        let bytes = std::fs::read(project_path).map_err(|e| {
            ProjectError::FileSystemError(format!("Failed to open project file: {}", e))
        })?;
        let mut zip_archive = ZipArchive::new(Cursor::new(bytes))?;

        let manifest_json = read_entry(&mut zip_archive, MANIFEST_ENTRY)?;
        let metadata = deserialize_metadata_from_json(&manifest_json)?;

        let project_ron = read_entry(&mut zip_archive, PROJECT_ENTRY)?;
        let mut project = deserialize_from_ron(&project_ron)?;

        if project.metadata.version.major > ProjectVersion::current().major {
            return Err(ProjectError::InvalidVersion);
        }

        // Manifest wins over the copy embedded in project.ron
        project.metadata = metadata;
        for track in &mut project.tracks {
            track.clamp_levels();
        }
        for pattern in &mut project.patterns {
            pattern.normalize();
        }

        if options.validate {
            crate::project::validate_project_structure(&project)
                .map_err(|e| ProjectError::ValidationFailed(e.to_string()))?;
        }

        debug!(path = %project_path.display(), name = %project.metadata.name, "Project loaded");
        Ok(project)
    }

    /// Decode a MIDI file and merge it into `project`
    ///
    /// The project adopts the file's tempo and time signature. Nothing
    /// changes when reading, decoding or merging fails.
    pub fn import_midi_file<P: AsRef<Path>>(
        &self,
        project: &mut Project,
        midi_path: P,
    ) -> Result<ImportSummary, ProjectError> {
        let bytes = std::fs::read(midi_path.as_ref())?;
        let import = import_midi(&bytes)?;
        let summary = ImportSummary {
            tracks: import.track_count(),
            notes: import.note_count(),
        };
        project.apply_midi_import(import)?;
        Ok(summary)
    }

    /// Build a fresh project from a MIDI file, named after the file
    pub fn project_from_midi_file<P: AsRef<Path>>(&self, midi_path: P) -> Result<Project, ProjectError> {
        let midi_path = midi_path.as_ref();
        let name = midi_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.trim().is_empty())
            .unwrap_or_else(|| "Imported Project".to_string());

        let mut project = Project::new(name);
        self.import_midi_file(&mut project, midi_path)?;
        Ok(project)
    }

    /// Encode the project as a Standard MIDI File on disk
    pub fn export_midi_file<P: AsRef<Path>>(
        &self,
        project: &Project,
        midi_path: P,
    ) -> Result<ExportSummary, ProjectError> {
        let export = export_midi(project, &self.codec)?;
        std::fs::write(midi_path.as_ref(), &export.bytes).map_err(|e| {
            ProjectError::FileSystemError(format!("Failed to write MIDI file: {}", e))
        })?;
        Ok(export.summary)
    }
}

impl Default for ProjectManager {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    name: &str,
) -> Result<String, ProjectError> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => ProjectError::MissingFiles,
        other => ProjectError::Zip(other),
    })?;
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(contents)
}
