// MIDI codec - Standard MIDI File export and import
// 480 PPQ, format 1, tick-exact against the sequencer's time base

pub mod export;
pub mod import;
pub mod inference;

pub use export::{export_midi, ExportSummary, MidiExport};
pub use import::{import_midi, MidiImport};
pub use inference::infer_instrument;

/// Magic bytes opening every Standard MIDI File
pub const MIDI_MAGIC: &[u8; 4] = b"MThd";

/// General MIDI percussion channel (channel 10, zero-based 9)
pub const DRUM_CHANNEL: u8 = 9;

/// Codec error types
#[derive(Debug, thiserror::Error)]
pub enum MidiCodecError {
    #[error("Not a MIDI file: missing MThd header")]
    NotAMidiFile,

    #[error("Failed to parse MIDI data: {0}")]
    Parse(#[from] midly::Error),

    #[error("MIDI file contains no notes")]
    NoNotes,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MidiCodecError {
    /// Malformed input, as opposed to a valid but empty file
    pub fn is_format_error(&self) -> bool {
        matches!(self, MidiCodecError::NotAMidiFile | MidiCodecError::Parse(_))
    }
}
