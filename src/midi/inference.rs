// Instrument inference for imported tracks
// Track name keyword -> GM program family -> pitch range -> piano

use crate::instrument::InstrumentKind;

const NAME_KEYWORDS: &[(&str, InstrumentKind)] = &[
    ("piano", InstrumentKind::Piano),
    ("keys", InstrumentKind::Piano),
    ("rhodes", InstrumentKind::Piano),
    ("bass", InstrumentKind::Bass),
    ("string", InstrumentKind::Strings),
    ("violin", InstrumentKind::Strings),
    ("viola", InstrumentKind::Strings),
    ("cello", InstrumentKind::Strings),
    ("orchestra", InstrumentKind::Strings),
    ("guitar", InstrumentKind::Guitar),
    ("gtr", InstrumentKind::Guitar),
    ("organ", InstrumentKind::Organ),
    ("brass", InstrumentKind::Brass),
    ("trumpet", InstrumentKind::Brass),
    ("trombone", InstrumentKind::Brass),
    ("horn", InstrumentKind::Brass),
    ("sax", InstrumentKind::Brass),
    ("lead", InstrumentKind::Lead),
    ("synth", InstrumentKind::Lead),
    ("melody", InstrumentKind::Lead),
    ("pad", InstrumentKind::Pad),
    ("choir", InstrumentKind::Pad),
];

/// Names that always mean percussion
pub fn is_percussion_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.contains("drum") || name.contains("perc")
}

/// First keyword found in the track name
pub fn kind_from_name(name: &str) -> Option<InstrumentKind> {
    let name = name.to_ascii_lowercase();
    NAME_KEYWORDS
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
        .map(|(_, kind)| *kind)
}

/// General MIDI program family (0-based program number)
pub fn kind_from_program(program: u8) -> InstrumentKind {
    match program {
        0..=15 => InstrumentKind::Piano,
        16..=23 => InstrumentKind::Organ,
        24..=31 => InstrumentKind::Guitar,
        32..=39 => InstrumentKind::Bass,
        40..=55 => InstrumentKind::Strings,
        56..=63 => InstrumentKind::Brass,
        64..=87 => InstrumentKind::Lead,
        88..=103 => InstrumentKind::Pad,
        104..=111 => InstrumentKind::Guitar,
        112..=119 => InstrumentKind::Drums,
        _ => InstrumentKind::Piano,
    }
}

/// Average pitch below 45 is bass, above 72 strings, anything else piano
pub fn kind_from_pitch_range(pitches: &[u8]) -> InstrumentKind {
    if pitches.is_empty() {
        return InstrumentKind::Piano;
    }
    let average = pitches.iter().map(|&p| p as f64).sum::<f64>() / pitches.len() as f64;
    if average < 45.0 {
        InstrumentKind::Bass
    } else if average > 72.0 {
        InstrumentKind::Strings
    } else {
        InstrumentKind::Piano
    }
}

/// Pick an instrument for an imported track
///
/// Percussion (drum channel or a drum/perc name) wins over every other
/// signal. Never fails: the last resort is piano.
pub fn infer_instrument(
    name: Option<&str>,
    program: Option<u8>,
    pitches: &[u8],
    on_drum_channel: bool,
) -> InstrumentKind {
    if on_drum_channel || name.is_some_and(is_percussion_name) {
        return InstrumentKind::Drums;
    }
    if let Some(kind) = name.and_then(kind_from_name) {
        return kind;
    }
    if let Some(program) = program {
        return kind_from_program(program);
    }
    kind_from_pitch_range(pitches)
}
