// MIDI import - Standard MIDI File bytes to project additions

use super::{inference, MidiCodecError, DRUM_CHANNEL, MIDI_MAGIC};
use crate::instrument::InstrumentKind;
use crate::project::{ArrangementClip, MidiClip, ProjectAdditions, Track, TrackType};
use crate::sequencer::note::MidiNote;
use crate::sequencer::timeline::{round_ticks, seconds_to_ticks, Tempo, TimeSignature};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, instrument};

/// Tempo of files without a tempo event, in microseconds per quarter note
const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Everything recovered from one file, ready to merge into a project
#[derive(Debug, Clone)]
pub struct MidiImport {
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub additions: ProjectAdditions,
}

impl MidiImport {
    pub fn track_count(&self) -> usize {
        self.additions.tracks.len()
    }

    pub fn note_count(&self) -> usize {
        self.additions.note_count()
    }
}

/// Source tick to seconds, following the file's timing mode
enum SourceClock {
    /// Tempo changes as (tick, microseconds per quarter), sorted by tick
    Metrical { ppq: u64, tempo_map: Vec<(u64, u32)> },
    Timecode { ticks_per_second: f64 },
}

impl SourceClock {
    fn from_smf(smf: &Smf<'_>) -> Self {
        match smf.header.timing {
            Timing::Metrical(ppq) => {
                let mut changes = vec![(0_u64, DEFAULT_TEMPO_MICROS)];
                for track in &smf.tracks {
                    for (tick, event) in absolute(track) {
                        if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
                            changes.push((tick, micros.as_int().max(1)));
                        }
                    }
                }
                // Stable sort: at equal ticks the last event read wins
                changes.sort_by_key(|(tick, _)| *tick);
                let mut tempo_map: Vec<(u64, u32)> = Vec::with_capacity(changes.len());
                for (tick, micros) in changes {
                    match tempo_map.last_mut() {
                        Some(last) if last.0 == tick => last.1 = micros,
                        _ => tempo_map.push((tick, micros)),
                    }
                }
                SourceClock::Metrical {
                    ppq: u64::from(ppq.as_int().max(1)),
                    tempo_map,
                }
            }
            Timing::Timecode(fps, subframes) => SourceClock::Timecode {
                ticks_per_second: (fps.as_f32() as f64 * subframes.max(1) as f64).max(1.0),
            },
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            SourceClock::Metrical { ppq, tempo_map } => {
                let mut total_us: u128 = 0;
                let mut prev_tick = 0_u64;
                let mut current = DEFAULT_TEMPO_MICROS;
                for &(change_tick, micros) in tempo_map {
                    if change_tick > tick {
                        break;
                    }
                    let span = change_tick.saturating_sub(prev_tick);
                    total_us += u128::from(span) * u128::from(current);
                    prev_tick = change_tick;
                    current = micros;
                }
                total_us += u128::from(tick.saturating_sub(prev_tick)) * u128::from(current);
                total_us as f64 / *ppq as f64 / 1_000_000.0
            }
            SourceClock::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
        }
    }
}

/// Events of a track tagged with their absolute source tick
fn absolute<'a, 'b>(track: &'b [TrackEvent<'a>]) -> impl Iterator<Item = (u64, &'b TrackEvent<'a>)> {
    track.iter().scan(0_u64, |tick, event| {
        *tick = tick.saturating_add(u64::from(event.delta.as_int()));
        Some((*tick, event))
    })
}

/// First event of a kind across all tracks, by tick then track order
fn first_meta<T>(smf: &Smf<'_>, pick: impl Fn(&MetaMessage<'_>) -> Option<T>) -> Option<T> {
    smf.tracks
        .iter()
        .filter_map(|track| {
            absolute(track).find_map(|(tick, event)| match &event.kind {
                TrackEventKind::Meta(meta) => pick(meta).map(|value| (tick, value)),
                _ => None,
            })
        })
        .min_by_key(|(tick, _)| *tick)
        .map(|(_, value)| value)
}

#[derive(Debug, Clone, Copy)]
struct SourceNote {
    start: u64,
    end: u64,
    pitch: u8,
    velocity: u8,
    channel: u8,
}

struct SourceTrack {
    name: Option<String>,
    program: Option<u8>,
    notes: Vec<SourceNote>,
}

/// Pair note-ons with note-offs first-in first-out per (channel, pitch).
/// Notes still open at the end of the track close there.
fn read_track(track: &[TrackEvent<'_>]) -> SourceTrack {
    let mut name = None;
    let mut program = None;
    let mut open: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
    let mut notes = Vec::new();
    let mut end_tick = 0_u64;

    for (tick, event) in absolute(track) {
        end_tick = tick;
        match event.kind {
            TrackEventKind::Meta(MetaMessage::TrackName(raw)) if name.is_none() => {
                let text = String::from_utf8_lossy(raw).trim().to_string();
                if !text.is_empty() {
                    name = Some(text);
                }
            }
            TrackEventKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::ProgramChange { program: p } if program.is_none() => {
                        program = Some(p.as_int());
                    }
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.entry((channel, key.as_int()))
                            .or_default()
                            .push_back((tick, vel.as_int()));
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let pitch = key.as_int();
                        if let Some((start, velocity)) =
                            open.get_mut(&(channel, pitch)).and_then(VecDeque::pop_front)
                        {
                            notes.push(SourceNote {
                                start,
                                end: tick,
                                pitch,
                                velocity,
                                channel,
                            });
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    for ((channel, pitch), starts) in open {
        for (start, velocity) in starts {
            notes.push(SourceNote {
                start,
                end: end_tick.max(start),
                pitch,
                velocity,
                channel,
            });
        }
    }
    notes.sort_by_key(|n| (n.start, n.pitch));

    SourceTrack {
        name,
        program,
        notes,
    }
}

/// Decode a Standard MIDI File into project additions
///
/// Nothing is mutated here; the caller applies the result atomically.
/// Fails on a missing `MThd` header, unparseable data, or a file without
/// a single note.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn import_midi(bytes: &[u8]) -> Result<MidiImport, MidiCodecError> {
    if !bytes.starts_with(MIDI_MAGIC) {
        return Err(MidiCodecError::NotAMidiFile);
    }
    let smf = Smf::parse(bytes)?;
    let clock = SourceClock::from_smf(&smf);

    let tempo = first_meta(&smf, |meta| match meta {
        MetaMessage::Tempo(micros) => Some(micros.as_int()),
        _ => None,
    })
    .and_then(|micros| Tempo::try_new(60_000_000.0 / micros.max(1) as f64))
    .unwrap_or_default();

    let time_signature = first_meta(&smf, |meta| match meta {
        MetaMessage::TimeSignature(numerator, exponent, _, _) if *exponent <= 6 => {
            TimeSignature::try_new(*numerator, 1_u8 << *exponent)
        }
        _ => None,
    })
    .unwrap_or_default();

    let bpm = tempo.bpm();
    let ticks_per_bar = time_signature.ticks_per_bar();
    let mut additions = ProjectAdditions::default();

    for source in smf.tracks.iter().map(|track| read_track(track)) {
        if source.notes.is_empty() {
            continue;
        }

        // Source ticks -> seconds -> project ticks, rounded once per edge
        let converted: Vec<(u64, u64, &SourceNote)> = source
            .notes
            .iter()
            .map(|note| {
                let start = round_ticks(seconds_to_ticks(clock.seconds_at(note.start), bpm));
                let end = round_ticks(seconds_to_ticks(clock.seconds_at(note.end), bpm));
                (start, end, note)
            })
            .collect();

        let origin = converted.iter().map(|(start, _, _)| *start).min().unwrap_or(0);
        let notes: Vec<MidiNote> = converted
            .iter()
            .map(|(start, end, note)| {
                MidiNote::clamped(
                    note.pitch as i64,
                    i64::try_from(start - origin).unwrap_or(i64::MAX),
                    i64::try_from(end.saturating_sub(*start)).unwrap_or(i64::MAX),
                    note.velocity as i64,
                    note.channel as i64,
                )
            })
            .collect();
        let span = notes.iter().map(MidiNote::end_tick).max().unwrap_or(0);
        let length_bars = u32::try_from(span.div_ceil(ticks_per_bar).max(1)).unwrap_or(u32::MAX);

        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        let on_drum_channel = source.notes.iter().any(|n| n.channel == DRUM_CHANNEL);
        let kind = inference::infer_instrument(
            source.name.as_deref(),
            source.program,
            &pitches,
            on_drum_channel,
        );

        let name = source
            .name
            .unwrap_or_else(|| format!("Track {}", additions.tracks.len() + 1));
        let track_type = if kind == InstrumentKind::Drums {
            TrackType::Drums
        } else {
            TrackType::Instrument
        };
        let track = Track::new(name, track_type).with_instrument(kind.id());
        let clip = MidiClip::new(track.id.clone(), length_bars, notes);
        let placement = ArrangementClip::midi(track.id.clone(), &clip, 0);
        debug!(
            track = %track.name,
            instrument = %kind,
            notes = clip.notes.len(),
            length_bars,
            "Imported track"
        );

        additions.tracks.push(track);
        additions.midi_clips.push(clip);
        additions.arrangement_clips.push(placement);
    }

    if additions.midi_clips.is_empty() {
        return Err(MidiCodecError::NoNotes);
    }

    info!(
        tracks = additions.tracks.len(),
        notes = additions.note_count(),
        bpm,
        time_signature = %time_signature,
        "MIDI import completed"
    );
    Ok(MidiImport {
        tempo,
        time_signature,
        additions,
    })
}
