// MIDI export - Project to Standard MIDI File bytes

use super::{inference, MidiCodecError, DRUM_CHANNEL};
use crate::config::CodecConfig;
use crate::instrument::InstrumentKind;
use crate::project::{Project, Track, TrackType};
use crate::sequencer::note::MidiNote;
use crate::sequencer::scheduler::collect_track_notes;
use crate::sequencer::timeline::{ticks_to_seconds, TICKS_PER_QUARTER};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use tracing::{debug, info, instrument};

const CC_VOLUME: u8 = 7;
const CC_PAN: u8 = 10;
const CC_EXPRESSION: u8 = 11;

/// Largest tempo value a Tempo meta event can carry
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// Largest delta time a track event can carry
const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Counts reported alongside the encoded bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSummary {
    pub tracks: usize,
    pub notes: usize,
    pub duration_seconds: f64,
}

/// Encoded file plus its summary
#[derive(Debug, Clone)]
pub struct MidiExport {
    pub bytes: Vec<u8>,
    pub summary: ExportSummary,
}

#[derive(Debug, Clone)]
struct AbsoluteMidiEvent<'a> {
    tick: u64,
    order: u8,
    kind: TrackEventKind<'a>,
}

/// Encode a project as a format 1 file at 480 PPQ
///
/// Track 0 carries tempo and time signature. Every project track with at
/// least one arrangement clip gets its own MIDI track; others are omitted.
#[instrument(skip(project, config), fields(project = %project.metadata.name))]
pub fn export_midi(project: &Project, config: &CodecConfig) -> Result<MidiExport, MidiCodecError> {
    let mut tracks = vec![conductor_track(project)];
    let mut notes_written = 0;
    let mut last_tick = 0_u64;

    for track in &project.tracks {
        if project.arrangement_clips_for(&track.id).next().is_none() {
            debug!(track = %track.id, "Track without clips not exported");
            continue;
        }

        let notes = collect_track_notes(project, &track.id);
        let channel = track_channel(track, &notes);
        let mut absolute_events = Vec::with_capacity(notes.len() * 2);
        for (tick, note) in &notes {
            let note_channel = if track.track_type == TrackType::Drums {
                DRUM_CHANNEL
            } else {
                melodic_channel(note.channel)
            };
            absolute_events.extend(note_events(*tick, note, note_channel));
            last_tick = last_tick.max(tick.saturating_add(note.duration_tick));
        }
        absolute_events.sort_by_key(|event| (event.tick, event.order));
        notes_written += notes.len();

        let mut track_events = track_header(track, &notes, channel, config);
        let mut previous_tick = 0_u64;
        for event in absolute_events {
            let delta = event.tick.saturating_sub(previous_tick);
            push_with_delta(&mut track_events, delta, event.kind);
            previous_tick = event.tick;
        }
        track_events.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        tracks.push(track_events);
    }

    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(u15::from(TICKS_PER_QUARTER as u16)),
    };

    let tracks_written = tracks.len() - 1;
    let mut bytes = Vec::new();
    Smf { header, tracks }.write_std(&mut bytes)?;

    let song_ticks = u64::from(project.song_length_bars())
        .saturating_mul(project.time_signature.ticks_per_bar());
    let summary = ExportSummary {
        tracks: tracks_written,
        notes: notes_written,
        duration_seconds: ticks_to_seconds(song_ticks.max(last_tick) as f64, project.tempo.bpm()),
    };
    info!(
        tracks = summary.tracks,
        notes = summary.notes,
        bytes = bytes.len(),
        "MIDI export completed"
    );
    Ok(MidiExport { bytes, summary })
}

fn conductor_track(project: &Project) -> Vec<TrackEvent<'static>> {
    let micros_per_quarter = (60_000_000.0 / project.tempo.bpm()).round() as u32;
    let ts = project.time_signature;

    vec![
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(
                micros_per_quarter.min(MAX_TEMPO_MICROS),
            ))),
        },
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                ts.numerator,
                ts.denominator_exponent(),
                24,
                8,
            )),
        },
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]
}

/// Track name, program, volume, pan and expression at tick 0
fn track_header<'a>(
    track: &'a Track,
    notes: &[(u64, MidiNote)],
    channel: u8,
    config: &CodecConfig,
) -> Vec<TrackEvent<'a>> {
    let kind = export_kind(track, notes);
    let channel = u4::from(channel);
    let controller = |number: u8, value: u8| TrackEvent {
        delta: u28::from(0_u32),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::Controller {
                controller: u7::from(number),
                value: u7::from(value.min(127)),
            },
        },
    };

    let volume = (track.volume.clamp(0.0, 1.0) * 127.0).round() as u8;
    let pan = ((track.pan.clamp(-1.0, 1.0) + 1.0) / 2.0 * 127.0).round() as u8;

    vec![
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
        },
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::from(kind.gm_program()),
                },
            },
        },
        controller(CC_VOLUME, volume),
        controller(CC_PAN, pan),
        controller(CC_EXPRESSION, config.expression_value),
    ]
}

/// Instrument family written as the program change
fn export_kind(track: &Track, notes: &[(u64, MidiNote)]) -> InstrumentKind {
    if track.track_type == TrackType::Drums {
        return InstrumentKind::Drums;
    }
    if let Some(kind) = track.instrument.as_deref().and_then(InstrumentKind::from_id) {
        return kind;
    }
    let pitches: Vec<u8> = notes.iter().map(|(_, n)| n.pitch).collect();
    inference::infer_instrument(Some(&track.name), None, &pitches, false)
}

fn track_channel(track: &Track, notes: &[(u64, MidiNote)]) -> u8 {
    if track.track_type == TrackType::Drums {
        return DRUM_CHANNEL;
    }
    notes
        .first()
        .map_or(0, |(_, note)| melodic_channel(note.channel))
}

/// Melodic notes stay off the percussion channel
fn melodic_channel(channel: u8) -> u8 {
    match channel.min(15) {
        DRUM_CHANNEL => 0,
        other => other,
    }
}

/// Append `kind` `delta` ticks after the previous event. Gaps wider than a
/// delta can hold are bridged with empty text events.
fn push_with_delta<'a>(events: &mut Vec<TrackEvent<'a>>, mut delta: u64, kind: TrackEventKind<'a>) {
    while delta > MAX_DELTA {
        events.push(TrackEvent {
            delta: u28::from(MAX_DELTA as u32),
            kind: TrackEventKind::Meta(MetaMessage::Text(&[])),
        });
        delta -= MAX_DELTA;
    }
    events.push(TrackEvent {
        delta: u28::from(delta as u32),
        kind,
    });
}

fn note_events(tick: u64, note: &MidiNote, channel: u8) -> [AbsoluteMidiEvent<'static>; 2] {
    let channel = u4::from(channel);
    let key = u7::from(note.pitch.min(127));

    [
        AbsoluteMidiEvent {
            tick,
            order: 1,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    // Velocity 0 would read back as a note-off
                    vel: u7::from(note.velocity.clamp(1, 127)),
                },
            },
        },
        AbsoluteMidiEvent {
            tick: tick.saturating_add(note.duration_tick.max(1)),
            order: 0,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::from(0),
                },
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ArrangementClip, MidiClip};

    fn scenario() -> Project {
        let mut project = Project::new("Export");
        let track = Track::new("Keys", TrackType::Instrument).with_instrument("piano");
        project.add_track(track.clone()).unwrap();
        let clip = MidiClip::new(track.id.clone(), 1, vec![MidiNote::new(60, 0, 480, 100)]);
        let placement = ArrangementClip::midi(track.id.clone(), &clip, 2);
        project.add_midi_clip(clip).unwrap();
        project.add_arrangement_clip(placement).unwrap();
        project.add_track(Track::new("Unused", TrackType::Instrument)).unwrap();
        project
    }

    fn parse(bytes: &[u8]) -> Smf<'_> {
        Smf::parse(bytes).unwrap()
    }

    #[test]
    fn test_header_and_conductor() {
        let export = export_midi(&scenario(), &CodecConfig::default()).unwrap();
        let smf = parse(&export.bytes);

        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(480)));
        assert_eq!(smf.tracks.len(), 2);
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::from(500_000)))
        );
        assert_eq!(
            smf.tracks[0][1].kind,
            TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8))
        );
    }

    #[test]
    fn test_note_lands_on_absolute_tick() {
        let export = export_midi(&scenario(), &CodecConfig::default()).unwrap();
        let smf = parse(&export.bytes);

        let mut tick = 0_u64;
        let mut note_on = None;
        for event in &smf.tracks[1] {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } = event.kind
            {
                note_on = Some((tick, key.as_int(), vel.as_int()));
            }
        }
        assert_eq!(note_on, Some((3840, 60, 100)));
        assert_eq!(export.summary.tracks, 1);
        assert_eq!(export.summary.notes, 1);
        assert_eq!(export.summary.duration_seconds, 6.0);
        assert_eq!(ticks_to_seconds(3840.0, 120.0), 4.0);
    }

    #[test]
    fn test_track_controllers() {
        let mut project = scenario();
        let id = project.tracks[0].id.clone();
        let track = project.track_mut(&id).unwrap();
        track.volume = 1.0;
        track.pan = -1.0;
        let config = CodecConfig { expression_value: 100 };

        let export = export_midi(&project, &config).unwrap();
        let smf = parse(&export.bytes);

        let controllers: Vec<(u8, u8)> = smf.tracks[1]
            .iter()
            .filter_map(|event| match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::Controller { controller, value },
                    ..
                } => Some((controller.as_int(), value.as_int())),
                _ => None,
            })
            .collect();
        assert_eq!(controllers, vec![(7, 127), (10, 0), (11, 100)]);
        assert_eq!(smf.tracks[1][0].kind, TrackEventKind::Meta(MetaMessage::TrackName(&b"Keys"[..])));
    }

    #[test]
    fn test_drums_use_channel_ten() {
        let mut project = Project::new("Beat");
        let track = Track::new("Kit", TrackType::Drums).with_instrument("drums");
        project.add_track(track.clone()).unwrap();
        let clip = MidiClip::new(track.id.clone(), 1, vec![MidiNote::new(36, 0, 120, 0)]);
        let placement = ArrangementClip::midi(track.id.clone(), &clip, 0);
        project.add_midi_clip(clip).unwrap();
        project.add_arrangement_clip(placement).unwrap();

        let export = export_midi(&project, &CodecConfig::default()).unwrap();
        let smf = parse(&export.bytes);

        let note_on = smf.tracks[1].iter().find_map(|event| match event.kind {
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { vel, .. },
            } => Some((channel.as_int(), vel.as_int())),
            _ => None,
        });
        assert_eq!(note_on, Some((9, 1)));
    }

    #[test]
    fn test_long_gaps_keep_absolute_ticks() {
        let mut project = Project::new("Long");
        let track = Track::new("Keys", TrackType::Instrument).with_instrument("piano");
        project.add_track(track.clone()).unwrap();
        let clip = MidiClip::new(
            track.id.clone(),
            1,
            vec![MidiNote::new(60, 0, 480, 90), MidiNote::new(62, 600_000_000, 480, 90)],
        );
        let placement = ArrangementClip::midi(track.id.clone(), &clip, 0);
        project.add_midi_clip(clip).unwrap();
        project.add_arrangement_clip(placement).unwrap();

        let export = export_midi(&project, &CodecConfig::default()).unwrap();
        let smf = parse(&export.bytes);

        let mut tick = 0_u64;
        let mut note_ons = Vec::new();
        let mut spacers = 0;
        for event in &smf.tracks[1] {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => note_ons.push((tick, key.as_int())),
                TrackEventKind::Meta(MetaMessage::Text(text)) if text.is_empty() => spacers += 1,
                _ => {}
            }
        }
        assert_eq!(note_ons, vec![(0, 60), (600_000_000, 62)]);
        assert_eq!(spacers, 2);
        assert!(smf.tracks[1].iter().all(|e| u64::from(e.delta.as_int()) <= MAX_DELTA));
    }

    #[test]
    fn test_melodic_channels_preserved_except_percussion() {
        let mut project = Project::new("Channels");
        let track = Track::new("Keys", TrackType::Instrument).with_instrument("piano");
        project.add_track(track.clone()).unwrap();
        let clip = MidiClip::new(
            track.id.clone(),
            1,
            vec![
                MidiNote::new(60, 0, 480, 90).with_channel(3),
                MidiNote::new(64, 480, 480, 90).with_channel(9),
            ],
        );
        let placement = ArrangementClip::midi(track.id.clone(), &clip, 0);
        project.add_midi_clip(clip).unwrap();
        project.add_arrangement_clip(placement).unwrap();

        let export = export_midi(&project, &CodecConfig::default()).unwrap();
        let smf = parse(&export.bytes);

        let channels: Vec<u8> = smf.tracks[1]
            .iter()
            .filter_map(|event| match event.kind {
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { .. },
                } => Some(channel.as_int()),
                _ => None,
            })
            .collect();
        assert_eq!(channels, vec![3, 0]);
    }

    #[test]
    fn test_note_off_sorts_before_note_on_at_same_tick() {
        let mut project = Project::new("Legato");
        let track = Track::new("Keys", TrackType::Instrument).with_instrument("piano");
        project.add_track(track.clone()).unwrap();
        let clip = MidiClip::new(
            track.id.clone(),
            1,
            vec![MidiNote::new(60, 0, 480, 90), MidiNote::new(60, 480, 480, 90)],
        );
        let placement = ArrangementClip::midi(track.id.clone(), &clip, 0);
        project.add_midi_clip(clip).unwrap();
        project.add_arrangement_clip(placement).unwrap();

        let export = export_midi(&project, &CodecConfig::default()).unwrap();
        let smf = parse(&export.bytes);

        let kinds: Vec<&str> = smf.tracks[1]
            .iter()
            .filter_map(|event| match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                } => Some("on"),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                } => Some("off"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["on", "off", "on", "off"]);
    }
}
