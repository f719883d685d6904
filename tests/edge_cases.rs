//! Edge case tests and robustness validation
//!
//! Extreme values, degenerate projects and odd transport usage must be
//! handled without panics or inconsistent state.

use seqdaw::config::SchedulerConfig;
use seqdaw::instrument::{gain_db, InstrumentRegistry, RecordingFactory, SILENCE_DB};
use seqdaw::project::serialization::additions_from_json;
use seqdaw::config::CodecConfig;
use seqdaw::midi::{export_midi, import_midi};
use seqdaw::project::edits::edits_from_json;
use seqdaw::project::{apply_edits, MidiClip, Project, ProjectEdit, Track, TrackType};
use seqdaw::sequencer::note::MAX_NOTE_TICK;
use seqdaw::sequencer::timeline::{round_ticks, seconds_to_ticks, ticks_to_seconds};
use seqdaw::sequencer::{
    EventScheduler, MidiNote, MusicalTime, Tempo, TimeBase, TimeSignature, Transport,
    TransportClock,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Note fields outside the MIDI range are clamped, never wrapped
#[test]
fn test_note_values_are_clamped() {
    let note = MidiNote::clamped(300, -50, 0, -1, 99);
    assert_eq!(note.pitch, 127);
    assert_eq!(note.start_tick, 0);
    assert_eq!(note.duration_tick, 1);
    assert_eq!(note.velocity, 0);
    assert_eq!(note.channel, 15);

    let note = MidiNote::new(200, 10, 0, 255);
    assert_eq!((note.pitch, note.duration_tick, note.velocity), (127, 1, 127));
}

/// JSON additions from external tools are clamped the same way
#[test]
fn test_json_additions_clamp_notes() {
    let json = r#"{
        "tracks": [{"id": "t1", "name": "Lead", "track_type": "instrument", "volume": 0.8, "pan": 0.0}],
        "midi_clips": [{
            "id": "c1", "track_id": "t1", "length_bars": 1,
            "notes": [{"pitch": 500, "start_tick": -10, "duration_tick": 0, "velocity": 900}]
        }]
    }"#;
    let additions = additions_from_json(json).unwrap();
    let note = additions.midi_clips[0].notes[0];
    assert_eq!(note.pitch, 127);
    assert_eq!(note.start_tick, 0);
    assert_eq!(note.duration_tick, 1);
    assert_eq!(note.velocity, 127);
}

/// Track levels set through edits stay inside their ranges
#[test]
fn test_edit_levels_and_tempo_are_clamped() {
    let mut project = Project::new("Levels");
    apply_edits(
        &mut project,
        [
            ProjectEdit::AddTrack {
                id: None,
                name: "Loud".to_string(),
                track_type: TrackType::Instrument,
                instrument: None,
                volume: Some(4.0),
                pan: Some(-3.0),
            },
            ProjectEdit::SetTempo { bpm: 5000.0 },
        ],
    )
    .unwrap();

    assert_eq!(project.tracks[0].volume, 1.0);
    assert_eq!(project.tracks[0].pan, -1.0);
    assert_eq!(project.tempo.bpm(), Tempo::MAX_BPM);

    // NaN is rejected and the batch leaves nothing behind
    let result = apply_edits(
        &mut project,
        [
            ProjectEdit::SetTempo { bpm: 60.0 },
            ProjectEdit::SetTempo { bpm: f64::NAN },
        ],
    );
    assert!(result.is_err());
    assert_eq!(project.tempo.bpm(), Tempo::MAX_BPM);
}

#[test]
fn test_round_ticks_handles_non_finite_input() {
    assert_eq!(round_ticks(f64::NAN), 0);
    assert_eq!(round_ticks(f64::NEG_INFINITY), 0);
    assert_eq!(round_ticks(-0.4), 0);
    assert_eq!(round_ticks(0.5), 1);
    assert_eq!(round_ticks(1e30), u64::MAX);
}

#[test]
fn test_conversions_at_tempo_extremes() {
    for bpm in [Tempo::MIN_BPM, 60.0, Tempo::MAX_BPM] {
        let seconds = ticks_to_seconds(480.0 * 1000.0, bpm);
        assert!(seconds.is_finite() && seconds > 0.0);
        assert!((seconds_to_ticks(seconds, bpm) - 480_000.0).abs() < 1e-6);
    }
    assert!(Tempo::try_new(f64::NAN).is_none());
    assert!(Tempo::try_new(0.0).is_none());
}

/// Denominator changes take effect immediately, with no cached bar length
#[test]
fn test_denominator_change_is_immediate() {
    let mut project = Project::new("Meter");
    assert_eq!(project.time_base().ticks_per_bar(), 1920);

    project.set_time_signature(TimeSignature::new(6, 8));
    assert_eq!(project.time_base().ticks_per_bar(), 1440);
    assert_eq!(project.time_base().bars_to_seconds(1.0), 1.5);

    project.set_time_signature(TimeSignature::new(3, 16));
    assert_eq!(project.time_base().ticks_per_bar(), 360);

    let base = TimeBase::new(Tempo::default(), TimeSignature::new(7, 8));
    let position = MusicalTime::from_total_ticks(base.ticks_per_bar() + 240, &TimeSignature::new(7, 8));
    // Bars and beats are 1-based
    assert_eq!((position.bar, position.beat, position.tick), (2, 2, 0));
}

#[test]
fn test_invalid_time_signatures_are_rejected() {
    assert!(TimeSignature::try_new(0, 4).is_none());
    assert!(TimeSignature::try_new(4, 0).is_none());
    assert!(TimeSignature::try_new(4, 3).is_none());
    assert!(TimeSignature::try_new(4, 128).is_none());
}

#[test]
fn test_transport_set_bpm_sanitizes_input() {
    let mut transport = Transport::default();

    transport.set_bpm(f64::NAN);
    transport.advance(0.0);
    assert_eq!(transport.bpm(), Tempo::default().bpm());

    transport.set_bpm(-20.0);
    transport.advance(0.0);
    assert_eq!(transport.bpm(), Tempo::MIN_BPM);

    transport.set_bpm(1e9);
    transport.advance(0.0);
    assert_eq!(transport.bpm(), Tempo::MAX_BPM);
}

#[test]
fn test_transport_ignores_degenerate_advances() {
    let mut transport = Transport::default();
    transport.start();
    assert_eq!(transport.advance(-1.0), 0);
    assert_eq!(transport.advance(f64::NAN), 0);
    assert_eq!(transport.position_ticks(), 0.0);
    assert_eq!(transport.elapsed_seconds(), 0.0);
}

#[test]
fn test_dispose_twice_and_after_fire() {
    let fired = Arc::new(AtomicUsize::new(0));
    let mut transport = Transport::default();
    let counter = fired.clone();
    let handle = transport.schedule(0, Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    transport.start();
    transport.advance(0.1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Fired handles and repeated disposes are no-ops
    transport.dispose(handle);
    transport.dispose(handle);
    assert_eq!(transport.pending_events(), 0);
}

#[test]
fn test_gain_floor() {
    assert_eq!(gain_db(0, 1.0), SILENCE_DB);
    assert_eq!(gain_db(127, 0.0), SILENCE_DB);
    assert_eq!(gain_db(1, 0.0001), SILENCE_DB);
    assert_eq!(gain_db(127, 1.0), 0.0);
    assert!(gain_db(127, 5.0) <= 0.0);
}

/// A crowd of notes on one tick far in the past is nudged, never dropped
#[test]
fn test_dense_past_notes_are_all_scheduled() {
    let mut project = Project::new("Crowd");
    let track = Track::new("Keys", TrackType::Instrument).with_instrument("piano");
    let track_id = track.id.clone();
    project.add_track(track).unwrap();

    let notes: Vec<MidiNote> = (0..128)
        .map(|i| MidiNote::new(i as u8, 0, 10, (i % 127) as u8 + 1))
        .collect();
    let clip = MidiClip::new(track_id.clone(), 1, notes);
    let placement = seqdaw::project::ArrangementClip::midi(track_id.clone(), &clip, 0);
    project.add_midi_clip(clip).unwrap();
    project.add_arrangement_clip(placement).unwrap();

    let factory = RecordingFactory::new();
    let log = factory.log();
    let mut registry = InstrumentRegistry::new(Box::new(factory));
    let mut transport = Transport::default();
    transport.start();
    transport.advance(30.0);

    let mut scheduler = EventScheduler::new(SchedulerConfig::default());
    scheduler.schedule_project(&mut transport, &project, &mut registry);
    transport.advance(5.0);

    let triggered: usize = log.lock().iter().map(|r| r.notes.len()).sum();
    assert_eq!(triggered, 128);
}

/// A project without tracks schedules and exports nothing, without errors
#[test]
fn test_empty_project_is_harmless() {
    let project = Project::new("Empty");
    let factory = RecordingFactory::new();
    let mut registry = InstrumentRegistry::new(Box::new(factory));
    let mut transport = Transport::default();
    let mut scheduler = EventScheduler::new(SchedulerConfig::default());

    let summary = scheduler.schedule_project(&mut transport, &project, &mut registry);
    assert_eq!(summary.groups, 0);
    assert_eq!(transport.pending_events(), 0);
    assert_eq!(project.song_length_bars(), 0);
    assert!(registry.is_empty());
}

/// Agent payloads with absurd tick values are clamped and stay exportable
#[test]
fn test_huge_agent_ticks_are_clamped() {
    let json = r#"[
        {"op": "add_track", "id": "lead", "name": "Lead", "instrument": "piano"},
        {"op": "add_midi_clip", "track_id": "lead", "start_bar": 1, "notes": [
            {"pitch": 60, "start_tick": 0, "duration_tick": 480, "velocity": 100},
            {"pitch": 64, "start_tick": 9223372036854775807,
             "duration_tick": 9223372036854775807, "velocity": 100}
        ]}
    ]"#;
    let mut project = Project::new("Huge");
    apply_edits(&mut project, edits_from_json(json).unwrap()).unwrap();

    let clip = &project.midi_clips[0];
    assert_eq!(clip.notes[1].start_tick, MAX_NOTE_TICK);
    assert_eq!(clip.notes[1].duration_tick, MAX_NOTE_TICK);
    assert_eq!(u64::from(clip.length_bars), (2 * MAX_NOTE_TICK).div_ceil(1920));

    let export = export_midi(&project, &CodecConfig::default()).unwrap();
    assert_eq!(export.summary.notes, 2);
    let import = import_midi(&export.bytes).unwrap();
    let notes = import.additions.midi_clips[0].sorted_notes();
    assert!(notes[1].start_tick.abs_diff(MAX_NOTE_TICK) <= 1);
    assert!(notes[1].duration_tick.abs_diff(MAX_NOTE_TICK) <= 1);

    // Scheduling the far note must not overflow either
    let factory = RecordingFactory::new();
    let mut registry = InstrumentRegistry::new(Box::new(factory));
    let mut transport = Transport::default();
    let mut scheduler = EventScheduler::new(SchedulerConfig::default());
    let summary = scheduler.schedule_project(&mut transport, &project, &mut registry);
    assert_eq!(summary.groups, 2);
}
