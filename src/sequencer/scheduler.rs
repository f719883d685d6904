// Event scheduler - Turns arranged MIDI clips into transport registrations
// Triggers are placed at exact integer ticks, strictly increasing per track

use super::note::{MidiNote, NoteName};
use super::timeline::{seconds_to_ticks, ticks_to_seconds};
use super::transport::{EventHandle, TransportClock};
use crate::config::SchedulerConfig;
use crate::instrument::{gain_db, InstrumentRegistry, SharedInstrument};
use crate::project::{Project, Track, TrackId, TrackType};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// One instrument call inside a trigger group
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Notes sharing velocity and duration, played as one event
    Chord {
        notes: Vec<NoteName>,
        duration: f64,
        gain_db: f64,
    },
    Note {
        note: NoteName,
        duration: f64,
        gain_db: f64,
    },
}

/// Everything that starts at one tick on one track
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerGroup {
    /// Absolute tick from the arrangement
    pub source_tick: u64,
    /// Tick actually registered, after nudging
    pub tick: u64,
    pub triggers: Vec<Trigger>,
}

/// Transport snapshot a planning pass runs against
#[derive(Debug, Clone, Copy)]
pub struct PlanContext {
    /// Live transport tempo, used for durations and the safety margin
    pub bpm: f64,
    pub position_ticks: f64,
    pub config: SchedulerConfig,
}

impl PlanContext {
    pub fn from_transport<T: TransportClock + ?Sized>(transport: &T, config: SchedulerConfig) -> Self {
        Self {
            bpm: transport.bpm(),
            position_ticks: transport.position_ticks(),
            config,
        }
    }

    /// Earliest tick a trigger may use: the transport position plus the
    /// safety margin, rounded up
    pub fn min_start_tick(&self) -> u64 {
        let margin = seconds_to_ticks(self.config.safety_margin_ms.max(0.0) / 1000.0, self.bpm);
        let earliest = (self.position_ticks.max(0.0) + margin).ceil();
        if earliest.is_finite() { earliest as u64 } else { 0 }
    }
}

/// Absolute-tick notes of every MIDI arrangement clip on a track
pub fn collect_track_notes(project: &Project, track_id: &TrackId) -> Vec<(u64, MidiNote)> {
    let ticks_per_bar = project.time_signature.ticks_per_bar();
    let mut notes = Vec::new();

    for placement in project.arrangement_clips_for(track_id) {
        let Some(clip) = placement
            .midi_clip_id()
            .and_then(|id| project.midi_clip(id))
        else {
            continue;
        };
        let offset = u64::from(placement.start_bar).saturating_mul(ticks_per_bar);
        notes.extend(
            clip.notes
                .iter()
                .map(|note| (offset.saturating_add(note.start_tick), *note)),
        );
    }

    notes
}

/// Plan the trigger groups for one track
///
/// Groups come out in ascending tick order and every `tick` is at least
/// `min_start_tick` and strictly greater than the previous one. Notes that
/// would land in the past are moved forward, never dropped.
pub fn plan_track(
    project: &Project,
    track: &Track,
    supports_chords: bool,
    context: &PlanContext,
) -> Vec<TriggerGroup> {
    let mut by_tick: BTreeMap<u64, Vec<MidiNote>> = BTreeMap::new();
    for (tick, note) in collect_track_notes(project, &track.id) {
        by_tick.entry(tick).or_default().push(note);
    }

    let min_start = context.min_start_tick();
    let nudge = context.config.nudge_ticks.max(1);
    let mut last: Option<u64> = None;
    let mut groups = Vec::with_capacity(by_tick.len());

    for (source_tick, mut notes) in by_tick {
        let mut tick = source_tick.max(min_start);
        if let Some(last) = last {
            tick = tick.max(last.saturating_add(nudge));
        }
        last = Some(tick);

        notes.sort_by_key(|n| n.pitch);
        groups.push(TriggerGroup {
            source_tick,
            tick,
            triggers: group_triggers(&notes, track.volume, supports_chords, context.bpm),
        });
    }

    groups
}

fn group_triggers(notes: &[MidiNote], volume: f32, supports_chords: bool, bpm: f64) -> Vec<Trigger> {
    let first = notes[0];
    let uniform = notes
        .iter()
        .all(|n| n.velocity == first.velocity && n.duration_tick == first.duration_tick);

    if notes.len() > 1 && supports_chords && uniform {
        return vec![Trigger::Chord {
            notes: notes.iter().map(MidiNote::note_name).collect(),
            duration: ticks_to_seconds(first.duration_tick as f64, bpm),
            gain_db: gain_db(first.velocity, volume),
        }];
    }

    notes
        .iter()
        .map(|n| Trigger::Note {
            note: n.note_name(),
            duration: ticks_to_seconds(n.duration_tick as f64, bpm),
            gain_db: gain_db(n.velocity, volume),
        })
        .collect()
}

/// Result of a whole-project scheduling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub tracks_scheduled: usize,
    pub tracks_skipped: usize,
    pub groups: usize,
}

/// Registers trigger groups with the transport and owns their handles
///
/// Handles are kept per track. Scheduling a track always disposes that
/// track's previous handles first, so a track never has two live schedules.
pub struct EventScheduler {
    config: SchedulerConfig,
    handles: HashMap<TrackId, Vec<EventHandle>>,
}

impl EventScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            handles: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// (Re)schedule one track. Returns the number of registered groups.
    pub fn schedule_track<T: TransportClock + ?Sized>(
        &mut self,
        transport: &mut T,
        project: &Project,
        track: &Track,
        instrument: &SharedInstrument,
    ) -> usize {
        self.dispose_track(transport, &track.id);

        let supports_chords = instrument.lock().supports_chords();
        let context = PlanContext::from_transport(transport, self.config);
        let groups = plan_track(project, track, supports_chords, &context);

        let handles: Vec<EventHandle> = groups
            .into_iter()
            .map(|group| {
                let instrument = SharedInstrument::clone(instrument);
                let triggers = group.triggers;
                transport.schedule(
                    group.tick,
                    Box::new(move |time| {
                        let mut instrument = instrument.lock();
                        for trigger in &triggers {
                            match trigger {
                                Trigger::Chord {
                                    notes,
                                    duration,
                                    gain_db,
                                } => instrument.trigger_chord(notes, *duration, time, *gain_db),
                                Trigger::Note {
                                    note,
                                    duration,
                                    gain_db,
                                } => instrument.trigger_note(*note, *duration, time, *gain_db),
                            }
                        }
                    }),
                )
            })
            .collect();

        let count = handles.len();
        debug!(track = %track.id, groups = count, "Track scheduled");
        self.handles.insert(track.id.clone(), handles);
        count
    }

    /// Schedule every audible track that resolves to an instrument; dispose
    /// schedules of tracks that no longer qualify
    pub fn schedule_project<T: TransportClock + ?Sized>(
        &mut self,
        transport: &mut T,
        project: &Project,
        registry: &mut InstrumentRegistry,
    ) -> ScheduleSummary {
        let mut summary = ScheduleSummary::default();

        let stale: Vec<TrackId> = self
            .handles
            .keys()
            .filter(|id| project.track(id).is_none())
            .cloned()
            .collect();
        for id in stale {
            self.dispose_track(transport, &id);
        }

        for track in &project.tracks {
            if track.track_type == TrackType::Automation {
                trace!(track = %track.id, "Automation track not scheduled");
                self.dispose_track(transport, &track.id);
                continue;
            }
            if !project.is_track_audible(track) {
                trace!(track = %track.id, "Silent track not scheduled");
                self.dispose_track(transport, &track.id);
                summary.tracks_skipped += 1;
                continue;
            }
            let Some(instrument) = registry.get_or_create(track) else {
                trace!(track = %track.id, "Track has no resolvable instrument");
                self.dispose_track(transport, &track.id);
                summary.tracks_skipped += 1;
                continue;
            };

            summary.groups += self.schedule_track(transport, project, track, &instrument);
            summary.tracks_scheduled += 1;
        }

        summary
    }

    pub fn dispose_track<T: TransportClock + ?Sized>(&mut self, transport: &mut T, track_id: &TrackId) {
        if let Some(handles) = self.handles.remove(track_id) {
            for handle in handles {
                transport.dispose(handle);
            }
        }
    }

    pub fn dispose_all<T: TransportClock + ?Sized>(&mut self, transport: &mut T) {
        for (_, handles) in self.handles.drain() {
            for handle in handles {
                transport.dispose(handle);
            }
        }
    }

    /// Handles currently held across all tracks
    pub fn active_handles(&self) -> usize {
        self.handles.values().map(Vec::len).sum()
    }

    pub fn handles_for(&self, track_id: &TrackId) -> usize {
        self.handles.get(track_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::RecordingFactory;
    use crate::project::{ArrangementClip, MidiClip};
    use crate::sequencer::transport::Transport;

    fn project(notes: Vec<MidiNote>, start_bar: u32) -> (Project, Track) {
        let mut project = Project::new("Sched");
        let mut track = Track::new("Keys", TrackType::Instrument).with_instrument("piano");
        track.volume = 1.0;
        project.add_track(track.clone()).unwrap();
        let clip = MidiClip::new(track.id.clone(), 4, notes);
        let placement = ArrangementClip::midi(track.id.clone(), &clip, start_bar);
        project.add_midi_clip(clip).unwrap();
        project.add_arrangement_clip(placement).unwrap();
        (project, track)
    }

    fn context(position_ticks: f64) -> PlanContext {
        PlanContext {
            bpm: 120.0,
            position_ticks,
            config: SchedulerConfig::default(),
        }
    }

    #[test]
    fn test_min_start_tick() {
        // 10 ms at 120 BPM = 9.6 ticks
        assert_eq!(context(0.0).min_start_tick(), 10);
        assert_eq!(context(100.2).min_start_tick(), 110);
    }

    #[test]
    fn test_notes_placed_at_absolute_ticks() {
        let (project, track) = project(
            vec![MidiNote::new(60, 0, 480, 100), MidiNote::new(62, 480, 480, 100)],
            2,
        );
        let groups = plan_track(&project, &track, true, &context(0.0));

        let ticks: Vec<u64> = groups.iter().map(|g| g.tick).collect();
        assert_eq!(ticks, vec![3840, 4320]);
        assert_eq!(
            groups[0].triggers,
            vec![Trigger::Note {
                note: NoteName(60),
                duration: 0.5,
                gain_db: gain_db(100, 1.0),
            }]
        );
    }

    #[test]
    fn test_past_notes_nudged_not_dropped() {
        let (project, track) = project(
            vec![
                MidiNote::new(60, 0, 120, 100),
                MidiNote::new(62, 5, 120, 100),
                MidiNote::new(64, 1920, 120, 100),
            ],
            0,
        );
        let groups = plan_track(&project, &track, true, &context(0.0));

        let ticks: Vec<u64> = groups.iter().map(|g| g.tick).collect();
        assert_eq!(ticks, vec![10, 11, 1920]);
        assert_eq!(groups[1].source_tick, 5);
    }

    #[test]
    fn test_uniform_chord_is_one_trigger() {
        let (project, track) = project(
            vec![MidiNote::new(60, 0, 480, 90), MidiNote::new(64, 0, 480, 90)],
            1,
        );
        let groups = plan_track(&project, &track, true, &context(0.0));

        assert_eq!(groups.len(), 1);
        assert!(matches!(&groups[0].triggers[..], [Trigger::Chord { notes, .. }] if notes.len() == 2));
    }

    #[test]
    fn test_mixed_velocities_split_into_notes() {
        let (project, track) = project(
            vec![MidiNote::new(60, 0, 480, 90), MidiNote::new(64, 0, 480, 110)],
            1,
        );
        let groups = plan_track(&project, &track, true, &context(0.0));

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].triggers.len(), 2);
        assert!(groups[0].triggers.iter().all(|t| matches!(t, Trigger::Note { .. })));
    }

    #[test]
    fn test_no_chords_without_capability() {
        let (project, track) = project(
            vec![MidiNote::new(40, 0, 480, 90), MidiNote::new(47, 0, 480, 90)],
            1,
        );
        let groups = plan_track(&project, &track, false, &context(0.0));
        assert_eq!(groups[0].triggers.len(), 2);
    }

    #[test]
    fn test_reschedule_replaces_handles() {
        let (project, track) = project(
            vec![MidiNote::new(60, 0, 480, 100), MidiNote::new(62, 960, 480, 100)],
            0,
        );
        let mut registry = InstrumentRegistry::new(Box::new(RecordingFactory::new()));
        let mut transport = Transport::default();
        let mut scheduler = EventScheduler::new(SchedulerConfig::default());

        scheduler.schedule_project(&mut transport, &project, &mut registry);
        let summary = scheduler.schedule_project(&mut transport, &project, &mut registry);

        assert_eq!(summary.groups, 2);
        assert_eq!(scheduler.handles_for(&track.id), 2);
        assert_eq!(transport.pending_events(), 2);

        scheduler.dispose_all(&mut transport);
        assert_eq!(scheduler.active_handles(), 0);
        assert_eq!(transport.pending_events(), 0);
    }

    #[test]
    fn test_muted_and_unresolved_tracks_skipped() {
        let (mut project, track) = project(vec![MidiNote::new(60, 0, 480, 100)], 0);
        let mut registry = InstrumentRegistry::new(Box::new(RecordingFactory::new()));
        let mut transport = Transport::default();
        let mut scheduler = EventScheduler::new(SchedulerConfig::default());

        project.track_mut(&track.id).unwrap().mute = true;
        let summary = scheduler.schedule_project(&mut transport, &project, &mut registry);
        assert_eq!(summary.tracks_skipped, 1);
        assert_eq!(transport.pending_events(), 0);

        let track = project.track_mut(&track.id).unwrap();
        track.mute = false;
        track.instrument = None;
        let summary = scheduler.schedule_project(&mut transport, &project, &mut registry);
        assert_eq!(summary.tracks_scheduled, 0);
        assert_eq!(summary.tracks_skipped, 1);
    }

    #[test]
    fn test_fired_triggers_reach_instrument() {
        let (project, track) = project(
            vec![MidiNote::new(60, 0, 480, 127), MidiNote::new(64, 0, 480, 127)],
            1,
        );
        let factory = RecordingFactory::new();
        let log = factory.log();
        let mut registry = InstrumentRegistry::new(Box::new(factory));
        let mut transport = Transport::default();
        let mut scheduler = EventScheduler::new(SchedulerConfig::default());

        scheduler.schedule_project(&mut transport, &project, &mut registry);
        transport.start();
        transport.advance(3.0);

        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert!(log[0].chord);
        assert_eq!(log[0].source, track.id.as_str());
        assert_eq!(log[0].time, 2.0);
        assert_eq!(log[0].gain_db, 0.0);
    }
}
