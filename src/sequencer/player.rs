// Sequencer Player - Playback state machine around the event scheduler
// Stopped -> Scheduling -> Playing, with tempo verification before scheduling

use super::scheduler::{EventScheduler, ScheduleSummary};
use super::transport::TransportClock;
use crate::config::{PlaybackConfig, SchedulerConfig};
use crate::instrument::InstrumentRegistry;
use crate::project::Project;
use tracing::{debug, info, warn};

/// Where the player is in a play session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// Waiting for the transport to report the requested tempo
    Scheduling { attempts: u32 },
    Playing,
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackState::Stopped)
    }
}

/// Drives the scheduler from play/stop requests and animation frames
///
/// Scheduling never happens inside `play`: the tempo write is issued there
/// and the pass runs on a later frame, once the transport reports the new
/// tempo or the retries run out.
pub struct SequencerPlayer {
    scheduler: EventScheduler,
    config: PlaybackConfig,
    state: PlaybackState,
    target_bpm: f64,
    /// (instance, revision) of the project the live schedule was built from
    scheduled_for: Option<(u64, u64)>,
}

impl SequencerPlayer {
    pub fn new(scheduler_config: SchedulerConfig, config: PlaybackConfig) -> Self {
        Self {
            scheduler: EventScheduler::new(scheduler_config),
            config,
            state: PlaybackState::Stopped,
            target_bpm: 0.0,
            scheduled_for: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    /// Start a play session
    pub fn play<T: TransportClock + ?Sized>(&mut self, transport: &mut T, project: &Project) {
        info!(bpm = project.tempo.bpm(), "Playback requested");
        self.request_schedule(transport, project);
        transport.start();
    }

    /// Stop playback and release every registration
    pub fn stop<T: TransportClock + ?Sized>(&mut self, transport: &mut T) {
        self.scheduler.dispose_all(transport);
        transport.stop();
        self.state = PlaybackState::Stopped;
        self.scheduled_for = None;
        info!("Playback stopped");
    }

    /// Force a dispose-and-reschedule, e.g. after the tempo changed
    pub fn invalidate<T: TransportClock + ?Sized>(&mut self, transport: &mut T, project: &Project) {
        if self.state.is_active() {
            self.request_schedule(transport, project);
        }
    }

    fn request_schedule<T: TransportClock + ?Sized>(&mut self, transport: &mut T, project: &Project) {
        self.target_bpm = project.tempo.bpm();
        transport.set_bpm(self.target_bpm);
        self.scheduler.dispose_all(transport);
        self.state = PlaybackState::Scheduling { attempts: 0 };
        self.scheduled_for = None;
    }

    /// Per-frame step. Returns the summary when a scheduling pass ran.
    pub fn on_frame<T: TransportClock + ?Sized>(
        &mut self,
        transport: &mut T,
        project: &Project,
        registry: &mut InstrumentRegistry,
    ) -> Option<ScheduleSummary> {
        match self.state {
            PlaybackState::Stopped => None,
            PlaybackState::Playing => {
                if self.scheduled_for != Some((project.instance(), project.revision()))
                    || project.tempo.bpm() != self.target_bpm
                {
                    debug!(
                        instance = project.instance(),
                        revision = project.revision(),
                        "Project changed during playback"
                    );
                    self.request_schedule(transport, project);
                }
                None
            }
            PlaybackState::Scheduling { attempts } => {
                let live = transport.bpm();
                if (live - self.target_bpm).abs() > self.config.tempo_tolerance_bpm {
                    if attempts < self.config.max_tempo_retries {
                        debug!(live, target = self.target_bpm, attempts, "Tempo not applied yet");
                        transport.set_bpm(self.target_bpm);
                        self.state = PlaybackState::Scheduling {
                            attempts: attempts + 1,
                        };
                        return None;
                    }
                    warn!(
                        live,
                        target = self.target_bpm,
                        "Transport tempo unconfirmed, scheduling anyway"
                    );
                }

                registry.dispose_for_removed_tracks(project);
                let summary = self.scheduler.schedule_project(transport, project, registry);
                self.state = PlaybackState::Playing;
                self.scheduled_for = Some((project.instance(), project.revision()));
                info!(
                    tracks = summary.tracks_scheduled,
                    groups = summary.groups,
                    "Playback scheduled"
                );
                Some(summary)
            }
        }
    }
}
