use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ringbuf::traits::Consumer;
use seqdaw::instrument::{InstrumentRegistry, RecordingFactory};
use seqdaw::project::{Project, ProjectLoadOptions, ProjectManager};
use seqdaw::sequencer::timeline::ticks_to_seconds;
use seqdaw::{
    create_playhead_channel, EngineConfig, PlayheadReporter, SequencerPlayer, Transport,
    TransportClock,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "MIDI sequencer core: project files, SMF codec and playback simulation")]
struct Cli {
    /// Engine configuration (RON). Defaults to the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print tempo, meter, tracks and length of a project or MIDI file.
    Inspect(InspectArgs),
    /// Convert a MIDI file into a project file.
    Convert(ConvertArgs),
    /// Export a project file as a Standard MIDI File.
    Export(ExportArgs),
    /// Create an empty project file.
    New(NewArgs),
    /// Play a project against the in-process transport and print what fires.
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct InspectArgs {
    /// Project (.seqdaw) or MIDI (.mid) file.
    input: PathBuf,
}

#[derive(Args)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,
}

#[derive(Args)]
struct ExportArgs {
    input: PathBuf,
    output: PathBuf,
}

#[derive(Args)]
struct NewArgs {
    name: String,
    output: PathBuf,
}

#[derive(Args)]
struct SimulateArgs {
    /// Project (.seqdaw) or MIDI (.mid) file.
    input: PathBuf,
    /// Seconds of playback to simulate.
    #[arg(long, default_value_t = 4.0)]
    seconds: f64,
    /// Animation frames per second.
    #[arg(long, default_value_t = 60)]
    fps: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref());
    let manager = ProjectManager::new(config.codec);

    match cli.command {
        Commands::Inspect(args) => inspect(&manager, &args.input),
        Commands::Convert(args) => {
            let project = manager
                .project_from_midi_file(&args.input)
                .with_context(|| format!("failed to import {}", args.input.display()))?;
            manager.save_project(&project, &args.output)?;
            println!(
                "Wrote {} ({} tracks, {} notes)",
                args.output.display(),
                project.tracks.len(),
                project.note_count()
            );
            Ok(())
        }
        Commands::Export(args) => {
            let project = load_any(&manager, &args.input)?;
            let summary = manager.export_midi_file(&project, &args.output)?;
            println!(
                "Wrote {} ({} tracks, {} notes, {:.2}s)",
                args.output.display(),
                summary.tracks,
                summary.notes,
                summary.duration_seconds
            );
            Ok(())
        }
        Commands::New(args) => {
            let project = manager.create_new_project(args.name);
            manager.save_project(&project, &args.output)?;
            println!("Created {}", args.output.display());
            Ok(())
        }
        Commands::Simulate(args) => simulate(&manager, &config, &args),
    }
}

fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
}

fn load_any(manager: &ProjectManager, path: &Path) -> Result<Project> {
    let project = if is_midi_file(path) {
        manager.project_from_midi_file(path)
    } else {
        manager.load_project(path, &ProjectLoadOptions::default())
    };
    project.with_context(|| format!("failed to open {}", path.display()))
}

fn inspect(manager: &ProjectManager, path: &Path) -> Result<()> {
    let project = load_any(manager, path)?;
    let time_base = project.time_base();
    let bars = project.song_length_bars();

    println!("{}", project.metadata.name);
    println!("  Tempo:          {}", project.tempo);
    println!("  Time signature: {}", project.time_signature);
    println!(
        "  Length:         {} bars ({:.2}s)",
        bars,
        time_base.bars_to_seconds(bars as f64)
    );
    println!("  Notes:          {}", project.note_count());
    for track in &project.tracks {
        let clips = project.arrangement_clips_for(&track.id).count();
        println!(
            "  - {} [{:?}, {}] {} clip(s){}{}",
            track.name,
            track.track_type,
            track.instrument.as_deref().unwrap_or("none"),
            clips,
            if track.mute { ", muted" } else { "" },
            if track.solo { ", solo" } else { "" },
        );
    }
    Ok(())
}

fn simulate(manager: &ProjectManager, config: &EngineConfig, args: &SimulateArgs) -> Result<()> {
    let project = load_any(manager, &args.input)?;
    let factory = RecordingFactory::new();
    let log = factory.log();
    let mut registry = InstrumentRegistry::new(Box::new(factory));
    let mut transport = Transport::new(project.tempo);
    let mut player = SequencerPlayer::new(config.scheduler, config.playback);
    let (producer, mut consumer) = create_playhead_channel(config.playback.playhead_channel_capacity);
    let mut reporter = PlayheadReporter::new(producer);

    player.play(&mut transport, &project);
    reporter.start(project.time_signature);

    let frame = 1.0 / f64::from(args.fps.max(1));
    let frames = (args.seconds.max(0.0) / frame).ceil() as u64;
    let mut last_beat = None;
    info!(frames, frame, "Simulation started");

    for _ in 0..frames {
        if let Some(summary) = player.on_frame(&mut transport, &project, &mut registry) {
            println!(
                "scheduled {} track(s), {} group(s), {} skipped",
                summary.tracks_scheduled, summary.groups, summary.tracks_skipped
            );
        }
        transport.advance(frame);
        reporter.on_frame(&transport);

        while let Some(update) = consumer.try_pop() {
            let beat = (update.position.bar, update.position.beat);
            if last_beat != Some(beat) {
                last_beat = Some(beat);
                println!("{:>8.3}s  playhead {}", update.seconds, update.position);
            }
        }
        for record in log.lock().drain(..) {
            let names: Vec<String> = record.notes.iter().map(ToString::to_string).collect();
            println!(
                "{:>8.3}s  {} {} [{}] {:.3}s {:.1} dB",
                record.time,
                if record.chord { "chord" } else { "note " },
                record.source,
                names.join(" "),
                record.duration,
                record.gain_db
            );
        }
    }

    let elapsed = transport.elapsed_seconds();
    let tick_ms = ticks_to_seconds(1.0, transport.bpm()) * 1000.0;
    player.stop(&mut transport);
    reporter.stop();
    println!("stopped at {:.3}s, one tick = {:.4}ms", elapsed, tick_ms);
    Ok(())
}
