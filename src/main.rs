use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use tonnetz::{
    EngineConfig, FileSource, HandlerSet, NotationScheme, PlayState, Player, YamlFileStore,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "Usage: tonnetz [--config FILE] [--notation sharps|flats] [--dump] <file.mid>";

/// One frame at 60 Hz, the cadence a browser host ticks at.
const FRAME: Duration = Duration::from_millis(16);

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

struct Args {
    config: Option<PathBuf>,
    notation: Option<NotationScheme>,
    dump: bool,
    input: PathBuf,
}

fn parse_args() -> Result<Args, String> {
    let mut config = None;
    let mut notation = None;
    let mut dump = false;
    let mut input = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a file")?;
                config = Some(PathBuf::from(path));
            }
            "--notation" => {
                let value = args.next().ok_or("--notation needs sharps or flats")?;
                notation = Some(value.parse::<NotationScheme>()?);
            }
            "--dump" => dump = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => return Err(format!("unknown option '{}'", flag)),
            _ if input.is_none() => input = Some(PathBuf::from(&arg)),
            _ => return Err(format!("unexpected argument '{}'", arg)),
        }
    }

    Ok(Args {
        config,
        notation,
        dump,
        input: input.ok_or(USAGE)?,
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    let config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "could not load config");
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    if args.dump {
        dump(&args.input, &config);
    } else {
        play(&args, config);
    }
}

fn read_midi(path: &Path, config: &EngineConfig) -> Vec<u8> {
    if let Err(e) = FileSource::new(&path.to_string_lossy(), None).check(config) {
        error!(error = %e, "refusing to load");
        process::exit(1);
    }
    match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %path.display(), error = %e, "could not read file");
            process::exit(1);
        }
    }
}

fn dump(path: &Path, config: &EngineConfig) {
    let bytes = read_midi(path, config);
    let timeline = match tonnetz::parse_with(&bytes, config) {
        Ok(timeline) => timeline,
        Err(e) => {
            error!(error = %e, "parse failed");
            process::exit(1);
        }
    };
    match serde_json::to_string_pretty(&timeline) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!(error = %e, "could not serialize timeline");
            process::exit(1);
        }
    }
}

fn play(args: &Args, config: EngineConfig) {
    let mut store = YamlFileStore::new(config.preferences_path.clone());
    let mut player = Player::with_preferences(config, &store);

    if let Some(scheme) = args.notation {
        match player.save_notation(scheme, &mut store) {
            Ok(()) => info!(notation = %scheme, path = %store.path().display(), "notation saved"),
            Err(e) => error!(error = %e, "could not save notation preference"),
        }
    }

    player.install_handlers(
        HandlerSet::new()
            .on_note_start(|n| {
                info!(time = n.time, note = %n.name, velocity = n.velocity, track = n.track_index, "note on");
                Ok(())
            })
            .on_note_end(|n| {
                info!(time = n.time, note = %n.name, "note off");
                Ok(())
            })
            .on_chord_start(|c| {
                let notes: Vec<u8> = c.notes.iter().map(|n| n.midi_number).collect();
                info!(time = c.time, notes = ?notes, "chord on");
                Ok(())
            })
            .on_chord_end(|c| {
                info!(time = c.time, "chord off");
                Ok(())
            }),
    );

    player.on_ready(|meta| {
        info!(
            tempo = meta.tempo_bpm,
            time_signature = ?meta.time_signature,
            tracks = meta.track_count,
            duration = meta.duration_seconds,
            "ready"
        );
    });

    let bytes = read_midi(&args.input, player.config());
    player.begin_load(bytes);
    let deadline = Instant::now() + LOAD_TIMEOUT;
    loop {
        match player.poll_load() {
            Some(Ok(_)) => break,
            Some(Err(e)) => {
                error!(error = %e, "load failed");
                process::exit(1);
            }
            None if Instant::now() >= deadline => {
                error!("timed out waiting for the file to parse");
                process::exit(1);
            }
            None => thread::sleep(FRAME),
        }
    }

    let clock = Instant::now();
    player.start(0.0);
    while player.state() == PlayState::Playing {
        thread::sleep(FRAME);
        player.tick(clock.elapsed().as_secs_f64());
    }
}
