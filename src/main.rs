use pulsegrid::sequencer::store::PatternSnapshot;
use pulsegrid::{Pattern, Session, SessionConfig};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Four-on-the-floor groove played when the binary starts
const DEMO_GROOVE: &[(&str, &str)] = &[
    ("kick", "X---X---X---X---"),
    ("snare", "----X-------X---"),
    ("clap", "------------X---"),
    ("hihat", "--X---X---X---X-"),
    ("bass", "X--X--X---X--X--"),
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match SessionConfig::load(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                error!("Could not load {}: {}", path.display(), e);
                return;
            }
        },
        None => SessionConfig::default(),
    };

    let session = match Session::open(config) {
        Ok(session) => session,
        Err(e) => {
            error!("Could not start session: {}", e);
            return;
        }
    };

    for (instrument, steps) in DEMO_GROOVE {
        session.store().set_pattern(*instrument, Pattern::from(*steps));
    }
    log_snapshot(&session.store().snapshot());

    if let Err(e) = session.play() {
        error!("Could not start the clock: {}", e);
        return;
    }

    info!("Playing, press Enter to stop");
    let mut line = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
        error!("stdin error: {}", e);
    }

    session.shutdown();
    info!("Bye");
}

fn log_snapshot(snapshot: &PatternSnapshot) {
    info!("{} BPM, {} steps", snapshot.bpm, snapshot.steps);
    for (instrument, pattern) in &snapshot.instruments {
        info!("{:>6} {}", instrument, pattern);
    }
}
