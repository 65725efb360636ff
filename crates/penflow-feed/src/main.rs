//! PenFlow live-data feeder.
//!
//! Usage: `penflow-feed <document-id> [ws-url]`
//!
//! Loads a stored document, connects its live-data channel (the document's
//! `websocket`, or the URL given on the command line) and applies every
//! inbound value while ticking animations. The document is saved back
//! periodically while values keep arriving.
//!
//! Storage lives in `$PENFLOW_STORAGE_DIR`, or the platform data directory
//! when unset.

use penflow_core::{FileStorage, Storage, StorageError, Topology};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const STORAGE_DIR_ENV: &str = "PENFLOW_STORAGE_DIR";
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const SAVE_INTERVAL: Duration = Duration::from_secs(30);

struct Args {
    document: String,
    url: Option<String>,
}

fn parse_args() -> Option<Args> {
    let mut args = std::env::args().skip(1);
    let document = args.next()?;
    Some(Args {
        document,
        url: args.next(),
    })
}

fn open_storage() -> Result<FileStorage, StorageError> {
    match std::env::var_os(STORAGE_DIR_ENV) {
        Some(dir) => FileStorage::new(PathBuf::from(dir)),
        None => FileStorage::default_location(),
    }
}

fn main() {
    env_logger::init();

    let Some(args) = parse_args() else {
        eprintln!("usage: penflow-feed <document-id> [ws-url]");
        std::process::exit(2);
    };
    if let Err(err) = run(args) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage()?;
    let data = pollster::block_on(storage.load(&args.document))?;
    log::info!(
        "Loaded {} ({} pens) from {}",
        args.document,
        data.pens.len(),
        storage.base_path().display()
    );

    let mut topology = Topology::default();
    topology.on("socket", |_, message| {
        log::debug!("Applied {}", message);
    });
    topology.open(data);
    if let Some(url) = args.url.as_deref() {
        topology.connect_socket(Some(url))?;
    }
    if !topology.is_socket_open() {
        log::warn!("Document has no live-data URL; nothing to feed");
        return Ok(());
    }

    let mut unsaved = 0usize;
    let mut last_save = Instant::now();
    while topology.is_socket_open() {
        unsaved += topology.pump_socket();
        topology.tick();

        if unsaved > 0 && last_save.elapsed() >= SAVE_INTERVAL {
            pollster::block_on(storage.save(&args.document, &topology.data()))?;
            log::info!("Saved {} after {} update(s)", args.document, unsaved);
            unsaved = 0;
            last_save = Instant::now();
        }
        std::thread::sleep(FRAME_INTERVAL);
    }

    if unsaved > 0 {
        pollster::block_on(storage.save(&args.document, &topology.data()))?;
    }
    topology.destroy();
    Ok(())
}
