mod settings;

use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{Receiver, Select};

use streamsnap_core::capture::capture_error::CaptureFault;
use streamsnap_core::capture::capture_events::{CaptureEvent, ChannelEvents};
use streamsnap_core::capture::capture_manager::CaptureManager;
use streamsnap_core::capture::capture_settings::ImageFormat;
use streamsnap_core::history::history_store::{HistoryStore, NullHistoryStore};
use streamsnap_core::history::json_history_store::JsonHistoryStore;
use streamsnap_core::shared::stream_locator::StreamLocator;
use streamsnap_core::storage::capture_store::CaptureStore;
use streamsnap_core::video::domain::video_source::Transport;
use streamsnap_core::video::infrastructure::ffmpeg_source::FfmpegSource;
use streamsnap_core::video::infrastructure::image_file_writer::ImageFileWriter;

use settings::Settings;

/// Periodic snapshots from RTMP streams, filed into per-minute folders.
#[derive(Parser)]
#[command(name = "streamsnap", version)]
struct Cli {
    /// Capture root directory (overrides the settings file).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture about one frame per second until interrupted.
    Capture(CaptureArgs),
    /// List capture folders, newest first.
    Folders,
    /// List the frames in a capture folder, oldest first.
    Images { folder: String },
    /// List previously captured streams, most recent first.
    History {
        /// Forget this stream address instead of listing.
        #[arg(long)]
        remove: Option<String>,
    },
    /// Check whether a stream address is well formed.
    Validate { url: String },
    /// Show the settings file, or write one with the defaults.
    Config {
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct CaptureArgs {
    /// Stream address, e.g. rtmp://host:1935/live/key
    url: String,

    /// Frame format: jpg or png.
    #[arg(long)]
    format: Option<ImageFormat>,

    /// JPEG quality (1-100).
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Give up opening the stream after this many milliseconds.
    #[arg(long)]
    open_timeout_ms: Option<u64>,

    /// Treat a read as failed after this many milliseconds.
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Transport hint: tcp or udp.
    #[arg(long)]
    transport: Option<Transport>,

    /// Scale saved frames to WIDTHxHEIGHT.
    #[arg(long)]
    resize: Option<Resize>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<u64>,

    /// Do not add the stream to the history file.
    #[arg(long)]
    no_history: bool,
}

impl CaptureArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(format) = self.format {
            settings.image_format = format;
        }
        if let Some(quality) = self.jpeg_quality {
            settings.jpeg_quality = quality;
        }
        if let Some(ms) = self.open_timeout_ms {
            settings.open_timeout_ms = ms;
        }
        if let Some(ms) = self.read_timeout_ms {
            settings.read_timeout_ms = ms;
        }
        if let Some(transport) = self.transport {
            settings.transport = transport;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Resize {
    width: u32,
    height: u32,
}

impl FromStr for Resize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Resize must look like 640x360, got '{s}'");
        let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load();
    if let Some(root) = cli.root {
        settings.capture_root = root;
    }

    match cli.command {
        Command::Capture(args) => run_capture(&args, settings),
        Command::Folders => {
            for folder in CaptureStore::new(&settings.capture_root)?.list_folders()? {
                println!("{folder}");
            }
            Ok(())
        }
        Command::Images { folder } => {
            for image in CaptureStore::new(&settings.capture_root)?.list_images(&folder)? {
                println!("{image}");
            }
            Ok(())
        }
        Command::History { remove } => run_history(&settings, remove.as_deref()),
        Command::Validate { url } => {
            let locator = StreamLocator::parse(&url, true)?;
            let port = locator
                .port()
                .map_or_else(|| "default".to_string(), |p| p.to_string());
            println!(
                "{locator}: host {}, port {port}, path {}",
                locator.host(),
                locator.path()
            );
            Ok(())
        }
        Command::Config { init } => run_config(&settings, init),
    }
}

fn run_capture(args: &CaptureArgs, mut settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    StreamLocator::parse(&args.url, true)?;
    args.apply(&mut settings);

    let mut capture_settings = settings.capture_settings();
    capture_settings.resize = args.resize.map(|r| (r.width, r.height));

    let history: Arc<dyn HistoryStore> = if args.no_history {
        Arc::new(NullHistoryStore)
    } else {
        Arc::new(JsonHistoryStore::open(&settings.history_file))
    };
    let manager = CaptureManager::new(
        CaptureStore::new(&settings.capture_root)?,
        Arc::new(FfmpegSource::new()),
        Arc::new(ImageFileWriter::new().with_jpeg_quality(settings.jpeg_quality)),
        history,
        capture_settings,
    );

    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })?;

    let (events, event_rx) = ChannelEvents::new();
    let folder = manager.start(&args.url, events)?;
    eprintln!(
        "Capturing {} into {} (Ctrl-C to stop)",
        args.url,
        manager.store().root().join(&folder).display()
    );

    let deadline = match args.duration {
        Some(secs) => crossbeam_channel::after(Duration::from_secs(secs)),
        None => crossbeam_channel::never(),
    };
    let mut summary = Summary::default();
    watch(&event_rx, &interrupt_rx, &deadline, &mut summary);

    manager.stop();
    for event in event_rx.try_iter() {
        summary.report(&event);
    }
    eprintln!(
        "Saved {} frames in {} folders, {} errors",
        summary.frames, summary.folders, summary.errors
    );

    match summary.terminal {
        Some(fault) => Err(format!("capture ended: {fault}").into()),
        None => Ok(()),
    }
}

/// Prints events until the session ends, Ctrl-C, or the deadline fires.
fn watch(
    events: &Receiver<CaptureEvent>,
    interrupt: &Receiver<()>,
    deadline: &Receiver<std::time::Instant>,
    summary: &mut Summary,
) {
    let mut select = Select::new();
    let events_idx = select.recv(events);
    let interrupt_idx = select.recv(interrupt);
    select.recv(deadline);

    loop {
        let op = select.select();
        let index = op.index();
        if index == events_idx {
            match op.recv(events) {
                Ok(CaptureEvent::Stopped) | Err(_) => {
                    log::info!("Capture session ended");
                    return;
                }
                Ok(event) => summary.report(&event),
            }
        } else if index == interrupt_idx {
            let _ = op.recv(interrupt);
            eprintln!("Stopping...");
            return;
        } else {
            let _ = op.recv(deadline);
            log::info!("Capture duration elapsed");
            return;
        }
    }
}

#[derive(Default)]
struct Summary {
    frames: usize,
    folders: usize,
    errors: usize,
    terminal: Option<CaptureFault>,
}

impl Summary {
    fn report(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Frame { folder, filename } => {
                self.frames += 1;
                println!("{folder}/{filename}");
            }
            CaptureEvent::NewFolder(folder) => {
                self.folders += 1;
                eprintln!("New folder: {folder}");
            }
            CaptureEvent::Error(fault) => {
                self.errors += 1;
                eprintln!("Error: {fault}");
                if fault.is_terminal() {
                    self.terminal = Some(fault.clone());
                }
            }
            CaptureEvent::Stopped => {}
        }
    }
}

fn run_history(settings: &Settings, remove: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let history = JsonHistoryStore::open(&settings.history_file);
    if let Some(url) = remove {
        if history.remove(url)? {
            eprintln!("Removed {url}");
        } else {
            eprintln!("{url} is not in history");
        }
        return Ok(());
    }
    let entries = history.entries();
    if entries.is_empty() {
        eprintln!("No streams recorded in {}", history.path().display());
    }
    for entry in entries {
        println!("{}  {}", entry.last_used, entry.url);
    }
    Ok(())
}

fn run_config(settings: &Settings, init: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Settings::config_path().ok_or("No configuration directory on this system")?;
    if init {
        if path.exists() {
            return Err(format!("{} already exists", path.display()).into());
        }
        Settings::default().save_to(&path)?;
        eprintln!("Wrote {}", path.display());
        return Ok(());
    }
    eprintln!("{}", path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resize_parse() {
        assert_eq!(
            "640x360".parse::<Resize>(),
            Ok(Resize {
                width: 640,
                height: 360
            })
        );
        assert_eq!(
            "1280X720".parse::<Resize>().map(|r| r.width),
            Ok(1280)
        );
        assert!("640".parse::<Resize>().is_err());
        assert!("0x360".parse::<Resize>().is_err());
        assert!("axb".parse::<Resize>().is_err());
    }

    #[test]
    fn test_capture_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "streamsnap",
            "capture",
            "rtmp://host/live/a",
            "--format",
            "png",
            "--read-timeout-ms",
            "750",
            "--transport",
            "udp",
            "--resize",
            "320x240",
        ])
        .unwrap();
        let Command::Capture(args) = cli.command else {
            panic!("expected capture command");
        };
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(settings.image_format, ImageFormat::Png);
        assert_eq!(settings.read_timeout_ms, 750);
        assert_eq!(settings.open_timeout_ms, 5000);
        assert_eq!(settings.transport, Transport::Udp);
        assert_eq!(
            args.resize,
            Some(Resize {
                width: 320,
                height: 240
            })
        );
    }

    #[test]
    fn test_global_root_flag() {
        let cli = Cli::try_parse_from(["streamsnap", "folders", "--root", "/tmp/frames"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/frames")));
        assert!(matches!(cli.command, Command::Folders));
    }

    #[test]
    fn test_summary_tracks_terminal_fault() {
        let mut summary = Summary::default();
        summary.report(&CaptureEvent::NewFolder("20240101_0000".into()));
        summary.report(&CaptureEvent::Frame {
            folder: "20240101_0000".into(),
            filename: "frame_20240101_000000.jpg".into(),
        });
        summary.report(&CaptureEvent::Error(CaptureFault::Read {
            attempt: 1,
            reason: "timeout".into(),
        }));
        assert!(summary.terminal.is_none());

        summary.report(&CaptureEvent::Error(CaptureFault::Reconnect {
            locator: "rtmp://host/live/a".into(),
            reason: "refused".into(),
        }));
        assert_eq!((summary.frames, summary.folders, summary.errors), (1, 1, 2));
        assert!(summary.terminal.is_some());
    }

    #[test]
    fn test_watch_returns_when_session_ends() {
        use streamsnap_core::capture::capture_events::CaptureEvents;

        let (events, rx) = ChannelEvents::new();
        let (_interrupt_tx, interrupt_rx) = crossbeam_channel::bounded::<()>(1);
        events.on_new_folder("20240101_0000");
        events.on_stopped();

        let mut summary = Summary::default();
        watch(&rx, &interrupt_rx, &crossbeam_channel::never(), &mut summary);
        assert_eq!(summary.folders, 1);
    }

    #[test]
    fn test_watch_returns_on_interrupt() {
        let (_events, rx) = ChannelEvents::new();
        let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
        interrupt_tx.send(()).unwrap();

        let mut summary = Summary::default();
        watch(&rx, &interrupt_rx, &crossbeam_channel::never(), &mut summary);
        assert_eq!(summary.frames, 0);
    }
}
