//! Application runner - headless main loop for the `folio` binary.
//!
//! **Loop** (~60Hz, single thread owns the `Viewer`):
//! 1. drain intents from the stdin thread, `Viewer::apply()` each
//! 2. `Viewer::tick()` for auto-advance
//! 3. `Viewer::pump()` for finished loads/renders
//! 4. write PNG snapshots of painted pages, print status lines
//!
//! Stdin closing does not stop the loop; use `q` or `--run-for`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, unbounded};
use log::{debug, info, trace, warn};

use crate::cli::Args;
use crate::config::{self, PathConfig, Settings};
use crate::core::document::DocumentInput;
use crate::core::navigation::{Keymap, NavIntent};
use crate::core::viewer::{Viewer, ViewerEvent};
use crate::core::workers::Workers;
use crate::sources::ImageLoader;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Settings with CLI overrides applied
fn effective_settings(args: &Args, mut settings: Settings) -> Settings {
    if let Some(dwell) = args.dwell {
        settings.dwell_seconds = dwell;
    }
    if args.mute {
        settings.sound_enabled = false;
    }
    if let Some(height) = args.viewport_height {
        settings.viewport_height = height;
    }
    settings
}

fn load_settings(path_config: &PathConfig) -> Settings {
    let path = config::config_file(config::SETTINGS_FILE, path_config);
    let existed = path.exists();
    let settings = Settings::load(&path).unwrap_or_else(|e| {
        warn!("{:#}, using defaults", e);
        Settings::default()
    });
    if !existed {
        // Leave an editable file behind on first run
        if let Err(e) = settings.save(&path) {
            warn!("{:#}", e);
        }
    }
    settings
}

/// Reads stdin lines on a background thread and forwards parsed intents
fn spawn_input(keymap: Keymap) -> Result<Receiver<NavIntent>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("folio-input".into())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                match keymap.parse_line(&line) {
                    Some(intent) => {
                        if tx.send(intent).is_err() {
                            break;
                        }
                    }
                    None if !line.trim().is_empty() => eprintln!("Unknown key: {}", line.trim()),
                    None => {}
                }
            }
            debug!("stdin closed");
        })
        .context("Failed to spawn input thread")?;
    Ok(rx)
}

/// Initial page/zoom/auto state from the CLI, applied once the document is loaded
fn apply_start(args: &Args, viewer: &mut Viewer) {
    if let Some(page) = args.start_page
        && !viewer.jump_to_page(page)
    {
        warn!("Start page {} out of range 1..={}", page, viewer.page_count());
    }
    if let Some(zoom) = args.zoom {
        viewer.set_zoom(zoom);
    }
    if args.auto_advance {
        viewer.set_auto_advance(true);
    }
}

fn print_status(viewer: &Viewer) {
    let auto = viewer.auto_advance();
    println!(
        "[page {}/{}] zoom {:.2} | auto {} ({}s, sound {})",
        viewer.current_page(),
        viewer.page_count(),
        viewer.zoom(),
        if auto.is_active() { "on" } else { "off" },
        auto.dwell_seconds(),
        if auto.sound_enabled() { "on" } else { "off" },
    );
}

/// None when a newer render already took the surface
fn write_snapshot(viewer: &Viewer, dir: &Path, page: u32) -> Result<Option<PathBuf>> {
    let Some(surface) = viewer.surface() else {
        return Ok(None);
    };
    if surface.painted().map(|(p, _)| p) != Some(page) {
        return Ok(None);
    }
    let path = dir.join(format!("page_{:04}.png", page));
    surface
        .pixels()
        .save(&path)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    Ok(Some(path))
}

/// Run the viewer with given arguments until quit
pub fn run_app(args: Args) -> Result<()> {
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        warn!("Failed to create application directories: {:#}", e);
    }
    info!(
        "Config path: {}",
        config::config_file(config::SETTINGS_FILE, &path_config).display()
    );

    let settings = effective_settings(&args, load_settings(&path_config));
    trace!("Settings: {:?}", settings);

    let Some(path) = args.path.clone() else {
        use clap::CommandFactory;
        Args::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Some(dir) = &args.snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;
    }

    let epoch = Arc::new(AtomicU64::new(0));
    let workers = Arc::new(
        Workers::new(settings.worker_count(), Arc::clone(&epoch)).context("Failed to start worker pool")?,
    );
    info!("Worker pool: {} threads", workers.len());

    let mut viewer =
        Viewer::new(Arc::new(ImageLoader), workers, epoch).with_options(&settings.viewer_options());
    let intents = spawn_input(Keymap::default())?;
    let deadline = args.run_for.map(|secs| Instant::now() + Duration::from_secs(secs));

    viewer.open(DocumentInput::Path(path));

    loop {
        let frame_start = Instant::now();

        let mut quit = false;
        while let Ok(intent) = intents.try_recv() {
            if intent == NavIntent::Quit {
                quit = true;
                break;
            }
            if viewer.apply(intent) {
                print_status(&viewer);
            }
        }
        if quit {
            info!("Quit requested");
            break;
        }

        let mut events: Vec<ViewerEvent> = viewer.tick().into_iter().collect();
        events.extend(viewer.pump());

        for event in events {
            match event {
                ViewerEvent::DocumentLoaded { page_count } => {
                    println!("Loaded {} page(s)", page_count);
                    apply_start(&args, &mut viewer);
                    print_status(&viewer);
                }
                ViewerEvent::DocumentFailed(err) => {
                    bail!(err);
                }
                ViewerEvent::PagePainted { page, zoom } => {
                    debug!("Painted page {} @ {:.2}", page, zoom);
                    if let Some(dir) = &args.snapshot_dir {
                        match write_snapshot(&viewer, dir, page) {
                            Ok(Some(path)) => println!("Snapshot: {}", path.display()),
                            Ok(None) => trace!("Page {} superseded before snapshot", page),
                            Err(e) => warn!("{:#}", e),
                        }
                    }
                }
                ViewerEvent::RenderFailed(err) => {
                    eprintln!("{}", err);
                }
                ViewerEvent::AutoAdvanced { .. } => print_status(&viewer),
                ViewerEvent::AutoAdvanceFinished => {
                    println!("Auto-advance reached the last page");
                }
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run time elapsed");
            break;
        }

        let spent = frame_start.elapsed();
        if spent < FRAME_INTERVAL {
            thread::sleep(FRAME_INTERVAL - spent);
        }
    }

    let stats = viewer.render_stats();
    info!(
        "Renders: {} requested, {} painted, {} superseded, {} failed",
        stats.requested, stats.painted, stats.superseded, stats.failed
    );
    Ok(())
}
