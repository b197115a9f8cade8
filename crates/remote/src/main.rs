use std::{io::stdout, path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use crossterm::{
    cursor::{Hide, Show},
    event::{
        DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        EventStream,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, warn, LevelFilter};
use rover_control::{Controller, DEFAULT_GEAR};
use rover_geom::Size;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt as _};

use crate::{
    connection::{ConnectionManager, RetryPolicy},
    display::Bell,
    session::{Event, Session},
    surface::TerminalSurface,
    websocket::WebSocket,
};

mod connection;
mod display;
mod session;
mod surface;
mod websocket;

/// Drive the rover with the mouse: press and drag on the pad to move, let go
/// to stop.
#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// Where the rover is listening, as `host:port` or a `ws://` url.
    address: String,

    /// Milliseconds to wait before reconnecting.
    #[arg(long, default_value_t = 3000)]
    retry_ms: u64,

    /// Stop reconnecting after this many failed attempts in a row.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Speeds for the gear keys 1 to 9.
    #[arg(long, value_delimiter = ',', default_values_t = [100u8, 140, 180, 255])]
    gears: Vec<u8>,

    /// The gear to start in.
    #[arg(long, default_value_t = DEFAULT_GEAR)]
    gear: u8,

    /// Width of a terminal cell, in pixels.
    #[arg(long, default_value_t = 8.0)]
    cell_width: f32,

    /// Height of a terminal cell, in pixels.
    #[arg(long, default_value_t = 16.0)]
    cell_height: f32,

    /// Ring the terminal bell as haptic feedback.
    #[arg(long)]
    bell: bool,

    /// Where to write logs. The terminal belongs to the pad.
    #[arg(long, default_value = "remote.log")]
    log_file: PathBuf,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

async fn run(args: Args) -> anyhow::Result<()> {
    let surface = TerminalSurface::new(Size::new(args.cell_width, args.cell_height));
    let policy = RetryPolicy {
        interval: Duration::from_millis(args.retry_ms),
        max_attempts: args.max_retries,
    };

    let mut link = ConnectionManager::new();
    let link_events = link.open(WebSocket, args.address, policy);
    let mut session = Session::new(
        surface,
        Bell { enabled: args.bell },
        Controller::new(args.gear),
        link,
    );

    let gears = args.gears;
    let input = EventStream::new().filter_map(move |ev| match ev {
        Ok(ev) => surface::translate(&ev, &surface, &gears),
        Err(e) => {
            warn!("terminal input error: {e}");
            None
        }
    });
    let mut events = UnboundedReceiverStream::new(link_events)
        .map(Event::Link)
        .merge(input);

    let mut out = stdout();
    display::draw(&mut out, &session.status(), session.frame(), &surface)?;
    while let Some(ev) = events.next().await {
        if session.handle(ev).is_break() {
            break;
        }
        display::draw(&mut out, &session.status(), session.frame(), &surface)?;
    }

    let status = session.status();
    let counters = session.counters();
    let dispatch = session.dispatch_counters();
    info!(
        "done: {} commands dispatched ({} repeats skipped), {} sent, {} dropped, {} connections",
        dispatch.dispatched,
        dispatch.repeats,
        status.link.sent,
        status.link.dropped,
        status.link.opened,
    );
    info!(
        "{} moves before calibration, {} failed calibrations",
        counters.uncalibrated_moves,
        counters.failed_calibrations,
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    simple_logging::log_to_file(&args.log_file, args.log_level)
        .with_context(|| format!("failed to open log file {}", args.log_file.display()))?;

    enable_raw_mode()?;
    execute!(
        stdout(),
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange,
        Hide
    )?;

    let result = run(args).await;

    disable_raw_mode()?;
    execute!(
        stdout(),
        Show,
        DisableFocusChange,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;

    result
}
