use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::Receiver;
use eyre::WrapErr;
use plotter_core::{
    App, Corner, LogEvent, LogSink, ManualCommand, OriginState, Phase, PlaybackOutcome,
    PlotterError, Settings, estimated_duration,
};
use plotter_hardware::{PortInfo, SimulatedPlotter};
use serde_json::json;

mod cli;
mod error_fmt;
mod logging;

use cli::{Cli, Commands, DEFAULT_CONFIG, JSON_MODE};

/// Events buffered between console drains.
const LOG_CAPACITY: usize = 1024;
/// How long to wait for a device reply after a query.
const REPLY_WAIT: Duration = Duration::from_millis(1500);
/// Foreground poll interval while a worker runs.
const TICK: Duration = Duration::from_millis(20);

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&e));
            } else {
                eprintln!("{}", error_fmt::humanize(&e));
            }
            error_fmt::exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn load_config(path: Option<&Path>) -> eyre::Result<plotter_config::Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG);
            if !p.exists() {
                return Ok(plotter_config::Config::default());
            }
            p
        }
    };
    plotter_config::load_file(&path)
        .map_err(|e| PlotterError::InvalidConfig(format!("{e:#}")).into())
}

/// Prints device replies as they arrive. Everything else reaches the operator
/// through the tracing mirror.
struct Console {
    rx: Receiver<LogEvent>,
    json: bool,
}

impl Console {
    fn show(&self, ev: &LogEvent) -> Option<String> {
        let LogEvent::Received(line) = ev else {
            return None;
        };
        if self.json {
            println!("{}", json!({ "received": line }));
        } else {
            println!("{ev}");
        }
        Some(line.clone())
    }

    fn drain(&self) -> Vec<String> {
        self.rx.try_iter().filter_map(|ev| self.show(&ev)).collect()
    }

    /// Print events until the first device reply or `wait` elapses.
    fn await_reply(&self, wait: Duration) -> Vec<String> {
        let deadline = Instant::now() + wait;
        let mut replies = self.drain();
        while replies.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.rx.recv_timeout(left) {
                Ok(ev) => replies.extend(self.show(&ev)),
                Err(_) => break,
            }
        }
        replies.extend(self.drain());
        replies
    }
}

struct Ctx {
    cfg: plotter_config::Config,
    /// Where `calibrate --save` writes the detected corner.
    config_path: PathBuf,
    port: Option<String>,
    sim: bool,
    remap: bool,
    json: bool,
    shutdown: Arc<AtomicBool>,
}

impl Ctx {
    fn connect(&self, app: &mut App) -> eyre::Result<()> {
        if self.sim {
            app.connect(&SimulatedPlotter::new(), "sim0")?;
            return Ok(());
        }
        let port = self
            .port
            .clone()
            .or_else(|| self.cfg.serial.port.clone())
            .ok_or_else(|| PlotterError::PortUnavailable {
                port: "<unset>".into(),
                reason: "no port configured; pass --port or set [serial] port".into(),
            })?;
        #[cfg(feature = "hardware")]
        {
            let connector = plotter_hardware::SerialConnector::new(
                self.cfg.serial.baud,
                Duration::from_millis(self.cfg.serial.read_timeout_ms),
            );
            app.connect(&connector, &port)?;
            Ok(())
        }
        #[cfg(not(feature = "hardware"))]
        {
            Err(PlotterError::PortUnavailable {
                port,
                reason: "built without serial support (feature `hardware`)".into(),
            }
            .into())
        }
    }

    fn load_drawing(&self, app: &mut App, path: &Path) -> eyre::Result<()> {
        app.load_drawing(path)?;
        if self.remap {
            app.remap_drawing()?;
        }
        if app.drawing().is_empty() {
            return Err(PlotterError::EmptyDrawing.into());
        }
        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let Cli {
        config,
        port,
        sim,
        corner,
        remap,
        json,
        log_level,
        cmd,
    } = cli;

    let cfg = load_config(config.as_deref())?;
    let config_path = config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    logging::init(json, &log_level, &cfg.logging)?;

    let mut settings = Settings::try_from(&cfg)?;
    if let Some(c) = corner {
        settings.origin = OriginState::detected(c);
    }
    if sim {
        // The simulated controller does not reset when opened.
        settings.session.open_settle = Duration::ZERO;
    }
    tracing::debug!(?settings, "settings resolved");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    let (log, rx) = LogSink::channel(LOG_CAPACITY);
    let console = Console { rx, json };
    let mut app = App::new(settings, log);
    let ctx = Ctx {
        cfg,
        config_path,
        port,
        sim,
        remap,
        json,
        shutdown,
    };

    match cmd {
        Commands::Ports => cmd_ports(&ctx),
        Commands::Plan { drawing } => cmd_plan(&ctx, &mut app, &drawing),
        Commands::Draw { drawing, no_home } => {
            cmd_draw(&ctx, &mut app, &console, &drawing, no_home)
        }
        Commands::Calibrate { corner, save } => {
            cmd_calibrate(&ctx, &mut app, &console, corner, save)
        }
        Commands::Probe { what } => cmd_manual(&ctx, &mut app, &console, what.into()),
        Commands::Home => cmd_manual(&ctx, &mut app, &console, ManualCommand::Home),
        Commands::Pen { state } => cmd_manual(&ctx, &mut app, &console, state.into()),
        Commands::SelfCheck => cmd_self_check(&ctx, &mut app, &console),
    }
}

fn cmd_ports(ctx: &Ctx) -> eyre::Result<()> {
    let ports: Vec<PortInfo> = if ctx.sim {
        vec![PortInfo {
            name: "sim0".into(),
            description: "simulated plotter".into(),
        }]
    } else {
        list_serial_ports()?
    };
    if ctx.json {
        let list: Vec<_> = ports
            .iter()
            .map(|p| json!({ "name": p.name, "description": p.description }))
            .collect();
        println!("{}", json!({ "ports": list }));
    } else if ports.is_empty() {
        println!("no serial ports found");
    } else {
        for p in &ports {
            println!("{}\t{}", p.name, p.description);
        }
    }
    Ok(())
}

#[cfg(feature = "hardware")]
fn list_serial_ports() -> eyre::Result<Vec<PortInfo>> {
    plotter_hardware::available_ports().wrap_err("enumerate serial ports")
}

#[cfg(not(feature = "hardware"))]
fn list_serial_ports() -> eyre::Result<Vec<PortInfo>> {
    tracing::warn!("built without serial support; only --sim is available");
    Ok(Vec::new())
}

fn cmd_plan(ctx: &Ctx, app: &mut App, drawing: &Path) -> eyre::Result<()> {
    ctx.load_drawing(app, drawing)?;
    let plan = app.plan()?;
    let pacing = *app.pacing();
    let mut tokens: Vec<String> = Vec::with_capacity(plan.len() + 1);
    let mut estimate = estimated_duration(&plan);
    if pacing.home_before_draw {
        tokens.push("H".into());
        estimate = estimate.saturating_add(pacing.home_settle);
    }
    tokens.extend(plan.iter().map(|c| c.command.to_string()));

    if ctx.json {
        println!(
            "{}",
            json!({
                "strokes": app.drawing().len(),
                "commands": tokens,
                "estimated_ms": u64::try_from(estimate.as_millis()).unwrap_or(u64::MAX),
            })
        );
    } else {
        for t in &tokens {
            println!("{t}");
        }
        println!(
            "# {} strokes, {} commands, ~{:.1}s",
            app.drawing().len(),
            tokens.len(),
            estimate.as_secs_f64()
        );
    }
    Ok(())
}

fn cmd_draw(
    ctx: &Ctx,
    app: &mut App,
    console: &Console,
    drawing: &Path,
    no_home: bool,
) -> eyre::Result<()> {
    ctx.load_drawing(app, drawing)?;
    if no_home {
        let mut pacing = *app.pacing();
        pacing.home_before_draw = false;
        app.set_pacing(pacing);
    }
    // Reject an unmappable drawing before touching the port.
    app.plan()?;
    ctx.connect(app)?;
    app.send_drawing()?;

    let mut cancel_sent = false;
    while app.status().drawing {
        console.drain();
        if ctx.cancelled() && !cancel_sent {
            tracing::warn!("cancel requested; stopping after the current command");
            app.cancel();
            cancel_sent = true;
        }
        std::thread::sleep(TICK);
    }
    let report = app
        .wait_playback()
        .ok_or_else(|| PlotterError::InvalidState("playback did not start".into()))?;
    console.drain();

    let outcome = match &report.outcome {
        PlaybackOutcome::Completed => "completed",
        PlaybackOutcome::Cancelled => "cancelled",
        PlaybackOutcome::Failed(_) => "failed",
    };
    if ctx.json {
        println!(
            "{}",
            json!({
                "outcome": outcome,
                "strokes_done": report.strokes_done,
                "commands_sent": report.commands_sent,
                "final_state": {
                    "x_steps": report.final_state.x_steps,
                    "y_steps": report.final_state.y_steps,
                    "pen_down": report.final_state.pen_down,
                },
            })
        );
    } else {
        println!(
            "drawing {outcome}: {}/{} strokes, {} commands",
            report.strokes_done,
            app.drawing().len(),
            report.commands_sent
        );
    }
    report.into_result()?;
    Ok(())
}

fn prompt_corner() -> eyre::Result<Corner> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        eprint!("Where did the head stop? [top-left|top-right|bottom-left|bottom-right]: ");
        let _ = std::io::stderr().flush();
        line.clear();
        if stdin.lock().read_line(&mut line).wrap_err("read corner")? == 0 {
            return Err(PlotterError::Cancelled.into());
        }
        match line.parse::<Corner>() {
            Ok(c) => return Ok(c),
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn cmd_calibrate(
    ctx: &Ctx,
    app: &mut App,
    console: &Console,
    answer: Option<Corner>,
    save: bool,
) -> eyre::Result<()> {
    ctx.connect(app)?;
    app.start_calibration()?;

    let mut answered = false;
    let mut cancel_sent = false;
    loop {
        console.drain();
        if ctx.cancelled() && !cancel_sent {
            app.cancel();
            cancel_sent = true;
        }
        match app.calibration_phase() {
            None => break,
            Some(p) if p.is_terminal() => break,
            Some(Phase::AwaitingOperatorCorner) if !answered && !cancel_sent => {
                let corner = match answer {
                    Some(c) => c,
                    None => match prompt_corner() {
                        Ok(c) => c,
                        Err(e) => {
                            app.cancel();
                            let _ = app.wait_calibration();
                            return Err(e);
                        }
                    },
                };
                app.confirm_corner(corner)?;
                answered = true;
            }
            Some(_) => {}
        }
        std::thread::sleep(TICK);
    }
    let corner = app
        .wait_calibration()
        .ok_or_else(|| PlotterError::InvalidState("calibration did not start".into()))??;
    console.drain();

    let saved = if save {
        save_origin(&ctx.config_path, corner)?;
        Some(ctx.config_path.display().to_string())
    } else {
        None
    };

    if ctx.json {
        println!("{}", json!({ "corner": corner.label(), "saved_to": saved }));
    } else {
        println!("origin detected at {corner}");
        match saved {
            Some(path) => println!("saved [origin] corner = \"{}\" to {path}", corner.label()),
            None => println!(
                "persist it with --save, or add:\n[origin]\ncorner = \"{}\"",
                corner.label()
            ),
        }
    }
    Ok(())
}

/// Rewrite `[origin] corner` in the config at `path`, creating the file if
/// it does not exist yet.
fn save_origin(path: &Path, corner: Corner) -> eyre::Result<()> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(PlotterError::from(e).into()),
    };
    let updated = plotter_config::with_origin_corner(&text, corner.try_into()?)
        .map_err(|e| PlotterError::InvalidConfig(format!("{}: {e:#}", path.display())))?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(PlotterError::from)?;
    }
    plotter_core::atomic::write_atomic(path, updated.as_bytes()).map_err(PlotterError::from)?;
    tracing::info!(path = %path.display(), corner = corner.label(), "origin saved to config");
    Ok(())
}

fn cmd_manual(ctx: &Ctx, app: &mut App, console: &Console, cmd: ManualCommand) -> eyre::Result<()> {
    ctx.connect(app)?;
    app.manual(cmd)?;
    let token = plotter_core::Command::from(cmd).to_string();
    let replies = match cmd {
        ManualCommand::PenUp | ManualCommand::PenDown => console.drain(),
        _ => console.await_reply(REPLY_WAIT),
    };
    if ctx.json {
        println!("{}", json!({ "sent": token, "replies": replies }));
    } else if replies.is_empty() {
        println!("sent {token}");
    }
    Ok(())
}

fn cmd_self_check(ctx: &Ctx, app: &mut App, console: &Console) -> eyre::Result<()> {
    let m = *app.machine();
    let origin = app.origin();
    let link_configured = ctx.sim || ctx.port.is_some() || ctx.cfg.serial.port.is_some();
    let mut reply = None;
    if link_configured {
        ctx.connect(app)?;
        app.manual(ManualCommand::Position)?;
        reply = console.await_reply(REPLY_WAIT).into_iter().next();
        if reply.is_none() {
            return Err(PlotterError::Transport("controller did not answer P".into()).into());
        }
    }

    if ctx.json {
        println!(
            "{}",
            json!({
                "config": "ok",
                "steps_per_mm": m.steps_per_mm(),
                "origin": if origin.detected { Some(origin.corner.label()) } else { None },
                "link": reply,
            })
        );
    } else {
        println!(
            "config ok: {} steps/mm, {}x{} mm work area, {}x{} input",
            m.steps_per_mm(),
            m.work_area_width_mm(),
            m.work_area_height_mm(),
            m.input_width(),
            m.input_height()
        );
        if origin.detected {
            println!("origin: {}", origin.corner);
        } else {
            println!("origin: not calibrated");
        }
        match reply {
            Some(r) => println!("controller ok: {r}"),
            None => println!("no port configured; link not checked"),
        }
    }
    Ok(())
}
