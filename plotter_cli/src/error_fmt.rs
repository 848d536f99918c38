//! Human-readable error descriptions and structured JSON error formatting.

use plotter_core::PlotterError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(pe) = err.downcast_ref::<PlotterError>() {
        return match pe {
            PlotterError::OriginNotCalibrated => {
                "What happened: The machine origin is not known, so input points cannot be mapped to millimeters.\nLikely causes: Corner detection has not been run, or the drawing was captured before it and never remapped.\nHow to fix: Run `plotter calibrate`, persist the corner under [origin] in the config (or pass --corner), and add --remap for drawings saved without physical coordinates.".to_string()
            }
            PlotterError::PortUnavailable { port, reason } => format!(
                "What happened: Could not open port {port} ({reason}).\nLikely causes: Plotter unplugged, wrong port name, or the port is held by another program.\nHow to fix: Check the cable, list ports with `plotter ports`, then pass --port or set [serial] port."
            ),
            PlotterError::Transport(msg) => format!(
                "What happened: The link to the plotter failed ({msg}).\nLikely causes: Cable pulled, controller reset, or power loss mid-run.\nHow to fix: Reconnect and home the machine before sending again; the head position is no longer trusted."
            ),
            PlotterError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            PlotterError::EmptyDrawing => {
                "What happened: The drawing has no strokes.\nLikely causes: Empty or wrong drawing file.\nHow to fix: Check the --drawing path; nothing was sent.".to_string()
            }
            PlotterError::Cancelled => {
                "What happened: Cancelled by operator.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Nothing to fix; the pen was lifted if it was down. Home before the next run.".to_string()
            }
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes; anything untyped is 1. Usage errors (2) come from clap.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<PlotterError>() {
        Some(PlotterError::OriginNotCalibrated) => 3,
        Some(PlotterError::PortUnavailable { .. }) => 4,
        Some(PlotterError::Transport(_)) => 5,
        Some(PlotterError::Cancelled) => 6,
        Some(PlotterError::InvalidConfig(_)) => 7,
        Some(PlotterError::EmptyDrawing) => 8,
        _ => 1,
    }
}

/// Short machine-readable name for the error kind.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<PlotterError>() {
        Some(PlotterError::PortUnavailable { .. }) => "PortUnavailable",
        Some(PlotterError::Transport(_)) => "Transport",
        Some(PlotterError::OriginNotCalibrated) => "OriginNotCalibrated",
        Some(PlotterError::InvalidConfig(_)) => "InvalidConfig",
        Some(PlotterError::EmptyDrawing) => "EmptyDrawing",
        Some(PlotterError::Cancelled) => "Cancelled",
        Some(PlotterError::Busy(_)) => "Busy",
        Some(PlotterError::InvalidState(_)) => "InvalidState",
        Some(PlotterError::Io(_)) => "Io",
        Some(PlotterError::Format(_)) => "Format",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(PlotterError::PortUnavailable { port, .. }) = err.downcast_ref::<PlotterError>() {
        obj["details"] = json!({ "port": port });
    }
    obj.to_string()
}
