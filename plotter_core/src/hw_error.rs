//! Maps `Box<dyn Error>` from trait boundaries to typed `PlotterError`.
//!
//! The traits in `plotter_traits` use `Box<dyn Error + Send + Sync>` so any
//! backend can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `plotter_hardware::HwError`.

use crate::error::PlotterError;

/// Map a failed read or write on an open link.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> PlotterError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<plotter_hardware::error::HwError>() {
            return match hw {
                plotter_hardware::error::HwError::PortUnavailable { port, reason } => {
                    PlotterError::PortUnavailable {
                        port: port.clone(),
                        reason: reason.clone(),
                    }
                }
                other => PlotterError::Transport(other.to_string()),
            };
        }
    }
    PlotterError::Transport(e.to_string())
}

/// Map a failed open. Anything that prevents opening is `PortUnavailable`.
pub fn map_open_error(port: &str, e: &(dyn std::error::Error + 'static)) -> PlotterError {
    match map_link_error(e) {
        err @ PlotterError::PortUnavailable { .. } => err,
        other => PlotterError::PortUnavailable {
            port: port.to_string(),
            reason: match other {
                PlotterError::Transport(reason) => reason,
                rest => rest.to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_become_transport() {
        let e = std::io::Error::other("cable pulled");
        assert_eq!(
            map_link_error(&e),
            PlotterError::Transport("cable pulled".into())
        );
    }

    #[test]
    fn open_errors_always_name_the_port() {
        let e = std::io::Error::other("no such device");
        match map_open_error("/dev/ttyUSB3", &e) {
            PlotterError::PortUnavailable { port, reason } => {
                assert_eq!(port, "/dev/ttyUSB3");
                assert_eq!(reason, "no such device");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hardware_errors_are_downcast() {
        let e = plotter_hardware::error::HwError::PortUnavailable {
            port: "COM4".into(),
            reason: "access denied".into(),
        };
        assert_eq!(
            map_link_error(&e),
            PlotterError::PortUnavailable {
                port: "COM4".into(),
                reason: "access denied".into()
            }
        );
        let e = plotter_hardware::error::HwError::Disconnected;
        assert_eq!(
            map_link_error(&e),
            PlotterError::Transport("link disconnected".into())
        );
    }
}
