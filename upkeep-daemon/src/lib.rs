//! Daemon runtime: trigger poller + schedule + run processor + control socket.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod systemd;

pub use error::DaemonError;
pub use protocol::{
    request_run, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, RunRecord};
pub use systemd::{generate_unit, install as install_systemd, uninstall as uninstall_systemd};
