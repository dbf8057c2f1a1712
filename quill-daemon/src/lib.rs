//! Intake daemon: single-consumer note queue behind a Unix-socket server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_note, request_start, request_status, request_stop, request_sync, send_request,
    DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking, JobOutcome};
