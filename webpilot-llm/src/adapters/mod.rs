/// Backend over `rig-core` provider clients.
pub mod rig_backend;

pub use rig_backend::{classify_error_text, signal_from_rig_error, RigBackend};
