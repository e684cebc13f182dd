//! Upload service: command mailbox, single-writer state, event fan-out.

mod actor;
mod handle;
mod messages;

pub use actor::{COMMAND_CHANNEL_CAPACITY, UploadService};
pub use handle::UploadServiceHandle;
pub use messages::ServiceCommand;
