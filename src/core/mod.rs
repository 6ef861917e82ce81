pub mod cancel;
pub mod command;
pub mod config;
pub mod errors;
pub mod fs;
pub mod sink;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use command::{CommandError, CommandOutput, CommandRunner, SystemCommandRunner};
pub use config::Config;
pub use errors::{ErrorContext, SysmendError, SysmendResult};
pub use fs::{DiskUsage, FileSystem, OsFileSystem};
pub use sink::{EventSink, TracingSink};
