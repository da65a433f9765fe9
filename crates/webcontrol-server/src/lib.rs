pub mod connection;
pub mod dispatcher;
pub mod download;
pub mod error;
pub mod filesystem;
pub mod frame;
pub mod headless;
pub mod host;
pub mod logging;
pub mod queue;
pub mod server;

pub use dispatcher::Dispatcher;
pub use download::DownloadManager;
pub use error::{DownloadError, ServerError};
pub use filesystem::ContentRoots;
pub use frame::FrameLoop;
pub use host::{Host, ModelImporter, Permissions, Playback};
pub use queue::{Task, TaskQueue};
pub use server::ConnectionServer;
