pub mod fd_limit;
pub mod logger;

pub use fd_limit::{max_open_fds, max_tasks_by_fd_limit};
pub use logger::setup_logging;
