mod flush;
mod shutdown;

pub use flush::spawn_flush_task;
pub use shutdown::ShutdownGuard;
