mod log;
mod status;

pub use log::SqliteLogStore;
pub use status::SqliteStatusStore;
