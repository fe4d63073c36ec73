mod log;
mod status;

pub use log::InMemoryLogStore;
pub use status::InMemoryStatusStore;
