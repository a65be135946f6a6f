pub mod filesystem;
pub mod locks;

pub use filesystem::{OutputWriter, WrittenFiles};
pub use locks::DirectoryLocks;
