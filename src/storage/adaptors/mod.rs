mod file;
mod mem;

pub use file::*;
pub use mem::*;
