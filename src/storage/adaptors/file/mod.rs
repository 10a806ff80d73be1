mod disk_backend;

pub use disk_backend::*;
