pub mod file_io;

pub mod id;

pub mod time;
