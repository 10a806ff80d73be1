mod chunk_resolver;
mod handler;

pub use chunk_resolver::*;
pub use handler::*;
