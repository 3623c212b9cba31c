mod files;
mod handler;
mod server;

pub use files::*;
pub use handler::*;
pub use server::*;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;

pub type ProxyBody = UnsyncBoxBody<Bytes, std::io::Error>;

pub const CHUNK_SIZE: usize = 1024 * 1024; // 1MB chunks
