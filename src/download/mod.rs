//! Background materialization of videos into the cache.

mod downloader;
mod queue;
mod worker;

pub use downloader::*;
pub use queue::*;
pub use worker::*;
