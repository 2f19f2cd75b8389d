//! Library crate for lan-sweep: a TCP connect sweep whose results are streamed
//! to a client as they arrive.
pub mod channel;
pub mod logging;
pub mod netdetect;
pub mod ports;
pub mod progress;
pub mod scanner;
pub mod server;
pub mod streamer;
pub mod types;
