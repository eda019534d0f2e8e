// src/connection/mod.rs

//! Manages the lifecycle of a single WebSocket client connection: the reader
//! and writer pumps around a hub session.

mod guard;
mod handler;

pub use guard::ConnectionGuard;
pub use handler::{ConnectionHandler, ReaderExit, WriterExit, read_pump, write_pump};
