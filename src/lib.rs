//! httpkit - blocking HTTP/1.x client and server engine
//!
//! This crate provides the HTTP message model shared by a client and a server,
//! a client request engine with redirect following and progress reporting, and
//! a per-connection server dispatch loop with CORS, static files and WebSocket
//! hand-off.

pub mod http;
