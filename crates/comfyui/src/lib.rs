//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, a pull-based progress event stream,
//! HTTP API wrappers, the content-addressed artifact store, and workflow
//! template injection/submission for driving a ComfyUI server through one
//! generation job at a time.

pub mod api;
pub mod client;
pub mod events;
pub mod messages;
pub mod progress;
pub mod store;
pub mod types;
pub mod workflow;
