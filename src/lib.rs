//! WebM relay - converts WebM links posted to a Telegram chat into playable video
//!
//! This library provides the relay's building blocks:
//! - Telegram channel adapter (long polling, text replies, video upload)
//! - Content-addressed conversion cache in SQLite
//! - Single-flight conversion pipeline around an external transcoder
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Telegram Bot API                    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ getUpdates / sendVideo
//! ┌────────────────────▼────────────────────────────────┐
//! │   Channel  →  Intake  →  Processor  →  Delivery      │
//! └──────────┬─────────────────┬────────────────────────┘
//!            │                 │
//! ┌──────────▼──────┐  ┌───────▼────────┐
//! │  HTTP source    │  │  ffmpeg        │   conversion cache (SQLite)
//! └─────────────────┘  └────────────────┘
//! ```

pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;

pub use config::Config;
pub use db::DbPool;
pub use error::{Error, Result};
