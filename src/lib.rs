//! # tkl-rs
//!
//! This crate records TikTok live broadcasts. It resolves a broadcaster from
//! a profile URL, username or room id, checks whether they are currently
//! live, fetches the broadcast's pull URL and persists the stream to disk,
//! optionally re-encoding it afterward.
//!
//! ## Usage
//!
//! The binary wires everything together; as a library the pieces compose
//! like this:
//!
//! ```no_run
//! use tkl_rs::{config::Mode, identity::{self, TargetInput}, util, webcast};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create HttpClient, a wrapper around reqwest::Client but includes a
//!     // middleware for retrying transient errors
//!     let client = util::HttpClient::new(None).unwrap();
//!
//!     // Resolve the broadcaster
//!     let input = TargetInput::Username("some_user".into());
//!     let identity = identity::resolve(&client, &input, Mode::Manual).await.unwrap();
//!
//!     // Check liveness and fetch the pull URL
//!     if webcast::is_live(&client, &identity.room_id).await.unwrap() {
//!         let url = webcast::pull_url(&client, &identity.room_id).await.unwrap();
//!         println!("Pull URL: {}", url);
//!     } else {
//!         println!("User is not live");
//!     }
//! }
//! ```
//!
//! The `controller` module drives the full manual and automatic recording
//! flows, including post-processing of the raw capture.

#[forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod config;
pub mod controller;
pub mod ffmpeg;
pub mod identity;
pub mod recorder;
pub mod sigi_state;
pub mod util;
pub mod webcast;
