#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::unwrap_used)]

//! # Overview
//! `ffmpeg_frame_source` decodes a video byte stream into a bounded sequence of
//! luminance frames, sampled at a fixed number of frames per second of video
//! time. It shells out to the `ffmpeg` binary rather than linking against
//! libav: the command line tool is universally available, keeps decoder
//! crashes out of this process, and avoids the licensing questions that come
//! with static linking.
//!
//! The returned [`FrameStream`] is a single-pass iterator of
//! `(timestamp_seconds, GrayImage)` pairs. It is not restartable; to read the
//! same video again, open a fresh stream from a fresh byte source.
//!
//! # Prerequisites
//! The `ffmpeg` binary must be installed and reachable through the PATH
//! (most distributions package it as `ffmpeg`).

mod error;
mod frame_stream;

pub use error::ExtractError;
pub use frame_stream::{FrameStream, FrameStreamCfg};
