//! # vidpool
//!
//! A reusable, bounded async worker pool, and a video-to-HLS conversion
//! service built on it.
//!
//! The [`pool`] module is the engine: a fixed number of workers consume a
//! job stream and publish results into one output stream, with a
//! repeatable start/stop lifecycle. The remaining modules wire a Postgres
//! video repository and an ffmpeg transcoder into that engine.

pub mod config;
pub mod converter;
pub mod db;
pub mod error;
pub mod model;
pub mod pool;
pub mod telemetry;
pub mod transcode;
