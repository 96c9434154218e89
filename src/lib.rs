//! shadowfix deepfake inference library
//!
//! Estimates the probability that an image or video was synthetically
//! generated by delegating per-frame classification to label-based
//! classifier backends and aggregating the results into one verdict.

pub mod cli;
pub mod config;
pub mod logging;
pub mod media;
pub mod security;
