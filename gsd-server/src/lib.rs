//! Gamma Spectroscopy Detector Control Server Library
//!
//! Exposes server components for integration testing.

pub mod api;
pub mod config;
pub mod monitor;
pub mod state;
