//! Metrics collection and export module.
//!
//! This module exports the outcome of every poll cycle to external
//! monitoring systems. Currently supports Prometheus Push Gateway.
//!
//! # Submodules
//!
//! - `prom` - Prometheus metrics integration

pub mod prom;
