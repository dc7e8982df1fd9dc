//! Geometry utilities for mesh-refine.
//!
//! This module provides edge lengths and simplex measures, and the
//! mean-ratio quality used to vet edge splits.

pub mod metrics;
pub mod quality;
