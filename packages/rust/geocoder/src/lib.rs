//! Geocoding client for railway stations.
//!
//! This crate provides:
//! - [`Resolver`] — multi-pattern, retrying free-text geocode resolution
//!   against a Nominatim-style search endpoint

pub mod resolver;

pub use resolver::{Resolver, expand_pattern};
