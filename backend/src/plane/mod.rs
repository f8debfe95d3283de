//! Plane REST API access.

pub mod client;

pub use client::{PlaneClient, PlaneError, PlaneSettings};
