//! Tower middleware for the gigflow API.

pub mod metrics;
