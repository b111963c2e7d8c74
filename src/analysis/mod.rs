//! Results computers: LAT table, correlation matrix, critical paths, and
//! sensitivity analysis.

pub mod correlation;
pub mod lat;
pub mod paths;
pub mod sensitivity;
