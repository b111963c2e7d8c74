//! The symbolic random-variable algebra: scalar moment helpers, the
//! differentiable expression graph, the RV DAG, and the covariance engine.

pub mod cov;
pub mod expr;
pub mod rv;
pub mod stats;
