pub mod evaluation;
pub mod linalg;
pub mod metrics;
