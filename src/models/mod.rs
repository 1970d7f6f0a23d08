pub mod base_model;
pub mod nearest_neighbor;
pub mod threshold;
