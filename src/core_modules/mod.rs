pub mod assignment;
pub mod background_model;
pub mod background_subtractor;
pub mod blob;
pub mod blob_detector;
pub mod color_signature;
pub mod cost_scale;
pub mod geometry;
pub mod tracker;
