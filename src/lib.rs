pub mod gpu;
pub mod camera;
pub mod input;
pub mod navigation;
pub mod lighting;
pub mod post_processing;
pub mod environment;
pub mod scene_graph;
pub mod model;
pub mod stats;
pub mod inspector;
pub mod settings;
pub mod store;
pub mod session;
pub mod error;
pub mod cli;
