pub mod mesh;
pub mod renderer;
pub mod post_processor;
pub mod bloom_processor;
