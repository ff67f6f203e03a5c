pub mod tabular_pipeline;

pub use tabular_pipeline::TabularPipeline;
