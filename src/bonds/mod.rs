pub mod classifier;
pub mod holders;
pub mod pipeline;
pub mod platform;

pub use pipeline::EventPipeline;
pub use platform::PlatformDescriptor;
