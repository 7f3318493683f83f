pub mod native;
pub(crate) mod shaders;

pub use native::{LightParams, Renderer};
