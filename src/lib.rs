//! Render loop and scene composition for the animated portal scene.
//!
//! The crate assembles a scene graph out of a few static primitives and an
//! asynchronously loaded model, keeps viewport-derived state in step with
//! the window and drives elapsed time into the shader uniforms once per
//! frame.  Everything except [`render`] is independent of the GPU so the
//! scene can be built and ticked in headless tools and tests.

pub mod app;
pub mod assembler;
pub mod asset;
pub mod camera;
pub mod config;
pub mod error;
pub mod fire;
pub mod frame;
pub mod input;
pub mod load;
pub mod material;
pub mod obj;
pub mod particles;
pub mod render;
pub mod scene;
pub mod tunables;
pub mod uniforms;
pub mod viewport;

pub use app::{SceneContext, SceneSummary};
pub use assembler::{ModelManifest, NodeRole, SceneAssembler};
pub use asset::{load_model, load_texture, BlockingAssetLoader, ThreadedAssetLoader};
pub use camera::{CameraParams, OrbitControls, PerspectiveCamera, SharedCamera};
pub use config::{FireConfig, SceneConfig};
pub use error::{AssetError, SceneError, TunableError, UniformError};
pub use fire::{FireEffect, VolumetricFire};
pub use frame::{AnimationLoop, Clock, FrameScheduler, FrameSink, SystemClock};
pub use input::{MouseButton, PointerEvent};
pub use load::{AssetLoader, LoadEvent, LoadQueue, LoadState, ModelNode};
pub use material::Color;
pub use obj::load_obj_from_str;
pub use render::Renderer;
pub use viewport::{RenderSurface, Viewport};
