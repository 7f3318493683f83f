//! Model container: an XML node tree referencing OBJ meshes.
//!
//! ```xml
//! <model>
//!   <node>
//!     <name>LightStand01</name>
//!     <mesh>light_stand.obj</mesh>
//!     <position>1 0.5 0</position>
//!     <rotation>0 90 0</rotation>
//!     <scale>1 1 1</scale>
//!     <node>...</node>
//!   </node>
//! </model>
//! ```
//!
//! Mesh paths are relative to the XML file. Rotations are Euler degrees
//! applied X, then Y, then Z.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use glam::{EulerRot, Quat, Vec3};
use log::info;
use parking_lot::Mutex;
use roxmltree::{Document, Node};

use crate::error::AssetError;
use crate::load::{AssetLoader, LoadCallback, LoadEvent, ModelNode};
use crate::obj::load_obj_from_str;
use crate::scene::Transform;

/// Name given to the synthetic root that holds the top-level nodes.
pub const MODEL_ROOT_NAME: &str = "Scene";

/// Reads and decodes a model container from disk.
pub fn load_model(path: &Path) -> Result<ModelNode, AssetError> {
    let xml = fs::read_to_string(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_model(&xml, base).map_err(|err| AssetError::Decode {
        path: path.to_path_buf(),
        message: format!("{err:#}"),
    })
}

/// Decodes a model container; meshes are resolved against `base`.
pub fn parse_model(xml: &str, base: &Path) -> Result<ModelNode> {
    let document = Document::parse(xml).context("invalid model XML")?;
    let root = document.root_element();
    if !root.has_tag_name("model") {
        return Err(anyhow!(
            "expected <model> root element, found <{}>",
            root.tag_name().name()
        ));
    }
    let children = root
        .children()
        .filter(|child| child.has_tag_name("node"))
        .map(|child| parse_node(&child, base))
        .collect::<Result<Vec<_>>>()?;
    Ok(ModelNode {
        name: MODEL_ROOT_NAME.to_string(),
        transform: Transform::default(),
        mesh: None,
        children,
    })
}

fn parse_node(node: &Node<'_, '_>, base: &Path) -> Result<ModelNode> {
    let name = required_text(node, "name")?;
    let mesh = match optional_text(node, "mesh") {
        Some(file) => {
            let path = base.join(&file);
            let source = fs::read_to_string(&path)
                .with_context(|| format!("unable to read mesh {}", path.display()))?;
            Some(
                load_obj_from_str(&source)
                    .with_context(|| format!("failed to parse OBJ mesh {file}"))?,
            )
        }
        None => None,
    };
    let rotation = parse_vec3(optional_text(node, "rotation"), Vec3::ZERO)
        .with_context(|| format!("bad <rotation> on {name}"))?;
    let transform = Transform {
        translation: parse_vec3(optional_text(node, "position"), Vec3::ZERO)
            .with_context(|| format!("bad <position> on {name}"))?,
        rotation: Quat::from_euler(
            EulerRot::ZYX,
            rotation.z.to_radians(),
            rotation.y.to_radians(),
            rotation.x.to_radians(),
        ),
        scale: parse_vec3(optional_text(node, "scale"), Vec3::ONE)
            .with_context(|| format!("bad <scale> on {name}"))?,
    };
    let children = node
        .children()
        .filter(|child| child.has_tag_name("node"))
        .map(|child| parse_node(&child, base))
        .collect::<Result<Vec<_>>>()?;
    Ok(ModelNode {
        name,
        transform,
        mesh,
        children,
    })
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let components = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("`{component}`: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match components.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        other => Err(anyhow!("expected 3 components, found {}", other.len())),
    }
}

/// Decoded RGBA8 image, rows ordered top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Loads an image file as RGBA8, optionally flipping it vertically.
pub fn load_texture(path: &Path, flip_y: bool) -> Result<TextureImage, AssetError> {
    let bytes = fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory(&bytes).map_err(|err| AssetError::Decode {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let image = if flip_y { image.flipv() } else { image };
    let rgba = image.to_rgba8();
    Ok(TextureImage {
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    })
}

/// Decodes models on a worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadedAssetLoader;

impl AssetLoader for ThreadedAssetLoader {
    fn load(&self, path: &Path, on_complete: LoadCallback) {
        dispatch(path.to_path_buf(), on_complete, |job| {
            thread::Builder::new()
                .name("asset-loader".into())
                .spawn(job)
                .map(drop)
        });
    }
}

type LoadJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs the decode through `spawn`. When `spawn` cannot start the job the
/// callback still receives the spawn error. Failures are reported to the
/// callback only; the scene logs them when it applies the event.
fn dispatch<S>(path: PathBuf, on_complete: LoadCallback, spawn: S)
where
    S: FnOnce(LoadJob) -> std::io::Result<()>,
{
    let slot = Arc::new(Mutex::new(Some(on_complete)));
    let worker_slot = Arc::clone(&slot);
    let worker_path = path.clone();
    let job: LoadJob = Box::new(move || {
        let result = load_model(&worker_path);
        if let Ok(model) = &result {
            info!(
                "decoded {} ({} nodes)",
                worker_path.display(),
                model.node_count()
            );
        }
        if let Some(on_complete) = worker_slot.lock().take() {
            on_complete(LoadEvent {
                path: worker_path,
                result,
            });
        }
    });
    if let Err(source) = spawn(job) {
        if let Some(on_complete) = slot.lock().take() {
            on_complete(LoadEvent {
                path: path.clone(),
                result: Err(AssetError::Io { path, source }),
            });
        }
    }
}

/// Decodes models on the calling thread before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingAssetLoader;

impl AssetLoader for BlockingAssetLoader {
    fn load(&self, path: &Path, on_complete: LoadCallback) {
        let result = load_model(path);
        on_complete(LoadEvent {
            path: path.to_path_buf(),
            result,
        });
    }
}
