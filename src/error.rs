use std::path::PathBuf;

use thiserror::Error;

use crate::assembler::NodeRole;
use crate::material::UniformKind;

/// Failures while composing the scene graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    /// The loaded model does not contain a node the scene depends on.
    #[error("loaded model has no node named `{name}` ({role:?})")]
    MissingNode { role: NodeRole, name: &'static str },
    /// A role name occurs more than once inside the loaded model.
    #[error("loaded model has {count} nodes named `{name}`, expected exactly one")]
    DuplicateNode { name: &'static str, count: usize },
    /// A completion event arrived after the model was already handled.
    #[error("model asset {0} was already handled")]
    AlreadyLoaded(PathBuf),
    #[error("model asset {path} could not be loaded: {message}")]
    Asset { path: PathBuf, message: String },
}

/// Rejected writes into a shader material's uniform table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniformError {
    #[error("material `{material}` has no uniform named `{name}`")]
    Unknown { material: &'static str, name: String },
    #[error("uniform `{name}` on `{material}` expects {expected:?}, got {actual:?}")]
    KindMismatch {
        material: &'static str,
        name: String,
        expected: UniformKind,
        actual: UniformKind,
    },
    #[error("material `{0}` is not a shader material")]
    NotShader(&'static str),
}

/// Failures of the asset loading collaborator.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
}

impl AssetError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Io { path, .. } | Self::Decode { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color `{0}`, expected `#rrggbb`")]
pub struct ColorParseError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunableError {
    #[error("no tunable registered under `{0}`")]
    UnknownKey(String),
    #[error("tunable `{0}` holds a different kind of value")]
    KindMismatch(String),
    #[error(transparent)]
    Uniform(#[from] UniformError),
}
