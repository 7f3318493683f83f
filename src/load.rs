//! Asynchronous asset load contract.
//!
//! The loader hands back a [`LoadEvent`] through whatever queue drives the
//! frame loop; the scene applies it on that thread, so the scene graph is
//! only ever mutated from one place. There is no timeout: a pending load
//! stays pending for the whole session.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::assembler::ModelManifest;
use crate::error::AssetError;
use crate::scene::{MeshData, Transform};

/// Decoded model tree as produced by the asset loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<MeshData>,
    pub children: Vec<ModelNode>,
}

impl ModelNode {
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ModelNode::node_count).sum::<usize>()
    }
}

pub type LoadResult = Result<ModelNode, AssetError>;

/// Completion message for one asset load.
#[derive(Debug)]
pub struct LoadEvent {
    pub path: PathBuf,
    pub result: LoadResult,
}

pub type LoadCallback = Box<dyn FnOnce(LoadEvent) + Send + 'static>;

/// Loads an external model and reports exactly once through `on_complete`.
pub trait AssetLoader {
    fn load(&self, path: &Path, on_complete: LoadCallback);
}

/// Lifecycle of the external model.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState {
    #[default]
    Pending,
    Attached(ModelManifest),
    Failed(String),
}

impl LoadState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn manifest(&self) -> Option<&ModelManifest> {
        match self {
            Self::Attached(manifest) => Some(manifest),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attached(_) => "attached",
            Self::Failed(_) => "failed",
        }
    }
}

/// Channel that funnels load completions back to the frame loop.
#[derive(Debug)]
pub struct LoadQueue {
    sender: Sender<LoadEvent>,
    receiver: Receiver<LoadEvent>,
}

impl Default for LoadQueue {
    fn default() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> LoadCallback {
        let sender = self.sender.clone();
        Box::new(move |event| {
            // The receiver only disappears when the session is torn down.
            let _ = sender.send(event);
        })
    }

    pub fn try_next(&self) -> Option<LoadEvent> {
        self.receiver.try_recv().ok()
    }

    /// Blocks until the next completion arrives.
    pub fn wait(&self) -> Option<LoadEvent> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_delivers_completion_once() {
        let queue = LoadQueue::new();
        let callback = queue.callback();
        assert!(queue.try_next().is_none());
        callback(LoadEvent {
            path: PathBuf::from("portal.model.xml"),
            result: Ok(ModelNode::default()),
        });
        let event = queue.try_next().unwrap();
        assert_eq!(event.path, PathBuf::from("portal.model.xml"));
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn node_count_includes_descendants() {
        let tree = ModelNode {
            children: vec![
                ModelNode::default(),
                ModelNode {
                    children: vec![ModelNode::default()],
                    ..ModelNode::default()
                },
            ],
            ..ModelNode::default()
        };
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn load_state_labels() {
        assert!(LoadState::default().is_pending());
        assert_eq!(LoadState::Failed("x".into()).failure(), Some("x"));
        assert_eq!(LoadState::Failed("x".into()).label(), "failed");
    }
}
