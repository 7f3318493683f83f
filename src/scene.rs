//! Arena-backed scene graph and the geometry it references.

use glam::{Mat4, Quat, Vec3};

use crate::load::ModelNode;
use crate::material::MaterialId;
use crate::particles::FireflyField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(usize);

impl GeometryId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Interleaved triangle mesh.
///
/// Vertices are laid out as `position.xyz`, `normal.xyz`, `uv.xy`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub const STRIDE: usize = 8;

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / Self::STRIDE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Mesh(MeshData),
    Points(FireflyField),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub geometry: Option<GeometryId>,
    pub material: Option<MaterialId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Owns every node and geometry; only subtrees hung off `roots` are drawn.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    geometries: Vec<Geometry>,
    revisions: Vec<u64>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.geometries.push(geometry);
        self.revisions.push(0);
        GeometryId(self.geometries.len() - 1)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id.0)
    }

    /// Swaps the contents of a geometry slot and bumps its revision so
    /// GPU copies know to refresh.
    pub fn replace_geometry(&mut self, id: GeometryId, geometry: Geometry) {
        if let Some(slot) = self.geometries.get_mut(id.0) {
            *slot = geometry;
            self.revisions[id.0] += 1;
        }
    }

    pub fn geometry_revision(&self, id: GeometryId) -> u64 {
        self.revisions.get(id.0).copied().unwrap_or(0)
    }

    /// Creates a node outside the scene, optionally under `parent`.
    pub fn create_node(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        geometry: Option<GeometryId>,
        material: Option<MaterialId>,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            transform,
            geometry,
            material,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    /// Moves a loaded tree into the arena without adding it to the scene.
    pub fn insert_model(&mut self, model: ModelNode) -> NodeId {
        self.insert_model_under(model, None)
    }

    fn insert_model_under(&mut self, model: ModelNode, parent: Option<NodeId>) -> NodeId {
        let ModelNode {
            name,
            transform,
            mesh,
            children,
        } = model;
        let geometry = mesh.map(|mesh| self.add_geometry(Geometry::Mesh(mesh)));
        let id = self.create_node(name, transform, geometry, None, parent);
        for child in children {
            self.insert_model_under(child, Some(id));
        }
        id
    }

    /// Adds a parentless node to the scene root. Adding twice is a no-op.
    pub fn add_to_scene(&mut self, id: NodeId) {
        if self.nodes[id.0].parent.is_none() && !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `id` and everything below it, parents before children.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.node(current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn is_in_scene(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.node(current).and_then(Node::parent) {
            current = parent;
        }
        self.roots.contains(&current)
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.node(id)) {
            matrix = node.transform.matrix() * matrix;
            current = node.parent;
        }
        matrix
    }

    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).transform_point3(Vec3::ZERO)
    }

    /// Visits every node attached to the scene with its world matrix.
    pub fn visit(&self, mut visitor: impl FnMut(NodeId, &Node, Mat4)) {
        let mut stack: Vec<(NodeId, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|root| (*root, Mat4::IDENTITY))
            .collect();
        while let Some((id, parent_matrix)) = stack.pop() {
            let node = &self.nodes[id.0];
            let world = parent_matrix * node.transform.matrix();
            visitor(id, node, world);
            stack.extend(node.children.iter().rev().map(|child| (*child, world)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, translation: Vec3, children: Vec<ModelNode>) -> ModelNode {
        ModelNode {
            name: name.to_string(),
            transform: Transform::from_translation(translation),
            mesh: None,
            children,
        }
    }

    #[test]
    fn inserted_model_stays_detached_until_added() {
        let mut graph = SceneGraph::new();
        let root = graph.insert_model(model(
            "Scene",
            Vec3::ZERO,
            vec![model("Child", Vec3::X, vec![])],
        ));
        let child = graph.node(root).unwrap().children()[0];
        assert!(!graph.is_in_scene(child));
        graph.add_to_scene(root);
        graph.add_to_scene(root);
        assert!(graph.is_in_scene(child));
        assert_eq!(graph.roots().len(), 1);
    }

    #[test]
    fn world_position_accumulates_parents() {
        let mut graph = SceneGraph::new();
        let root = graph.insert_model(model(
            "Scene",
            Vec3::new(0.0, 1.0, 0.0),
            vec![model("Stand", Vec3::new(1.0, 0.5, 0.0), vec![])],
        ));
        let stand = graph.node(root).unwrap().children()[0];
        assert_eq!(graph.world_position(stand), Vec3::new(1.0, 1.5, 0.0));
    }

    #[test]
    fn descendants_are_preorder() {
        let mut graph = SceneGraph::new();
        let root = graph.insert_model(model(
            "Scene",
            Vec3::ZERO,
            vec![
                model("A", Vec3::ZERO, vec![model("A1", Vec3::ZERO, vec![])]),
                model("B", Vec3::ZERO, vec![]),
            ],
        ));
        let names: Vec<_> = graph
            .descendants(root)
            .into_iter()
            .map(|id| graph.node(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, ["Scene", "A", "A1", "B"]);
    }

    #[test]
    fn replacing_geometry_bumps_revision() {
        let mut graph = SceneGraph::new();
        let id = graph.add_geometry(Geometry::Mesh(MeshData::default()));
        assert_eq!(graph.geometry_revision(id), 0);
        let mesh = MeshData {
            vertices: vec![0.0; MeshData::STRIDE],
            indices: vec![0, 0, 0],
        };
        graph.replace_geometry(id, Geometry::Mesh(mesh.clone()));
        assert_eq!(graph.geometry_revision(id), 1);
        assert_eq!(graph.geometry(id), Some(&Geometry::Mesh(mesh)));
    }

    #[test]
    fn visit_only_walks_attached_nodes() {
        let mut graph = SceneGraph::new();
        let attached = graph.create_node("attached", Transform::default(), None, None, None);
        graph.add_to_scene(attached);
        graph.create_node("loose", Transform::default(), None, None, None);
        let mut seen = Vec::new();
        graph.visit(|_, node, _| seen.push(node.name.clone()));
        assert_eq!(seen, ["attached"]);
    }
}
