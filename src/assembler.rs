//! Composes the scene from static primitives and the loaded model.

use glam::Vec3;
use log::{error, info};

use crate::error::SceneError;
use crate::load::ModelNode;
use crate::material::{MaterialId, MaterialSet, Side};
use crate::particles::FireflyField;
use crate::scene::{Geometry, GeometryId, NodeId, SceneGraph, Transform};

/// Nodes of the loaded model that receive special treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRole {
    PoleLightOne,
    PoleLightTwo,
    LightStandOne,
    LightStandTwo,
    Portal,
}

impl NodeRole {
    pub const ALL: [NodeRole; 5] = [
        NodeRole::PoleLightOne,
        NodeRole::PoleLightTwo,
        NodeRole::LightStandOne,
        NodeRole::LightStandTwo,
        NodeRole::Portal,
    ];

    /// Node name the model is authored with.
    pub fn node_name(self) -> &'static str {
        match self {
            Self::PoleLightOne => "Light_Inside001",
            Self::PoleLightTwo => "Light_Inside003",
            Self::LightStandOne => "LightStand01",
            Self::LightStandTwo => "LightStand02",
            Self::Portal => "Circle",
        }
    }

    pub fn material(self) -> MaterialId {
        match self {
            Self::PoleLightOne | Self::PoleLightTwo => MaterialId::PoleLight,
            Self::LightStandOne | Self::LightStandTwo => MaterialId::LightStand,
            Self::Portal => MaterialId::Portal,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Role to node mapping, validated once when the model is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelManifest {
    root: NodeId,
    nodes: [NodeId; 5],
}

impl ModelManifest {
    /// Resolves every role inside the subtree rooted at `root`.
    pub fn resolve(graph: &SceneGraph, root: NodeId) -> Result<Self, SceneError> {
        let subtree = graph.descendants(root);
        let mut nodes = [root; 5];
        for role in NodeRole::ALL {
            let name = role.node_name();
            let matches: Vec<NodeId> = subtree
                .iter()
                .copied()
                .filter(|id| graph.node(*id).is_some_and(|node| node.name == name))
                .collect();
            match matches.as_slice() {
                [single] => nodes[role.index()] = *single,
                [] => return Err(SceneError::MissingNode { role, name }),
                many => {
                    return Err(SceneError::DuplicateNode {
                        name,
                        count: many.len(),
                    })
                }
            }
        }
        Ok(Self { root, nodes })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, role: NodeRole) -> NodeId {
        self.nodes[role.index()]
    }
}

/// Nodes created before the model arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticNodes {
    pub fireflies: NodeId,
    pub fires: [NodeId; 2],
}

/// Builds the static part of the scene and grafts the model onto it.
#[derive(Debug, Clone, Copy)]
pub struct SceneAssembler {
    /// Offset from a light stand's origin to its fire.
    pub fire_offset: Vec3,
    /// Uniform scale of the fire meshes.
    pub fire_scale: f32,
}

impl Default for SceneAssembler {
    fn default() -> Self {
        Self {
            fire_offset: Vec3::new(0.0, 0.11, 0.0),
            fire_scale: 0.1,
        }
    }
}

impl SceneAssembler {
    /// Adds the firefly points and the two fire meshes. The fires sit at
    /// the origin until the model tells us where the light stands are.
    pub fn build_static_scene(
        &self,
        graph: &mut SceneGraph,
        fireflies: FireflyField,
        fire_geometries: [GeometryId; 2],
    ) -> StaticNodes {
        let points = graph.add_geometry(Geometry::Points(fireflies));
        let fireflies = graph.create_node(
            "Fireflies",
            Transform::default(),
            Some(points),
            Some(MaterialId::Fireflies),
            None,
        );
        graph.add_to_scene(fireflies);

        let fires = [0, 1].map(|slot| {
            let node = graph.create_node(
                format!("Fire{}", slot + 1),
                self.inert_fire_transform(),
                Some(fire_geometries[slot]),
                Some(MaterialId::Fire(slot)),
                None,
            );
            graph.add_to_scene(node);
            node
        });

        StaticNodes { fireflies, fires }
    }

    pub fn inert_fire_transform(&self) -> Transform {
        Transform {
            scale: Vec3::splat(self.fire_scale),
            ..Transform::default()
        }
    }

    /// Grafts the loaded model into the scene.
    ///
    /// The model is attached even when a role cannot be resolved: the
    /// environment then renders with the baked material only, the fires
    /// keep their inert transform and the structural error is returned.
    pub fn attach_model(
        &self,
        graph: &mut SceneGraph,
        materials: &mut MaterialSet,
        fires: [NodeId; 2],
        model: ModelNode,
    ) -> Result<ModelManifest, SceneError> {
        let root = graph.insert_model(model);

        materials.baked_mut().side = Side::Double;
        for id in graph.descendants(root) {
            if let Some(node) = graph.node_mut(id) {
                node.material = Some(MaterialId::Baked);
            }
        }

        let manifest = ModelManifest::resolve(graph, root);
        if let Ok(manifest) = &manifest {
            for role in NodeRole::ALL {
                if let Some(node) = graph.node_mut(manifest.node(role)) {
                    node.material = Some(role.material());
                }
            }
        }

        graph.add_to_scene(root);

        let manifest = match manifest {
            Ok(manifest) => manifest,
            Err(err) => {
                error!("model attached without effects: {err}");
                return Err(err);
            }
        };

        for (fire, stand) in fires
            .into_iter()
            .zip([NodeRole::LightStandOne, NodeRole::LightStandTwo])
        {
            let position = graph.world_position(manifest.node(stand)) + self.fire_offset;
            if let Some(node) = graph.node_mut(fire) {
                node.transform.translation = position;
            }
        }

        info!(
            "model attached with {} nodes",
            graph.descendants(root).len()
        );
        Ok(manifest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::material::{Color, MaterialSettings};
    use crate::particles::generate_fireflies;
    use crate::scene::MeshData;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub(crate) fn leaf(name: &str, translation: Vec3) -> ModelNode {
        ModelNode {
            name: name.to_string(),
            transform: Transform::from_translation(translation),
            mesh: Some(MeshData::default()),
            children: Vec::new(),
        }
    }

    /// Model shaped like the portal scene export.
    pub(crate) fn portal_model() -> ModelNode {
        ModelNode {
            name: "Scene".to_string(),
            transform: Transform::default(),
            mesh: None,
            children: vec![
                leaf("Baked", Vec3::ZERO),
                leaf("Light_Inside001", Vec3::new(1.0, 0.6, 0.0)),
                leaf("Light_Inside003", Vec3::new(-1.0, 0.6, 0.0)),
                leaf("LightStand01", Vec3::new(1.0, 0.5, 0.0)),
                leaf("LightStand02", Vec3::new(-1.0, 0.5, 0.2)),
                leaf("Circle", Vec3::new(0.0, 0.8, -1.5)),
            ],
        }
    }

    fn setup() -> (SceneGraph, MaterialSet, StaticNodes) {
        let mut graph = SceneGraph::new();
        let materials = MaterialSet::new(&MaterialSettings {
            baked_texture: None,
            portal_color_start: Color::BLACK,
            portal_color_end: Color::WHITE,
            fireflies_size: 90.0,
            pixel_ratio: 1.0,
        });
        let fire_geometry = [
            graph.add_geometry(Geometry::Mesh(MeshData::default())),
            graph.add_geometry(Geometry::Mesh(MeshData::default())),
        ];
        let fireflies = generate_fireflies(30, &mut StdRng::seed_from_u64(3));
        let nodes = SceneAssembler::default().build_static_scene(&mut graph, fireflies, fire_geometry);
        (graph, materials, nodes)
    }

    fn material_of(graph: &SceneGraph, root: NodeId, name: &str) -> Option<MaterialId> {
        graph
            .descendants(root)
            .into_iter()
            .filter_map(|id| graph.node(id))
            .find(|node| node.name == name)
            .and_then(|node| node.material)
    }

    #[test]
    fn static_scene_holds_fireflies_and_inert_fires() {
        let (graph, _, nodes) = setup();
        assert!(graph.is_in_scene(nodes.fireflies));
        for fire in nodes.fires {
            let node = graph.node(fire).unwrap();
            assert_eq!(node.transform.translation, Vec3::ZERO);
            assert_eq!(node.transform.scale, Vec3::splat(0.1));
            assert!(graph.is_in_scene(fire));
        }
    }

    #[test]
    fn attach_assigns_materials_and_positions_fires() {
        let (mut graph, mut materials, nodes) = setup();
        let manifest = SceneAssembler::default()
            .attach_model(&mut graph, &mut materials, nodes.fires, portal_model())
            .unwrap();
        let root = manifest.root();
        assert!(graph.is_in_scene(root));
        assert_eq!(materials.baked().side, Side::Double);
        assert_eq!(material_of(&graph, root, "Baked"), Some(MaterialId::Baked));
        assert_eq!(material_of(&graph, root, "Scene"), Some(MaterialId::Baked));
        assert_eq!(material_of(&graph, root, "Light_Inside001"), Some(MaterialId::PoleLight));
        assert_eq!(material_of(&graph, root, "Light_Inside003"), Some(MaterialId::PoleLight));
        assert_eq!(material_of(&graph, root, "LightStand01"), Some(MaterialId::LightStand));
        assert_eq!(material_of(&graph, root, "LightStand02"), Some(MaterialId::LightStand));
        assert_eq!(material_of(&graph, root, "Circle"), Some(MaterialId::Portal));

        for (fire, role) in nodes.fires.into_iter().zip([NodeRole::LightStandOne, NodeRole::LightStandTwo]) {
            let expected = graph.world_position(manifest.node(role)) + Vec3::new(0.0, 0.11, 0.0);
            let actual = graph.node(fire).unwrap().transform.translation;
            assert!(actual.distance(expected) < 1e-6, "{actual} != {expected}");
        }
    }

    #[test]
    fn missing_role_still_attaches_environment() {
        let (mut graph, mut materials, nodes) = setup();
        let mut model = portal_model();
        model.children.retain(|child| child.name != "LightStand02");
        let err = SceneAssembler::default()
            .attach_model(&mut graph, &mut materials, nodes.fires, model)
            .unwrap_err();
        assert_eq!(
            err,
            SceneError::MissingNode {
                role: NodeRole::LightStandTwo,
                name: "LightStand02"
            }
        );
        let root = *graph.roots().last().unwrap();
        assert_eq!(material_of(&graph, root, "Circle"), Some(MaterialId::Baked));
        for fire in nodes.fires {
            assert_eq!(graph.node(fire).unwrap().transform.translation, Vec3::ZERO);
        }
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let (mut graph, _, _) = setup();
        let mut model = portal_model();
        model.children.push(leaf("Circle", Vec3::ONE));
        let root = graph.insert_model(model);
        assert_eq!(
            ModelManifest::resolve(&graph, root),
            Err(SceneError::DuplicateNode {
                name: "Circle",
                count: 2
            })
        );
    }

    #[test]
    fn roles_may_be_nested() {
        let (mut graph, _, _) = setup();
        let mut model = portal_model();
        let circle = model.children.pop().unwrap();
        model.children[0].children.push(circle);
        let root = graph.insert_model(model);
        assert!(ModelManifest::resolve(&graph, root).is_ok());
    }
}
