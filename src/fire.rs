//! Slice-based volumetric fire.
//!
//! The fire volume is an axis-aligned box centered on the node origin. Every
//! update cuts it into polygons perpendicular to the direction toward the
//! camera, `slice_spacing` apart, so the shader can march a 3D noise field
//! through them. Vertices use the shared mesh layout with the normalized
//! volume coordinate stored in the normal slot.

use std::cmp::Ordering;

use glam::{Mat4, Vec3};

use crate::camera::SharedCamera;
use crate::material::{self, Blending, ShaderMaterial, ShaderProgram, UniformValue};
use crate::scene::MeshData;

pub const MAGNITUDE: &str = "uMagnitude";
pub const LACUNARITY: &str = "uLacunarity";
pub const GAIN: &str = "uGain";

const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 3),
    (3, 2),
    (2, 0),
    (4, 5),
    (5, 7),
    (7, 6),
    (6, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Renderable effect that animates with elapsed time.
pub trait FireEffect {
    /// Advances the effect to `time` seconds since scene start.
    fn update(&mut self, time: f32);
    /// Places the effect in the world; slicing happens in local space.
    fn set_world_transform(&mut self, world: Mat4);
    fn geometry(&self) -> &MeshData;
    fn material(&self) -> &ShaderMaterial;
    /// Bumped whenever `geometry` changes.
    fn revision(&self) -> u64;
}

#[derive(Debug)]
pub struct VolumetricFire {
    half_extents: Vec3,
    slice_spacing: f32,
    camera: SharedCamera,
    world: Mat4,
    view_direction: Option<Vec3>,
    mesh: MeshData,
    material: ShaderMaterial,
    revision: u64,
}

impl VolumetricFire {
    pub fn new(width: f32, height: f32, depth: f32, slice_spacing: f32, camera: SharedCamera) -> Self {
        let camera_position = camera.read().position;
        let mut material = ShaderMaterial::new(
            "fire",
            ShaderProgram::Fire,
            [
                (material::TIME, UniformValue::Float(0.0)),
                (material::CAMERA_POSITION, UniformValue::Vec3(camera_position)),
                (MAGNITUDE, UniformValue::Float(1.3)),
                (LACUNARITY, UniformValue::Float(2.0)),
                (GAIN, UniformValue::Float(0.5)),
            ],
        );
        material.transparent = true;
        material.blending = Blending::Additive;
        material.depth_write = false;

        let mut fire = Self {
            half_extents: Vec3::new(width, height, depth).abs() * 0.5,
            // A zero spacing would never terminate the slicing loop.
            slice_spacing: slice_spacing.max(1e-3),
            camera,
            world: Mat4::IDENTITY,
            view_direction: None,
            mesh: MeshData::default(),
            material,
            revision: 0,
        };
        fire.reslice();
        fire
    }

    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    pub fn slice_count(&self) -> usize {
        self.mesh.indices.len() / 3
    }

    fn local_view_direction(&self) -> Vec3 {
        let camera = self.camera.read().position;
        let local = self.world.inverse().transform_point3(camera);
        local.try_normalize().unwrap_or(Vec3::Z)
    }

    fn reslice(&mut self) {
        let direction = self.local_view_direction();
        if self
            .view_direction
            .is_some_and(|previous| previous.abs_diff_eq(direction, 1e-5))
        {
            return;
        }
        self.view_direction = Some(direction);
        self.mesh = slice_box(self.half_extents, direction, self.slice_spacing);
        self.revision += 1;
    }
}

impl FireEffect for VolumetricFire {
    fn update(&mut self, time: f32) {
        let camera_position = self.camera.read().position;
        self.reslice();
        for (name, value) in [
            (material::TIME, UniformValue::Float(time)),
            (material::CAMERA_POSITION, UniformValue::Vec3(camera_position)),
        ] {
            if let Err(err) = self.material.set_uniform(name, value) {
                log::warn!("{err}");
            }
        }
    }

    fn set_world_transform(&mut self, world: Mat4) {
        self.world = world;
        self.view_direction = None;
        self.reslice();
    }

    fn geometry(&self) -> &MeshData {
        &self.mesh
    }

    fn material(&self) -> &ShaderMaterial {
        &self.material
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Cuts a centered box into polygons perpendicular to `direction`, ordered
/// back to front as seen from a viewer along `direction`.
pub fn slice_box(half_extents: Vec3, direction: Vec3, spacing: f32) -> MeshData {
    let corners: [Vec3; 8] = std::array::from_fn(|i| {
        Vec3::new(
            if i & 1 == 0 { -half_extents.x } else { half_extents.x },
            if i & 2 == 0 { -half_extents.y } else { half_extents.y },
            if i & 4 == 0 { -half_extents.z } else { half_extents.z },
        )
    });
    let distances = corners.map(|corner| corner.dot(direction));
    let nearest = distances.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let farthest = distances.iter().copied().fold(f32::INFINITY, f32::min);

    let tangent = direction.any_orthonormal_vector();
    let bitangent = direction.cross(tangent);
    let size = half_extents * 2.0;

    let mut mesh = MeshData::default();
    let mut plane = farthest + spacing * 0.5;
    while plane < nearest {
        let mut points: Vec<Vec3> = Vec::with_capacity(6);
        for &(a, b) in &EDGES {
            let (da, db) = (distances[a] - plane, distances[b] - plane);
            if da * db > 0.0 || da == db {
                continue;
            }
            let point = corners[a].lerp(corners[b], da / (da - db));
            // Planes through a corner hit every edge meeting there.
            if !points.iter().any(|p| p.abs_diff_eq(point, 1e-6)) {
                points.push(point);
            }
        }

        if points.len() >= 3 {
            let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
            let angle = |p: &Vec3| {
                let offset = *p - center;
                offset.dot(bitangent).atan2(offset.dot(tangent))
            };
            points.sort_by(|a, b| angle(a).partial_cmp(&angle(b)).unwrap_or(Ordering::Equal));

            let base = mesh.vertex_count() as u32;
            for point in &points {
                let volume = (*point / size.max(Vec3::splat(f32::EPSILON))) + 0.5;
                mesh.vertices.extend_from_slice(&[
                    point.x, point.y, point.z, volume.x, volume.y, volume.z, 0.0, 0.0,
                ]);
            }
            for i in 1..points.len() as u32 - 1 {
                mesh.indices.extend_from_slice(&[base, base + i, base + i + 1]);
            }
        }
        plane += spacing;
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{shared_camera, PerspectiveCamera};

    fn fire() -> (VolumetricFire, SharedCamera) {
        let camera = shared_camera(PerspectiveCamera::new(1.0));
        (VolumetricFire::new(1.0, 2.0, 1.0, 0.5, camera.clone()), camera)
    }

    #[test]
    fn slices_stay_inside_the_volume() {
        let mesh = slice_box(Vec3::new(0.5, 1.0, 0.5), Vec3::new(1.0, 0.5, 1.0).normalize(), 0.5);
        assert!(!mesh.indices.is_empty());
        for vertex in mesh.vertices.chunks_exact(MeshData::STRIDE) {
            let position = Vec3::from_slice(&vertex[0..3]);
            assert!(position.abs().cmple(Vec3::new(0.5, 1.0, 0.5) + 1e-5).all());
            let volume = Vec3::from_slice(&vertex[3..6]);
            assert!(volume.cmpge(Vec3::splat(-1e-5)).all());
            assert!(volume.cmple(Vec3::splat(1.0 + 1e-5)).all());
        }
    }

    #[test]
    fn axis_aligned_view_yields_one_quad_per_slice() {
        let mesh = slice_box(Vec3::splat(0.5), Vec3::Z, 0.25);
        // Depth 1 cut every 0.25 starting half a step in.
        assert_eq!(mesh.vertex_count(), 4 * 4);
        assert_eq!(mesh.indices.len(), 4 * 6);
    }

    #[test]
    fn update_writes_time_and_camera() {
        let (mut fire, camera) = fire();
        camera.write().position = Vec3::new(0.0, 1.0, 5.0);
        fire.update(2.5);
        assert_eq!(fire.material().float(material::TIME), Some(2.5));
        assert_eq!(
            fire.material().vec3(material::CAMERA_POSITION),
            Some(Vec3::new(0.0, 1.0, 5.0))
        );
    }

    #[test]
    fn reslices_only_when_view_changes() {
        let (mut fire, camera) = fire();
        let initial = fire.revision();
        fire.update(0.1);
        assert_eq!(fire.revision(), initial);
        camera.write().position = Vec3::new(-4.0, 2.0, 4.0);
        fire.update(0.2);
        assert_eq!(fire.revision(), initial + 1);
        assert!(fire.slice_count() > 0);
    }

    #[test]
    fn moving_the_fire_reslices() {
        let (mut fire, _) = fire();
        let initial = fire.revision();
        fire.set_world_transform(Mat4::from_translation(Vec3::new(1.0, 0.6, 0.0)));
        assert_eq!(fire.revision(), initial + 1);
    }

    #[test]
    fn fire_material_is_additive() {
        let (fire, _) = fire();
        assert_eq!(fire.material().program(), ShaderProgram::Fire);
        assert_eq!(fire.material().blending, Blending::Additive);
        assert!(!fire.material().depth_write);
    }
}
