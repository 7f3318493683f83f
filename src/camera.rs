//! Perspective camera and the damped orbit controls that drive it.

use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use parking_lot::RwLock;

use crate::input::{MouseButton, PointerEvent, PointerState};

pub const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;
pub const INITIAL_POSITION: Vec3 = Vec3::new(4.0, 2.0, 4.0);

/// Keeps the camera above the ground plane.
pub const MAX_POLAR_ANGLE: f32 = FRAC_PI_2 - PI / 32.0;

const POLAR_EPSILON: f32 = 1e-6;
/// Closest the orbit may dolly toward its target.
pub const MIN_DISTANCE: f32 = 0.1;

/// Camera state consumed by the renderer's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(aspect: f32) -> Self {
        let mut camera = Self {
            fov: FIELD_OF_VIEW_DEGREES,
            aspect,
            near: NEAR_PLANE,
            far: FAR_PLANE,
            position: INITIAL_POSITION,
            target: Vec3::ZERO,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    /// Recomputes the cached projection after `fov`, `aspect` or the planes change.
    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh(
            self.fov.to_radians(),
            self.aspect.max(0.01),
            self.near,
            self.far,
        );
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn params(&self) -> CameraParams {
        CameraParams {
            view: self.view_matrix(),
            projection: self.projection,
            position: self.position,
        }
    }
}

/// Camera handle shared between the controls and the effects that face it.
pub type SharedCamera = Arc<RwLock<PerspectiveCamera>>;

pub fn shared_camera(camera: PerspectiveCamera) -> SharedCamera {
    Arc::new(RwLock::new(camera))
}

/// Spherical coordinates around the orbit target, Y up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spherical {
    pub radius: f32,
    /// Polar angle measured from +Y.
    pub phi: f32,
    /// Azimuth around +Y, measured from +Z.
    pub theta: f32,
}

impl Spherical {
    pub fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius <= f32::EPSILON {
            // No direction to recover; look at the target from the side.
            return Self {
                radius,
                phi: FRAC_PI_2,
                theta: 0.0,
            };
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    pub fn to_offset(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

/// Orbit controls with damping: pointer drags and wheel steps accumulate
/// into a pending delta that `update` integrates once per frame.
#[derive(Debug)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pointer: PointerState,
    delta: Spherical,
    scale: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            enable_damping: true,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            min_polar_angle: 0.0,
            max_polar_angle: MAX_POLAR_ANGLE,
            min_distance: MIN_DISTANCE,
            max_distance: f32::INFINITY,
            pointer: PointerState::new(),
            delta: Spherical::default(),
            scale: 1.0,
        }
    }
}

impl OrbitControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one pointer event; `viewport_height` is in the same units as
    /// the pointer positions.
    pub fn handle_pointer(&mut self, event: &PointerEvent, viewport_height: f32) {
        if let PointerEvent::Wheel { delta_y } = *event {
            self.dolly(delta_y);
            return;
        }
        if let Some(travel) = self.pointer.apply(event, MouseButton::LEFT) {
            self.rotate(travel, viewport_height);
        }
    }

    /// Rotates by a pointer travel: a full viewport height equals one turn.
    pub fn rotate(&mut self, travel: Vec2, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        let travel = travel * self.rotate_speed;
        self.delta.theta -= TAU * travel.x / height;
        self.delta.phi -= TAU * travel.y / height;
    }

    fn dolly(&mut self, delta_y: f32) {
        let zoom_scale = 0.95f32.powf(self.zoom_speed);
        if delta_y < 0.0 {
            self.scale *= zoom_scale;
        } else if delta_y > 0.0 {
            self.scale /= zoom_scale;
        }
    }

    /// Integrates pending input into the camera. Call once per frame.
    /// Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let previous = camera.position;
        let mut spherical = Spherical::from_offset(camera.position - self.target);

        let step = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        spherical.theta += self.delta.theta * step;
        spherical.phi += self.delta.phi * step;

        spherical.phi = spherical
            .phi
            .clamp(self.min_polar_angle, self.max_polar_angle)
            .clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        spherical.radius = (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        camera.position = self.target + spherical.to_offset();
        camera.target = self.target;

        if self.enable_damping {
            self.delta.theta *= 1.0 - self.damping_factor;
            self.delta.phi *= 1.0 - self.damping_factor;
        } else {
            self.delta = Spherical::default();
        }
        self.scale = 1.0;

        camera.position.distance_squared(previous) > 1e-12
    }

    /// Polar angle of the camera around the orbit target.
    pub fn polar_angle(&self, camera: &PerspectiveCamera) -> f32 {
        Spherical::from_offset(camera.position - self.target).phi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_starts_with_fixed_rig() {
        let camera = PerspectiveCamera::new(16.0 / 9.0);
        assert_eq!(camera.fov, 45.0);
        assert_eq!(camera.near, 0.1);
        assert_eq!(camera.far, 100.0);
        assert_eq!(camera.position, Vec3::new(4.0, 2.0, 4.0));
        assert!(!camera.params().view_proj().col(0).x.is_nan());
    }

    #[test]
    fn spherical_round_trip() {
        let offset = Vec3::new(4.0, 2.0, 4.0);
        let back = Spherical::from_offset(offset).to_offset();
        assert!(back.distance(offset) < 1e-5);
    }

    #[test]
    fn polar_angle_stays_above_ground_after_any_drag() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls::new();
        controls.handle_pointer(&PointerEvent::Moved(Vec2::ZERO), 600.0);
        controls.handle_pointer(&PointerEvent::Pressed(MouseButton::LEFT), 600.0);
        let mut position = Vec2::ZERO;
        for frame in 0..400 {
            // Drag upward hard, which pushes the camera down toward the floor.
            position += Vec2::new(3.0, -40.0 + (frame % 7) as f32);
            controls.handle_pointer(&PointerEvent::Moved(position), 600.0);
            controls.update(&mut camera);
            assert!(controls.polar_angle(&camera) <= MAX_POLAR_ANGLE + 1e-5);
            assert!(camera.position.y > 0.0);
        }
    }

    #[test]
    fn damping_keeps_moving_after_release() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls::new();
        controls.rotate(Vec2::new(120.0, 0.0), 600.0);
        assert!(controls.update(&mut camera));
        let after_first = camera.position;
        assert!(controls.update(&mut camera));
        assert_ne!(camera.position, after_first);
    }

    #[test]
    fn without_damping_delta_is_applied_once() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls::new();
        controls.enable_damping = false;
        controls.rotate(Vec2::new(60.0, 0.0), 600.0);
        assert!(controls.update(&mut camera));
        assert!(!controls.update(&mut camera));
    }

    #[test]
    fn orbit_preserves_distance() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls::new();
        let radius = camera.position.length();
        controls.rotate(Vec2::new(200.0, 30.0), 600.0);
        for _ in 0..60 {
            controls.update(&mut camera);
        }
        assert!((camera.position.length() - radius).abs() < 1e-4);
    }

    #[test]
    fn wheel_up_moves_closer() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls::new();
        let radius = camera.position.length();
        controls.handle_pointer(&PointerEvent::Wheel { delta_y: -1.0 }, 600.0);
        controls.update(&mut camera);
        assert!(camera.position.length() < radius);
    }

    #[test]
    fn zooming_all_the_way_in_can_be_undone() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls::new();
        for _ in 0..400 {
            controls.handle_pointer(&PointerEvent::Wheel { delta_y: -1.0 }, 600.0);
            controls.update(&mut camera);
        }
        let closest = camera.position.distance(controls.target);
        assert!((closest - MIN_DISTANCE).abs() < 1e-4);
        assert!(camera.params().view.is_finite());

        for _ in 0..400 {
            controls.handle_pointer(&PointerEvent::Wheel { delta_y: 1.0 }, 600.0);
            controls.update(&mut camera);
        }
        assert!(camera.position.distance(controls.target) > 1.0);
        assert!(camera.params().view.is_finite());
    }

    #[test]
    fn offset_on_target_keeps_a_direction() {
        let spherical = Spherical::from_offset(Vec3::ZERO);
        assert_eq!(spherical.radius, 0.0);
        assert!(spherical.phi > 0.0 && spherical.phi < PI);
    }
}
