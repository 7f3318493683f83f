use log::debug;

use crate::camera::SharedCamera;
use crate::material::{self, Color, MaterialId, MaterialSet, UniformValue};

/// Highest pixel ratio the renderer will ever draw at.
pub const PIXEL_RATIO_CAP: f32 = 2.0;

/// Caps a device pixel ratio, treating nonsense values as 1.
pub fn capped_pixel_ratio(device_pixel_ratio: f64) -> f32 {
    let ratio = device_pixel_ratio as f32;
    if !ratio.is_finite() || ratio <= 0.0 {
        1.0
    } else {
        ratio.min(PIXEL_RATIO_CAP)
    }
}

/// Rendering surface that follows the viewport.
pub trait RenderSurface {
    /// Resizes the drawable area, in logical pixels.
    fn set_size(&mut self, width: u32, height: u32);
    fn set_pixel_ratio(&mut self, pixel_ratio: f32);
    fn set_clear_color(&mut self, color: Color);
}

/// Window dimensions in logical pixels plus the device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: u32,
    height: u32,
    device_pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, device_pixel_ratio: f64) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            device_pixel_ratio,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn pixel_ratio(&self) -> f32 {
        capped_pixel_ratio(self.device_pixel_ratio)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Keeps every viewport-derived value in step with the live window.
#[derive(Debug, Clone)]
pub struct ViewportController {
    viewport: Viewport,
}

impl ViewportController {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Sizes a freshly created surface to the current viewport.
    pub fn configure(&self, surface: &mut dyn RenderSurface) {
        surface.set_size(self.viewport.width, self.viewport.height);
        surface.set_pixel_ratio(self.viewport.pixel_ratio());
    }

    pub fn on_resize(
        &mut self,
        width: u32,
        height: u32,
        device_pixel_ratio: f64,
        camera: &SharedCamera,
        surface: &mut dyn RenderSurface,
        materials: &mut MaterialSet,
    ) {
        self.viewport = Viewport::new(width, height, device_pixel_ratio);
        let pixel_ratio = self.viewport.pixel_ratio();
        debug!(
            "viewport resized to {}x{} (pixel ratio {pixel_ratio})",
            self.viewport.width, self.viewport.height
        );

        {
            let mut camera = camera.write();
            camera.aspect = self.viewport.aspect();
            camera.update_projection_matrix();
        }

        surface.set_size(self.viewport.width, self.viewport.height);
        surface.set_pixel_ratio(pixel_ratio);

        if let Err(err) = materials.set_uniform(
            MaterialId::Fireflies,
            material::PIXEL_RATIO,
            UniformValue::Float(pixel_ratio),
        ) {
            log::warn!("pixel ratio not applied to fireflies: {err}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::camera::{shared_camera, PerspectiveCamera};
    use crate::material::MaterialSettings;

    /// Surface double that records what the viewport pushed into it.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSurface {
        pub size: Option<(u32, u32)>,
        pub pixel_ratio: Option<f32>,
        pub clear_color: Option<Color>,
    }

    impl RenderSurface for RecordingSurface {
        fn set_size(&mut self, width: u32, height: u32) {
            self.size = Some((width, height));
        }

        fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
            self.pixel_ratio = Some(pixel_ratio);
        }

        fn set_clear_color(&mut self, color: Color) {
            self.clear_color = Some(color);
        }
    }

    fn materials() -> MaterialSet {
        MaterialSet::new(&MaterialSettings {
            baked_texture: None,
            portal_color_start: Color::BLACK,
            portal_color_end: Color::WHITE,
            fireflies_size: 90.0,
            pixel_ratio: 1.0,
        })
    }

    #[test]
    fn pixel_ratio_is_capped() {
        assert_eq!(capped_pixel_ratio(1.0), 1.0);
        assert_eq!(capped_pixel_ratio(1.5), 1.5);
        assert_eq!(capped_pixel_ratio(3.0), 2.0);
        assert_eq!(capped_pixel_ratio(f64::NAN), 1.0);
        assert_eq!(capped_pixel_ratio(0.0), 1.0);
    }

    #[test]
    fn zero_sized_viewport_keeps_finite_aspect() {
        let viewport = Viewport::new(800, 0, 1.0);
        assert_eq!(viewport.height(), 1);
        assert!(viewport.aspect().is_finite());
    }

    #[test]
    fn resize_updates_camera_surface_and_fireflies() {
        let camera = shared_camera(PerspectiveCamera::new(1.0));
        let mut surface = RecordingSurface::default();
        let mut materials = materials();
        let mut controller = ViewportController::new(Viewport::new(640, 480, 1.0));

        for (width, height, dpr) in [(1920, 1080, 1.0), (800, 1200, 2.5), (333, 777, 1.25)] {
            controller.on_resize(width, height, dpr, &camera, &mut surface, &mut materials);
            let expected_ratio = (dpr as f32).min(2.0);
            let aspect = camera.read().aspect;
            assert!((aspect - width as f32 / height as f32).abs() < 1e-6);
            assert_eq!(surface.size, Some((width, height)));
            assert_eq!(surface.pixel_ratio, Some(expected_ratio));
            assert_eq!(
                materials.fireflies().float(material::PIXEL_RATIO),
                Some(expected_ratio)
            );
        }
    }

    #[test]
    fn resize_recomputes_projection() {
        let camera = shared_camera(PerspectiveCamera::new(1.0));
        let before = camera.read().projection_matrix();
        let mut controller = ViewportController::new(Viewport::new(100, 100, 1.0));
        controller.on_resize(
            200,
            100,
            1.0,
            &camera,
            &mut RecordingSurface::default(),
            &mut materials(),
        );
        assert_ne!(camera.read().projection_matrix(), before);
    }
}
