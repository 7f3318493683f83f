use std::fmt;

use glam::Vec3;
use log::{error, info, warn};
use rand::Rng;

use crate::assembler::{SceneAssembler, StaticNodes};
use crate::camera::{shared_camera, CameraParams, OrbitControls, PerspectiveCamera, SharedCamera};
use crate::config::SceneConfig;
use crate::error::{SceneError, TunableError, UniformError};
use crate::fire::{FireEffect, VolumetricFire};
use crate::input::PointerEvent;
use crate::load::{AssetLoader, LoadCallback, LoadEvent, LoadState};
use crate::material::{Color, MaterialId, MaterialRef, MaterialSet, MaterialSettings, TextureSource};
use crate::particles::{generate_fireflies, FireflyField};
use crate::scene::{Geometry, GeometryId, NodeId, SceneGraph};
use crate::tunables::{
    register_scene_tunables, TunableBinding, TunableChange, TunableDefaults, TunableRegistry,
    TunableValue, Tunables,
};
use crate::uniforms;
use crate::viewport::{RenderSurface, Viewport, ViewportController};

struct FireSlot {
    effect: Box<dyn FireEffect>,
    node: NodeId,
    geometry: GeometryId,
    synced_revision: Option<u64>,
}

impl fmt::Debug for FireSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FireSlot")
            .field("node", &self.node)
            .field("geometry", &self.geometry)
            .field("revision", &self.effect.revision())
            .finish()
    }
}

/// Owns every piece of scene state and exposes the operations the host
/// and the animation loop drive it with.
#[derive(Debug)]
pub struct SceneContext {
    config: SceneConfig,
    graph: SceneGraph,
    materials: MaterialSet,
    camera: SharedCamera,
    controls: OrbitControls,
    viewport: ViewportController,
    fires: [FireSlot; 2],
    fireflies: NodeId,
    load: LoadState,
    tunables: Tunables,
    clear_color: Color,
    assembler: SceneAssembler,
}

impl SceneContext {
    /// Builds the static scene. The model is attached later through
    /// [`SceneContext::handle_load_event`].
    pub fn new<R: Rng + ?Sized>(
        config: SceneConfig,
        viewport: Viewport,
        rng: &mut R,
        show_tunables: bool,
    ) -> Self {
        let camera = shared_camera(PerspectiveCamera::new(viewport.aspect()));
        let materials = MaterialSet::new(&MaterialSettings {
            baked_texture: Some(TextureSource {
                path: config.texture_path(),
                flip_y: false,
                srgb: true,
            }),
            portal_color_start: config.portal_color_start,
            portal_color_end: config.portal_color_end,
            fireflies_size: config.fireflies_size,
            pixel_ratio: viewport.pixel_ratio(),
        });

        let mut graph = SceneGraph::new();
        let fire = config.fire;
        let effects: [Box<dyn FireEffect>; 2] = [0, 1].map(|_| {
            Box::new(VolumetricFire::new(
                fire.width,
                fire.height,
                fire.depth,
                fire.slice_spacing,
                camera.clone(),
            )) as Box<dyn FireEffect>
        });
        let fire_geometry =
            [0, 1].map(|slot| graph.add_geometry(Geometry::Mesh(effects[slot].geometry().clone())));

        let assembler = SceneAssembler {
            fire_offset: Vec3::new(0.0, fire.vertical_offset, 0.0),
            fire_scale: fire.scale,
        };
        let field = generate_fireflies(config.fireflies_count, rng);
        let StaticNodes { fireflies, fires } =
            assembler.build_static_scene(&mut graph, field, fire_geometry);

        let mut slot = 0;
        let fires = effects.map(|effect| {
            let fire = FireSlot {
                effect,
                node: fires[slot],
                geometry: fire_geometry[slot],
                synced_revision: None,
            };
            slot += 1;
            fire
        });

        let mut tunables = Tunables::new();
        tunables.set_visible(show_tunables);
        register_scene_tunables(
            &mut tunables,
            &TunableDefaults {
                portal_color_start: config.portal_color_start,
                portal_color_end: config.portal_color_end,
                fireflies_size: config.fireflies_size,
                clear_color: config.clear_color,
            },
        );

        let mut scene = Self {
            clear_color: config.clear_color,
            config,
            graph,
            materials,
            camera,
            controls: OrbitControls::new(),
            viewport: ViewportController::new(viewport),
            fires,
            fireflies,
            load: LoadState::Pending,
            tunables,
            assembler,
        };
        scene.place_fires();
        scene
    }

    /// Asks `loader` for the model. The completion must come back through
    /// [`SceneContext::handle_load_event`] on the frame loop's thread.
    pub fn start_loading(&self, loader: &dyn AssetLoader, on_complete: LoadCallback) {
        let path = self.config.model_path();
        info!("loading model {}", path.display());
        loader.load(&path, on_complete);
    }

    /// Applies a load completion. Only the first completion is accepted.
    pub fn handle_load_event(&mut self, event: LoadEvent) -> Result<(), SceneError> {
        if !self.load.is_pending() {
            warn!("ignoring duplicate completion for {}", event.path.display());
            return Err(SceneError::AlreadyLoaded(event.path));
        }
        let model = match event.result {
            Ok(model) => model,
            Err(err) => {
                error!("{err}");
                let err = SceneError::Asset {
                    path: event.path,
                    message: err.to_string(),
                };
                self.load = LoadState::Failed(err.to_string());
                return Err(err);
            }
        };

        let fire_nodes = [self.fires[0].node, self.fires[1].node];
        match self
            .assembler
            .attach_model(&mut self.graph, &mut self.materials, fire_nodes, model)
        {
            Ok(manifest) => {
                self.load = LoadState::Attached(manifest);
                self.place_fires();
                Ok(())
            }
            Err(err) => {
                self.load = LoadState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn place_fires(&mut self) {
        for fire in &mut self.fires {
            fire.effect
                .set_world_transform(self.graph.world_matrix(fire.node));
        }
        self.sync_fire_geometry();
    }

    fn sync_fire_geometry(&mut self) {
        for fire in &mut self.fires {
            let revision = fire.effect.revision();
            if fire.synced_revision != Some(revision) {
                self.graph
                    .replace_geometry(fire.geometry, Geometry::Mesh(fire.effect.geometry().clone()));
                fire.synced_revision = Some(revision);
            }
        }
    }

    /// Writes the frame's elapsed time into the animated materials.
    pub fn push_time(&mut self, elapsed: f32) {
        if let Err(err) = uniforms::push_time(&mut self.materials, elapsed) {
            warn!("{err}");
        }
    }

    /// Integrates pending orbit input into the camera.
    pub fn update_controls(&mut self) -> bool {
        let mut camera = self.camera.write();
        self.controls.update(&mut camera)
    }

    pub fn update_fires(&mut self, elapsed: f32) {
        for fire in &mut self.fires {
            fire.effect.update(elapsed);
        }
        self.sync_fire_geometry();
    }

    pub fn handle_pointer(&mut self, event: &PointerEvent) {
        let height = self.viewport.viewport().height() as f32;
        self.controls.handle_pointer(event, height);
    }

    pub fn resize(
        &mut self,
        width: u32,
        height: u32,
        device_pixel_ratio: f64,
        surface: &mut dyn RenderSurface,
    ) {
        self.viewport.on_resize(
            width,
            height,
            device_pixel_ratio,
            &self.camera,
            surface,
            &mut self.materials,
        );
    }

    /// Pushes viewport and clear color into a freshly created surface.
    pub fn configure_surface(&self, surface: &mut dyn RenderSurface) {
        self.viewport.configure(surface);
        surface.set_clear_color(self.clear_color);
    }

    pub fn set_color_tunable(
        &mut self,
        key: &str,
        color: Color,
        surface: &mut dyn RenderSurface,
    ) -> Result<(), TunableError> {
        let change = self.tunables.set_color(key, color)?;
        self.apply_change(&change, surface)?;
        Ok(())
    }

    pub fn set_scalar_tunable(
        &mut self,
        key: &str,
        value: f32,
        surface: &mut dyn RenderSurface,
    ) -> Result<(), TunableError> {
        let change = self.tunables.set_scalar(key, value)?;
        self.apply_change(&change, surface)?;
        Ok(())
    }

    /// Adds `delta` to a scalar tunable and returns the new value.
    pub fn nudge_tunable(
        &mut self,
        key: &str,
        delta: f32,
        surface: &mut dyn RenderSurface,
    ) -> Result<f32, TunableError> {
        let change = self.tunables.nudge_scalar(key, delta)?;
        self.apply_change(&change, surface)?;
        match change.value {
            TunableValue::Scalar(value) => Ok(value),
            TunableValue::Color(_) => Err(TunableError::KindMismatch(key.to_string())),
        }
    }

    fn apply_change(
        &mut self,
        change: &TunableChange,
        surface: &mut dyn RenderSurface,
    ) -> Result<(), UniformError> {
        uniforms::apply_tunable(change, &mut self.materials, surface)?;
        if let (TunableBinding::ClearColor, TunableValue::Color(color)) = (change.binding, change.value) {
            self.clear_color = color;
        }
        Ok(())
    }

    /// Resolves any material slot, including the fire effects' own.
    pub fn material(&self, id: MaterialId) -> Option<MaterialRef<'_>> {
        match id {
            MaterialId::Fire(slot) => self
                .fires
                .get(slot)
                .map(|fire| MaterialRef::Shader(fire.effect.material())),
            other => self.materials.get(other),
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn materials(&self) -> &MaterialSet {
        &self.materials
    }

    pub fn camera(&self) -> &SharedCamera {
        &self.camera
    }

    pub fn camera_params(&self) -> CameraParams {
        self.camera.read().params()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport.viewport()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn fireflies(&self) -> Option<&FireflyField> {
        let geometry = self.graph.node(self.fireflies)?.geometry?;
        match self.graph.geometry(geometry)? {
            Geometry::Points(field) => Some(field),
            Geometry::Mesh(_) => None,
        }
    }

    /// World positions of the two fire effects.
    pub fn fire_positions(&self) -> [Vec3; 2] {
        [0, 1].map(|slot| self.graph.world_position(self.fires[slot].node))
    }

    pub fn summary(&self) -> SceneSummary {
        SceneSummary {
            load: self.load.clone(),
            nodes: self.graph.len(),
            fireflies: self.fireflies().map_or(0, FireflyField::len),
            fire_positions: self.fire_positions(),
            camera_position: self.camera.read().position,
            clear_color: self.clear_color,
        }
    }
}

/// Snapshot printed by the headless host.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSummary {
    pub load: LoadState,
    pub nodes: usize,
    pub fireflies: usize,
    pub fire_positions: [Vec3; 2],
    pub camera_position: Vec3,
    pub clear_color: Color,
}

impl fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scene summary:")?;
        match self.load.failure() {
            Some(reason) => writeln!(f, " - model: {} ({reason})", self.load.label())?,
            None => writeln!(f, " - model: {}", self.load.label())?,
        }
        writeln!(f, " - nodes: {}", self.nodes)?;
        writeln!(f, " - fireflies: {}", self.fireflies)?;
        for (index, position) in self.fire_positions.iter().enumerate() {
            writeln!(
                f,
                " - fire {} pos=({:.2}, {:.2}, {:.2})",
                index + 1,
                position.x,
                position.y,
                position.z
            )?;
        }
        let camera = self.camera_position;
        writeln!(
            f,
            " - camera pos=({:.2}, {:.2}, {:.2})",
            camera.x, camera.y, camera.z
        )?;
        write!(f, " - clear color: {}", self.clear_color)
    }
}
