use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use log::{debug, error, info};
use wgpu::util::DeviceExt;
use winit::window::{Window, WindowId};

use super::shaders;
use crate::app::SceneContext;
use crate::asset::load_texture;
use crate::fire;
use crate::frame::FrameSink;
use crate::material::{
    self, Blending, Color, MaterialId, MaterialRef, ShaderMaterial, ShaderProgram, Side,
    TextureSource,
};
use crate::scene::{Geometry, GeometryId, MeshData};
use crate::viewport::RenderSurface;

const MSAA_SAMPLES: u32 = 4;

/// GPU renderer backed by wgpu that draws the scene graph.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    targets: RenderTargets,
    blit_layout: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,
    logical_size: (u32, u32),
    pixel_ratio: f32,
    clear_color: Color,
    light: LightParams,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    modules: HashMap<ProgramKind, wgpu::ShaderModule>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    geometry_cache: HashMap<GeometryId, GpuGeometry>,
    quad: MeshBuffers,
    sampler: wgpu::Sampler,
    white: GpuTexture,
    baked: GpuTexture,
    texture_error: Option<String>,
}

impl Renderer {
    /// Initializes the GPU renderer for the window and uploads the scene's
    /// baked texture. A texture that cannot be loaded is replaced by a flat
    /// color and reported through [`Renderer::texture_error`].
    pub async fn new(window: Arc<Window>, scene: &SceneContext) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("renderer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no supported formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let sample_count = if adapter
            .get_texture_format_features(surface_format)
            .flags
            .sample_count_supported(MSAA_SAMPLES)
        {
            MSAA_SAMPLES
        } else {
            1
        };
        info!("rendering {surface_format:?} with {sample_count}x MSAA");

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[uniform_entry::<GlobalUniform>(0)],
        });
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-bind-layout"),
            entries: &[
                uniform_entry::<MaterialUniform>(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[uniform_entry::<ObjectConstants>(0)],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &material_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let modules = ProgramKind::ALL
            .into_iter()
            .map(|kind| {
                let source = format!("{}{}", shaders::COMMON, kind.source());
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(kind.label()),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
                (kind, module)
            })
            .collect();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let blit_pipeline = build_blit_pipeline(&device, &blit_layout, surface_format);
        let targets = RenderTargets::create(
            &device,
            TargetSpec {
                format: surface_format,
                size: (size.width, size.height),
                sample_count,
            },
            &blit_layout,
            &sampler,
        );

        let white = GpuTexture::from_rgba(&device, &queue, "white", 1, 1, &[255; 4], false);
        let (baked, texture_error) =
            match upload_map(&device, &queue, scene.materials().baked().map.as_ref()) {
                Ok(texture) => (texture, None),
                Err(err) => {
                    error!("{err:#}");
                    // Flat neutral surface instead of the baked lighting.
                    let flat = GpuTexture::from_rgba(
                        &device,
                        &queue,
                        "baked-fallback",
                        1,
                        1,
                        &[128, 128, 128, 255],
                        true,
                    );
                    (flat, Some(format!("{err:#}")))
                }
            };

        let quad = MeshBuffers::from_mesh(
            &device,
            &MeshData {
                vertices: QUAD_CORNERS.to_vec(),
                indices: QUAD_INDICES.to_vec(),
            },
            "firefly-quad",
        );

        Ok(Self {
            logical_size: (size.width, size.height),
            pixel_ratio: 1.0,
            clear_color: scene.clear_color(),
            light: LightParams::default(),
            window,
            surface,
            device,
            queue,
            config,
            sample_count,
            targets,
            blit_layout,
            blit_pipeline,
            global_buffer,
            global_bind_group,
            material_layout,
            object_layout,
            pipeline_layout,
            modules,
            pipelines: HashMap::new(),
            geometry_cache: HashMap::new(),
            quad,
            sampler,
            white,
            baked,
            texture_error,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn texture_error(&self) -> Option<&str> {
        self.texture_error.as_deref()
    }

    /// Reconfigures the swap chain to the window's current physical size.
    pub fn reconfigure(&mut self) {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }

    fn reconfigure_if_needed(&mut self) {
        let size = self.window.inner_size();
        if size.width != self.config.width || size.height != self.config.height {
            self.reconfigure();
        }
    }

    /// Recreates the offscreen targets when the drawing buffer size changed.
    fn sync_targets(&mut self) {
        let size = drawing_buffer_size(
            self.logical_size,
            self.pixel_ratio,
            self.device.limits().max_texture_dimension_2d,
        );
        if size == self.targets.size {
            return;
        }
        debug!("drawing buffer {}x{}", size.0, size.1);
        self.targets = RenderTargets::create(
            &self.device,
            TargetSpec {
                format: self.config.format,
                size,
                sample_count: self.sample_count,
            },
            &self.blit_layout,
            &self.sampler,
        );
    }

    fn update_globals(&self, scene: &SceneContext) {
        let camera = scene.camera_params();
        let (width, height) = self.targets.size;
        let uniform = GlobalUniform {
            view_proj: camera.view_proj().to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            light_position: self.light.position.extend(1.0).into(),
            light_color: self.light.color.extend(self.light.intensity).into(),
            viewport: [width as f32, height as f32, self.pixel_ratio, 0.0],
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    /// Draws one frame: opaque geometry first, then transparent geometry
    /// back to front.
    pub fn render(&mut self, scene: &SceneContext) -> Result<(), wgpu::SurfaceError> {
        self.reconfigure_if_needed();
        self.sync_targets();
        self.update_globals(scene);

        let mut items = Vec::new();
        scene.graph().visit(|_, node, world| {
            if let (Some(geometry), Some(material)) = (node.geometry, node.material) {
                items.push((geometry, material, world));
            }
        });

        let view = scene.camera_params().view;
        let mut material_groups: HashMap<MaterialId, wgpu::BindGroup> = HashMap::new();
        let mut draws = Vec::new();
        for (geometry, material_id, world) in items {
            let Some(material) = scene.material(material_id) else {
                continue;
            };
            if !self.ensure_geometry(scene, geometry) {
                continue;
            }
            let key = PipelineKey::for_material(material);
            self.ensure_pipeline(key);
            if !material_groups.contains_key(&material_id) {
                let group = self.material_bind_group(material);
                material_groups.insert(material_id, group);
            }
            let depth = view.transform_point3(world.transform_point3(Vec3::ZERO)).z;
            draws.push(Draw {
                geometry,
                material: material_id,
                key,
                object: self.object_bind_group(world),
                depth,
            });
        }

        // Opaque keeps scene order; transparent sorts far to near.
        draws.sort_by(|a, b| {
            a.key.transparent.cmp(&b.key.transparent).then_with(|| {
                if a.key.transparent {
                    a.depth.total_cmp(&b.depth)
                } else {
                    std::cmp::Ordering::Equal
                }
            })
        });

        let output = self.surface.get_current_texture()?;
        let frame_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        let (color_view, resolve_target) = match &self.targets.msaa {
            Some(msaa) => (msaa, Some(&self.targets.color)),
            None => (&self.targets.color, None),
        };
        let clear = self.clear_color.to_linear();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.x as f64,
                            g: clear.y as f64,
                            b: clear.z as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &self.global_bind_group, &[]);
            for draw in &draws {
                let (Some(pipeline), Some(geometry), Some(material_group)) = (
                    self.pipelines.get(&draw.key),
                    self.geometry_cache.get(&draw.geometry),
                    material_groups.get(&draw.material),
                ) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(1, material_group, &[]);
                pass.set_bind_group(2, &draw.object, &[]);
                match &geometry.buffers {
                    GpuBuffers::Mesh(mesh) => {
                        pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                        pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                    GpuBuffers::Points { instances, count } => {
                        pass.set_vertex_buffer(0, self.quad.vertex.slice(..));
                        pass.set_vertex_buffer(1, instances.slice(..));
                        pass.set_index_buffer(self.quad.index.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..self.quad.index_count, 0, 0..*count);
                    }
                }
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blit_pipeline);
            pass.set_bind_group(0, &self.targets.blit_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Uploads a geometry if it is new or changed. Returns false for
    /// geometry with nothing to draw.
    fn ensure_geometry(&mut self, scene: &SceneContext, id: GeometryId) -> bool {
        let revision = scene.graph().geometry_revision(id);
        if let Some(cached) = self.geometry_cache.get(&id) {
            if cached.revision == revision {
                return true;
            }
        }
        let buffers = match scene.graph().geometry(id) {
            Some(Geometry::Mesh(mesh)) if !mesh.indices.is_empty() => GpuBuffers::Mesh(
                MeshBuffers::from_mesh(&self.device, mesh, &format!("geometry-{}", id.index())),
            ),
            Some(Geometry::Points(field)) if !field.is_empty() => {
                let data: Vec<[f32; 4]> = field
                    .iter()
                    .map(|(position, scale)| position.extend(scale).into())
                    .collect();
                let instances = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("firefly-instances"),
                        contents: bytemuck::cast_slice(&data),
                        usage: wgpu::BufferUsages::VERTEX,
                    });
                GpuBuffers::Points {
                    instances,
                    count: data.len() as u32,
                }
            }
            _ => {
                self.geometry_cache.remove(&id);
                return false;
            }
        };
        self.geometry_cache
            .insert(id, GpuGeometry { revision, buffers });
        true
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(module) = self.modules.get(&key.program) else {
            return;
        };
        let pipeline = build_pipeline(
            &self.device,
            &self.pipeline_layout,
            module,
            key,
            self.config.format,
            self.sample_count,
        );
        self.pipelines.insert(key, pipeline);
    }

    fn material_bind_group(&self, material: MaterialRef<'_>) -> wgpu::BindGroup {
        let (uniform, texture) = match material {
            MaterialRef::Basic(basic) => {
                let color = basic.color.to_linear().extend(basic.opacity);
                let texture = if basic.map.is_some() {
                    &self.baked
                } else {
                    &self.white
                };
                (
                    MaterialUniform {
                        color: color.into(),
                        ..MaterialUniform::zeroed()
                    },
                    texture,
                )
            }
            MaterialRef::Standard(standard) => (
                MaterialUniform {
                    color: standard.color.to_linear().extend(1.0).into(),
                    emissive: standard.emissive.to_linear().extend(1.0).into(),
                    surface: [standard.metalness, standard.roughness, 0.0, 0.0],
                    ..MaterialUniform::zeroed()
                },
                &self.white,
            ),
            MaterialRef::Shader(shader) => (shader_uniform(shader), &self.white),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("material-uniform"),
                contents: bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material-bind-group"),
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn object_bind_group(&self, world: Mat4) -> wgpu::BindGroup {
        let normal = Mat3::from_mat4(world).inverse().transpose();
        let constants = ObjectConstants {
            model: world.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("object-uniform"),
                contents: bytes_of(&constants),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object-bind-group"),
            layout: &self.object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }
}

impl RenderSurface for Renderer {
    fn set_size(&mut self, width: u32, height: u32) {
        self.logical_size = (width.max(1), height.max(1));
        self.reconfigure_if_needed();
        self.sync_targets();
    }

    fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        self.pixel_ratio = pixel_ratio;
        self.sync_targets();
    }

    fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }
}

impl FrameSink for Renderer {
    type Error = wgpu::SurfaceError;

    fn submit(&mut self, scene: &SceneContext) -> Result<(), Self::Error> {
        self.render(scene)
    }
}

fn upload_map(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: Option<&TextureSource>,
) -> Result<GpuTexture> {
    let source = source.context("baked material has no texture")?;
    let image = load_texture(&source.path, source.flip_y)?;
    info!(
        "loaded texture {} ({}x{})",
        source.path.display(),
        image.width,
        image.height
    );
    Ok(GpuTexture::from_rgba(
        device,
        queue,
        "baked",
        image.width,
        image.height,
        &image.pixels,
        source.srgb,
    ))
}

fn shader_uniform(shader: &ShaderMaterial) -> MaterialUniform {
    let float = |name: &str| shader.float(name).unwrap_or(0.0);
    let color = |name: &str| -> [f32; 4] {
        shader
            .color(name)
            .map_or(Vec3::ZERO, Color::to_linear)
            .extend(1.0)
            .into()
    };
    MaterialUniform {
        color_start: color(material::COLOR_START),
        color_end: color(material::COLOR_END),
        params: [
            float(material::TIME),
            float(material::PIXEL_RATIO),
            float(material::SIZE),
            0.0,
        ],
        fire: [
            float(fire::MAGNITUDE),
            float(fire::LACUNARITY),
            float(fire::GAIN),
            0.0,
        ],
        camera: shader
            .vec3(material::CAMERA_POSITION)
            .unwrap_or(Vec3::ZERO)
            .extend(1.0)
            .into(),
        ..MaterialUniform::zeroed()
    }
}

fn uniform_entry<T>(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    key: PipelineKey,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    let mesh_layout = [wgpu::VertexBufferLayout {
        array_stride: (MeshData::STRIDE * std::mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &MESH_ATTRIBUTES,
    }];
    let points_layout = [
        wgpu::VertexBufferLayout {
            array_stride: (2 * std::mem::size_of::<f32>()) as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: (4 * std::mem::size_of::<f32>()) as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        },
    ];
    let buffers: &[wgpu::VertexBufferLayout<'_>] = match key.program {
        ProgramKind::Fireflies => &points_layout,
        _ => &mesh_layout,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(key.program.label()),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: "vs_main",
            buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: if key.double_sided {
                None
            } else {
                Some(wgpu::Face::Back)
            },
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: RenderTargets::DEPTH_FORMAT,
            depth_write_enabled: key.depth_write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: sample_count,
            ..Default::default()
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: key.blend.state(),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
    })
}

fn build_blit_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("blit-program"),
        source: wgpu::ShaderSource::Wgsl(shaders::BLIT.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("blit-pipeline-layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("blit-pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: "vs_main",
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
    })
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProgramKind {
    Basic,
    Standard,
    Portal,
    Fireflies,
    Fire,
}

impl ProgramKind {
    const ALL: [ProgramKind; 5] = [
        ProgramKind::Basic,
        ProgramKind::Standard,
        ProgramKind::Portal,
        ProgramKind::Fireflies,
        ProgramKind::Fire,
    ];

    fn source(self) -> &'static str {
        match self {
            Self::Basic => shaders::BASIC,
            Self::Standard => shaders::STANDARD,
            Self::Portal => shaders::PORTAL,
            Self::Fireflies => shaders::FIREFLIES,
            Self::Fire => shaders::FIRE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Basic => "basic-program",
            Self::Standard => "standard-program",
            Self::Portal => "portal-program",
            Self::Fireflies => "fireflies-program",
            Self::Fire => "fire-program",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BlendMode {
    Opaque,
    Alpha,
    Additive,
}

impl BlendMode {
    fn state(self) -> Option<wgpu::BlendState> {
        match self {
            Self::Opaque => None,
            Self::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            Self::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
        }
    }
}

/// Fixed-function state a material needs from its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramKind,
    blend: BlendMode,
    transparent: bool,
    depth_write: bool,
    double_sided: bool,
}

impl PipelineKey {
    fn for_material(material: MaterialRef<'_>) -> Self {
        let blend = |transparent: bool, blending: Blending| match (transparent, blending) {
            (_, Blending::Additive) => BlendMode::Additive,
            (true, Blending::Normal) => BlendMode::Alpha,
            (false, Blending::Normal) => BlendMode::Opaque,
        };
        match material {
            MaterialRef::Basic(basic) => Self {
                program: ProgramKind::Basic,
                blend: blend(basic.transparent, Blending::Normal),
                transparent: basic.transparent,
                depth_write: basic.depth_write,
                double_sided: basic.side == Side::Double,
            },
            MaterialRef::Standard(standard) => Self {
                program: ProgramKind::Standard,
                blend: BlendMode::Opaque,
                transparent: false,
                depth_write: true,
                double_sided: standard.side == Side::Double,
            },
            MaterialRef::Shader(shader) => Self {
                program: match shader.program() {
                    ShaderProgram::Portal => ProgramKind::Portal,
                    ShaderProgram::Fireflies => ProgramKind::Fireflies,
                    ShaderProgram::Fire => ProgramKind::Fire,
                },
                blend: blend(shader.transparent, shader.blending),
                transparent: shader.transparent,
                depth_write: shader.depth_write,
                double_sided: shader.side == Side::Double
                    || shader.program() != ShaderProgram::Portal,
            },
        }
    }
}

struct Draw {
    geometry: GeometryId,
    material: MaterialId,
    key: PipelineKey,
    object: wgpu::BindGroup,
    depth: f32,
}

/// Lighting state for the standard material.
#[derive(Debug, Clone, Copy)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(3.0, 5.0, -3.0),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

enum GpuBuffers {
    Mesh(MeshBuffers),
    Points { instances: wgpu::Buffer, count: u32 },
}

struct GpuGeometry {
    revision: u64,
    buffers: GpuBuffers,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        srgb: bool,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: if srgb {
                wgpu::TextureFormat::Rgba8UnormSrgb
            } else {
                wgpu::TextureFormat::Rgba8Unorm
            },
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Drawing buffer size for a logical size and an already capped pixel
/// ratio; the swap chain keeps the window's own size.
fn drawing_buffer_size(logical: (u32, u32), pixel_ratio: f32, max_dimension: u32) -> (u32, u32) {
    let scale = |extent: u32| {
        ((extent as f32 * pixel_ratio).round() as u32).clamp(1, max_dimension.max(1))
    };
    (scale(logical.0), scale(logical.1))
}

#[derive(Debug, Clone, Copy)]
struct TargetSpec {
    format: wgpu::TextureFormat,
    size: (u32, u32),
    sample_count: u32,
}

/// Offscreen color, MSAA and depth targets at drawing buffer size, plus the
/// bind group that blits the resolved color onto the swap chain.
struct RenderTargets {
    size: (u32, u32),
    msaa: Option<wgpu::TextureView>,
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
    blit_group: wgpu::BindGroup,
}

impl RenderTargets {
    const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(
        device: &wgpu::Device,
        spec: TargetSpec,
        blit_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Self {
        let extent = wgpu::Extent3d {
            width: spec.size.0.max(1),
            height: spec.size.1.max(1),
            depth_or_array_layers: 1,
        };
        let target = |label: &str,
                      format: wgpu::TextureFormat,
                      sample_count: u32,
                      usage: wgpu::TextureUsages| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: extent,
                    mip_level_count: 1,
                    sample_count,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        let color = target(
            "scene-color",
            spec.format,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let msaa = (spec.sample_count > 1).then(|| {
            target(
                "msaa-color",
                spec.format,
                spec.sample_count,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        let depth = target(
            "depth-texture",
            Self::DEPTH_FORMAT,
            spec.sample_count,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let blit_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit-bind-group"),
            layout: blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&color),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self {
            size: (extent.width, extent.height),
            msaa,
            color,
            depth,
            blit_group,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light_position: [f32; 4],
    light_color: [f32; 4],
    viewport: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MaterialUniform {
    color: [f32; 4],
    color_start: [f32; 4],
    color_end: [f32; 4],
    emissive: [f32; 4],
    params: [f32; 4],
    surface: [f32; 4],
    fire: [f32; 4],
    camera: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
}

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x4];

const QUAD_CORNERS: &[f32] = &[-0.5, -0.5, 0.5, -0.5, 0.5, 0.5, -0.5, 0.5];
const QUAD_INDICES: &[u32] = &[0, 1, 2, 0, 2, 3];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{shared_camera, PerspectiveCamera};
    use crate::material::{MaterialSet, MaterialSettings};
    use crate::viewport::tests::RecordingSurface;
    use crate::viewport::{Viewport, ViewportController};

    fn materials() -> MaterialSet {
        MaterialSet::new(&MaterialSettings {
            baked_texture: None,
            portal_color_start: Color::BLACK,
            portal_color_end: Color::from_hex(0xb358fe),
            fireflies_size: 90.0,
            pixel_ratio: 2.0,
        })
    }

    #[test]
    fn fireflies_use_additive_pipeline_without_depth_write() {
        let materials = materials();
        let key = PipelineKey::for_material(materials.get(MaterialId::Fireflies).unwrap());
        assert_eq!(key.program, ProgramKind::Fireflies);
        assert_eq!(key.blend, BlendMode::Additive);
        assert!(key.transparent);
        assert!(!key.depth_write);
    }

    #[test]
    fn pole_light_is_alpha_blended() {
        let materials = materials();
        let key = PipelineKey::for_material(materials.get(MaterialId::PoleLight).unwrap());
        assert_eq!(key.program, ProgramKind::Basic);
        assert_eq!(key.blend, BlendMode::Alpha);
        assert!(!key.depth_write);
    }

    #[test]
    fn portal_is_double_sided_and_opaque() {
        let materials = materials();
        let key = PipelineKey::for_material(materials.get(MaterialId::Portal).unwrap());
        assert_eq!(key.blend, BlendMode::Opaque);
        assert!(key.double_sided);
    }

    #[test]
    fn shader_uniform_packs_named_values() {
        let materials = materials();
        let uniform = shader_uniform(materials.fireflies());
        assert_eq!(uniform.params, [0.0, 2.0, 90.0, 0.0]);
        let portal = shader_uniform(materials.portal());
        let end = Color::from_hex(0xb358fe).to_linear();
        assert_eq!(portal.color_end, [end.x, end.y, end.z, 1.0]);
    }

    #[test]
    fn drawing_buffer_follows_capped_ratio_not_window() {
        let mut surface = RecordingSurface::default();
        let mut controller = ViewportController::new(Viewport::new(800, 600, 1.0));
        let camera = shared_camera(PerspectiveCamera::new(1.0));
        let mut materials = materials();
        controller.on_resize(1280, 720, 3.0, &camera, &mut surface, &mut materials);
        let size = drawing_buffer_size(surface.size.unwrap(), surface.pixel_ratio.unwrap(), 8192);
        assert_eq!(size, (2560, 1440));
    }

    #[test]
    fn drawing_buffer_is_clamped_to_device_limits() {
        assert_eq!(drawing_buffer_size((5000, 10), 2.0, 8192), (8192, 20));
        assert_eq!(drawing_buffer_size((0, 0), 1.0, 8192), (1, 1));
        assert_eq!(drawing_buffer_size((333, 333), 1.5, 8192), (500, 500));
    }

    #[test]
    fn uniform_sizes_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<GlobalUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<MaterialUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectConstants>() % 16, 0);
    }
}
