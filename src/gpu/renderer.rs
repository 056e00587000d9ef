//! GPU renderer for the viewer scene.
//!
//! Draws the backdrop, the shadow depth pass, and the forward mesh pass
//! into the post processor's HDR scene target, then hands off to the post
//! chain for bloom, color correction, and tone-mapped output.
//!
//! The renderer owns the actual shadow map texture; the light rig only
//! tracks the descriptor and the rebuild flag. Each frame the renderer
//! checks the flag, reconstructs the depth texture when needed, and
//! acknowledges with `shadow_map_rebuilt`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::gpu::mesh::{GpuMesh, Vertex};
use crate::gpu::post_processor::{PostProcessor, HDR_FORMAT};
use crate::session::ViewerSession;

/// Maximum number of meshes that can be rendered per frame.
/// Each mesh needs its own slot in the dynamic uniform buffer.
const MAX_MESHES_PER_FRAME: usize = 256;

/// Uniform buffer alignment (minUniformBufferOffsetAlignment is typically 256 bytes).
const UNIFORM_ALIGNMENT: usize = 256;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Near/far planes for the light's orthographic projection.
const SHADOW_NEAR: f32 = 0.1;
const SHADOW_FAR: f32 = 50.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct MeshUniforms {
    model: [[f32; 4]; 4],
    base_color: [f32; 4],
    emissive: [f32; 4],
    // Pad the slot to the dynamic-offset alignment.
    _padding: [f32; 40],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    inv_view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    size: wgpu::Extent3d,

    mesh_pipeline: wgpu::RenderPipeline,
    background_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,

    #[allow(dead_code)]
    mesh_bind_group_layout: wgpu::BindGroupLayout,
    frame_bind_group_layout: wgpu::BindGroupLayout,
    #[allow(dead_code)]
    shadow_frame_bind_group_layout: wgpu::BindGroupLayout,

    mesh_uniform_buffer: wgpu::Buffer,
    mesh_bind_group: wgpu::BindGroup,
    frame_uniform_buffer: wgpu::Buffer,
    lighting_uniform_buffer: wgpu::Buffer,
    environment_uniform_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    shadow_frame_bind_group: wgpu::BindGroup,

    env_sampler: wgpu::Sampler,
    env_texture_view: wgpu::TextureView,
    /// Source path of the uploaded environment map, to detect replacement.
    env_source: Option<String>,

    shadow_sampler: wgpu::Sampler,
    shadow_texture_view: wgpu::TextureView,
    shadow_map_size: u32,

    depth_texture_view: wgpu::TextureView,

    post_processor: PostProcessor,

    /// Uploaded meshes, in session model order.
    meshes: Vec<GpuMesh>,
    /// How many of the session's models have been uploaded.
    uploaded_models: usize,
}

impl Renderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        // === Bind group layouts ===

        let mesh_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Mesh Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Bind Group Layout"),
                entries: &[
                    uniform_entry(0),
                    uniform_entry(1),
                    uniform_entry(2),
                    // Environment map. Rgba32Float is not filterable without
                    // an extra device feature, so it pairs with a
                    // non-filtering sampler.
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 5,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 6,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                        count: None,
                    },
                ],
            });

        let shadow_frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Shadow Frame Bind Group Layout"),
                entries: &[uniform_entry(0)],
            });

        // The background pass reuses the first four frame bindings.
        let background_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Background Bind Group Layout"),
                entries: &[
                    uniform_entry(0),
                    uniform_entry(1),
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                ],
            });

        // === Buffers ===

        let mesh_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_MESHES_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let lighting_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lighting Uniform Buffer"),
            size: std::mem::size_of::<crate::lighting::LightingUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let environment_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Environment Uniform Buffer"),
            size: std::mem::size_of::<crate::environment::EnvironmentUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mesh_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Bind Group"),
            layout: &mesh_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &mesh_uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<MeshUniforms>() as u64),
                }),
            }],
        });

        // === Samplers and placeholder textures ===

        let env_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        // 1x1 black placeholder: zero environment contribution until a map
        // is loaded.
        let env_texture_view = upload_environment_pixels(&device, &queue, 1, 1, &[0.0; 4]);

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let shadow_map_size = 1;
        let shadow_texture_view = create_shadow_texture(&device, shadow_map_size);

        let depth_texture_view = create_depth_texture(&device, size);

        let frame_bind_group = create_frame_bind_group(
            &device,
            &frame_bind_group_layout,
            &frame_uniform_buffer,
            &lighting_uniform_buffer,
            &environment_uniform_buffer,
            &env_texture_view,
            &env_sampler,
            &shadow_texture_view,
            &shadow_sampler,
        );
        let shadow_frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Frame Bind Group"),
            layout: &shadow_frame_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_uniform_buffer.as_entire_binding(),
            }],
        });

        // === Pipelines ===

        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_scene.wgsl").into()),
        });
        let mesh_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&mesh_bind_group_layout, &frame_bind_group_layout],
            push_constant_ranges: &[],
        });
        let mesh_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&mesh_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &scene_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: HDR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let background_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Background Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_background.wgsl").into()),
        });
        let background_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Background Pipeline Layout"),
                bind_group_layouts: &[&background_bind_group_layout],
                push_constant_ranges: &[],
            });
        let background_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Background Pipeline"),
                layout: Some(&background_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &background_shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &background_shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: HDR_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                // Drawn first with depth writes off; meshes overwrite it.
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Depth Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_shadow_depth.wgsl").into()),
        });
        let shadow_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Shadow Pipeline Layout"),
                bind_group_layouts: &[&mesh_bind_group_layout, &shadow_frame_bind_group_layout],
                push_constant_ranges: &[],
            });
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&shadow_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let post_processor = PostProcessor::new(&device, surface_format, size.width, size.height);

        Self {
            device,
            queue,
            size,
            mesh_pipeline,
            background_pipeline,
            shadow_pipeline,
            mesh_bind_group_layout,
            frame_bind_group_layout,
            shadow_frame_bind_group_layout,
            mesh_uniform_buffer,
            mesh_bind_group,
            frame_uniform_buffer,
            lighting_uniform_buffer,
            environment_uniform_buffer,
            frame_bind_group,
            shadow_frame_bind_group,
            env_sampler,
            env_texture_view,
            env_source: None,
            shadow_sampler,
            shadow_texture_view,
            shadow_map_size,
            depth_texture_view,
            post_processor,
            meshes: Vec::new(),
            uploaded_models: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.size.width && height == self.size.height {
            return;
        }
        self.size.width = width;
        self.size.height = height;
        self.depth_texture_view = create_depth_texture(&self.device, self.size);
        self.post_processor.resize(&self.device, width, height);
    }

    /// Render one frame of the session into `surface_view`.
    pub fn render(&mut self, session: &mut ViewerSession, surface_view: &wgpu::TextureView) {
        self.sync_meshes(session);
        self.sync_environment(session);
        self.sync_shadow_map(session);

        let aspect = self.size.width as f32 / self.size.height as f32;
        let mut camera = session.camera.clone();
        camera.aspect = aspect;
        let view_proj = camera.view_projection_matrix();

        let light_pos = Vec3::from(session.lights.directional.position());
        let extent = session.lights.shadow.camera_extent;
        let light_view = Mat4::look_at_rh(light_pos, Vec3::ZERO, Vec3::Y);
        let light_proj =
            Mat4::orthographic_rh(-extent, extent, -extent, extent, SHADOW_NEAR, SHADOW_FAR);
        let light_view_proj = light_proj * light_view;

        let frame = FrameUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            light_view_proj: light_view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_position: [camera.position.x, camera.position.y, camera.position.z, 1.0],
        };
        self.queue
            .write_buffer(&self.frame_uniform_buffer, 0, bytemuck::bytes_of(&frame));
        self.queue.write_buffer(
            &self.lighting_uniform_buffer,
            0,
            bytemuck::bytes_of(&session.lights.to_uniforms()),
        );
        self.queue.write_buffer(
            &self.environment_uniform_buffer,
            0,
            bytemuck::bytes_of(
                &session
                    .environment
                    .to_uniforms(session.environment_map.is_some()),
            ),
        );

        let mesh_count = self.meshes.len().min(MAX_MESHES_PER_FRAME);
        for (i, mesh) in self.meshes.iter().take(mesh_count).enumerate() {
            let uniforms = MeshUniforms {
                model: Mat4::IDENTITY.to_cols_array_2d(),
                base_color: mesh.base_color,
                emissive: [mesh.emissive[0], mesh.emissive[1], mesh.emissive[2], 0.0],
                _padding: [0.0; 40],
            };
            self.queue.write_buffer(
                &self.mesh_uniform_buffer,
                (i * UNIFORM_ALIGNMENT) as u64,
                bytemuck::bytes_of(&uniforms),
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        if session.lights.shadow.enabled {
            let mut shadow_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_texture_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            shadow_pass.set_pipeline(&self.shadow_pipeline);
            shadow_pass.set_bind_group(1, &self.shadow_frame_bind_group, &[]);
            for (i, mesh) in self.meshes.iter().take(mesh_count).enumerate() {
                let offset = (i * UNIFORM_ALIGNMENT) as u32;
                shadow_pass.set_bind_group(0, &self.mesh_bind_group, &[offset]);
                shadow_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                shadow_pass
                    .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                shadow_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        {
            let background_bind_group = self.create_background_bind_group();
            let mut scene_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.post_processor.scene_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Backdrop first, before any mesh writes depth.
            scene_pass.set_pipeline(&self.background_pipeline);
            scene_pass.set_bind_group(0, &background_bind_group, &[]);
            scene_pass.draw(0..3, 0..1);

            scene_pass.set_pipeline(&self.mesh_pipeline);
            scene_pass.set_bind_group(1, &self.frame_bind_group, &[]);
            for (i, mesh) in self.meshes.iter().take(mesh_count).enumerate() {
                let offset = (i * UNIFORM_ALIGNMENT) as u32;
                scene_pass.set_bind_group(0, &self.mesh_bind_group, &[offset]);
                scene_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                scene_pass
                    .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                scene_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.post_processor.process(
            &self.device,
            &mut encoder,
            &self.queue,
            surface_view,
            &session.post,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Upload meshes from models that arrived since the last frame.
    fn sync_meshes(&mut self, session: &ViewerSession) {
        for model in &session.models[self.uploaded_models..] {
            for mesh_data in &model.meshes {
                let material = model.scene.materials.get(mesh_data.material);
                let base_color = material
                    .and_then(|m| m.base_color)
                    .unwrap_or([0.8, 0.8, 0.8, 1.0]);
                let emissive = material.and_then(|m| m.emissive).unwrap_or([0.0; 3]);
                self.meshes
                    .push(GpuMesh::upload(&self.device, mesh_data, base_color, emissive));
            }
        }
        if self.meshes.len() > MAX_MESHES_PER_FRAME {
            log::warn!(
                "scene has {} meshes, rendering the first {}",
                self.meshes.len(),
                MAX_MESHES_PER_FRAME
            );
        }
        self.uploaded_models = session.models.len();
    }

    /// Upload a newly loaded environment map, RGB expanded to RGBA.
    fn sync_environment(&mut self, session: &ViewerSession) {
        let Some(map) = &session.environment_map else {
            return;
        };
        if self.env_source.as_deref() == Some(map.source.as_str()) {
            return;
        }
        let mut rgba = Vec::with_capacity((map.width * map.height * 4) as usize);
        for px in map.pixels.chunks_exact(3) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 1.0]);
        }
        self.env_texture_view =
            upload_environment_pixels(&self.device, &self.queue, map.width, map.height, &rgba);
        self.env_source = Some(map.source.clone());
        self.recreate_frame_bind_group();
        log::info!("environment map uploaded: {} ({}x{})", map.source, map.width, map.height);
    }

    /// Reconstruct the shadow depth texture when the rig flags a rebuild,
    /// then acknowledge so the flag clears.
    fn sync_shadow_map(&mut self, session: &mut ViewerSession) {
        let config = &session.lights.shadow;
        if !config.enabled {
            return;
        }
        if !config.needs_rebuild && self.shadow_map_size == config.map_size {
            return;
        }
        self.shadow_map_size = config.map_size;
        self.shadow_texture_view = create_shadow_texture(&self.device, self.shadow_map_size);
        self.recreate_frame_bind_group();
        session.lights.shadow_map_rebuilt();
        log::debug!("shadow map rebuilt at {0}x{0}", self.shadow_map_size);
    }

    fn recreate_frame_bind_group(&mut self) {
        self.frame_bind_group = create_frame_bind_group(
            &self.device,
            &self.frame_bind_group_layout,
            &self.frame_uniform_buffer,
            &self.lighting_uniform_buffer,
            &self.environment_uniform_buffer,
            &self.env_texture_view,
            &self.env_sampler,
            &self.shadow_texture_view,
            &self.shadow_sampler,
        );
    }

    fn create_background_bind_group(&self) -> wgpu::BindGroup {
        let layout = self
            .background_pipeline
            .get_bind_group_layout(0);
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Background Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.frame_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.environment_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.env_texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.env_sampler),
                },
            ],
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn create_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    frame_uniform_buffer: &wgpu::Buffer,
    lighting_uniform_buffer: &wgpu::Buffer,
    environment_uniform_buffer: &wgpu::Buffer,
    env_texture_view: &wgpu::TextureView,
    env_sampler: &wgpu::Sampler,
    shadow_texture_view: &wgpu::TextureView,
    shadow_sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Frame Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lighting_uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: environment_uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(env_texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(env_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::TextureView(shadow_texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: wgpu::BindingResource::Sampler(shadow_sampler),
            },
        ],
    })
}

fn create_depth_texture(device: &wgpu::Device, size: wgpu::Extent3d) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_shadow_texture(device: &wgpu::Device, size: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Shadow Map"),
        size: wgpu::Extent3d {
            width: size.max(1),
            height: size.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SHADOW_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn upload_environment_pixels(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    rgba: &[f32],
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Environment Map"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
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
        bytemuck::cast_slice(rgba),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width * 16),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_uniforms_fill_one_dynamic_offset_slot() {
        assert_eq!(std::mem::size_of::<MeshUniforms>(), UNIFORM_ALIGNMENT);
        let uniforms = MeshUniforms {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            base_color: [0.8, 0.8, 0.8, 1.0],
            emissive: [0.0; 4],
            _padding: [0.0; 40],
        };
        assert_eq!(bytemuck::bytes_of(&uniforms).len(), UNIFORM_ALIGNMENT);
    }
}
