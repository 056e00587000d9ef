//! GPU post-processing chain execution.
//!
//! Owns the HDR scene render target, ping-pong intermediates, and the
//! pipelines for the fixed stage order: base render -> bloom -> color
//! correction -> tone-mapped output. The output pass always runs (it is the
//! only pass that writes to the surface format), so a fully default chain
//! still produces a tone-mapped image rather than a raw blit.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::bloom_processor::{pass_pipeline, BloomProcessor};
use crate::post_processing::{ColorCorrectionUniforms, OutputUniforms, PostChain};

/// Format for the scene target and intermediates. Kept in linear HDR so
/// bloom thresholds above 1.0 have something to extract.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Vertex for fullscreen quad rendering.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub(crate) fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Fullscreen quad vertices (two triangles covering NDC).
const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0,  1.0], uv: [0.0, 0.0] },
];

/// GPU post-processing system.
pub struct PostProcessor {
    /// HDR scene render target (the base render stage draws into this).
    #[allow(dead_code)]
    scene_texture: wgpu::Texture,
    scene_view: wgpu::TextureView,
    /// Intermediate HDR render targets (ping-pong between stages).
    #[allow(dead_code)]
    intermediate_textures: [wgpu::Texture; 2],
    intermediate_views: [wgpu::TextureView; 2],

    quad_vertex_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    #[allow(dead_code)]
    uniform_bind_group_layout: wgpu::BindGroupLayout,

    color_correct_pipeline: wgpu::RenderPipeline,
    color_correct_uniform_buffer: wgpu::Buffer,
    color_correct_bind_group: wgpu::BindGroup,

    output_pipeline: wgpu::RenderPipeline,
    output_uniform_buffer: wgpu::Buffer,
    output_bind_group: wgpu::BindGroup,

    bloom_processor: BloomProcessor,

    width: u32,
    height: u32,
}

impl PostProcessor {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);

        let (scene_texture, scene_view) = create_hdr_texture(device, width, height, "Scene Texture");
        let (tex_a, view_a) = create_hdr_texture(device, width, height, "Post Texture A");
        let (tex_b, view_b) = create_hdr_texture(device, width, height, "Post Texture B");

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Post-Process Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Post-Process Texture Bind Group Layout"),
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

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Post-Process Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        // Color correction stays in HDR; the output pass converts to the
        // surface format.
        let color_correct_pipeline = pass_pipeline(
            device,
            HDR_FORMAT,
            &[&texture_bind_group_layout, &uniform_bind_group_layout],
            include_str!("shader_post_color_correct.wgsl"),
            QuadVertex::desc(),
            "Color Correct",
        );
        let output_pipeline = pass_pipeline(
            device,
            surface_format,
            &[&texture_bind_group_layout, &uniform_bind_group_layout],
            include_str!("shader_post_output.wgsl"),
            QuadVertex::desc(),
            "Tone Map Output",
        );

        let color_correct_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Color Correct Uniforms"),
            size: std::mem::size_of::<ColorCorrectionUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let output_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Uniforms"),
            size: std::mem::size_of::<OutputUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let color_correct_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Color Correct Uniform Bind Group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: color_correct_uniform_buffer.as_entire_binding(),
            }],
        });
        let output_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Output Uniform Bind Group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: output_uniform_buffer.as_entire_binding(),
            }],
        });

        let bloom_processor = BloomProcessor::new(
            device,
            HDR_FORMAT,
            width,
            height,
            QuadVertex::desc(),
            &uniform_bind_group_layout,
        );

        Self {
            scene_texture,
            scene_view,
            intermediate_textures: [tex_a, tex_b],
            intermediate_views: [view_a, view_b],
            quad_vertex_buffer,
            sampler,
            texture_bind_group_layout,
            uniform_bind_group_layout,
            color_correct_pipeline,
            color_correct_uniform_buffer,
            color_correct_bind_group,
            output_pipeline,
            output_uniform_buffer,
            output_bind_group,
            bloom_processor,
            width,
            height,
        }
    }

    /// The HDR target the base render pass should draw into.
    pub fn scene_view(&self) -> &wgpu::TextureView {
        &self.scene_view
    }

    /// Resize all intermediates. The bloom targets resize in the same call
    /// so the composite never samples a mismatched resolution.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;

        let (scene_texture, scene_view) = create_hdr_texture(device, width, height, "Scene Texture");
        let (tex_a, view_a) = create_hdr_texture(device, width, height, "Post Texture A");
        let (tex_b, view_b) = create_hdr_texture(device, width, height, "Post Texture B");
        self.scene_texture = scene_texture;
        self.scene_view = scene_view;
        self.intermediate_textures = [tex_a, tex_b];
        self.intermediate_views = [view_a, view_b];

        self.bloom_processor.resize(device, width, height);
    }

    /// Run the enabled stages in fixed order and write the final image to
    /// `output_view` (the surface).
    pub fn process(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        output_view: &wgpu::TextureView,
        chain: &PostChain,
    ) {
        let mut input: &wgpu::TextureView = &self.scene_view;

        if chain.bloom.enabled && chain.bloom.intensity > 0.0 {
            self.bloom_processor.process(
                device,
                encoder,
                queue,
                &self.quad_vertex_buffer,
                input,
                &self.intermediate_views[0],
                &chain.bloom,
            );
            input = &self.intermediate_views[0];
        }

        if chain.color_correction.enabled {
            queue.write_buffer(
                &self.color_correct_uniform_buffer,
                0,
                bytemuck::bytes_of(&ColorCorrectionUniforms::from_settings(
                    &chain.color_correction,
                )),
            );
            self.run_pass(
                device,
                encoder,
                &self.color_correct_pipeline,
                input,
                &self.intermediate_views[1],
                &self.color_correct_bind_group,
                "Color Correct Pass",
            );
            input = &self.intermediate_views[1];
        }

        // Output always runs: tone map, exposure, and surface-format write.
        queue.write_buffer(
            &self.output_uniform_buffer,
            0,
            bytemuck::bytes_of(&OutputUniforms::from_settings(&chain.output)),
        );
        self.run_pass(
            device,
            encoder,
            &self.output_pipeline,
            input,
            output_view,
            &self.output_bind_group,
            "Tone Map Output Pass",
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        uniform_bind_group: &wgpu::BindGroup,
        label: &str,
    ) {
        let texture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
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
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &texture_bind_group, &[]);
        render_pass.set_bind_group(1, uniform_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..6, 0..1);
    }
}

fn create_hdr_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
