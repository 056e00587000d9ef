//! Multi-pass bloom stage.
//!
//! Bloom runs at half resolution in four passes:
//! 1. Threshold - extract pixels brighter than the threshold
//! 2. Horizontal blur (separable Gaussian)
//! 3. Vertical blur
//! 4. Composite - add the blurred brights back onto the scene
//!
//! It always operates on pre-graded linear color; the post processor places
//! it before color correction and tone mapping.

use bytemuck::{Pod, Zeroable};

use crate::post_processing::BloomSettings;

/// Maximum blur radius in texels (caps GPU cost).
pub const MAX_BLUR_RADIUS: f32 = 32.0;

/// Bloom processing resolution divisor.
const DOWNSAMPLE: u32 = 2;

/// The settings record's unit-ish radius scaled to blur texels.
fn radius_texels(radius: f32) -> f32 {
    (radius * 16.0).clamp(0.0, MAX_BLUR_RADIUS)
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ThresholdUniforms {
    threshold: f32,
    soft_knee: f32,
    _padding: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BlurUniforms {
    // xy = blur direction, z = radius in texels, w unused.
    direction_and_radius: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CompositeUniforms {
    intensity: f32,
    _padding: [f32; 3],
}

/// GPU resources for the bloom passes.
pub struct BloomProcessor {
    // Half-resolution ping-pong targets.
    bloom_view_a: wgpu::TextureView,
    bloom_view_b: wgpu::TextureView,

    threshold_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,

    single_texture_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,

    threshold_uniform_buffer: wgpu::Buffer,
    // Separate buffers per direction: queue writes all land before the
    // submission executes, so one shared buffer would only hold the last
    // direction written.
    blur_h_uniform_buffer: wgpu::Buffer,
    blur_v_uniform_buffer: wgpu::Buffer,
    composite_uniform_buffer: wgpu::Buffer,
    threshold_uniform_bind_group: wgpu::BindGroup,
    blur_h_uniform_bind_group: wgpu::BindGroup,
    blur_v_uniform_bind_group: wgpu::BindGroup,
    composite_uniform_bind_group: wgpu::BindGroup,

    sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
    bloom_width: u32,
    bloom_height: u32,
}

impl BloomProcessor {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        quad_layout: wgpu::VertexBufferLayout<'static>,
        uniform_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let bloom_width = (width / DOWNSAMPLE).max(1);
        let bloom_height = (height / DOWNSAMPLE).max(1);

        let (_, bloom_view_a) =
            create_bloom_texture(device, format, bloom_width, bloom_height, "Bloom A");
        let (_, bloom_view_b) =
            create_bloom_texture(device, format, bloom_width, bloom_height, "Bloom B");

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bloom Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let single_texture_layout = texture_layout(device, 1, "Bloom Texture Layout");
        let composite_layout = texture_layout(device, 2, "Bloom Composite Layout");

        let threshold_pipeline = pass_pipeline(
            device,
            format,
            &[&single_texture_layout, uniform_layout],
            include_str!("shader_post_bloom_threshold.wgsl"),
            quad_layout.clone(),
            "Bloom Threshold",
        );
        let blur_pipeline = pass_pipeline(
            device,
            format,
            &[&single_texture_layout, uniform_layout],
            include_str!("shader_post_bloom_blur.wgsl"),
            quad_layout.clone(),
            "Bloom Blur",
        );
        let composite_pipeline = pass_pipeline(
            device,
            format,
            &[&composite_layout, uniform_layout],
            include_str!("shader_post_bloom_composite.wgsl"),
            quad_layout,
            "Bloom Composite",
        );

        let make_uniform_buffer = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let threshold_uniform_buffer = make_uniform_buffer(
            "Bloom Threshold Uniforms",
            std::mem::size_of::<ThresholdUniforms>() as u64,
        );
        let blur_h_uniform_buffer = make_uniform_buffer(
            "Bloom Blur H Uniforms",
            std::mem::size_of::<BlurUniforms>() as u64,
        );
        let blur_v_uniform_buffer = make_uniform_buffer(
            "Bloom Blur V Uniforms",
            std::mem::size_of::<BlurUniforms>() as u64,
        );
        let composite_uniform_buffer = make_uniform_buffer(
            "Bloom Composite Uniforms",
            std::mem::size_of::<CompositeUniforms>() as u64,
        );

        let make_uniform_bind_group = |label: &str, buffer: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        };
        let threshold_uniform_bind_group =
            make_uniform_bind_group("Bloom Threshold Bind Group", &threshold_uniform_buffer);
        let blur_h_uniform_bind_group =
            make_uniform_bind_group("Bloom Blur H Bind Group", &blur_h_uniform_buffer);
        let blur_v_uniform_bind_group =
            make_uniform_bind_group("Bloom Blur V Bind Group", &blur_v_uniform_buffer);
        let composite_uniform_bind_group =
            make_uniform_bind_group("Bloom Composite Bind Group", &composite_uniform_buffer);

        Self {
            bloom_view_a,
            bloom_view_b,
            threshold_pipeline,
            blur_pipeline,
            composite_pipeline,
            single_texture_layout,
            composite_layout,
            threshold_uniform_buffer,
            blur_h_uniform_buffer,
            blur_v_uniform_buffer,
            composite_uniform_buffer,
            threshold_uniform_bind_group,
            blur_h_uniform_bind_group,
            blur_v_uniform_bind_group,
            composite_uniform_bind_group,
            sampler,
            format,
            bloom_width,
            bloom_height,
        }
    }

    /// Recreate the half-resolution targets after a viewport resize. Must be
    /// called in the same frame as the base renderer resize or the composite
    /// samples a mismatched resolution.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let bloom_w = (width / DOWNSAMPLE).max(1);
        let bloom_h = (height / DOWNSAMPLE).max(1);
        if bloom_w == self.bloom_width && bloom_h == self.bloom_height {
            return;
        }
        self.bloom_width = bloom_w;
        self.bloom_height = bloom_h;
        let (_, view_a) = create_bloom_texture(device, self.format, bloom_w, bloom_h, "Bloom A");
        let (_, view_b) = create_bloom_texture(device, self.format, bloom_w, bloom_h, "Bloom B");
        self.bloom_view_a = view_a;
        self.bloom_view_b = view_b;
    }

    /// Run threshold, blur and composite: `input` + bloom -> `output`.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        quad_vertex_buffer: &wgpu::Buffer,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        settings: &BloomSettings,
    ) {
        let settings = settings.sanitize();

        queue.write_buffer(
            &self.threshold_uniform_buffer,
            0,
            bytemuck::bytes_of(&ThresholdUniforms {
                threshold: settings.threshold,
                soft_knee: 0.5,
                _padding: [0.0; 2],
            }),
        );

        // 1. Threshold: input -> bloom_a (downsampled).
        self.fullscreen_pass(
            device,
            encoder,
            quad_vertex_buffer,
            &self.threshold_pipeline,
            &[input],
            &self.bloom_view_a,
            &self.threshold_uniform_bind_group,
            "Bloom Threshold Pass",
        );

        // 2/3. Separable blur: bloom_a -> bloom_b -> bloom_a.
        let radius = radius_texels(settings.radius);
        queue.write_buffer(
            &self.blur_h_uniform_buffer,
            0,
            bytemuck::bytes_of(&BlurUniforms {
                direction_and_radius: [1.0, 0.0, radius, 0.0],
            }),
        );
        queue.write_buffer(
            &self.blur_v_uniform_buffer,
            0,
            bytemuck::bytes_of(&BlurUniforms {
                direction_and_radius: [0.0, 1.0, radius, 0.0],
            }),
        );
        self.fullscreen_pass(
            device,
            encoder,
            quad_vertex_buffer,
            &self.blur_pipeline,
            &[&self.bloom_view_a],
            &self.bloom_view_b,
            &self.blur_h_uniform_bind_group,
            "Bloom Blur H Pass",
        );
        self.fullscreen_pass(
            device,
            encoder,
            quad_vertex_buffer,
            &self.blur_pipeline,
            &[&self.bloom_view_b],
            &self.bloom_view_a,
            &self.blur_v_uniform_bind_group,
            "Bloom Blur V Pass",
        );

        // 4. Composite: input + bloom_a -> output.
        queue.write_buffer(
            &self.composite_uniform_buffer,
            0,
            bytemuck::bytes_of(&CompositeUniforms {
                intensity: settings.intensity,
                _padding: [0.0; 3],
            }),
        );
        self.composite_pass(device, encoder, quad_vertex_buffer, input, output);
    }

    #[allow(clippy::too_many_arguments)]
    fn fullscreen_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        quad_vertex_buffer: &wgpu::Buffer,
        pipeline: &wgpu::RenderPipeline,
        inputs: &[&wgpu::TextureView],
        output: &wgpu::TextureView,
        uniform_bind_group: &wgpu::BindGroup,
        label: &str,
    ) {
        let mut entries = Vec::new();
        for (i, view) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i * 2) as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (i * 2 + 1) as u32,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        let layout = if inputs.len() == 1 {
            &self.single_texture_layout
        } else {
            &self.composite_layout
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
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
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_bind_group(1, uniform_bind_group, &[]);
        pass.set_vertex_buffer(0, quad_vertex_buffer.slice(..));
        pass.draw(0..6, 0..1);
    }

    fn composite_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        quad_vertex_buffer: &wgpu::Buffer,
        scene: &wgpu::TextureView,
        output: &wgpu::TextureView,
    ) {
        self.fullscreen_pass(
            device,
            encoder,
            quad_vertex_buffer,
            &self.composite_pipeline,
            &[scene, &self.bloom_view_a],
            output,
            &self.composite_uniform_bind_group,
            "Bloom Composite Pass",
        );
    }
}

fn create_bloom_texture(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    label: &str,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// A texture+sampler bind group layout for `slots` input textures.
fn texture_layout(device: &wgpu::Device, slots: u32, label: &str) -> wgpu::BindGroupLayout {
    let mut entries = Vec::new();
    for i in 0..slots {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: i * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: i * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Fullscreen-quad render pipeline for one post pass.
pub(crate) fn pass_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    shader_source: &str,
    quad_layout: wgpu::VertexBufferLayout<'static>,
    label: &str,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[quad_layout],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_texels_scaling() {
        assert_eq!(radius_texels(0.0), 0.0);
        assert_eq!(radius_texels(0.5), 8.0);
        // Caps at the maximum.
        assert_eq!(radius_texels(100.0), MAX_BLUR_RADIUS);
    }
}
