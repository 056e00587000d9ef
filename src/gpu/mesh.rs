//! GPU mesh upload.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::model::MeshData;

/// Vertex layout for the forward pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// A mesh uploaded to the GPU, plus the scalar material factors the forward
/// shader consumes.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
}

impl GpuMesh {
    /// Upload one mesh. Unindexed meshes get a trivial sequential index
    /// buffer so the draw path stays uniform.
    pub fn upload(
        device: &wgpu::Device,
        mesh: &MeshData,
        base_color: [f32; 4],
        emissive: [f32; 3],
    ) -> Self {
        let vertices: Vec<Vertex> = mesh
            .positions
            .iter()
            .zip(mesh.normals.iter())
            .map(|(&position, &normal)| Vertex { position, normal })
            .collect();

        let sequential: Vec<u32>;
        let indices: &[u32] = if mesh.indices.is_empty() {
            sequential = (0..vertices.len() as u32).collect();
            &sequential
        } else {
            &mesh.indices
        };

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            base_color,
            emissive,
        }
    }
}
