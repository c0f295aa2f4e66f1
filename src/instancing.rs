// src/instancing.rs
//! Per-instance attributes for the bar grid and the instanced mesh that draws
//! the whole grid in one call.
//!
//! Cell `(i, j)` of an `N×N` grid has linear index `i*N + j`, sits at
//! `((i - N/2)·w, 0, (j - N/2)·w)` and carries the UV `(i/N, 1 - j/N)`.
//! The `v` flip lines the grid up with texture space.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use std::mem;
use wgpu::util::DeviceExt;

use crate::gltf_loader::{MeshData, MeshVertex};

/// Vertex buffer slots used by the bar pipeline.
pub const MESH_SLOT: u32 = 0;
pub const TRANSFORM_SLOT: u32 = 1;
pub const UV_SLOT: u32 = 2;

/// Shader location of the per-instance UV (`puv`).
pub const PUV_LOCATION: u32 = 7;

/// Side count and spacing of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub side: u32,
    pub spacing: f32,
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceRecord {
    pub index: u32,
    pub translation: Vec3,
    pub uv: Vec2,
}

/// Column-major 4×4 transform as four `vec4` attributes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceTransform {
    pub columns: [[f32; 4]; 4],
}

impl InstanceTransform {
    const ATTRIBS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        3 => Float32x4,
        4 => Float32x4,
        5 => Float32x4,
        6 => Float32x4
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }

    #[inline]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.columns)
    }
}

impl From<Mat4> for InstanceTransform {
    fn from(m: Mat4) -> Self {
        Self { columns: m.to_cols_array_2d() }
    }
}

/// Per-instance grid UV.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceUv {
    pub puv: [f32; 2],
}

impl InstanceUv {
    const ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![PUV_LOCATION => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Both per-instance buffers, indexed by linear cell index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceAttributes {
    pub transforms: Vec<InstanceTransform>,
    pub uvs: Vec<InstanceUv>,
}

impl InstanceAttributes {
    #[inline]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl GridLayout {
    pub fn new(side: u32, spacing: f32) -> Self {
        Self { side, spacing }
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.side * self.side
    }

    /// Cell `(i, j)`, both in `[0, side)`.
    pub fn cell(&self, i: u32, j: u32) -> InstanceRecord {
        let n = self.side as f32;
        let half = n / 2.0;
        InstanceRecord {
            index: i * self.side + j,
            translation: Vec3::new(
                (i as f32 - half) * self.spacing,
                0.0,
                (j as f32 - half) * self.spacing,
            ),
            uv: Vec2::new(i as f32 / n, 1.0 - j as f32 / n),
        }
    }

    /// Every cell, `i` outer and `j` inner, so entry `k` has index `k`.
    pub fn cells(&self) -> impl Iterator<Item = InstanceRecord> + '_ {
        (0..self.side).flat_map(move |i| (0..self.side).map(move |j| self.cell(i, j)))
    }

    /// Computes the transform and UV buffers. Always recomputed, never cached.
    pub fn generate(&self) -> InstanceAttributes {
        let count = self.instance_count() as usize;
        let mut out = InstanceAttributes {
            transforms: Vec::with_capacity(count),
            uvs: Vec::with_capacity(count),
        };
        for cell in self.cells() {
            debug_assert_eq!(cell.index as usize, out.transforms.len());
            out.transforms.push(Mat4::from_translation(cell.translation).into());
            out.uvs.push(InstanceUv { puv: cell.uv.to_array() });
        }
        out
    }
}

/// GPU side of the bar grid: one base mesh plus the two instance buffers.
pub struct InstancedMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    transform_buffer: wgpu::Buffer,
    uv_buffer: wgpu::Buffer,
    instance_count: u32,
    layout: GridLayout,
}

impl InstancedMesh {
    pub fn new(device: &wgpu::Device, mesh: &MeshData, layout: GridLayout) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bar_vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bar_indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let (transform_buffer, uv_buffer, instance_count) = Self::upload_instances(device, &layout);
        log::info!(
            "instanced mesh: {} vertices, {} indices, {} instances",
            mesh.vertices.len(),
            mesh.indices.len(),
            instance_count
        );
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            transform_buffer,
            uv_buffer,
            instance_count,
            layout,
        }
    }

    fn upload_instances(device: &wgpu::Device, layout: &GridLayout) -> (wgpu::Buffer, wgpu::Buffer, u32) {
        let attributes = layout.generate();
        let transforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bar_instance_transforms"),
            contents: bytemuck::cast_slice(&attributes.transforms),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let uvs = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bar_instance_uvs"),
            contents: bytemuck::cast_slice(&attributes.uvs),
            usage: wgpu::BufferUsages::VERTEX,
        });
        (transforms, uvs, attributes.len() as u32)
    }

    /// Regenerates the instance buffers when the grid changes.
    pub fn set_layout(&mut self, device: &wgpu::Device, layout: GridLayout) {
        if layout == self.layout {
            return;
        }
        let (transforms, uvs, count) = Self::upload_instances(device, &layout);
        self.transform_buffer = transforms;
        self.uv_buffer = uvs;
        self.instance_count = count;
        self.layout = layout;
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[inline]
    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 3] {
        [MeshVertex::layout(), InstanceTransform::layout(), InstanceUv::layout()]
    }

    /// Binds the buffers and issues the single instanced draw.
    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_vertex_buffer(MESH_SLOT, self.vertex_buffer.slice(..));
        pass.set_vertex_buffer(TRANSFORM_SLOT, self.transform_buffer.slice(..));
        pass.set_vertex_buffer(UV_SLOT, self.uv_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..self.instance_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_generates_side_squared_instances() {
        for side in [1u32, 2, 7, 50] {
            let attrs = GridLayout::new(side, 1.5).generate();
            assert_eq!(attrs.transforms.len(), (side * side) as usize);
            assert_eq!(attrs.uvs.len(), (side * side) as usize);
        }
    }

    #[test]
    fn test_indices_are_unique_and_ordered() {
        let grid = GridLayout::new(13, 2.0);
        let indices: Vec<u32> = grid.cells().map(|c| c.index).collect();
        let unique: HashSet<u32> = indices.iter().copied().collect();
        assert_eq!(unique.len(), indices.len());
        assert!(indices.iter().enumerate().all(|(k, &idx)| k as u32 == idx));
    }

    #[test]
    fn test_uv_corners() {
        let grid = GridLayout::new(50, 60.0);
        let first = grid.cell(0, 0);
        assert_eq!(first.uv, Vec2::new(0.0, 1.0));
        let last = grid.cell(49, 49);
        assert!(close(last.uv.x, 0.98) && close(last.uv.y, 0.02));
    }

    #[test]
    fn test_uv_pairs_identify_cells() {
        let grid = GridLayout::new(20, 1.0);
        let keys: HashSet<(u32, u32)> = grid
            .generate()
            .uvs
            .iter()
            .map(|u| (u.puv[0].to_bits(), u.puv[1].to_bits()))
            .collect();
        assert_eq!(keys.len(), 400);
    }

    #[test]
    fn test_translations_are_centered() {
        let grid = GridLayout::new(50, 60.0);
        assert_eq!(grid.cell(25, 25).translation, Vec3::ZERO);
        for (i, j) in [(0u32, 0u32), (3, 41), (49, 7)] {
            let t = grid.cell(i, j).translation;
            assert_eq!(t, Vec3::new((i as f32 - 25.0) * 60.0, 0.0, (j as f32 - 25.0) * 60.0));
        }
    }

    #[test]
    fn test_transforms_are_translation_only() {
        let attrs = GridLayout::new(4, 3.0).generate();
        let m = attrs.transforms[6].to_mat4();
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        assert!(scale.abs_diff_eq(Vec3::ONE, 1e-6));
        assert!(rotation.abs_diff_eq(glam::Quat::IDENTITY, 1e-6));
        // index 6 = (i=1, j=2) with N/2 = 2
        assert_eq!(translation, Vec3::new(-3.0, 0.0, 0.0));
    }

    #[test]
    fn test_regenerates_when_spacing_changes() {
        let a = GridLayout::new(5, 1.0).generate();
        let b = GridLayout::new(5, 2.0).generate();
        assert_eq!(a.uvs, b.uvs);
        assert_ne!(a.transforms, b.transforms);
        assert_eq!(b.transforms[0].to_mat4().w_axis.x, -5.0);
    }

    #[test]
    fn test_odd_side_uses_fractional_center() {
        let grid = GridLayout::new(3, 2.0);
        assert_eq!(grid.cell(0, 0).translation, Vec3::new(-3.0, 0.0, -3.0));
        assert_eq!(grid.cell(2, 2).translation, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_instance_layouts() {
        assert_eq!(InstanceTransform::layout().array_stride, 64);
        assert_eq!(InstanceUv::layout().array_stride, 8);
        assert_eq!(InstanceUv::layout().attributes[0].shader_location, PUV_LOCATION);
        assert_eq!(InstanceTransform::layout().step_mode, wgpu::VertexStepMode::Instance);
    }
}
