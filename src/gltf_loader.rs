// src/gltf_loader.rs
// glTF / GLB loader for the bar geometry.
// Flattens every triangle primitive of the default scene into one indexed mesh,
// baking node transforms, so the whole model can be instanced with one draw.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Extension name of Draco-compressed meshes. Not decoded at runtime.
pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// CPU copy of the base geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Applies a uniform scale to every position.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.vertices {
            v.position = (Vec3::from(v.position) * factor).to_array();
        }
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.vertices.iter().map(|v| Vec3::from(v.position));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// `models/bar.glb` → `models/bar.decompressed.glb`.
pub fn decompressed_sibling(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("model");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("glb");
    path.with_file_name(format!("{stem}.decompressed.{ext}"))
}

/// True when the document needs Draco decompression to be read.
pub fn requires_draco(bytes: &[u8]) -> Result<bool> {
    let gltf = gltf::Gltf::from_slice_without_validation(bytes)?;
    let needs = gltf.extensions_required().any(|e| e == DRACO_EXTENSION)
        || gltf.extensions_used().any(|e| e == DRACO_EXTENSION);
    Ok(needs)
}

/// Parses GLB (or self-contained glTF) bytes into one merged mesh.
/// `path` is only used for error messages.
pub fn parse_mesh(bytes: &[u8], path: &Path) -> Result<MeshData> {
    if requires_draco(bytes)? {
        return Err(Error::CompressedModel { path: path.to_path_buf() });
    }

    let (document, buffers, _images) = gltf::import_slice(bytes)?;
    let mut mesh = MeshData::default();

    let roots: Vec<gltf::Node> = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().collect(),
        None => document.nodes().collect(),
    };
    for node in roots {
        append_node(&node, Mat4::IDENTITY, &buffers, &mut mesh);
    }

    if mesh.indices.is_empty() {
        return Err(Error::MissingGeometry(path.to_path_buf()));
    }
    log::debug!(
        "parsed {}: {} vertices, {} triangles",
        path.display(),
        mesh.vertices.len(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

fn append_node(node: &gltf::Node, parent: Mat4, buffers: &[gltf::buffer::Data], out: &mut MeshData) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!("skipping non-triangle primitive in mesh {:?}", mesh.name());
                continue;
            }
            append_primitive(&primitive, world, buffers, out);
        }
    }
    for child in node.children() {
        append_node(&child, world, buffers, out);
    }
}

fn append_primitive(
    primitive: &gltf::Primitive,
    world: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut MeshData,
) {
    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
    let Some(positions) = reader.read_positions() else {
        return;
    };
    let positions: Vec<[f32; 3]> = positions.collect();
    let count = positions.len();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(iter) => iter.into_u32().collect(),
        None => (0..count as u32).collect(),
    };
    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        Some(iter) => iter.collect(),
        None => smooth_normals(&positions, &indices),
    };
    let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(iter) => iter.into_f32().collect(),
        None => vec![[0.0, 0.0]; count],
    };

    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    let base = out.vertices.len() as u32;
    for k in 0..count {
        let normal = normals.get(k).copied().unwrap_or([0.0, 1.0, 0.0]);
        out.vertices.push(MeshVertex {
            position: world.transform_point3(Vec3::from(positions[k])).to_array(),
            normal: (normal_matrix * Vec3::from(normal)).normalize_or_zero().to_array(),
            uv: uvs.get(k).copied().unwrap_or([0.0, 0.0]),
        });
    }
    out.indices.extend(indices.into_iter().map(|i| base + i));
}

/// Area-weighted vertex normals for primitives that ship without them.
fn smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut acc = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let (pa, pb, pc) = (Vec3::from(positions[a]), Vec3::from(positions[b]), Vec3::from(positions[c]));
        let n = (pb - pa).cross(pc - pa);
        acc[a] += n;
        acc[b] += n;
        acc[c] += n;
    }
    acc.into_iter().map(|n| n.normalize_or_zero().to_array()).collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_parse_triangle() {
        let mesh = parse_mesh(&triangle_glb(), Path::new("tri.glb")).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.triangle_count(), 1);
        // Generated normals face the viewer of a CCW triangle.
        for v in &mesh.vertices {
            assert!((Vec3::from(v.normal) - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn test_node_transform_is_baked() {
        let mesh = parse_mesh(&translated_triangle_glb(), Path::new("tri.glb")).unwrap();
        let (lo, hi) = mesh.bounds().unwrap();
        assert_eq!(lo, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(hi, Vec3::new(3.0, 1.0, 0.0));
    }

    #[test]
    fn test_draco_model_is_reported() {
        let bytes = draco_glb();
        assert!(requires_draco(&bytes).unwrap());
        let err = parse_mesh(&bytes, Path::new("models/bar.glb")).unwrap_err();
        assert!(matches!(err, Error::CompressedModel { .. }));
        assert!(!requires_draco(&triangle_glb()).unwrap());
    }

    #[test]
    fn test_empty_model_is_missing_geometry() {
        let err = parse_mesh(&empty_glb(), Path::new("empty.glb")).unwrap_err();
        assert!(matches!(err, Error::MissingGeometry(_)));
    }

    #[test]
    fn test_garbage_is_gltf_error() {
        let err = parse_mesh(b"definitely not a model", Path::new("x.glb")).unwrap_err();
        assert!(matches!(err, Error::Gltf(_)));
    }

    #[test]
    fn test_scale_and_bounds() {
        let mut mesh = parse_mesh(&triangle_glb(), Path::new("tri.glb")).unwrap();
        mesh.scale(50.0);
        let (_, hi) = mesh.bounds().unwrap();
        assert_eq!(hi, Vec3::new(50.0, 50.0, 0.0));
        assert!(MeshData::default().bounds().is_none());
    }

    #[test]
    fn test_decompressed_sibling() {
        assert_eq!(
            decompressed_sibling(Path::new("models/bar.glb")),
            PathBuf::from("models/bar.decompressed.glb")
        );
    }

    #[test]
    fn test_vertex_layout() {
        let layout = MeshVertex::layout();
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.attributes.len(), 3);
    }
}
