// src/pbr_materials.rs
// Standard PBR material: parameters, uniform layout, bind group, and the
// compiled (patched + expanded) shader program.
//
// Usage summary:
// let mut material = StandardMaterial::new(&config.material).with_patches(effect::reveal_patches());
// let program = material.program(&library)?;          // patched exactly once
// let layout = StandardMaterial::bind_group_layout(&device);
// let gpu = material.create_gpu(&device, &layout, map, ao_map, &fallback);

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::MaterialConfig;
use crate::shader_library::{ShaderLibrary, ShaderProgram};
use crate::shader_patch::PatchSet;
use crate::texture::Texture;
use crate::Result;

/// Material feature flags (bitmask)
pub mod flags {
    pub const MAP: u32 = 1 << 0;
    pub const AO_MAP: u32 = 1 << 1;
}

/// Matches WGSL `Material` struct exactly
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub color: [f32; 4],
    pub metalness: f32,
    pub roughness: f32,
    pub ao_map_intensity: f32,
    pub flags: u32,
}

/// GPU resources of one material.
pub struct MaterialGpu {
    pub params_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// Metalness/roughness material with optional color and AO maps and an
/// optional set of shader injections.
#[derive(Debug, Clone)]
pub struct StandardMaterial {
    /// Linear RGB.
    pub color: [f32; 3],
    pub metalness: f32,
    pub roughness: f32,
    pub ao_map_intensity: f32,
    pub use_map: bool,
    pub use_ao_map: bool,
    patches: Option<PatchSet>,
    program: Option<ShaderProgram>,
    compile_count: u32,
}

impl StandardMaterial {
    pub fn new(config: &MaterialConfig) -> Self {
        Self {
            color: config.color.to_linear(),
            metalness: config.metalness,
            roughness: config.roughness,
            ao_map_intensity: config.ao_map_intensity,
            use_map: config.ao_as_color_map,
            use_ao_map: true,
            patches: None,
            program: None,
            compile_count: 0,
        }
    }

    /// Injections applied when the program is compiled. Replacing them
    /// drops any compiled program.
    pub fn with_patches(mut self, patches: PatchSet) -> Self {
        self.patches = Some(patches);
        self.program = None;
        self
    }

    pub fn patches(&self) -> Option<&PatchSet> {
        self.patches.as_ref()
    }

    /// Compiled program; patches and expands on first call only.
    pub fn program(&mut self, library: &ShaderLibrary) -> Result<&ShaderProgram> {
        let program = match self.program.take() {
            Some(program) => program,
            None => {
                let mut source = ShaderLibrary::standard_source();
                if let Some(patches) = &self.patches {
                    patches.apply(&mut source)?;
                }
                let program = library.build(&source)?;
                self.compile_count += 1;
                log::debug!(
                    "compiled standard material ({}), {} + {} bytes of WGSL",
                    self.patches.as_ref().map_or("unpatched", |p| p.name()),
                    program.vertex.len(),
                    program.fragment.len()
                );
                program
            }
        };
        Ok(&*self.program.insert(program))
    }

    #[inline]
    pub fn compile_count(&self) -> u32 {
        self.compile_count
    }

    pub fn uniform(&self) -> MaterialUniform {
        let mut bits = 0;
        if self.use_map {
            bits |= flags::MAP;
        }
        if self.use_ao_map {
            bits |= flags::AO_MAP;
        }
        MaterialUniform {
            color: [self.color[0], self.color[1], self.color[2], 1.0],
            metalness: self.metalness,
            roughness: self.roughness,
            ao_map_intensity: self.ao_map_intensity,
            flags: bits,
        }
    }

    /// Group 1 layout in the shader (material group)
    pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let texture = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_bind_group_layout"),
            entries: &[
                // 0: Material uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 1: color map, 2: AO map
                texture(1),
                texture(2),
                // 3: sampler (shared)
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
    }

    /// Creates the uniform buffer and bind group. Missing maps bind `fallback`.
    pub fn create_gpu(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        map: Option<&Texture>,
        ao_map: Option<&Texture>,
        fallback: &Texture,
    ) -> MaterialGpu {
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("material_params"),
            contents: bytemuck::bytes_of(&self.uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let map = map.filter(|_| self.use_map).unwrap_or(fallback);
        let ao_map = ao_map.filter(|_| self.use_ao_map).unwrap_or(fallback);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&map.view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&ao_map.view) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&ao_map.sampler) },
            ],
        });

        MaterialGpu { params_buffer, bind_group }
    }

    /// Update material params quickly
    pub fn write_uniform(&self, queue: &wgpu::Queue, gpu: &MaterialGpu) {
        queue.write_buffer(&gpu.params_buffer, 0, bytemuck::bytes_of(&self.uniform()));
    }
}
