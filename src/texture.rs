// src/texture.rs
// GPU textures for the bar material: decoded images (AO map, mask, reveal),
// the 1×1 fallback bound to unused slots, and the render attachments.
//
// Every image here is data, not color: texels are uploaded as Rgba8Unorm and
// sampled without sRGB conversion.

use image::RgbaImage;

use crate::{ensure, Result};

pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    pub const DATA_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Uploads a decoded image. Sampling clamps to the edge with linear
    /// filtering.
    pub fn from_image(device: &wgpu::Device, queue: &wgpu::Queue, img: &RgbaImage, label: &str) -> Result<Self> {
        Self::upload(device, queue, img.as_raw(), img.width(), img.height(), label)
    }

    /// Opaque white; multiplying by it or sampling it as a mask is a no-op.
    pub fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Self> {
        Self::upload(device, queue, &[255; 4], 1, 1, "white_1x1")
    }

    fn upload(device: &wgpu::Device, queue: &wgpu::Queue, rgba: &[u8], width: u32, height: u32, label: &str) -> Result<Self> {
        let layout = upload_layout(width, height, rgba.len())?;
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DATA_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(texture.as_image_copy(), &rgba[..(width * height * 4) as usize], layout, size);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        log::debug!("uploaded texture {label} ({width}x{height})");
        Ok(Self { texture, view, sampler })
    }

    /// Depth attachment for a surface of the given size. `sample_count` must
    /// match the color target it is paired with.
    pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32, sample_count: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor { label: Some(label), ..Default::default() });
        Self { texture, view, sampler }
    }
}

/// Multisampled color target that resolves into the swapchain view.
pub fn create_msaa_view(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    sample_count: u32,
) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa_color"),
            size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// Largest of `wanted` and the lower power-of-two counts that every format
/// supports, down to 1.
pub fn supported_sample_count(wanted: u32, formats: &[wgpu::TextureFormatFeatureFlags]) -> u32 {
    let mut count = wanted.max(1).next_power_of_two();
    while count > 1 && !formats.iter().all(|f| f.sample_count_supported(count)) {
        count /= 2;
    }
    count
}

/// Row layout of a tightly packed RGBA8 upload. Rejects empty images and
/// buffers shorter than `width * height * 4`.
pub fn upload_layout(width: u32, height: u32, len: usize) -> Result<wgpu::ImageDataLayout> {
    ensure!(width > 0 && height > 0, "texture has zero size ({}x{})", width, height);
    let expected = width as usize * height as usize * 4;
    ensure!(len >= expected, "RGBA data too short: expected {} bytes, got {}", expected, len);
    Ok(wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) })
}
