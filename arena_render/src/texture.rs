//! Texture arena
//!
//! Textures are addressed by `TextureId`, a slotmap key that stays valid
//! until the texture itself is released. Each texture owns its image, view,
//! a sub-allocation of an image memory chunk and one sampler descriptor set.
//!
//! Textures created between `begin_world` and `release_world` belong to the
//! world tier and are released together; the chunk pool is rewound to the
//! fill level it had when the world began.

use slotmap::{new_key_type, SlotMap};

use crate::config::TextureFilter;
use crate::descriptors::SamplerCache;
use crate::device::*;
use crate::error::{Error, Result};
use crate::memory::{ChunkAllocation, ChunkMark, ImageChunkPool};
use crate::transfer::{MipData, TransferContext, UploadTarget};
use crate::{engine_debug, engine_info};

new_key_type! {
    /// Stable handle of a texture in the arena
    pub struct TextureId;
}

/// Texture coordinate behaviour outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
}

/// What the image loader hands over when creating a texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// 1 disables mipmapping
    pub mip_levels: u32,
    pub wrap: WrapMode,
    /// `None` follows the configured world filter
    pub filter: Option<TextureFilter>,
}

impl TextureDesc {
    /// Single-level repeating texture
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self { name: name.into(), width, height, mip_levels: 1, wrap: WrapMode::Repeat, filter: None }
    }

    /// Use the complete mip chain down to 1x1
    pub fn mipmapped(mut self) -> Self {
        self.mip_levels = full_mip_count(self.width, self.height);
        self
    }

    pub fn clamped(mut self) -> Self {
        self.wrap = WrapMode::Clamp;
        self
    }
}

/// Levels of a complete mip chain
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

struct Texture {
    desc: TextureDesc,
    image: ImageHandle,
    view: ImageViewHandle,
    allocation: ChunkAllocation,
    set: DescriptorSetHandle,
    world: bool,
}

/// Arena-wide parameters fixed for the session
#[derive(Debug, Clone, Copy)]
pub struct TextureArenaDesc {
    pub chunk_size: u64,
    pub filter: TextureFilter,
    pub anisotropy: u32,
    pub sampler_layout: DescriptorSetLayoutHandle,
}

pub struct TextureArena {
    textures: SlotMap<TextureId, Texture>,
    chunks: ImageChunkPool,
    samplers: SamplerCache,
    pool: DescriptorPoolHandle,
    sampler_layout: DescriptorSetLayoutHandle,
    filter: TextureFilter,
    anisotropy: u32,
    world_mark: Option<ChunkMark>,
}

impl TextureArena {
    /// Upper bound on live textures (size of the descriptor pool)
    pub const MAX_TEXTURES: u32 = 4096;

    pub const FORMAT: Format = Format::R8G8B8A8_UNORM;

    pub fn new(device: &mut dyn GpuDevice, desc: &TextureArenaDesc) -> Result<Self> {
        let pool = device.create_descriptor_pool(&DescriptorPoolDesc {
            max_sets: Self::MAX_TEXTURES,
            uniform_dynamic: 0,
            storage_dynamic: 0,
            image_samplers: Self::MAX_TEXTURES,
        })?;
        Ok(Self {
            textures: SlotMap::with_key(),
            chunks: ImageChunkPool::new(desc.chunk_size, ImageChunkPool::MAX_CHUNKS),
            samplers: SamplerCache::new(),
            pool,
            sampler_layout: desc.sampler_layout,
            filter: desc.filter,
            anisotropy: desc.anisotropy,
            world_mark: None,
        })
    }

    pub(crate) fn empty() -> Self {
        Self {
            textures: SlotMap::with_key(),
            chunks: ImageChunkPool::new(0, 0),
            samplers: SamplerCache::new(),
            pool: DescriptorPoolHandle::NULL,
            sampler_layout: DescriptorSetLayoutHandle::NULL,
            filter: TextureFilter::GL_LINEAR,
            anisotropy: 0,
            world_mark: None,
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.chunk_count()
    }

    pub fn contains(&self, id: TextureId) -> bool {
        self.textures.contains_key(id)
    }

    pub fn desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(id).map(|t| &t.desc)
    }

    /// Chunk index and byte offset of the texture's memory
    pub fn placement(&self, id: TextureId) -> Option<(usize, u64)> {
        self.textures.get(id).map(|t| (t.allocation.chunk, t.allocation.offset))
    }

    /// Descriptor set that samples texture `id`
    pub fn descriptor(&self, id: TextureId) -> Result<DescriptorSetHandle> {
        self.get(id).map(|t| t.set)
    }

    fn get(&self, id: TextureId) -> Result<&Texture> {
        self.textures
            .get(id)
            .ok_or_else(|| Error::InvalidResource("stale texture id".to_string()))
    }

    fn sampler_desc(&self, desc: &TextureDesc) -> SamplerDesc {
        let filter = desc.filter.unwrap_or(self.filter);
        let mipmapped = desc.mip_levels > 1 && filter.uses_mipmaps();
        let filtering = if filter.linear_mag() { Filter::Linear } else { Filter::Nearest };
        SamplerDesc {
            mag_filter: filtering,
            min_filter: filtering,
            mipmap_filter: if filter.linear_mipmap() { Filter::Linear } else { Filter::Nearest },
            address_mode: match desc.wrap {
                WrapMode::Repeat => AddressMode::Repeat,
                WrapMode::Clamp => AddressMode::ClampToEdge,
            },
            max_anisotropy: if mipmapped { self.anisotropy } else { 0 },
            max_lod: if mipmapped { desc.mip_levels } else { 0 },
        }
    }

    /// Create an image with uninitialized contents
    pub fn create(&mut self, device: &mut dyn GpuDevice, desc: TextureDesc) -> Result<TextureId> {
        let max_dimension = device.capabilities().limits.max_image_dimension_2d;
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource(format!("texture '{}' has no pixels", desc.name)));
        }
        if desc.width > max_dimension || desc.height > max_dimension {
            return Err(Error::InvalidResource(format!(
                "texture '{}' is {}x{}, the device limit is {}",
                desc.name, desc.width, desc.height, max_dimension
            )));
        }
        if desc.mip_levels == 0 || desc.mip_levels > full_mip_count(desc.width, desc.height) {
            return Err(Error::InvalidResource(format!(
                "texture '{}' cannot have {} mip levels",
                desc.name, desc.mip_levels
            )));
        }

        let image_desc = ImageDesc {
            name: desc.name.clone(),
            width: desc.width,
            height: desc.height,
            mip_levels: desc.mip_levels,
            format: Self::FORMAT,
            samples: SampleCount::S1,
            usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
        };
        let (image, requirements) = device.create_image(&image_desc)?;
        let allocation = match self.chunks.bind_image(device, image, &requirements, MemoryProperties::DEVICE_LOCAL) {
            Ok(allocation) => allocation,
            Err(err) => {
                device.destroy_image(image);
                return Err(err);
            }
        };
        let view = match device.create_image_view(image, &image_desc) {
            Ok(view) => view,
            Err(err) => {
                device.destroy_image(image);
                return Err(err);
            }
        };
        let set = match self.create_set(device, &desc, view) {
            Ok(set) => set,
            Err(err) => {
                device.destroy_image_view(view);
                device.destroy_image(image);
                return Err(err);
            }
        };

        let world = self.world_mark.is_some();
        engine_debug!(
            "arena::texture",
            "Created texture '{}' {}x{} ({} mips, chunk #{}{})",
            desc.name,
            desc.width,
            desc.height,
            desc.mip_levels,
            allocation.chunk,
            if world { ", world" } else { "" }
        );
        Ok(self.textures.insert(Texture { desc, image, view, allocation, set, world }))
    }

    fn create_set(&mut self, device: &mut dyn GpuDevice, desc: &TextureDesc, view: ImageViewHandle) -> Result<DescriptorSetHandle> {
        let sampler = self.samplers.get_or_create(device, &self.sampler_desc(desc))?;
        let set = device.allocate_descriptor_set(self.pool, self.sampler_layout)?;
        if let Err(err) = device.write_image_descriptor(set, view, sampler) {
            device.free_descriptor_set(self.pool, set);
            return Err(err);
        }
        Ok(set)
    }

    /// Upload pixel data. With `offset` a single level-0 sub-rectangle is
    /// replaced; without it `mips` covers the image from level 0.
    pub fn upload(
        &mut self,
        device: &mut dyn GpuDevice,
        transfer: &mut TransferContext,
        id: TextureId,
        mips: &[MipData<'_>],
        offset: Option<(i32, i32)>,
    ) -> Result<()> {
        let texture = self.get(id)?;
        let desc = &texture.desc;
        let Some(first) = mips.first() else {
            return Err(Error::InvalidResource(format!("empty upload to '{}'", desc.name)));
        };
        match offset {
            Some((x, y)) => {
                let inside = x >= 0
                    && y >= 0
                    && x as u64 + first.width as u64 <= desc.width as u64
                    && y as u64 + first.height as u64 <= desc.height as u64;
                if mips.len() != 1 || !inside {
                    return Err(Error::InvalidResource(format!(
                        "sub-image {}x{} at ({}, {}) does not fit '{}'",
                        first.width, first.height, x, y, desc.name
                    )));
                }
            }
            None => {
                if first.width != desc.width || first.height != desc.height || mips.len() as u32 > desc.mip_levels {
                    return Err(Error::InvalidResource(format!(
                        "upload of {} levels at {}x{} does not match '{}'",
                        mips.len(),
                        first.width,
                        first.height,
                        desc.name
                    )));
                }
            }
        }
        let target = UploadTarget {
            image: texture.image,
            format: Self::FORMAT,
            mip_levels: desc.mip_levels,
            offset,
        };
        transfer.upload_image(device, &target, mips)
    }

    /// Destroy one texture; its chunk space is reclaimed only by a world rewind
    pub fn release(&mut self, device: &mut dyn GpuDevice, id: TextureId) -> Result<()> {
        let texture = self
            .textures
            .remove(id)
            .ok_or_else(|| Error::InvalidResource("stale texture id".to_string()))?;
        self.destroy_texture(device, texture);
        Ok(())
    }

    fn destroy_texture(&mut self, device: &mut dyn GpuDevice, texture: Texture) {
        device.free_descriptor_set(self.pool, texture.set);
        device.destroy_image_view(texture.view);
        device.destroy_image(texture.image);
    }

    /// Textures created from now on belong to the world tier
    pub fn begin_world(&mut self) {
        if self.world_mark.is_none() {
            self.world_mark = Some(self.chunks.mark());
        }
    }

    /// Destroy world textures and rewind the chunk pool. The device must be idle.
    pub fn release_world(&mut self, device: &mut dyn GpuDevice) {
        let Some(mark) = self.world_mark.take() else {
            return;
        };
        let world: Vec<TextureId> = self.textures.iter().filter(|(_, t)| t.world).map(|(id, _)| id).collect();
        let count = world.len();
        for id in world {
            if let Some(texture) = self.textures.remove(id) {
                self.destroy_texture(device, texture);
            }
        }
        self.chunks.release_to(device, &mark);
        engine_info!("arena::texture", "Released {} world textures, {} left", count, self.textures.len());
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for (_, texture) in self.textures.drain() {
            device.destroy_image_view(texture.view);
            device.destroy_image(texture.image);
        }
        if !self.pool.is_null() {
            device.destroy_descriptor_pool(self.pool);
            self.pool = DescriptorPoolHandle::NULL;
        }
        self.samplers.destroy(device);
        self.chunks.destroy(device);
        self.world_mark = None;
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
