//! Backend configuration
//!
//! Options are read once at `Backend::init` and again on
//! `Backend::reinitialize`. The values come from the embedding application's
//! own config layer; the backend never writes them back.

use crate::device::SampleCount;

/// Present mode / vsync preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Pick the lowest latency mode the surface offers:
    /// immediate, then mailbox, then fifo-relaxed, then fifo
    Auto,
    /// Explicit swap interval request. Any nonzero interval forces fifo.
    VsyncInterval(u32),
}

/// Texture minification/magnification mode, named after the classic GL modes
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    GL_NEAREST,
    GL_LINEAR,
    GL_NEAREST_MIPMAP_NEAREST,
    GL_LINEAR_MIPMAP_NEAREST,
    GL_NEAREST_MIPMAP_LINEAR,
    GL_LINEAR_MIPMAP_LINEAR,
}

impl TextureFilter {
    /// Parse a mode name (case-insensitive). Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let filter = match upper.as_str() {
            "GL_NEAREST" => TextureFilter::GL_NEAREST,
            "GL_LINEAR" => TextureFilter::GL_LINEAR,
            "GL_NEAREST_MIPMAP_NEAREST" => TextureFilter::GL_NEAREST_MIPMAP_NEAREST,
            "GL_LINEAR_MIPMAP_NEAREST" => TextureFilter::GL_LINEAR_MIPMAP_NEAREST,
            "GL_NEAREST_MIPMAP_LINEAR" => TextureFilter::GL_NEAREST_MIPMAP_LINEAR,
            "GL_LINEAR_MIPMAP_LINEAR" => TextureFilter::GL_LINEAR_MIPMAP_LINEAR,
            _ => return None,
        };
        Some(filter)
    }

    /// Magnification uses linear filtering
    pub fn linear_mag(self) -> bool {
        !matches!(
            self,
            TextureFilter::GL_NEAREST
                | TextureFilter::GL_NEAREST_MIPMAP_NEAREST
                | TextureFilter::GL_NEAREST_MIPMAP_LINEAR
        )
    }

    /// Mip levels are sampled at all
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, TextureFilter::GL_NEAREST | TextureFilter::GL_LINEAR)
    }

    /// Mip levels are blended (trilinear)
    pub fn linear_mipmap(self) -> bool {
        matches!(
            self,
            TextureFilter::GL_NEAREST_MIPMAP_LINEAR | TextureFilter::GL_LINEAR_MIPMAP_LINEAR
        )
    }
}

/// Backend configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Requested MSAA sample count (1 = off). Clamped to device support.
    pub msaa_samples: u32,
    /// Enable the bloom post-process chain
    pub bloom: bool,
    /// Luminance threshold for the bloom extract pass
    pub bloom_threshold: f32,
    /// Present mode / vsync preference
    pub present_mode: PresentModePreference,
    /// Scene render size relative to the window size
    pub render_scale: f32,
    /// Texture filtering mode for world textures
    pub texture_filter: TextureFilter,
    /// Anisotropic filtering level (0 = off)
    pub anisotropy: u32,
    /// Explicit physical device index (None = prefer a discrete GPU)
    pub device_index: Option<usize>,
    /// 16-bit float color attachments
    pub hdr: bool,
    /// Initial geometry buffer capacity per frame slot (bytes)
    pub geometry_buffer_size: u64,
    /// Size of one image memory chunk (bytes)
    pub image_chunk_size: u64,
    /// Display gamma applied by the final pass
    pub gamma: f32,
    /// Overbright shift applied by the final pass
    pub overbright_bits: u32,
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            msaa_samples: 1,
            bloom: false,
            bloom_threshold: 0.6,
            present_mode: PresentModePreference::Auto,
            render_scale: 1.0,
            texture_filter: TextureFilter::GL_LINEAR_MIPMAP_LINEAR,
            anisotropy: 0,
            device_index: None,
            hdr: false,
            geometry_buffer_size: 4 * 1024 * 1024,
            image_chunk_size: 64 * 1024 * 1024,
            gamma: 1.0,
            overbright_bits: 1,
            enable_validation: cfg!(debug_assertions),
            app_name: "Arena Application".to_string(),
        }
    }
}

impl Config {
    pub const MIN_RENDER_SCALE: f32 = 0.25;
    pub const MAX_RENDER_SCALE: f32 = 4.0;

    /// Copy with every option clamped into its legal range
    pub fn sanitized(&self) -> Config {
        let mut config = self.clone();
        config.render_scale = if config.render_scale.is_finite() {
            config.render_scale.clamp(Self::MIN_RENDER_SCALE, Self::MAX_RENDER_SCALE)
        } else {
            1.0
        };
        config.msaa_samples = SampleCount::from_requested(config.msaa_samples).count();
        config.anisotropy = config.anisotropy.min(16);
        config.overbright_bits = config.overbright_bits.min(2);
        config.gamma = if config.gamma > 0.0 { config.gamma.clamp(0.5, 3.0) } else { 1.0 };
        config.bloom_threshold = config.bloom_threshold.clamp(0.0, 1.0);
        config.geometry_buffer_size = config.geometry_buffer_size.max(64 * 1024);
        config.image_chunk_size = config.image_chunk_size.max(1024 * 1024);
        config
    }

    /// Render size for a given window size
    pub fn render_extent(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |v: u32| (((v as f32) * self.render_scale).round() as u32).max(1);
        (scale(width), scale(height))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
