//! Per-draw data produced by the scene layer
//!
//! Lighting and transform math happens upstream; the backend only uploads
//! the resulting blocks and maps depth ranges onto the viewport.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::device::{Rect2D, Viewport};

/// Bytes visible through the uniform descriptor at one dynamic offset
pub const UNIFORM_RANGE: u64 = 256;

/// Plain data that can be pushed as a uniform block
pub trait UniformBlock: Pod {}

/// Uniforms of one entity, shared by all its draws in a frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct EntityUniforms {
    /// View origin in entity space
    pub eye_pos: Vec4,
    /// Dynamic light origin (xyz) and radius (w)
    pub light_pos: Vec4,
    /// Dynamic light color (rgb) and 1 / radius^2 (w)
    pub light_color: Vec4,
    pub fog_distance: Vec4,
    pub fog_depth: Vec4,
    /// Eye position along the fog depth vector (x)
    pub fog_eye_t: Vec4,
    pub fog_color: Vec4,
    pub ambient_light: Vec4,
    pub directed_light: Vec4,
    pub light_dir: Vec4,
    pub model_matrix: Mat4,
}

impl UniformBlock for EntityUniforms {}

/// Depth interval a draw is squeezed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthRange {
    #[default]
    Normal,
    /// Always in front (console, 2D)
    ForceZero,
    /// Always behind (sky)
    ForceOne,
    /// First-person weapon, kept in front of the world
    WeaponHack,
}

impl DepthRange {
    pub fn bounds(self) -> (f32, f32) {
        match self {
            DepthRange::Normal => (0.0, 1.0),
            DepthRange::ForceZero => (0.0, 0.0),
            DepthRange::ForceOne => (1.0, 1.0),
            DepthRange::WeaponHack => (0.0, 0.3),
        }
    }

    pub fn viewport(self, rect: Rect2D) -> Viewport {
        let (min_depth, max_depth) = self.bounds();
        Viewport {
            x: rect.x as f32,
            y: rect.y as f32,
            width: rect.width as f32,
            height: rect.height as f32,
            min_depth,
            max_depth,
        }
    }
}

/// Push constant bytes of a model-view-projection matrix
pub fn mvp_bytes(mvp: &Mat4) -> Vec<u8> {
    bytemuck::bytes_of(mvp).to_vec()
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
