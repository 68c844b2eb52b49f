//! Unit tests for scene.rs

use glam::{Mat4, Vec3};

use crate::device::Rect2D;
use crate::scene::*;

#[test]
fn test_entity_uniforms_fit_the_uniform_range() {
    assert!(std::mem::size_of::<EntityUniforms>() as u64 <= UNIFORM_RANGE);
    assert_eq!(std::mem::size_of::<EntityUniforms>() % 16, 0);
}

#[test]
fn test_depth_range_bounds() {
    assert_eq!(DepthRange::Normal.bounds(), (0.0, 1.0));
    assert_eq!(DepthRange::ForceOne.bounds(), (1.0, 1.0));
    assert_eq!(DepthRange::WeaponHack.bounds(), (0.0, 0.3));
}

#[test]
fn test_viewport_from_rect() {
    let viewport = DepthRange::ForceZero.viewport(Rect2D { x: 10, y: 20, width: 300, height: 200 });
    assert_eq!((viewport.x, viewport.y, viewport.width, viewport.height), (10.0, 20.0, 300.0, 200.0));
    assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 0.0));
}

#[test]
fn test_mvp_bytes_column_major() {
    let mvp = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    let bytes = mvp_bytes(&mvp);
    assert_eq!(bytes.len(), 64);
    let x = f32::from_le_bytes([bytes[48], bytes[49], bytes[50], bytes[51]]);
    assert_eq!(x, 1.0);
}
