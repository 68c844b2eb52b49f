//! Device memory allocators: image chunks, per-slot geometry buffer, staging

pub mod image_chunks;
pub mod geometry_buffer;
pub mod staging;

pub use image_chunks::*;
pub use geometry_buffer::*;
pub use staging::*;

/// Round `value` up to a multiple of `alignment` (a power of two, or 0/1)
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        (value + alignment - 1) & !(alignment - 1)
    }
}
