//! Unit tests for reflect.rs

use super::*;
use arena_render::pipeline::shaders::SPIRV_MAGIC;

fn header_only() -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

#[test]
fn test_decode_header_only_module() {
    let words = decode_spirv("stub", &header_only()).unwrap();
    assert_eq!(words.len(), 5);
    assert_eq!(words[0], SPIRV_MAGIC);
}

#[test]
fn test_decode_rejects_misaligned_length() {
    let mut blob = header_only();
    blob.push(0);
    assert!(matches!(decode_spirv("odd", &blob), Err(Error::InvalidResource(_))));
}

#[test]
fn test_decode_rejects_bad_magic() {
    let mut blob = header_only();
    blob[0] = 0xFF;
    assert!(matches!(decode_spirv("magic", &blob), Err(Error::InvalidResource(_))));
}

#[test]
fn test_decode_rejects_truncated_header() {
    assert!(decode_spirv("short", &SPIRV_MAGIC.to_le_bytes()).is_err());
}

#[test]
fn test_module_without_entry_point_is_rejected() {
    let words = decode_spirv("stub", &header_only()).unwrap();
    assert!(reflect_shader("stub", &words).is_err());
}
