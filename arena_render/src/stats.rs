//! Backend counters for diagnostics overlays and logs

use std::fmt;

/// Snapshot returned by `Backend::stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Frames ended since init
    pub frames: u64,
    /// Draws recorded by the last ended frame
    pub draw_calls: u32,
    /// Draws dropped by the last ended frame because the geometry buffer overflowed
    pub skipped_draws: u32,
    /// Pipelines compiled since init, post-process pipelines excluded
    pub pipelines_compiled: u64,
    /// Geometry buffer bytes written by the last ended frame
    pub geometry_bytes: u64,
    /// Current capacity of one geometry region
    pub geometry_capacity: u64,
    /// Render-target rebuilds since init
    pub restarts: u32,
    pub geometry_regrows: u32,
    /// Texture memory chunks currently allocated
    pub image_chunks: usize,
    pub textures: usize,
}

impl fmt::Display for BackendStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {}: {} draws ({} skipped), {}/{} KiB geometry, {} pipelines, {} textures in {} chunks, {} restarts, {} regrows",
            self.frames,
            self.draw_calls,
            self.skipped_draws,
            self.geometry_bytes / 1024,
            self.geometry_capacity / 1024,
            self.pipelines_compiled,
            self.textures,
            self.image_chunks,
            self.restarts,
            self.geometry_regrows
        )
    }
}
