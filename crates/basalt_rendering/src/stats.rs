//! Frame statistics for the culling core.

/// Counters updated once per frame by the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct CullingStats {
    /// Frames completed since context creation.
    pub frames: u64,
    /// Live regions this frame.
    pub live_regions: u32,
    /// Current arena capacity in regions.
    pub region_capacity: u32,
    /// Sections holding geometry, per pass.
    pub populated_sections: [u32; 3],
    /// Commands drawn last frame, per pass (readback, one frame late).
    pub visible_commands: [u32; 3],
    /// Largest single-draw index count observed this session.
    pub max_element_count: u32,
    /// Arena growth events since context creation.
    pub growth_events: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zeroed() {
        let stats = CullingStats::default();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.visible_commands, [0; 3]);
    }
}
