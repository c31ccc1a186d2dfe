//! Engine configuration
//!
//! Every section has sensible defaults so a partial TOML file (or none at all)
//! is a valid configuration.

use crate::error::{invalid_config, StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the streaming core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub volume: VolumeConfig,
    pub extraction: ExtractionConfig,
    pub streaming: StreamingConfig,
    pub world: WorldConfig,
}

impl EngineConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> StreamResult<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> StreamResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StreamError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("[EngineConfig::load] Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> StreamResult<()> {
        self.volume.validate()?;
        self.extraction.validate()?;
        self.streaming.validate()?;
        self.world.validate()
    }
}

/// Paged volume store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Side length of a chunk in voxels (power of two, 2..=256)
    pub chunk_side: u32,
    /// Maximum number of chunks kept resident in the cache
    pub max_resident_chunks: usize,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            chunk_side: 32,
            max_resident_chunks: 2048,
        }
    }
}

impl VolumeConfig {
    /// Smallest chunk budget a byte-based budget is allowed to produce
    pub const MIN_PRACTICAL_CHUNKS: usize = 32;

    /// Convert a memory budget in bytes into a resident chunk count
    pub fn chunk_budget_from_bytes(bytes: usize, chunk_side: u32) -> usize {
        let voxels = (chunk_side as usize).pow(3);
        let chunk_bytes = voxels * std::mem::size_of::<crate::world::Voxel>();
        (bytes / chunk_bytes.max(1)).max(Self::MIN_PRACTICAL_CHUNKS)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if !self.chunk_side.is_power_of_two() || !(2..=256).contains(&self.chunk_side) {
            return Err(StreamError::InvalidChunkSideLength {
                side: self.chunk_side,
            });
        }
        if self.max_resident_chunks == 0 {
            return Err(invalid_config("volume.max_resident_chunks", "must be at least 1"));
        }
        Ok(())
    }
}

/// Background mesh extraction settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Worker thread count, `None` sizes the pool to the available cores
    pub worker_threads: Option<usize>,
}

impl ExtractionConfig {
    pub fn thread_count(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.worker_threads == Some(0) {
            return Err(invalid_config("extraction.worker_threads", "must be at least 1"));
        }
        Ok(())
    }
}

/// Streaming render cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// View distance (voxels) right after spawning or teleporting
    pub initial_view_distance: f32,
    /// View distance (voxels) the ramp grows towards
    pub target_view_distance: f32,
    /// Extra distance before an entry is evicted, defaults to one chunk side
    pub culling_threshold: Option<f32>,
    /// Maximum completed meshes uploaded per frame
    pub max_meshes_per_frame: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            initial_view_distance: 1.0,
            target_view_distance: 128.0,
            culling_threshold: None,
            max_meshes_per_frame: 8,
        }
    }
}

impl StreamingConfig {
    pub fn culling_threshold(&self, chunk_side: u32) -> f32 {
        self.culling_threshold.unwrap_or(chunk_side as f32)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if !(self.initial_view_distance >= 0.0) {
            return Err(invalid_config(
                "streaming.initial_view_distance",
                "must be a non-negative number",
            ));
        }
        if !(self.target_view_distance >= self.initial_view_distance) {
            return Err(invalid_config(
                "streaming.target_view_distance",
                format!(
                    "{} is below the initial view distance {}",
                    self.target_view_distance, self.initial_view_distance
                ),
            ));
        }
        if matches!(self.culling_threshold, Some(t) if !(t >= 0.0)) {
            return Err(invalid_config(
                "streaming.culling_threshold",
                "must be a non-negative number",
            ));
        }
        if self.max_meshes_per_frame == 0 {
            return Err(invalid_config(
                "streaming.max_meshes_per_frame",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// World facade settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub seed: u64,
    /// `random_pos` samples x and z in `-random_extent..=random_extent`
    pub random_extent: i32,
    /// Height `random_pos` starts its floor search from
    pub random_start_height: i32,
    /// How far `find_walkable_floor` walks down from an open start voxel
    pub max_floor_search_depth: f32,
    /// Upward search distance used by `random_pos`
    pub max_walk_height: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            random_extent: 512,
            random_start_height: 128,
            max_floor_search_depth: 256.0,
            max_walk_height: 3.0,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.random_extent < 0 {
            return Err(invalid_config("world.random_extent", "must not be negative"));
        }
        if !(self.max_floor_search_depth >= 0.0) {
            return Err(invalid_config(
                "world.max_floor_search_depth",
                "must be a non-negative number",
            ));
        }
        if !(self.max_walk_height >= 0.0) {
            return Err(invalid_config(
                "world.max_walk_height",
                "must be a non-negative number",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.volume.chunk_side, 32);
        assert_eq!(config.streaming.culling_threshold(32), 32.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [volume]
            chunk_side = 16

            [streaming]
            max_meshes_per_frame = 4
            culling_threshold = 8.0
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.volume.chunk_side, 16);
        assert_eq!(config.volume.max_resident_chunks, 2048);
        assert_eq!(config.streaming.max_meshes_per_frame, 4);
        assert_eq!(config.streaming.culling_threshold(16), 8.0);
        assert_eq!(config.world, WorldConfig::default());
    }

    #[test]
    fn test_rejects_non_power_of_two_side() {
        let err = EngineConfig::from_toml_str("[volume]\nchunk_side = 24\n").unwrap_err();
        assert!(matches!(err, StreamError::InvalidChunkSideLength { side: 24 }));
    }

    #[test]
    fn test_rejects_target_below_initial() {
        let err = EngineConfig::from_toml_str(
            "[streaming]\ninitial_view_distance = 64.0\ntarget_view_distance = 32.0\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StreamError::InvalidConfig { field: "streaming.target_view_distance", .. }
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[world]\nseed = 42\nrandom_extent = 10").expect("write config");

        let config = EngineConfig::load(file.path()).expect("config should load");
        assert_eq!(config.world.seed, 42);
        assert_eq!(config.world.random_extent, 10);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, StreamError::ConfigRead { .. }));
    }

    #[test]
    fn test_chunk_budget_from_bytes_has_floor() {
        assert_eq!(VolumeConfig::chunk_budget_from_bytes(0, 32), 32);
        let per_chunk = 32usize.pow(3) * std::mem::size_of::<crate::world::Voxel>();
        assert_eq!(VolumeConfig::chunk_budget_from_bytes(per_chunk * 100, 32), 100);
    }
}
