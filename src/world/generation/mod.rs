//! Procedural chunk sources

mod terrain;

pub use terrain::{NoisePager, TerrainGenerator, TerrainSettings};
