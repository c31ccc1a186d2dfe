//! Headless streaming demo
//!
//! Flies a viewer across procedurally generated terrain, streams meshes
//! through a headless backend and logs what the cache is doing.
//!
//! Usage: `voxel-streamer [config.toml]`

use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use std::sync::Arc;
use std::time::{Duration, Instant};
use voxel_streamer::renderer::{HeadlessBackend, StreamingRenderCache, Viewer};
use voxel_streamer::{init_logging, EngineConfig, MemoryPager, NoisePager, PagedVolume, SystemClock, WorldFacade};

const FRAMES: u32 = 900;
const FRAME_TIME: Duration = Duration::from_millis(16);
const FLIGHT_SPEED: f32 = 12.0;

fn main() -> Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("Failed to load config {}", path))?,
        None => EngineConfig::default(),
    };
    config.validate().context("Invalid configuration")?;

    let side = config.volume.chunk_side;
    let generator = Arc::new(NoisePager::new(config.world.seed, side));
    let pager = Arc::new(MemoryPager::with_fallback(side, generator));
    let volume = Arc::new(PagedVolume::new(pager, &config.volume).context("Failed to create paged volume")?);
    let world = WorldFacade::new(Arc::clone(&volume), config.world.clone());

    let spawn = match world.random_pos() {
        Some(floor) => floor.as_vec3() + Vec3::new(0.5, 24.0, 0.5),
        None => Vec3::new(0.0, 96.0, 0.0),
    };
    log::info!("Spawning viewer at {}", spawn);

    let mut cache = StreamingRenderCache::new(
        Arc::clone(&volume),
        HeadlessBackend::new(),
        Box::new(SystemClock::new()),
        config.streaming.clone(),
        &config.extraction,
    )
    .context("Failed to create streaming cache")?;

    let projection = Mat4::perspective_rh(70f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
    let mut failed_uploads = 0;

    for frame in 0..FRAMES {
        let frame_start = Instant::now();
        let t = frame as f32 * FRAME_TIME.as_secs_f32();

        let position = spawn + Vec3::new(t * FLIGHT_SPEED, 0.0, (t * 0.3).sin() * 32.0);
        let forward = Vec3::new(1.0, -0.3, (t * 0.3).cos() * 0.3).normalize();
        let view = Mat4::look_at_rh(position, position + forward, Vec3::Y);
        let viewer = Viewer::from_view_projection(position, &(projection * view));

        cache.backend_mut().begin_frame();
        let report = cache.update(&viewer);
        let render = cache.render(&viewer);
        failed_uploads += report.failures.len();

        if frame % 60 == 0 {
            let stats = cache.stats();
            log::info!(
                "Frame {}: view distance {:.1}, {} resident, {} pending, {} queued, {} drawn, {} frustum culled, {} evicted",
                frame,
                report.view_distance,
                stats.resident_chunks,
                stats.pending_jobs,
                stats.queued_meshes,
                render.visible_chunks,
                render.frustum_culled,
                render.evicted
            );

            match world.raycast_solid(position, forward, 128.0) {
                Some(hit) => log::info!("Looking at {:?} at {} ({:.1} voxels)", hit.voxel.material(), hit.position, hit.distance),
                None => log::info!("Looking at the sky"),
            }
        }

        if let Some(remaining) = FRAME_TIME.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    let cache_stats = cache.stats();
    let volume_stats = volume.stats();
    println!("Streaming summary");
    println!("  resident chunk meshes: {}", cache_stats.resident_chunks);
    println!("  live GPU buffers:      {}", cache.backend().live_buffers());
    println!("  GPU memory:            {} KiB", cache.backend().used_bytes() / 1024);
    println!("  failed uploads:        {}", failed_uploads);
    println!("  resident voxel chunks: {}", volume_stats.resident_chunks);
    println!("  cache hits / misses:   {} / {}", volume_stats.hits, volume_stats.misses);
    println!("  evictions:             {}", volume_stats.evictions);

    cache.reset();
    let flushed = world.reset();
    log::info!("Flushed {} chunks at shutdown", flushed);

    Ok(())
}
