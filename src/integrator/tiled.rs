use crate::color::Rgba;
use crate::error::RenderError;
use crate::film::{Film, FilmTile};
use crate::geometry::Bounds2i;
use crate::integrator::{SurfaceIntegrator, VolumeIntegrator};
use crate::output::{Layer, OutputSink};
use crate::params::{RenderParams, TileOrder};
use crate::sampler::{mix_seed, LowDiscrepancySampler, Sampler};
use crate::scene::Scene;
use crate::state::RenderState;
use crate::{Float, Point2i};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{info, info_span, warn};

const VIEW_NAME: &str = "main";

#[derive(Debug, Default)]
pub struct RenderStats {
    pub samples: u64,
    pub nan_samples: usize,
    pub passes_run: usize,
    /// Pixels flagged for resampling at the start of each adaptive pass.
    pub flagged_per_pass: Vec<usize>,
}

/// Pass/tile scheduler tying the whole core together: splits the image into
/// tiles, fans them out over rayon workers, runs adaptive passes and feeds
/// the output sink. Returns `Cancelled` when the flag is raised; tiles
/// already in flight complete and are flushed first.
pub struct TiledDriver {
    surface: Box<dyn SurfaceIntegrator>,
    volume: Option<Box<dyn VolumeIntegrator>>,
    params: RenderParams,
}

impl TiledDriver {
    pub fn new(surface: Box<dyn SurfaceIntegrator>, params: RenderParams) -> Self {
        Self { surface, volume: None, params }
    }

    pub fn with_volume(mut self, volume: Box<dyn VolumeIntegrator>) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub fn render(
        &mut self,
        scene: &Scene,
        film: &Film,
        sink: &mut dyn OutputSink,
        cancel: &AtomicBool,
    ) -> Result<RenderStats, RenderError> {
        let span = info_span!("render");
        let _guard = span.enter();

        self.surface.preprocess(scene, &self.params)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.threads)
            .build()
            .map_err(|e| RenderError::ResourceExhausted(e.to_string()))?;

        sink.notify_view(VIEW_NAME);
        sink.notify_layer(Layer::Combined);
        let sink = Mutex::new(sink);

        let mut stats = RenderStats::default();
        let samples_done = AtomicU64::new(0);

        let mut tiles: Vec<(usize, Bounds2i)> = film
            .sample_bounds()
            .iter_tiles(self.params.tile_size)
            .enumerate()
            .collect();
        if self.params.tile_order == TileOrder::Random {
            // deterministic shuffle keyed only by the tile count
            use rand::seq::SliceRandom;
            use rand::SeedableRng;
            let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(tiles.len() as u64);
            tiles.shuffle(&mut rng);
        }

        info!(
            tiles = tiles.len(),
            passes = self.params.aa_passes,
            samples = self.params.aa_samples,
            "starting tiled render"
        );

        for pass in 0..self.params.aa_passes {
            let adaptive = pass > 0;
            if adaptive {
                let flagged = film.next_pass(self.params.aa_threshold);
                stats.flagged_per_pass.push(flagged);
                if flagged == 0 {
                    break;
                }
            }

            let samples_this_pass = if pass == 0 {
                self.params.aa_samples
            } else {
                self.params.aa_inc_samples
            };
            let sample_base = if pass == 0 {
                0
            } else {
                self.params.aa_samples + (pass as u64 - 1) * self.params.aa_inc_samples
            };

            let progress = indicatif::ProgressBar::new(tiles.len() as u64);
            progress.set_draw_delta(7);

            let results: Vec<Option<(usize, FilmTile)>> = pool.install(|| {
                tiles
                    .par_iter()
                    .map(|&(tile_id, tile)| {
                        // poll before dequeuing; in-flight tiles finish
                        if cancel.load(Ordering::Relaxed) {
                            return None;
                        }
                        let film_tile = self.render_tile(
                            scene,
                            film,
                            tile,
                            pass,
                            samples_this_pass,
                            sample_base,
                            adaptive,
                            &samples_done,
                        );
                        progress.inc(1);
                        Some((tile_id, film_tile))
                    })
                    .collect()
            });
            progress.finish_and_clear();

            // merge in tile order so float accumulation is reproducible
            let mut merged: Vec<(usize, FilmTile)> = results.into_iter().flatten().collect();
            let was_cancelled = merged.len() < tiles.len();
            merged.sort_by_key(|(id, _)| *id);

            let mut sink_guard = sink.lock();
            for (_, film_tile) in merged {
                let bounds = film_tile.pixel_bounds();
                film.merge_film_tile(film_tile);
                for (x, y) in bounds.iter_points() {
                    let px = film.pixel(Point2i::new(x, y)).rgba();
                    sink_guard.put_pixel(VIEW_NAME, x, y, Layer::Combined, px);
                }
                sink_guard.flush_area(VIEW_NAME, bounds);
            }
            stats.passes_run += 1;

            if was_cancelled {
                sink_guard.flush(VIEW_NAME);
                warn!("render cancelled after {} passes", stats.passes_run);
                return Err(RenderError::Cancelled);
            }
        }

        stats.samples = samples_done.load(Ordering::Relaxed);
        stats.nan_samples = film.nan_samples();
        if stats.nan_samples > 0 {
            warn!(dropped = stats.nan_samples, "non-finite samples were dropped");
        }

        sink.lock().flush(VIEW_NAME);
        info!(samples = stats.samples, passes = stats.passes_run, "render finished");
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_tile(
        &self,
        scene: &Scene,
        film: &Film,
        tile: Bounds2i,
        pass: usize,
        n_samples: u64,
        sample_base: u64,
        adaptive: bool,
        samples_done: &AtomicU64,
    ) -> FilmTile {
        let mut film_tile = film.get_film_tile(tile);
        let flags = if adaptive {
            Some(film.resample_flags(tile))
        } else {
            None
        };

        // the sampler scramble must not depend on tile or pass: pixels keep
        // one low-discrepancy sequence across passes (continued via
        // `sample_base`), which also makes tiles independent of their shape
        let mut sampler = LowDiscrepancySampler::new(n_samples, 0x9E37_79B9);
        sampler.set_sample_base(sample_base);
        let mut state = RenderState::new(0);
        state.pass = pass;

        let width = film.full_resolution.x as i64;
        let inv_sqrt_spp = 1.0 / (n_samples.max(1) as Float).sqrt();
        let mut tile_samples = 0u64;

        for (idx, (x, y)) in tile.iter_points().enumerate() {
            if let Some(flags) = &flags {
                if !flags[idx] {
                    continue;
                }
            }

            let pixel = Point2i::new(x, y);
            let pixel_id = (y as i64 * width + x as i64) as u64;
            state.pixel_number = pixel_id;
            sampler.start_pixel(pixel, pixel_id);

            let mut sample_index = 0u64;
            while sampler.start_next_sample() {
                state.pixel_sample = sample_base + sample_index;
                state.sampling_offs = sample_base;
                state.ray_level = 0;
                state.reseed(mix_seed(
                    pixel_id
                        .wrapping_mul(0x0100_0000_01b3)
                        .wrapping_add(state.pixel_sample),
                ));
                sample_index += 1;

                let camera_sample = sampler.get_camera_sample(pixel);
                let (weight, mut ray) = scene.camera.generate_ray_differential(camera_sample);
                ray.scale_differentials(inv_sqrt_spp);

                let mut color = Rgba::default();
                if weight > 0.0 {
                    color = self.surface.integrate(&mut state, &mut ray, scene);

                    if let Some(volume) = &self.volume {
                        let tr = volume.transmittance(&mut state, scene, &ray.ray);
                        let inscatter = volume.integrate(&mut state, scene, &ray.ray);
                        color = color * tr;
                        color.r += inscatter.r;
                        color.g += inscatter.g;
                        color.b += inscatter.b;
                    }
                }

                film.add_sample_to_tile(&mut film_tile, camera_sample.p_film, color, weight);
                tile_samples += 1;
            }
        }

        samples_done.fetch_add(tile_samples, Ordering::Relaxed);
        film_tile
    }
}
