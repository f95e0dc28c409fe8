use crate::color::{Rgb, Rgba};
use crate::filter::PixelFilter;
use crate::geometry::{Bounds2f, Bounds2i};
use crate::{Float, Point2f, Point2i};
use image::ImageBuffer;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicUsize, Ordering};

const FILTER_TABLE_WIDTH: usize = 16;

/// Accumulated state of one image pixel. The reconstructed colour is
/// `sum / weight_sum`; `count`/`mean`/`m2` run Welford's recurrence over
/// sample luminance for the adaptive sampling decision.
#[derive(Default, Debug, PartialEq, Clone, Copy)]
pub struct Pixel {
    pub sum: [Float; 4],
    pub weight_sum: Float,
    pub count: u32,
    mean: Float,
    m2: Float,
    pub resample: bool,
}

impl Pixel {
    /// Unbiased variance of the sample luminance mean.
    pub fn variance_of_mean(&self) -> Float {
        if self.count < 2 {
            return std::f32::INFINITY;
        }
        let n = self.count as Float;
        self.m2 / ((n - 1.0) * n)
    }

    pub fn rgba(&self) -> Rgba {
        if self.weight_sum != 0.0 {
            let inv = 1.0 / self.weight_sum;
            Rgba::new(
                (self.sum[0] * inv).max(0.0),
                (self.sum[1] * inv).max(0.0),
                (self.sum[2] * inv).max(0.0),
                (self.sum[3] * inv).max(0.0).min(1.0),
            )
        } else {
            Rgba::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TilePixel {
    sum: [Float; 4],
    weight_sum: Float,
    count: u32,
    mean: Float,
    m2: Float,
}

/// Private working copy of a tile rectangle; owned by exactly one worker
/// until it is merged back.
#[derive(Debug)]
pub struct FilmTile {
    pixel_bounds: Bounds2i,
    filter_radius: Point2f,
    inv_filter_radius: Point2f,
    pixels: Vec<TilePixel>,
}

impl FilmTile {
    fn pixel_idx(&self, p: Point2i) -> usize {
        let width = self.pixel_bounds.max.x - self.pixel_bounds.min.x;
        ((p.y - self.pixel_bounds.min.y) * width + (p.x - self.pixel_bounds.min.x)) as usize
    }

    pub fn pixel_bounds(&self) -> Bounds2i {
        self.pixel_bounds
    }
}

#[derive(Debug)]
pub struct Film {
    pub full_resolution: Point2i,
    pub pixel_bounds: Bounds2i,
    pub filter: PixelFilter,
    pixels: Mutex<Vec<Pixel>>,
    filter_table: [[Float; FILTER_TABLE_WIDTH]; FILTER_TABLE_WIDTH],
    nan_count: AtomicUsize,
}

impl Film {
    pub fn new(resolution: Point2i, crop_window: Bounds2f, filter: PixelFilter) -> Self {
        let low_x = (resolution.x as Float * crop_window.min.x).ceil() as i32;
        let low_y = (resolution.y as Float * crop_window.min.y).ceil() as i32;
        let high_x = (resolution.x as Float * crop_window.max.x).ceil() as i32;
        let high_y = (resolution.y as Float * crop_window.max.y).ceil() as i32;

        let pixel_bounds = Bounds2i::with_bounds(
            Point2i::new(low_x, low_y),
            Point2i::new(high_x, high_y),
        );

        let pixels = vec![Pixel::default(); pixel_bounds.area().max(0) as usize];

        let mut filter_table = [[0.0; FILTER_TABLE_WIDTH]; FILTER_TABLE_WIDTH];
        let radius = filter.radius();
        for (y, row) in filter_table.iter_mut().enumerate() {
            for (x, val) in row.iter_mut().enumerate() {
                let p = Point2f::new(
                    (x as Float + 0.5) * radius.x / FILTER_TABLE_WIDTH as Float,
                    (y as Float + 0.5) * radius.y / FILTER_TABLE_WIDTH as Float,
                );
                *val = filter.evaluate(p);
            }
        }

        Self {
            full_resolution: resolution,
            pixel_bounds,
            filter,
            pixels: Mutex::new(pixels),
            filter_table,
            nan_count: AtomicUsize::new(0),
        }
    }

    pub fn whole_image(resolution: Point2i, filter: PixelFilter) -> Self {
        let crop = Bounds2f::with_bounds(Point2f::new(0.0, 0.0), Point2f::new(1.0, 1.0));
        Self::new(resolution, crop, filter)
    }

    /// Range of pixels that must be sampled: larger than the image so edge
    /// pixels receive full filter support.
    pub fn sample_bounds(&self) -> Bounds2i {
        let r = self.filter.radius();
        let low_x = (self.pixel_bounds.min.x as Float + 0.5 - r.x).floor() as i32;
        let low_y = (self.pixel_bounds.min.y as Float + 0.5 - r.y).floor() as i32;
        let high_x = (self.pixel_bounds.max.x as Float - 0.5 + r.x).ceil() as i32;
        let high_y = (self.pixel_bounds.max.y as Float - 0.5 + r.y).ceil() as i32;
        Bounds2i::with_bounds(Point2i::new(low_x, low_y), Point2i::new(high_x, high_y))
    }

    pub fn get_film_tile(&self, sample_bounds: Bounds2i) -> FilmTile {
        let r = self.filter.radius();
        let p0 = Point2i::new(
            (sample_bounds.min.x as Float - 0.5 - r.x).ceil() as i32,
            (sample_bounds.min.y as Float - 0.5 - r.y).ceil() as i32,
        );
        let p1 = Point2i::new(
            (sample_bounds.max.x as Float - 0.5 + r.x).floor() as i32 + 1,
            (sample_bounds.max.y as Float - 0.5 + r.y).floor() as i32 + 1,
        );

        let tile_bounds =
            Bounds2i::with_bounds(p0, p1).intersection(&self.pixel_bounds);

        FilmTile {
            pixel_bounds: tile_bounds,
            filter_radius: Point2f::new(r.x, r.y),
            inv_filter_radius: Point2f::new(1.0 / r.x, 1.0 / r.y),
            pixels: vec![TilePixel::default(); tile_bounds.area().max(0) as usize],
        }
    }

    fn pixel_idx(&self, p: Point2i) -> usize {
        let width = self.pixel_bounds.max.x - self.pixel_bounds.min.x;
        ((p.x - self.pixel_bounds.min.x) + (p.y - self.pixel_bounds.min.y) * width) as usize
    }

    /// Splat one sample under the reconstruction filter. Non-finite samples
    /// are dropped and counted; the render never aborts on them.
    pub fn add_sample_to_tile(
        &self,
        tile: &mut FilmTile,
        p_film: Point2f,
        color: Rgba,
        sample_weight: Float,
    ) {
        if !color.is_finite() {
            self.nan_count.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let p_discrete = p_film - cgmath::vec2(0.5, 0.5);
        let mut p0 = Point2i::new(
            (p_discrete.x - tile.filter_radius.x).ceil() as i32,
            (p_discrete.y - tile.filter_radius.y).ceil() as i32,
        );
        let mut p1 = Point2i::new(
            (p_discrete.x + tile.filter_radius.x).floor() as i32 + 1,
            (p_discrete.y + tile.filter_radius.y).floor() as i32 + 1,
        );
        p0 = Point2i::new(p0.x.max(tile.pixel_bounds.min.x), p0.y.max(tile.pixel_bounds.min.y));
        p1 = Point2i::new(p1.x.min(tile.pixel_bounds.max.x), p1.y.min(tile.pixel_bounds.max.y));

        let mut filter_idx_x = SmallVec::<[usize; 16]>::new();
        for x in p0.x..p1.x {
            let fx = ((x as Float - p_discrete.x)
                * tile.inv_filter_radius.x
                * FILTER_TABLE_WIDTH as Float)
                .abs();
            filter_idx_x.push((fx.floor() as usize).min(FILTER_TABLE_WIDTH - 1));
        }

        let mut filter_idx_y = SmallVec::<[usize; 16]>::new();
        for y in p0.y..p1.y {
            let fy = ((y as Float - p_discrete.y)
                * tile.inv_filter_radius.y
                * FILTER_TABLE_WIDTH as Float)
                .abs();
            filter_idx_y.push((fy.floor() as usize).min(FILTER_TABLE_WIDTH - 1));
        }

        for y in p0.y..p1.y {
            for x in p0.x..p1.x {
                let weight = self.filter_table[filter_idx_y[(y - p0.y) as usize]]
                    [filter_idx_x[(x - p0.x) as usize]];
                let idx = tile.pixel_idx(Point2i::new(x, y));
                let pixel = &mut tile.pixels[idx];
                let w = sample_weight * weight;
                pixel.sum[0] += color.r * w;
                pixel.sum[1] += color.g * w;
                pixel.sum[2] += color.b * w;
                pixel.sum[3] += color.a * w;
                pixel.weight_sum += w;
            }
        }

        // variance bookkeeping belongs to the pixel that owns the sample
        let owner = Point2i::new(p_film.x.floor() as i32, p_film.y.floor() as i32);
        if tile.pixel_bounds.contains(owner) {
            let lum = 0.212_671 * color.r + 0.715_160 * color.g + 0.072_169 * color.b;
            let idx = tile.pixel_idx(owner);
            let pixel = &mut tile.pixels[idx];
            pixel.count += 1;
            let delta = lum - pixel.mean;
            pixel.mean += delta / pixel.count as Float;
            pixel.m2 += delta * (lum - pixel.mean);
        }
    }

    pub fn merge_film_tile(&self, tile: FilmTile) {
        let mut pixels = self.pixels.lock();
        for p in tile.pixel_bounds.iter_points() {
            let tp = &tile.pixels[tile.pixel_idx(p.into())];
            let merged = &mut pixels[self.pixel_idx(p.into())];
            for i in 0..4 {
                merged.sum[i] += tp.sum[i];
            }
            merged.weight_sum += tp.weight_sum;

            // parallel Welford merge
            if tp.count > 0 {
                let na = merged.count as Float;
                let nb = tp.count as Float;
                let n = na + nb;
                let delta = tp.mean - merged.mean;
                merged.mean += delta * nb / n;
                merged.m2 += tp.m2 + delta * delta * na * nb / n;
                merged.count += tp.count;
            }
        }
    }

    /// Flag pixels whose luminance-mean error still exceeds `threshold`.
    /// Returns the number flagged; zero means the image has converged.
    pub fn next_pass(&self, threshold: Float) -> usize {
        let mut pixels = self.pixels.lock();
        let mut flagged = 0;
        for pixel in pixels.iter_mut() {
            pixel.resample = pixel.variance_of_mean().sqrt() > threshold;
            if pixel.resample {
                flagged += 1;
            }
        }
        flagged
    }

    /// Copy of the resample flags for one tile, in `iter_points` order over
    /// the full tile. Sample positions outside the image (filter margin)
    /// inherit the flag of the nearest image pixel.
    pub fn resample_flags(&self, tile_bounds: Bounds2i) -> Vec<bool> {
        let pixels = self.pixels.lock();
        tile_bounds
            .iter_points()
            .map(|(x, y)| {
                let p = Point2i::new(
                    x.max(self.pixel_bounds.min.x).min(self.pixel_bounds.max.x - 1),
                    y.max(self.pixel_bounds.min.y).min(self.pixel_bounds.max.y - 1),
                );
                pixels[self.pixel_idx(p)].resample
            })
            .collect()
    }

    pub fn pixel(&self, p: Point2i) -> Pixel {
        self.pixels.lock()[self.pixel_idx(p)]
    }

    pub fn nan_samples(&self) -> usize {
        self.nan_count.load(Ordering::Relaxed)
    }

    pub fn to_rgba_buffer(&self) -> Vec<Rgba> {
        self.pixels.lock().iter().map(|p| p.rgba()).collect()
    }

    pub fn into_image_buffer(self) -> ImageBuffer<image::Rgb<f32>, Vec<f32>> {
        let pixels = self.pixels.into_inner();
        let flat: Vec<Float> = pixels
            .into_iter()
            .flat_map(|p| {
                let c = p.rgba();
                vec![c.r, c.g, c.b]
            })
            .collect();

        let (width, height) = self.pixel_bounds.dimensions();
        ImageBuffer::from_vec(width as u32, height as u32, flat)
            .expect("invalid dimensions when creating image buffer")
    }
}

impl Rgb {
    pub fn luminance(&self) -> Float {
        0.212_671 * self.r + 0.715_160 * self.g + 0.072_169 * self.b
    }
}
