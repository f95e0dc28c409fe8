use crate::geometry::{Differential, Ray, RayDifferential};
use crate::sampler::CameraSample;
use crate::sampling::concentric_sample_disk;
use crate::{Float, Point2i, Point3f, Vec2f, Vec3f};
use cgmath::InnerSpace;

pub trait Camera: Sync + Send {
    fn generate_ray(&self, sample: CameraSample) -> (Float, Ray);

    fn resolution(&self) -> Point2i;

    fn generate_ray_differential(&self, sample: CameraSample) -> (Float, RayDifferential) {
        let (mut weight, ray) = self.generate_ray(sample);

        let shift_x = CameraSample {
            p_film: sample.p_film + Vec2f::new(1.0, 0.0),
            ..sample
        };
        let (wtx, rx) = self.generate_ray(shift_x);

        let shift_y = CameraSample {
            p_film: sample.p_film + Vec2f::new(0.0, 1.0),
            ..sample
        };
        let (wty, ry) = self.generate_ray(shift_y);

        if wtx == 0.0 || wty == 0.0 {
            weight = 0.0;
        }

        let ray_diff = RayDifferential {
            ray,
            diff: Some(Differential {
                rx_from: rx.from,
                rx_dir: rx.dir,
                ry_from: ry.from,
                ry_dir: ry.dir,
            }),
        };
        (weight, ray_diff)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Lens {
    pub aperture: Float,
    pub focal_distance: Float,
}

pub struct PerspectiveCamera {
    pos: Point3f,
    dir: Vec3f,
    right: Vec3f,
    up: Vec3f,
    half_width: Float,
    half_height: Float,
    resolution: Point2i,
    lens: Option<Lens>,
}

impl PerspectiveCamera {
    pub fn new(
        pos: Point3f,
        look_at: Point3f,
        up: Vec3f,
        fov_degrees: Float,
        resolution: Point2i,
        lens: Option<Lens>,
    ) -> Self {
        let dir = (look_at - pos).normalize();
        let right = dir.cross(up).normalize();
        let up = right.cross(dir);

        let aspect = resolution.x as Float / resolution.y as Float;
        let half_width = (fov_degrees.to_radians() / 2.0).tan();
        let half_height = half_width / aspect;

        Self {
            pos,
            dir,
            right,
            up,
            half_width,
            half_height,
            resolution,
            lens,
        }
    }
}

impl Camera for PerspectiveCamera {
    fn generate_ray(&self, sample: CameraSample) -> (Float, Ray) {
        // film point to [-1, 1] ndc, y flipped so raster y grows downward
        let sx = 2.0 * sample.p_film.x / self.resolution.x as Float - 1.0;
        let sy = 1.0 - 2.0 * sample.p_film.y / self.resolution.y as Float;

        let mut from = self.pos;
        let mut dir = (self.dir
            + self.right * (sx * self.half_width)
            + self.up * (sy * self.half_height))
            .normalize();

        if let Some(lens) = self.lens {
            let p_lens = concentric_sample_disk(sample.p_lens) * lens.aperture;
            let ft = lens.focal_distance / dir.dot(self.dir);
            let p_focus = from + dir * ft;
            from = from + self.right * p_lens.x + self.up * p_lens.y;
            dir = (p_focus - from).normalize();
        }

        let mut ray = Ray::new(from, dir);
        ray.time = sample.time;
        (1.0, ray)
    }

    fn resolution(&self) -> Point2i {
        self.resolution
    }
}
