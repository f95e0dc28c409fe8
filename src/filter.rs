use crate::{Float, Point2f, Vec2f};

/// Reconstruction filter for splatting samples onto the film. Kernel radius
/// is fixed per render; the film samples the kernel into a lookup table.
#[derive(Debug, Clone, Copy)]
pub enum PixelFilter {
    Box { radius: Vec2f },
    Gaussian { radius: Vec2f, alpha: Float },
    Mitchell { radius: Vec2f, b: Float, c: Float },
}

impl PixelFilter {
    pub fn new_box(radius: Float) -> Self {
        PixelFilter::Box { radius: Vec2f::new(radius, radius) }
    }

    pub fn new_gaussian(radius: Float) -> Self {
        PixelFilter::Gaussian { radius: Vec2f::new(radius, radius), alpha: 2.0 }
    }

    pub fn new_mitchell(radius: Float) -> Self {
        // B + 2C = 1 per Mitchell-Netravali
        PixelFilter::Mitchell {
            radius: Vec2f::new(radius, radius),
            b: 1.0 / 3.0,
            c: 1.0 / 3.0,
        }
    }

    pub fn radius(&self) -> Vec2f {
        match *self {
            PixelFilter::Box { radius }
            | PixelFilter::Gaussian { radius, .. }
            | PixelFilter::Mitchell { radius, .. } => radius,
        }
    }

    pub fn inv_radius(&self) -> Vec2f {
        let r = self.radius();
        Vec2f::new(1.0 / r.x, 1.0 / r.y)
    }

    pub fn evaluate(&self, p: Point2f) -> Float {
        match *self {
            PixelFilter::Box { .. } => 1.0,
            PixelFilter::Gaussian { radius, alpha } => {
                gaussian_1d(p.x, radius.x, alpha) * gaussian_1d(p.y, radius.y, alpha)
            }
            PixelFilter::Mitchell { radius, b, c } => {
                mitchell_1d(p.x / radius.x, b, c) * mitchell_1d(p.y / radius.y, b, c)
            }
        }
    }
}

fn gaussian_1d(d: Float, radius: Float, alpha: Float) -> Float {
    let tail = (-alpha * radius * radius).exp();
    Float::max(0.0, (-alpha * d * d).exp() - tail)
}

fn mitchell_1d(x: Float, b: Float, c: Float) -> Float {
    let x = (2.0 * x).abs();
    let x2 = x * x;
    let x3 = x2 * x;
    if x > 2.0 {
        0.0
    } else if x > 1.0 {
        ((-b - 6.0 * c) * x3 + (6.0 * b + 30.0 * c) * x2 + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c))
            * (1.0 / 6.0)
    } else {
        ((12.0 - 9.0 * b - 6.0 * c) * x3 + (-18.0 + 12.0 * b + 6.0 * c) * x2 + (6.0 - 2.0 * b))
            * (1.0 / 6.0)
    }
}
