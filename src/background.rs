use crate::color::Rgb;
use crate::Vec3f;

/// Environment radiance for rays that leave the scene. Image-based
/// environments plug in through the loader layer; the core ships the
/// procedural ones.
#[derive(Clone, Debug)]
pub enum Background {
    Constant { color: Rgb },
    /// Vertical blend from horizon to zenith.
    Gradient { horizon: Rgb, zenith: Rgb },
    /// Sky colour above the horizon, ground colour below.
    Hemisphere { sky: Rgb, ground: Rgb },
}

impl Background {
    pub fn eval(&self, dir: Vec3f) -> Rgb {
        match self {
            Background::Constant { color } => *color,
            Background::Gradient { horizon, zenith } => {
                let t = 0.5 * (dir.y + 1.0);
                Rgb::lerp(t, *horizon, *zenith)
            }
            Background::Hemisphere { sky, ground } => {
                if dir.y >= 0.0 {
                    *sky
                } else {
                    *ground
                }
            }
        }
    }

    /// Mean radiance, used to weight the background light against the
    /// scene's other emitters when distributing photons.
    pub fn power(&self) -> Rgb {
        match self {
            Background::Constant { color } => *color,
            Background::Gradient { horizon, zenith } => (*horizon + *zenith) * 0.5,
            Background::Hemisphere { sky, ground } => (*sky + *ground) * 0.5,
        }
    }
}

impl Default for Background {
    fn default() -> Self {
        Background::Constant { color: Rgb::BLACK }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_endpoints() {
        let bg = Background::Gradient {
            horizon: Rgb::WHITE,
            zenith: Rgb::new(0.5, 0.7, 1.0),
        };
        let up = bg.eval(Vec3f::new(0.0, 1.0, 0.0));
        assert!((up.r - 0.5).abs() < 1e-6);
        let down = bg.eval(Vec3f::new(0.0, -1.0, 0.0));
        assert!((down.r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hemisphere_split() {
        let bg = Background::Hemisphere { sky: Rgb::WHITE, ground: Rgb::BLACK };
        assert_eq!(bg.eval(Vec3f::new(0.1, 0.5, 0.0)), Rgb::WHITE);
        assert_eq!(bg.eval(Vec3f::new(0.1, -0.5, 0.0)), Rgb::BLACK);
    }

    #[test]
    fn power_is_finite_mean() {
        let bg = Background::Hemisphere { sky: Rgb::uniform(2.0), ground: Rgb::BLACK };
        assert!((bg.power().r - 1.0).abs() < 1e-6);
    }
}

