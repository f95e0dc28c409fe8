use crate::color::Rgb;
use crate::{Float, Point3f, Vec3f};

pub mod hashgrid;
pub mod io;
pub mod map;

pub use hashgrid::HashGrid;
pub use map::PhotonMap;

/// One stored light-transport sample. The surface normal disambiguates
/// photons on thin geometry during density estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Photon {
    pub pos: Point3f,
    /// Incoming direction (towards the surface the photon landed on).
    pub dir: Vec3f,
    pub power: Rgb,
    pub normal: Vec3f,
}

/// Query result: index into the map's photon array plus squared distance.
#[derive(Clone, Copy, Debug)]
pub struct FoundPhoton {
    pub idx: u32,
    pub dist2: Float,
}
