/*!
Physically-based rendering core: ray/scene intersection over a SAH k-d
tree, a tiled adaptive-sampling driver, path-tracing and photon-mapping
surface integrators, and ray-marched volume integrators.

Front-ends construct a [`scene::Scene`] through [`scene::SceneBuilder`],
configure a [`params::RenderParams`] from a parameter map, pick a surface
integrator and hand everything to [`integrator::TiledDriver`].
*/

pub mod accel;
pub mod background;
pub mod camera;
pub mod color;
pub mod error;
pub mod film;
pub mod filter;
pub mod geometry;
pub mod integrator;
pub mod light;
pub mod material;
pub mod math;
pub mod output;
pub mod params;
pub mod photon;
pub mod primitive;
pub mod sampler;
pub mod sampling;
pub mod scene;
pub mod state;
pub mod volume;

pub type Float = f32;
pub type Point2f = cgmath::Point2<Float>;
pub type Point2i = cgmath::Point2<i32>;
pub type Point3f = cgmath::Point3<Float>;
pub type Vec2f = cgmath::Vector2<Float>;
pub type Vec2i = cgmath::Vector2<i32>;
pub type Vec3f = cgmath::Vector3<Float>;

pub use crate::color::{Rgb, Rgba};
pub use crate::error::RenderError;
pub use crate::geometry::{Bounds2i, Bounds3f, Ray, RayDifferential, Transform};
pub use crate::params::{ParamMap, ParamValue, RenderParams};
pub use crate::primitive::{IntersectData, SurfacePoint};
pub use crate::scene::{Scene, SceneBuilder};
