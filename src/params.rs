use crate::color::Rgb;
use crate::error::RenderError;
use crate::{Float, Vec3f};
use cgmath::Matrix4;
use std::collections::HashMap;

/// Loosely-typed parameter value, the currency of the scene-construction
/// API. Integers coerce to floats on lookup, nothing else converts.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Int(i32),
    Float(Float),
    Bool(bool),
    Str(String),
    Color(Rgb),
    Vector(Vec3f),
    Matrix(Matrix4<Float>),
}

#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    map: HashMap<String, ParamValue>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: ParamValue) -> &mut Self {
        self.map.insert(key.to_string(), value);
        self
    }

    pub fn set_int(&mut self, key: &str, v: i32) -> &mut Self {
        self.set(key, ParamValue::Int(v))
    }

    pub fn set_float(&mut self, key: &str, v: Float) -> &mut Self {
        self.set(key, ParamValue::Float(v))
    }

    pub fn set_bool(&mut self, key: &str, v: bool) -> &mut Self {
        self.set(key, ParamValue::Bool(v))
    }

    pub fn set_str(&mut self, key: &str, v: &str) -> &mut Self {
        self.set(key, ParamValue::Str(v.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|k| k.as_str())
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.map.get(key)? {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<Float> {
        match self.map.get(key)? {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as Float),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key)? {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key)? {
            ParamValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_color(&self, key: &str) -> Option<Rgb> {
        match self.map.get(key)? {
            ParamValue::Color(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_vector(&self, key: &str) -> Option<Vec3f> {
        match self.map.get(key)? {
            ParamValue::Vector(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CausticType {
    None,
    Path,
    Photon,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileOrder {
    Scanline,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Box,
    Gaussian,
    Mitchell,
}

/// Validated render configuration. Every key the core recognizes appears
/// here; anything else in the map is a hard configuration error, surfaced
/// before rendering starts.
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub aa_passes: usize,
    pub aa_samples: u64,
    pub aa_inc_samples: u64,
    pub aa_threshold: Float,
    pub tile_size: usize,
    pub tile_order: TileOrder,
    pub filter_type: FilterType,
    pub filter_size: Float,
    pub shadow_bias: Float,
    pub ray_min_dist: Float,
    pub transparent_shadows: bool,
    pub shadow_depth: usize,
    pub ray_depth: u16,
    pub russian_roulette_min_bounces: u16,
    pub caustic_type: CausticType,
    pub photons: usize,
    pub caustic_photons: usize,
    pub diffuse_photons: usize,
    pub search: usize,
    pub caustic_mix: usize,
    pub photon_radius: Float,
    pub final_gather: bool,
    pub fg_samples: usize,
    pub fg_bounces: u16,
    pub threads: usize,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            aa_passes: 1,
            aa_samples: 1,
            aa_inc_samples: 1,
            aa_threshold: 0.05,
            tile_size: 32,
            tile_order: TileOrder::Scanline,
            filter_type: FilterType::Box,
            filter_size: 0.5,
            shadow_bias: 5e-4,
            ray_min_dist: 5e-5,
            transparent_shadows: false,
            shadow_depth: 4,
            ray_depth: 5,
            russian_roulette_min_bounces: 3,
            caustic_type: CausticType::Path,
            photons: 100_000,
            caustic_photons: 100_000,
            diffuse_photons: 100_000,
            search: 100,
            caustic_mix: 100,
            photon_radius: 1.0,
            final_gather: false,
            fg_samples: 16,
            fg_bounces: 2,
            threads: 0,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "AA_passes",
    "AA_samples",
    "AA_inc_samples",
    "AA_threshold",
    "AA_tile_size",
    "AA_tile_order",
    "filter_type",
    "filter_size",
    "shadow_bias",
    "ray_min_dist",
    "transparent_shadows",
    "shadow_depth",
    "raydepth",
    "russian_roulette_min_bounces",
    "caustic_type",
    "photons",
    "caustic_photons",
    "diffuse_photons",
    "search",
    "caustic_mix",
    "photon_radius",
    "final_gather",
    "fg_samples",
    "fg_bounces",
    "threads",
];

impl RenderParams {
    pub fn from_param_map(params: &ParamMap) -> Result<Self, RenderError> {
        for key in params.keys() {
            if !KNOWN_KEYS.contains(&key) {
                return Err(RenderError::Config(format!("unrecognized parameter '{}'", key)));
            }
        }

        let mut out = Self::default();

        if let Some(v) = params.get_int("AA_passes") {
            if v < 1 {
                return Err(RenderError::Config("AA_passes must be >= 1".into()));
            }
            out.aa_passes = v as usize;
        }
        if let Some(v) = params.get_int("AA_samples") {
            if v < 1 {
                return Err(RenderError::Config("AA_samples must be >= 1".into()));
            }
            out.aa_samples = v as u64;
        }
        if let Some(v) = params.get_int("AA_inc_samples") {
            if v < 1 {
                return Err(RenderError::Config("AA_inc_samples must be >= 1".into()));
            }
            out.aa_inc_samples = v as u64;
        }
        if let Some(v) = params.get_float("AA_threshold") {
            if v < 0.0 {
                return Err(RenderError::Config("AA_threshold must be >= 0".into()));
            }
            out.aa_threshold = v;
        }
        if let Some(v) = params.get_int("AA_tile_size") {
            if v < 4 || v > 256 {
                return Err(RenderError::Config("AA_tile_size out of range [4, 256]".into()));
            }
            out.tile_size = v as usize;
        }
        if let Some(v) = params.get_str("AA_tile_order") {
            out.tile_order = match v {
                "scanline" => TileOrder::Scanline,
                "random" => TileOrder::Random,
                other => {
                    return Err(RenderError::Config(format!("unknown tile order '{}'", other)))
                }
            };
        }
        if let Some(v) = params.get_str("filter_type") {
            out.filter_type = match v {
                "box" => FilterType::Box,
                "gauss" | "gaussian" => FilterType::Gaussian,
                "mitchell" => FilterType::Mitchell,
                other => {
                    return Err(RenderError::Config(format!("unknown filter type '{}'", other)))
                }
            };
        }
        if let Some(v) = params.get_float("filter_size") {
            if v <= 0.0 {
                return Err(RenderError::Config("filter_size must be > 0".into()));
            }
            out.filter_size = v;
        }
        if let Some(v) = params.get_float("shadow_bias") {
            out.shadow_bias = v;
        }
        if let Some(v) = params.get_float("ray_min_dist") {
            out.ray_min_dist = v;
        }
        if let Some(v) = params.get_bool("transparent_shadows") {
            out.transparent_shadows = v;
        }
        if let Some(v) = params.get_int("shadow_depth") {
            out.shadow_depth = v.max(0) as usize;
        }
        if let Some(v) = params.get_int("raydepth") {
            out.ray_depth = v.max(0) as u16;
        }
        if let Some(v) = params.get_int("russian_roulette_min_bounces") {
            out.russian_roulette_min_bounces = v.max(0) as u16;
        }
        if let Some(v) = params.get_str("caustic_type") {
            out.caustic_type = match v {
                "none" => CausticType::None,
                "path" => CausticType::Path,
                "photon" => CausticType::Photon,
                "both" => CausticType::Both,
                other => {
                    return Err(RenderError::Config(format!("unknown caustic type '{}'", other)))
                }
            };
        }
        if let Some(v) = params.get_int("photons") {
            out.photons = v.max(0) as usize;
        }
        if let Some(v) = params.get_int("caustic_photons") {
            out.caustic_photons = v.max(0) as usize;
        }
        if let Some(v) = params.get_int("diffuse_photons") {
            out.diffuse_photons = v.max(0) as usize;
        }
        if let Some(v) = params.get_int("search") {
            if v < 1 {
                return Err(RenderError::Config("search must be >= 1".into()));
            }
            out.search = v as usize;
        }
        if let Some(v) = params.get_int("caustic_mix") {
            out.caustic_mix = v.max(1) as usize;
        }
        if let Some(v) = params.get_float("photon_radius") {
            if v <= 0.0 {
                return Err(RenderError::Config("photon_radius must be > 0".into()));
            }
            out.photon_radius = v;
        }
        if let Some(v) = params.get_bool("final_gather") {
            out.final_gather = v;
        }
        if let Some(v) = params.get_int("fg_samples") {
            if v < 1 {
                return Err(RenderError::Config("fg_samples must be >= 1".into()));
            }
            out.fg_samples = v as usize;
        }
        if let Some(v) = params.get_int("fg_bounces") {
            out.fg_bounces = v.max(0) as u16;
        }
        if let Some(v) = params.get_int("threads") {
            if v < 0 {
                return Err(RenderError::Config("threads must be >= 0".into()));
            }
            out.threads = v as usize;
        }

        // contradictory combination: transparent shadows with no chain budget
        if out.transparent_shadows && out.shadow_depth == 0 {
            return Err(RenderError::Config(
                "transparent_shadows requires shadow_depth >= 1".into(),
            ));
        }

        Ok(out)
    }

    pub fn make_filter(&self) -> crate::filter::PixelFilter {
        use crate::filter::PixelFilter;
        match self.filter_type {
            FilterType::Box => PixelFilter::new_box(self.filter_size),
            FilterType::Gaussian => PixelFilter::new_gaussian(self.filter_size.max(1.0)),
            FilterType::Mitchell => PixelFilter::new_mitchell(self.filter_size.max(1.0)),
        }
    }
}
