use crate::color::Rgb;
use crate::math::{fresnel_dielectric, reflect_dir, refract_dir};
use crate::primitive::{MaterialId, SurfacePoint};
use crate::sampling::{cosine_hemisphere_pdf, cosine_sample_hemisphere};
use crate::state::RenderState;
use crate::{Float, Point2f, Vec3f};
use bitflags::bitflags;
use cgmath::InnerSpace;
use std::f32::consts::{FRAC_1_PI, PI};

pub mod nodes;

pub use nodes::{ColorInput, NodeId, NodeStack, ShaderNode};

bitflags! {
    /// Lobe classification published by materials and used by integrators to
    /// restrict sampling.
    pub struct BsdfFlags: u16 {
        const SPECULAR   = 1;
        const GLOSSY     = 1 << 1;
        const DIFFUSE    = 1 << 2;
        const DISPERSIVE = 1 << 3;
        const REFLECT    = 1 << 4;
        const TRANSMIT   = 1 << 5;
        const FILTER     = 1 << 6;
        const EMIT       = 1 << 7;
        const VOLUMETRIC = 1 << 8;

        const DIFFUSE_REFLECT = Self::DIFFUSE.bits | Self::REFLECT.bits;
        const SPECULAR_REFLECT = Self::SPECULAR.bits | Self::REFLECT.bits;
        const SPECULAR_TRANSMIT = Self::SPECULAR.bits | Self::TRANSMIT.bits | Self::FILTER.bits;
        const ALL_SPECULAR = Self::SPECULAR.bits | Self::REFLECT.bits | Self::TRANSMIT.bits;
        const ALL_GLOSSY = Self::GLOSSY.bits | Self::REFLECT.bits | Self::TRANSMIT.bits;
        const ALL = Self::SPECULAR.bits | Self::GLOSSY.bits | Self::DIFFUSE.bits
            | Self::DISPERSIVE.bits | Self::REFLECT.bits | Self::TRANSMIT.bits
            | Self::FILTER.bits;
    }
}

/// Sampling request/result record passed through `Material::sample`.
pub struct Sample {
    pub s1: Float,
    pub s2: Float,
    /// Lobes the caller is willing to accept.
    pub flags: BsdfFlags,
    /// Lobe actually sampled; filled by the material.
    pub sampled_flags: BsdfFlags,
    /// Solid-angle pdf of the sampled direction; filled by the material.
    pub pdf: Float,
}

impl Sample {
    pub fn new(s1: Float, s2: Float, flags: BsdfFlags) -> Self {
        Self {
            s1,
            s2,
            flags,
            sampled_flags: BsdfFlags::empty(),
            pdf: 0.0,
        }
    }
}

pub struct SampleResult {
    pub wi: Vec3f,
    /// Throughput multiplier `f·|cosθ|/pdf`, which is what path loops apply.
    pub weight: Rgb,
}

/// Extra dimension for photon scattering lobe selection.
pub struct PhotonSample {
    pub s: Sample,
    pub s3: Float,
    /// Tinted power multiplier for the scattered photon.
    pub color: Rgb,
}

impl PhotonSample {
    pub fn new(s1: Float, s2: Float, s3: Float, flags: BsdfFlags) -> Self {
        Self {
            s: Sample::new(s1, s2, flags),
            s3,
            color: Rgb::BLACK,
        }
    }
}

/// Delta lobes reported by `Material::specular`.
#[derive(Default)]
pub struct SpecularLobes {
    pub reflect: Option<(Vec3f, Rgb)>,
    pub refract: Option<(Vec3f, Rgb)>,
}

/// Immutable shading environment: the scene's material arena (for `Mask`
/// composition) and the shader-node DAG.
#[derive(Clone, Copy)]
pub struct ShadingCtx<'a> {
    pub materials: &'a [Material],
    pub nodes: &'a [ShaderNode],
}

/// Materials are a closed set dispatched by `match`; the common lobes stay
/// inlinable in the shading loop.
pub enum Material {
    Lambert {
        diffuse: ColorInput,
        emit: Rgb,
    },
    Glossy {
        diffuse: ColorInput,
        glossy: ColorInput,
        exponent: Float,
        /// Probability of sampling the diffuse base over the glossy lobe.
        diffuse_fraction: Float,
    },
    Mirror {
        color: Rgb,
        reflectance: Float,
    },
    Glass {
        filter: Rgb,
        ior: Float,
        /// Pass shadow rays through with the filter colour instead of
        /// blocking them.
        fake_shadow: bool,
    },
    /// Blend of two materials switched per-point by a node threshold.
    Mask {
        a: MaterialId,
        b: MaterialId,
        mask: NodeId,
        threshold: Float,
    },
    /// Zero interaction; rays pass through unchanged.
    Null,
}

impl Material {
    /// Union of lobes this material may ever return.
    pub fn flags(&self, ctx: &ShadingCtx) -> BsdfFlags {
        match self {
            Material::Lambert { emit, .. } => {
                let mut f = BsdfFlags::DIFFUSE_REFLECT;
                if !emit.is_black() {
                    f |= BsdfFlags::EMIT;
                }
                f
            }
            Material::Glossy { .. } => {
                BsdfFlags::DIFFUSE | BsdfFlags::GLOSSY | BsdfFlags::REFLECT
            }
            Material::Mirror { .. } => BsdfFlags::SPECULAR_REFLECT,
            Material::Glass { .. } => {
                BsdfFlags::SPECULAR | BsdfFlags::REFLECT | BsdfFlags::TRANSMIT | BsdfFlags::FILTER
            }
            Material::Mask { a, b, .. } => {
                ctx.materials[*a].flags(ctx) | ctx.materials[*b].flags(ctx)
            }
            Material::Null => BsdfFlags::empty(),
        }
    }

    /// Evaluate the shading DAG into the per-state buffer and report the
    /// lobes active at this point. Must be called before any of the lookup
    /// operations below.
    pub fn init_bsdf(&self, ctx: &ShadingCtx, state: &mut RenderState, sp: &SurfacePoint) -> BsdfFlags {
        state.node_stack.eval_all(ctx.nodes, sp);
        self.active_flags(ctx, &state.node_stack)
    }

    fn active_flags(&self, ctx: &ShadingCtx, stack: &NodeStack) -> BsdfFlags {
        match self {
            Material::Mask { a, b, mask, threshold } => {
                let chosen = if stack.value(*mask) < *threshold { *a } else { *b };
                ctx.materials[chosen].active_flags(ctx, stack)
            }
            _ => self.flags(ctx),
        }
    }

    fn mask_select<'c>(&self, ctx: &ShadingCtx<'c>, stack: &NodeStack) -> Option<&'c Material> {
        if let Material::Mask { a, b, mask, threshold } = self {
            let chosen = if stack.value(*mask) < *threshold { *a } else { *b };
            Some(&ctx.materials[chosen])
        } else {
            None
        }
    }

    /// BSDF value times `|cosθ_i|` for a concrete direction pair. Delta
    /// lobes always evaluate to black.
    pub fn eval(
        &self,
        ctx: &ShadingCtx,
        stack: &NodeStack,
        sp: &SurfacePoint,
        wo: Vec3f,
        wi: Vec3f,
        flags: BsdfFlags,
    ) -> Rgb {
        match self {
            Material::Lambert { diffuse, .. } => {
                if !flags.contains(BsdfFlags::DIFFUSE) || !same_side(sp, wo, wi) {
                    return Rgb::BLACK;
                }
                diffuse.eval(stack) * FRAC_1_PI * sp.ns.dot(wi).abs()
            }

            Material::Glossy { diffuse, glossy, exponent, .. } => {
                if !same_side(sp, wo, wi) {
                    return Rgb::BLACK;
                }
                let mut f = Rgb::BLACK;
                if flags.contains(BsdfFlags::DIFFUSE) {
                    f += diffuse.eval(stack) * FRAC_1_PI;
                }
                if flags.contains(BsdfFlags::GLOSSY) {
                    let n = shading_normal(sp, wo);
                    let h = (wo + wi).normalize();
                    let cos_h = n.dot(h).max(0.0);
                    let d = (exponent + 2.0) / (2.0 * PI) * cos_h.powf(*exponent);
                    f += glossy.eval(stack) * d;
                }
                f * sp.ns.dot(wi).abs()
            }

            Material::Mirror { .. } | Material::Glass { .. } | Material::Null => Rgb::BLACK,

            Material::Mask { .. } => {
                let chosen = self.mask_select(ctx, stack).unwrap();
                chosen.eval(ctx, stack, sp, wo, wi, flags)
            }
        }
    }

    /// Draw an incident direction for the given outgoing one. Returns `None`
    /// when no allowed lobe can scatter.
    pub fn sample(
        &self,
        ctx: &ShadingCtx,
        stack: &NodeStack,
        sp: &SurfacePoint,
        wo: Vec3f,
        s: &mut Sample,
    ) -> Option<SampleResult> {
        match self {
            Material::Lambert { diffuse, .. } => {
                if !s.flags.contains(BsdfFlags::DIFFUSE) {
                    return None;
                }
                let n = shading_normal(sp, wo);
                let local = cosine_sample_hemisphere(Point2f::new(s.s1, s.s2));
                let (nu, nv) = SurfacePoint::make_frame(n, Some(sp.nu));
                let wi = nu * local.x + nv * local.y + n * local.z;

                s.pdf = cosine_hemisphere_pdf(local.z);
                if s.pdf <= 0.0 {
                    return None;
                }
                s.sampled_flags = BsdfFlags::DIFFUSE_REFLECT;
                let f = diffuse.eval(stack) * FRAC_1_PI;
                let weight = f * (sp.ns.dot(wi).abs() / s.pdf);
                Some(SampleResult { wi, weight })
            }

            Material::Glossy { diffuse_fraction, exponent, .. } => {
                let n = shading_normal(sp, wo);
                let (nu, nv) = SurfacePoint::make_frame(n, Some(sp.nu));

                let use_diffuse = s.flags.contains(BsdfFlags::DIFFUSE)
                    && (!s.flags.contains(BsdfFlags::GLOSSY) || s.s1 < *diffuse_fraction);

                let wi = if use_diffuse {
                    let s1 = (s.s1 / diffuse_fraction.max(1e-6)).min(1.0);
                    let local = cosine_sample_hemisphere(Point2f::new(s1, s.s2));
                    nu * local.x + nv * local.y + n * local.z
                } else if s.flags.contains(BsdfFlags::GLOSSY) {
                    let s1 = ((s.s1 - diffuse_fraction) / (1.0 - diffuse_fraction).max(1e-6))
                        .max(0.0)
                        .min(1.0);
                    // Blinn half-vector sampling
                    let cos_h = s1.powf(1.0 / (exponent + 1.0));
                    let sin_h = (1.0 - cos_h * cos_h).max(0.0).sqrt();
                    let phi = 2.0 * PI * s.s2;
                    let h = nu * (sin_h * phi.cos()) + nv * (sin_h * phi.sin()) + n * cos_h;
                    let wi = reflect_dir(wo, h);
                    if n.dot(wi) <= 0.0 {
                        return None;
                    }
                    wi
                } else {
                    return None;
                };

                s.pdf = self.pdf(ctx, stack, sp, wo, wi, s.flags);
                if s.pdf <= 0.0 {
                    return None;
                }
                s.sampled_flags = if use_diffuse {
                    BsdfFlags::DIFFUSE_REFLECT
                } else {
                    BsdfFlags::GLOSSY | BsdfFlags::REFLECT
                };

                let f_cos = self.eval(ctx, stack, sp, wo, wi, s.flags);
                Some(SampleResult {
                    wi,
                    weight: f_cos * (1.0 / s.pdf),
                })
            }

            Material::Mirror { color, reflectance } => {
                if !s.flags.contains(BsdfFlags::SPECULAR) {
                    return None;
                }
                let n = shading_normal(sp, wo);
                let wi = reflect_dir(wo, n);
                s.pdf = 1.0;
                s.sampled_flags = BsdfFlags::SPECULAR_REFLECT;
                Some(SampleResult { wi, weight: *color * *reflectance })
            }

            Material::Glass { filter, ior, .. } => {
                if !s.flags.contains(BsdfFlags::SPECULAR) {
                    return None;
                }
                let entering = sp.ng.dot(wo) >= 0.0;
                let n = if entering { sp.ns } else { -sp.ns };
                let eta = if entering { 1.0 / ior } else { *ior };
                let kr = fresnel_dielectric(n.dot(wo), 1.0, *ior);

                let refracted = refract_dir(wo, n, eta);
                let reflect = match refracted {
                    None => true, // total internal reflection
                    Some(_) => s.s1 < kr,
                };

                if reflect {
                    let wi = reflect_dir(wo, n);
                    s.pdf = if refracted.is_none() { 1.0 } else { kr };
                    s.sampled_flags = BsdfFlags::SPECULAR_REFLECT;
                    // kr / pdf cancels
                    Some(SampleResult { wi, weight: Rgb::WHITE })
                } else {
                    let wi = refracted.unwrap();
                    s.pdf = 1.0 - kr;
                    s.sampled_flags = BsdfFlags::SPECULAR_TRANSMIT;
                    Some(SampleResult { wi, weight: *filter })
                }
            }

            Material::Mask { .. } => {
                let chosen = self.mask_select(ctx, stack).unwrap();
                chosen.sample(ctx, stack, sp, wo, s)
            }

            Material::Null => None,
        }
    }

    /// Solid-angle pdf that `sample` would generate `wi` given `wo`.
    pub fn pdf(
        &self,
        ctx: &ShadingCtx,
        stack: &NodeStack,
        sp: &SurfacePoint,
        wo: Vec3f,
        wi: Vec3f,
        flags: BsdfFlags,
    ) -> Float {
        match self {
            Material::Lambert { .. } => {
                if !flags.contains(BsdfFlags::DIFFUSE) || !same_side(sp, wo, wi) {
                    return 0.0;
                }
                let n = shading_normal(sp, wo);
                cosine_hemisphere_pdf(n.dot(wi).max(0.0))
            }

            Material::Glossy { diffuse_fraction, exponent, .. } => {
                if !same_side(sp, wo, wi) {
                    return 0.0;
                }
                let n = shading_normal(sp, wo);
                let mut pdf = 0.0;
                let mut weight_sum = 0.0;
                if flags.contains(BsdfFlags::DIFFUSE) {
                    pdf += diffuse_fraction * cosine_hemisphere_pdf(n.dot(wi).max(0.0));
                    weight_sum += diffuse_fraction;
                }
                if flags.contains(BsdfFlags::GLOSSY) {
                    let h = (wo + wi).normalize();
                    let cos_h = n.dot(h).max(0.0);
                    let pdf_h = (exponent + 1.0) / (2.0 * PI) * cos_h.powf(*exponent);
                    let denom = 4.0 * wo.dot(h).abs().max(1e-6);
                    pdf += (1.0 - diffuse_fraction) * pdf_h / denom;
                    weight_sum += 1.0 - diffuse_fraction;
                }
                if weight_sum > 0.0 {
                    pdf / weight_sum
                } else {
                    0.0
                }
            }

            Material::Mirror { .. } | Material::Glass { .. } | Material::Null => 0.0,

            Material::Mask { .. } => {
                let chosen = self.mask_select(ctx, stack).unwrap();
                chosen.pdf(ctx, stack, sp, wo, wi, flags)
            }
        }
    }

    pub fn emit(&self, ctx: &ShadingCtx, stack: &NodeStack, sp: &SurfacePoint, wo: Vec3f) -> Rgb {
        match self {
            Material::Lambert { emit, .. } => {
                // emission is one-sided
                if sp.ng.dot(wo) > 0.0 {
                    *emit
                } else {
                    Rgb::BLACK
                }
            }
            Material::Mask { .. } => {
                let chosen = self.mask_select(ctx, stack).unwrap();
                chosen.emit(ctx, stack, sp, wo)
            }
            _ => Rgb::BLACK,
        }
    }

    /// Delta lobe directions and colours for perfectly specular transport.
    pub fn specular(
        &self,
        ctx: &ShadingCtx,
        stack: &NodeStack,
        sp: &SurfacePoint,
        wo: Vec3f,
    ) -> SpecularLobes {
        match self {
            Material::Mirror { color, reflectance } => SpecularLobes {
                reflect: Some((reflect_dir(wo, shading_normal(sp, wo)), *color * *reflectance)),
                refract: None,
            },

            Material::Glass { filter, ior, .. } => {
                let entering = sp.ng.dot(wo) >= 0.0;
                let n = if entering { sp.ns } else { -sp.ns };
                let eta = if entering { 1.0 / ior } else { *ior };
                let kr = fresnel_dielectric(n.dot(wo), 1.0, *ior);

                let reflect = Some((reflect_dir(wo, n), Rgb::uniform(kr)));
                let refract = refract_dir(wo, n, eta).map(|wi| (wi, *filter * (1.0 - kr)));
                SpecularLobes { reflect, refract }
            }

            Material::Mask { .. } => {
                let chosen = self.mask_select(ctx, stack).unwrap();
                chosen.specular(ctx, stack, sp, wo)
            }

            _ => SpecularLobes::default(),
        }
    }

    pub fn is_transparent(&self, ctx: &ShadingCtx) -> bool {
        match self {
            Material::Glass { fake_shadow, .. } => *fake_shadow,
            Material::Null => true,
            Material::Mask { a, b, .. } => {
                ctx.materials[*a].is_transparent(ctx) || ctx.materials[*b].is_transparent(ctx)
            }
            _ => false,
        }
    }

    /// Filter colour a shadow ray picks up crossing this surface; black
    /// means fully blocked.
    pub fn transparency(
        &self,
        ctx: &ShadingCtx,
        stack: &NodeStack,
        sp: &SurfacePoint,
        wo: Vec3f,
    ) -> Rgb {
        match self {
            Material::Glass { filter, fake_shadow, .. } => {
                if *fake_shadow {
                    *filter
                } else {
                    Rgb::BLACK
                }
            }
            Material::Null => Rgb::WHITE,
            Material::Mask { .. } => {
                let chosen = self.mask_select(ctx, stack).unwrap();
                chosen.transparency(ctx, stack, sp, wo)
            }
            _ => Rgb::BLACK,
        }
    }

    pub fn alpha(&self, ctx: &ShadingCtx, stack: &NodeStack, sp: &SurfacePoint, wo: Vec3f) -> Float {
        match self {
            Material::Null => 0.0,
            Material::Glass { fake_shadow, .. } if *fake_shadow => {
                1.0 - self.transparency(ctx, stack, sp, wo).energy()
            }
            Material::Mask { .. } => {
                let chosen = self.mask_select(ctx, stack).unwrap();
                chosen.alpha(ctx, stack, sp, wo)
            }
            _ => 1.0,
        }
    }

    /// Scatter a photon arriving from `wi`. Fills `s.color` with the power
    /// tint `f·|cos|/pdf` and returns the outgoing direction. BSDFs here are
    /// reciprocal, so this reuses the radiance sampling path.
    pub fn scatter_photon(
        &self,
        ctx: &ShadingCtx,
        stack: &NodeStack,
        sp: &SurfacePoint,
        wi: Vec3f,
        s: &mut PhotonSample,
    ) -> Option<Vec3f> {
        // fold the lobe-selection dimension into s1 where materials expect it
        let mut inner = Sample::new(s.s3, s.s.s2, s.s.flags);
        // diffuse-style lobes stratify on (s1, s2)
        if !self
            .flags(ctx)
            .intersects(BsdfFlags::SPECULAR | BsdfFlags::FILTER)
        {
            inner = Sample::new(s.s.s1, s.s.s2, s.s.flags);
        }

        let result = self.sample(ctx, stack, sp, wi, &mut inner)?;
        s.s.pdf = inner.pdf;
        s.s.sampled_flags = inner.sampled_flags;
        s.color = result.weight;
        Some(result.wi)
    }
}

fn shading_normal(sp: &SurfacePoint, wo: Vec3f) -> Vec3f {
    if sp.ns.dot(wo) >= 0.0 {
        sp.ns
    } else {
        -sp.ns
    }
}

fn same_side(sp: &SurfacePoint, wo: Vec3f, wi: Vec3f) -> bool {
    (sp.ng.dot(wo) >= 0.0) == (sp.ng.dot(wi) >= 0.0)
}
