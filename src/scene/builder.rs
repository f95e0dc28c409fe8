use crate::accel::KdTree;
use crate::background::Background;
use crate::camera::Camera;
use crate::color::Rgb;
use crate::error::RenderError;
use crate::geometry::Transform;
use crate::light::{AreaLight, BackgroundLight, Light, MeshLight};
use crate::material::{ColorInput, Material, NodeId, ShaderNode};
use crate::primitive::mesh::{Triangle, TriangleMesh};
use crate::primitive::sphere::Sphere;
use crate::primitive::{Instance, LightId, MaterialId, ObjectId, Primitive};
use crate::scene::{Scene, VolumeEntry};
use crate::volume::{AttenuationGrid, VolumeRegion};
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::Matrix4;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

enum ObjectKind {
    Mesh(TriangleMesh),
    Sphere {
        center: Point3f,
        radius: Float,
        material: MaterialId,
    },
}

struct ObjectRecord {
    name: String,
    kind: ObjectKind,
}

struct MeshInProgress {
    name: String,
    positions: Vec<Point3f>,
    normals: Vec<Vec3f>,
    uvs: Vec<Point2f>,
    orco: Vec<Point3f>,
    faces: Vec<[u32; 3]>,
    material: MaterialId,
    smooth_angle: Option<Float>,
}

enum PendingLight {
    Ready(Box<dyn Light>),
    Mesh {
        object: String,
        color: Rgb,
        samples: u32,
        double_sided: bool,
    },
}

/// Incremental scene assembly, the mutable half of the construction API.
/// All cross references are by name or id; `build` resolves and validates
/// them and freezes the result.
pub struct SceneBuilder {
    materials: Vec<Material>,
    material_names: HashMap<String, MaterialId>,
    nodes: Vec<ShaderNode>,
    lights: Vec<PendingLight>,
    objects: Vec<ObjectRecord>,
    object_names: HashMap<String, ObjectId>,
    /// Back-references from objects to the light emitting from them.
    object_lights: HashMap<String, LightId>,
    instances: Vec<(String, Transform)>,
    volumes: Vec<Box<dyn VolumeRegion>>,
    background: Option<Background>,
    background_ibl_samples: Option<u32>,
    camera: Option<Box<dyn Camera>>,
    current: Option<MeshInProgress>,
    current_material: MaterialId,
    revision: u64,
    shadow_bias: Float,
    ray_min_dist: Float,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self {
            // material slot 0 is the fallback gray
            materials: vec![Material::Lambert {
                diffuse: ColorInput::Value(Rgb::uniform(0.7)),
                emit: Rgb::BLACK,
            }],
            material_names: HashMap::new(),
            nodes: Vec::new(),
            lights: Vec::new(),
            objects: Vec::new(),
            object_names: HashMap::new(),
            object_lights: HashMap::new(),
            instances: Vec::new(),
            volumes: Vec::new(),
            background: None,
            background_ibl_samples: None,
            camera: None,
            current: None,
            current_material: 0,
            revision: 0,
            shadow_bias: 5e-4,
            ray_min_dist: 5e-5,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn set_numerics(&mut self, shadow_bias: Float, ray_min_dist: Float) -> &mut Self {
        self.shadow_bias = shadow_bias;
        self.ray_min_dist = ray_min_dist;
        self
    }

    pub fn add_material(&mut self, name: &str, material: Material) -> MaterialId {
        self.touch();
        let id = self.materials.len();
        self.materials.push(material);
        self.material_names.insert(name.to_string(), id);
        id
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.material_names.get(name).copied()
    }

    pub fn set_current_material(&mut self, id: MaterialId) {
        self.current_material = id;
    }

    pub fn add_shader_node(&mut self, node: ShaderNode) -> NodeId {
        self.touch();
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_light(&mut self, light: Box<dyn Light>) -> LightId {
        self.touch();
        self.lights.push(PendingLight::Ready(light));
        self.lights.len() - 1
    }

    /// Parallelogram emitter: registers the light and a matching
    /// two-triangle mesh so BSDF rays can hit it.
    pub fn add_area_light(
        &mut self,
        name: &str,
        corner: Point3f,
        to_x: Vec3f,
        to_y: Vec3f,
        color: Rgb,
        samples: u32,
    ) -> LightId {
        self.touch();
        let light = AreaLight::new(corner, to_x, to_y, color, samples);
        let [c0, c1, c2, c3] = light.corners();
        let light_id = self.lights.len();
        self.lights.push(PendingLight::Ready(Box::new(light)));

        let material = self.add_material(
            &format!("{}.emit", name),
            Material::Lambert {
                diffuse: ColorInput::Value(Rgb::BLACK),
                emit: color,
            },
        );

        let mesh = TriangleMesh::new(vec![c0, c1, c2, c3], vec![[0, 1, 2], [0, 2, 3]], material);
        self.object_names.insert(name.to_string(), self.objects.len());
        self.object_lights.insert(name.to_string(), light_id);
        self.objects.push(ObjectRecord {
            name: name.to_string(),
            kind: ObjectKind::Mesh(mesh),
        });
        light_id
    }

    /// Makes an existing mesh object emissive.
    pub fn add_mesh_light(
        &mut self,
        object: &str,
        color: Rgb,
        samples: u32,
        double_sided: bool,
    ) -> LightId {
        self.touch();
        let light_id = self.lights.len();
        self.lights.push(PendingLight::Mesh {
            object: object.to_string(),
            color,
            samples,
            double_sided,
        });
        self.object_lights.insert(object.to_string(), light_id);
        light_id
    }

    pub fn add_volume_region(&mut self, region: Box<dyn VolumeRegion>) {
        self.touch();
        self.volumes.push(region);
    }

    pub fn set_background(&mut self, background: Background, ibl_samples: Option<u32>) {
        self.touch();
        self.background = Some(background);
        self.background_ibl_samples = ibl_samples;
    }

    pub fn set_camera(&mut self, camera: Box<dyn Camera>) {
        self.touch();
        self.camera = Some(camera);
    }

    pub fn create_object(&mut self, name: &str) {
        self.touch();
        self.current = Some(MeshInProgress {
            name: name.to_string(),
            positions: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            orco: Vec::new(),
            faces: Vec::new(),
            material: self.current_material,
            smooth_angle: None,
        });
    }

    pub fn add_vertex(&mut self, p: Point3f) {
        if let Some(mesh) = &mut self.current {
            mesh.positions.push(p);
        }
    }

    pub fn add_vertex_orco(&mut self, p: Point3f, orco: Point3f) {
        if let Some(mesh) = &mut self.current {
            mesh.positions.push(p);
            mesh.orco.push(orco);
        }
    }

    pub fn add_normal(&mut self, n: Vec3f) {
        if let Some(mesh) = &mut self.current {
            mesh.normals.push(n);
        }
    }

    pub fn add_uv(&mut self, uv: Point2f) {
        if let Some(mesh) = &mut self.current {
            mesh.uvs.push(uv);
        }
    }

    /// Adds a polygon as a triangle fan.
    pub fn add_face(&mut self, indices: &[u32]) {
        if let Some(mesh) = &mut self.current {
            for i in 1..indices.len().saturating_sub(1) {
                mesh.faces.push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    pub fn smooth_normals(&mut self, angle_degrees: Float) {
        if let Some(mesh) = &mut self.current {
            mesh.smooth_angle = Some(angle_degrees);
        }
    }

    pub fn end_object(&mut self) -> Option<ObjectId> {
        self.touch();
        let in_progress = self.current.take()?;
        let id = self.objects.len();

        let mut mesh = TriangleMesh::new(in_progress.positions, in_progress.faces, in_progress.material);
        if !in_progress.normals.is_empty() {
            mesh.vertex_normals = Some(in_progress.normals);
        }
        if !in_progress.uvs.is_empty() {
            mesh.uvs = Some(in_progress.uvs);
        }
        if !in_progress.orco.is_empty() {
            mesh.orco = Some(in_progress.orco);
        }
        if let Some(angle) = in_progress.smooth_angle {
            mesh.smooth_normals(angle);
        }

        self.object_names.insert(in_progress.name.clone(), id);
        self.objects.push(ObjectRecord {
            name: in_progress.name,
            kind: ObjectKind::Mesh(mesh),
        });
        Some(id)
    }

    pub fn add_sphere(&mut self, name: &str, center: Point3f, radius: Float, material: MaterialId) -> ObjectId {
        self.touch();
        let id = self.objects.len();
        self.object_names.insert(name.to_string(), id);
        self.objects.push(ObjectRecord {
            name: name.to_string(),
            kind: ObjectKind::Sphere { center, radius, material },
        });
        id
    }

    pub fn add_instance(&mut self, base: &str, matrix: Matrix4<Float>) {
        self.touch();
        match Transform::from_mat(matrix) {
            Some(t) => self.instances.push((base.to_string(), t)),
            None => {
                // keep the record so build() reports it as a scene error
                self.instances.push((base.to_string(), Transform::IDENTITY));
                warn!(%base, "singular instance matrix");
            }
        }
    }

    pub fn build(mut self) -> Result<Scene, RenderError> {
        let camera = self
            .camera
            .take()
            .ok_or_else(|| RenderError::SceneBuild("no camera".into()))?;

        // validate shader node graph is a forward-referencing DAG
        for (i, node) in self.nodes.iter().enumerate() {
            if let ShaderNode::Mix { a, b, factor } = node {
                if *a >= i || *b >= i || *factor >= i {
                    return Err(RenderError::SceneBuild(format!(
                        "shader node {} references a later node",
                        i
                    )));
                }
            }
        }

        // validate material cross references
        for material in &self.materials {
            if let Material::Mask { a, b, mask, .. } = material {
                if *a >= self.materials.len() || *b >= self.materials.len() {
                    return Err(RenderError::SceneBuild("mask references missing material".into()));
                }
                if *mask >= self.nodes.len() {
                    return Err(RenderError::SceneBuild("mask references missing node".into()));
                }
            }
        }

        // finalize meshes
        let mut object_prims: Vec<Vec<Arc<dyn Primitive>>> = Vec::with_capacity(self.objects.len());
        let mut meshes: HashMap<String, Arc<TriangleMesh>> = HashMap::new();

        for record in &mut self.objects {
            let light = self.object_lights.get(&record.name).copied();
            match &mut record.kind {
                ObjectKind::Mesh(mesh) => {
                    let n_verts = mesh.positions.len() as u32;
                    for face in &mesh.indices {
                        if face.iter().any(|&i| i >= n_verts) {
                            return Err(RenderError::SceneBuild(format!(
                                "object '{}': face index out of range",
                                record.name
                            )));
                        }
                    }
                    if mesh.material >= self.materials.len() {
                        return Err(RenderError::SceneBuild(format!(
                            "object '{}': unknown material",
                            record.name
                        )));
                    }
                    mesh.light = light;
                }
                ObjectKind::Sphere { material, .. } => {
                    if *material >= self.materials.len() {
                        return Err(RenderError::SceneBuild(format!(
                            "object '{}': unknown material",
                            record.name
                        )));
                    }
                }
            }
        }

        for record in self.objects {
            let prims: Vec<Arc<dyn Primitive>> = match record.kind {
                ObjectKind::Mesh(mesh) => {
                    let mesh = Arc::new(mesh);
                    meshes.insert(record.name.clone(), Arc::clone(&mesh));
                    (0..mesh.n_triangles() as u32)
                        .map(|i| Arc::new(Triangle::new(Arc::clone(&mesh), i)) as Arc<dyn Primitive>)
                        .collect()
                }
                ObjectKind::Sphere { center, radius, material } => {
                    let light = self.object_lights.get(&record.name).copied();
                    let mut sphere = Sphere::new(center, radius, material);
                    sphere.light = light;
                    vec![Arc::new(sphere) as Arc<dyn Primitive>]
                }
            };
            object_prims.push(prims);
        }

        // resolve lights
        let mut lights: Vec<Box<dyn Light>> = Vec::with_capacity(self.lights.len());
        for pending in self.lights {
            match pending {
                PendingLight::Ready(light) => lights.push(light),
                PendingLight::Mesh { object, color, samples, double_sided } => {
                    let mesh = meshes.get(&object).ok_or_else(|| {
                        RenderError::SceneBuild(format!(
                            "mesh light references unknown object '{}'",
                            object
                        ))
                    })?;
                    lights.push(Box::new(MeshLight::new(
                        Arc::clone(mesh),
                        color,
                        samples,
                        double_sided,
                    )));
                }
            }
        }

        if let (Some(bg), Some(samples)) = (&self.background, self.background_ibl_samples) {
            lights.push(Box::new(BackgroundLight::new(bg.clone(), samples)));
        }

        // flatten primitives; instances wrap the base object's primitives
        let mut prims: Vec<Arc<dyn Primitive>> = object_prims.iter().flatten().cloned().collect();
        for (base, transform) in &self.instances {
            let base_id = *self.object_names.get(base).ok_or_else(|| {
                RenderError::SceneBuild(format!("instance references unknown object '{}'", base))
            })?;
            for prim in &object_prims[base_id] {
                prims.push(Arc::new(Instance::new(Arc::clone(prim), *transform)));
            }
        }

        info!(
            prims = prims.len(),
            lights = lights.len(),
            volumes = self.volumes.len(),
            "building scene accelerator"
        );
        let accel = KdTree::build(prims);
        let world_bound = accel.world_bound();

        for light in &mut lights {
            light.init(world_bound);
        }

        // attenuation grids for positional lights
        let volumes: Vec<VolumeEntry> = self
            .volumes
            .into_iter()
            .map(|region| {
                let attenuation = lights
                    .iter()
                    .map(|light| {
                        light
                            .position()
                            .map(|pos| AttenuationGrid::build(region.as_ref(), pos, 0.05))
                    })
                    .collect();
                VolumeEntry { region, attenuation }
            })
            .collect();

        Ok(Scene::from_parts(
            self.materials,
            self.nodes,
            lights,
            volumes,
            self.background,
            camera,
            accel,
            self.revision,
            self.shadow_bias,
            self.ray_min_dist,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::geometry::Ray;
    use crate::Point2i;

    fn test_camera() -> Box<dyn Camera> {
        Box::new(PerspectiveCamera::new(
            Point3f::new(0.0, 0.0, 5.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            60.0,
            Point2i::new(32, 32),
            None,
        ))
    }

    #[test]
    fn missing_camera_fails_build() {
        let builder = SceneBuilder::new();
        match builder.build() {
            Err(e) => assert_eq!(e.exit_code(), 3),
            Ok(_) => panic!("expected scene build failure"),
        }
    }

    #[test]
    fn empty_scene_builds() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        let scene = builder.build().unwrap();
        let mut ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, -1.0));
        assert!(scene.intersect(&mut ray).is_none());
    }

    #[test]
    fn face_index_out_of_range_fails() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        builder.create_object("bad");
        builder.add_vertex(Point3f::new(0.0, 0.0, 0.0));
        builder.add_vertex(Point3f::new(1.0, 0.0, 0.0));
        builder.add_face(&[0, 1, 7]);
        builder.end_object();
        assert!(builder.build().is_err());
    }

    #[test]
    fn quad_face_becomes_two_triangles() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        builder.create_object("quad");
        builder.add_vertex(Point3f::new(-1.0, -1.0, 0.0));
        builder.add_vertex(Point3f::new(1.0, -1.0, 0.0));
        builder.add_vertex(Point3f::new(1.0, 1.0, 0.0));
        builder.add_vertex(Point3f::new(-1.0, 1.0, 0.0));
        builder.add_face(&[0, 1, 2, 3]);
        builder.end_object();
        let scene = builder.build().unwrap();
        assert_eq!(scene.accel().n_prims(), 2);

        let mut ray = Ray::new(Point3f::new(0.2, 0.3, 5.0), Vec3f::new(0.0, 0.0, -1.0));
        assert!(scene.intersect(&mut ray).is_some());
    }

    #[test]
    fn instance_of_unknown_object_fails() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        builder.add_instance("ghost", Matrix4::from_scale(1.0));
        assert!(builder.build().is_err());
    }

    #[test]
    fn instanced_sphere_is_hit() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        builder.add_sphere("ball", Point3f::new(0.0, 0.0, 0.0), 1.0, 0);
        builder.add_instance("ball", Matrix4::from_translation(Vec3f::new(4.0, 0.0, 0.0)));
        let scene = builder.build().unwrap();
        assert_eq!(scene.accel().n_prims(), 2);

        let mut ray = Ray::new(Point3f::new(4.0, 0.0, 5.0), Vec3f::new(0.0, 0.0, -1.0));
        assert!(scene.intersect(&mut ray).is_some());
    }

    #[test]
    fn area_light_has_geometry_and_backref() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(test_camera());
        let light_id = builder.add_area_light(
            "panel",
            Point3f::new(-0.5, 2.0, -0.5),
            Vec3f::new(1.0, 0.0, 0.0),
            Vec3f::new(0.0, 0.0, 1.0),
            Rgb::uniform(5.0),
            4,
        );
        let scene = builder.build().unwrap();
        assert_eq!(scene.lights.len(), 1);

        let mut ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 1.0, 0.0));
        let sp = scene.intersect(&mut ray).expect("panel geometry should be hit");
        assert_eq!(sp.light, Some(light_id));
    }
}
