use crate::color::Rgb;
use crate::primitive::SurfacePoint;
use crate::Float;

pub type NodeId = usize;

/// One node of the shading DAG. Nodes reference inputs by id, never by
/// pointer, and the builder only accepts ids smaller than the node's own, so
/// a single forward sweep evaluates the whole graph.
#[derive(Debug, Clone)]
pub enum ShaderNode {
    ConstColor(Rgb),
    ConstValue(Float),
    /// 3d checker over the original (object-space) coordinates.
    Checker {
        scale: Float,
        color1: Rgb,
        color2: Rgb,
    },
    /// 2d checker over the surface uv parametrization.
    CheckerUv {
        scale: Float,
        color1: Rgb,
        color2: Rgb,
    },
    Mix {
        a: NodeId,
        b: NodeId,
        factor: NodeId,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeResult {
    pub color: Rgb,
    pub value: Float,
}

/// Per-shade-point evaluation buffer: one slot per node, filled once at
/// `init_bsdf` so material eval/sample/pdf are plain lookups afterwards.
#[derive(Debug, Default)]
pub struct NodeStack {
    results: Vec<NodeResult>,
}

impl NodeStack {
    pub fn new() -> Self {
        Self { results: Vec::new() }
    }

    pub fn eval_all(&mut self, nodes: &[ShaderNode], sp: &SurfacePoint) {
        self.results.clear();
        self.results.reserve(nodes.len());

        for node in nodes {
            let result = match node {
                ShaderNode::ConstColor(c) => NodeResult { color: *c, value: c.energy() },
                ShaderNode::ConstValue(v) => NodeResult { color: Rgb::uniform(*v), value: *v },
                ShaderNode::Checker { scale, color1, color2 } => {
                    let p = sp.orco;
                    let parity = ((p.x * scale).floor() as i64
                        + (p.y * scale).floor() as i64
                        + (p.z * scale).floor() as i64)
                        & 1;
                    let c = if parity == 0 { *color1 } else { *color2 };
                    NodeResult { color: c, value: c.energy() }
                }
                ShaderNode::CheckerUv { scale, color1, color2 } => {
                    let parity = ((sp.uv.x * scale).floor() as i64
                        + (sp.uv.y * scale).floor() as i64)
                        & 1;
                    let c = if parity == 0 { *color1 } else { *color2 };
                    NodeResult { color: c, value: c.energy() }
                }
                ShaderNode::Mix { a, b, factor } => {
                    let fa = self.results[*a];
                    let fb = self.results[*b];
                    let t = self.results[*factor].value;
                    NodeResult {
                        color: Rgb::lerp(t, fa.color, fb.color),
                        value: crate::math::lerp(t, fa.value, fb.value),
                    }
                }
            };
            self.results.push(result);
        }
    }

    pub fn color(&self, id: NodeId) -> Rgb {
        self.results[id].color
    }

    pub fn value(&self, id: NodeId) -> Float {
        self.results[id].value
    }
}

/// A material colour slot: either a fixed value or a node output read from
/// the evaluated stack.
#[derive(Debug, Clone, Copy)]
pub enum ColorInput {
    Value(Rgb),
    Node(NodeId),
}

impl ColorInput {
    pub fn eval(&self, stack: &NodeStack) -> Rgb {
        match self {
            ColorInput::Value(c) => *c,
            ColorInput::Node(id) => stack.color(*id),
        }
    }
}
