use std::fmt;

/// Failure kinds of the rendering core. Configuration and scene problems
/// abort before any pixel is rendered; everything per-ray is recovered
/// locally and only counted.
#[derive(Debug)]
pub enum RenderError {
    /// Unrecognized or contradictory parameters.
    Config(String),
    /// No camera, dangling indices, unknown object references.
    SceneBuild(String),
    /// NaN/Inf detected where it cannot be dropped (never raised per-sample).
    Numerical(String),
    /// A photon pass produced no usable photons.
    PhotonMapEmpty,
    ResourceExhausted(String),
    /// The cancellation flag was raised; partial output was flushed.
    Cancelled,
    Io(std::io::Error),
}

impl RenderError {
    /// Process exit code contract of the driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            RenderError::Cancelled => 1,
            RenderError::Config(_) => 2,
            RenderError::SceneBuild(_) => 3,
            RenderError::Io(_) => 4,
            // recovered kinds that still escalate map onto the generic
            // configuration slot
            RenderError::Numerical(_)
            | RenderError::PhotonMapEmpty
            | RenderError::ResourceExhausted(_) => 2,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RenderError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            RenderError::SceneBuild(msg) => write!(f, "scene build failed: {}", msg),
            RenderError::Numerical(msg) => write!(f, "numerical failure: {}", msg),
            RenderError::PhotonMapEmpty => write!(f, "photon map is empty"),
            RenderError::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            RenderError::Cancelled => write!(f, "render cancelled"),
            RenderError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RenderError {
    fn from(e: std::io::Error) -> Self {
        RenderError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(RenderError::Cancelled.exit_code(), 1);
        assert_eq!(RenderError::Config("x".into()).exit_code(), 2);
        assert_eq!(RenderError::SceneBuild("x".into()).exit_code(), 3);
        let io = RenderError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert_eq!(io.exit_code(), 4);
    }
}
