//! Backend selection with CPU fallback.

use std::fmt;
use std::str::FromStr;

use crate::{CpuRenderer, Renderer, RendererKind};

/// Requested rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// GPU when available, CPU otherwise.
    #[default]
    Auto,
    Gpu,
    Cpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Auto => write!(f, "auto"),
            Backend::Gpu => write!(f, "gpu"),
            Backend::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "gpu" => Ok(Backend::Gpu),
            "cpu" => Ok(Backend::Cpu),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// The renderer picked by [`select_renderer`].
pub struct RendererSelection {
    pub renderer: Box<dyn Renderer>,
    /// Why the requested backend was not used, if it was not.
    pub status: Option<String>,
}

impl RendererSelection {
    #[must_use]
    pub fn kind(&self) -> RendererKind {
        self.renderer.kind()
    }
}

impl fmt::Debug for RendererSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererSelection")
            .field("kind", &self.kind())
            .field("status", &self.status)
            .finish()
    }
}

fn cpu(status: Option<String>) -> RendererSelection {
    RendererSelection {
        renderer: Box::new(CpuRenderer::new()),
        status,
    }
}

/// Create a renderer for `backend`.
///
/// Any GPU failure, including shader or pipeline creation, falls back to
/// the CPU renderer and records the reason in `status`. The returned
/// renderer always reports its real kind.
#[must_use]
pub fn select_renderer(backend: Backend) -> RendererSelection {
    if backend == Backend::Cpu {
        return cpu(None);
    }
    #[cfg(feature = "gpu")]
    {
        match crate::GpuRenderer::new() {
            Ok(gpu) => RendererSelection {
                renderer: Box::new(gpu),
                status: None,
            },
            Err(e) => {
                log::warn!("GPU renderer unavailable, using CPU: {e}");
                cpu(Some(format!("GPU unavailable, using CPU renderer ({e})")))
            }
        }
    }
    #[cfg(not(feature = "gpu"))]
    {
        log::debug!("built without GPU support, using CPU renderer");
        let status = (backend == Backend::Gpu)
            .then(|| "GPU support not compiled in, using CPU renderer".to_string());
        cpu(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_requested() {
        let selection = select_renderer(Backend::Cpu);
        assert_eq!(selection.kind(), RendererKind::Cpu);
        assert!(selection.status.is_none());
    }

    #[test]
    fn test_auto_reports_true_kind() {
        let selection = select_renderer(Backend::Auto);
        match selection.kind() {
            RendererKind::Gpu => assert!(selection.status.is_none()),
            RendererKind::Cpu => {}
        }
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("GPU".parse::<Backend>().unwrap(), Backend::Gpu);
        assert!("webgl".parse::<Backend>().is_err());
    }
}
