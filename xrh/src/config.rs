use std::path::Path;

use log::info;
use openxr::sys;
use serde::{Deserialize, Serialize};

use crate::{
    layer::QuadLayout, ExtensionDescriptor, XrhError, XrhResult, COLOR_FORMAT,
    KHR_OPENGL_ES_ENABLE,
};

/// Which reference space the quad layer is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSpaceKind {
    /// Head locked
    View,
    /// Seated, origin at the initial head position
    Local,
    /// Standing, origin on the floor
    Stage,
}

impl ReferenceSpaceKind {
    /// The OpenXR reference space type
    pub fn to_sys(self) -> sys::ReferenceSpaceType {
        match self {
            ReferenceSpaceKind::View => sys::ReferenceSpaceType::VIEW,
            ReferenceSpaceKind::Local => sys::ReferenceSpaceType::LOCAL,
            ReferenceSpaceKind::Stage => sys::ReferenceSpaceType::STAGE,
        }
    }
}

/// Everything an application can tune, from code or from a TOML file.
///
/// ```
/// use xrh::{ReferenceSpaceKind, XrhConfig};
///
/// let mut config = XrhConfig::default();
/// config
///     .application_name("Quad Viewer")
///     .reference_space(ReferenceSpaceKind::Stage)
///     .desired_extension("XR_FB_display_refresh_rate", 1);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XrhConfig {
    /// Application name reported to the runtime
    pub application_name: String,
    /// Application version reported to the runtime
    pub application_version: u32,
    /// Engine name reported to the runtime
    pub engine_name: String,
    /// Engine version reported to the runtime
    pub engine_version: u32,
    /// Extensions instance creation fails without
    pub required_extensions: Vec<ExtensionDescriptor>,
    /// Extensions enabled when the runtime has them
    pub desired_extensions: Vec<ExtensionDescriptor>,
    /// Space the quad layer is placed in
    pub reference_space: ReferenceSpaceKind,
    /// Height of the reference space origin, in metres
    pub reference_space_height: f32,
    /// Swapchain pixel format
    pub swapchain_format: i64,
    /// Swapchain sample count; the runtime's recommendation when unset
    pub sample_count: Option<u32>,
    /// How long to wait for a swapchain image before skipping the frame; forever when unset
    pub image_wait_timeout_ms: Option<u64>,
    /// Log every this many consecutive skipped frames
    pub skip_log_interval: u32,
    /// Where the quad layer goes
    pub quad: QuadLayout,
}

impl Default for XrhConfig {
    fn default() -> Self {
        Self {
            application_name: "xrh".to_string(),
            application_version: 1,
            engine_name: "xrh".to_string(),
            engine_version: 1,
            required_extensions: vec![ExtensionDescriptor {
                name: KHR_OPENGL_ES_ENABLE.to_string(),
                version: 1,
            }],
            desired_extensions: Vec::new(),
            reference_space: ReferenceSpaceKind::Local,
            reference_space_height: 0.0,
            swapchain_format: COLOR_FORMAT,
            sample_count: None,
            image_wait_timeout_ms: None,
            skip_log_interval: 60,
            quad: Default::default(),
        }
    }
}

impl XrhConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(toml: &str) -> XrhResult<Self> {
        let config: Self = toml::from_str(toml).map_err(|e| XrhError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> XrhResult<Self> {
        let path = path.as_ref();
        info!("[XRH_CONFIG] Loading configuration from {}", path.display());
        let toml = std::fs::read_to_string(path)?;
        Self::from_toml_str(&toml)
    }

    /// Check the values make sense together.
    pub fn validate(&self) -> XrhResult<()> {
        if self.application_name.is_empty() {
            return Err(XrhError::Config("application_name is empty".to_string()));
        }
        for e in self
            .required_extensions
            .iter()
            .chain(self.desired_extensions.iter())
        {
            ExtensionDescriptor::new(&e.name, e.version)?;
        }
        if self.sample_count == Some(0) {
            return Err(XrhError::Config("sample_count must be at least 1".to_string()));
        }
        if self.skip_log_interval == 0 {
            return Err(XrhError::Config(
                "skip_log_interval must be at least 1".to_string(),
            ));
        }
        if self.quad.width <= 0.0 || self.quad.height <= 0.0 {
            return Err(XrhError::Config(format!(
                "quad size {}x{} is not positive",
                self.quad.width, self.quad.height
            )));
        }
        Ok(())
    }

    /// The image wait timeout as an OpenXR duration
    pub fn image_wait_timeout(&self) -> sys::Duration {
        match self.image_wait_timeout_ms {
            Some(ms) => sys::Duration::from_nanos(ms.saturating_mul(1_000_000) as i64),
            None => sys::Duration::INFINITE,
        }
    }

    /// The pose of the reference space origin
    pub fn reference_space_pose(&self) -> sys::Posef {
        sys::Posef {
            orientation: sys::Quaternionf {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: 1.0,
            },
            position: sys::Vector3f {
                x: 0.0,
                y: self.reference_space_height,
                z: 0.0,
            },
        }
    }

    /// Set the application name
    pub fn application_name(&mut self, name: &str) -> &mut Self {
        self.application_name = name.to_string();
        self
    }

    /// Set the application version
    pub fn application_version(&mut self, version: u32) -> &mut Self {
        self.application_version = version;
        self
    }

    /// Require an extension
    pub fn required_extension(&mut self, name: &str, version: u32) -> &mut Self {
        self.required_extensions.push(ExtensionDescriptor {
            name: name.to_string(),
            version,
        });
        self
    }

    /// Ask for an extension if the runtime has it
    pub fn desired_extension(&mut self, name: &str, version: u32) -> &mut Self {
        self.desired_extensions.push(ExtensionDescriptor {
            name: name.to_string(),
            version,
        });
        self
    }

    /// Choose the reference space
    pub fn reference_space(&mut self, kind: ReferenceSpaceKind) -> &mut Self {
        self.reference_space = kind;
        self
    }

    /// Override the swapchain sample count
    pub fn sample_count(&mut self, sample_count: Option<u32>) -> &mut Self {
        self.sample_count = sample_count;
        self
    }

    /// Give up on swapchain images after `ms` milliseconds
    pub fn image_wait_timeout_ms(&mut self, ms: Option<u64>) -> &mut Self {
        self.image_wait_timeout_ms = ms;
        self
    }

    /// Place the quad
    pub fn quad(&mut self, quad: QuadLayout) -> &mut Self {
        self.quad = quad;
        self
    }
}
