use log::{info, warn};
use openxr::sys;
use serde::{Deserialize, Serialize};

use crate::{XrhError, XrhResult};

/// An extension name and version, as advertised by the runtime or requested by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    /// Extension name, eg. `XR_KHR_opengl_es_enable`
    pub name: String,
    /// Extension version
    pub version: u32,
}

impl ExtensionDescriptor {
    /// Create a descriptor, checking that the name fits the runtime's fixed-size name field.
    pub fn new(name: &str, version: u32) -> XrhResult<Self> {
        // The runtime stores names NUL-terminated in MAX_EXTENSION_NAME_SIZE bytes.
        if name.len() >= sys::MAX_EXTENSION_NAME_SIZE || name.contains('\0') {
            return Err(XrhError::ExtensionNameTooLong(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    /// `true` if `available` advertises this extension with at least the requested version.
    pub fn is_supported_by(&self, available: &[ExtensionDescriptor]) -> bool {
        available
            .iter()
            .any(|a| a.name == self.name && self.version <= a.version)
    }
}

/// The four extension lists an instance keeps while negotiating.
#[derive(Debug, Default, Clone)]
pub(crate) struct Extensions {
    pub available: Vec<ExtensionDescriptor>,
    pub required: Vec<ExtensionDescriptor>,
    pub desired: Vec<ExtensionDescriptor>,
    pub enabled: Vec<ExtensionDescriptor>,
}

impl Extensions {
    /// Work out which extensions to enable given what the runtime advertises.
    ///
    /// Every required extension must be available, otherwise nothing is enabled and the missing
    /// names are returned. Desired extensions are enabled when available and skipped otherwise.
    pub fn negotiate(&mut self, available: Vec<ExtensionDescriptor>) -> XrhResult<()> {
        self.available = available;
        self.enabled.clear();

        let missing = self
            .required
            .iter()
            .filter(|r| !r.is_supported_by(&self.available))
            .inspect(|r| {
                warn!(
                    "[XRH_INSTANCE] Required extension not supported: {} (v{})",
                    r.name, r.version
                )
            })
            .map(|r| r.name.clone())
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(XrhError::ExtensionUnsupported(missing));
        }

        for required in &self.required {
            if !self.is_enabled(&required.name) {
                self.enabled.push(required.clone());
            }
        }

        for desired in &self.desired {
            if desired.is_supported_by(&self.available) {
                if !self.is_enabled(&desired.name) {
                    self.enabled.push(desired.clone());
                }
            } else {
                info!(
                    "[XRH_INSTANCE] Desired extension not supported: {} (v{})",
                    desired.name, desired.version
                );
            }
        }

        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|e| e.name == name)
    }
}
