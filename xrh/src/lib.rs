#![warn(missing_docs)]
#![allow(clippy::missing_safety_doc)]

//! `xrh` binds an application to an OpenXR runtime driving a stereo head mounted display.
//!
//! It negotiates capabilities with the runtime, owns the handles it creates (instance, session,
//! reference spaces and swapchains) and drives the per-frame protocol that submits composition
//! layers to the compositor.
//!
//! # Getting started
//! ```no_run
//! use xrh::{Instance, Loader, XrhConfig};
//!
//! # fn main() -> xrh::XrhResult<()> {
//! let loader = Loader::load()?;
//! let config = XrhConfig::default();
//! let mut instance = Instance::from_config(loader.runtime(), &config)?;
//! instance.create()?;
//! println!("Recommended size: {:?}", instance.recommended_image_size());
//! # Ok(())
//! # }
//! ```
//!
//! Handles form a strict tree: an [`Instance`] owns its [`Session`]s, and each [`Session`] owns its
//! [`ReferenceSpace`]s and [`Swapchain`]s. Children are addressed through typed ids and must be
//! destroyed before their parent; the checked destroy operations reject anything else.

pub use openxr as xr;
pub use openxr::sys;

pub use app::{ActiveSession, App, AppCommand, Renderer};
pub use config::{ReferenceSpaceKind, XrhConfig};
pub use extension::ExtensionDescriptor;
pub use frame_loop::{FrameLoop, FrameOutcome};
pub use instance::{GraphicsBinding, Instance, SessionId};
pub use layer::{Layer, QuadLayout};
pub use loader::Loader;
pub use runtime::Runtime;
pub use session::{Session, SpaceId, SwapchainId};
pub use space::ReferenceSpace;
pub use swapchain::Swapchain;
pub use xrh_error::XrhError;

/// The platform lifecycle handler and the active session slot
pub mod app;
/// Configuration, from code or TOML
pub mod config;
mod extension;
mod frame_loop;
mod instance;
mod layer;
mod loader;
/// Android platform glue: lifecycle events and the input filter
#[cfg(target_os = "android")]
pub mod platform;
/// The runtime call protocol and its implementations
pub mod runtime;
mod session;
mod space;
mod swapchain;
mod xrh_error;

/// xrh result type
pub type XrhResult<T> = std::result::Result<T, XrhError>;

/// Number of views in the only supported view configuration
pub const VIEW_COUNT: usize = 2;

/// OpenXR view configuration type
pub const VIEW_TYPE: sys::ViewConfigurationType = sys::ViewConfigurationType::PRIMARY_STEREO;

/// OpenXR form factor
pub const FORM_FACTOR: sys::FormFactor = sys::FormFactor::HEAD_MOUNTED_DISPLAY;

/// OpenXR blend mode
pub const BLEND_MODE: sys::EnvironmentBlendMode = sys::EnvironmentBlendMode::OPAQUE;

/// Format used for color swapchains (`GL_SRGB8_ALPHA8`)
pub const COLOR_FORMAT: i64 = 0x8C43;

/// The extension that enables OpenGL ES graphics bindings
pub const KHR_OPENGL_ES_ENABLE: &str = "XR_KHR_opengl_es_enable";
