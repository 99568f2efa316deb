//! The runtime call protocol.
//!
//! [`Runtime`] is the typed table of entry points the rest of the crate talks to. Every call
//! returns the runtime's raw result code on failure; [`check`] turns that into an [`XrhError`]
//! and logs it with the name of the call and the runtime's own description of the code.

use log::error;
use openxr::sys;

use crate::{ExtensionDescriptor, GraphicsBinding, XrhError, XrhResult};

mod gles;
mod openxr_runtime;
pub use openxr_runtime::OpenXrRuntime;

#[cfg(test)]
pub(crate) mod fake;

/// Result of a single runtime call.
pub type RuntimeResult<T> = std::result::Result<T, sys::Result>;

/// Application details handed to the runtime at instance creation.
#[derive(Debug, Clone)]
pub struct ApplicationInfo<'a> {
    /// Application name
    pub application_name: &'a str,
    /// Application version
    pub application_version: u32,
    /// Engine name
    pub engine_name: &'a str,
    /// Engine version
    pub engine_version: u32,
}

/// Name and version of the runtime behind an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeProperties {
    /// Runtime name
    pub name: String,
    /// Runtime version
    pub version: sys::Version,
}

/// What the runtime reports about the head mounted display.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemProperties {
    /// System name
    pub name: String,
    /// PCI vendor id
    pub vendor_id: u32,
    /// Largest swapchain width
    pub max_swapchain_width: u32,
    /// Largest swapchain height
    pub max_swapchain_height: u32,
    /// Most layers that can be submitted in a single frame
    pub max_layer_count: u32,
    /// Whether the system tracks orientation
    pub orientation_tracking: bool,
    /// Whether the system tracks position
    pub position_tracking: bool,
}

/// OpenGL ES versions the runtime accepts for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicsRequirements {
    /// Lowest supported version
    pub min_api_version: sys::Version,
    /// Highest tested version
    pub max_api_version: sys::Version,
}

/// One view of a view configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewDescriptor {
    /// Recommended image width
    pub recommended_width: u32,
    /// Recommended image height
    pub recommended_height: u32,
    /// Recommended sample count
    pub recommended_sample_count: u32,
    /// Largest image width
    pub max_width: u32,
    /// Largest image height
    pub max_height: u32,
    /// Largest sample count
    pub max_sample_count: u32,
}

/// Parameters for a new swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSpec {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Graphics API pixel format
    pub format: i64,
    /// Samples per pixel
    pub sample_count: u32,
}

impl SwapchainSpec {
    /// The image size as the runtime's signed extent, or `None` if a side doesn't fit.
    pub fn extent(&self) -> Option<sys::Extent2Di> {
        Some(sys::Extent2Di {
            width: i32::try_from(self.width).ok()?,
            height: i32::try_from(self.height).ok()?,
        })
    }
}

/// Frame timing returned by the runtime when it releases the application to render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// When the frame is predicted to hit the display
    pub predicted_display_time: sys::Time,
    /// Predicted interval between frames
    pub predicted_display_period: sys::Duration,
    /// Whether the runtime wants the application to render this frame
    pub should_render: bool,
}

/// A quad layer as handed to the runtime, with every reference resolved to a raw handle.
#[derive(Debug, Clone, Copy)]
pub struct QuadLayer {
    /// Space the pose is expressed in
    pub space: sys::Space,
    /// Source of the pixels
    pub swapchain: sys::Swapchain,
    /// Region of the swapchain image to show
    pub image_rect: sys::Rect2Di,
    /// Pose of the quad's centre
    pub pose: sys::Posef,
    /// Size of the quad in metres
    pub size: sys::Extent2Df,
}

/// Events the runtime may queue for the application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeEvent {
    /// A session moved to a new state
    SessionStateChanged {
        /// The session that changed
        session: sys::Session,
        /// Its new state
        state: sys::SessionState,
    },
    /// The instance is going away
    InstanceLossPending,
    /// Anything this layer does not act on
    Other,
}

/// The runtime call protocol.
///
/// Handles are plain runtime handles; ownership is tracked by the types that hold them.
pub trait Runtime {
    /// Every extension the runtime advertises.
    fn enumerate_extensions(&self) -> RuntimeResult<Vec<ExtensionDescriptor>>;
    /// Create an instance with exactly the given extensions enabled.
    fn create_instance(
        &self,
        app: &ApplicationInfo<'_>,
        extensions: &[&str],
    ) -> RuntimeResult<sys::Instance>;
    /// Destroy an instance.
    fn destroy_instance(&self, instance: sys::Instance) -> RuntimeResult<()>;
    /// Runtime name and version.
    fn instance_properties(&self, instance: sys::Instance) -> RuntimeResult<RuntimeProperties>;
    /// Look up the system for a form factor.
    fn system(
        &self,
        instance: sys::Instance,
        form_factor: sys::FormFactor,
    ) -> RuntimeResult<sys::SystemId>;
    /// Describe a system.
    fn system_properties(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
    ) -> RuntimeResult<SystemProperties>;
    /// OpenGL ES requirements; only valid with `XR_KHR_opengl_es_enable` enabled.
    fn graphics_requirements(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
    ) -> RuntimeResult<GraphicsRequirements>;
    /// View configuration types the system supports.
    fn view_configurations(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
    ) -> RuntimeResult<Vec<sys::ViewConfigurationType>>;
    /// The views of a view configuration.
    fn view_configuration_views(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
        ty: sys::ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewDescriptor>>;
    /// Whether the field of view of a view configuration may be changed by the application.
    fn view_configuration_fov_mutable(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
        ty: sys::ViewConfigurationType,
    ) -> RuntimeResult<bool>;
    /// Next queued event, if any.
    fn poll_event(&self, instance: sys::Instance) -> RuntimeResult<Option<RuntimeEvent>>;
    /// Translate a result code into the runtime's description of it.
    fn result_to_string(&self, instance: sys::Instance, result: sys::Result) -> String;

    /// Create a session bound to a graphics context.
    fn create_session(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
        binding: &GraphicsBinding,
    ) -> RuntimeResult<sys::Session>;
    /// Destroy a session.
    fn destroy_session(&self, session: sys::Session) -> RuntimeResult<()>;
    /// Start the session running.
    fn begin_session(
        &self,
        session: sys::Session,
        view_type: sys::ViewConfigurationType,
    ) -> RuntimeResult<()>;
    /// Stop the session running.
    fn end_session(&self, session: sys::Session) -> RuntimeResult<()>;
    /// Reference space types the session supports.
    fn reference_spaces(&self, session: sys::Session)
        -> RuntimeResult<Vec<sys::ReferenceSpaceType>>;
    /// Create a reference space.
    fn create_reference_space(
        &self,
        session: sys::Session,
        ty: sys::ReferenceSpaceType,
        pose: sys::Posef,
    ) -> RuntimeResult<sys::Space>;
    /// Destroy a space.
    fn destroy_space(&self, space: sys::Space) -> RuntimeResult<()>;

    /// Create a swapchain.
    fn create_swapchain(
        &self,
        session: sys::Session,
        spec: &SwapchainSpec,
    ) -> RuntimeResult<sys::Swapchain>;
    /// The images of a swapchain, as graphics API image names.
    fn swapchain_images(&self, swapchain: sys::Swapchain) -> RuntimeResult<Vec<u32>>;
    /// Destroy a swapchain.
    fn destroy_swapchain(&self, swapchain: sys::Swapchain) -> RuntimeResult<()>;
    /// Acquire the next image.
    fn acquire_image(&self, swapchain: sys::Swapchain) -> RuntimeResult<u32>;
    /// Wait for the acquired image to become writable. `Ok(false)` means the wait timed out.
    fn wait_image(&self, swapchain: sys::Swapchain, timeout: sys::Duration)
        -> RuntimeResult<bool>;
    /// Hand the acquired image back to the compositor.
    fn release_image(&self, swapchain: sys::Swapchain) -> RuntimeResult<()>;

    /// Block until the runtime wants the next frame.
    fn wait_frame(&self, session: sys::Session) -> RuntimeResult<FrameTiming>;
    /// Begin a frame.
    fn begin_frame(&self, session: sys::Session) -> RuntimeResult<()>;
    /// End a frame, submitting `layers` for composition.
    fn end_frame(
        &self,
        session: sys::Session,
        display_time: sys::Time,
        blend_mode: sys::EnvironmentBlendMode,
        layers: &[QuadLayer],
    ) -> RuntimeResult<()>;
}

/// Turn a runtime result into an [`XrhResult`], logging failures.
pub(crate) fn check<T>(
    runtime: &dyn Runtime,
    instance: sys::Instance,
    call: &'static str,
    result: RuntimeResult<T>,
) -> XrhResult<T> {
    result.map_err(|code| {
        let message = runtime.result_to_string(instance, code);
        error!("[XRH_RUNTIME] OpenXR error: {call}: ({}) {message}", code.into_raw());
        XrhError::RuntimeCallFailed {
            call,
            code,
            message,
        }
    })
}

/// Like [`check`], for calls whose failure does not block anything. Returns `None` on failure.
pub(crate) fn diagnostic<T>(
    runtime: &dyn Runtime,
    instance: sys::Instance,
    call: &'static str,
    result: RuntimeResult<T>,
) -> Option<T> {
    check(runtime, instance, call, result).ok()
}
