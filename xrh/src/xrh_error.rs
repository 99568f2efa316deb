use openxr::sys::{ReferenceSpaceType, Result as OpenXRResult};
use thiserror::Error;

/// Everything that can go wrong between an application and the runtime.
#[derive(Error, Debug)]
pub enum XrhError {
    #[error("The OpenXR loader could not be loaded: {0}")]
    LoaderUnavailable(String),
    #[error("The OpenXR loader has already been initialised")]
    LoaderAlreadyInitialised,
    #[error("The runtime does not provide the entry point {0}")]
    MissingEntryPoint(&'static str),
    #[error("Required extensions are not supported by the runtime: {}", .0.join(", "))]
    ExtensionUnsupported(Vec<String>),
    #[error("Extension name {0} is too long")]
    ExtensionNameTooLong(String),
    #[error("The runtime refused to create an instance ({0})")]
    InstanceCreationFailed(OpenXRResult),
    #[error("No head mounted display system is available ({0})")]
    SystemNotFound(OpenXRResult),
    #[error("The runtime has no primary stereo view configuration with two views")]
    ViewConfigUnsupported,
    #[error("The runtime refused to create a session ({0})")]
    SessionCreationFailed(OpenXRResult),
    #[error("Reference space type {0:?} is not supported by this session")]
    ReferenceSpaceTypeUnsupported(ReferenceSpaceType),
    #[error("The runtime refused to create a swapchain ({0})")]
    SwapchainCreationFailed(OpenXRResult),
    #[error("A {width}x{height} swapchain is larger than the runtime can address")]
    SwapchainTooLarge { width: u32, height: u32 },
    #[error("The session is not ready to begin a frame")]
    FrameNotReady,
    #[error("{call} failed: {message} ({code})")]
    RuntimeCallFailed {
        call: &'static str,
        code: OpenXRResult,
        message: String,
    },
    #[error("The instance has already been created")]
    AlreadyCreated,
    #[error("The instance has not been created")]
    NotCreated,
    #[error("No graphics binding has been set")]
    GraphicsBindingMissing,
    #[error("The session still owns {spaces} reference spaces and {swapchains} swapchains")]
    ChildrenAlive { spaces: usize, swapchains: usize },
    #[error("The instance still owns {0} sessions")]
    SessionsAlive(usize),
    #[error("Swapchain image {0} is still acquired")]
    ImageAlreadyAcquired(usize),
    #[error("No swapchain image is acquired")]
    NoImageAcquired,
    #[error("Timed out waiting for swapchain image {0}")]
    ImageWaitTimeout(usize),
    #[error("There is no frame in progress")]
    NotInFrame,
    #[error("A frame is already in progress")]
    FrameInProgress,
    #[error("There is no such session")]
    UnknownSession,
    #[error("There is no such reference space in this session")]
    UnknownSpace,
    #[error("There is no such swapchain in this session")]
    UnknownSwapchain,
    #[error("The runtime is about to lose the instance")]
    InstanceLost,
    #[error("The session is exiting")]
    SessionExiting,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl XrhError {
    /// Errors that only mean "try again next frame".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            XrhError::FrameNotReady | XrhError::ImageWaitTimeout(_)
        )
    }
}
