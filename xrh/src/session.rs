use std::rc::Rc;

use generational_arena::{Arena, Index};
use log::{debug, error, info, warn};
use openxr::sys;

use crate::{
    runtime::{check, FrameTiming, QuadLayer, Runtime, SwapchainSpec},
    Layer, ReferenceSpace, Swapchain, XrhError, XrhResult, BLEND_MODE, VIEW_TYPE,
};

/// Identifies a [`ReferenceSpace`] owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceId(pub(crate) Index);

/// Identifies a [`Swapchain`] owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapchainId(pub(crate) Index);

/// The open frame bracket: everything between `begin_frame` and `end_frame`.
#[derive(Debug)]
struct Frame {
    timing: FrameTiming,
    layers: Vec<QuadLayer>,
}

/// A running connection between the application's graphics context and the compositor.
///
/// A session owns its reference spaces and swapchains. It follows the runtime's state machine
/// (fed to it by [`crate::Instance::poll_events`]) and only lets the application begin frames
/// while the runtime wants them.
pub struct Session {
    runtime: Rc<dyn Runtime>,
    instance: sys::Instance,
    handle: sys::Session,
    reference_space_types: Vec<sys::ReferenceSpaceType>,
    state: sys::SessionState,
    running: bool,
    frame: Option<Frame>,
    spaces: Arena<ReferenceSpace>,
    swapchains: Arena<Swapchain>,
    image_wait_timeout: sys::Duration,
}

impl Session {
    pub(crate) fn new(
        runtime: Rc<dyn Runtime>,
        instance: sys::Instance,
        handle: sys::Session,
    ) -> XrhResult<Self> {
        let mut session = Self {
            runtime,
            instance,
            handle,
            reference_space_types: Vec::new(),
            state: sys::SessionState::IDLE,
            running: false,
            frame: None,
            spaces: Arena::new(),
            swapchains: Arena::new(),
            image_wait_timeout: sys::Duration::INFINITE,
        };

        // On failure the session handle is released when `session` drops.
        session.reference_space_types = check(
            session.runtime.as_ref(),
            instance,
            "xrEnumerateReferenceSpaces",
            session.runtime.reference_spaces(handle),
        )?;
        debug!(
            "[XRH_SESSION] Supported reference spaces: {:?}",
            session.reference_space_types
        );

        Ok(session)
    }

    /// Create a reference space of a type this session supports.
    pub fn create_refspace(
        &mut self,
        space_type: sys::ReferenceSpaceType,
        pose: sys::Posef,
    ) -> XrhResult<SpaceId> {
        if !self.reference_space_types.contains(&space_type) {
            warn!("[XRH_SESSION] Reference space type {space_type:?} is not supported");
            return Err(XrhError::ReferenceSpaceTypeUnsupported(space_type));
        }

        let handle = check(
            self.runtime.as_ref(),
            self.instance,
            "xrCreateReferenceSpace",
            self.runtime
                .create_reference_space(self.handle, space_type, pose),
        )?;
        debug!("[XRH_SESSION] Created {space_type:?} space {handle:?}");

        let space = ReferenceSpace::new(
            self.runtime.clone(),
            self.instance,
            self.handle,
            handle,
            space_type,
            pose,
        );
        Ok(SpaceId(self.spaces.insert(space)))
    }

    /// Create a swapchain and enumerate its images.
    pub fn create_swapchain(
        &mut self,
        width: u32,
        height: u32,
        format: i64,
        sample_count: u32,
    ) -> XrhResult<SwapchainId> {
        let spec = SwapchainSpec {
            width,
            height,
            format,
            sample_count,
        };
        if spec.extent().is_none() {
            warn!("[XRH_SESSION] Swapchain size {width}x{height} is out of range");
            return Err(XrhError::SwapchainTooLarge { width, height });
        }
        let handle = self
            .runtime
            .create_swapchain(self.handle, &spec)
            .map_err(|code| {
                error!(
                    "[XRH_SESSION] Unable to create swapchain {spec:?}: {}",
                    self.runtime.result_to_string(self.instance, code)
                );
                XrhError::SwapchainCreationFailed(code)
            })?;

        let swapchain = Swapchain::new(
            self.runtime.clone(),
            self.instance,
            self.handle,
            handle,
            spec,
            self.image_wait_timeout,
        )?;
        Ok(SwapchainId(self.swapchains.insert(swapchain)))
    }

    /// Destroy one of this session's reference spaces.
    pub fn destroy_space(&mut self, id: SpaceId) -> XrhResult<()> {
        self.spaces
            .remove(id.0)
            .ok_or(XrhError::UnknownSpace)?
            .destroy()
    }

    /// Destroy one of this session's swapchains.
    pub fn destroy_swapchain(&mut self, id: SwapchainId) -> XrhResult<()> {
        self.swapchains
            .remove(id.0)
            .ok_or(XrhError::UnknownSwapchain)?
            .destroy()
    }

    /// Wait for the runtime to want a frame, then open the frame bracket.
    ///
    /// Returns [`XrhError::FrameNotReady`] without calling the runtime if the session isn't in a
    /// state that permits frames. If the runtime says this frame shouldn't be rendered, the
    /// bracket is closed with no layers and [`XrhError::FrameNotReady`] is returned too.
    pub fn begin_frame(&mut self) -> XrhResult<FrameTiming> {
        if self.frame.is_some() {
            return Err(XrhError::FrameInProgress);
        }
        if !self.permits_frames() {
            return Err(XrhError::FrameNotReady);
        }

        let timing = check(
            self.runtime.as_ref(),
            self.instance,
            "xrWaitFrame",
            self.runtime.wait_frame(self.handle),
        )?;
        check(
            self.runtime.as_ref(),
            self.instance,
            "xrBeginFrame",
            self.runtime.begin_frame(self.handle),
        )?;

        if !timing.should_render {
            debug!("[XRH_SESSION] Runtime asked us not to render this frame");
            self.submit(timing.predicted_display_time, &[])?;
            return Err(XrhError::FrameNotReady);
        }

        self.frame = Some(Frame {
            timing,
            layers: Vec::new(),
        });
        Ok(timing)
    }

    /// Add a layer to the open frame.
    ///
    /// The layer's swapchain and space must both belong to this session.
    pub fn add_layer(&mut self, layer: Layer) -> XrhResult<()> {
        if self.frame.is_none() {
            return Err(XrhError::NotInFrame);
        }
        let swapchain = self.swapchain(layer.swapchain)?;
        let space = self.space(layer.space)?;
        let quad = QuadLayer {
            space: space.handle(),
            swapchain: swapchain.handle(),
            image_rect: swapchain.image_rect(),
            pose: layer.pose,
            size: layer.size,
        };

        if let Some(frame) = self.frame.as_mut() {
            frame.layers.push(quad);
        }
        Ok(())
    }

    /// Close the frame bracket, submitting every layer added since [`Session::begin_frame`].
    pub fn end_frame(&mut self) -> XrhResult<()> {
        let frame = self.frame.take().ok_or(XrhError::NotInFrame)?;
        self.submit(frame.timing.predicted_display_time, &frame.layers)
    }

    /// When the open frame is predicted to be displayed.
    pub fn predicted_display_time(&self) -> XrhResult<sys::Time> {
        self.frame
            .as_ref()
            .map(|f| f.timing.predicted_display_time)
            .ok_or(XrhError::NotInFrame)
    }

    /// Follow the runtime into a new session state, beginning or ending the session as asked.
    pub fn handle_state_change(&mut self, state: sys::SessionState) -> XrhResult<()> {
        info!(
            "[XRH_SESSION] State changed from {:?} to {state:?}",
            self.state
        );
        self.state = state;

        match state {
            sys::SessionState::READY if !self.running => {
                check(
                    self.runtime.as_ref(),
                    self.instance,
                    "xrBeginSession",
                    self.runtime.begin_session(self.handle, VIEW_TYPE),
                )?;
                self.running = true;
                info!("[XRH_SESSION] Session began");
            }
            sys::SessionState::STOPPING if self.running => {
                if self.frame.take().is_some() {
                    warn!("[XRH_SESSION] Session stopping with a frame open; discarding it");
                }
                check(
                    self.runtime.as_ref(),
                    self.instance,
                    "xrEndSession",
                    self.runtime.end_session(self.handle),
                )?;
                self.running = false;
                info!("[XRH_SESSION] Session ended");
            }
            sys::SessionState::EXITING | sys::SessionState::LOSS_PENDING => {
                warn!("[XRH_SESSION] Session is going away: {state:?}");
            }
            _ => {}
        }

        Ok(())
    }

    /// `true` if [`Session::begin_frame`] would ask the runtime for a frame.
    pub fn permits_frames(&self) -> bool {
        self.running
            && matches!(
                self.state,
                sys::SessionState::READY
                    | sys::SessionState::SYNCHRONIZED
                    | sys::SessionState::VISIBLE
                    | sys::SessionState::FOCUSED
            )
    }

    /// The last state reported by the runtime
    pub fn state(&self) -> sys::SessionState {
        self.state
    }

    /// Whether the session has been begun and not yet ended
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The runtime handle
    pub fn handle(&self) -> sys::Session {
        self.handle
    }

    /// The instance that created this session
    pub fn instance(&self) -> sys::Instance {
        self.instance
    }

    /// Reference space types this session supports
    pub fn reference_space_types(&self) -> &[sys::ReferenceSpaceType] {
        &self.reference_space_types
    }

    /// Look up a reference space.
    pub fn space(&self, id: SpaceId) -> XrhResult<&ReferenceSpace> {
        self.spaces.get(id.0).ok_or(XrhError::UnknownSpace)
    }

    /// Look up a swapchain.
    pub fn swapchain(&self, id: SwapchainId) -> XrhResult<&Swapchain> {
        self.swapchains.get(id.0).ok_or(XrhError::UnknownSwapchain)
    }

    /// Look up a swapchain to acquire or release images.
    pub fn swapchain_mut(&mut self, id: SwapchainId) -> XrhResult<&mut Swapchain> {
        self.swapchains
            .get_mut(id.0)
            .ok_or(XrhError::UnknownSwapchain)
    }

    /// Number of live reference spaces
    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    /// Number of live swapchains
    pub fn swapchain_count(&self) -> usize {
        self.swapchains.len()
    }

    /// How long swapchain image waits may block, for this session's current and future
    /// swapchains.
    pub fn set_image_wait_timeout(&mut self, timeout: sys::Duration) {
        self.image_wait_timeout = timeout;
        for (_, swapchain) in self.swapchains.iter_mut() {
            swapchain.set_wait_timeout(timeout);
        }
    }

    pub(crate) fn destroy(mut self) -> XrhResult<()> {
        if !self.spaces.is_empty() || !self.swapchains.is_empty() {
            return Err(XrhError::ChildrenAlive {
                spaces: self.spaces.len(),
                swapchains: self.swapchains.len(),
            });
        }
        self.release()
    }

    fn submit(&self, display_time: sys::Time, layers: &[QuadLayer]) -> XrhResult<()> {
        check(
            self.runtime.as_ref(),
            self.instance,
            "xrEndFrame",
            self.runtime
                .end_frame(self.handle, display_time, BLEND_MODE, layers),
        )
    }

    /// Destroy the session along with any spaces and swapchains it still owns.
    pub(crate) fn teardown(mut self) -> XrhResult<()> {
        self.release()
    }

    /// Children go first. A failed destroy doesn't stop the rest; the first error is returned.
    fn release(&mut self) -> XrhResult<()> {
        if self.handle == sys::Session::NULL {
            return Ok(());
        }

        let mut result = Ok(());
        for (_, swapchain) in self.swapchains.drain() {
            result = result.and(swapchain.destroy());
        }
        for (_, space) in self.spaces.drain() {
            result = result.and(space.destroy());
        }

        let handle = std::mem::replace(&mut self.handle, sys::Session::NULL);
        debug!("[XRH_SESSION] Destroying session {handle:?}");
        self.frame = None;
        result.and(check(
            self.runtime.as_ref(),
            self.instance,
            "xrDestroySession",
            self.runtime.destroy_session(handle),
        ))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("[XRH_SESSION] Unable to destroy session: {e}");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("running", &self.running)
            .field("in_frame", &self.frame.is_some())
            .field("spaces", &self.spaces.len())
            .field("swapchains", &self.swapchains.len())
            .finish()
    }
}
