use std::{
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
    thread::sleep,
    time::Duration,
};

use log::{error, info, trace, warn};
use openxr::sys;

use crate::{
    FrameLoop, FrameOutcome, GraphicsBinding, Instance, Runtime, Session, SessionId, SpaceId,
    SwapchainId, XrhConfig, XrhError, XrhResult,
};

/// How long to back off while there's nothing to render.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// The application's side of rendering: owns the graphics context and draws into swapchain
/// images.
pub trait Renderer {
    /// The EGL objects sessions should render with.
    fn graphics_binding(&self) -> GraphicsBinding;

    /// Called once the swapchain exists, with the texture names of its images.
    fn set_swapchain_images(&mut self, width: u32, height: u32, images: &[u32])
        -> anyhow::Result<()>;

    /// Process any pending input. Called once per tick, before rendering.
    fn handle_input(&mut self) {}

    /// Draw into the swapchain image at `image_index`.
    fn render(&mut self, image_index: usize) -> anyhow::Result<()>;

    /// Where to put the quad for a frame displayed at `display_time`. `None` uses the configured
    /// layout.
    fn layer_pose(&self, _display_time: sys::Time) -> Option<sys::Posef> {
        None
    }
}

/// Platform lifecycle commands this layer reacts to.
#[derive(Debug)]
pub enum AppCommand<R> {
    /// A drawing surface exists, with a renderer bound to it
    SurfaceCreated(R),
    /// The drawing surface is going away
    SurfaceDestroyed,
    /// Anything else, ignored
    Other,
}

/// Everything that exists while a drawing surface does: the instance, its session, one reference
/// space, one swapchain and the renderer drawing into it.
pub struct ActiveSession<R> {
    // Declared first so it is dropped before the renderer's graphics context.
    instance: Instance,
    session: SessionId,
    space: SpaceId,
    swapchain: SwapchainId,
    frame_loop: FrameLoop,
    renderer: R,
}

impl<R: Renderer> ActiveSession<R> {
    /// Build the whole chain, bound to `renderer`'s graphics context.
    ///
    /// Anything already created is torn down again if a later step fails.
    pub fn create(runtime: Rc<dyn Runtime>, config: &XrhConfig, mut renderer: R) -> XrhResult<Self> {
        let mut instance = Instance::from_config(runtime, config)?;
        instance.create()?;

        let binding = renderer.graphics_binding();
        instance.set_gfx_binding(binding.display, binding.config, binding.context)?;
        let session_id = instance.create_session()?;

        let (width, height) = instance
            .recommended_image_size()
            .ok_or(XrhError::NotCreated)?;
        let sample_count = config
            .sample_count
            .or_else(|| instance.recommended_sample_count())
            .unwrap_or(1);

        let session = instance.session_mut(session_id)?;
        session.set_image_wait_timeout(config.image_wait_timeout());
        let space = session.create_refspace(
            config.reference_space.to_sys(),
            config.reference_space_pose(),
        )?;
        let swapchain =
            session.create_swapchain(width, height, config.swapchain_format, sample_count)?;

        renderer
            .set_swapchain_images(width, height, session.swapchain(swapchain)?.images())
            .map_err(XrhError::Other)?;
        info!("[XRH_APP] Session ready, rendering {width}x{height} with {sample_count} samples");

        Ok(Self {
            instance,
            session: session_id,
            space,
            swapchain,
            frame_loop: FrameLoop::from_config(config),
            renderer,
        })
    }

    /// Handle runtime events, then run one frame.
    ///
    /// Returns [`XrhError::SessionExiting`] once the runtime is done with the session.
    pub fn tick(&mut self) -> XrhResult<FrameOutcome> {
        for (id, state) in self.instance.poll_events()? {
            if id == self.session
                && matches!(
                    state,
                    sys::SessionState::EXITING | sys::SessionState::LOSS_PENDING
                )
            {
                return Err(XrhError::SessionExiting);
            }
        }

        self.renderer.handle_input();
        let session = self.instance.session_mut(self.session)?;
        self.frame_loop
            .run_iteration(session, self.swapchain, self.space, &mut self.renderer)
    }

    /// Destroy everything, children first.
    pub fn teardown(mut self) -> XrhResult<()> {
        let session = self.instance.session_mut(self.session)?;
        session.destroy_swapchain(self.swapchain)?;
        session.destroy_space(self.space)?;
        self.instance.destroy_session(self.session)?;
        self.instance.destroy()?;
        info!("[XRH_APP] Session torn down");
        Ok(())
    }

    /// The instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The session
    pub fn session(&self) -> XrhResult<&Session> {
        self.instance.session(self.session)
    }

    /// The renderer
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The renderer, mutably
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// The frame loop
    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }
}

/// Ties the platform lifecycle to an [`ActiveSession`].
pub struct App<R> {
    runtime: Rc<dyn Runtime>,
    config: XrhConfig,
    active: Option<ActiveSession<R>>,
}

impl<R: Renderer> App<R> {
    /// An app with no drawing surface yet.
    pub fn new(runtime: Rc<dyn Runtime>, config: XrhConfig) -> Self {
        Self {
            runtime,
            config,
            active: None,
        }
    }

    /// React to a lifecycle command.
    pub fn handle_command(&mut self, command: AppCommand<R>) -> XrhResult<()> {
        match command {
            AppCommand::SurfaceCreated(renderer) => {
                if let Some(previous) = self.active.take() {
                    warn!("[XRH_APP] New surface while a session is active; replacing it");
                    previous.teardown()?;
                }
                self.active = Some(ActiveSession::create(
                    self.runtime.clone(),
                    &self.config,
                    renderer,
                )?);
            }
            AppCommand::SurfaceDestroyed => {
                if let Some(active) = self.active.take() {
                    active.teardown()?;
                }
            }
            AppCommand::Other => trace!("[XRH_APP] Ignoring command"),
        }
        Ok(())
    }

    /// Run one frame if there's an active session. A session the runtime has finished with is
    /// torn down before [`XrhError::SessionExiting`] is returned.
    pub fn tick(&mut self) -> XrhResult<Option<FrameOutcome>> {
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        match active.tick() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e @ (XrhError::SessionExiting | XrhError::InstanceLost)) => {
                if let Some(active) = self.active.take() {
                    if let Err(teardown) = active.teardown() {
                        error!("[XRH_APP] Unable to tear down session: {teardown}");
                    }
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Pump platform events and tick until `should_quit` is set or the session exits.
    pub fn run(
        &mut self,
        should_quit: &AtomicBool,
        mut pump: impl FnMut(&mut Self) -> XrhResult<()>,
    ) -> XrhResult<()> {
        while !should_quit.load(Ordering::Acquire) {
            pump(self)?;
            match self.tick() {
                Ok(Some(FrameOutcome::Submitted { .. })) => {}
                Ok(_) => {
                    if !self.is_rendering() {
                        sleep(IDLE_SLEEP);
                    }
                }
                Err(XrhError::SessionExiting) => {
                    info!("[XRH_APP] Session exited");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(active) = self.active.take() {
            active.teardown()?;
        }
        info!("[XRH_APP] Exiting");
        Ok(())
    }

    /// The active session, if there's a drawing surface
    pub fn active(&self) -> Option<&ActiveSession<R>> {
        self.active.as_ref()
    }

    /// The active session, mutably
    pub fn active_mut(&mut self) -> Option<&mut ActiveSession<R>> {
        self.active.as_mut()
    }

    fn is_rendering(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|a| a.session().ok())
            .map(|s| s.permits_frames())
            .unwrap_or(false)
    }
}
