use log::{debug, error};
use openxr::sys;

use crate::{
    layer::QuadLayout, runtime::FrameTiming, Layer, Renderer, Session, SpaceId, SwapchainId,
    XrhConfig, XrhError, XrhResult,
};

/// What happened in one iteration of the [`FrameLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A layer showing `image_index` was submitted
    Submitted {
        /// The swapchain image that was rendered
        image_index: usize,
    },
    /// Nothing was rendered this time round
    Skipped,
}

/// Drives one quad layer through the frame protocol each iteration.
#[derive(Debug, Clone)]
pub struct FrameLoop {
    skipped: u32,
    skip_log_interval: u32,
    layout: QuadLayout,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new(60, Default::default())
    }
}

impl FrameLoop {
    /// A frame loop that logs every `skip_log_interval` consecutive skipped frames.
    pub fn new(skip_log_interval: u32, layout: QuadLayout) -> Self {
        Self {
            skipped: 0,
            skip_log_interval: skip_log_interval.max(1),
            layout,
        }
    }

    /// A frame loop set up from `config`.
    pub fn from_config(config: &XrhConfig) -> Self {
        Self::new(config.skip_log_interval, config.quad)
    }

    /// Run a single frame.
    ///
    /// If the session isn't ready for a frame nothing is acquired or submitted and
    /// [`FrameOutcome::Skipped`] is returned. Once a frame has begun it is always ended, with no
    /// layers if rendering didn't complete.
    pub fn run_iteration<R: Renderer + ?Sized>(
        &mut self,
        session: &mut Session,
        swapchain: SwapchainId,
        space: SpaceId,
        renderer: &mut R,
    ) -> XrhResult<FrameOutcome> {
        let timing = match session.begin_frame() {
            Err(XrhError::FrameNotReady) => {
                self.skip(session.state());
                return Ok(FrameOutcome::Skipped);
            }
            result => result?,
        };
        if self.skipped > 0 {
            debug!("[XRH_FRAME] Rendering again after {} skipped frames", self.skipped);
            self.skipped = 0;
        }

        match self.render(session, swapchain, space, renderer, timing) {
            Ok(image_index) => {
                session.end_frame()?;
                Ok(FrameOutcome::Submitted { image_index })
            }
            Err(XrhError::ImageWaitTimeout(_)) => {
                session.end_frame()?;
                self.skip(session.state());
                Ok(FrameOutcome::Skipped)
            }
            Err(e) => {
                if let Err(end) = session.end_frame() {
                    error!("[XRH_FRAME] Unable to end frame after failure: {end}");
                }
                Err(e)
            }
        }
    }

    /// Consecutive frames skipped so far
    pub fn skipped_frames(&self) -> u32 {
        self.skipped
    }

    fn render<R: Renderer + ?Sized>(
        &self,
        session: &mut Session,
        swapchain: SwapchainId,
        space: SpaceId,
        renderer: &mut R,
        timing: FrameTiming,
    ) -> XrhResult<usize> {
        let image_index = session.swapchain_mut(swapchain)?.acquire_and_wait_image()?;

        let drawn = renderer
            .render(image_index)
            .map_err(XrhError::Other)
            .and_then(|_| {
                let pose = renderer
                    .layer_pose(timing.predicted_display_time)
                    .unwrap_or_else(|| self.layout.pose());
                session.add_layer(Layer::quad(
                    swapchain,
                    space,
                    pose,
                    self.layout.width,
                    self.layout.height,
                ))
            });

        // The image goes back whether or not it was drawn.
        session.swapchain_mut(swapchain)?.release_image()?;
        drawn.map(|_| image_index)
    }

    fn skip(&mut self, state: sys::SessionState) {
        self.skipped = self.skipped.saturating_add(1);
        if self.skipped % self.skip_log_interval == 0 {
            debug!(
                "[XRH_FRAME] Skipped {} frames in a row, session is {state:?}",
                self.skipped
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        app::tests::TestRenderer,
        runtime::fake::FakeRuntime,
        Instance, Runtime, SessionId, COLOR_FORMAT, KHR_OPENGL_ES_ENABLE,
    };

    struct Fixture {
        runtime: Rc<FakeRuntime>,
        instance: Instance,
        session: SessionId,
        swapchain: SwapchainId,
        space: SpaceId,
    }

    fn fixture() -> Fixture {
        let runtime = Rc::new(FakeRuntime::new());
        let dyn_runtime: Rc<dyn Runtime> = runtime.clone();
        let mut instance = Instance::new(dyn_runtime, "Frame Loop Test", 1);
        instance
            .add_required_extension(KHR_OPENGL_ES_ENABLE, 1)
            .unwrap();
        instance.create().unwrap();
        instance
            .set_gfx_binding(std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null_mut())
            .unwrap();
        let session_id = instance.create_session().unwrap();
        let session = instance.session_mut(session_id).unwrap();
        let space = session
            .create_refspace(sys::ReferenceSpaceType::LOCAL, QuadLayout::default().pose())
            .unwrap();
        let swapchain = session
            .create_swapchain(1024, 1024, COLOR_FORMAT, 1)
            .unwrap();

        Fixture {
            runtime,
            instance,
            session: session_id,
            swapchain,
            space,
        }
    }

    impl Fixture {
        fn start(&mut self) {
            let handle = self.instance.session(self.session).unwrap().handle();
            self.runtime.push_state(handle, sys::SessionState::READY);
            self.runtime.push_state(handle, sys::SessionState::SYNCHRONIZED);
            self.runtime.push_state(handle, sys::SessionState::VISIBLE);
            self.runtime.push_state(handle, sys::SessionState::FOCUSED);
            self.instance.poll_events().unwrap();
        }

        fn iterate(
            &mut self,
            frame_loop: &mut FrameLoop,
            renderer: &mut TestRenderer,
        ) -> XrhResult<FrameOutcome> {
            let session = self.instance.session_mut(self.session).unwrap();
            frame_loop.run_iteration(session, self.swapchain, self.space, renderer)
        }
    }

    #[test]
    pub fn test_idle_session_is_skipped() {
        let mut fixture = fixture();
        let mut frame_loop = FrameLoop::default();
        let mut renderer = TestRenderer::default();
        fixture.runtime.clear_calls();

        for _ in 0..3 {
            assert_eq!(
                fixture.iterate(&mut frame_loop, &mut renderer).unwrap(),
                FrameOutcome::Skipped
            );
        }
        assert_eq!(frame_loop.skipped_frames(), 3);
        assert_eq!(fixture.runtime.calls_to("acquire_image"), 0);
        assert_eq!(fixture.runtime.calls_to("end_frame"), 0);
        assert!(renderer.rendered.is_empty());
    }

    #[test]
    pub fn test_frames_are_submitted() {
        let mut fixture = fixture();
        fixture.start();
        let mut frame_loop = FrameLoop::default();
        let mut renderer = TestRenderer::default();

        assert_eq!(
            fixture.iterate(&mut frame_loop, &mut renderer).unwrap(),
            FrameOutcome::Submitted { image_index: 0 }
        );
        assert_eq!(
            fixture.iterate(&mut frame_loop, &mut renderer).unwrap(),
            FrameOutcome::Submitted { image_index: 1 }
        );
        assert_eq!(renderer.rendered, vec![0, 1]);

        let state = fixture.runtime.state();
        assert_eq!(state.submitted.len(), 2);
        let layer = state.submitted[1][0];
        let default_pose = QuadLayout::default().pose();
        assert_eq!(layer.pose.position.z, default_pose.position.z);
        assert_eq!(layer.size.width, QuadLayout::default().width);
        assert_eq!(state.calls.iter().filter(|c| **c == "release_image").count(), 2);
    }

    #[test]
    pub fn test_renderer_can_pose_the_quad() {
        let mut fixture = fixture();
        fixture.start();
        let mut frame_loop = FrameLoop::default();
        let mut renderer = TestRenderer {
            pose: Some(QuadLayout {
                distance: 5.0,
                ..Default::default()
            }),
            ..Default::default()
        };

        fixture.iterate(&mut frame_loop, &mut renderer).unwrap();
        let state = fixture.runtime.state();
        assert_eq!(state.submitted[0][0].pose.position.z, -5.0);
    }

    #[test]
    pub fn test_image_timeout_closes_frame_without_layers() {
        let mut fixture = fixture();
        fixture.start();
        fixture.runtime.state_mut().wait_timeouts = 1;
        let mut frame_loop = FrameLoop::default();
        let mut renderer = TestRenderer::default();

        assert_eq!(
            fixture.iterate(&mut frame_loop, &mut renderer).unwrap(),
            FrameOutcome::Skipped
        );
        assert!(renderer.rendered.is_empty());
        assert!(fixture.runtime.state().submitted[0].is_empty());

        // The same image is waited on again next frame.
        assert_eq!(
            fixture.iterate(&mut frame_loop, &mut renderer).unwrap(),
            FrameOutcome::Submitted { image_index: 0 }
        );
        assert_eq!(frame_loop.skipped_frames(), 0);
        assert_eq!(fixture.runtime.calls_to("acquire_image"), 1);
    }

    #[test]
    pub fn test_render_failure_still_ends_frame() {
        let mut fixture = fixture();
        fixture.start();
        let mut frame_loop = FrameLoop::default();
        let mut renderer = TestRenderer {
            fail: true,
            ..Default::default()
        };

        assert!(matches!(
            fixture.iterate(&mut frame_loop, &mut renderer),
            Err(XrhError::Other(_))
        ));
        assert_eq!(fixture.runtime.calls_to("release_image"), 1);
        assert_eq!(fixture.runtime.calls_to("end_frame"), 1);
        assert!(fixture.runtime.state().submitted[0].is_empty());

        // The session is left ready for the next frame.
        renderer.fail = false;
        assert!(fixture.iterate(&mut frame_loop, &mut renderer).is_ok());
    }
}
