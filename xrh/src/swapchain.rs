use std::rc::Rc;

use log::{debug, error, warn};
use openxr::sys;

use crate::{
    runtime::{check, Runtime, SwapchainSpec},
    XrhError, XrhResult,
};

/// Where the swapchain is in the acquire/wait/release cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquisition {
    /// Acquired, but the last wait timed out.
    Waiting(usize),
    /// Acquired and writable.
    Ready(usize),
}

/// A pool of render target images owned by a [`crate::Session`].
///
/// Only one image may be held at a time: [`Swapchain::acquire_and_wait_image`] must be followed
/// by [`Swapchain::release_image`] before the next acquisition.
pub struct Swapchain {
    runtime: Rc<dyn Runtime>,
    instance: sys::Instance,
    session: sys::Session,
    handle: sys::Swapchain,
    spec: SwapchainSpec,
    extent: sys::Extent2Di,
    images: Vec<u32>,
    acquired: Option<Acquisition>,
    wait_timeout: sys::Duration,
}

impl Swapchain {
    pub(crate) fn new(
        runtime: Rc<dyn Runtime>,
        instance: sys::Instance,
        session: sys::Session,
        handle: sys::Swapchain,
        spec: SwapchainSpec,
        wait_timeout: sys::Duration,
    ) -> XrhResult<Self> {
        let mut swapchain = Self {
            runtime,
            instance,
            session,
            handle,
            spec,
            extent: Default::default(),
            images: Vec::new(),
            acquired: None,
            wait_timeout,
        };

        // On failure the handle is released when `swapchain` drops.
        swapchain.extent = spec.extent().ok_or(XrhError::SwapchainTooLarge {
            width: spec.width,
            height: spec.height,
        })?;
        swapchain.images = check(
            swapchain.runtime.as_ref(),
            instance,
            "xrEnumerateSwapchainImages",
            swapchain.runtime.swapchain_images(handle),
        )?;
        debug!(
            "[XRH_SWAPCHAIN] Created {}x{} swapchain with {} images",
            spec.width,
            spec.height,
            swapchain.images.len()
        );

        Ok(swapchain)
    }

    /// Acquire the next image and block until it can be written to.
    ///
    /// Fails with [`XrhError::ImageAlreadyAcquired`] if the previous image has not been released.
    /// A wait that times out returns [`XrhError::ImageWaitTimeout`]; the image stays acquired and
    /// the next call waits on it again rather than acquiring another.
    pub fn acquire_and_wait_image(&mut self) -> XrhResult<usize> {
        let index = match self.acquired {
            Some(Acquisition::Ready(index)) => {
                error!("[XRH_SWAPCHAIN] Image {index} acquired again before being released");
                return Err(XrhError::ImageAlreadyAcquired(index));
            }
            Some(Acquisition::Waiting(index)) => index,
            None => {
                let index = check(
                    self.runtime.as_ref(),
                    self.instance,
                    "xrAcquireSwapchainImage",
                    self.runtime.acquire_image(self.handle),
                )? as usize;
                self.acquired = Some(Acquisition::Waiting(index));
                index
            }
        };

        let ready = check(
            self.runtime.as_ref(),
            self.instance,
            "xrWaitSwapchainImage",
            self.runtime.wait_image(self.handle, self.wait_timeout),
        )?;
        if !ready {
            warn!("[XRH_SWAPCHAIN] Timed out waiting for image {index}");
            return Err(XrhError::ImageWaitTimeout(index));
        }

        self.acquired = Some(Acquisition::Ready(index));
        Ok(index)
    }

    /// Hand the acquired image back to the compositor.
    pub fn release_image(&mut self) -> XrhResult<()> {
        let Some(Acquisition::Ready(index)) = self.acquired else {
            return Err(XrhError::NoImageAcquired);
        };
        check(
            self.runtime.as_ref(),
            self.instance,
            "xrReleaseSwapchainImage",
            self.runtime.release_image(self.handle),
        )?;
        debug!("[XRH_SWAPCHAIN] Released image {index}");
        self.acquired = None;
        Ok(())
    }

    /// The image currently held, if it is ready to be written.
    pub fn acquired_image(&self) -> Option<usize> {
        match self.acquired {
            Some(Acquisition::Ready(index)) => Some(index),
            _ => None,
        }
    }

    /// The graphics API names of the images, indexed by the values returned from
    /// [`Swapchain::acquire_and_wait_image`].
    pub fn images(&self) -> &[u32] {
        &self.images
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.spec.width
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.spec.height
    }

    /// Pixel format
    pub fn format(&self) -> i64 {
        self.spec.format
    }

    /// Samples per pixel
    pub fn sample_count(&self) -> u32 {
        self.spec.sample_count
    }

    /// The runtime handle
    pub fn handle(&self) -> sys::Swapchain {
        self.handle
    }

    /// The session that owns this swapchain
    pub fn session(&self) -> sys::Session {
        self.session
    }

    /// How long [`Swapchain::acquire_and_wait_image`] waits before giving up on a frame.
    pub fn set_wait_timeout(&mut self, timeout: sys::Duration) {
        self.wait_timeout = timeout;
    }

    /// The whole image, for use as a layer's sub image.
    pub(crate) fn image_rect(&self) -> sys::Rect2Di {
        sys::Rect2Di {
            offset: sys::Offset2Di { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    pub(crate) fn destroy(mut self) -> XrhResult<()> {
        self.release()
    }

    fn release(&mut self) -> XrhResult<()> {
        if self.handle == sys::Swapchain::NULL {
            return Ok(());
        }
        if let Some(acquired) = self.acquired.take() {
            warn!("[XRH_SWAPCHAIN] Destroying swapchain while {acquired:?} is held");
        }
        let handle = std::mem::replace(&mut self.handle, sys::Swapchain::NULL);
        debug!("[XRH_SWAPCHAIN] Destroying swapchain {handle:?}");
        check(
            self.runtime.as_ref(),
            self.instance,
            "xrDestroySwapchain",
            self.runtime.destroy_swapchain(handle),
        )
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("[XRH_SWAPCHAIN] Unable to destroy swapchain: {e}");
        }
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("handle", &self.handle)
            .field("spec", &self.spec)
            .field("images", &self.images)
            .field("acquired", &self.acquired)
            .finish()
    }
}
