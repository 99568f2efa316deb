use std::rc::Rc;

use log::{debug, error};
use openxr::sys;

use crate::{
    runtime::{check, Runtime},
    XrhResult,
};

/// A coordinate frame created by, and owned by, a [`crate::Session`].
///
/// Reference spaces never change after creation.
pub struct ReferenceSpace {
    runtime: Rc<dyn Runtime>,
    instance: sys::Instance,
    session: sys::Session,
    handle: sys::Space,
    space_type: sys::ReferenceSpaceType,
    pose: sys::Posef,
}

impl ReferenceSpace {
    pub(crate) fn new(
        runtime: Rc<dyn Runtime>,
        instance: sys::Instance,
        session: sys::Session,
        handle: sys::Space,
        space_type: sys::ReferenceSpaceType,
        pose: sys::Posef,
    ) -> Self {
        Self {
            runtime,
            instance,
            session,
            handle,
            space_type,
            pose,
        }
    }

    /// The runtime handle
    pub fn handle(&self) -> sys::Space {
        self.handle
    }

    /// The session that owns this space
    pub fn session(&self) -> sys::Session {
        self.session
    }

    /// The kind of reference space
    pub fn space_type(&self) -> sys::ReferenceSpaceType {
        self.space_type
    }

    /// The pose of this space's origin within the reference space
    pub fn pose(&self) -> sys::Posef {
        self.pose
    }

    pub(crate) fn destroy(mut self) -> XrhResult<()> {
        self.release()
    }

    fn release(&mut self) -> XrhResult<()> {
        if self.handle == sys::Space::NULL {
            return Ok(());
        }
        let handle = std::mem::replace(&mut self.handle, sys::Space::NULL);
        debug!("[XRH_SPACE] Destroying {:?} space {handle:?}", self.space_type);
        check(
            self.runtime.as_ref(),
            self.instance,
            "xrDestroySpace",
            self.runtime.destroy_space(handle),
        )
    }
}

impl Drop for ReferenceSpace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("[XRH_SPACE] Unable to destroy space: {e}");
        }
    }
}

impl std::fmt::Debug for ReferenceSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceSpace")
            .field("handle", &self.handle)
            .field("space_type", &self.space_type)
            .field("pose", &self.pose)
            .finish()
    }
}
