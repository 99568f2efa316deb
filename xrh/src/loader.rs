use std::{
    path::Path,
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
};

use log::{error, info};

use crate::{
    runtime::{OpenXrRuntime, Runtime},
    XrhError, XrhResult,
};

/// Set once the loader has been brought up in this process.
static LOADER_INITIALISED: AtomicBool = AtomicBool::new(false);

/// The bridge to the system's OpenXR loader. Must exist before any [`crate::Instance`].
///
/// Only one loader may be initialised per process; a second attempt fails with
/// [`XrhError::LoaderAlreadyInitialised`].
pub struct Loader {
    runtime: Rc<OpenXrRuntime>,
}

impl Loader {
    /// Load the platform's default OpenXR loader library.
    pub fn load() -> XrhResult<Self> {
        Self::bring_up(|| unsafe { openxr::Entry::load() })
    }

    /// Load the OpenXR loader library at `path`.
    pub fn load_from(path: &Path) -> XrhResult<Self> {
        info!("[XRH_LOADER] Loading OpenXR loader from {}", path.display());
        Self::bring_up(|| unsafe { openxr::Entry::load_from(path) })
    }

    /// Load the loader and run the Android bootstrap with the application's VM and activity.
    ///
    /// # Safety
    /// `vm` must be the process' `JavaVM` and `context` a global reference to its activity.
    #[cfg(target_os = "android")]
    pub unsafe fn init(
        vm: *mut std::ffi::c_void,
        context: *mut std::ffi::c_void,
    ) -> XrhResult<Self> {
        claim()?;
        let entry = openxr::Entry::load().map_err(|e| {
            release_claim();
            error!("[XRH_LOADER] Unable to load the OpenXR loader: {e}");
            XrhError::LoaderUnavailable(e.to_string())
        })?;
        if let Err(e) = OpenXrRuntime::initialize_android_loader(&entry, vm, context) {
            release_claim();
            error!("[XRH_LOADER] Loader bootstrap failed: {e}");
            return Err(e);
        }
        info!("[XRH_LOADER] Android loader initialised");
        Ok(Self::from_entry(entry))
    }

    fn bring_up(
        load: impl FnOnce() -> Result<openxr::Entry, openxr::LoadError>,
    ) -> XrhResult<Self> {
        claim()?;
        let entry = load().map_err(|e| {
            release_claim();
            error!("[XRH_LOADER] Unable to load the OpenXR loader: {e}");
            XrhError::LoaderUnavailable(e.to_string())
        })?;
        Ok(Self::from_entry(entry))
    }

    fn from_entry(entry: openxr::Entry) -> Self {
        info!("[XRH_LOADER] OpenXR loader ready");
        Self {
            runtime: Rc::new(OpenXrRuntime::new(entry)),
        }
    }

    /// The runtime's entry point table, to hand to [`crate::Instance::new`].
    pub fn runtime(&self) -> Rc<dyn Runtime> {
        self.runtime.clone()
    }
}

fn claim() -> XrhResult<()> {
    LOADER_INITIALISED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .map(drop)
        .map_err(|_| {
            error!("[XRH_LOADER] The OpenXR loader has already been initialised");
            XrhError::LoaderAlreadyInitialised
        })
}

fn release_claim() {
    LOADER_INITIALISED.store(false, Ordering::Release);
}
