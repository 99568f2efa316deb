use std::{ffi::c_void, ptr};

use openxr::{self as xr, sys};

use super::GraphicsRequirements;
use crate::GraphicsBinding;

/// The OpenGL ES graphics API, as enabled by `XR_KHR_opengl_es_enable`.
///
/// `openxr` only ships Vulkan, OpenGL and D3D11 bindings, so sessions and swapchains for EGL
/// contexts go through this.
pub enum OpenGlEs {}

fn cvt(result: sys::Result) -> xr::Result<sys::Result> {
    if result.into_raw() >= 0 {
        Ok(result)
    } else {
        Err(result)
    }
}

impl xr::Graphics for OpenGlEs {
    type Requirements = GraphicsRequirements;
    type SessionCreateInfo = GraphicsBinding;
    type Format = i64;
    type SwapchainImage = u32;

    fn raise_format(x: i64) -> i64 {
        x
    }

    fn lower_format(x: i64) -> i64 {
        x
    }

    fn requirements(
        instance: &xr::Instance,
        system: xr::SystemId,
    ) -> xr::Result<GraphicsRequirements> {
        let gles = instance
            .exts()
            .khr_opengl_es_enable
            .as_ref()
            .ok_or(sys::Result::ERROR_EXTENSION_NOT_PRESENT)?;
        let requirements = unsafe {
            let mut out = sys::GraphicsRequirementsOpenGLESKHR::out(ptr::null_mut());
            cvt((gles.get_open_gles_graphics_requirements)(
                instance.as_raw(),
                system,
                out.as_mut_ptr(),
            ))?;
            out.assume_init()
        };
        Ok(GraphicsRequirements {
            min_api_version: requirements.min_api_version_supported,
            max_api_version: requirements.max_api_version_supported,
        })
    }

    unsafe fn create_session(
        instance: &xr::Instance,
        system: xr::SystemId,
        binding: &GraphicsBinding,
    ) -> xr::Result<sys::Session> {
        #[cfg(target_os = "android")]
        let graphics_binding = sys::GraphicsBindingOpenGLESAndroidKHR {
            ty: sys::GraphicsBindingOpenGLESAndroidKHR::TYPE,
            next: ptr::null(),
            display: binding.display,
            config: binding.config,
            context: binding.context,
        };
        #[cfg(target_os = "android")]
        let next = &graphics_binding as *const _ as *const c_void;

        // Off Android there is no EGL binding to chain; only headless runtimes accept this.
        #[cfg(not(target_os = "android"))]
        let next: *const c_void = {
            log::debug!("[XRH_RUNTIME] Ignoring graphics binding {binding:?} on this platform");
            ptr::null()
        };

        let info = sys::SessionCreateInfo {
            ty: sys::SessionCreateInfo::TYPE,
            next,
            create_flags: Default::default(),
            system_id: system,
        };
        let mut session = sys::Session::NULL;
        cvt((instance.fp().create_session)(
            instance.as_raw(),
            &info,
            &mut session,
        ))?;
        Ok(session)
    }

    fn enumerate_swapchain_images(swapchain: &xr::Swapchain<Self>) -> xr::Result<Vec<u32>> {
        let enumerate = swapchain.instance().fp().enumerate_swapchain_images;
        let empty = sys::SwapchainImageOpenGLESKHR {
            ty: sys::SwapchainImageOpenGLESKHR::TYPE,
            next: ptr::null_mut(),
            image: 0,
        };

        let mut count = 0;
        let images = unsafe {
            cvt(enumerate(swapchain.as_raw(), 0, &mut count, ptr::null_mut()))?;
            let mut images = vec![empty; count as usize];
            cvt(enumerate(
                swapchain.as_raw(),
                count,
                &mut count,
                images.as_mut_ptr() as *mut sys::SwapchainImageBaseHeader,
            ))?;
            images.truncate(count as usize);
            images
        };
        Ok(images.iter().map(|i| i.image).collect())
    }
}
