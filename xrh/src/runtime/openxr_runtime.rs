use std::{cell::RefCell, collections::HashMap, ffi::CStr, ptr};

use log::warn;
use openxr::{self as xr, sys};

use super::{
    gles::OpenGlEs, ApplicationInfo, FrameTiming, GraphicsRequirements, QuadLayer, Runtime,
    RuntimeEvent, RuntimeProperties, RuntimeResult, SwapchainSpec, SystemProperties,
    ViewDescriptor,
};
use crate::{ExtensionDescriptor, GraphicsBinding, KHR_OPENGL_ES_ENABLE};
#[cfg(target_os = "android")]
use crate::{XrhError, XrhResult};

#[cfg(target_os = "android")]
const KHR_ANDROID_CREATE_INSTANCE: &str = "XR_KHR_android_create_instance";

/// A session and the two halves of its frame loop.
struct SessionObjects {
    session: xr::Session<OpenGlEs>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<OpenGlEs>,
}

/// Every live `openxr` object, keyed by its raw handle. Removing an object destroys it.
#[derive(Default)]
struct Objects {
    instances: HashMap<sys::Instance, xr::Instance>,
    sessions: HashMap<sys::Session, SessionObjects>,
    spaces: HashMap<sys::Space, xr::Space>,
    swapchains: HashMap<sys::Swapchain, xr::Swapchain<OpenGlEs>>,
}

/// [`Runtime`] backed by the system OpenXR loader.
///
/// `openxr` resolves each instance's entry point table, and the table of every extension it
/// enables, when the instance is created; a runtime missing one fails instance creation.
pub struct OpenXrRuntime {
    entry: xr::Entry,
    objects: RefCell<Objects>,
}

impl OpenXrRuntime {
    pub(crate) fn new(entry: xr::Entry) -> Self {
        Self {
            entry,
            objects: Default::default(),
        }
    }

    /// Run the Android loader bootstrap. Must happen before any other runtime call.
    ///
    /// # Safety
    /// `vm` must be the process' `JavaVM` and `context` a global reference to its activity.
    #[cfg(target_os = "android")]
    pub(crate) unsafe fn initialize_android_loader(
        entry: &xr::Entry,
        vm: *mut std::ffi::c_void,
        context: *mut std::ffi::c_void,
    ) -> XrhResult<()> {
        // `Entry::initialize_android_loader` reads the VM from `ndk-context`; ours is passed in.
        let loader_init = xr::raw::LoaderInitKHR::load(entry, sys::Instance::NULL)
            .map_err(|_| XrhError::MissingEntryPoint("xrInitializeLoaderKHR"))?;

        let init_info = sys::LoaderInitInfoAndroidKHR {
            ty: sys::LoaderInitInfoAndroidKHR::TYPE,
            next: ptr::null(),
            application_vm: vm,
            application_context: context,
        };
        let result = (loader_init.initialize_loader)(&init_info as *const _ as *const _);
        if result.into_raw() < 0 {
            return Err(XrhError::RuntimeCallFailed {
                call: "xrInitializeLoaderKHR",
                code: result,
                message: format!("{result:?}"),
            });
        }
        Ok(())
    }

    fn instance(&self, handle: sys::Instance) -> RuntimeResult<xr::Instance> {
        self.objects
            .borrow()
            .instances
            .get(&handle)
            .cloned()
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn session(&self, handle: sys::Session) -> RuntimeResult<xr::Session<OpenGlEs>> {
        self.objects
            .borrow()
            .sessions
            .get(&handle)
            .map(|s| s.session.clone())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn with_swapchain<T>(
        &self,
        handle: sys::Swapchain,
        f: impl FnOnce(&mut xr::Swapchain<OpenGlEs>) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let mut objects = self.objects.borrow_mut();
        let swapchain = objects
            .swapchains
            .get_mut(&handle)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        f(swapchain)
    }

    fn with_session<T>(
        &self,
        handle: sys::Session,
        f: impl FnOnce(&mut SessionObjects) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let mut objects = self.objects.borrow_mut();
        let session = objects
            .sessions
            .get_mut(&handle)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        f(session)
    }
}

/// The enabled extensions as `openxr` wants them. Extensions whose tables this crate uses get
/// their flag set so `openxr` loads the table; the rest are passed through by name.
fn extension_set(extensions: &[&str]) -> xr::ExtensionSet {
    let mut set = xr::ExtensionSet::default();
    for name in extensions {
        match *name {
            KHR_OPENGL_ES_ENABLE => set.khr_opengl_es_enable = true,
            #[cfg(target_os = "android")]
            KHR_ANDROID_CREATE_INSTANCE => set.khr_android_create_instance = true,
            other => set.other.push(other.to_string()),
        }
    }
    set
}

fn cvt(result: sys::Result) -> RuntimeResult<sys::Result> {
    if result.into_raw() >= 0 {
        Ok(result)
    } else {
        Err(result)
    }
}

impl Runtime for OpenXrRuntime {
    fn enumerate_extensions(&self) -> RuntimeResult<Vec<ExtensionDescriptor>> {
        // `Entry::enumerate_extensions` drops the versions the runtime advertises.
        let enumerate = self.entry.fp().enumerate_instance_extension_properties;
        let empty = sys::ExtensionProperties {
            ty: sys::ExtensionProperties::TYPE,
            next: ptr::null_mut(),
            extension_name: [0; sys::MAX_EXTENSION_NAME_SIZE],
            extension_version: 0,
        };

        let mut count = 0;
        let properties = unsafe {
            cvt(enumerate(ptr::null(), 0, &mut count, ptr::null_mut()))?;
            let mut properties = vec![empty; count as usize];
            cvt(enumerate(
                ptr::null(),
                count,
                &mut count,
                properties.as_mut_ptr(),
            ))?;
            properties.truncate(count as usize);
            properties
        };

        Ok(properties
            .iter()
            .map(|p| ExtensionDescriptor {
                name: unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned(),
                version: p.extension_version,
            })
            .collect())
    }

    fn create_instance(
        &self,
        app: &ApplicationInfo<'_>,
        extensions: &[&str],
    ) -> RuntimeResult<sys::Instance> {
        if app.application_name.len() >= sys::MAX_APPLICATION_NAME_SIZE
            || app.engine_name.len() >= sys::MAX_ENGINE_NAME_SIZE
        {
            warn!("[XRH_RUNTIME] Application or engine name is too long");
            return Err(sys::Result::ERROR_NAME_INVALID);
        }

        let app_info = xr::ApplicationInfo {
            application_name: app.application_name,
            application_version: app.application_version,
            engine_name: app.engine_name,
            engine_version: app.engine_version,
        };
        let instance = self.entry.create_instance(&app_info, &extension_set(extensions), &[])?;
        let handle = instance.as_raw();
        self.objects.borrow_mut().instances.insert(handle, instance);
        Ok(handle)
    }

    fn destroy_instance(&self, instance: sys::Instance) -> RuntimeResult<()> {
        self.objects
            .borrow_mut()
            .instances
            .remove(&instance)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn instance_properties(&self, instance: sys::Instance) -> RuntimeResult<RuntimeProperties> {
        let properties = self.instance(instance)?.properties()?;
        Ok(RuntimeProperties {
            name: properties.runtime_name,
            version: properties.runtime_version,
        })
    }

    fn system(
        &self,
        instance: sys::Instance,
        form_factor: sys::FormFactor,
    ) -> RuntimeResult<sys::SystemId> {
        self.instance(instance)?.system(form_factor)
    }

    fn system_properties(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
    ) -> RuntimeResult<SystemProperties> {
        let properties = self.instance(instance)?.system_properties(system)?;
        let graphics = properties.graphics_properties;
        let tracking = properties.tracking_properties;
        Ok(SystemProperties {
            name: properties.system_name,
            vendor_id: properties.vendor_id,
            max_swapchain_width: graphics.max_swapchain_image_width,
            max_swapchain_height: graphics.max_swapchain_image_height,
            max_layer_count: graphics.max_layer_count,
            orientation_tracking: tracking.orientation_tracking,
            position_tracking: tracking.position_tracking,
        })
    }

    fn graphics_requirements(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
    ) -> RuntimeResult<GraphicsRequirements> {
        self.instance(instance)?
            .graphics_requirements::<OpenGlEs>(system)
    }

    fn view_configurations(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
    ) -> RuntimeResult<Vec<sys::ViewConfigurationType>> {
        self.instance(instance)?
            .enumerate_view_configurations(system)
    }

    fn view_configuration_views(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
        ty: sys::ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewDescriptor>> {
        let views = self
            .instance(instance)?
            .enumerate_view_configuration_views(system, ty)?;
        Ok(views
            .iter()
            .map(|v| ViewDescriptor {
                recommended_width: v.recommended_image_rect_width,
                recommended_height: v.recommended_image_rect_height,
                recommended_sample_count: v.recommended_swapchain_sample_count,
                max_width: v.max_image_rect_width,
                max_height: v.max_image_rect_height,
                max_sample_count: v.max_swapchain_sample_count,
            })
            .collect())
    }

    fn view_configuration_fov_mutable(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
        ty: sys::ViewConfigurationType,
    ) -> RuntimeResult<bool> {
        Ok(self
            .instance(instance)?
            .view_configuration_properties(system, ty)?
            .fov_mutable)
    }

    fn poll_event(&self, instance: sys::Instance) -> RuntimeResult<Option<RuntimeEvent>> {
        let instance = self.instance(instance)?;
        let mut buffer = xr::EventDataBuffer::new();
        let event = match instance.poll_event(&mut buffer)? {
            None => return Ok(None),
            Some(xr::Event::SessionStateChanged(changed)) => RuntimeEvent::SessionStateChanged {
                session: changed.session(),
                state: changed.state(),
            },
            Some(xr::Event::InstanceLossPending(_)) => RuntimeEvent::InstanceLossPending,
            Some(_) => RuntimeEvent::Other,
        };
        Ok(Some(event))
    }

    fn result_to_string(&self, instance: sys::Instance, result: sys::Result) -> String {
        self.instance(instance)
            .and_then(|i| i.result_to_string(result))
            .unwrap_or_else(|_| format!("{result:?}"))
    }

    fn create_session(
        &self,
        instance: sys::Instance,
        system: sys::SystemId,
        binding: &GraphicsBinding,
    ) -> RuntimeResult<sys::Session> {
        let instance = self.instance(instance)?;
        let (session, frame_waiter, frame_stream) =
            unsafe { instance.create_session::<OpenGlEs>(system, binding)? };
        let handle = session.as_raw();
        self.objects.borrow_mut().sessions.insert(
            handle,
            SessionObjects {
                session,
                frame_waiter,
                frame_stream,
            },
        );
        Ok(handle)
    }

    fn destroy_session(&self, session: sys::Session) -> RuntimeResult<()> {
        self.objects
            .borrow_mut()
            .sessions
            .remove(&session)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn begin_session(
        &self,
        session: sys::Session,
        view_type: sys::ViewConfigurationType,
    ) -> RuntimeResult<()> {
        self.session(session)?.begin(view_type).map(drop)
    }

    fn end_session(&self, session: sys::Session) -> RuntimeResult<()> {
        self.session(session)?.end().map(drop)
    }

    fn reference_spaces(
        &self,
        session: sys::Session,
    ) -> RuntimeResult<Vec<sys::ReferenceSpaceType>> {
        self.session(session)?.enumerate_reference_spaces()
    }

    fn create_reference_space(
        &self,
        session: sys::Session,
        ty: sys::ReferenceSpaceType,
        pose: sys::Posef,
    ) -> RuntimeResult<sys::Space> {
        let space = self.session(session)?.create_reference_space(ty, pose)?;
        let handle = space.as_raw();
        self.objects.borrow_mut().spaces.insert(handle, space);
        Ok(handle)
    }

    fn destroy_space(&self, space: sys::Space) -> RuntimeResult<()> {
        self.objects
            .borrow_mut()
            .spaces
            .remove(&space)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn create_swapchain(
        &self,
        session: sys::Session,
        spec: &SwapchainSpec,
    ) -> RuntimeResult<sys::Swapchain> {
        let swapchain = self
            .session(session)?
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT,
                format: spec.format,
                sample_count: spec.sample_count,
                width: spec.width,
                height: spec.height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })?;
        let handle = swapchain.as_raw();
        self.objects.borrow_mut().swapchains.insert(handle, swapchain);
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: sys::Swapchain) -> RuntimeResult<Vec<u32>> {
        self.with_swapchain(swapchain, |s| s.enumerate_images())
    }

    fn destroy_swapchain(&self, swapchain: sys::Swapchain) -> RuntimeResult<()> {
        self.objects
            .borrow_mut()
            .swapchains
            .remove(&swapchain)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn acquire_image(&self, swapchain: sys::Swapchain) -> RuntimeResult<u32> {
        self.with_swapchain(swapchain, |s| s.acquire_image())
    }

    fn wait_image(
        &self,
        swapchain: sys::Swapchain,
        timeout: sys::Duration,
    ) -> RuntimeResult<bool> {
        // `Swapchain::wait_image` reports a timeout as success, and `Swapchain::release_image`
        // panics unless it succeeded, so both go through the instance's table.
        self.with_swapchain(swapchain, |s| {
            let info = sys::SwapchainImageWaitInfo {
                ty: sys::SwapchainImageWaitInfo::TYPE,
                next: ptr::null(),
                timeout,
            };
            let result =
                cvt(unsafe { (s.instance().fp().wait_swapchain_image)(s.as_raw(), &info) })?;
            Ok(result != sys::Result::TIMEOUT_EXPIRED)
        })
    }

    fn release_image(&self, swapchain: sys::Swapchain) -> RuntimeResult<()> {
        self.with_swapchain(swapchain, |s| {
            cvt(unsafe { (s.instance().fp().release_swapchain_image)(s.as_raw(), ptr::null()) })
                .map(drop)
        })
    }

    fn wait_frame(&self, session: sys::Session) -> RuntimeResult<FrameTiming> {
        let state = self.with_session(session, |s| s.frame_waiter.wait())?;
        Ok(FrameTiming {
            predicted_display_time: state.predicted_display_time,
            predicted_display_period: state.predicted_display_period,
            should_render: state.should_render,
        })
    }

    fn begin_frame(&self, session: sys::Session) -> RuntimeResult<()> {
        self.with_session(session, |s| s.frame_stream.begin())
    }

    fn end_frame(
        &self,
        session: sys::Session,
        display_time: sys::Time,
        blend_mode: sys::EnvironmentBlendMode,
        layers: &[QuadLayer],
    ) -> RuntimeResult<()> {
        let mut objects = self.objects.borrow_mut();
        let Objects {
            sessions,
            spaces,
            swapchains,
            ..
        } = &mut *objects;

        let quads = layers
            .iter()
            .map(|l| {
                let space = spaces.get(&l.space).ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
                let swapchain = swapchains
                    .get(&l.swapchain)
                    .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
                Ok(xr::CompositionLayerQuad::new()
                    .space(space)
                    .eye_visibility(xr::EyeVisibility::BOTH)
                    .sub_image(
                        xr::SwapchainSubImage::new()
                            .swapchain(swapchain)
                            .image_rect(l.image_rect)
                            .image_array_index(0),
                    )
                    .pose(l.pose)
                    .size(l.size))
            })
            .collect::<RuntimeResult<Vec<_>>>()?;
        let headers = quads
            .iter()
            .map(|q| &**q)
            .collect::<Vec<&xr::CompositionLayerBase<'_, OpenGlEs>>>();

        let session = sessions
            .get_mut(&session)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        session.frame_stream.end(display_time, blend_mode, &headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_extension_set() {
        let set = extension_set(&[KHR_OPENGL_ES_ENABLE, "XR_FB_display_refresh_rate"]);
        assert!(set.khr_opengl_es_enable);
        assert!(!set.fb_display_refresh_rate);
        assert_eq!(set.other, vec!["XR_FB_display_refresh_rate".to_string()]);

        let set = extension_set(&[]);
        assert!(!set.khr_opengl_es_enable);
        assert!(set.other.is_empty());
    }
}
