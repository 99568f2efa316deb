use std::{ffi::c_void, rc::Rc};

use generational_arena::{Arena, Index};
use log::{debug, error, info, trace, warn};
use openxr::sys;

use crate::{
    extension::Extensions,
    runtime::{
        check, diagnostic, ApplicationInfo, GraphicsRequirements, Runtime, RuntimeEvent,
        RuntimeProperties, SystemProperties, ViewDescriptor,
    },
    ExtensionDescriptor, Session, XrhConfig, XrhError, XrhResult, FORM_FACTOR,
    KHR_OPENGL_ES_ENABLE, VIEW_COUNT, VIEW_TYPE,
};

/// The EGL objects a session renders with.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsBinding {
    /// `EGLDisplay`
    pub display: *mut c_void,
    /// `EGLConfig`
    pub config: *mut c_void,
    /// `EGLContext`
    pub context: *mut c_void,
}

/// Identifies a [`Session`] owned by an [`Instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub(crate) Index);

/// The application's negotiated connection to the runtime.
///
/// An instance is built up in two steps: extensions are requested on a fresh [`Instance`], then
/// [`Instance::create`] negotiates them with the runtime, finds the head mounted display and picks
/// its stereo view configuration. Only a fully created instance can create sessions.
pub struct Instance {
    runtime: Rc<dyn Runtime>,
    application_name: String,
    application_version: u32,
    engine_name: String,
    engine_version: u32,
    extensions: Extensions,
    handle: sys::Instance,
    created: bool,
    system: sys::SystemId,
    runtime_properties: Option<RuntimeProperties>,
    system_properties: Option<SystemProperties>,
    graphics_requirements: Option<GraphicsRequirements>,
    views: Option<[ViewDescriptor; VIEW_COUNT]>,
    fov_mutable: bool,
    binding: Option<GraphicsBinding>,
    sessions: Arena<Session>,
}

impl Instance {
    /// A new, not yet created, instance with no extensions requested.
    pub fn new(runtime: Rc<dyn Runtime>, application_name: &str, application_version: u32) -> Self {
        Self {
            runtime,
            application_name: application_name.to_string(),
            application_version,
            engine_name: "xrh".to_string(),
            engine_version: 1,
            extensions: Default::default(),
            handle: sys::Instance::NULL,
            created: false,
            system: sys::SystemId::from_raw(0),
            runtime_properties: None,
            system_properties: None,
            graphics_requirements: None,
            views: None,
            fov_mutable: false,
            binding: None,
            sessions: Arena::new(),
        }
    }

    /// A new instance carrying the application details and extension requests in `config`.
    pub fn from_config(runtime: Rc<dyn Runtime>, config: &XrhConfig) -> XrhResult<Self> {
        config.validate()?;
        let mut instance = Self::new(
            runtime,
            &config.application_name,
            config.application_version,
        );
        instance.engine_name = config.engine_name.clone();
        instance.engine_version = config.engine_version;
        for e in &config.required_extensions {
            instance.add_required_extension(&e.name, e.version)?;
        }
        for e in &config.desired_extensions {
            instance.add_desired_extension(&e.name, e.version)?;
        }
        Ok(instance)
    }

    /// Request an extension [`Instance::create`] must not do without.
    pub fn add_required_extension(&mut self, name: &str, version: u32) -> XrhResult<()> {
        let extension = self.extension_request(name, version)?;
        self.extensions.required.push(extension);
        Ok(())
    }

    /// Request an extension that is enabled if the runtime has it.
    pub fn add_desired_extension(&mut self, name: &str, version: u32) -> XrhResult<()> {
        let extension = self.extension_request(name, version)?;
        self.extensions.desired.push(extension);
        Ok(())
    }

    fn extension_request(&self, name: &str, version: u32) -> XrhResult<ExtensionDescriptor> {
        if self.handle != sys::Instance::NULL {
            return Err(XrhError::AlreadyCreated);
        }
        ExtensionDescriptor::new(name, version)
    }

    /// Negotiate with the runtime and create the runtime instance.
    ///
    /// If any required extension is missing no runtime instance is created at all. Failures after
    /// the runtime instance exists leave its handle in place; [`Instance::destroy`] (or dropping
    /// the instance) releases it.
    pub fn create(&mut self) -> XrhResult<()> {
        if self.handle != sys::Instance::NULL {
            return Err(XrhError::AlreadyCreated);
        }
        let runtime = self.runtime.clone();

        let available = check(
            runtime.as_ref(),
            sys::Instance::NULL,
            "xrEnumerateInstanceExtensionProperties",
            runtime.enumerate_extensions(),
        )?;
        debug!("[XRH_INSTANCE] Runtime advertises {} extensions:", available.len());
        for e in &available {
            debug!("[XRH_INSTANCE]   {} (v{})", e.name, e.version);
        }

        self.extensions.negotiate(available)?;
        let enabled = self
            .extensions
            .enabled
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>();
        info!("[XRH_INSTANCE] Enabling extensions: {enabled:?}");

        let app = ApplicationInfo {
            application_name: &self.application_name,
            application_version: self.application_version,
            engine_name: &self.engine_name,
            engine_version: self.engine_version,
        };
        self.handle = runtime.create_instance(&app, &enabled).map_err(|code| {
            error!(
                "[XRH_INSTANCE] Unable to create instance: {}",
                runtime.result_to_string(sys::Instance::NULL, code)
            );
            XrhError::InstanceCreationFailed(code)
        })?;
        let handle = self.handle;

        self.system = runtime.system(handle, FORM_FACTOR).map_err(|code| {
            error!(
                "[XRH_INSTANCE] No head mounted display: {}",
                runtime.result_to_string(handle, code)
            );
            XrhError::SystemNotFound(code)
        })?;

        self.runtime_properties = diagnostic(
            runtime.as_ref(),
            handle,
            "xrGetInstanceProperties",
            runtime.instance_properties(handle),
        );
        if let Some(p) = &self.runtime_properties {
            info!(
                "[XRH_INSTANCE] Runtime: {} {}.{}.{}",
                p.name,
                p.version.major(),
                p.version.minor(),
                p.version.patch()
            );
        }

        self.system_properties = diagnostic(
            runtime.as_ref(),
            handle,
            "xrGetSystemProperties",
            runtime.system_properties(handle, self.system),
        );
        if let Some(p) = &self.system_properties {
            info!(
                "[XRH_INSTANCE] System: {} (vendor {:#x}), max swapchain {}x{}, {} layers",
                p.name, p.vendor_id, p.max_swapchain_width, p.max_swapchain_height, p.max_layer_count
            );
        }

        if self.extensions.is_enabled(KHR_OPENGL_ES_ENABLE) {
            self.graphics_requirements = diagnostic(
                runtime.as_ref(),
                handle,
                "xrGetOpenGLESGraphicsRequirementsKHR",
                runtime.graphics_requirements(handle, self.system),
            );
            if let Some(r) = &self.graphics_requirements {
                info!(
                    "[XRH_INSTANCE] OpenGL ES {}.{} to {}.{}",
                    r.min_api_version.major(),
                    r.min_api_version.minor(),
                    r.max_api_version.major(),
                    r.max_api_version.minor()
                );
            }
        }

        let view_types = check(
            runtime.as_ref(),
            handle,
            "xrEnumerateViewConfigurations",
            runtime.view_configurations(handle, self.system),
        )?;
        let mut configurations = Vec::new();
        for ty in view_types {
            if ty != VIEW_TYPE {
                debug!("[XRH_INSTANCE] Skipping view configuration {ty:?}");
                continue;
            }
            let views = check(
                runtime.as_ref(),
                handle,
                "xrEnumerateViewConfigurationViews",
                runtime.view_configuration_views(handle, self.system, ty),
            )?;
            configurations.push((ty, views));
        }

        let views = select_view_configuration(&configurations).ok_or_else(|| {
            error!("[XRH_INSTANCE] No {VIEW_TYPE:?} view configuration with {VIEW_COUNT} views");
            XrhError::ViewConfigUnsupported
        })?;
        info!(
            "[XRH_INSTANCE] Recommended image size {}x{}, {} samples",
            views[0].recommended_width, views[0].recommended_height, views[0].recommended_sample_count
        );
        self.views = Some(views);

        self.fov_mutable = diagnostic(
            runtime.as_ref(),
            handle,
            "xrGetViewConfigurationProperties",
            runtime.view_configuration_fov_mutable(handle, self.system, VIEW_TYPE),
        )
        .unwrap_or(false);

        self.created = true;
        Ok(())
    }

    /// Record the EGL objects new sessions will render with.
    pub fn set_gfx_binding(
        &mut self,
        display: *mut c_void,
        config: *mut c_void,
        context: *mut c_void,
    ) -> XrhResult<()> {
        if !self.created {
            return Err(XrhError::NotCreated);
        }
        self.binding = Some(GraphicsBinding {
            display,
            config,
            context,
        });
        Ok(())
    }

    /// Create a session bound to the graphics binding set with [`Instance::set_gfx_binding`].
    pub fn create_session(&mut self) -> XrhResult<SessionId> {
        if !self.created {
            return Err(XrhError::NotCreated);
        }
        let binding = self.binding.ok_or(XrhError::GraphicsBindingMissing)?;

        let handle = self
            .runtime
            .create_session(self.handle, self.system, &binding)
            .map_err(|code| {
                error!(
                    "[XRH_INSTANCE] Unable to create session: {}",
                    self.runtime.result_to_string(self.handle, code)
                );
                XrhError::SessionCreationFailed(code)
            })?;
        info!("[XRH_INSTANCE] Created session {handle:?}");

        let session = Session::new(self.runtime.clone(), self.handle, handle)?;
        Ok(SessionId(self.sessions.insert(session)))
    }

    /// Destroy a session that no longer owns any spaces or swapchains.
    pub fn destroy_session(&mut self, id: SessionId) -> XrhResult<()> {
        let session = self.session(id)?;
        let (spaces, swapchains) = (session.space_count(), session.swapchain_count());
        if spaces + swapchains > 0 {
            warn!("[XRH_INSTANCE] Refusing to destroy session with live children");
            return Err(XrhError::ChildrenAlive { spaces, swapchains });
        }
        self.sessions
            .remove(id.0)
            .ok_or(XrhError::UnknownSession)?
            .destroy()
    }

    /// Release the runtime instance once every session is gone. Calling this again does nothing.
    pub fn destroy(&mut self) -> XrhResult<()> {
        if !self.sessions.is_empty() {
            warn!("[XRH_INSTANCE] Refusing to destroy instance with live sessions");
            return Err(XrhError::SessionsAlive(self.sessions.len()));
        }
        self.release()
    }

    /// Drain the runtime's event queue, passing session state changes on to their sessions.
    ///
    /// Returns every state change seen, in order.
    pub fn poll_events(&mut self) -> XrhResult<Vec<(SessionId, sys::SessionState)>> {
        if self.handle == sys::Instance::NULL {
            return Err(XrhError::NotCreated);
        }

        let mut changes = Vec::new();
        loop {
            let event = check(
                self.runtime.as_ref(),
                self.handle,
                "xrPollEvent",
                self.runtime.poll_event(self.handle),
            )?;
            let Some(event) = event else {
                break;
            };
            match event {
                RuntimeEvent::SessionStateChanged { session, state } => {
                    match self.sessions.iter_mut().find(|(_, s)| s.handle() == session) {
                        Some((index, s)) => {
                            s.handle_state_change(state)?;
                            changes.push((SessionId(index), state));
                        }
                        None => warn!("[XRH_INSTANCE] State change for unknown session {session:?}"),
                    }
                }
                RuntimeEvent::InstanceLossPending => {
                    error!("[XRH_INSTANCE] Instance loss pending");
                    return Err(XrhError::InstanceLost);
                }
                RuntimeEvent::Other => trace!("[XRH_INSTANCE] Ignoring event"),
            }
        }

        Ok(changes)
    }

    /// Look up a session.
    pub fn session(&self, id: SessionId) -> XrhResult<&Session> {
        self.sessions.get(id.0).ok_or(XrhError::UnknownSession)
    }

    /// Look up a session to drive it.
    pub fn session_mut(&mut self, id: SessionId) -> XrhResult<&mut Session> {
        self.sessions.get_mut(id.0).ok_or(XrhError::UnknownSession)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// The runtime handle, `NULL` before [`Instance::create`]
    pub fn handle(&self) -> sys::Instance {
        self.handle
    }

    /// `true` once [`Instance::create`] has fully succeeded
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// The head mounted display's system id
    pub fn system_id(&self) -> sys::SystemId {
        self.system
    }

    /// Extensions the runtime advertised
    pub fn available_extensions(&self) -> &[ExtensionDescriptor] {
        &self.extensions.available
    }

    /// Extensions the instance was created with
    pub fn enabled_extensions(&self) -> &[ExtensionDescriptor] {
        &self.extensions.enabled
    }

    /// Whether `name` was enabled
    pub fn is_extension_enabled(&self, name: &str) -> bool {
        self.extensions.is_enabled(name)
    }

    /// The two views of the selected stereo view configuration
    pub fn view_descriptors(&self) -> Option<&[ViewDescriptor; VIEW_COUNT]> {
        self.views.as_ref()
    }

    /// Recommended swapchain width and height
    pub fn recommended_image_size(&self) -> Option<(u32, u32)> {
        self.views
            .map(|v| (v[0].recommended_width, v[0].recommended_height))
    }

    /// Recommended swapchain sample count
    pub fn recommended_sample_count(&self) -> Option<u32> {
        self.views.map(|v| v[0].recommended_sample_count)
    }

    /// Whether the application may change the field of view
    pub fn fov_mutable(&self) -> bool {
        self.fov_mutable
    }

    /// The runtime's name and version, if it could be queried
    pub fn runtime_properties(&self) -> Option<&RuntimeProperties> {
        self.runtime_properties.as_ref()
    }

    /// The head mounted display's properties, if they could be queried
    pub fn system_properties(&self) -> Option<&SystemProperties> {
        self.system_properties.as_ref()
    }

    /// OpenGL ES versions the runtime accepts, when `XR_KHR_opengl_es_enable` is enabled
    pub fn graphics_requirements(&self) -> Option<&GraphicsRequirements> {
        self.graphics_requirements.as_ref()
    }

    /// Sessions go first. A failed destroy doesn't stop the rest; the first error is returned.
    fn release(&mut self) -> XrhResult<()> {
        let mut result = Ok(());
        for (_, session) in self.sessions.drain() {
            result = result.and(session.teardown());
        }

        self.created = false;
        self.binding = None;
        if self.handle == sys::Instance::NULL {
            return result;
        }
        let handle = std::mem::replace(&mut self.handle, sys::Instance::NULL);
        info!("[XRH_INSTANCE] Destroying instance {handle:?}");
        result.and(check(
            self.runtime.as_ref(),
            handle,
            "xrDestroyInstance",
            self.runtime.destroy_instance(handle),
        ))
    }
}

/// The first primary stereo configuration with exactly two views.
fn select_view_configuration(
    configurations: &[(sys::ViewConfigurationType, Vec<ViewDescriptor>)],
) -> Option<[ViewDescriptor; VIEW_COUNT]> {
    configurations
        .iter()
        .filter(|(ty, _)| *ty == VIEW_TYPE)
        .find_map(|(_, views)| <[ViewDescriptor; VIEW_COUNT]>::try_from(views.as_slice()).ok())
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("[XRH_INSTANCE] Unable to destroy instance: {e}");
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("application_name", &self.application_name)
            .field("handle", &self.handle)
            .field("created", &self.created)
            .field("enabled_extensions", &self.extensions.enabled)
            .field("views", &self.views)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
