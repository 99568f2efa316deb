//! An in-process stand-in for an OpenXR runtime.
//!
//! It hands out handles, records every call, and keeps a list of destruction order violations so
//! tests can assert on the teardown sequence as well as on results.

use std::{
    cell::{Ref, RefCell, RefMut},
    collections::{HashMap, HashSet, VecDeque},
    ptr,
};

use openxr::sys;

use super::{
    ApplicationInfo, FrameTiming, GraphicsRequirements, QuadLayer, Runtime, RuntimeEvent,
    RuntimeProperties, RuntimeResult, SwapchainSpec, SystemProperties, ViewDescriptor,
};
use crate::{ExtensionDescriptor, GraphicsBinding, KHR_OPENGL_ES_ENABLE};

#[derive(Debug)]
pub(crate) struct FakeSwapchain {
    pub session: u64,
    pub spec: SwapchainSpec,
    pub acquired: VecDeque<u32>,
    pub next_image: u32,
}

#[derive(Debug)]
pub(crate) struct FakeState {
    // What the runtime advertises.
    pub extensions: Vec<ExtensionDescriptor>,
    pub view_configurations: Vec<(sys::ViewConfigurationType, Vec<ViewDescriptor>)>,
    pub reference_spaces: Vec<sys::ReferenceSpaceType>,
    pub image_count: u32,
    pub has_system: bool,
    pub fail_instance_creation: bool,
    pub fail_session_creation: bool,
    pub fail_swapchain_creation: bool,
    pub wait_timeouts: usize,
    pub should_render: bool,
    pub events: VecDeque<RuntimeEvent>,

    // What happened.
    pub calls: Vec<&'static str>,
    pub enabled_extensions: Vec<String>,
    pub submitted: Vec<Vec<QuadLayer>>,
    pub violations: Vec<String>,
    pub next_handle: u64,
    pub display_time: i64,
    pub instances: HashSet<u64>,
    pub sessions: HashMap<u64, u64>,
    pub running: HashSet<u64>,
    pub spaces: HashMap<u64, u64>,
    pub swapchains: HashMap<u64, FakeSwapchain>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            extensions: vec![ExtensionDescriptor {
                name: KHR_OPENGL_ES_ENABLE.to_string(),
                version: 8,
            }],
            view_configurations: vec![(
                sys::ViewConfigurationType::PRIMARY_STEREO,
                vec![view(1024, 1024); 2],
            )],
            reference_spaces: vec![
                sys::ReferenceSpaceType::VIEW,
                sys::ReferenceSpaceType::LOCAL,
                sys::ReferenceSpaceType::STAGE,
            ],
            image_count: 3,
            has_system: true,
            fail_instance_creation: false,
            fail_session_creation: false,
            fail_swapchain_creation: false,
            wait_timeouts: 0,
            should_render: true,
            events: Default::default(),
            calls: Default::default(),
            enabled_extensions: Default::default(),
            submitted: Default::default(),
            violations: Default::default(),
            next_handle: 1,
            display_time: 0,
            instances: Default::default(),
            sessions: Default::default(),
            running: Default::default(),
            spaces: Default::default(),
            swapchains: Default::default(),
        }
    }
}

pub(crate) fn view(width: u32, height: u32) -> ViewDescriptor {
    ViewDescriptor {
        recommended_width: width,
        recommended_height: height,
        recommended_sample_count: 1,
        max_width: width * 2,
        max_height: height * 2,
        max_sample_count: 4,
    }
}

/// A binding the fake runtime accepts; it never looks inside.
pub(crate) fn null_binding() -> GraphicsBinding {
    GraphicsBinding {
        display: ptr::null_mut(),
        config: ptr::null_mut(),
        context: ptr::null_mut(),
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    state: RefCell<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn state(&self) -> Ref<'_, FakeState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    /// How many times `call` was made.
    pub fn calls_to(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.state_mut().calls.clear();
    }

    /// Queue a state change for `session`.
    pub fn push_state(&self, session: sys::Session, state: sys::SessionState) {
        self.state_mut()
            .events
            .push_back(RuntimeEvent::SessionStateChanged { session, state });
    }

    /// `true` once every handle has been destroyed.
    pub fn all_destroyed(&self) -> bool {
        let state = self.state();
        state.instances.is_empty()
            && state.sessions.is_empty()
            && state.spaces.is_empty()
            && state.swapchains.is_empty()
    }

    fn record(&self, call: &'static str) -> RefMut<'_, FakeState> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        state
    }
}

impl FakeState {
    fn handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Runtime for FakeRuntime {
    fn enumerate_extensions(&self) -> RuntimeResult<Vec<ExtensionDescriptor>> {
        Ok(self.record("enumerate_extensions").extensions.clone())
    }

    fn create_instance(
        &self,
        _app: &ApplicationInfo<'_>,
        extensions: &[&str],
    ) -> RuntimeResult<sys::Instance> {
        let mut state = self.record("create_instance");
        if state.fail_instance_creation {
            return Err(sys::Result::ERROR_RUNTIME_FAILURE);
        }
        for e in extensions {
            if !state.extensions.iter().any(|a| a.name == *e) {
                return Err(sys::Result::ERROR_EXTENSION_NOT_PRESENT);
            }
        }
        state.enabled_extensions = extensions.iter().map(|e| e.to_string()).collect();
        let handle = state.handle();
        state.instances.insert(handle);
        Ok(sys::Instance::from_raw(handle))
    }

    fn destroy_instance(&self, instance: sys::Instance) -> RuntimeResult<()> {
        let mut state = self.record("destroy_instance");
        let raw = instance.into_raw();
        if state.sessions.values().any(|i| *i == raw) {
            state
                .violations
                .push(format!("instance {raw} destroyed with live sessions"));
        }
        if state.instances.remove(&raw) {
            Ok(())
        } else {
            Err(sys::Result::ERROR_HANDLE_INVALID)
        }
    }

    fn instance_properties(&self, _instance: sys::Instance) -> RuntimeResult<RuntimeProperties> {
        self.record("instance_properties");
        Ok(RuntimeProperties {
            name: "Fake Runtime".to_string(),
            version: sys::Version::new(1, 0, 0),
        })
    }

    fn system(
        &self,
        _instance: sys::Instance,
        form_factor: sys::FormFactor,
    ) -> RuntimeResult<sys::SystemId> {
        let state = self.record("system");
        if !state.has_system || form_factor != sys::FormFactor::HEAD_MOUNTED_DISPLAY {
            return Err(sys::Result::ERROR_FORM_FACTOR_UNAVAILABLE);
        }
        Ok(sys::SystemId::from_raw(1337))
    }

    fn system_properties(
        &self,
        _instance: sys::Instance,
        _system: sys::SystemId,
    ) -> RuntimeResult<SystemProperties> {
        self.record("system_properties");
        Ok(SystemProperties {
            name: "Fake HMD".to_string(),
            vendor_id: 0x2833,
            max_swapchain_width: 4096,
            max_swapchain_height: 4096,
            max_layer_count: 16,
            orientation_tracking: true,
            position_tracking: true,
        })
    }

    fn graphics_requirements(
        &self,
        _instance: sys::Instance,
        _system: sys::SystemId,
    ) -> RuntimeResult<GraphicsRequirements> {
        self.record("graphics_requirements");
        Ok(GraphicsRequirements {
            min_api_version: sys::Version::new(3, 0, 0),
            max_api_version: sys::Version::new(3, 2, 0),
        })
    }

    fn view_configurations(
        &self,
        _instance: sys::Instance,
        _system: sys::SystemId,
    ) -> RuntimeResult<Vec<sys::ViewConfigurationType>> {
        let state = self.record("view_configurations");
        Ok(state.view_configurations.iter().map(|(t, _)| *t).collect())
    }

    fn view_configuration_views(
        &self,
        _instance: sys::Instance,
        _system: sys::SystemId,
        ty: sys::ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewDescriptor>> {
        let state = self.record("view_configuration_views");
        state
            .view_configurations
            .iter()
            .find(|(t, _)| *t == ty)
            .map(|(_, views)| views.clone())
            .ok_or(sys::Result::ERROR_VIEW_CONFIGURATION_TYPE_UNSUPPORTED)
    }

    fn view_configuration_fov_mutable(
        &self,
        _instance: sys::Instance,
        _system: sys::SystemId,
        _ty: sys::ViewConfigurationType,
    ) -> RuntimeResult<bool> {
        self.record("view_configuration_fov_mutable");
        Ok(true)
    }

    fn poll_event(&self, _instance: sys::Instance) -> RuntimeResult<Option<RuntimeEvent>> {
        Ok(self.record("poll_event").events.pop_front())
    }

    fn result_to_string(&self, _instance: sys::Instance, result: sys::Result) -> String {
        format!("{result:?}")
    }

    fn create_session(
        &self,
        instance: sys::Instance,
        _system: sys::SystemId,
        _binding: &GraphicsBinding,
    ) -> RuntimeResult<sys::Session> {
        let mut state = self.record("create_session");
        if state.fail_session_creation {
            return Err(sys::Result::ERROR_GRAPHICS_DEVICE_INVALID);
        }
        let raw = instance.into_raw();
        if !state.instances.contains(&raw) {
            return Err(sys::Result::ERROR_HANDLE_INVALID);
        }
        let handle = state.handle();
        state.sessions.insert(handle, raw);
        Ok(sys::Session::from_raw(handle))
    }

    fn destroy_session(&self, session: sys::Session) -> RuntimeResult<()> {
        let mut state = self.record("destroy_session");
        let raw = session.into_raw();
        let live_spaces = state.spaces.values().filter(|s| **s == raw).count();
        let live_swapchains = state.swapchains.values().filter(|s| s.session == raw).count();
        if live_spaces + live_swapchains > 0 {
            state.violations.push(format!(
                "session {raw} destroyed with {live_spaces} spaces and {live_swapchains} swapchains"
            ));
        }
        state.running.remove(&raw);
        state
            .sessions
            .remove(&raw)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn begin_session(
        &self,
        session: sys::Session,
        view_type: sys::ViewConfigurationType,
    ) -> RuntimeResult<()> {
        let mut state = self.record("begin_session");
        if view_type != sys::ViewConfigurationType::PRIMARY_STEREO {
            return Err(sys::Result::ERROR_VIEW_CONFIGURATION_TYPE_UNSUPPORTED);
        }
        if !state.running.insert(session.into_raw()) {
            return Err(sys::Result::ERROR_SESSION_RUNNING);
        }
        Ok(())
    }

    fn end_session(&self, session: sys::Session) -> RuntimeResult<()> {
        let mut state = self.record("end_session");
        if state.running.remove(&session.into_raw()) {
            Ok(())
        } else {
            Err(sys::Result::ERROR_SESSION_NOT_RUNNING)
        }
    }

    fn reference_spaces(
        &self,
        _session: sys::Session,
    ) -> RuntimeResult<Vec<sys::ReferenceSpaceType>> {
        Ok(self.record("reference_spaces").reference_spaces.clone())
    }

    fn create_reference_space(
        &self,
        session: sys::Session,
        ty: sys::ReferenceSpaceType,
        _pose: sys::Posef,
    ) -> RuntimeResult<sys::Space> {
        let mut state = self.record("create_reference_space");
        if !state.reference_spaces.contains(&ty) {
            return Err(sys::Result::ERROR_REFERENCE_SPACE_UNSUPPORTED);
        }
        let handle = state.handle();
        state.spaces.insert(handle, session.into_raw());
        Ok(sys::Space::from_raw(handle))
    }

    fn destroy_space(&self, space: sys::Space) -> RuntimeResult<()> {
        self.record("destroy_space")
            .spaces
            .remove(&space.into_raw())
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn create_swapchain(
        &self,
        session: sys::Session,
        spec: &SwapchainSpec,
    ) -> RuntimeResult<sys::Swapchain> {
        let mut state = self.record("create_swapchain");
        if state.fail_swapchain_creation {
            return Err(sys::Result::ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED);
        }
        let handle = state.handle();
        state.swapchains.insert(
            handle,
            FakeSwapchain {
                session: session.into_raw(),
                spec: *spec,
                acquired: Default::default(),
                next_image: 0,
            },
        );
        Ok(sys::Swapchain::from_raw(handle))
    }

    fn swapchain_images(&self, swapchain: sys::Swapchain) -> RuntimeResult<Vec<u32>> {
        let state = self.record("swapchain_images");
        if !state.swapchains.contains_key(&swapchain.into_raw()) {
            return Err(sys::Result::ERROR_HANDLE_INVALID);
        }
        // Texture names, offset so they can't be mistaken for indices.
        Ok((0..state.image_count).map(|i| 100 + i).collect())
    }

    fn destroy_swapchain(&self, swapchain: sys::Swapchain) -> RuntimeResult<()> {
        self.record("destroy_swapchain")
            .swapchains
            .remove(&swapchain.into_raw())
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn acquire_image(&self, swapchain: sys::Swapchain) -> RuntimeResult<u32> {
        let mut state = self.record("acquire_image");
        let image_count = state.image_count;
        let swapchain = state
            .swapchains
            .get_mut(&swapchain.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        if swapchain.acquired.len() as u32 >= image_count {
            return Err(sys::Result::ERROR_CALL_ORDER_INVALID);
        }
        let index = swapchain.next_image;
        swapchain.next_image = (index + 1) % image_count;
        swapchain.acquired.push_back(index);
        Ok(index)
    }

    fn wait_image(
        &self,
        _swapchain: sys::Swapchain,
        _timeout: sys::Duration,
    ) -> RuntimeResult<bool> {
        let mut state = self.record("wait_image");
        if state.wait_timeouts > 0 {
            state.wait_timeouts -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn release_image(&self, swapchain: sys::Swapchain) -> RuntimeResult<()> {
        let mut state = self.record("release_image");
        let swapchain = state
            .swapchains
            .get_mut(&swapchain.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        swapchain
            .acquired
            .pop_front()
            .map(drop)
            .ok_or(sys::Result::ERROR_CALL_ORDER_INVALID)
    }

    fn wait_frame(&self, session: sys::Session) -> RuntimeResult<FrameTiming> {
        let mut state = self.record("wait_frame");
        if !state.running.contains(&session.into_raw()) {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        state.display_time += 11_111_111;
        Ok(FrameTiming {
            predicted_display_time: sys::Time::from_nanos(state.display_time),
            predicted_display_period: sys::Duration::from_nanos(11_111_111),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&self, session: sys::Session) -> RuntimeResult<()> {
        let state = self.record("begin_frame");
        if !state.running.contains(&session.into_raw()) {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        Ok(())
    }

    fn end_frame(
        &self,
        _session: sys::Session,
        _display_time: sys::Time,
        _blend_mode: sys::EnvironmentBlendMode,
        layers: &[QuadLayer],
    ) -> RuntimeResult<()> {
        let mut state = self.record("end_frame");
        for layer in layers {
            if !state.spaces.contains_key(&layer.space.into_raw())
                || !state.swapchains.contains_key(&layer.swapchain.into_raw())
            {
                return Err(sys::Result::ERROR_HANDLE_INVALID);
            }
        }
        state.submitted.push(layers.to_vec());
        Ok(())
    }
}
