use ndk::event::Source;
use ndk_glue::Event;

use crate::AppCommand;

impl<R> AppCommand<R> {
    /// Map an `ndk-glue` lifecycle event. `make_renderer` is only called for a new window.
    pub fn from_event(event: &Event, make_renderer: impl FnOnce() -> R) -> Self {
        match event {
            Event::WindowCreated => AppCommand::SurfaceCreated(make_renderer()),
            Event::WindowDestroyed => AppCommand::SurfaceDestroyed,
            _ => AppCommand::Other,
        }
    }
}

/// The next pending lifecycle event from `ndk-glue`, if any, as an [`AppCommand`].
pub fn poll_command<R>(make_renderer: impl FnOnce() -> R) -> Option<AppCommand<R>> {
    ndk_glue::poll_events().map(|event| AppCommand::from_event(&event, make_renderer))
}

/// `true` for motion events the application handles: pointer and joystick devices.
/// Everything else goes back to the OS.
pub fn motion_event_filter(source: Source) -> bool {
    matches!(
        source,
        Source::Touchscreen
            | Source::Mouse
            | Source::Stylus
            | Source::BluetoothStylus
            | Source::Joystick
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_from_event() {
        assert!(matches!(
            AppCommand::from_event(&Event::WindowCreated, || 7),
            AppCommand::SurfaceCreated(7)
        ));
        assert!(matches!(
            AppCommand::<u32>::from_event(&Event::WindowDestroyed, || unreachable!()),
            AppCommand::SurfaceDestroyed
        ));
        assert!(matches!(
            AppCommand::<u32>::from_event(&Event::Resume, || unreachable!()),
            AppCommand::Other
        ));
    }

    #[test]
    pub fn test_motion_event_filter() {
        assert!(motion_event_filter(Source::Touchscreen));
        assert!(motion_event_filter(Source::Mouse));
        assert!(motion_event_filter(Source::Joystick));
        assert!(!motion_event_filter(Source::Keyboard));
        assert!(!motion_event_filter(Source::Trackball));
        assert!(!motion_event_filter(Source::Gamepad));
    }
}
