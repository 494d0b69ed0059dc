//! Feature toggle for proximity-gated wakes

use crate::lock;
use crate::sensor::ProximitySensorPort;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// On/off switch plus the cached sensor handle.
///
/// Disabling drops the cached handle, so a handle from an earlier enabled
/// period can never make [`FeatureToggle::has_capability`] true.
#[derive(Default)]
pub struct FeatureToggle {
    enabled: AtomicBool,
    sensor: Mutex<Option<Arc<dyn ProximitySensorPort>>>,
}

impl FeatureToggle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feature state.
    ///
    /// Returns `true` if the state changed.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if !enabled {
            lock(&self.sensor).take();
        }

        let changed = previous != enabled;
        if changed {
            debug!(enabled, "proximity wake gating toggled");
        }
        changed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Cache the sensor handle. Ignored while disabled.
    pub fn attach_sensor(&self, sensor: Arc<dyn ProximitySensorPort>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        *lock(&self.sensor) = Some(sensor);
        true
    }

    /// The cached sensor handle, if any
    pub fn sensor(&self) -> Option<Arc<dyn ProximitySensorPort>> {
        lock(&self.sensor).clone()
    }

    /// Enabled, a handle cached, and the sensor actually present
    pub fn has_capability(&self) -> bool {
        self.is_enabled()
            && lock(&self.sensor)
                .as_ref()
                .is_some_and(|sensor| sensor.has_capability())
    }
}

impl std::fmt::Debug for FeatureToggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureToggle")
            .field("enabled", &self.is_enabled())
            .field("sensor_cached", &lock(&self.sensor).is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::NoSensor;
    use crate::testing::ScriptedSensor;

    #[test]
    fn test_set_enabled_is_idempotent() {
        let toggle = FeatureToggle::new();
        assert!(!toggle.is_enabled());

        assert!(toggle.set_enabled(true));
        assert!(!toggle.set_enabled(true));
        assert!(toggle.is_enabled());

        assert!(toggle.set_enabled(false));
        assert!(!toggle.set_enabled(false));
        assert!(!toggle.is_enabled());
    }

    #[test]
    fn test_disable_clears_cached_sensor() {
        let toggle = FeatureToggle::new();
        toggle.set_enabled(true);
        assert!(toggle.attach_sensor(Arc::new(ScriptedSensor::silent())));
        assert!(toggle.has_capability());

        toggle.set_enabled(false);
        assert!(toggle.sensor().is_none());

        // Re-enabling alone does not bring the old handle back
        toggle.set_enabled(true);
        assert!(!toggle.has_capability());
    }

    #[test]
    fn test_attach_ignored_while_disabled() {
        let toggle = FeatureToggle::new();
        assert!(!toggle.attach_sensor(Arc::new(ScriptedSensor::silent())));
        assert!(toggle.sensor().is_none());
    }

    #[test]
    fn test_capability_requires_present_sensor() {
        let toggle = FeatureToggle::new();
        toggle.set_enabled(true);
        toggle.attach_sensor(Arc::new(NoSensor));
        assert!(!toggle.has_capability());
    }
}
