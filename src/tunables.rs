//! Live-editable values and the targets they are bound to.

use log::info;

use crate::error::TunableError;
use crate::material::Color;

pub const PORTAL_COLOR_START: &str = "portalColorStart";
pub const PORTAL_COLOR_END: &str = "portalColorEnd";
pub const FIREFLIES_SIZE: &str = "firefliesSize";
pub const CLEAR_COLOR: &str = "clearColor";

/// What a tunable writes to when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunableBinding {
    PortalColorStart,
    PortalColorEnd,
    FirefliesSize,
    ClearColor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TunableValue {
    Color(Color),
    Scalar(f32),
}

/// Emitted for every accepted edit; applied by the uniform synchronizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunableChange {
    pub binding: TunableBinding,
    pub value: TunableValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl ScalarRange {
    /// Snaps to the step grid anchored at `min`, then clamps.
    pub fn constrain(&self, value: f32) -> f32 {
        let snapped = if self.step > 0.0 {
            let (units, scale) = decimal_step(self.step);
            let min = f64::from(self.min);
            let steps = ((f64::from(value) - min) * scale / units).round();
            (steps * units / scale + min) as f32
        } else {
            value
        };
        snapped.clamp(self.min, self.max)
    }
}

/// Splits a step into whole `units` of `1 / scale` so grid points are
/// computed from integers; an f32 step such as 0.001 is not exact.
fn decimal_step(step: f32) -> (f64, f64) {
    let step = f64::from(step);
    for digits in 0..=9 {
        let scale = 10f64.powi(digits);
        let units = (step * scale).round();
        if units >= 1.0 && (step * scale - units).abs() <= 1e-4 * units {
            return (units, scale);
        }
    }
    (step, 1.0)
}

/// Registration surface for a tunable panel.
pub trait TunableRegistry {
    fn register_color(&mut self, key: &'static str, initial: Color, binding: TunableBinding);
    fn register_scalar(
        &mut self,
        key: &'static str,
        initial: f32,
        range: ScalarRange,
        binding: TunableBinding,
    );
    fn set_visible(&mut self, visible: bool);
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: &'static str,
    value: TunableValue,
    range: Option<ScalarRange>,
    binding: TunableBinding,
}

/// In-process registry; edits come from the host (keyboard in debug mode).
#[derive(Debug, Default)]
pub struct Tunables {
    entries: Vec<Entry>,
    visible: bool,
}

impl Tunables {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_mut(&mut self, key: &str) -> Result<&mut Entry, TunableError> {
        self.entries
            .iter_mut()
            .find(|entry| entry.key == key)
            .ok_or_else(|| TunableError::UnknownKey(key.to_string()))
    }

    pub fn value(&self, key: &str) -> Option<TunableValue> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.key)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_color(&mut self, key: &str, color: Color) -> Result<TunableChange, TunableError> {
        let entry = self.entry_mut(key)?;
        if !matches!(entry.value, TunableValue::Color(_)) {
            return Err(TunableError::KindMismatch(key.to_string()));
        }
        entry.value = TunableValue::Color(color);
        Ok(TunableChange {
            binding: entry.binding,
            value: entry.value,
        })
    }

    pub fn set_scalar(&mut self, key: &str, value: f32) -> Result<TunableChange, TunableError> {
        let entry = self.entry_mut(key)?;
        let Some(range) = entry.range else {
            return Err(TunableError::KindMismatch(key.to_string()));
        };
        entry.value = TunableValue::Scalar(range.constrain(value));
        Ok(TunableChange {
            binding: entry.binding,
            value: entry.value,
        })
    }

    /// Adds `delta` to a scalar tunable.
    pub fn nudge_scalar(&mut self, key: &str, delta: f32) -> Result<TunableChange, TunableError> {
        match self.value(key) {
            Some(TunableValue::Scalar(current)) => self.set_scalar(key, current + delta),
            Some(TunableValue::Color(_)) => Err(TunableError::KindMismatch(key.to_string())),
            None => Err(TunableError::UnknownKey(key.to_string())),
        }
    }
}

impl TunableRegistry for Tunables {
    fn register_color(&mut self, key: &'static str, initial: Color, binding: TunableBinding) {
        if self.visible {
            info!("tunable {key} = {initial}");
        }
        self.entries.retain(|entry| entry.key != key);
        self.entries.push(Entry {
            key,
            value: TunableValue::Color(initial),
            range: None,
            binding,
        });
    }

    fn register_scalar(
        &mut self,
        key: &'static str,
        initial: f32,
        range: ScalarRange,
        binding: TunableBinding,
    ) {
        if self.visible {
            info!(
                "tunable {key} = {initial} in [{}, {}] step {}",
                range.min, range.max, range.step
            );
        }
        self.entries.retain(|entry| entry.key != key);
        self.entries.push(Entry {
            key,
            value: TunableValue::Scalar(initial),
            range: Some(range),
            binding,
        });
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// Initial values of the scene's tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunableDefaults {
    pub portal_color_start: Color,
    pub portal_color_end: Color,
    pub fireflies_size: f32,
    pub clear_color: Color,
}

pub const FIREFLIES_SIZE_RANGE: ScalarRange = ScalarRange {
    min: 0.0,
    max: 100.0,
    step: 0.001,
};

/// Registers the four scene tunables.
pub fn register_scene_tunables(registry: &mut dyn TunableRegistry, defaults: &TunableDefaults) {
    registry.register_color(
        PORTAL_COLOR_START,
        defaults.portal_color_start,
        TunableBinding::PortalColorStart,
    );
    registry.register_color(
        PORTAL_COLOR_END,
        defaults.portal_color_end,
        TunableBinding::PortalColorEnd,
    );
    registry.register_scalar(
        FIREFLIES_SIZE,
        defaults.fireflies_size,
        FIREFLIES_SIZE_RANGE,
        TunableBinding::FirefliesSize,
    );
    registry.register_color(CLEAR_COLOR, defaults.clear_color, TunableBinding::ClearColor);
}
