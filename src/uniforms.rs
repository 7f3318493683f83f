//! Writes per-frame and tunable-driven values into shader uniforms.

use crate::error::UniformError;
use crate::material::{self, MaterialId, MaterialSet, UniformKind, UniformValue};
use crate::tunables::{TunableBinding, TunableChange, TunableValue};
use crate::viewport::RenderSurface;

/// Writes elapsed seconds into the portal and firefly `uTime`.
pub fn push_time(materials: &mut MaterialSet, elapsed: f32) -> Result<(), UniformError> {
    for id in [MaterialId::Fireflies, MaterialId::Portal] {
        materials.set_uniform(id, material::TIME, UniformValue::Float(elapsed))?;
    }
    Ok(())
}

fn uniform_value(value: TunableValue) -> UniformValue {
    match value {
        TunableValue::Color(color) => UniformValue::Color(color),
        TunableValue::Scalar(scalar) => UniformValue::Float(scalar),
    }
}

/// Applies one tunable change to its single target. Values are written
/// as given.
pub fn apply_tunable(
    change: &TunableChange,
    materials: &mut MaterialSet,
    surface: &mut dyn RenderSurface,
) -> Result<(), UniformError> {
    let value = uniform_value(change.value);
    match change.binding {
        TunableBinding::PortalColorStart => {
            materials.set_uniform(MaterialId::Portal, material::COLOR_START, value)
        }
        TunableBinding::PortalColorEnd => {
            materials.set_uniform(MaterialId::Portal, material::COLOR_END, value)
        }
        TunableBinding::FirefliesSize => {
            materials.set_uniform(MaterialId::Fireflies, material::SIZE, value)
        }
        TunableBinding::ClearColor => match change.value {
            TunableValue::Color(color) => {
                surface.set_clear_color(color);
                Ok(())
            }
            TunableValue::Scalar(_) => Err(UniformError::KindMismatch {
                material: "renderer",
                name: "clearColor".to_string(),
                expected: UniformKind::Color,
                actual: UniformKind::Float,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Color, MaterialSettings};
    use crate::viewport::tests::RecordingSurface;

    fn materials() -> MaterialSet {
        MaterialSet::new(&MaterialSettings {
            baked_texture: None,
            portal_color_start: Color::BLACK,
            portal_color_end: Color::from_hex(0xb358fe),
            fireflies_size: 90.0,
            pixel_ratio: 1.5,
        })
    }

    #[test]
    fn time_reaches_portal_and_fireflies_only() {
        let mut materials = materials();
        let before = materials.clone();
        push_time(&mut materials, 3.25).unwrap();
        assert_eq!(materials.portal().float(material::TIME), Some(3.25));
        assert_eq!(materials.fireflies().float(material::TIME), Some(3.25));
        assert_eq!(
            materials.fireflies().float(material::SIZE),
            before.fireflies().float(material::SIZE)
        );
        assert_eq!(
            materials.portal().color(material::COLOR_END),
            before.portal().color(material::COLOR_END)
        );
    }

    #[test]
    fn each_binding_touches_exactly_its_target() {
        let cases = [
            TunableChange {
                binding: TunableBinding::PortalColorStart,
                value: TunableValue::Color(Color::WHITE),
            },
            TunableChange {
                binding: TunableBinding::PortalColorEnd,
                value: TunableValue::Color(Color::WHITE),
            },
            TunableChange {
                binding: TunableBinding::FirefliesSize,
                value: TunableValue::Scalar(12.0),
            },
            TunableChange {
                binding: TunableBinding::ClearColor,
                value: TunableValue::Color(Color::WHITE),
            },
        ];
        for change in cases {
            let mut materials = materials();
            let original = materials.clone();
            let mut surface = RecordingSurface::default();
            apply_tunable(&change, &mut materials, &mut surface).unwrap();

            let portal_changed = materials.portal() != original.portal();
            let fireflies_changed = materials.fireflies() != original.fireflies();
            let clear_changed = surface.clear_color.is_some();
            let expected = match change.binding {
                TunableBinding::PortalColorStart | TunableBinding::PortalColorEnd => (true, false, false),
                TunableBinding::FirefliesSize => (false, true, false),
                TunableBinding::ClearColor => (false, false, true),
            };
            assert_eq!((portal_changed, fireflies_changed, clear_changed), expected);
            if change.binding == TunableBinding::PortalColorStart {
                assert_eq!(materials.portal().color(material::COLOR_START), Some(Color::WHITE));
                assert_eq!(
                    materials.portal().color(material::COLOR_END),
                    original.portal().color(material::COLOR_END)
                );
            }
        }
    }

    #[test]
    fn values_are_not_clamped() {
        let mut materials = materials();
        let change = TunableChange {
            binding: TunableBinding::FirefliesSize,
            value: TunableValue::Scalar(500.0),
        };
        apply_tunable(&change, &mut materials, &mut RecordingSurface::default()).unwrap();
        assert_eq!(materials.fireflies().float(material::SIZE), Some(500.0));
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let mut materials = materials();
        let change = TunableChange {
            binding: TunableBinding::PortalColorEnd,
            value: TunableValue::Scalar(1.0),
        };
        assert!(apply_tunable(&change, &mut materials, &mut RecordingSurface::default()).is_err());
    }
}
