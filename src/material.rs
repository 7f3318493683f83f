use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{ColorParseError, UniformError};

/// RGB color with components in `[0, 1]`, stored in sRGB space as authored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Builds a color from a `0xRRGGBB` literal.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
        Self::new(channel(16), channel(8), channel(0))
    }

    /// Parses `#rrggbb`, `rrggbb` or `0xrrggbb`.
    pub fn parse(text: &str) -> Result<Self, ColorParseError> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .unwrap_or(trimmed);
        if digits.len() != 6 {
            return Err(ColorParseError(text.to_string()));
        }
        u32::from_str_radix(digits, 16)
            .map(Self::from_hex)
            .map_err(|_| ColorParseError(text.to_string()))
    }

    pub fn to_hex(self) -> u32 {
        let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    /// Converts the authored sRGB value into linear space for shading.
    pub fn to_linear(self) -> Vec3 {
        fn decode(c: f32) -> f32 {
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        Vec3::new(decode(self.r), decode(self.g), decode(self.b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Color,
    Vec3,
}

/// Current value of a named shader input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Color(Color),
    Vec3(Vec3),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Color(_) => UniformKind::Color,
            Self::Vec3(_) => UniformKind::Vec3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blending {
    #[default]
    Normal,
    Additive,
}

/// GPU program a shader material is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    Portal,
    Fireflies,
    Fire,
}

/// Material driven by an opaque shader program and a table of named uniforms.
///
/// The table is fixed at construction: writes may change values but never
/// add names or change a uniform's kind, so the program always finds every
/// input it consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderMaterial {
    label: &'static str,
    program: ShaderProgram,
    uniforms: BTreeMap<&'static str, UniformValue>,
    pub blending: Blending,
    pub transparent: bool,
    pub depth_write: bool,
    pub side: Side,
}

impl ShaderMaterial {
    pub fn new(
        label: &'static str,
        program: ShaderProgram,
        uniforms: impl IntoIterator<Item = (&'static str, UniformValue)>,
    ) -> Self {
        Self {
            label,
            program,
            uniforms: uniforms.into_iter().collect(),
            blending: Blending::Normal,
            transparent: false,
            depth_write: true,
            side: Side::Front,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn program(&self) -> ShaderProgram {
        self.program
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    pub fn uniforms(&self) -> impl Iterator<Item = (&'static str, UniformValue)> + '_ {
        self.uniforms.iter().map(|(name, value)| (*name, *value))
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.uniform(name)? {
            UniformValue::Float(value) => Some(value),
            _ => None,
        }
    }

    pub fn color(&self, name: &str) -> Option<Color> {
        match self.uniform(name)? {
            UniformValue::Color(value) => Some(value),
            _ => None,
        }
    }

    pub fn vec3(&self, name: &str) -> Option<Vec3> {
        match self.uniform(name)? {
            UniformValue::Vec3(value) => Some(value),
            _ => None,
        }
    }

    /// Writes a uniform, rejecting unknown names and kind changes.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        let label = self.label;
        let slot = self.uniforms.get_mut(name).ok_or_else(|| UniformError::Unknown {
            material: label,
            name: name.to_string(),
        })?;
        if slot.kind() != value.kind() {
            return Err(UniformError::KindMismatch {
                material: label,
                name: name.to_string(),
                expected: slot.kind(),
                actual: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureSource {
    pub path: PathBuf,
    pub flip_y: bool,
    pub srgb: bool,
}

/// Unlit material, optionally texture mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub depth_write: bool,
    pub side: Side,
    pub map: Option<TextureSource>,
}

impl Default for BasicMaterial {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            opacity: 1.0,
            transparent: false,
            depth_write: true,
            side: Side::Front,
            map: None,
        }
    }
}

/// Metal/roughness material.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub color: Color,
    pub metalness: f32,
    pub roughness: f32,
    pub emissive: Color,
    pub side: Side,
}

/// Identifies a material slot; fire materials are owned by their effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialId {
    Baked,
    PoleLight,
    Portal,
    LightStand,
    Fireflies,
    Fire(usize),
}

/// Borrowed view of any material kind.
#[derive(Debug, Clone, Copy)]
pub enum MaterialRef<'a> {
    Basic(&'a BasicMaterial),
    Standard(&'a StandardMaterial),
    Shader(&'a ShaderMaterial),
}

impl MaterialRef<'_> {
    pub fn is_transparent(&self) -> bool {
        match self {
            Self::Basic(material) => material.transparent,
            Self::Standard(_) => false,
            Self::Shader(material) => material.transparent,
        }
    }
}

pub const TIME: &str = "uTime";
pub const COLOR_START: &str = "uColorStart";
pub const COLOR_END: &str = "uColorEnd";
pub const PIXEL_RATIO: &str = "uPixelRatio";
pub const SIZE: &str = "uSize";
pub const CAMERA_POSITION: &str = "uCameraPosition";

/// Initial values for the scene's fixed material slots.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSettings {
    pub baked_texture: Option<TextureSource>,
    pub portal_color_start: Color,
    pub portal_color_end: Color,
    pub fireflies_size: f32,
    pub pixel_ratio: f32,
}

/// The five materials the scene is composed from.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSet {
    baked: BasicMaterial,
    pole_light: BasicMaterial,
    portal: ShaderMaterial,
    light_stand: StandardMaterial,
    fireflies: ShaderMaterial,
}

impl MaterialSet {
    pub fn new(settings: &MaterialSettings) -> Self {
        let baked = BasicMaterial {
            map: settings.baked_texture.clone(),
            ..BasicMaterial::default()
        };

        // Window glass over the lantern emission mesh.
        let pole_light = BasicMaterial {
            color: Color::from_hex(0x6b89ff),
            opacity: 0.2,
            transparent: true,
            depth_write: false,
            ..BasicMaterial::default()
        };

        let mut portal = ShaderMaterial::new(
            "portal",
            ShaderProgram::Portal,
            [
                (TIME, UniformValue::Float(0.0)),
                (COLOR_START, UniformValue::Color(settings.portal_color_start)),
                (COLOR_END, UniformValue::Color(settings.portal_color_end)),
            ],
        );
        portal.side = Side::Double;

        let light_stand = StandardMaterial {
            color: Color::from_hex(0xc2c2c2),
            metalness: 0.8,
            roughness: 0.1,
            emissive: Color::BLACK,
            side: Side::Front,
        };

        let mut fireflies = ShaderMaterial::new(
            "fireflies",
            ShaderProgram::Fireflies,
            [
                (TIME, UniformValue::Float(0.0)),
                (PIXEL_RATIO, UniformValue::Float(settings.pixel_ratio)),
                (SIZE, UniformValue::Float(settings.fireflies_size)),
            ],
        );
        fireflies.transparent = true;
        fireflies.blending = Blending::Additive;
        fireflies.depth_write = false;

        Self {
            baked,
            pole_light,
            portal,
            light_stand,
            fireflies,
        }
    }

    /// Returns the material for a fixed slot; fire slots are not held here.
    pub fn get(&self, id: MaterialId) -> Option<MaterialRef<'_>> {
        Some(match id {
            MaterialId::Baked => MaterialRef::Basic(&self.baked),
            MaterialId::PoleLight => MaterialRef::Basic(&self.pole_light),
            MaterialId::Portal => MaterialRef::Shader(&self.portal),
            MaterialId::LightStand => MaterialRef::Standard(&self.light_stand),
            MaterialId::Fireflies => MaterialRef::Shader(&self.fireflies),
            MaterialId::Fire(_) => return None,
        })
    }

    pub fn baked(&self) -> &BasicMaterial {
        &self.baked
    }

    pub fn baked_mut(&mut self) -> &mut BasicMaterial {
        &mut self.baked
    }

    pub fn portal(&self) -> &ShaderMaterial {
        &self.portal
    }

    pub fn fireflies(&self) -> &ShaderMaterial {
        &self.fireflies
    }

    pub fn shader_mut(&mut self, id: MaterialId) -> Result<&mut ShaderMaterial, UniformError> {
        match id {
            MaterialId::Portal => Ok(&mut self.portal),
            MaterialId::Fireflies => Ok(&mut self.fireflies),
            MaterialId::Baked => Err(UniformError::NotShader("baked")),
            MaterialId::PoleLight => Err(UniformError::NotShader("pole-light")),
            MaterialId::LightStand => Err(UniformError::NotShader("light-stand")),
            MaterialId::Fire(_) => Err(UniformError::NotShader("fire")),
        }
    }

    pub fn set_uniform(
        &mut self,
        id: MaterialId,
        name: &str,
        value: UniformValue,
    ) -> Result<(), UniformError> {
        self.shader_mut(id)?.set_uniform(name, value)
    }
}
