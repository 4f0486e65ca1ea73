//! The sensor registry: the wire contract for observation buffers.
//!
//! Each [`SensorKind`] maps to a fixed identifier, name, dtype and default
//! shape. Both processes derive buffer sizes from this table independently,
//! so every entry is part of the wire format:
//!
//! | id | name | shape | dtype |
//! |----|------|-------|-------|
//! | 1 | Terminal | `[1]` | bool |
//! | 2 | Reward | `[1]` | float32 |
//! | 3 | ViewportCapture | `[512, 512, 4]` (resizable) | uint8 |
//! | 4 | RGBCamera | `[256, 256, 4]` (resizable) | uint8 |
//! | 5 | OrientationSensor | `[3, 3]` | float32 |
//! | 6 | IMUSensor | `[2, 3]` | float32 |
//! | 7 | JointRotationSensor | `[94]` | float32 |
//! | 8 | RelativeSkeletalPositionSensor | `[67, 4]` | float32 |
//! | 9 | LocationSensor | `[3]` | float32 |
//! | 10 | VelocitySensor | `[3]` | float32 |
//! | 11 | RotationSensor | `[3]` | float32 |
//! | 12 | CollisionSensor | `[1]` | bool |
//! | 13 | PressureSensor | `[192]` | float32 |
//!
//! Adding a sensor is a table edit. The only mutable part is the shape of
//! the two camera sensors, held per environment in [`SensorRegistry`] and
//! frozen once a buffer has been allocated under it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dtype::{Dtype, Shape};
use crate::error::RegistryError;

/// Every registered sensor type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorKind {
    /// Episode-termination flag.
    #[serde(rename = "Terminal")]
    Terminal = 1,
    /// Scalar reward.
    #[serde(rename = "Reward")]
    Reward = 2,
    /// Primary viewport camera (RGBA).
    #[serde(rename = "ViewportCapture")]
    ViewportCapture = 3,
    /// Agent-mounted RGBA camera.
    #[serde(rename = "RGBCamera")]
    RgbCamera = 4,
    /// 3x3 orientation matrix (forward, right, up).
    #[serde(rename = "OrientationSensor")]
    Orientation = 5,
    /// Linear acceleration and angular velocity.
    #[serde(rename = "IMUSensor")]
    Imu = 6,
    /// Per-joint rotations of an articulated agent.
    #[serde(rename = "JointRotationSensor")]
    JointRotation = 7,
    /// Bone positions relative to the skeleton root, as quaternions.
    #[serde(rename = "RelativeSkeletalPositionSensor")]
    RelativeSkeletalPosition = 8,
    /// World-space location.
    #[serde(rename = "LocationSensor")]
    Location = 9,
    /// World-space velocity.
    #[serde(rename = "VelocitySensor")]
    Velocity = 10,
    /// Roll, pitch, yaw.
    #[serde(rename = "RotationSensor")]
    Rotation = 11,
    /// Whether the agent is touching anything.
    #[serde(rename = "CollisionSensor")]
    Collision = 12,
    /// Contact pressure: 48 points of (x, y, z, magnitude).
    #[serde(rename = "PressureSensor")]
    Pressure = 13,
}

struct Entry {
    kind: SensorKind,
    name: &'static str,
    dtype: Dtype,
    shape: &'static [usize],
    resizable: bool,
}

#[rustfmt::skip]
const TABLE: [Entry; SensorKind::COUNT] = [
    Entry { kind: SensorKind::Terminal, name: "Terminal", dtype: Dtype::Bool, shape: &[1], resizable: false },
    Entry { kind: SensorKind::Reward, name: "Reward", dtype: Dtype::F32, shape: &[1], resizable: false },
    Entry { kind: SensorKind::ViewportCapture, name: "ViewportCapture", dtype: Dtype::U8, shape: &[512, 512, 4], resizable: true },
    Entry { kind: SensorKind::RgbCamera, name: "RGBCamera", dtype: Dtype::U8, shape: &[256, 256, 4], resizable: true },
    Entry { kind: SensorKind::Orientation, name: "OrientationSensor", dtype: Dtype::F32, shape: &[3, 3], resizable: false },
    Entry { kind: SensorKind::Imu, name: "IMUSensor", dtype: Dtype::F32, shape: &[2, 3], resizable: false },
    Entry { kind: SensorKind::JointRotation, name: "JointRotationSensor", dtype: Dtype::F32, shape: &[94], resizable: false },
    Entry { kind: SensorKind::RelativeSkeletalPosition, name: "RelativeSkeletalPositionSensor", dtype: Dtype::F32, shape: &[67, 4], resizable: false },
    Entry { kind: SensorKind::Location, name: "LocationSensor", dtype: Dtype::F32, shape: &[3], resizable: false },
    Entry { kind: SensorKind::Velocity, name: "VelocitySensor", dtype: Dtype::F32, shape: &[3], resizable: false },
    Entry { kind: SensorKind::Rotation, name: "RotationSensor", dtype: Dtype::F32, shape: &[3], resizable: false },
    Entry { kind: SensorKind::Collision, name: "CollisionSensor", dtype: Dtype::Bool, shape: &[1], resizable: false },
    Entry { kind: SensorKind::Pressure, name: "PressureSensor", dtype: Dtype::F32, shape: &[48 * 4], resizable: false },
];

impl SensorKind {
    /// Number of registered sensor kinds.
    pub const COUNT: usize = 13;

    /// All sensor kinds in identifier order.
    pub const ALL: [SensorKind; Self::COUNT] = [
        Self::Terminal,
        Self::Reward,
        Self::ViewportCapture,
        Self::RgbCamera,
        Self::Orientation,
        Self::Imu,
        Self::JointRotation,
        Self::RelativeSkeletalPosition,
        Self::Location,
        Self::Velocity,
        Self::Rotation,
        Self::Collision,
        Self::Pressure,
    ];

    fn entry(self) -> &'static Entry {
        let entry = &TABLE[self.index()];
        debug_assert_eq!(entry.kind, self);
        entry
    }

    fn index(self) -> usize {
        self as usize - 1
    }

    /// Numeric wire identifier.
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Wire name, also used to derive buffer names.
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Element dtype.
    pub fn dtype(self) -> Dtype {
        self.entry().dtype
    }

    /// Shape before any per-environment override.
    pub fn default_shape(self) -> &'static [usize] {
        self.entry().shape
    }

    /// Whether the shape may be overridden per environment.
    pub fn is_resizable(self) -> bool {
        self.entry().resizable
    }

    /// Look up a kind by numeric identifier.
    pub fn from_id(id: u32) -> Result<Self, RegistryError> {
        usize::try_from(id)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(RegistryError::UnknownSensorId(id))
    }

    /// Look up a kind by wire name.
    pub fn from_name(name: &str) -> Result<Self, RegistryError> {
        TABLE
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.kind)
            .ok_or_else(|| RegistryError::UnknownSensorName(name.to_string()))
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved description of one sensor type in one environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorDescriptor {
    /// The sensor kind.
    pub kind: SensorKind,
    /// Wire name.
    pub name: &'static str,
    /// Element dtype.
    pub dtype: Dtype,
    /// Element shape, including any camera override.
    pub shape: Shape,
}

impl SensorDescriptor {
    /// Numeric wire identifier.
    pub fn type_id(&self) -> u32 {
        self.kind.id()
    }

    /// Byte length of one buffer of this sensor.
    pub fn byte_len(&self) -> usize {
        // Registered shapes are small; overrides are validated on entry.
        self.dtype.byte_len(&self.shape).unwrap_or(0)
    }
}

/// Per-environment view of the sensor table.
///
/// Lookups never default: unknown ids and names are errors. Camera shapes
/// can be changed with [`set_dynamic_shape`](Self::set_dynamic_shape) until
/// the first buffer for that sensor is allocated, after which the owning
/// environment calls [`lock`](Self::lock) and further resizes fail with
/// [`RegistryError::ConfigurationLocked`].
#[derive(Clone, Debug)]
pub struct SensorRegistry {
    shapes: [Shape; SensorKind::COUNT],
    locked: [bool; SensorKind::COUNT],
}

impl SensorRegistry {
    /// A registry with every sensor at its default shape.
    pub fn new() -> Self {
        Self {
            shapes: std::array::from_fn(|i| Shape::from_slice(TABLE[i].shape)),
            locked: [false; SensorKind::COUNT],
        }
    }

    /// Resolve a numeric identifier.
    pub fn descriptor_for(&self, type_id: u32) -> Result<SensorDescriptor, RegistryError> {
        SensorKind::from_id(type_id).map(|kind| self.descriptor(kind))
    }

    /// Resolve a kind.
    pub fn descriptor(&self, kind: SensorKind) -> SensorDescriptor {
        SensorDescriptor {
            kind,
            name: kind.name(),
            dtype: kind.dtype(),
            shape: self.shapes[kind.index()].clone(),
        }
    }

    /// Resolve a wire name to its numeric identifier.
    pub fn type_id_for(&self, name: &str) -> Result<u32, RegistryError> {
        SensorKind::from_name(name).map(SensorKind::id)
    }

    /// Current shape of a sensor.
    pub fn shape(&self, kind: SensorKind) -> &[usize] {
        &self.shapes[kind.index()]
    }

    /// Override the shape of a resizable sensor.
    ///
    /// Camera shapes must be `[height, width, 4]` with non-zero height and
    /// width.
    pub fn set_dynamic_shape(
        &mut self,
        type_id: u32,
        shape: &[usize],
    ) -> Result<(), RegistryError> {
        let kind = SensorKind::from_id(type_id)?;
        if !kind.is_resizable() {
            return Err(RegistryError::NotResizable { sensor: kind });
        }
        if self.locked[kind.index()] {
            return Err(RegistryError::ConfigurationLocked { sensor: kind });
        }
        let invalid = |reason| RegistryError::InvalidShape {
            sensor: kind,
            shape: shape.to_vec(),
            reason,
        };
        if shape.len() != 3 || shape[2] != 4 {
            return Err(invalid("camera shape must be [height, width, 4]"));
        }
        if shape.contains(&0) {
            return Err(invalid("dimensions must be non-zero"));
        }
        if kind.dtype().byte_len(shape).is_none() {
            return Err(invalid("byte length overflows"));
        }
        self.shapes[kind.index()] = Shape::from_slice(shape);
        Ok(())
    }

    /// Convenience for `set_dynamic_shape(kind, [height, width, 4])`.
    pub fn set_camera_size(
        &mut self,
        kind: SensorKind,
        height: usize,
        width: usize,
    ) -> Result<(), RegistryError> {
        self.set_dynamic_shape(kind.id(), &[height, width, 4])
    }

    /// Freeze a sensor's shape. Idempotent.
    pub fn lock(&mut self, kind: SensorKind) {
        self.locked[kind.index()] = true;
    }

    /// Whether a sensor's shape is frozen.
    pub fn is_locked(&self, kind: SensorKind) -> bool {
        self.locked[kind.index()]
    }

    /// Descriptors for every registered sensor.
    pub fn iter(&self) -> impl Iterator<Item = SensorDescriptor> + '_ {
        SensorKind::ALL.into_iter().map(|k| self.descriptor(k))
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn table_matches_wire_contract() {
        let reg = SensorRegistry::new();
        let expect: [(u32, &str, &[usize], Dtype); 13] = [
            (1, "Terminal", &[1], Dtype::Bool),
            (2, "Reward", &[1], Dtype::F32),
            (3, "ViewportCapture", &[512, 512, 4], Dtype::U8),
            (4, "RGBCamera", &[256, 256, 4], Dtype::U8),
            (5, "OrientationSensor", &[3, 3], Dtype::F32),
            (6, "IMUSensor", &[2, 3], Dtype::F32),
            (7, "JointRotationSensor", &[94], Dtype::F32),
            (8, "RelativeSkeletalPositionSensor", &[67, 4], Dtype::F32),
            (9, "LocationSensor", &[3], Dtype::F32),
            (10, "VelocitySensor", &[3], Dtype::F32),
            (11, "RotationSensor", &[3], Dtype::F32),
            (12, "CollisionSensor", &[1], Dtype::Bool),
            (13, "PressureSensor", &[192], Dtype::F32),
        ];
        for (id, name, shape, dtype) in expect {
            let d = reg.descriptor_for(id).unwrap();
            assert_eq!(d.type_id(), id);
            assert_eq!(d.name, name);
            assert_eq!(&d.shape[..], shape);
            assert_eq!(d.dtype, dtype);
            assert_eq!(reg.type_id_for(name).unwrap(), id);
        }
    }

    #[test]
    fn only_cameras_are_resizable() {
        let resizable: Vec<_> = SensorKind::ALL
            .into_iter()
            .filter(|k| k.is_resizable())
            .collect();
        assert_eq!(resizable, vec![SensorKind::ViewportCapture, SensorKind::RgbCamera]);
    }

    #[test]
    fn unknown_lookups_fail() {
        let reg = SensorRegistry::new();
        assert_eq!(reg.descriptor_for(0), Err(RegistryError::UnknownSensorId(0)));
        assert_eq!(reg.descriptor_for(14), Err(RegistryError::UnknownSensorId(14)));
        assert_eq!(
            reg.type_id_for("PixelCamera"),
            Err(RegistryError::UnknownSensorName("PixelCamera".into()))
        );
    }

    #[test]
    fn camera_resize_before_lock() {
        let mut reg = SensorRegistry::new();
        reg.set_camera_size(SensorKind::RgbCamera, 128, 64).unwrap();
        assert_eq!(reg.shape(SensorKind::RgbCamera), &[128, 64, 4]);
        assert_eq!(reg.descriptor(SensorKind::RgbCamera).byte_len(), 128 * 64 * 4);
        // The other camera is untouched.
        assert_eq!(reg.shape(SensorKind::ViewportCapture), &[512, 512, 4]);
    }

    #[test]
    fn resize_after_lock_is_rejected() {
        let mut reg = SensorRegistry::new();
        reg.lock(SensorKind::ViewportCapture);
        let err = reg.set_dynamic_shape(3, &[64, 64, 4]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::ConfigurationLocked {
                sensor: SensorKind::ViewportCapture
            }
        );
        assert_eq!(reg.shape(SensorKind::ViewportCapture), &[512, 512, 4]);
    }

    #[test]
    fn fixed_sensors_reject_resize() {
        let mut reg = SensorRegistry::new();
        assert_eq!(
            reg.set_dynamic_shape(9, &[4]),
            Err(RegistryError::NotResizable {
                sensor: SensorKind::Location
            })
        );
    }

    #[test]
    fn malformed_camera_shapes_rejected() {
        let mut reg = SensorRegistry::new();
        assert!(matches!(
            reg.set_dynamic_shape(4, &[64, 64, 3]),
            Err(RegistryError::InvalidShape { .. })
        ));
        assert!(matches!(
            reg.set_dynamic_shape(4, &[0, 64, 4]),
            Err(RegistryError::InvalidShape { .. })
        ));
        assert!(matches!(
            reg.set_dynamic_shape(4, &[64, 4]),
            Err(RegistryError::InvalidShape { .. })
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&SensorKind::RgbCamera).unwrap();
        assert_eq!(json, "\"RGBCamera\"");
        let k: SensorKind = serde_json::from_str("\"IMUSensor\"").unwrap();
        assert_eq!(k, SensorKind::Imu);
    }

    proptest! {
        #[test]
        fn id_and_name_lookups_agree(id in 1u32..=13) {
            let kind = SensorKind::from_id(id).unwrap();
            prop_assert_eq!(kind.id(), id);
            prop_assert_eq!(SensorKind::from_name(kind.name()).unwrap(), kind);
            prop_assert!(SensorRegistry::new().descriptor(kind).byte_len() > 0);
        }

        #[test]
        fn ids_outside_table_are_unknown(id in 14u32..) {
            prop_assert_eq!(SensorKind::from_id(id), Err(RegistryError::UnknownSensorId(id)));
        }

        #[test]
        fn valid_camera_sizes_accepted(h in 1usize..2048, w in 1usize..2048) {
            let mut reg = SensorRegistry::new();
            reg.set_camera_size(SensorKind::ViewportCapture, h, w).unwrap();
            prop_assert_eq!(reg.descriptor(SensorKind::ViewportCapture).byte_len(), h * w * 4);
        }
    }
}
