//! Command vocabulary: agent actuation, world control, and the JSON form
//! both sides exchange over the command channel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::agent::AgentDefinition;
use crate::error::CommandError;

/// A command targeting one agent's actuation buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentCommand {
    /// Target agent.
    pub agent: String,
    /// Command vector; its length must equal the agent's action dimension.
    pub payload: Vec<f32>,
}

/// Sky state. `Clear` is the default after every reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    /// No precipitation or cloud cover.
    #[default]
    Clear,
    /// Rain around each agent.
    Rain,
    /// Overcast sky.
    Cloudy,
}

impl FromStr for Weather {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clear" => Ok(Self::Clear),
            "rain" => Ok(Self::Rain),
            "cloudy" => Ok(Self::Cloudy),
            other => Err(CommandError::UnknownWeather(other.to_string())),
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clear => "clear",
            Self::Rain => "rain",
            Self::Cloudy => "cloudy",
        })
    }
}

/// World-level state a world command modifies.
///
/// Within one tick only the last staged command per property is sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorldProperty {
    /// Instantaneous hour of day.
    DayTime,
    /// Continuous sun rotation.
    DayCycle,
    /// Fog density.
    Fog,
    /// Precipitation and cloud cover.
    Weather,
    /// Observer camera pose.
    Camera,
    /// Ocean wave parameters.
    Ocean,
}

/// A world-level control command.
#[derive(Clone, Debug, PartialEq)]
pub enum WorldCommand {
    /// Jump the sun to `hour` (0-23).
    SetDayTime {
        /// Hour of day, 24-hour clock.
        hour: u32,
    },
    /// Rotate the sun continuously, one full day per `minutes_per_cycle`.
    StartDayCycle {
        /// Real-time minutes per simulated day.
        minutes_per_cycle: f32,
    },
    /// Set fog density in `[0, 1]`.
    SetFogDensity {
        /// Density, 1 is the maximum.
        density: f32,
    },
    /// Replace the current weather.
    SetWeather {
        /// New weather.
        kind: Weather,
    },
    /// Move the observer camera independently of any agent.
    TeleportCamera {
        /// World-space location.
        position: [f32; 3],
        /// Roll, pitch, yaw in degrees.
        rotation: [f32; 3],
    },
    /// Set ocean wave parameters. Validity of the values is world-specific.
    SetOceanState {
        /// Wave intensity.
        wave_intensity: f32,
        /// Wave size.
        wave_size: f32,
        /// Wave direction.
        wave_direction: f32,
    },
}

impl WorldCommand {
    /// The property this command overwrites.
    pub fn property(&self) -> WorldProperty {
        match self {
            Self::SetDayTime { .. } => WorldProperty::DayTime,
            Self::StartDayCycle { .. } => WorldProperty::DayCycle,
            Self::SetFogDensity { .. } => WorldProperty::Fog,
            Self::SetWeather { .. } => WorldProperty::Weather,
            Self::TeleportCamera { .. } => WorldProperty::Camera,
            Self::SetOceanState { .. } => WorldProperty::Ocean,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), CommandError> {
        match *self {
            Self::SetDayTime { hour } if hour > 23 => Err(CommandError::HourOutOfRange(hour)),
            Self::StartDayCycle { minutes_per_cycle }
                if !minutes_per_cycle.is_finite() || minutes_per_cycle <= 0.0 =>
            {
                Err(CommandError::InvalidDayCycle(minutes_per_cycle))
            }
            Self::SetFogDensity { density } if !(0.0..=1.0).contains(&density) => {
                Err(CommandError::FogDensityOutOfRange(density))
            }
            Self::TeleportCamera { position, rotation }
                if position.iter().chain(rotation.iter()).any(|v| !v.is_finite()) =>
            {
                Err(CommandError::NonFiniteCameraPose)
            }
            Self::SetOceanState {
                wave_intensity,
                wave_size,
                wave_direction,
            } if ![wave_intensity, wave_size, wave_direction]
                .iter()
                .all(|v| v.is_finite()) =>
            {
                Err(CommandError::NonFiniteOceanState)
            }
            _ => Ok(()),
        }
    }
}

/// Anything a caller can stage for the next tick.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Per-agent actuation.
    Agent(AgentCommand),
    /// World control.
    World(WorldCommand),
}

/// Out-of-band request written into an agent's control-flag mailbox.
///
/// The numeric codes are the mailbox wire values. The engine clears the
/// mailbox back to [`ControlFlag::Idle`] after acting on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlFlag {
    /// Nothing pending.
    Idle = 0,
    /// Move to the teleport payload's location.
    TeleportLocation = 1,
    /// Rotate to the teleport payload's rotation.
    TeleportRotation = 2,
    /// Apply both location and rotation.
    TeleportBoth = 3,
    /// Restore the agent to its initial state.
    Reset = 4,
}

impl ControlFlag {
    /// Decode a mailbox byte. Unknown values read as `None`.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Idle),
            1 => Some(Self::TeleportLocation),
            2 => Some(Self::TeleportRotation),
            3 => Some(Self::TeleportBoth),
            4 => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Teleport target: location, rotation, or both.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TeleportRequest {
    /// New world-space location.
    pub location: Option<[f32; 3]>,
    /// New roll, pitch, yaw.
    pub rotation: Option<[f32; 3]>,
}

impl TeleportRequest {
    /// The mailbox code for this request, or `None` if it is empty.
    pub fn flag(&self) -> Option<ControlFlag> {
        match (self.location.is_some(), self.rotation.is_some()) {
            (true, true) => Some(ControlFlag::TeleportBoth),
            (true, false) => Some(ControlFlag::TeleportLocation),
            (false, true) => Some(ControlFlag::TeleportRotation),
            (false, false) => None,
        }
    }

    /// Six-float payload: location xyz then rotation xyz, zero where absent.
    pub fn payload(&self) -> [f32; 6] {
        let l = self.location.unwrap_or_default();
        let r = self.rotation.unwrap_or_default();
        [l[0], l[1], l[2], r[0], r[1], r[2]]
    }
}

/// A queued agent spawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// The agent to create.
    pub definition: AgentDefinition,
    /// Spawn location.
    pub location: [f32; 3],
}

/// JSON form of a command on the command channel.
///
/// Serialized as `{"type": "<Variant>", "params": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum WireCommand {
    /// See [`WorldCommand::SetDayTime`].
    SetDayTime {
        /// Hour of day.
        hour: u32,
    },
    /// See [`WorldCommand::StartDayCycle`].
    StartDayCycle {
        /// Minutes per simulated day.
        minutes_per_cycle: f32,
    },
    /// See [`WorldCommand::SetFogDensity`].
    SetFogDensity {
        /// Fog density.
        density: f32,
    },
    /// See [`WorldCommand::SetWeather`].
    SetWeather {
        /// New weather.
        kind: Weather,
    },
    /// See [`WorldCommand::TeleportCamera`].
    TeleportCamera {
        /// Camera location.
        position: [f32; 3],
        /// Camera rotation.
        rotation: [f32; 3],
    },
    /// See [`WorldCommand::SetOceanState`].
    SetOceanState {
        /// Wave intensity.
        wave_intensity: f32,
        /// Wave size.
        wave_size: f32,
        /// Wave direction.
        wave_direction: f32,
    },
    /// Create a new agent at a location.
    SpawnAgent(SpawnRequest),
}

impl From<WorldCommand> for WireCommand {
    fn from(cmd: WorldCommand) -> Self {
        match cmd {
            WorldCommand::SetDayTime { hour } => Self::SetDayTime { hour },
            WorldCommand::StartDayCycle { minutes_per_cycle } => {
                Self::StartDayCycle { minutes_per_cycle }
            }
            WorldCommand::SetFogDensity { density } => Self::SetFogDensity { density },
            WorldCommand::SetWeather { kind } => Self::SetWeather { kind },
            WorldCommand::TeleportCamera { position, rotation } => {
                Self::TeleportCamera { position, rotation }
            }
            WorldCommand::SetOceanState {
                wave_intensity,
                wave_size,
                wave_direction,
            } => Self::SetOceanState {
                wave_intensity,
                wave_size,
                wave_direction,
            },
        }
    }
}

impl From<SpawnRequest> for WireCommand {
    fn from(req: SpawnRequest) -> Self {
        Self::SpawnAgent(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use crate::sensor::SensorKind;

    #[test]
    fn weather_parses_case_insensitively() {
        assert_eq!("Rain".parse::<Weather>(), Ok(Weather::Rain));
        assert_eq!("cloudy".parse::<Weather>(), Ok(Weather::Cloudy));
        assert_eq!(
            "Snow".parse::<Weather>(),
            Err(CommandError::UnknownWeather("snow".to_string()))
        );
        assert_eq!(Weather::default(), Weather::Clear);
    }

    #[test]
    fn world_command_ranges() {
        assert!(WorldCommand::SetDayTime { hour: 23 }.validate().is_ok());
        assert_eq!(
            WorldCommand::SetDayTime { hour: 24 }.validate(),
            Err(CommandError::HourOutOfRange(24))
        );
        assert!(WorldCommand::StartDayCycle { minutes_per_cycle: 5.0 }.validate().is_ok());
        assert!(WorldCommand::StartDayCycle { minutes_per_cycle: 0.0 }.validate().is_err());
        assert!(WorldCommand::StartDayCycle { minutes_per_cycle: f32::NAN }.validate().is_err());
        assert!(WorldCommand::SetFogDensity { density: 0.25 }.validate().is_ok());
        assert_eq!(
            WorldCommand::SetFogDensity { density: 1.5 }.validate(),
            Err(CommandError::FogDensityOutOfRange(1.5))
        );
        assert!(WorldCommand::SetFogDensity { density: f32::NAN }.validate().is_err());
        assert!(WorldCommand::TeleportCamera {
            position: [1000.0; 3],
            rotation: [0.0; 3]
        }
        .validate()
        .is_ok());
        let ocean = WorldCommand::SetOceanState {
            wave_intensity: 13.0,
            wave_size: 1.0,
            wave_direction: f32::INFINITY,
        };
        assert_eq!(ocean.validate(), Err(CommandError::NonFiniteOceanState));
    }

    #[test]
    fn weather_commands_share_a_property() {
        let rain = WorldCommand::SetWeather { kind: Weather::Rain };
        let cloudy = WorldCommand::SetWeather { kind: Weather::Cloudy };
        assert_eq!(rain.property(), cloudy.property());
        assert_ne!(
            WorldCommand::SetDayTime { hour: 6 }.property(),
            WorldCommand::StartDayCycle { minutes_per_cycle: 5.0 }.property()
        );
    }

    #[test]
    fn teleport_flag_codes() {
        let both = TeleportRequest {
            location: Some([1.0, 2.0, 3.0]),
            rotation: Some([4.0, 5.0, 6.0]),
        };
        assert_eq!(both.flag(), Some(ControlFlag::TeleportBoth));
        assert_eq!(both.payload(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let loc = TeleportRequest {
            location: Some([1.0, 1.0, 5.0]),
            rotation: None,
        };
        assert_eq!(loc.flag(), Some(ControlFlag::TeleportLocation));
        assert_eq!(loc.payload()[3..], [0.0; 3]);
        assert_eq!(TeleportRequest::default().flag(), None);
        assert_eq!(ControlFlag::from_u8(4), Some(ControlFlag::Reset));
        assert_eq!(ControlFlag::from_u8(9), None);
    }

    #[test]
    fn wire_format_is_type_and_params() {
        let json = serde_json::to_value(WireCommand::from(WorldCommand::SetWeather {
            kind: Weather::Cloudy,
        }))
        .unwrap();
        assert_eq!(json["type"], "SetWeather");
        assert_eq!(json["params"]["kind"], "cloudy");

        let spawn = WireCommand::from(SpawnRequest {
            definition: AgentDefinition::new("uav1", AgentKind::Uav, vec![SensorKind::Location]),
            location: [1.0, 1.0, 5.0],
        });
        let text = serde_json::to_string(&spawn).unwrap();
        let back: WireCommand = serde_json::from_str(&text).unwrap();
        assert_eq!(back, spawn);
    }
}
