//! Agent definitions: what an agent is called, how it is actuated, and
//! which sensors it carries.

use serde::{Deserialize, Serialize};

use crate::error::AgentDefinitionError;
use crate::sensor::SensorKind;

/// Agent body type. Determines the length of the command vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Quadcopter: roll, pitch, yaw rate, altitude (or four thrusts).
    Uav,
    /// Sphere robot with a single discrete action.
    Sphere,
    /// Humanoid with one torque per joint.
    Android,
    /// Navigation agent steered by a target location.
    Nav,
    /// Differential-drive turtle: forward force, rotational force.
    Turtle,
    /// Any other body, with an explicit action length.
    Custom {
        /// Length of the command vector.
        action_dim: usize,
    },
}

impl AgentKind {
    /// Number of `f32` entries in this agent's command buffer.
    pub fn action_dim(self) -> usize {
        match self {
            Self::Uav => 4,
            Self::Sphere => 1,
            Self::Android => 94,
            Self::Nav => 3,
            Self::Turtle => 2,
            Self::Custom { action_dim } => action_dim,
        }
    }
}

/// Declaration of an agent, either at environment construction or in a
/// spawn request.
///
/// Every agent reports [`SensorKind::Terminal`] and [`SensorKind::Reward`]
/// whether or not they are listed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique agent name. Prefixes every buffer the agent owns.
    pub name: String,
    /// Body type.
    pub kind: AgentKind,
    /// Declared sensors, in declaration order.
    pub sensors: Vec<SensorKind>,
}

impl AgentDefinition {
    /// Create a definition.
    pub fn new(
        name: impl Into<String>,
        kind: AgentKind,
        sensors: impl Into<Vec<SensorKind>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            sensors: sensors.into(),
        }
    }

    /// Terminal and Reward followed by the declared sensors, without
    /// duplicates.
    pub fn all_sensors(&self) -> Vec<SensorKind> {
        let mut out = vec![SensorKind::Terminal, SensorKind::Reward];
        for &s in &self.sensors {
            if !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }

    /// Check the structural invariants of the definition.
    ///
    /// Names must be non-empty, must not start with `__` (reserved for
    /// session regions), and may only contain ASCII alphanumerics, `-`
    /// and `_` so derived buffer names are valid file names on every
    /// platform.
    pub fn validate(&self) -> Result<(), AgentDefinitionError> {
        if self.name.is_empty() {
            return Err(AgentDefinitionError::EmptyName);
        }
        if self.name.starts_with("__") {
            return Err(AgentDefinitionError::ReservedName(self.name.clone()));
        }
        if let Some(found) = self
            .name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(AgentDefinitionError::InvalidCharacter {
                name: self.name.clone(),
                found,
            });
        }
        if self.kind.action_dim() == 0 {
            return Err(AgentDefinitionError::EmptyActionSpace(self.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_dims() {
        assert_eq!(AgentKind::Uav.action_dim(), 4);
        assert_eq!(AgentKind::Android.action_dim(), 94);
        assert_eq!(AgentKind::Custom { action_dim: 7 }.action_dim(), 7);
    }

    #[test]
    fn all_sensors_prepends_terminal_and_reward_once() {
        let def = AgentDefinition::new(
            "uav0",
            AgentKind::Uav,
            vec![SensorKind::RgbCamera, SensorKind::Reward, SensorKind::Velocity],
        );
        assert_eq!(
            def.all_sensors(),
            vec![
                SensorKind::Terminal,
                SensorKind::Reward,
                SensorKind::RgbCamera,
                SensorKind::Velocity
            ]
        );
    }

    #[test]
    fn validate_rejects_bad_names() {
        let mk = |n: &str| AgentDefinition::new(n, AgentKind::Uav, vec![]);
        assert!(mk("uav0").validate().is_ok());
        assert!(mk("boat-1").validate().is_ok());
        assert_eq!(mk("").validate(), Err(AgentDefinitionError::EmptyName));
        assert_eq!(
            mk("__control").validate(),
            Err(AgentDefinitionError::ReservedName("__control".to_string()))
        );
        assert_eq!(
            mk("a/b").validate(),
            Err(AgentDefinitionError::InvalidCharacter {
                name: "a/b".to_string(),
                found: '/'
            })
        );
        assert!(mk("a b").validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_action_space() {
        let def = AgentDefinition::new("x", AgentKind::Custom { action_dim: 0 }, vec![]);
        assert_eq!(
            def.validate(),
            Err(AgentDefinitionError::EmptyActionSpace("x".to_string()))
        );
    }
}
