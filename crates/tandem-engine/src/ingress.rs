//! Pending commands between ticks.
//!
//! [`CommandQueue`] holds at most one pending value per target: one
//! command vector per agent, one control scheme per agent, and one world
//! command per [`WorldProperty`]. Staging over a pending value replaces
//! it. The environment drains the queue exactly once at the start of
//! every tick.

use indexmap::IndexMap;
use tandem_core::{AgentCommand, Command, WorldCommand, WorldProperty};

/// Everything staged for one tick, in staging order per category.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Drained {
    /// Latest command per agent.
    pub agent_commands: Vec<AgentCommand>,
    /// Latest control scheme per agent.
    pub control_schemes: Vec<(String, u8)>,
    /// Latest command per world property, ordered by when that latest
    /// value was staged.
    pub world_commands: Vec<WorldCommand>,
}

impl Drained {
    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.agent_commands.len() + self.control_schemes.len() + self.world_commands.len()
    }

    /// Whether nothing was staged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last-write-wins staging area for agent and world commands.
#[derive(Debug, Default)]
pub struct CommandQueue {
    agents: IndexMap<String, Vec<f32>>,
    schemes: IndexMap<String, u8>,
    world: IndexMap<WorldProperty, WorldCommand>,
    overwritten: u64,
}

impl CommandQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `command`. Returns `true` if it replaced a pending value for
    /// the same target.
    pub fn stage(&mut self, command: Command) -> bool {
        let replaced = match command {
            Command::Agent(AgentCommand { agent, payload }) => {
                self.agents.insert(agent, payload).is_some()
            }
            Command::World(cmd) => {
                // Remove first so the drained order follows the latest
                // staging, not the first.
                let prev = self.world.shift_remove(&cmd.property());
                self.world.insert(cmd.property(), cmd);
                prev.is_some()
            }
        };
        if replaced {
            self.overwritten += 1;
        }
        replaced
    }

    /// Stage a control scheme for `agent`. Returns `true` if it replaced
    /// a pending one.
    pub fn stage_control_scheme(&mut self, agent: impl Into<String>, scheme: u8) -> bool {
        let replaced = self.schemes.insert(agent.into(), scheme).is_some();
        if replaced {
            self.overwritten += 1;
        }
        replaced
    }

    /// Pending command vector for `agent`.
    pub fn pending_for(&self, agent: &str) -> Option<&[f32]> {
        self.agents.get(agent).map(Vec::as_slice)
    }

    /// Pending world command for `property`.
    pub fn pending_world(&self, property: WorldProperty) -> Option<&WorldCommand> {
        self.world.get(&property)
    }

    /// Take everything staged, leaving the queue empty.
    pub fn drain_for_tick(&mut self) -> Drained {
        Drained {
            agent_commands: self
                .agents
                .drain(..)
                .map(|(agent, payload)| AgentCommand { agent, payload })
                .collect(),
            control_schemes: self.schemes.drain(..).collect(),
            world_commands: self.world.drain(..).map(|(_, cmd)| cmd).collect(),
        }
    }

    /// Put a drained batch back, for a tick that failed before the engine
    /// was signalled. Values staged since the drain take precedence.
    pub fn restore(&mut self, drained: Drained) {
        for AgentCommand { agent, payload } in drained.agent_commands {
            self.agents.entry(agent).or_insert(payload);
        }
        for (agent, scheme) in drained.control_schemes {
            self.schemes.entry(agent).or_insert(scheme);
        }
        for cmd in drained.world_commands.into_iter().rev() {
            if !self.world.contains_key(&cmd.property()) {
                self.world.shift_insert(0, cmd.property(), cmd);
            }
        }
    }

    /// Drop everything staged.
    pub fn clear(&mut self) {
        self.agents.clear();
        self.schemes.clear();
        self.world.clear();
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.agents.len() + self.schemes.len() + self.world.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many staged values have been replaced since creation.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tandem_core::Weather;

    fn act(agent: &str, payload: &[f32]) -> Command {
        Command::Agent(AgentCommand {
            agent: agent.into(),
            payload: payload.to_vec(),
        })
    }

    fn weather(kind: Weather) -> Command {
        Command::World(WorldCommand::SetWeather { kind })
    }

    #[test]
    fn agent_commands_overwrite() {
        let mut q = CommandQueue::new();
        assert!(!q.stage(act("uav0", &[1.0])));
        assert!(q.stage(act("uav0", &[2.0])));
        assert!(!q.stage(act("uav1", &[3.0])));
        assert_eq!(q.pending_for("uav0"), Some(&[2.0][..]));
        let d = q.drain_for_tick();
        assert_eq!(d.agent_commands.len(), 2);
        assert_eq!(d.agent_commands[0].payload, vec![2.0]);
        assert!(q.is_empty());
        assert_eq!(q.overwritten(), 1);
    }

    #[test]
    fn last_weather_wins() {
        let mut q = CommandQueue::new();
        q.stage(weather(Weather::Rain));
        q.stage(Command::World(WorldCommand::SetFogDensity { density: 0.3 }));
        q.stage(weather(Weather::Cloudy));
        let d = q.drain_for_tick();
        assert_eq!(
            d.world_commands,
            vec![
                WorldCommand::SetFogDensity { density: 0.3 },
                WorldCommand::SetWeather { kind: Weather::Cloudy },
            ]
        );
    }

    #[test]
    fn distinct_properties_coexist() {
        let mut q = CommandQueue::new();
        q.stage(Command::World(WorldCommand::SetDayTime { hour: 5 }));
        q.stage(Command::World(WorldCommand::StartDayCycle { minutes_per_cycle: 2.0 }));
        q.stage_control_scheme("uav0", 1);
        q.stage_control_scheme("uav0", 0);
        assert_eq!(q.len(), 3);
        let d = q.drain_for_tick();
        assert_eq!(d.world_commands.len(), 2);
        assert_eq!(d.control_schemes, vec![("uav0".to_string(), 0)]);
    }

    #[test]
    fn restore_keeps_newer_values() {
        let mut q = CommandQueue::new();
        q.stage(act("a", &[1.0]));
        q.stage(weather(Weather::Rain));
        q.stage(Command::World(WorldCommand::SetDayTime { hour: 3 }));
        let d = q.drain_for_tick();
        q.stage(act("a", &[9.0]));
        q.stage(weather(Weather::Cloudy));
        q.restore(d);
        assert_eq!(q.pending_for("a"), Some(&[9.0][..]));
        assert_eq!(
            q.pending_world(WorldProperty::Weather),
            Some(&WorldCommand::SetWeather { kind: Weather::Cloudy })
        );
        assert_eq!(
            q.pending_world(WorldProperty::DayTime),
            Some(&WorldCommand::SetDayTime { hour: 3 })
        );
    }

    #[test]
    fn clear_drops_everything() {
        let mut q = CommandQueue::new();
        q.stage(act("a", &[1.0]));
        q.stage_control_scheme("a", 1);
        q.stage(weather(Weather::Rain));
        q.clear();
        assert!(q.is_empty());
        assert!(q.drain_for_tick().is_empty());
    }

    proptest! {
        #[test]
        fn drained_value_is_last_staged_per_agent(
            ops in prop::collection::vec((0usize..4, -10.0f32..10.0), 1..40)
        ) {
            let mut q = CommandQueue::new();
            let mut expected = std::collections::HashMap::new();
            for (agent, value) in &ops {
                let name = format!("a{agent}");
                q.stage(act(&name, &[*value]));
                expected.insert(name, *value);
            }
            let d = q.drain_for_tick();
            prop_assert_eq!(d.agent_commands.len(), expected.len());
            for cmd in d.agent_commands {
                prop_assert_eq!(cmd.payload, vec![expected[&cmd.agent]]);
            }
            prop_assert!(q.is_empty());
        }
    }
}
