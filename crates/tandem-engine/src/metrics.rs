//! Per-tick timing for the control side of the handshake.

use tandem_core::TickId;

/// Timing and volume metrics collected during a single tick.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepMetrics {
    /// Tick these metrics describe.
    pub tick: TickId,
    /// Wall-clock time for the entire tick.
    pub total_us: u64,
    /// Time spent draining the queue and writing command regions.
    pub command_write_us: u64,
    /// Time spent blocked on the engine.
    pub wait_us: u64,
    /// Time spent on post-tick bookkeeping: refreshing agent locations,
    /// registering spawned agents, republishing the manifest.
    pub post_tick_us: u64,
    /// Agent commands, control schemes, world commands and spawns written.
    pub commands_written: usize,
    /// Bytes of JSON written to the world command channel.
    pub channel_bytes: usize,
    /// Engine ticks the round consumed, as reported by the engine.
    pub engine_ticks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = StepMetrics::default();
        assert_eq!(m.tick, TickId(0));
        assert_eq!(m.total_us, 0);
        assert_eq!(m.command_write_us, 0);
        assert_eq!(m.wait_us, 0);
        assert_eq!(m.post_tick_us, 0);
        assert_eq!(m.commands_written, 0);
        assert_eq!(m.channel_bytes, 0);
        assert_eq!(m.engine_ticks, 0);
    }
}
