//! Per-tick world command channel.

use serde::{Deserialize, Serialize};
use tandem_core::WireCommand;

use crate::error::ShmError;
use crate::frame;
use crate::handle::BufferHandle;

/// Default capacity of the `"__commands"` region.
pub const DEFAULT_COMMAND_BYTES: usize = 1 << 20;

#[derive(Serialize)]
struct Outgoing<'a> {
    commands: &'a [WireCommand],
}

#[derive(Deserialize)]
struct Incoming {
    commands: Vec<WireCommand>,
}

/// The `"__commands"` region, carrying one JSON document per tick:
/// `{"commands": [{"type": ..., "params": ...}, ...]}`.
///
/// The control side rewrites it before every round, including with an
/// empty frame when nothing is staged, so the engine never replays the
/// previous round's commands.
#[derive(Clone, Debug)]
pub struct CommandChannel {
    handle: BufferHandle,
}

impl CommandChannel {
    /// Wrap the command region.
    pub fn new(handle: BufferHandle) -> Self {
        Self { handle }
    }

    /// Largest encoded batch the region can carry.
    pub fn capacity(&self) -> usize {
        frame::capacity(&self.handle)
    }

    /// Replace the channel contents with `commands`. Returns the encoded
    /// size in bytes.
    pub fn write(&self, commands: &[WireCommand]) -> Result<usize, ShmError> {
        if commands.is_empty() {
            frame::clear_frame(&self.handle)?;
            return Ok(0);
        }
        let json = serde_json::to_vec(&Outgoing { commands })?;
        frame::write_frame(&self.handle, &json)?;
        Ok(json.len())
    }

    /// Decode the current batch. Engine side.
    pub fn read(&self) -> Result<Vec<WireCommand>, ShmError> {
        let bytes = frame::read_frame(&self.handle)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let incoming: Incoming = serde_json::from_slice(&bytes)?;
        Ok(incoming.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ShmArena, ShmConfig};
    use tandem_core::{Dtype, Weather};

    fn channel(dir: &tempfile::TempDir, bytes: usize) -> (ShmArena, CommandChannel) {
        let mut arena = ShmArena::create(ShmConfig::new(dir.path(), "ch")).unwrap();
        let h = arena.allocate("__commands", &[bytes], Dtype::U8).unwrap();
        (arena, CommandChannel::new(h))
    }

    #[test]
    fn wire_format_is_tagged_json() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, ch) = channel(&dir, 1024);
        ch.write(&[WireCommand::SetWeather { kind: Weather::Rain }]).unwrap();
        let raw = frame::read_frame(&ch.handle).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(v["commands"][0]["type"], "SetWeather");
        assert_eq!(v["commands"][0]["params"]["kind"], "rain");
    }

    #[test]
    fn empty_write_clears_previous_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, ch) = channel(&dir, 1024);
        ch.write(&[WireCommand::SetDayTime { hour: 6 }]).unwrap();
        assert_eq!(ch.read().unwrap(), vec![WireCommand::SetDayTime { hour: 6 }]);
        assert_eq!(ch.write(&[]).unwrap(), 0);
        assert!(ch.read().unwrap().is_empty());
    }

    #[test]
    fn oversized_batch_rejected_and_previous_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, ch) = channel(&dir, 64);
        ch.write(&[WireCommand::SetDayTime { hour: 1 }]).unwrap();
        let many = vec![WireCommand::SetFogDensity { density: 0.5 }; 10];
        assert!(matches!(ch.write(&many), Err(ShmError::Frame { .. })));
        assert_eq!(ch.read().unwrap(), vec![WireCommand::SetDayTime { hour: 1 }]);
    }
}
