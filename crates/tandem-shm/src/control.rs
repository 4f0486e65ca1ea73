//! Session control block and the tick handshake.
//!
//! The `"__control"` region is 64 bytes of atomic words shared by both
//! processes:
//!
//! ```text
//! offset  size  field                writer
//!      0     8  magic "TANDEM01"     control (last, at creation)
//!      8     8  commands_seq         control
//!     16     8  complete_seq         engine
//!     24     8  manifest_generation  control
//!     32     8  engine_ticks         engine
//!     40     4  reset_request        control set, engine clear
//!     44     4  manifest_status      control reset, engine ack
//!     48     4  shutdown             control
//!     52     4  version              control (at creation)
//!     56     4  command_bytes        control (at creation)
//!     60     4  manifest_bytes       control (at creation)
//! ```
//!
//! A round is one ping-pong: the control side bumps `commands_seq` with
//! release ordering after writing every command region; the engine
//! observes it with acquire ordering, steps, writes observations, stores
//! `engine_ticks` and then publishes the same sequence number to
//! `complete_seq`. Every wait has a deadline.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tandem_core::Dtype;

use crate::arena::ShmArena;
use crate::error::ShmError;
use crate::handle::BufferHandle;
use crate::naming::CONTROL_REGION;
use crate::raw;

/// Size of the control region.
pub const CONTROL_BYTES: usize = 64;
/// Protocol version stored at offset 52.
pub const PROTOCOL_VERSION: u32 = 1;

const MAGIC: u64 = u64::from_le_bytes(*b"TANDEM01");

const OFF_MAGIC: usize = 0;
const OFF_COMMANDS_SEQ: usize = 8;
const OFF_COMPLETE_SEQ: usize = 16;
const OFF_MANIFEST_GEN: usize = 24;
const OFF_ENGINE_TICKS: usize = 32;
const OFF_RESET: usize = 40;
const OFF_MANIFEST_STATUS: usize = 44;
const OFF_SHUTDOWN: usize = 48;
const OFF_VERSION: usize = 52;
const OFF_COMMAND_BYTES: usize = 56;
const OFF_MANIFEST_BYTES: usize = 60;

// ── ManifestStatus ─────────────────────────────────────────────

/// Engine verdict on the published manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestStatus {
    /// Not yet checked.
    Pending,
    /// Layout matches the engine's expectation.
    Accepted,
    /// Layout does not match.
    Rejected,
}

impl ManifestStatus {
    fn from_word(v: u32) -> Self {
        match v {
            1 => Self::Accepted,
            2 => Self::Rejected,
            _ => Self::Pending,
        }
    }

    fn word(self) -> u32 {
        match self {
            Self::Pending => 0,
            Self::Accepted => 1,
            Self::Rejected => 2,
        }
    }
}

// ── Backoff ────────────────────────────────────────────────────

/// Spin, then yield, then sleep with a growing interval capped at 1 ms.
struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 64;
    const YIELD_LIMIT: u32 = 128;

    fn new() -> Self {
        Self { step: 0 }
    }

    fn snooze(&mut self) {
        if self.step < Self::SPIN_LIMIT {
            std::hint::spin_loop();
        } else if self.step < Self::YIELD_LIMIT {
            std::thread::yield_now();
        } else {
            let exp = (self.step - Self::YIELD_LIMIT).min(5);
            std::thread::sleep(Duration::from_micros(32u64 << exp));
        }
        self.step = self.step.saturating_add(1);
    }
}

/// Poll `ready` until it yields a value or `timeout` elapses.
fn wait_until<T>(
    what: &'static str,
    timeout: Duration,
    mut ready: impl FnMut() -> Option<T>,
) -> Result<T, ShmError> {
    let start = Instant::now();
    let mut backoff = Backoff::new();
    loop {
        if let Some(v) = ready() {
            return Ok(v);
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(ShmError::Timeout { what, waited });
        }
        backoff.snooze();
    }
}

// ── ControlBlock ───────────────────────────────────────────────

/// Typed access to the words of the control region.
#[derive(Clone, Debug)]
pub struct ControlBlock {
    handle: BufferHandle,
}

impl ControlBlock {
    /// Create and initialise the control region. Control-process side.
    ///
    /// `command_bytes` and `manifest_bytes` are recorded so the engine
    /// can map the other session regions with matching sizes.
    pub fn create(
        arena: &mut ShmArena,
        command_bytes: u32,
        manifest_bytes: u32,
    ) -> Result<ControlEndpoint, ShmError> {
        let handle = arena.allocate(CONTROL_REGION, &[CONTROL_BYTES], Dtype::U8)?;
        handle.claim_atomic()?;
        let block = Self { handle };
        block.u32_at(OFF_VERSION).store(PROTOCOL_VERSION, Ordering::Relaxed);
        block.u32_at(OFF_COMMAND_BYTES).store(command_bytes, Ordering::Relaxed);
        block.u32_at(OFF_MANIFEST_BYTES).store(manifest_bytes, Ordering::Relaxed);
        block.u64_at(OFF_MAGIC).store(MAGIC, Ordering::Release);
        Ok(ControlEndpoint { block })
    }

    /// Wait for the control process to create the region, then map and
    /// validate it. Engine side.
    pub fn attach(arena: &mut ShmArena, timeout: Duration) -> Result<EngineEndpoint, ShmError> {
        let path = arena.config().region_path(CONTROL_REGION);
        wait_until("control block", timeout, || {
            std::fs::metadata(&path)
                .ok()
                .filter(|m| m.len() == CONTROL_BYTES as u64)
        })?;
        let handle = arena.allocate(CONTROL_REGION, &[CONTROL_BYTES], Dtype::U8)?;
        handle.claim_atomic()?;
        let block = Self { handle };
        wait_until("control block header", timeout, || {
            (block.u64_at(OFF_MAGIC).load(Ordering::Acquire) == MAGIC).then_some(())
        })
        .map_err(|_| ShmError::BadControlBlock {
            reason: "magic header missing".to_string(),
        })?;
        let version = block.u32_at(OFF_VERSION).load(Ordering::Relaxed);
        if version != PROTOCOL_VERSION {
            return Err(ShmError::BadControlBlock {
                reason: format!("protocol version {version}, expected {PROTOCOL_VERSION}"),
            });
        }
        Ok(EngineEndpoint { block })
    }

    /// Capacity of the command channel region in bytes.
    pub fn command_bytes(&self) -> usize {
        self.u32_at(OFF_COMMAND_BYTES).load(Ordering::Relaxed) as usize
    }

    /// Capacity of the manifest region in bytes.
    pub fn manifest_bytes(&self) -> usize {
        self.u32_at(OFF_MANIFEST_BYTES).load(Ordering::Relaxed) as usize
    }

    /// Last sequence number the control side signalled.
    pub fn commands_seq(&self) -> u64 {
        self.u64_at(OFF_COMMANDS_SEQ).load(Ordering::Acquire)
    }

    /// Last sequence number the engine completed.
    pub fn complete_seq(&self) -> u64 {
        self.u64_at(OFF_COMPLETE_SEQ).load(Ordering::Acquire)
    }

    /// Current manifest generation.
    pub fn manifest_generation(&self) -> u64 {
        self.u64_at(OFF_MANIFEST_GEN).load(Ordering::Acquire)
    }

    /// Current manifest verdict.
    pub fn manifest_status(&self) -> ManifestStatus {
        ManifestStatus::from_word(self.u32_at(OFF_MANIFEST_STATUS).load(Ordering::Acquire))
    }

    /// Whether the control side has asked the engine to stop.
    pub fn is_shutdown(&self) -> bool {
        self.u32_at(OFF_SHUTDOWN).load(Ordering::Acquire) != 0
    }

    fn u64_at(&self, offset: usize) -> &AtomicU64 {
        raw::atomic_u64(self.handle.region().map(), offset)
    }

    fn u32_at(&self, offset: usize) -> &AtomicU32 {
        raw::atomic_u32(self.handle.region().map(), offset)
    }
}

// ── ControlEndpoint ────────────────────────────────────────────

/// Control-process half of the handshake.
#[derive(Debug)]
pub struct ControlEndpoint {
    block: ControlBlock,
}

impl ControlEndpoint {
    /// Shared words.
    pub fn block(&self) -> &ControlBlock {
        &self.block
    }

    /// Publish "commands ready" and return the round's sequence number.
    ///
    /// Every command region must already be written: the release store
    /// makes them visible to the engine's acquire load.
    pub fn signal_commands_ready(&self) -> u64 {
        self.block.u64_at(OFF_COMMANDS_SEQ).fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Block until the engine completes round `seq`.
    ///
    /// Returns the engine's tick count for the round.
    pub fn wait_tick_complete(&self, seq: u64, timeout: Duration) -> Result<u64, ShmError> {
        wait_until("tick complete", timeout, || {
            (self.block.complete_seq() >= seq)
                .then(|| self.block.u64_at(OFF_ENGINE_TICKS).load(Ordering::Acquire))
        })
    }

    /// Ask the engine to restore world defaults on the next round.
    pub fn request_reset(&self) {
        self.block.u32_at(OFF_RESET).store(1, Ordering::Release);
    }

    /// Start a new manifest generation and reset the verdict to pending.
    pub fn publish_manifest_generation(&self, generation: u64) {
        self.block
            .u32_at(OFF_MANIFEST_STATUS)
            .store(ManifestStatus::Pending.word(), Ordering::Release);
        self.block
            .u64_at(OFF_MANIFEST_GEN)
            .store(generation, Ordering::Release);
    }

    /// Block until the engine accepts or rejects the current manifest.
    pub fn wait_manifest(&self, timeout: Duration) -> Result<ManifestStatus, ShmError> {
        wait_until("manifest acknowledgement", timeout, || {
            match self.block.manifest_status() {
                ManifestStatus::Pending => None,
                verdict => Some(verdict),
            }
        })
    }

    /// Tell the engine the session is over.
    pub fn signal_shutdown(&self) {
        self.block.u32_at(OFF_SHUTDOWN).store(1, Ordering::Release);
    }
}

// ── EngineEndpoint ─────────────────────────────────────────────

/// Engine half of the handshake.
#[derive(Debug)]
pub struct EngineEndpoint {
    block: ControlBlock,
}

impl EngineEndpoint {
    /// Shared words.
    pub fn block(&self) -> &ControlBlock {
        &self.block
    }

    /// Block until a round newer than `last` is signalled, returning its
    /// sequence number, or `Ok(None)` if shutdown was requested first.
    pub fn wait_commands_ready(
        &self,
        last: u64,
        timeout: Duration,
    ) -> Result<Option<u64>, ShmError> {
        wait_until("commands ready", timeout, || {
            if self.block.is_shutdown() {
                return Some(None);
            }
            let seq = self.block.commands_seq();
            (seq > last).then_some(Some(seq))
        })
    }

    /// Publish "tick complete" for round `seq`, reporting how many engine
    /// ticks the round consumed.
    pub fn signal_tick_complete(&self, seq: u64, engine_ticks: u64) {
        self.block
            .u64_at(OFF_ENGINE_TICKS)
            .store(engine_ticks, Ordering::Release);
        self.block
            .u64_at(OFF_COMPLETE_SEQ)
            .store(seq, Ordering::Release);
    }

    /// Consume a pending reset request.
    pub fn take_reset_request(&self) -> bool {
        self.block.u32_at(OFF_RESET).swap(0, Ordering::AcqRel) != 0
    }

    /// Record the verdict on the current manifest generation.
    pub fn ack_manifest(&self, accepted: bool) {
        let status = if accepted {
            ManifestStatus::Accepted
        } else {
            ManifestStatus::Rejected
        };
        self.block
            .u32_at(OFF_MANIFEST_STATUS)
            .store(status.word(), Ordering::Release);
    }

    /// Whether the control side has asked the engine to stop.
    pub fn is_shutdown(&self) -> bool {
        self.block.is_shutdown()
    }
}
