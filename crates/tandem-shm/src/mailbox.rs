//! Single-slot control-flag mailbox.

use std::sync::atomic::Ordering;

use tandem_core::{ControlFlag, Dtype};

use crate::error::ShmError;
use crate::handle::BufferHandle;
use crate::raw;

/// One pending control intent for an agent, stored in a `uint8 [1]` region.
///
/// The control process posts; the engine takes. Posting over an untaken
/// intent replaces it, so the most recent intent is the one acted on. The
/// posting side never clears its own slot.
#[derive(Clone, Debug)]
pub struct Mailbox {
    handle: BufferHandle,
}

impl Mailbox {
    /// Wrap a one-byte `uint8` region and claim it for atomic access.
    pub fn new(handle: BufferHandle) -> Result<Self, ShmError> {
        if handle.dtype() != Dtype::U8 {
            return Err(ShmError::DtypeMismatch {
                name: handle.name().to_string(),
                expected: Dtype::U8,
                actual: handle.dtype(),
            });
        }
        if handle.byte_len() != 1 {
            return Err(ShmError::SizeMismatch {
                name: handle.name().to_string(),
                expected: 1,
                actual: handle.byte_len(),
            });
        }
        handle.claim_atomic()?;
        Ok(Self { handle })
    }

    /// Underlying region.
    pub fn handle(&self) -> &BufferHandle {
        &self.handle
    }

    /// Post `flag`, replacing whatever is pending.
    pub fn post(&self, flag: ControlFlag) {
        let prev = self.slot().swap(flag as u8, Ordering::AcqRel);
        if prev != ControlFlag::Idle as u8 && prev != flag as u8 {
            tracing::debug!(
                mailbox = self.handle.name(),
                replaced = prev,
                with = flag as u8,
                "pending control flag replaced"
            );
        }
    }

    /// Current slot value. Unknown codes read as `None`.
    pub fn peek(&self) -> Option<ControlFlag> {
        ControlFlag::from_u8(self.slot().load(Ordering::Acquire))
    }

    /// Whether anything other than [`ControlFlag::Idle`] is pending.
    pub fn is_pending(&self) -> bool {
        self.slot().load(Ordering::Acquire) != ControlFlag::Idle as u8
    }

    /// Take the pending flag and reset the slot to idle. Engine side.
    pub fn take(&self) -> Option<ControlFlag> {
        let v = self.slot().swap(ControlFlag::Idle as u8, Ordering::AcqRel);
        match ControlFlag::from_u8(v) {
            Some(ControlFlag::Idle) => None,
            other => other,
        }
    }

    fn slot(&self) -> &std::sync::atomic::AtomicU8 {
        raw::atomic_u8(self.handle.region().map(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ShmArena, ShmConfig};

    #[test]
    fn last_post_wins_and_take_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = ShmArena::create(ShmConfig::new(dir.path(), "m")).unwrap();
        let mb = Mailbox::new(arena.allocate("a_teleport_flag", &[1], Dtype::U8).unwrap()).unwrap();
        assert_eq!(mb.peek(), Some(ControlFlag::Idle));
        assert!(!mb.is_pending());

        mb.post(ControlFlag::TeleportLocation);
        mb.post(ControlFlag::Reset);
        assert_eq!(mb.peek(), Some(ControlFlag::Reset));
        assert_eq!(mb.take(), Some(ControlFlag::Reset));
        assert_eq!(mb.peek(), Some(ControlFlag::Idle));
        assert_eq!(mb.take(), None);
    }

    #[test]
    fn rejects_wrong_region() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = ShmArena::create(ShmConfig::new(dir.path(), "m")).unwrap();
        let wide = arena.allocate("w", &[2], Dtype::U8).unwrap();
        assert!(Mailbox::new(wide).is_err());
        let float = arena.allocate("f", &[1], Dtype::F32).unwrap();
        assert!(Mailbox::new(float).is_err());
    }

    #[test]
    fn slot_is_only_reachable_through_atomics() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = ShmArena::create(ShmConfig::new(dir.path(), "m")).unwrap();
        let h = arena.allocate("a_teleport_flag", &[1], Dtype::U8).unwrap();
        let view = h.as_u8().unwrap();
        assert!(matches!(Mailbox::new(h.clone()), Err(ShmError::Busy { .. })));
        drop(view);

        let mb = Mailbox::new(h).unwrap();
        mb.post(ControlFlag::Reset);
        assert!(matches!(mb.handle().as_bytes(), Err(ShmError::AtomicRegion { .. })));
        assert!(matches!(mb.handle().zero(), Err(ShmError::AtomicRegion { .. })));
        assert_eq!(mb.take(), Some(ControlFlag::Reset));
    }
}
