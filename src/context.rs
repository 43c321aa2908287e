//! Activation context flags (§6).

use bitflags::bitflags;

bitflags! {
    /// Bit set selecting where to look for a class's implementation.
    /// Local/remote server bits are accepted but silently ignored — this
    /// crate only ever attempts in-proc activation (§1 Non-goals).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClsCtx: u32 {
        const INPROC_SERVER  = 1;
        const INPROC_HANDLER = 2;
        const LOCAL_SERVER   = 4;
        const REMOTE_SERVER  = 16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_and_remote_bits_are_representable_but_inert() {
        let ctx = ClsCtx::LOCAL_SERVER | ClsCtx::REMOTE_SERVER;
        assert!(ctx.contains(ClsCtx::LOCAL_SERVER));
        assert!(!ctx.contains(ClsCtx::INPROC_SERVER));
    }
}
