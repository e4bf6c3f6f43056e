//! Sender pipeline state types.
//!
//! One call to [`crate::sender::Sender::send`] walks the states below in
//! order.  Transitions are driven by the sender; this module only names them
//! so every step can be logged the same way.
//!
//! ```text
//!  RAW ──compress──▶ COMPRESSED ──digest──▶ DIGESTED ──split──▶ FRAMED
//!                                                                  │
//!                                                       header     │
//!                                                                  ▼
//!                              DONE ◀──last chunk── PUBLISHING ──budget spent──▶ FAILED
//! ```

use std::fmt;

/// Where a single send currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendState {
    /// Source bytes obtained.
    #[default]
    Raw,
    /// Wire bytes produced by the object encoding.
    Compressed,
    /// Digest computed over the wire bytes.
    Digested,
    /// Header and chunks built.
    Framed,
    /// Header and chunks going out, in order.
    Publishing,
    Done,
    /// A publish exhausted its budget; nothing more is sent for this object.
    Failed,
}

impl SendState {
    /// `true` once no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, SendState::Done | SendState::Failed)
    }
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendState::Raw => "RAW",
            SendState::Compressed => "COMPRESSED",
            SendState::Digested => "DIGESTED",
            SendState::Framed => "FRAMED",
            SendState::Publishing => "PUBLISHING",
            SendState::Done => "DONE",
            SendState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
