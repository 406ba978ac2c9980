//! Debug sessions and their registry
//!
//! One [`DebugSession`] per attached target, owned by the [`SessionRegistry`]
//! and addressed by id or human reference. Logpoint output throttling lives
//! in [`limits`] with its debuggee-side counterpart in [`logpoint`].

pub mod debug_session;
pub mod limits;
pub mod logpoint;
pub mod registry;
pub mod search;

pub use debug_session::{
    BreakpointOutcome, BreakpointSummary, DebugSession, EvalOutcome, FrameSnapshot, PausedState,
    RuntimeKind, SessionState, SourcePosition, VariableEntry,
};
pub use limits::{ExecutionLimitTracker, LimitBreach, LogpointMetadata};
pub use registry::{normalize_reference, SessionEntry, SessionId, SessionInit, SessionRegistry};
pub use search::LocationCandidate;
