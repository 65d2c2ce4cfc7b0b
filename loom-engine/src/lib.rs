//! Environment, trail, unification, and narrowing: everything a query
//! needs to mutate while it searches, and everything needed to undo that
//! mutation on backtracking.
//!
//! `loom-engine` does not know what a knowledge base or a choice point
//! is — those live in `loom-solve`, one layer up, and plug into this
//! crate through the `ConstraintSink`, `TrailAction`, and `Resumable`
//! traits rather than through a dependency edge back down to here.

pub mod env;
pub mod narrow;
pub mod suspend;
pub mod trail;
pub mod unify;

pub use env::{ConstraintSink, Environment, LogicalVar};
pub use narrow::{apply_function, narrow_call, BuiltinRegistry, NarrowOutcome};
pub use suspend::{add_call_suspension, add_external_suspension, add_suspension, wake_all, Resumable, Suspension, SuspensionKind};
pub use trail::{Checkpoint, LinearTrail, TrailAction};
pub use unify::{can_unify, copy_for_sharing, deep_copy, deref, is_ground, unify};
