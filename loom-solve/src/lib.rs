//! Constraint store, knowledge base, choice points, and foreign-call
//! dispatch: everything above `loom-engine` that a query needs but that
//! `loom-engine` itself cannot name without creating a dependency cycle
//! back down to here. See `ConstraintSink`/`TrailAction`/`Resumable` in
//! `loom-engine` for the seams this crate plugs into.

pub mod choice;
pub mod constraint;
pub mod foreign;
pub mod kb;
pub mod resolve;

pub use choice::{Alternative, ChoicePoint};
pub use constraint::{
    ArithOp, ArithmeticOutcome, Constraint, ConstraintPropagator, ConstraintSolver, ConstraintStore,
    DefaultSolver, FunctionOutcome, LinearFunction, Operand, Strength,
};
pub use foreign::{ForeignEntry, ForeignImpl, ForeignRegistry, ParamKind};
pub use kb::{ground_value, instantiate, produce_resource, consume_resource, KbHandle, KnowledgeBase, LinearResource, ResourceId, Rule};
pub use resolve::{Limits, Resolver, ResolverSymbols, Solution, SolutionSet};
