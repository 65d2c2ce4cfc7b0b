//! Term and value representations shared by the rest of the runtime.
//!
//! `loom-ir` has no notion of an environment, a trail, or a resolver; it
//! only knows how to intern symbols and how to shape terms and values.
//! Everything that can change at query time (bindings, consumption,
//! backtracking) lives one layer up, in `loom-engine`.

mod symbol;
mod term;
mod value;

pub use symbol::{SymbolId, SymbolTable};
pub use term::{Term, TermDisplay, TypeId};
pub use value::{
    FunctionImpl, FunctionValue, ListValue, SuspensionId, Value, ValueKind, VarId,
};
