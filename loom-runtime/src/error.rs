use failure::Fail;

/// Program-visible runtime errors (§7). Only these variants ever cross a
/// public function boundary as `Err`; unification failure, occurs-check
/// failure, and recursion-limit exhaustion stay internal and drive
/// backtracking as plain `bool`/`Option`/empty-`SolutionSet` returns.
#[derive(Fail, Debug)]
pub enum RuntimeError {
    #[fail(display = "arity mismatch: expected {}, got {}", expected, got)]
    ArityMismatch { expected: usize, got: usize },

    #[fail(display = "type mismatch: expected {}, got {}", expected, got)]
    TypeMismatch { expected: String, got: String },

    #[fail(display = "unknown function `{}`", _0)]
    UnknownFunction(String),

    #[fail(display = "unknown foreign function `{}`", _0)]
    UnknownForeignFunction(String),

    #[fail(display = "linear resource violated: {}", resource)]
    LinearViolation { resource: String },

    #[fail(display = "constraint store could not satisfy a required constraint")]
    ConstraintUnsatisfiable,

    #[fail(display = "division by zero while solving an arithmetic constraint")]
    DivisionByZero,

    #[fail(display = "query exceeded its step budget")]
    TimeoutExceeded,

    #[fail(display = "resolution exceeded the configured recursion depth")]
    RecursionLimitExceeded,
}
