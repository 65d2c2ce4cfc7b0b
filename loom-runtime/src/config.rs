/// Policy knobs rather than hard-coded values: recursion depth, linearity
/// strictness (defaults to lenient, see `DESIGN.md`), constraint epsilon,
/// and whether the constraint store re-solves on every insert.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub max_recursion_depth: usize,
    pub strict_linearity: bool,
    pub constraint_epsilon: f64,
    pub auto_update_constraints: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_recursion_depth: 512,
            strict_linearity: false,
            constraint_epsilon: loom_solve::constraint::EPSILON,
            auto_update_constraints: true,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_strict_linearity(mut self, strict: bool) -> Self {
        self.strict_linearity = strict;
        self
    }

    pub fn with_constraint_epsilon(mut self, epsilon: f64) -> Self {
        self.constraint_epsilon = epsilon;
        self
    }

    pub fn with_auto_update_constraints(mut self, auto: bool) -> Self {
        self.auto_update_constraints = auto;
        self
    }
}
