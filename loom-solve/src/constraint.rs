use cast::f64;
use loom_engine::env::ConstraintSink;
use loom_engine::{unify, Environment, LinearTrail};
use loom_ir::{SymbolId, Value, ValueKind, VarId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

pub const EPSILON: f64 = 1e-6;

/// §3's four strengths; `Required` constraints must hold exactly (within
/// `EPSILON`), weaker ones are approximated.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Strength {
    Weak,
    Medium,
    Strong,
    Required,
}

#[derive(Copy, Clone, Debug)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
}

/// Either a known numeric value or a variable waiting to be solved for
/// (§4.G's pending-arithmetic-constraint operands).
#[derive(Copy, Clone, Debug)]
pub enum Operand {
    Bound(f64),
    Unbound(VarId),
}

impl Operand {
    fn known(&self, shadows: &FxHashMap<VarId, f64>) -> Option<f64> {
        match self {
            Operand::Bound(v) => Some(*v),
            Operand::Unbound(v) => shadows.get(v).copied(),
        }
    }

    fn var(&self) -> Option<VarId> {
        match self {
            Operand::Unbound(v) => Some(*v),
            Operand::Bound(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Constraint {
    Equal(VarId, VarId),
    Leq(VarId, VarId),
    Geq(VarId, VarId),
    /// Legacy alias for `Equal`, kept for the source vocabulary (§3).
    Unify(VarId, VarId),
    Function {
        name: SymbolId,
        var: VarId,
        target: f64,
    },
    Arithmetic {
        op: ArithOp,
        left: Operand,
        right: Operand,
        result: Operand,
    },
}

/// A registered linear function with a known inverse, e.g. `increment(x)
/// = x + 5` inverts to `x = t - 5` (§4.G "Function constraints").
#[derive(Copy, Clone)]
pub struct LinearFunction {
    pub scale: f64,
    pub offset: f64,
}

impl LinearFunction {
    pub fn apply(&self, x: f64) -> f64 {
        self.scale * x + self.offset
    }

    pub fn invert(&self, t: f64) -> Option<f64> {
        if self.scale == 0.0 {
            None
        } else {
            Some((t - self.offset) / self.scale)
        }
    }
}

/// Pluggable backend for linear constraints (§9: "Treat as a pluggable
/// contract"). The in-tree implementation below is a minimal least-error
/// solver sufficient for the `Equal`/`Leq`/`Geq` relations §4.G actually
/// needs; a Cassowary-style simplex solver could implement this same
/// trait without `loom-solve` changing.
pub trait ConstraintSolver {
    fn suggest(&mut self, var: VarId, value: f64);
    fn add_linear(&mut self, constraint: &Constraint, strength: Strength) -> Result<(), failure::Error>;
    fn update_vars(&mut self, shadows: &mut FxHashMap<VarId, f64>) -> Result<(), failure::Error>;
}

/// Minimal solver: `Required` equalities are enforced by unioning the two
/// variables' shadows; inequalities are checked, not actively solved
/// (consistent with §4.G's focus on equalities driving propagation).
#[derive(Default)]
pub struct DefaultSolver {
    equalities: Vec<(VarId, VarId, Strength)>,
    inequalities: Vec<(VarId, VarId, bool, Strength)>, // bool: true = Leq, false = Geq
}

impl ConstraintSolver for DefaultSolver {
    fn suggest(&mut self, _var: VarId, _value: f64) {}

    fn add_linear(&mut self, constraint: &Constraint, strength: Strength) -> Result<(), failure::Error> {
        match constraint {
            Constraint::Equal(a, b) | Constraint::Unify(a, b) => {
                self.equalities.push((*a, *b, strength));
            }
            Constraint::Leq(a, b) => self.inequalities.push((*a, *b, true, strength)),
            Constraint::Geq(a, b) => self.inequalities.push((*a, *b, false, strength)),
            _ => {}
        }
        Ok(())
    }

    fn update_vars(&mut self, shadows: &mut FxHashMap<VarId, f64>) -> Result<(), failure::Error> {
        for (a, b, strength) in &self.equalities {
            match (shadows.get(a).copied(), shadows.get(b).copied()) {
                (Some(va), Some(vb)) => {
                    if (va - vb).abs() > EPSILON && *strength == Strength::Required {
                        return Err(failure::format_err!("required equality violated"));
                    }
                }
                (Some(va), None) => {
                    shadows.insert(*b, va);
                }
                (None, Some(vb)) => {
                    shadows.insert(*a, vb);
                }
                (None, None) => {}
            }
        }
        for (a, b, is_leq, strength) in &self.inequalities {
            if let (Some(va), Some(vb)) = (shadows.get(a).copied(), shadows.get(b).copied()) {
                let holds = if *is_leq { va <= vb + EPSILON } else { va >= vb - EPSILON };
                if !holds && *strength == Strength::Required {
                    return Err(failure::format_err!("required inequality violated"));
                }
            }
        }
        Ok(())
    }
}

/// Snapshot of store state for a choice point (§4.I): shadow values plus
/// the constraint list length.
#[derive(Clone)]
pub struct ConstraintCheckpoint {
    shadows: FxHashMap<VarId, f64>,
    constraint_len: usize,
}

impl ConstraintCheckpoint {
    /// A checkpoint representing "nothing suggested, nothing constrained
    /// yet" — used when a choice point is pushed before any constraint
    /// activity exists to snapshot.
    pub fn empty() -> Self {
        ConstraintCheckpoint {
            shadows: FxHashMap::default(),
            constraint_len: 0,
        }
    }
}

/// §3/§4.G: per-variable shadow values, the constraint list, and a
/// pluggable solver handle.
pub struct ConstraintStore {
    shadows: FxHashMap<VarId, f64>,
    constraints: Vec<Constraint>,
    solver: Box<dyn ConstraintSolver>,
    functions: FxHashMap<SymbolId, LinearFunction>,
    pub auto_update: bool,
}

impl ConstraintStore {
    pub fn new() -> Self {
        ConstraintStore {
            shadows: FxHashMap::default(),
            constraints: Vec::new(),
            solver: Box::new(DefaultSolver::default()),
            functions: FxHashMap::default(),
            auto_update: true,
        }
    }

    pub fn register_function(&mut self, name: SymbolId, f: LinearFunction) {
        self.functions.insert(name, f);
    }

    pub fn checkpoint(&self) -> ConstraintCheckpoint {
        ConstraintCheckpoint {
            shadows: self.shadows.clone(),
            constraint_len: self.constraints.len(),
        }
    }

    pub fn rollback(&mut self, cp: ConstraintCheckpoint) {
        self.shadows = cp.shadows;
        self.constraints.truncate(cp.constraint_len);
    }

    /// `add_arithmetic` (§4.G linear constraints): add a relation with a
    /// strength; `Required` violations surface as `ConstraintUnsatisfiable`.
    pub fn add_linear_constraint(&mut self, c: Constraint, strength: Strength) -> Result<(), failure::Error> {
        self.solver.add_linear(&c, strength)?;
        self.constraints.push(c);
        if self.auto_update {
            self.update_vars()?;
        }
        Ok(())
    }

    pub fn update_vars(&mut self) -> Result<(), failure::Error> {
        self.solver.update_vars(&mut self.shadows)
    }

    pub fn suggest_value(&mut self, var: VarId, value: f64) {
        self.shadows.insert(var, value);
        self.solver.suggest(var, value);
    }

    pub fn shadow(&self, var: VarId) -> Option<f64> {
        self.shadows.get(&var).copied()
    }

    /// `add_function_constraint(fname, var, target)` (§4.G). Solves
    /// algebraically when `fname` has a registered inverse; otherwise the
    /// constraint is kept for the resolver to discharge by enumeration.
    pub fn add_function_constraint(&mut self, name: SymbolId, var: VarId, target: f64) -> FunctionOutcome {
        match self.functions.get(&name) {
            Some(f) => match f.invert(target) {
                Some(x) => FunctionOutcome::Solved(x),
                None => {
                    self.constraints.push(Constraint::Function { name, var, target });
                    FunctionOutcome::Suspended
                }
            },
            None => {
                self.constraints.push(Constraint::Function { name, var, target });
                FunctionOutcome::Suspended
            }
        }
    }

    /// `add_pending_arithmetic(op, left, right, result)` (§4.G): tries to
    /// solve immediately; if insufficient information, keeps the
    /// constraint suspended on every unbound operand.
    pub fn add_pending_arithmetic(
        &mut self,
        op: ArithOp,
        left: Operand,
        right: Operand,
        result: Operand,
    ) -> ArithmeticOutcome {
        match solve_arithmetic(op, left, right, result, &self.shadows) {
            Ok(solved) if solved.is_empty() => {
                self.constraints.push(Constraint::Arithmetic { op, left, right, result });
                ArithmeticOutcome::Suspended
            }
            Ok(solved) => ArithmeticOutcome::Solved(solved),
            Err(e) => ArithmeticOutcome::Error(e),
        }
    }

    /// Re-solves every pending `Arithmetic` constraint that mentions
    /// `var`, applied after `var`'s shadow becomes known (§4.G
    /// "Propagation on bind"). Returns every variable that became solved
    /// as a result, so the caller can `bind()` them in the environment.
    pub fn resolve_pending_on(&mut self, var: VarId) -> Vec<(VarId, f64)> {
        let mut solved = Vec::new();
        let mut remaining = Vec::new();
        for c in self.constraints.drain(..) {
            if let Constraint::Arithmetic { op, left, right, result } = c {
                let mentions = [left, right, result]
                    .iter()
                    .any(|o| matches!(o, Operand::Unbound(v) if *v == var));
                if mentions {
                    match solve_arithmetic(op, left, right, result, &self.shadows) {
                        Ok(s) if s.is_empty() => {
                            remaining.push(Constraint::Arithmetic { op, left, right, result });
                        }
                        Ok(s) => {
                            for &(v, value) in &s {
                                self.shadows.insert(v, value);
                            }
                            solved.extend(s);
                        }
                        Err(_) => {}
                    }
                } else {
                    remaining.push(Constraint::Arithmetic { op, left, right, result });
                }
            } else {
                remaining.push(c);
            }
        }
        self.constraints = remaining;
        solved
    }
}

impl Default for ConstraintStore {
    fn default() -> Self {
        ConstraintStore::new()
    }
}

pub enum FunctionOutcome {
    Solved(f64),
    Suspended,
}

pub enum ArithmeticOutcome {
    Solved(Vec<(VarId, f64)>),
    Suspended,
    Error(failure::Error),
}

/// The resolution-rule table from §4.G, shared by `add` and the re-solve
/// path. `add`/`subtract` are exact inverses of each other; `multiply`
/// additionally fails (division by zero) when the known factor is zero
/// and the product is nonzero-determined. Every branch returns every
/// operand it was able to assign a value to — the fully-unknown `Add`
/// branch assigns both halves of its representative pair, not just one.
fn solve_arithmetic(
    op: ArithOp,
    left: Operand,
    right: Operand,
    result: Operand,
    shadows: &FxHashMap<VarId, f64>,
) -> Result<Vec<(VarId, f64)>, failure::Error> {
    let l = left.known(shadows);
    let r = right.known(shadows);
    let z = result.known(shadows);
    match op {
        ArithOp::Add => match (l, r, z) {
            (Some(l), Some(r), _) => Ok(solved_for(result, l + r)),
            (Some(l), None, Some(z)) => Ok(solved_for(right, z - l)),
            (None, Some(r), Some(z)) => Ok(solved_for(left, z - r)),
            (None, None, Some(z)) => {
                // generate a representative pair (§4.G, Open Question in §9):
                // this is one solution, not an enumeration of all pairs, but
                // both halves of that one solution get assigned.
                let half = (z / 2.0).floor();
                let mut solved = solved_for(left, half);
                solved.extend(solved_for(right, z - half));
                Ok(solved)
            }
            _ => Ok(Vec::new()),
        },
        ArithOp::Subtract => match (l, r, z) {
            (Some(l), Some(r), _) => Ok(solved_for(result, l - r)),
            (Some(l), None, Some(z)) => Ok(solved_for(right, l - z)),
            (None, Some(r), Some(z)) => Ok(solved_for(left, z + r)),
            _ => Ok(Vec::new()),
        },
        ArithOp::Multiply => match (l, r, z) {
            (Some(l), Some(r), _) => Ok(solved_for(result, l * r)),
            (Some(l), None, Some(z)) => {
                if l == 0.0 {
                    Err(failure::format_err!("division by zero solving multiply constraint"))
                } else {
                    Ok(solved_for(right, z / l))
                }
            }
            (None, Some(r), Some(z)) => {
                if r == 0.0 {
                    Err(failure::format_err!("division by zero solving multiply constraint"))
                } else {
                    Ok(solved_for(left, z / r))
                }
            }
            _ => Ok(Vec::new()),
        },
    }
}

fn solved_for(operand: Operand, value: f64) -> Vec<(VarId, f64)> {
    operand.var().map(|v| (v, value)).into_iter().collect()
}

/// Wires the constraint store into `loom-engine::Environment` as a
/// `ConstraintSink`: every bind suggests a shadow value, re-solves
/// pending arithmetic constraints, and unifies any variable that becomes
/// determined as a result (§4.G "Propagation on bind").
pub struct ConstraintPropagator {
    pub store: ConstraintStore,
}

impl ConstraintSink for ConstraintPropagator {
    fn on_bind(&mut self, var: VarId, value: &Value, env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail) {
        let numeric = match &value.kind {
            ValueKind::Integer(n) => Some(f64(*n)),
            ValueKind::Float(f) => Some(*f),
            _ => None,
        };
        let numeric = match numeric {
            Some(n) => n,
            None => return,
        };
        self.store.suggest_value(var, numeric);
        let solved = self.store.resolve_pending_on(var);
        for (solved_var, solved_value) in solved {
            debug!(?solved_var, solved_value, "constraint propagation determined a variable");
            let rounded = solved_value.round();
            let as_value = if (rounded - solved_value).abs() < EPSILON {
                Value::integer(rounded as i64)
            } else {
                Value::float(solved_value)
            };
            unify::unify(&Value::logical_var(solved_var), &as_value, env, trail);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(n: u32) -> VarId {
        VarId::from_raw(n)
    }

    #[test]
    fn add_solves_for_missing_right_operand() {
        let mut shadows = FxHashMap::default();
        shadows.insert(var(0), 3.0);
        shadows.insert(var(2), 10.0);
        let result = solve_arithmetic(
            ArithOp::Add,
            Operand::Unbound(var(0)),
            Operand::Unbound(var(1)),
            Operand::Unbound(var(2)),
            &shadows,
        )
        .unwrap();
        assert_eq!(result, vec![(var(1), 7.0)]);
    }

    #[test]
    fn add_with_both_operands_unknown_solves_a_representative_pair_for_both() {
        let mut shadows = FxHashMap::default();
        shadows.insert(var(2), 10.0);
        let result = solve_arithmetic(
            ArithOp::Add,
            Operand::Unbound(var(0)),
            Operand::Unbound(var(1)),
            Operand::Unbound(var(2)),
            &shadows,
        )
        .unwrap();
        assert_eq!(result, vec![(var(0), 5.0), (var(1), 5.0)]);
    }

    #[test]
    fn multiply_by_zero_known_factor_is_division_by_zero() {
        let mut shadows = FxHashMap::default();
        shadows.insert(var(0), 0.0);
        shadows.insert(var(2), 5.0);
        let result = solve_arithmetic(
            ArithOp::Multiply,
            Operand::Unbound(var(0)),
            Operand::Unbound(var(1)),
            Operand::Unbound(var(2)),
            &shadows,
        );
        assert!(result.is_err());
    }

    #[test]
    fn function_constraint_inverts_increment() {
        let mut store = ConstraintStore::new();
        let mut table = loom_ir::SymbolTable::new();
        let increment = table.intern("increment");
        store.register_function(increment, LinearFunction { scale: 1.0, offset: 5.0 });
        match store.add_function_constraint(increment, var(0), 11.0) {
            FunctionOutcome::Solved(x) => assert!((x - 6.0).abs() < EPSILON),
            FunctionOutcome::Suspended => panic!("expected an algebraic solution"),
        }
    }

    #[test]
    fn required_equality_violation_is_rejected() {
        let mut store = ConstraintStore::new();
        store.suggest_value(var(0), 1.0);
        store.suggest_value(var(1), 2.0);
        let err = store.add_linear_constraint(Constraint::Equal(var(0), var(1)), Strength::Required);
        assert!(err.is_err());
    }
}
