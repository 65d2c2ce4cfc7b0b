use crate::choice::{Alternative, ChoicePoint};
use crate::constraint::ConstraintStore;
use crate::foreign::ForeignRegistry;
use crate::kb::{self, KbHandle};
use loom_engine::narrow::{self, BuiltinRegistry, NarrowOutcome};
use loom_engine::suspend::{self, SuspensionKind};
use loom_engine::unify;
use loom_engine::{Environment, LinearTrail};
use loom_ir::{SymbolId, Value, ValueKind, VarId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, debug_span};

/// Caps the search the way §4.H's "recursion-depth + goal-pattern-stack"
/// termination rule describes: a hard ceiling on nested rule expansion,
/// plus a cycle guard on syntactically identical pending goals.
pub struct Limits {
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_depth: 512 }
    }
}

/// Reserved functors the resolver recognizes directly on goals, the way a
/// surface language would normally spell these with dedicated syntax:
/// `or(a, b)` for a two-branch disjunctive goal, e.g.
/// `or(parent(X, tom), parent(X, ann))` (§4.H disjunctive resolution), and
/// `clone(g)` marking `g` as a non-consuming occurrence against a linear
/// resource — generalizing §4.H rule 2 ("persistent resources are matched
/// but not consumed") to apply per occurrence rather than only per fact.
/// The core only needs to recognize *some* fixed marker for each; real
/// syntax is out of scope.
#[derive(Copy, Clone)]
pub struct ResolverSymbols {
    pub disjunction: SymbolId,
    pub non_consuming: SymbolId,
}

impl ResolverSymbols {
    pub fn new(table: &mut loom_ir::SymbolTable) -> Self {
        ResolverSymbols {
            disjunction: table.intern("or"),
            non_consuming: table.intern("clone"),
        }
    }
}

/// One answer to a query: the bindings of the variables the caller asked
/// to watch, dereferenced to their final value (§4.H `SolutionSet`).
#[derive(Clone, Debug)]
pub struct Solution {
    pub bindings: Vec<(VarId, Value)>,
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (&a.kind, &b.kind) {
        (ValueKind::Integer(x), ValueKind::Integer(y)) => x == y,
        (ValueKind::Float(x), ValueKind::Float(y)) => x == y,
        (ValueKind::String(x), ValueKind::String(y)) => x == y,
        (ValueKind::Atom(x), ValueKind::Atom(y)) => x == y,
        (ValueKind::LogicalVar(x), ValueKind::LogicalVar(y)) => x == y,
        (ValueKind::List(x), ValueKind::List(y)) => {
            x.elements.len() == y.elements.len()
                && x.elements.iter().zip(&y.elements).all(|(p, q)| values_equal(p, q))
        }
        (ValueKind::Compound { functor: f1, args: a1, .. }, ValueKind::Compound { functor: f2, args: a2, .. }) => {
            f1 == f2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(p, q)| values_equal(p, q))
        }
        _ => false,
    }
}

/// Deduplicated collection of solutions (§4.H). Two solutions are
/// duplicates when every watched variable dereferences to an equal value.
#[derive(Default)]
pub struct SolutionSet {
    pub solutions: Vec<Solution>,
}

impl SolutionSet {
    fn insert_unique(&mut self, candidate: Solution) {
        let is_dup = self.solutions.iter().any(|existing| {
            existing.bindings.len() == candidate.bindings.len()
                && existing
                    .bindings
                    .iter()
                    .zip(&candidate.bindings)
                    .all(|((v1, a), (v2, b))| v1 == v2 && values_equal(a, b))
        });
        if !is_dup {
            self.solutions.push(candidate);
        }
    }
}

enum Candidate {
    /// `type_matched`: this candidate's functor/name differs from the
    /// goal's but its declared type shares a union-hierarchy root with
    /// the goal's own name treated as a type (§8 scenario 2, e.g. a
    /// `food` goal matching a stored `apple1` fact via `apple1: apple`,
    /// `apple ⊂ fruit ⊂ food`). Such a match has nothing to unify — the
    /// goal is a bare type name, not the individual it matched — so the
    /// unification step is skipped for it.
    Fact { id: kb::ResourceId, non_consuming: bool, type_matched: bool },
    Rule { index: usize },
    Branch { goal: Value },
    /// One way to split a ground `append/3` third argument into its first
    /// two, tried as a backtracking alternative (§8 scenario 6's
    /// enumeration half).
    AppendSplit { xs: Vec<Value>, ys: Vec<Value> },
}

/// Ties the knowledge base, constraint store, and foreign registry
/// together to answer queries by SLD-style resolution with backtracking,
/// in the style of an obligation-discharge fulfillment loop: goals are
/// worked off a list one at a time, each either reducing immediately or
/// forking into alternatives that get tried in turn with the trail
/// rolled back between attempts.
pub struct Resolver {
    pub kb: KbHandle,
    pub foreign: ForeignRegistry,
    pub builtins: BuiltinRegistry,
    pub symbols: ResolverSymbols,
}

impl Resolver {
    /// Resolves `goals` (already instantiated into the query's
    /// environment — see `kb::instantiate`/`kb::ground_value`), returning
    /// every distinct binding of `interesting` found within `limits`.
    pub fn resolve(
        &self,
        goals: &[Value],
        interesting: &[VarId],
        env: &Rc<RefCell<Environment>>,
        trail: &mut LinearTrail,
        constraints: &mut ConstraintStore,
        limits: &Limits,
    ) -> SolutionSet {
        let _span = debug_span!("resolve", goals = goals.len()).entered();
        let mut out = SolutionSet::default();
        let mut goal_stack: Vec<Value> = Vec::new();
        self.solve(goals, 0, env, trail, constraints, 0, &mut goal_stack, limits, interesting, &mut out);
        out
    }

    fn solve(
        &self,
        goals: &[Value],
        idx: usize,
        env: &Rc<RefCell<Environment>>,
        trail: &mut LinearTrail,
        constraints: &mut ConstraintStore,
        depth: usize,
        goal_stack: &mut Vec<Value>,
        limits: &Limits,
        interesting: &[VarId],
        out: &mut SolutionSet,
    ) {
        if depth > limits.max_depth {
            debug!(depth, "recursion depth limit reached");
            return;
        }
        if idx == goals.len() {
            let bindings = interesting
                .iter()
                .map(|v| (*v, unify::deref(&Value::logical_var(*v), env)))
                .collect();
            out.insert_unique(Solution { bindings });
            return;
        }

        let dereffed = unify::deref(&goals[idx], env);
        let (goal, goal_non_consuming) = match &dereffed.kind {
            ValueKind::Compound { functor, args, .. } if *functor == self.symbols.non_consuming && args.len() == 1 => {
                (unify::deref(&args[0], env), true)
            }
            _ => (dereffed, false),
        };
        if goal_stack.iter().any(|g| values_equal(g, &goal)) {
            debug!("goal pattern already on the stack, treating as failure");
            return;
        }

        let (functor, args) = match &goal.kind {
            ValueKind::Compound { functor, args, .. } => (*functor, args.clone()),
            ValueKind::Atom(name) => (*name, Vec::new()),
            _ => return,
        };

        // `append(X, Y, zs)` with `X` unbound and `zs` ground enumerates
        // every way to split `zs`, each tried as a backtracking
        // alternative (§8 scenario 6); `narrow_call` below only ever
        // computes the single deterministic direction.
        if functor == self.builtins.append && args.len() == 3 {
            let xs_deref = unify::deref(&args[0], env);
            let zs_deref = unify::deref(&args[2], env);
            if matches!(xs_deref.kind, ValueKind::LogicalVar(_)) {
                if let ValueKind::List(zs_list) = &zs_deref.kind {
                    let candidates = narrow::append_splits(zs_list)
                        .into_iter()
                        .map(|(xs, ys)| Candidate::AppendSplit { xs, ys })
                        .collect();
                    goal_stack.push(goal.clone());
                    self.try_candidates(
                        candidates, goals, idx, env, trail, constraints, depth, goal_stack, limits, interesting, out,
                        &goal, goal_non_consuming,
                    );
                    goal_stack.pop();
                    return;
                }
            }
        }

        // Built-in narrowing (length/reverse/append) takes priority over
        // user-defined rules, per §4.F step 1's ordering.
        if !args.is_empty() {
            match narrow::narrow_call(functor, &args, env, trail, &self.builtins) {
                NarrowOutcome::Reduced(value) => {
                    if let Some(last) = args.last() {
                        if !unify::unify(last, &value, env, trail) {
                            return;
                        }
                    }
                    goal_stack.push(goal.clone());
                    self.solve(goals, idx + 1, env, trail, constraints, depth + 1, goal_stack, limits, interesting, out);
                    goal_stack.pop();
                    return;
                }
                NarrowOutcome::Suspended(frontier) => {
                    let result = args.last().cloned().unwrap_or_else(|| Value::integer(0));
                    suspend::add_call_suspension(env, SuspensionKind::Narrowing, frontier, functor, args.clone(), result);
                    goal_stack.push(goal.clone());
                    self.solve(goals, idx + 1, env, trail, constraints, depth + 1, goal_stack, limits, interesting, out);
                    goal_stack.pop();
                    return;
                }
                NarrowOutcome::Failed => return,
                NarrowOutcome::Unknown => {}
            }
        }

        if self.foreign.is_registered(functor) {
            match self.foreign.call(functor, &args) {
                Ok(value) => {
                    if let Some(last) = args.last() {
                        if self.foreign.consumes_args(functor) {
                            // Marshalled arguments are spent; nothing further
                            // in this query may rely on their linearity.
                            debug!("foreign call consumed its arguments");
                        }
                        if !unify::unify(last, &value, env, trail) {
                            return;
                        }
                    }
                    goal_stack.push(goal.clone());
                    self.solve(goals, idx + 1, env, trail, constraints, depth + 1, goal_stack, limits, interesting, out);
                    goal_stack.pop();
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "foreign call failed");
                    return;
                }
            }
        }

        if functor == self.symbols.disjunction && args.len() == 2 {
            self.try_candidates(
                vec![
                    Candidate::Branch { goal: args[0].clone() },
                    Candidate::Branch { goal: args[1].clone() },
                ],
                goals,
                idx,
                env,
                trail,
                constraints,
                depth,
                goal_stack,
                limits,
                interesting,
                out,
                &goal,
                goal_non_consuming,
            );
            return;
        }

        let type_id = match &goal.kind {
            ValueKind::Compound { type_id, .. } => *type_id,
            _ => None,
        };
        let candidates = self.candidates_for(functor, args.len(), type_id);
        goal_stack.push(goal.clone());
        self.try_candidates(
            candidates, goals, idx, env, trail, constraints, depth, goal_stack, limits, interesting, out, &goal,
            goal_non_consuming,
        );
        goal_stack.pop();
    }

    /// Candidates whose functor/arity match exactly, filtered further by
    /// §8 scenario 2's type-compatibility rule when the goal carries a
    /// type tag (a typed compound goal matches a fact whose own type tag
    /// shares a union-hierarchy root with it, via `KnowledgeBase::
    /// union_root`) — plus a second, union-only path for the bare-atom
    /// case spec.md §8 scenario 2 actually asks for: a 0-ary goal like
    /// `food` (no literal `food` resource ever exists) matching any
    /// stored individual (`apple1`, `chicken1`, ...) whose own declared
    /// type (`KnowledgeBase::type_of`) unions up to the goal's name
    /// treated as a type, e.g. `apple1: apple`, `apple ⊂ fruit ⊂ food`.
    fn candidates_for(&self, functor: SymbolId, arity: usize, goal_type: Option<loom_ir::TypeId>) -> Vec<Candidate> {
        let kb = self.kb.borrow();
        let type_compatible = |candidate_type: Option<loom_ir::TypeId>| match (goal_type, candidate_type) {
            (None, _) | (_, None) => true,
            (Some(g), Some(c)) => g.compatible(&c) || kb.union_root(g.base) == kb.union_root(c.base),
        };
        let matches_by_union = |term: &loom_ir::Term| -> bool {
            if arity != 0 {
                return false;
            }
            match term {
                loom_ir::Term::Atom(name) => kb
                    .type_of(*name)
                    .map(|t| kb.union_root(t) == kb.union_root(functor))
                    .unwrap_or(false),
                _ => false,
            }
        };
        let mut candidates = Vec::new();
        for (i, resource) in kb.resources().iter().enumerate() {
            let id = kb::ResourceId(i);
            if !kb.is_available(id) {
                continue;
            }
            let (term, non_consuming) = resource.fact.strip_clone();
            let shape_matches = fact_matches_shape(term, functor, arity) && type_compatible(type_of_term(term, &kb));
            if shape_matches {
                candidates.push(Candidate::Fact { id, non_consuming, type_matched: false });
            } else if matches_by_union(term) {
                candidates.push(Candidate::Fact { id, non_consuming, type_matched: true });
            }
        }
        for (i, rule) in kb.rules().iter().enumerate() {
            if fact_matches_shape(&rule.head, functor, arity) && type_compatible(type_of_term(&rule.head, &kb)) {
                candidates.push(Candidate::Rule { index: i });
            }
        }
        candidates
    }

    #[allow(clippy::too_many_arguments)]
    fn try_candidates(
        &self,
        candidates: Vec<Candidate>,
        goals: &[Value],
        idx: usize,
        env: &Rc<RefCell<Environment>>,
        trail: &mut LinearTrail,
        constraints: &mut ConstraintStore,
        depth: usize,
        goal_stack: &mut Vec<Value>,
        limits: &Limits,
        interesting: &[VarId],
        out: &mut SolutionSet,
        goal_value: &Value,
        goal_non_consuming: bool,
    ) {
        let trail_cp = trail.checkpoint();
        let constraint_cp = constraints.checkpoint();
        let alternatives: Vec<Alternative> = (0..candidates.len()).map(|index| Alternative { index }).collect();
        let mut point = ChoicePoint::new(trail_cp, constraint_cp, alternatives, None);

        while point.has_more() {
            let candidate_idx = point.advance();
            self.try_one(
                &candidates[candidate_idx],
                goals,
                idx,
                env,
                trail,
                constraints,
                depth,
                goal_stack,
                limits,
                interesting,
                out,
                goal_value,
                goal_non_consuming,
            );
            trail.rollback(point.trail_checkpoint());
            constraints.rollback(point.constraint_checkpoint().clone());
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_one(
        &self,
        candidate: &Candidate,
        goals: &[Value],
        idx: usize,
        env: &Rc<RefCell<Environment>>,
        trail: &mut LinearTrail,
        constraints: &mut ConstraintStore,
        depth: usize,
        goal_stack: &mut Vec<Value>,
        limits: &Limits,
        interesting: &[VarId],
        out: &mut SolutionSet,
        goal_value: &Value,
        goal_non_consuming: bool,
    ) {
        match candidate {
            Candidate::Fact { id, non_consuming, type_matched } => {
                let fact_term = {
                    let kb = self.kb.borrow();
                    let (term, _) = kb.resource(*id).fact.strip_clone();
                    term.clone()
                };
                let mut fresh = FxHashMap::default();
                let fact_value = kb::instantiate(&fact_term, env, &mut fresh, self.symbols.non_consuming);
                if !*type_matched && !unify::unify(goal_value, &fact_value, env, trail) {
                    return;
                }
                kb::consume_resource(&self.kb, *id, *non_consuming || goal_non_consuming, trail);
                self.solve(goals, idx + 1, env, trail, constraints, depth + 1, goal_stack, limits, interesting, out);
            }
            Candidate::Rule { index } => {
                let (head, body, production) = {
                    let kb = self.kb.borrow();
                    let rule = &kb.rules()[*index];
                    (rule.head.clone(), rule.body.clone(), rule.production.clone())
                };
                let mut fresh = FxHashMap::default();
                let head_value = kb::instantiate(&head, env, &mut fresh, self.symbols.non_consuming);
                if !unify::unify(goal_value, &head_value, env, trail) {
                    return;
                }
                if let Some(production) = production {
                    kb::produce_resource(&self.kb, substitute_term(&production, &fresh), trail);
                }
                let body_goals: Vec<Value> = body
                    .iter()
                    .map(|g| kb::instantiate(g, env, &mut fresh, self.symbols.non_consuming))
                    .collect();
                let mut combined = body_goals;
                combined.extend_from_slice(&goals[idx + 1..]);
                self.solve(&combined, 0, env, trail, constraints, depth + 1, goal_stack, limits, interesting, out);
            }
            Candidate::Branch { goal } => {
                let mut combined = vec![goal.clone()];
                combined.extend_from_slice(&goals[idx + 1..]);
                self.solve(&combined, 0, env, trail, constraints, depth + 1, goal_stack, limits, interesting, out);
            }
            Candidate::AppendSplit { xs, ys } => {
                let args = match &goal_value.kind {
                    ValueKind::Compound { args, .. } => args.clone(),
                    _ => return,
                };
                if !unify::unify(&args[0], &Value::list(xs.clone()), env, trail) {
                    return;
                }
                if !unify::unify(&args[1], &Value::list(ys.clone()), env, trail) {
                    return;
                }
                self.solve(goals, idx + 1, env, trail, constraints, depth + 1, goal_stack, limits, interesting, out);
            }
        }
    }
}

fn type_of_term(term: &loom_ir::Term, kb: &kb::KnowledgeBase) -> Option<loom_ir::TypeId> {
    use loom_ir::Term;
    let name = match term {
        Term::Atom(id) => *id,
        Term::Compound { functor, .. } => *functor,
        _ => return None,
    };
    kb.type_of(name).map(|base| loom_ir::TypeId { base, distinct: false })
}

/// A production term still references the rule's own `Var` ids; since the
/// knowledge base stores facts as `Term`, not `Value`, we rewrite those
/// ids to the fresh environment variables the rule's head/body were just
/// instantiated with, so the produced fact shares bindings with the
/// derivation that created it.
fn substitute_term(term: &loom_ir::Term, fresh: &FxHashMap<VarId, VarId>) -> loom_ir::Term {
    use loom_ir::Term;
    match term {
        Term::Var(id) => Term::Var(*fresh.get(id).unwrap_or(id)),
        Term::Compound { functor, args } => Term::Compound {
            functor: *functor,
            args: args.iter().map(|a| substitute_term(a, fresh)).collect(),
        },
        Term::Clone(inner) => Term::Clone(Box::new(substitute_term(inner, fresh))),
        other => other.clone(),
    }
}

fn fact_matches_shape(term: &loom_ir::Term, functor: SymbolId, arity: usize) -> bool {
    use loom_ir::Term;
    match term {
        Term::Compound { functor: f, args } => *f == functor && args.len() == arity,
        Term::Atom(name) => *name == functor && arity == 0,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kb::KnowledgeBase;
    use loom_ir::{SymbolTable, Term};

    fn setup() -> (Rc<RefCell<Environment>>, LinearTrail, ConstraintStore, SymbolTable) {
        (Environment::new(), LinearTrail::new(), ConstraintStore::new(), SymbolTable::new())
    }

    #[test]
    fn direct_fact_match_consumes_a_linear_resource() {
        let (env, mut trail, mut constraints, mut table) = setup();
        let parent = table.intern("parent");
        let alice = table.intern("alice");
        let bob = table.intern("bob");
        let mut kb = KnowledgeBase::new();
        kb.add_linear_fact(Term::compound(parent, vec![Term::Atom(alice), Term::Atom(bob)]));
        let kb = Rc::new(RefCell::new(kb));
        let builtins = BuiltinRegistry::new(&mut table);
        let symbols = ResolverSymbols::new(&mut table);
        let resolver = Resolver {
            kb: Rc::clone(&kb),
            foreign: ForeignRegistry::new(),
            builtins,
            symbols,
        };
        let goal = Value::compound(parent, vec![Value::atom(alice), Value::atom(bob)], None);
        let solutions = resolver.resolve(&[goal], &[], &env, &mut trail, &mut constraints, &Limits::default());
        assert_eq!(solutions.solutions.len(), 1);
        assert!(!kb.borrow().is_available(kb::ResourceId(0)));
    }

    #[test]
    fn rule_application_expands_the_body() {
        let (env, mut trail, mut constraints, mut table) = setup();
        let grandparent = table.intern("grandparent");
        let parent = table.intern("parent");
        let alice = table.intern("alice");
        let bob = table.intern("bob");
        let carol = table.intern("carol");
        let mut kb = KnowledgeBase::new();
        kb.add_persistent_fact(Term::compound(parent, vec![Term::Atom(alice), Term::Atom(bob)]));
        kb.add_persistent_fact(Term::compound(parent, vec![Term::Atom(bob), Term::Atom(carol)]));
        let x = VarId::from_raw(1000);
        let y = VarId::from_raw(1001);
        let z = VarId::from_raw(1002);
        kb.add_rule(
            Term::compound(grandparent, vec![Term::Var(x), Term::Var(z)]),
            vec![
                Term::compound(parent, vec![Term::Var(x), Term::Var(y)]),
                Term::compound(parent, vec![Term::Var(y), Term::Var(z)]),
            ],
            None,
            false,
        );
        let kb = Rc::new(RefCell::new(kb));
        let builtins = BuiltinRegistry::new(&mut table);
        let symbols = ResolverSymbols::new(&mut table);
        let resolver = Resolver {
            kb,
            foreign: ForeignRegistry::new(),
            builtins,
            symbols,
        };
        let result = env.borrow_mut().fresh_var();
        let goal = Value::compound(grandparent, vec![Value::atom(alice), Value::logical_var(result)], None);
        let solutions = resolver.resolve(&[goal], &[result], &env, &mut trail, &mut constraints, &Limits::default());
        assert_eq!(solutions.solutions.len(), 1);
        match &solutions.solutions[0].bindings[0].1.kind {
            ValueKind::Atom(id) => assert_eq!(*id, carol),
            _ => panic!("expected carol"),
        }
    }
}
