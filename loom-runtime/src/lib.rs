//! Runtime lifecycle and public query API: the thing a generated `main`
//! (or `loom-repl`) actually links against. Wires together the term/value
//! layer (`loom-ir`), the environment/trail/unification/narrowing layer
//! (`loom-engine`), and the constraint-store/knowledge-base/resolver
//! layer (`loom-solve`) behind one `Runtime` handle.

pub mod concurrency;
pub mod config;
pub mod error;

pub use config::RuntimeConfig;
pub use error::RuntimeError;

use failure::Fallible;
use loom_engine::env::ConstraintSink;
use loom_engine::{Environment, LinearTrail};
use loom_ir::{SymbolId, SymbolTable, Term, VarId};
use loom_solve::constraint::{ConstraintPropagator, ConstraintStore, LinearFunction};
use loom_solve::foreign::{ForeignImpl, ParamKind};
use loom_solve::kb::{self, KbHandle, KnowledgeBase};
use loom_solve::resolve::{Limits, Resolver, ResolverSymbols, SolutionSet};
use loom_solve::{ForeignRegistry, Strength};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::info;

/// A fully wired runtime instance (§6 "runtime lifecycle"). Not `Clone`:
/// a program builds one `Runtime`, populates its knowledge base, and
/// issues queries against it for its whole lifetime.
pub struct Runtime {
    pub table: SymbolTable,
    pub env: Rc<RefCell<Environment>>,
    pub trail: LinearTrail,
    pub kb: KbHandle,
    constraints: Rc<RefCell<ConstraintPropagator>>,
    resolver: Resolver,
    pub config: RuntimeConfig,
}

/// `init_runtime(config)` (§6): allocates the symbol table, environment,
/// knowledge base, and constraint store, and wires the environment's
/// `ConstraintSink` to the fresh constraint store so binds propagate
/// automatically.
pub fn init_runtime(config: RuntimeConfig) -> Runtime {
    info!(max_recursion_depth = config.max_recursion_depth, "initializing runtime");
    let mut table = SymbolTable::new();
    let builtins = loom_engine::BuiltinRegistry::new(&mut table);
    let symbols = ResolverSymbols::new(&mut table);

    let env = Environment::new();
    env.borrow_mut().set_builtins(builtins);

    let mut store = ConstraintStore::new();
    store.auto_update = config.auto_update_constraints;
    let propagator = Rc::new(RefCell::new(ConstraintPropagator { store }));
    let sink: Rc<RefCell<dyn ConstraintSink>> = propagator.clone();
    env.borrow_mut().set_constraint_sink(sink);

    let kb = Rc::new(RefCell::new(KnowledgeBase::new()));
    let resolver = Resolver {
        kb: Rc::clone(&kb),
        foreign: ForeignRegistry::new(),
        builtins,
        symbols,
    };

    Runtime {
        table,
        env,
        trail: LinearTrail::new(),
        kb,
        constraints: propagator,
        resolver,
        config,
    }
}

/// `cleanup_runtime(runtime)` (§6): drops every handle. There is no
/// persistent storage to flush (the non-goals exclude it), so this is a
/// plain `drop`; it exists as a named call so callers mirror the
/// lifecycle symmetrically instead of relying on scope exit.
pub fn cleanup_runtime(runtime: Runtime) {
    drop(runtime);
}

impl Runtime {
    pub fn intern(&mut self, s: &str) -> SymbolId {
        self.table.intern(s)
    }

    pub fn fresh_var(&mut self) -> VarId {
        self.env.borrow_mut().fresh_var()
    }

    // --- knowledge base API (§6) ---

    pub fn add_linear_fact(&mut self, term: Term) -> kb::ResourceId {
        self.kb.borrow_mut().add_linear_fact(term)
    }

    pub fn add_persistent_fact(&mut self, term: Term) -> kb::ResourceId {
        self.kb.borrow_mut().add_persistent_fact(term)
    }

    pub fn add_rule(&mut self, head: Term, body: Vec<Term>, production: Option<Term>, is_recursive: bool) {
        self.kb.borrow_mut().add_rule(head, body, production, is_recursive);
    }

    pub fn add_type_mapping(&mut self, term_name: SymbolId, type_name: SymbolId) {
        self.kb.borrow_mut().add_type_mapping(term_name, type_name);
    }

    pub fn add_union_mapping(&mut self, variant: SymbolId, parent: SymbolId) {
        self.kb.borrow_mut().add_union_mapping(variant, parent);
    }

    // --- foreign-function registry (§6, §4.J) ---

    pub fn register_foreign(
        &mut self,
        name: SymbolId,
        return_kind: ParamKind,
        param_kinds: Vec<ParamKind>,
        consumes_args: bool,
        implementation: ForeignImpl,
    ) {
        self.resolver.foreign.register(name, return_kind, param_kinds, consumes_args, implementation);
    }

    // --- constraint store API (§6, §4.G) ---

    pub fn register_linear_function(&mut self, name: SymbolId, scale: f64, offset: f64) {
        self.constraints.borrow_mut().store.register_function(name, LinearFunction { scale, offset });
    }

    pub fn add_linear_constraint(&mut self, constraint: loom_solve::Constraint, strength: Strength) -> Fallible<()> {
        self.constraints.borrow_mut().store.add_linear_constraint(constraint, strength)
    }

    pub fn shadow_of(&self, var: VarId) -> Option<f64> {
        self.constraints.borrow().store.shadow(var)
    }

    // --- query API (§6) ---

    /// `resolve(goal)`: the common case, one goal term, returning every
    /// distinct binding of `interesting`.
    pub fn resolve(&mut self, goal: &Term, interesting: &[VarId]) -> SolutionSet {
        self.resolve_conjunction(std::slice::from_ref(goal), interesting)
    }

    /// `resolve_enhanced(goals)`: a conjunction of goals resolved together,
    /// sharing one environment and trail (§6).
    pub fn resolve_conjunction(&mut self, goals: &[Term], interesting: &[VarId]) -> SolutionSet {
        let clone_marker = self.resolver.symbols.non_consuming;
        let values: Vec<_> = goals.iter().map(|g| kb::ground_value(g, clone_marker)).collect();
        let limits = Limits {
            max_depth: self.config.max_recursion_depth,
        };
        let mut propagator = self.constraints.borrow_mut();
        self.resolver
            .resolve(&values, interesting, &self.env, &mut self.trail, &mut propagator.store, &limits)
    }

    /// `resolve_disjunctive(left, right)`: convenience wrapper building the
    /// resolver's disjunction marker goal rather than requiring the caller
    /// to know its interned symbol (§6, §4.H disjunctive resolution).
    pub fn resolve_disjunctive(&mut self, left: Term, right: Term, interesting: &[VarId]) -> SolutionSet {
        let or_symbol = self.resolver.symbols.disjunction;
        let goal = Term::compound(or_symbol, vec![left, right]);
        self.resolve(&goal, interesting)
    }
}
