use loom_engine::trail::TrailAction;
use loom_engine::{Environment, LinearTrail};
use loom_ir::{SymbolId, SymbolTable, Term, TypeId, Value, VarId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Stable index into `KnowledgeBase::resources`. A `Vec` with stable
/// indices gives the original's "singly linked list" the same
/// insertion-order matching and O(1) consumed-flag toggling without
/// unsafe pointer juggling (§3 implementation note).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ResourceId(pub usize);

/// §3: `LinearResource{fact, consumed, persistent}`.
pub struct LinearResource {
    pub fact: Term,
    pub consumed: bool,
    pub persistent: bool,
}

/// §3: `Rule{head, body, production, is_recursive}`. `production` is the
/// term added to the KB when the rule fires (the linear-logic "⊸"
/// production).
pub struct Rule {
    pub head: Term,
    pub body: Vec<Term>,
    pub production: Option<Term>,
    pub is_recursive: bool,
}

/// §3/§6: facts (linear and persistent, both held in `resources`), rules,
/// and the type/union mappings used by compound-type compatibility and
/// the union-hierarchy membership scenario (§8 scenario 2).
pub struct KnowledgeBase {
    resources: Vec<LinearResource>,
    rules: Vec<Rule>,
    type_mappings: FxHashMap<SymbolId, SymbolId>,
    union_mappings: FxHashMap<SymbolId, SymbolId>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        KnowledgeBase {
            resources: Vec::new(),
            rules: Vec::new(),
            type_mappings: FxHashMap::default(),
            union_mappings: FxHashMap::default(),
        }
    }

    pub fn add_linear_fact(&mut self, term: Term) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(LinearResource {
            fact: term,
            consumed: false,
            persistent: false,
        });
        id
    }

    pub fn add_persistent_fact(&mut self, term: Term) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(LinearResource {
            fact: term,
            consumed: false,
            persistent: true,
        });
        id
    }

    pub fn add_rule(&mut self, head: Term, body: Vec<Term>, production: Option<Term>, is_recursive: bool) {
        self.rules.push(Rule {
            head,
            body,
            production,
            is_recursive,
        });
    }

    pub fn add_type_mapping(&mut self, term_name: SymbolId, type_name: SymbolId) {
        self.type_mappings.insert(term_name, type_name);
    }

    pub fn add_union_mapping(&mut self, variant: SymbolId, parent: SymbolId) {
        self.union_mappings.insert(variant, parent);
    }

    /// Resolves `name`'s union-hierarchy root by walking `union_mappings`
    /// (e.g. `apple -> fruit -> food`), used by the type-compatibility
    /// check when matching typed atoms/compounds (§8 scenario 2).
    pub fn union_root(&self, mut name: SymbolId) -> SymbolId {
        let mut seen = std::collections::HashSet::new();
        while let Some(&parent) = self.union_mappings.get(&name) {
            if !seen.insert(name) {
                break;
            }
            name = parent;
        }
        name
    }

    pub fn type_of(&self, name: SymbolId) -> Option<SymbolId> {
        self.type_mappings.get(&name).copied()
    }

    pub fn resources(&self) -> &[LinearResource] {
        &self.resources
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn resource(&self, id: ResourceId) -> &LinearResource {
        &self.resources[id.0]
    }

    /// A resource is a valid match candidate iff it is persistent or not
    /// yet consumed (§3 invariant).
    pub fn is_available(&self, id: ResourceId) -> bool {
        let r = &self.resources[id.0];
        r.persistent || !r.consumed
    }

    fn mark_consumed(&mut self, id: ResourceId, consumed: bool) {
        let r = &mut self.resources[id.0];
        if !r.persistent {
            r.consumed = consumed;
        }
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        KnowledgeBase::new()
    }
}

/// Shared, trail-aware handle: the resolver consumes/produces resources
/// through this so that rollback can find its way back to the KB without
/// the `LinearTrail` (defined in `loom-engine`) needing to know what a
/// `KnowledgeBase` is.
pub type KbHandle = Rc<RefCell<KnowledgeBase>>;

/// A journaled "consume this resource" effect (§4.D `record_consumption`,
/// realized for KB resources specifically). `Clone`-wrapped occurrences
/// and persistent facts never produce one of these: matching them leaves
/// the resource's `consumed` flag untouched, per §3's generalized rule.
struct ConsumeAction {
    kb: KbHandle,
    id: ResourceId,
}

impl TrailAction for ConsumeAction {
    fn undo(&mut self) {
        self.kb.borrow_mut().mark_consumed(self.id, false);
    }

    fn finalize(&mut self) {
        // Nothing to free explicitly: resources live in `KnowledgeBase`'s
        // `Vec` for the runtime's lifetime. "Finalizing" a consumption
        // just means we stop tracking it as reversible.
    }
}

/// A journaled "this rule produced a resource" effect (§4.H forward
/// chaining). Undoing a production removes the resource outright, since
/// unlike consumption, production adds something that did not exist
/// before.
struct ProduceAction {
    kb: KbHandle,
    id: ResourceId,
}

impl TrailAction for ProduceAction {
    fn undo(&mut self) {
        let mut kb = self.kb.borrow_mut();
        // A produced resource "never existed" once undone; removing it
        // from the tail preserves every earlier index (productions are
        // always appended, never inserted).
        if self.id.0 == kb.resources.len() - 1 {
            kb.resources.pop();
        } else {
            // A later production was committed over this one without a
            // rollback in between; mark it permanently unavailable
            // instead of shifting indices that earlier trail entries may
            // still reference.
            kb.resources[self.id.0].consumed = true;
            kb.resources[self.id.0].persistent = false;
        }
    }

    fn finalize(&mut self) {}
}

/// Consumes (or, for a persistent/`Clone`-wrapped match, merely marks
/// used) a resource, journaling the effect so a later rollback can
/// restore it (§4.D, §4.H).
pub fn consume_resource(kb: &KbHandle, id: ResourceId, non_consuming: bool, trail: &mut LinearTrail) {
    let persistent = kb.borrow().resource(id).persistent;
    if persistent || non_consuming {
        return;
    }
    kb.borrow_mut().mark_consumed(id, true);
    trail.record_external(Box::new(ConsumeAction { kb: Rc::clone(kb), id }));
}

/// Adds `production` as a fresh linear resource and journals its
/// creation so rollback can remove it again (§4.H forward chaining).
pub fn produce_resource(kb: &KbHandle, production: Term, trail: &mut LinearTrail) -> ResourceId {
    let id = kb.borrow_mut().add_linear_fact(production);
    trail.record_external(Box::new(ProduceAction { kb: Rc::clone(kb), id }));
    id
}

/// Instantiates a stored `Term` into query `Value` space, allocating a
/// fresh environment variable for every distinct `Var` the term mentions
/// (generalized from type-inference binder instantiation to rule
/// variables). `Term::Clone(inner)` becomes a one-argument compound
/// tagged with `clone_marker`, wrapping the instantiated inner value —
/// the same reserved-functor idiom `loom-solve::resolve` uses for its
/// disjunction marker. `Resolver::solve` recognizes and strips this
/// wrapper off a goal before matching it, noting the occurrence as
/// non-consuming against whatever linear resource it matches.
pub fn instantiate(
    term: &Term,
    env: &Rc<RefCell<Environment>>,
    fresh: &mut FxHashMap<VarId, VarId>,
    clone_marker: SymbolId,
) -> Value {
    match term {
        Term::Atom(id) => Value::atom(*id),
        Term::Integer(n) => Value::integer(*n),
        Term::Var(id) => {
            let fresh_id = *fresh
                .entry(*id)
                .or_insert_with(|| env.borrow_mut().fresh_var());
            Value::logical_var(fresh_id)
        }
        Term::Compound { functor, args } => {
            let values = args.iter().map(|a| instantiate(a, env, fresh, clone_marker)).collect();
            Value::compound(*functor, values, type_id_for(*functor))
        }
        Term::Clone(inner) => {
            let wrapped = instantiate(inner, env, fresh, clone_marker);
            Value::compound(clone_marker, vec![wrapped], None)
        }
    }
}

/// Converts a `Term` straight into `Value` space without freshening any
/// variable: `Term::Var(id)` is assumed to already name a real variable in
/// `env` (the caller allocated it up front, e.g. for a top-level query's
/// free variables). Used instead of `instantiate` whenever the term's
/// variables must keep referring to the caller's own bindings rather than
/// a new rule application's private copies. `Term::Clone` is wrapped the
/// same way `instantiate` wraps it; see its doc comment.
pub fn ground_value(term: &Term, clone_marker: SymbolId) -> Value {
    match term {
        Term::Atom(id) => Value::atom(*id),
        Term::Integer(n) => Value::integer(*n),
        Term::Var(id) => Value::logical_var(*id),
        Term::Compound { functor, args } => {
            let values = args.iter().map(|a| ground_value(a, clone_marker)).collect();
            Value::compound(*functor, values, type_id_for(*functor))
        }
        Term::Clone(inner) => {
            let wrapped = ground_value(inner, clone_marker);
            Value::compound(clone_marker, vec![wrapped], None)
        }
    }
}

/// Placeholder hook for attaching a `TypeId` at instantiation time; the
/// core does not need a global type table to satisfy §8's scenarios, so
/// this always returns `None` today, leaving the unifier's type-
/// compatibility check a no-op until a caller threads real type
/// information through (see `KnowledgeBase::type_of`/`union_root`, which
/// `loom-solve::resolve` consults directly when matching typed goals).
fn type_id_for(_functor: SymbolId) -> Option<TypeId> {
    None
}

pub fn print_resource(r: &LinearResource, table: &SymbolTable) -> String {
    format!(
        "{}{}",
        r.fact.display(table),
        if r.persistent { " [persistent]" } else { "" }
    )
}
