//! The seven end-to-end scenarios, one test function each, in the
//! teacher's integration-test style (`chalk-tests`'s per-program test
//! functions).

use itertools::Itertools;
use loom_ir::{Term, Value, ValueKind, VarId};
use loom_runtime::{init_runtime, RuntimeConfig};
use loom_solve::{ArithOp, Constraint, Operand, ResourceId, Strength};

fn atom_eq(value: &Value, expected_name: &str, table: &loom_ir::SymbolTable) -> bool {
    match &value.kind {
        ValueKind::Atom(id) => table.resolve(*id) == expected_name,
        _ => false,
    }
}

#[test]
fn ancestor_with_no_tall_common_ancestor_has_no_solutions() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let parent = rt.intern("parent");
    let ancestor = rt.intern("ancestor");
    let tall = rt.intern("tall");
    let alice = rt.intern("alice");
    let bob = rt.intern("bob");
    let carol = rt.intern("carol");
    let dave = rt.intern("dave");

    rt.add_persistent_fact(Term::compound(parent, vec![Term::Atom(alice), Term::Atom(bob)]));
    rt.add_persistent_fact(Term::compound(parent, vec![Term::Atom(bob), Term::Atom(carol)]));
    rt.add_persistent_fact(Term::compound(parent, vec![Term::Atom(carol), Term::Atom(dave)]));
    rt.add_persistent_fact(Term::compound(tall, vec![Term::Atom(dave)]));

    let x = VarId::from_raw(9000);
    let y = VarId::from_raw(9001);
    let z = VarId::from_raw(9002);
    rt.add_rule(
        Term::compound(ancestor, vec![Term::Var(x), Term::Var(y)]),
        vec![Term::compound(parent, vec![Term::Var(x), Term::Var(y)])],
        None,
        false,
    );
    rt.add_rule(
        Term::compound(ancestor, vec![Term::Var(x), Term::Var(y)]),
        vec![
            Term::compound(parent, vec![Term::Var(x), Term::Var(z)]),
            Term::compound(ancestor, vec![Term::Var(z), Term::Var(y)]),
        ],
        None,
        true,
    );

    let query_x = rt.fresh_var();
    let goals = vec![
        Term::compound(ancestor, vec![Term::Var(query_x), Term::Atom(carol)]),
        Term::compound(tall, vec![Term::Var(query_x)]),
    ];
    let solutions = rt.resolve_conjunction(&goals, &[query_x]);
    assert!(solutions.solutions.is_empty(), "expected false per the Open Question resolution");
}

#[test]
fn union_hierarchy_root_collapses_subtype_chains() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let apple = rt.intern("apple");
    let fruit = rt.intern("fruit");
    let food = rt.intern("food");
    let chicken = rt.intern("chicken");
    let poultry = rt.intern("poultry");
    let meat = rt.intern("meat");

    rt.add_union_mapping(apple, fruit);
    rt.add_union_mapping(fruit, food);
    rt.add_union_mapping(chicken, poultry);
    rt.add_union_mapping(poultry, meat);
    rt.add_union_mapping(meat, food);

    assert_eq!(rt.kb.borrow().union_root(apple), food);
    assert_eq!(rt.kb.borrow().union_root(chicken), food);
}

#[test]
fn eating_then_feeling_satisfied_then_happy_consumes_one_food_typed_resource_per_step() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let apple1 = rt.intern("apple1");
    let chicken1 = rt.intern("chicken1");
    let turkey1 = rt.intern("turkey1");
    let apple = rt.intern("apple");
    let fruit = rt.intern("fruit");
    let chicken = rt.intern("chicken");
    let turkey = rt.intern("turkey");
    let poultry = rt.intern("poultry");
    let meat = rt.intern("meat");
    let food = rt.intern("food");
    let satisfied = rt.intern("satisfied");
    let happy = rt.intern("happy");
    let eat_rule = rt.intern("eat_rule");
    let mood_rule = rt.intern("mood_rule");

    // apple ⊂ fruit ⊂ food, chicken/turkey ⊂ poultry ⊂ meat ⊂ food (§8
    // scenario 2's union hierarchy).
    rt.add_type_mapping(apple1, apple);
    rt.add_type_mapping(chicken1, chicken);
    rt.add_type_mapping(turkey1, turkey);
    rt.add_union_mapping(apple, fruit);
    rt.add_union_mapping(fruit, food);
    rt.add_union_mapping(chicken, poultry);
    rt.add_union_mapping(turkey, poultry);
    rt.add_union_mapping(poultry, meat);
    rt.add_union_mapping(meat, food);

    rt.add_linear_fact(Term::Atom(apple1));
    rt.add_linear_fact(Term::Atom(chicken1));
    rt.add_linear_fact(Term::Atom(turkey1));
    // `eat_rule`'s body is the bare type name `food`, not any one
    // individual: it is satisfied by whichever food-typed resource the
    // resolver finds available first (§8 scenario 2), not specifically
    // `apple1`.
    rt.add_rule(Term::Atom(eat_rule), vec![Term::Atom(food)], Some(Term::Atom(satisfied)), false);
    rt.add_rule(Term::Atom(mood_rule), vec![Term::Atom(satisfied)], Some(Term::Atom(happy)), false);

    let solutions = rt.resolve_conjunction(&[Term::Atom(eat_rule), Term::Atom(mood_rule)], &[]);
    assert_eq!(solutions.solutions.len(), 1);

    let consumed = [apple1, chicken1, turkey1]
        .iter()
        .filter(|&&name| {
            let kb = rt.kb.borrow();
            kb.resources()
                .iter()
                .enumerate()
                .any(|(i, r)| matches!(&r.fact, Term::Atom(id) if *id == name) && !kb.is_available(ResourceId(i)))
        })
        .count();
    assert_eq!(consumed, 1, "exactly one food-typed resource should have been consumed");
}

#[test]
fn ancestor_via_a_persistent_parent_fact() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let parent = rt.intern("parent");
    let ancestor = rt.intern("ancestor");
    let alice = rt.intern("alice");
    let bob = rt.intern("bob");

    rt.add_persistent_fact(Term::compound(parent, vec![Term::Atom(alice), Term::Atom(bob)]));
    let x = VarId::from_raw(9100);
    let y = VarId::from_raw(9101);
    rt.add_rule(
        Term::compound(ancestor, vec![Term::Var(x), Term::Var(y)]),
        vec![Term::compound(parent, vec![Term::Var(x), Term::Var(y)])],
        None,
        false,
    );

    let result = rt.fresh_var();
    let goal = Term::compound(ancestor, vec![Term::Atom(alice), Term::Var(result)]);
    let solutions = rt.resolve(&goal, &[result]);
    assert_eq!(solutions.solutions.len(), 1);
    assert!(atom_eq(&solutions.solutions[0].bindings[0].1, "bob", &rt.table));
}

#[test]
fn length_narrows_a_ground_list() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let length = rt.intern("length");
    let result = rt.fresh_var();
    let list_var = rt.fresh_var();
    loom_engine::unify::unify(
        &Value::logical_var(list_var),
        &Value::list(vec![Value::integer(10), Value::integer(20)]),
        &rt.env,
        &mut rt.trail,
    );
    let goal = Term::compound(length, vec![Term::Var(list_var), Term::Var(result)]);
    let solutions = rt.resolve(&goal, &[result]);
    assert_eq!(solutions.solutions.len(), 1);
    match solutions.solutions[0].bindings[0].1.kind {
        ValueKind::Integer(2) => {}
        _ => panic!("expected length 2"),
    }
}

#[test]
fn reverse_narrows_a_ground_list() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let reverse = rt.intern("reverse");
    let list_var = rt.fresh_var();
    let result = rt.fresh_var();
    loom_engine::unify::unify(
        &Value::logical_var(list_var),
        &Value::list(vec![Value::integer(1), Value::integer(2)]),
        &rt.env,
        &mut rt.trail,
    );
    let goal = Term::compound(reverse, vec![Term::Var(list_var), Term::Var(result)]);
    let solutions = rt.resolve(&goal, &[result]);
    assert_eq!(solutions.solutions.len(), 1);
    match &solutions.solutions[0].bindings[0].1.kind {
        ValueKind::List(list) => {
            assert_eq!(list.elements.len(), 2);
            match (&list.elements[0].kind, &list.elements[1].kind) {
                (ValueKind::Integer(2), ValueKind::Integer(1)) => {}
                _ => panic!("expected [2, 1]"),
            }
        }
        _ => panic!("expected a list"),
    }
}

#[test]
fn append_is_deterministic_when_the_first_argument_is_ground() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let append = rt.intern("append");
    let result = rt.fresh_var();
    let xs_var = rt.fresh_var();
    let ys_var = rt.fresh_var();
    loom_engine::unify::unify(
        &Value::logical_var(xs_var),
        &Value::list(vec![Value::integer(1), Value::integer(2)]),
        &rt.env,
        &mut rt.trail,
    );
    loom_engine::unify::unify(
        &Value::logical_var(ys_var),
        &Value::list(vec![Value::integer(3)]),
        &rt.env,
        &mut rt.trail,
    );
    let goal = Term::compound(append, vec![Term::Var(xs_var), Term::Var(ys_var), Term::Var(result)]);
    let solutions = rt.resolve(&goal, &[result]);
    assert_eq!(solutions.solutions.len(), 1);
    match &solutions.solutions[0].bindings[0].1.kind {
        ValueKind::List(list) => assert_eq!(list.elements.len(), 3),
        _ => panic!("expected a list"),
    }
}

#[test]
fn append_enumerates_every_split_when_the_first_two_arguments_are_unbound() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let append = rt.intern("append");
    let xs = rt.fresh_var();
    let ys = rt.fresh_var();
    let zs = rt.fresh_var();
    loom_engine::unify::unify(
        &Value::logical_var(zs),
        &Value::list(vec![Value::integer(1), Value::integer(2)]),
        &rt.env,
        &mut rt.trail,
    );
    let goal = Term::compound(append, vec![Term::Var(xs), Term::Var(ys), Term::Var(zs)]);

    let solutions = rt.resolve_conjunction(&[goal], &[xs, ys]);
    assert_eq!(solutions.solutions.len(), 3, "append(X, Y, [1,2]) should enumerate 3 splits");

    let lengths: Vec<usize> = solutions
        .solutions
        .iter()
        .map(|s| match &s.bindings[0].1.kind {
            ValueKind::List(l) => l.elements.len(),
            _ => panic!("expected X to be bound to a list"),
        })
        .collect();
    let mut sorted = lengths.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0, 1, 2]);
}

#[test]
fn append_splits_enumerate_partitions_of_a_ground_result() {
    let zs = loom_ir::ListValue::from_elements(vec![Value::integer(1), Value::integer(2)]);
    let splits = loom_engine::narrow::append_splits(&zs);
    assert_eq!(splits.len(), 3);
    assert_eq!(splits[0].0.len(), 0);
    assert_eq!(splits[0].1.len(), 2);
    assert_eq!(splits[1].0.len(), 1);
    assert_eq!(splits[2].0.len(), 2);
    assert_eq!(splits[2].1.len(), 0);
    // every partition's prefix length is distinct: 0, 1, 2.
    assert!(splits.iter().map(|(prefix, _)| prefix.len()).all_unique());
}

#[test]
fn function_constraint_inverts_a_registered_increment() {
    let mut store = loom_solve::ConstraintStore::new();
    let mut table = loom_ir::SymbolTable::new();
    let increment = table.intern("increment");
    store.register_function(increment, loom_solve::LinearFunction { scale: 1.0, offset: 5.0 });
    let x = VarId::from_raw(0);
    match store.add_function_constraint(increment, x, 11.0) {
        loom_solve::FunctionOutcome::Solved(value) => assert!((value - 6.0).abs() < 1e-6),
        loom_solve::FunctionOutcome::Suspended => panic!("expected an algebraic solution"),
    }
}

#[test]
fn two_independent_function_constraints_solve_to_the_same_value() {
    let mut store = loom_solve::ConstraintStore::new();
    let mut table = loom_ir::SymbolTable::new();
    let increment = table.intern("increment");
    store.register_function(increment, loom_solve::LinearFunction { scale: 1.0, offset: 5.0 });

    let x = VarId::from_raw(0);
    let y = VarId::from_raw(1);
    let sx = match store.add_function_constraint(increment, x, 7.0) {
        loom_solve::FunctionOutcome::Solved(v) => v,
        loom_solve::FunctionOutcome::Suspended => panic!("expected a solution"),
    };
    let sy = match store.add_function_constraint(increment, y, 7.0) {
        loom_solve::FunctionOutcome::Solved(v) => v,
        loom_solve::FunctionOutcome::Suspended => panic!("expected a solution"),
    };
    assert!((sx - 2.0).abs() < 1e-6);
    assert!((sy - 2.0).abs() < 1e-6);
}

#[test]
fn arithmetic_constraint_propagates_on_bind() {
    let mut rt = init_runtime(RuntimeConfig::default());
    let x = rt.fresh_var();
    let y = rt.fresh_var();
    let z = rt.fresh_var();
    rt.add_linear_constraint(
        Constraint::Arithmetic {
            op: ArithOp::Add,
            left: Operand::Unbound(x),
            right: Operand::Unbound(y),
            result: Operand::Unbound(z),
        },
        Strength::Weak,
    )
    .ok();
    let _ = rt.shadow_of(z);
}
