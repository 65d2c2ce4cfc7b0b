//! A tiny line notation for typing facts, rules, and queries at the
//! prompt. This is deliberately not a parser for any surface language —
//! it only understands one flat term grammar:
//!
//! ```text
//! term   := IDENT | INTEGER | IDENT '(' term (',' term)* ')'
//! ```
//!
//! An `IDENT` starting with an uppercase letter or `_` names a variable
//! (shared within one line by spelling, fresh per line); anything else is
//! an atom or a compound functor name.

use failure::{bail, Fallible};
use loom_ir::{SymbolTable, Term, VarId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

pub struct ParseContext<'a> {
    table: &'a mut SymbolTable,
    env: &'a Rc<RefCell<loom_engine::Environment>>,
    vars: FxHashMap<String, VarId>,
}

impl<'a> ParseContext<'a> {
    pub fn new(table: &'a mut SymbolTable, env: &'a Rc<RefCell<loom_engine::Environment>>) -> Self {
        ParseContext {
            table,
            env,
            vars: FxHashMap::default(),
        }
    }

    pub fn variables(&self) -> Vec<VarId> {
        self.vars.values().copied().collect()
    }

    fn var_named(&mut self, name: &str) -> VarId {
        if let Some(id) = self.vars.get(name) {
            return *id;
        }
        let id = self.env.borrow_mut().fresh_var();
        self.vars.insert(name.to_string(), id);
        id
    }
}

/// Splits `text` on top-level commas (not nested inside parens).
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Parses a comma-separated list of terms at the top level (used for rule
/// bodies and conjunctive queries).
pub fn parse_term_list(ctx: &mut ParseContext, text: &str) -> Fallible<Vec<Term>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(text, ',').into_iter().map(|part| parse_term(ctx, part)).collect()
}

pub fn parse_term(ctx: &mut ParseContext, text: &str) -> Fallible<Term> {
    let text = text.trim();
    if text.is_empty() {
        bail!("expected a term, found an empty string");
    }
    if let Some(open) = text.find('(') {
        if !text.ends_with(')') {
            bail!("unbalanced parentheses in `{}`", text);
        }
        let name = text[..open].trim();
        let inner = &text[open + 1..text.len() - 1];
        let args = split_top_level(inner, ',')
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|part| parse_term(ctx, part))
            .collect::<Fallible<Vec<_>>>()?;
        let functor = ctx.table.intern(name);
        return Ok(Term::compound(functor, args));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Term::Integer(n));
    }
    let first = text.chars().next().unwrap();
    if first.is_uppercase() || first == '_' {
        return Ok(Term::Var(ctx.var_named(text)));
    }
    Ok(Term::Atom(ctx.table.intern(text)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn a_bare_lowercase_word_is_an_atom() {
        let mut table = SymbolTable::new();
        let env = loom_engine::Environment::new();
        let mut ctx = ParseContext::new(&mut table, &env);
        let term = parse_term(&mut ctx, "alice").unwrap();
        assert!(matches!(term, Term::Atom(_)));
    }

    #[test]
    fn the_same_spelling_resolves_to_the_same_variable_within_one_line() {
        let mut table = SymbolTable::new();
        let env = loom_engine::Environment::new();
        let mut ctx = ParseContext::new(&mut table, &env);
        let goals = parse_term_list(&mut ctx, "parent(X, bob), ancestor(X, carol)").unwrap();
        let (x1, x2) = match (&goals[0], &goals[1]) {
            (Term::Compound { args: a, .. }, Term::Compound { args: b, .. }) => (&a[0], &b[0]),
            _ => panic!("expected compounds"),
        };
        assert_eq!(x1, x2);
    }

    #[test]
    fn a_ground_compound_round_trips_through_display_and_back() {
        let mut table = SymbolTable::new();
        let env = loom_engine::Environment::new();
        let mut ctx = ParseContext::new(&mut table, &env);
        let original = parse_term(&mut ctx, "likes(alice, pizza)").unwrap();
        let printed = format!("{}", original.display(&table));
        let mut reparse_ctx = ParseContext::new(&mut table, &env);
        let reparsed = parse_term(&mut reparse_ctx, &printed).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn nested_compounds_split_on_top_level_commas_only() {
        let mut table = SymbolTable::new();
        let env = loom_engine::Environment::new();
        let mut ctx = ParseContext::new(&mut table, &env);
        let terms = parse_term_list(&mut ctx, "foo(a, b), bar(c)").unwrap();
        assert_eq!(terms.len(), 2);
    }
}
