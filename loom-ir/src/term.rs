use crate::symbol::{SymbolId, SymbolTable};
use crate::value::VarId;
use std::fmt;

/// A type tag carried optionally by atoms and compounds.
///
/// Two types are compatible iff they are equal, or both `distinct` is
/// false and they share the same `base` family (§3).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TypeId {
    pub base: SymbolId,
    pub distinct: bool,
}

impl TypeId {
    pub fn compatible(&self, other: &TypeId) -> bool {
        self == other || (!self.distinct && !other.distinct && self.base == other.base)
    }
}

/// A pure syntactic term, as stored in the knowledge base.
///
/// `Term` carries no binding state of its own: a `Var` is just an id, and
/// asking whether it is bound requires an `Environment` (see
/// `loom-engine`). This separation is what lets the knowledge base hold
/// rule heads and bodies independent of any particular query's variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Atom(SymbolId),
    Var(VarId),
    Integer(i64),
    Compound {
        functor: SymbolId,
        args: Vec<Term>,
    },
    /// A non-consuming wrapper: matching `Clone(t)` against a linear
    /// resource does not mark that resource consumed.
    Clone(Box<Term>),
}

impl Term {
    pub fn compound(functor: SymbolId, args: Vec<Term>) -> Term {
        Term::Compound { functor, args }
    }

    /// Strips any `Clone` wrapper, returning the inner term and whether a
    /// wrapper was present.
    pub fn strip_clone(&self) -> (&Term, bool) {
        match self {
            Term::Clone(inner) => (inner, true),
            other => (other, false),
        }
    }

    /// Every `Var` occurring anywhere in the term, including nested
    /// compounds. Used by the occurs check and by rule-body variable
    /// scoping.
    pub fn variables(&self, out: &mut Vec<VarId>) {
        match self {
            Term::Var(v) => out.push(*v),
            Term::Compound { args, .. } => {
                for a in args {
                    a.variables(out);
                }
            }
            Term::Clone(inner) => inner.variables(out),
            Term::Atom(_) | Term::Integer(_) => {}
        }
    }

    pub fn display<'a>(&'a self, table: &'a SymbolTable) -> TermDisplay<'a> {
        TermDisplay { term: self, table }
    }
}

/// Borrowed pair used to `Display` a term against the table it was
/// interned in; `Term` itself carries no symbol strings.
pub struct TermDisplay<'a> {
    term: &'a Term,
    table: &'a SymbolTable,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_term(self.term, self.table, f)
    }
}

fn fmt_term(term: &Term, table: &SymbolTable, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match term {
        Term::Atom(id) => write!(f, "{}", table.resolve(*id)),
        Term::Var(id) => write!(f, "${:?}", id),
        Term::Integer(n) => write!(f, "{}", n),
        Term::Compound { functor, args } => {
            write!(f, "{}(", table.resolve(*functor))?;
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_term(a, table, f)?;
            }
            write!(f, ")")
        }
        Term::Clone(inner) => {
            write!(f, "~")?;
            fmt_term(inner, table, f)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let mut table = SymbolTable::new();
        let parent = table.intern("parent");
        let alice = table.intern("alice");
        let bob = table.intern("bob");
        let t = Term::compound(parent, vec![Term::Atom(alice), Term::Atom(bob)]);
        assert_eq!(format!("{}", t.display(&table)), "parent(alice, bob)");
    }

    #[test]
    fn variables_collects_nested_occurrences() {
        let mut table = SymbolTable::new();
        let f = table.intern("f");
        let t = Term::compound(
            f,
            vec![Term::Var(VarId::from_raw(0)), Term::Clone(Box::new(Term::Var(VarId::from_raw(1))))],
        );
        let mut vars = Vec::new();
        t.variables(&mut vars);
        assert_eq!(vars, vec![VarId::from_raw(0), VarId::from_raw(1)]);
    }
}
