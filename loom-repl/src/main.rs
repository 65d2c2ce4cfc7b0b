#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate failure;

mod parser;

use docopt::Docopt;
use failure::Fallible;
use loom_ir::{SymbolTable, Term, Value, ValueKind, VarId};
use loom_runtime::{init_runtime, Runtime, RuntimeConfig};
use rustyline::error::ReadlineError;

const USAGE: &str = "
loomi

Usage:
  loomi [options]
  loomi (-h | --help)

Options:
  --help                 Show this screen.
  --max-depth=N          Overrides the resolver's recursion depth [default: 512].
  --strict-linearity     Treat consuming an already-consumed resource as an error.
";

#[derive(Debug, Deserialize)]
struct Args {
    flag_max_depth: usize,
    flag_strict_linearity: bool,
}

fn run() -> Fallible<()> {
    let args: &Args = &Docopt::new(USAGE).and_then(|d| d.deserialize()).unwrap_or_else(|e| e.exit());

    let config = RuntimeConfig::default()
        .with_max_recursion_depth(args.flag_max_depth)
        .with_strict_linearity(args.flag_strict_linearity);
    let mut runtime = init_runtime(config);

    readline_loop(&mut rustyline::Editor::<()>::new(), "?- ", |line| {
        if let Err(e) = process(&mut runtime, line) {
            eprintln!("error: {}", e);
        }
    })
}

/// Reads lines until EOF, handing each non-empty one to `f`.
fn readline_loop<F>(rl: &mut rustyline::Editor<()>, prompt: &str, mut f: F) -> Fallible<()>
where
    F: FnMut(&str),
{
    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                rl.add_history_entry(&line);
                let line = line.trim();
                if !line.is_empty() {
                    f(line);
                }
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => Err(e)?,
        }
    }
    Ok(())
}

fn process(runtime: &mut Runtime, line: &str) -> Fallible<()> {
    let line = line.trim_end_matches('.');
    if line == "help" || line == "h" {
        help();
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("fact ") {
        let term = parse_one(runtime, rest)?;
        runtime.add_persistent_fact(term);
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("linear ") {
        let term = parse_one(runtime, rest)?;
        runtime.add_linear_fact(term);
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("rule ") {
        add_rule_line(runtime, rest)?;
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("?-") {
        query_line(runtime, rest.trim())?;
        return Ok(());
    }

    Err(format_err!("unrecognized command; type 'help' to see available commands"))
}

fn parse_one(runtime: &mut Runtime, text: &str) -> Fallible<Term> {
    let mut ctx = parser::ParseContext::new(&mut runtime.table, &runtime.env);
    parser::parse_term(&mut ctx, text)
}

/// `rule HEAD :- BODY1, BODY2 => PRODUCTION` where the `=> PRODUCTION`
/// suffix is optional. `is_recursive` is inferred: true when the head's
/// functor also names one of the body goals.
fn add_rule_line(runtime: &mut Runtime, rest: &str) -> Fallible<()> {
    let (clause, production_text) = match rest.find("=>") {
        Some(idx) => (&rest[..idx], Some(rest[idx + 2..].trim())),
        None => (rest, None),
    };
    let sep = clause.find(":-").ok_or_else(|| format_err!("rule is missing ':-'"))?;
    let head_text = clause[..sep].trim();
    let body_text = clause[sep + 2..].trim();

    let mut ctx = parser::ParseContext::new(&mut runtime.table, &runtime.env);
    let head = parser::parse_term(&mut ctx, head_text)?;
    let body = parser::parse_term_list(&mut ctx, body_text)?;
    let production = production_text.map(|t| parser::parse_term(&mut ctx, t)).transpose()?;

    let head_functor = match &head {
        Term::Compound { functor, .. } | Term::Atom(functor) => Some(*functor),
        _ => None,
    };
    let is_recursive = head_functor
        .map(|f| body.iter().any(|g| matches!(g, Term::Compound { functor, .. } if *functor == f)))
        .unwrap_or(false);

    runtime.add_rule(head, body, production, is_recursive);
    Ok(())
}

fn query_line(runtime: &mut Runtime, text: &str) -> Fallible<()> {
    let mut ctx = parser::ParseContext::new(&mut runtime.table, &runtime.env);
    let goals = parser::parse_term_list(&mut ctx, text)?;
    let interesting = ctx.variables();
    let solutions = runtime.resolve_conjunction(&goals, &interesting);

    if solutions.solutions.is_empty() {
        println!("false.");
        return Ok(());
    }
    for solution in &solutions.solutions {
        if solution.bindings.is_empty() {
            println!("true.");
            continue;
        }
        let rendered: Vec<String> = solution
            .bindings
            .iter()
            .map(|(var, value)| format!("_{} = {}", var_index(*var), format_value(value, &runtime.table)))
            .collect();
        println!("{}", rendered.join(", "));
    }
    Ok(())
}

fn var_index(var: VarId) -> usize {
    // `VarId` carries no public accessor beyond equality and `from_raw`;
    // this mirrors it back out only for display purposes.
    format!("{:?}", var).trim_start_matches('_').parse().unwrap_or(0)
}

fn format_value(value: &Value, table: &SymbolTable) -> String {
    match &value.kind {
        ValueKind::Integer(n) => n.to_string(),
        ValueKind::Float(f) => f.to_string(),
        ValueKind::String(s) => format!("{:?}", s),
        ValueKind::Atom(id) => table.resolve(*id).to_string(),
        ValueKind::LogicalVar(id) => format!("_{}", var_index(*id)),
        ValueKind::List(list) => {
            let items: Vec<String> = list.elements.iter().map(|v| format_value(v, table)).collect();
            format!("[{}]", items.join(", "))
        }
        ValueKind::Record(fields) => {
            let items: Vec<String> =
                fields.iter().map(|(name, v)| format!("{}: {}", table.resolve(*name), format_value(v, table))).collect();
            format!("{{{}}}", items.join(", "))
        }
        ValueKind::Compound { functor, args, .. } => {
            let items: Vec<String> = args.iter().map(|v| format_value(v, table)).collect();
            format!("{}({})", table.resolve(*functor), items.join(", "))
        }
        ValueKind::Function(f) | ValueKind::PartialApp(f) => format!("<function {}>", table.resolve(f.name)),
        ValueKind::Suspension(id) => format!("<suspension {:?}>", id),
    }
}

fn help() {
    println!("Commands:");
    println!("  help                      print this output");
    println!("  fact NAME(args).          assert a persistent fact");
    println!("  linear NAME(args).        assert a linear (consumable) fact");
    println!("  rule H :- B1, B2 => P.    assert a rule, with an optional production");
    println!("  ?- G1, G2.                resolve a conjunctive goal");
    println!("Uppercase-leading names are variables, shared by spelling within one line.");
}

fn main() {
    use std::io::Write;
    std::process::exit(match run() {
        Ok(_) => 0,
        Err(ref e) => {
            write!(&mut std::io::stderr(), "{}", e).expect("failed to write to stderr");
            1
        }
    });
}
