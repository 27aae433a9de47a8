//! SMT-LIB2 solver processes (`z3 -in`, `cvc5 --incremental`).
//!
//! Commands are written to the child's stdin with `:print-success` off, so
//! only queries produce output. Replies are read as whole S-expressions,
//! which may span several lines for long core or model listings.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;
use tracing::{debug, trace};

use crate::backends::smtlib_printer::{symbol, Smtlib};
use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum SmtLibError {
    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("solver not found: {0}")]
    NotFound(String),
    #[error("solver error: {0}")]
    SolverError(String),
    #[error("malformed solver reply to `{command}`: {reply}")]
    Malformed { command: String, reply: String },
    #[error("uninstantiated pre({0}) reached the backend")]
    UninstantiatedPre(String),
    #[error("assumption `{0}` is not a declared Bool constant")]
    BadAssumption(String),
}

/// One solver reply.
#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    fn parse(text: &str) -> Option<Sexp> {
        let mut tokens = tokenize(text).into_iter().peekable();
        let sexp = Self::parse_tokens(&mut tokens)?;
        tokens.next().is_none().then_some(sexp)
    }

    fn parse_tokens(tokens: &mut std::iter::Peekable<std::vec::IntoIter<Token>>) -> Option<Sexp> {
        match tokens.next()? {
            Token::Open => {
                let mut items = Vec::new();
                while tokens.peek() != Some(&Token::Close) {
                    items.push(Self::parse_tokens(tokens)?);
                }
                tokens.next();
                Some(Sexp::List(items))
            }
            Token::Close => None,
            Token::Atom(atom) => Some(Sexp::Atom(atom)),
        }
    }

    fn atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(atom) => Some(atom),
            Sexp::List(_) => None,
        }
    }

    fn to_int(&self) -> Option<i64> {
        match self {
            Sexp::Atom(atom) => atom.parse().ok(),
            Sexp::List(items) => match items.as_slice() {
                [Sexp::Atom(minus), arg] if minus == "-" => arg.to_int().map(|n| -n),
                _ => None,
            },
        }
    }

    fn to_value(&self, sort: SmtSort) -> Option<ModelValue> {
        match sort {
            SmtSort::Int => self.to_int().map(ModelValue::Int),
            SmtSort::Bool => match self.atom()? {
                "true" => Some(ModelValue::Bool(true)),
                "false" => Some(ModelValue::Bool(false)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Atom(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '|' => {
                let quoted: String = chars.by_ref().take_while(|&c| c != '|').collect();
                tokens.push(Token::Atom(quoted));
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    tokens
}

/// Net parenthesis depth of `line`, ignoring quoted symbols.
fn depth_change(line: &str) -> i64 {
    let mut quoted = false;
    let mut depth = 0;
    for c in line.chars() {
        match c {
            '|' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Incremental SMT-LIB2 solver driven over a child process's stdin/stdout.
pub struct SmtLibProcessSolver {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: ChildStderr,
    vars: HashMap<String, SmtSort>,
    last_assumptions: Vec<String>,
}

impl SmtLibProcessSolver {
    /// `z3 -in`, reading SMT-LIB2 from stdin.
    pub fn z3(timeout_secs: u64) -> Result<Self, SmtLibError> {
        let mut args = vec!["-in".to_string(), "-smt2".to_string()];
        if timeout_secs > 0 {
            args.push(format!("-t:{}", timeout_secs.saturating_mul(1000)));
        }
        Self::spawn("z3", &args)
    }

    /// `cvc5` in incremental mode.
    pub fn cvc5(timeout_secs: u64) -> Result<Self, SmtLibError> {
        let mut args: Vec<String> = ["--lang", "smt2", "--incremental", "--produce-models"]
            .map(String::from)
            .into();
        if timeout_secs > 0 {
            args.push(format!("--tlimit-per={}", timeout_secs.saturating_mul(1000)));
        }
        Self::spawn("cvc5", &args)
    }

    /// Any SMT-LIB2 solver that reads commands from stdin.
    pub fn spawn(cmd: &str, args: &[String]) -> Result<Self, SmtLibError> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SmtLibError::NotFound(format!("{cmd}: {e}")))?;

        let missing = |stream: &str| SmtLibError::SolverError(format!("failed to capture solver {stream}"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
        debug!(cmd, ?args, "spawned solver process");

        let mut solver = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr,
            vars: HashMap::new(),
            last_assumptions: Vec::new(),
        };
        solver.preamble()?;
        Ok(solver)
    }

    fn preamble(&mut self) -> Result<(), SmtLibError> {
        for option in [
            "(set-option :print-success false)",
            "(set-option :produce-models true)",
            "(set-option :produce-unsat-assumptions true)",
            "(set-logic QF_LIA)",
        ] {
            self.command(option)?;
        }
        Ok(())
    }

    fn command(&mut self, cmd: &str) -> Result<(), SmtLibError> {
        trace!(cmd, "smt-lib command");
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Send `cmd` and read one complete reply.
    fn query(&mut self, cmd: &str) -> Result<String, SmtLibError> {
        self.command(cmd)?;
        let mut reply = String::new();
        let mut depth = 0;
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                let mut stderr = String::new();
                let _ = self.stderr.read_to_string(&mut stderr);
                return Err(SmtLibError::SolverError(format!(
                    "solver exited while answering `{cmd}`: {}",
                    stderr.trim()
                )));
            }
            depth += depth_change(&line);
            reply.push_str(&line);
            if depth <= 0 && !reply.trim().is_empty() {
                break;
            }
        }
        let reply = reply.trim().to_string();
        trace!(cmd, reply = %reply, "smt-lib reply");
        if reply.starts_with("(error") {
            return Err(SmtLibError::SolverError(reply));
        }
        Ok(reply)
    }

    fn check(&mut self, cmd: &str) -> Result<SatResult, SmtLibError> {
        let reply = self.query(cmd)?;
        match reply.as_str() {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => {
                let reason = self
                    .query("(get-info :reason-unknown)")
                    .unwrap_or_else(|_| "solver returned unknown".into());
                Ok(SatResult::Unknown(reason))
            }
            _ => Err(SmtLibError::Malformed {
                command: cmd.to_string(),
                reply,
            }),
        }
    }
}

impl Drop for SmtLibProcessSolver {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

impl SmtSolver for SmtLibProcessSolver {
    type Error = SmtLibError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), SmtLibError> {
        self.command(&format!("(declare-const {} {sort})", symbol(name)))?;
        self.vars.insert(name.to_string(), *sort);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), SmtLibError> {
        let mut pre = None;
        term.walk(&mut |t| {
            if let SmtTerm::Pre(name) = t {
                pre.get_or_insert_with(|| name.clone());
            }
        });
        if let Some(name) = pre {
            return Err(SmtLibError::UninstantiatedPre(name));
        }
        self.command(&format!("(assert {})", Smtlib(term)))
    }

    fn push(&mut self) -> Result<(), SmtLibError> {
        self.command("(push 1)")
    }

    fn pop(&mut self) -> Result<(), SmtLibError> {
        self.command("(pop 1)")
    }

    fn check_sat(&mut self) -> Result<SatResult, SmtLibError> {
        self.last_assumptions.clear();
        self.check("(check-sat)")
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, SmtLibError> {
        if let Some(bad) = assumptions
            .iter()
            .find(|name| self.vars.get(name.as_str()) != Some(&SmtSort::Bool))
        {
            return Err(SmtLibError::BadAssumption(bad.clone()));
        }
        self.last_assumptions = assumptions.to_vec();
        let literals: Vec<String> = assumptions.iter().map(|a| symbol(a)).collect();
        self.check(&format!("(check-sat-assuming ({}))", literals.join(" ")))
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, SmtLibError> {
        const CMD: &str = "(get-unsat-assumptions)";
        let reply = self.query(CMD)?;
        let Some(Sexp::List(items)) = Sexp::parse(&reply) else {
            return Err(SmtLibError::Malformed {
                command: CMD.into(),
                reply,
            });
        };
        Ok(items
            .iter()
            .filter_map(Sexp::atom)
            .filter(|name| self.last_assumptions.iter().any(|a| a.as_str() == *name))
            .map(str::to_string)
            .collect())
    }

    fn get_model(&mut self, var_names: &[(&str, SmtSort)]) -> Result<Model, SmtLibError> {
        let known: Vec<(&str, SmtSort)> = var_names
            .iter()
            .copied()
            .filter(|(name, _)| self.vars.contains_key(*name))
            .collect();
        if known.is_empty() {
            return Ok(Model::default());
        }
        let names: Vec<String> = known.iter().map(|(name, _)| symbol(name)).collect();
        let cmd = format!("(get-value ({}))", names.join(" "));
        let reply = self.query(&cmd)?;
        parse_values(&reply, &known).ok_or(SmtLibError::Malformed { command: cmd, reply })
    }

    fn reset(&mut self) -> Result<(), SmtLibError> {
        self.command("(reset)")?;
        self.preamble()?;
        self.vars.clear();
        self.last_assumptions.clear();
        Ok(())
    }
}

/// Parse a `get-value` reply `((name value) ...)` for the requested
/// variables. Values of the wrong sort are left out.
fn parse_values(reply: &str, vars: &[(&str, SmtSort)]) -> Option<Model> {
    let Sexp::List(pairs) = Sexp::parse(reply)? else {
        return None;
    };
    let sorts: HashMap<&str, SmtSort> = vars.iter().copied().collect();
    let mut model = Model::default();
    for pair in &pairs {
        let Sexp::List(binding) = pair else {
            return None;
        };
        let [name, value] = binding.as_slice() else {
            return None;
        };
        let name = name.atom()?;
        if let Some(value) = sorts.get(name).and_then(|sort| value.to_value(*sort)) {
            model.values.insert(name.to_string(), value);
        }
    }
    Some(model)
}
