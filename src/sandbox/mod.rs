//! The sandboxed scripting context templates execute fragments in.
//!
//! This is a small hand-rolled interpreter for a fixed expression/command DSL: a lexer
//! (`lexer`), a recursive-descent parser (`parser`), and this module's tree-walking
//! evaluator plus host-function dispatch table. It never touches host stdio; the only
//! observable effects are through the bound `ResponseState`.

pub mod lexer;
pub mod parser;
pub mod value;

use std::path::PathBuf;

use bytes::Bytes;

use crate::error::SandboxError;
use crate::html;
use crate::response::ResponseState;
use parser::{BinOp, Expr, UnOp};
pub use parser::is_complete;
pub use value::Value;

/// One script execution context, bound to a single request's `params`/`headers`/`body`
/// and response buffer. Created fresh per request by the worker.
pub struct Sandbox<'a> {
    params: Value,
    headers: Value,
    body: Value,
    response: &'a mut ResponseState,
    /// The parent directory of the resolved template; recorded per the sandbox contract
    /// for any path-relative host function a future extension might add.
    #[allow(dead_code)]
    script_dir: PathBuf,
    last_error: Option<String>,
    pending_write: Option<Bytes>,
}

impl<'a> Sandbox<'a> {
    pub fn new(
        params: Value,
        headers: Value,
        body: Value,
        response: &'a mut ResponseState,
        script_dir: PathBuf,
    ) -> Sandbox<'a> {
        Sandbox {
            params,
            headers,
            body,
            response,
            script_dir,
            last_error: None,
            pending_write: None,
        }
    }

    /// Returns and clears wire bytes produced by a `flush()`/`die()` call during the most
    /// recent `run_fragment`, for the caller to actually write to the socket.
    pub fn take_pending_write(&mut self) -> Option<Bytes> {
        self.pending_write.take()
    }

    pub fn should_terminate(&self) -> bool {
        self.response.should_terminate()
    }

    /// Finalizes the response if no explicit `flush()`/`die()` call already did, for the
    /// worker to pick up once template execution ends naturally. Idempotent like
    /// `ResponseState::finalize`.
    pub fn finalize(&mut self) -> Option<Bytes> {
        self.response.finalize()
    }

    /// Appends literal template HTML straight to the response body, bypassing the DSL.
    /// Used by the template FSM for the HTML segments between `<? ?>` blocks.
    pub fn emit_html(&mut self, text: &str) {
        self.response.puts(text.as_bytes());
    }

    /// Executes one script fragment's full source. Never returns an error: a syntax error
    /// or a runtime error both route through the same `die` pathway a template-level
    /// `die()` call would take, per the sandbox contract.
    pub fn run_fragment(&mut self, source: &str) {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return;
        }

        if let Some(rest) = bare_at_rest(trimmed) {
            let rewritten = format!("@({})", rest);
            self.run_parsed(&rewritten);
            return;
        }
        if let Some(rest) = bare_xml_rest(trimmed) {
            let args: Vec<Value> = rest
                .split_whitespace()
                .map(|tok| Value::Str(strip_quotes(tok).to_string()))
                .collect();
            if let Err(e) = self.dispatch("xml", args) {
                self.fail(&e.to_string());
            }
            return;
        }
        self.run_parsed(source);
    }

    fn run_parsed(&mut self, source: &str) {
        let program = match parser::parse_program(source) {
            Ok(p) => p,
            Err(e) => {
                self.fail(&e);
                return;
            }
        };
        for stmt in &program {
            match self.eval(stmt) {
                Ok(_) => {}
                Err(e) => {
                    self.fail(&e.to_string());
                    return;
                }
            }
            if self.response.should_terminate() {
                return;
            }
        }
    }

    /// Records `msg` as the last runtime error and routes it through `die`.
    fn fail(&mut self, msg: &str) {
        self.last_error = Some(msg.to_string());
        self.die_with(msg);
    }

    fn die_with(&mut self, msg: &str) {
        self.response.set_error_page("500 Internal server error", msg);
        self.response.set_terminate();
        if let Some(bytes) = self.response.finalize() {
            self.pending_write = Some(bytes);
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, SandboxError> {
        match name {
            "params" => Ok(self.params.clone()),
            "headers" => Ok(self.headers.clone()),
            "body" => Ok(self.body.clone()),
            other => Err(SandboxError::UndefinedName(other.to_string())),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => {
                let values = items.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Ident(name) => self.lookup(name),
            Expr::Field(base, name) => {
                let base_val = self.eval(base)?;
                base_val
                    .get_field(name)
                    .cloned()
                    .ok_or_else(|| SandboxError::UndefinedName(name.clone()))
            }
            Expr::Index(base, idx) => {
                let base_val = self.eval(base)?;
                let idx_val = self.eval(idx)?;
                base_val
                    .get_index(&idx_val)
                    .cloned()
                    .ok_or_else(|| SandboxError::Type("index out of range or not indexable".to_string()))
            }
            Expr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!v.is_truthy())),
                    UnOp::Neg => match v {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        _ => Err(SandboxError::Type("'-' requires an integer".to_string())),
                    },
                }
            }
            Expr::Binary(BinOp::And, left, right) => {
                let l = self.eval(left)?;
                if !l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(BinOp::Or, left, right) => {
                let l = self.eval(left)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                eval_binary(*op, l, r)
            }
            Expr::Call(callee, args) => {
                let name = callee_name(callee)?;
                let values = args.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>, _>>()?;
                self.dispatch(&name, values)
            }
        }
    }

    fn dispatch(&mut self, name: &str, args: Vec<Value>) -> Result<Value, SandboxError> {
        if let Some(tag) = name.strip_prefix("html.") {
            return self.call_html_tag(tag, args);
        }
        match name {
            "puts" => {
                arity(name, &args, 1, 1)?;
                self.response.puts(args[0].to_display_string().as_bytes());
                Ok(Value::Nil)
            }
            "header" => {
                arity(name, &args, 2, 3)?;
                let key = args[0].to_display_string();
                let value = args[1].to_display_string();
                let replace = args.get(2).map(|v| v.is_truthy()).unwrap_or(true);
                self.response.set_header(&key, &value, replace);
                Ok(Value::Nil)
            }
            "flush" => {
                arity(name, &args, 0, 0)?;
                if let Some(bytes) = self.response.finalize() {
                    self.pending_write = Some(bytes);
                }
                Ok(Value::Nil)
            }
            "die" | "error" => {
                arity(name, &args, 0, 1)?;
                let msg = match args.first() {
                    Some(v) if !v.to_display_string().is_empty() => v.to_display_string(),
                    _ => self.last_error.clone().unwrap_or_default(),
                };
                self.die_with(&msg);
                Ok(Value::Nil)
            }
            "exit" => {
                arity(name, &args, 0, 0)?;
                self.response.set_terminate();
                Ok(Value::Nil)
            }
            "xml" => {
                let joined = args
                    .iter()
                    .map(|v| v.to_display_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.response
                    .puts(format!("<?xml {}?>", joined).as_bytes());
                Ok(Value::Nil)
            }
            other => Err(SandboxError::UndefinedName(other.to_string())),
        }
    }

    fn call_html_tag(&mut self, tag: &str, args: Vec<Value>) -> Result<Value, SandboxError> {
        if !html::is_known_tag(tag) {
            return Err(SandboxError::UndefinedName(format!("html.{}", tag)));
        }
        arity(&format!("html.{}", tag), &args, 0, 2)?;
        let attrs = match args.first() {
            Some(Value::List(items)) => flatten_attrs(items)?,
            Some(Value::Nil) | None => Vec::new(),
            Some(_) => return Err(SandboxError::Type(format!("html.{} attrs must be a list", tag))),
        };
        let children = match args.get(1) {
            Some(Value::List(items)) => items.iter().map(|v| v.to_display_string()).collect(),
            Some(Value::Nil) | None => Vec::new(),
            Some(_) => return Err(SandboxError::Type(format!("html.{} children must be a list", tag))),
        };
        Ok(Value::Str(html::render_tag(tag, &attrs, &children)))
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value, SandboxError> {
    match op {
        BinOp::Add => match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            _ => Ok(Value::Str(format!("{}{}", l.to_display_string(), r.to_display_string()))),
        },
        BinOp::Sub => int_op(l, r, "-", |a, b| a - b),
        BinOp::Mul => int_op(l, r, "*", |a, b| a * b),
        BinOp::Div => match (&l, &r) {
            (Value::Int(_), Value::Int(0)) => Err(SandboxError::Type("division by zero".to_string())),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
            _ => Err(SandboxError::Type("'/' requires two integers".to_string())),
        },
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::NotEq => Ok(Value::Bool(l != r)),
        BinOp::Lt => cmp_op(l, r, |a, b| a < b),
        BinOp::LtEq => cmp_op(l, r, |a, b| a <= b),
        BinOp::Gt => cmp_op(l, r, |a, b| a > b),
        BinOp::GtEq => cmp_op(l, r, |a, b| a >= b),
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators are handled in eval()"),
    }
}

fn int_op(l: Value, r: Value, op: &str, f: impl Fn(i64, i64) -> i64) -> Result<Value, SandboxError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(f(a, b))),
        _ => Err(SandboxError::Type(format!("'{}' requires two integers", op))),
    }
}

fn cmp_op(l: Value, r: Value, f: impl Fn(i64, i64) -> bool) -> Result<Value, SandboxError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(f(a, b))),
        _ => Err(SandboxError::Type("comparison requires two integers".to_string())),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), SandboxError> {
    if args.len() < min || args.len() > max {
        Err(SandboxError::Arity(name.to_string()))
    } else {
        Ok(())
    }
}

fn flatten_attrs(items: &[Value]) -> Result<Vec<(String, String)>, SandboxError> {
    if items.len() % 2 != 0 {
        return Err(SandboxError::Arity("html.<tag> attrs".to_string()));
    }
    Ok(items
        .chunks(2)
        .map(|pair| (pair[0].to_display_string(), pair[1].to_display_string()))
        .collect())
}

fn callee_name(expr: &Expr) -> Result<String, SandboxError> {
    match expr {
        Expr::Ident(name) => Ok(name.clone()),
        Expr::Field(base, name) => Ok(format!("{}.{}", callee_name(base)?, name)),
        other => Err(SandboxError::Type(format!("{:?} is not callable", other))),
    }
}

/// Matches `@ expr` (bare command form): a leading `@` not immediately followed by `(`.
fn bare_at_rest(s: &str) -> Option<&str> {
    let rest = s.strip_prefix('@')?;
    if rest.starts_with('(') {
        None
    } else {
        Some(rest)
    }
}

/// Matches `xml ...` (bare command form): a leading `xml` token followed by whitespace,
/// not `xml(`.
fn bare_xml_rest(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("xml")?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn strip_quotes(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox<'a>(response: &'a mut ResponseState) -> Sandbox<'a> {
        Sandbox::new(
            Value::Map(vec![("name".to_string(), Value::Str("alice".to_string()))]),
            Value::Map(vec![]),
            Value::Str(String::new()),
            response,
            PathBuf::from("/tmp"),
        )
    }

    #[test]
    fn puts_appends_to_body() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment(r#"puts("hello")"#);
        let wire = resp.finalize().unwrap();
        assert!(String::from_utf8(wire.to_vec()).unwrap().ends_with("\n\nhello"));
    }

    #[test]
    fn at_alias_call_form() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment(r#"@("hi")"#);
        let wire = resp.finalize().unwrap();
        assert!(String::from_utf8(wire.to_vec()).unwrap().ends_with("\n\nhi"));
    }

    #[test]
    fn at_bare_command_form() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment(r#"@ "hi""#);
        let wire = resp.finalize().unwrap();
        assert!(String::from_utf8(wire.to_vec()).unwrap().ends_with("\n\nhi"));
    }

    #[test]
    fn params_lookup_via_field_access() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment("puts(params.name)");
        let wire = resp.finalize().unwrap();
        assert!(String::from_utf8(wire.to_vec()).unwrap().ends_with("\n\nalice"));
    }

    #[test]
    fn die_produces_500_with_pre_body() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment(r#"error("oops")"#);
        assert!(sb.should_terminate());
        let wire = sb.take_pending_write().unwrap();
        let text = String::from_utf8(wire.to_vec()).unwrap();
        assert!(text.starts_with("Status: 500 Internal server error\n"));
        assert!(text.contains("<pre>oops</pre>"));
    }

    #[test]
    fn undefined_name_routes_through_die() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment("puts(nonexistent)");
        assert!(sb.should_terminate());
        let wire = sb.take_pending_write().unwrap();
        assert!(String::from_utf8(wire.to_vec()).unwrap().contains("nonexistent"));
    }

    #[test]
    fn html_tag_renders_attrs_and_children() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment(r#"puts(html.a(["href", "/x"], ["click"]))"#);
        let wire = resp.finalize().unwrap();
        assert!(String::from_utf8(wire.to_vec()).unwrap().contains("<a href='/x'>click</a>"));
    }

    #[test]
    fn exit_sets_termination_without_error_page() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment("exit()");
        assert!(sb.should_terminate());
        assert!(sb.take_pending_write().is_none());
    }

    #[test]
    fn xml_bare_command_emits_prolog() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment(r#"xml version="1.0" encoding="UTF-8""#);
        let wire = resp.finalize().unwrap();
        let text = String::from_utf8(wire.to_vec()).unwrap();
        assert!(text.contains("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    }

    #[test]
    fn arithmetic_and_comparison() {
        let mut resp = ResponseState::new();
        let mut sb = sandbox(&mut resp);
        sb.run_fragment(r#"puts(1 + 2 * 3)"#);
        let wire = resp.finalize().unwrap();
        assert!(String::from_utf8(wire.to_vec()).unwrap().ends_with("\n\n7"));
    }
}
