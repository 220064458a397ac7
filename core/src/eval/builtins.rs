// Built-in function registry: arithmetic, boolean logic, comparisons, and
// the string/collection utilities templates can call by name.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::EvalErrorKind;

use super::value::Value;

pub(crate) type BuiltinFn = fn(&[Value]) -> Result<Value, EvalErrorKind>;

/// Look up a built-in by the name templates use for it. Operators dispatch
/// through here as well, so `+` and `upper` resolve the same way.
pub(crate) fn lookup(name: &str) -> Option<BuiltinFn> {
    static TABLE: OnceLock<HashMap<&'static str, BuiltinFn>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            let mut table: HashMap<&'static str, BuiltinFn> = HashMap::new();
            table.insert("+", add);
            table.insert("-", subtract);
            table.insert("*", multiply);
            table.insert("/", divide);
            table.insert("%", modulo);
            table.insert("&&", and);
            table.insert("and", and);
            table.insert("||", or);
            table.insert("or", or);
            table.insert("==", eq);
            table.insert("!=", ne);
            table.insert("<", lt);
            table.insert("<=", le);
            table.insert(">", gt);
            table.insert(">=", ge);
            table.insert("not", not);
            table.insert("!", not);
            table.insert("len", len);
            table.insert("upper", upper);
            table.insert("lower", lower);
            table.insert("format", format_fn);
            table.insert("isnull", isnull);
            table.insert("ifnull", ifnull);
            table.insert("json", json);
            table.insert("explodeAttributes", explode_attributes);
            table.insert("escapeHtml", escape_html);
            table
        })
        .get(name)
        .copied()
}

fn need(name: &str, args: &[Value], want: usize) -> Result<(), EvalErrorKind> {
    if args.len() != want {
        return Err(EvalErrorKind::Arity {
            name: name.to_string(),
            want,
            got: args.len(),
        });
    }
    Ok(())
}

fn need_at_least(name: &str, args: &[Value], want: usize) -> Result<(), EvalErrorKind> {
    if args.len() < want {
        return Err(EvalErrorKind::Arity {
            name: name.to_string(),
            want,
            got: args.len(),
        });
    }
    Ok(())
}

/// `+` concatenates string forms when any operand is a string, and sums
/// numerically otherwise.
fn add(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need_at_least("+", args, 1)?;
    if args.iter().any(|a| matches!(a, Value::String(_))) {
        let mut out = String::new();
        for arg in args {
            out.push_str(&arg.to_string());
        }
        return Ok(Value::String(out));
    }
    let mut sum = args[0].as_number()?;
    for arg in &args[1..] {
        sum += arg.as_number()?;
    }
    Ok(Value::Number(sum))
}

fn numeric_fold(
    name: &str,
    args: &[Value],
    op: fn(f64, f64) -> f64,
) -> Result<Value, EvalErrorKind> {
    need_at_least(name, args, 1)?;
    let mut acc = args[0].as_number()?;
    for arg in &args[1..] {
        acc = op(acc, arg.as_number()?);
    }
    Ok(Value::Number(acc))
}

fn subtract(args: &[Value]) -> Result<Value, EvalErrorKind> {
    numeric_fold("-", args, |a, b| a - b)
}

fn multiply(args: &[Value]) -> Result<Value, EvalErrorKind> {
    numeric_fold("*", args, |a, b| a * b)
}

fn divide(args: &[Value]) -> Result<Value, EvalErrorKind> {
    numeric_fold("/", args, |a, b| a / b)
}

fn modulo(args: &[Value]) -> Result<Value, EvalErrorKind> {
    numeric_fold("%", args, |a, b| a % b)
}

fn and(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need_at_least("and", args, 1)?;
    Ok(Value::Bool(args.iter().all(Value::is_truthy)))
}

fn or(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need_at_least("or", args, 1)?;
    Ok(Value::Bool(args.iter().any(Value::is_truthy)))
}

/// `==` is true when the first argument equals any of the rest.
fn eq(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need_at_least("==", args, 2)?;
    for other in &args[1..] {
        if args[0].equals(other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn ne(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("!=", args, 2)?;
    Ok(Value::Bool(!args[0].equals(&args[1])?))
}

fn lt(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("<", args, 2)?;
    Ok(Value::Bool(args[0].compare(&args[1])?.is_lt()))
}

fn le(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("<=", args, 2)?;
    Ok(Value::Bool(args[0].compare(&args[1])?.is_le()))
}

fn gt(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need(">", args, 2)?;
    Ok(Value::Bool(args[0].compare(&args[1])?.is_gt()))
}

fn ge(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need(">=", args, 2)?;
    Ok(Value::Bool(args[0].compare(&args[1])?.is_ge()))
}

fn not(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("not", args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

fn len(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("len", args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(m) => m.len(),
        other => {
            return Err(EvalErrorKind::Type(format!(
                "len: expecting a string, list or map, found {}",
                other.kind_name()
            )))
        }
    };
    Ok(Value::Number(n as f64))
}

fn upper(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("upper", args, 1)?;
    Ok(Value::String(args[0].to_string().to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("lower", args, 1)?;
    Ok(Value::String(args[0].to_string().to_lowercase()))
}

/// Minimal directive formatter: `%s` and `%v` take the string form, `%d`
/// truncates to an integer, `%f` prints six decimals, `%%` is a literal.
fn format_fn(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need_at_least("format", args, 1)?;
    let pattern = args[0].to_string();
    let mut rest = args[1..].iter();
    let mut out = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') | Some('v') => match rest.next() {
                Some(arg) => out.push_str(&arg.to_string()),
                None => {
                    return Err(EvalErrorKind::Type(
                        "format: not enough arguments".to_string(),
                    ))
                }
            },
            Some('d') => match rest.next() {
                Some(arg) => out.push_str(&format!("{}", arg.as_number()? as i64)),
                None => {
                    return Err(EvalErrorKind::Type(
                        "format: not enough arguments".to_string(),
                    ))
                }
            },
            Some('f') => match rest.next() {
                Some(arg) => out.push_str(&format!("{:.6}", arg.as_number()?)),
                None => {
                    return Err(EvalErrorKind::Type(
                        "format: not enough arguments".to_string(),
                    ))
                }
            },
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(Value::String(out))
}

fn isnull(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("isnull", args, 1)?;
    Ok(Value::Bool(args[0].is_null()))
}

fn ifnull(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("ifnull", args, 2)?;
    if args[0].is_null() {
        Ok(args[1].clone())
    } else {
        Ok(args[0].clone())
    }
}

fn json(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("json", args, 1)?;
    let text = serde_json::to_string(&args[0].to_json())
        .unwrap_or_else(|err| err.to_string());
    Ok(Value::String(text))
}

/// Render a map as space-joined `key="value"` pairs for `&attributes`.
fn explode_attributes(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("explodeAttributes", args, 1)?;
    match &args[0] {
        Value::Map(m) => {
            let mut out = String::new();
            let mut del = "";
            for (k, v) in m {
                out.push_str(del);
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&v.to_string());
                out.push('"');
                del = " ";
            }
            Ok(Value::String(out))
        }
        Value::Nil { .. } | Value::Null => Ok(Value::String(String::new())),
        other => Err(EvalErrorKind::Type(format!(
            "explodeAttributes: type {} not supported as an attribute collection",
            other.kind_name()
        ))),
    }
}

fn escape_html(args: &[Value]) -> Result<Value, EvalErrorKind> {
    need("escapeHtml", args, 1)?;
    Ok(Value::String(
        html_escape::encode_text(&args[0].to_string()).into_owned(),
    ))
}
