use super::parser::{BinaryOp, Expr, Function, Literal, UnaryOp};
use super::{FormulaContext, FormulaError, Value};
use crate::cell::{CellValue, format_number, parse_number};
use crate::clock::Clock;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::cell::Cell;
use std::cmp::Ordering;

/// Operator chains parse iteratively, so a long `1+1+...` still builds a
/// deep tree. Evaluation stops here instead of exhausting the stack.
const MAX_EVAL_DEPTH: usize = 512;

pub(crate) struct Interpreter<'a> {
    pub ctx: &'a dyn FormulaContext,
    pub clock: &'a dyn Clock,
    depth: Cell<usize>,
}

impl<'a> Interpreter<'a> {
    pub fn new(ctx: &'a dyn FormulaContext, clock: &'a dyn Clock) -> Self {
        Interpreter {
            ctx,
            clock,
            depth: Cell::new(0),
        }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, FormulaError> {
        let depth = self.depth.get() + 1;
        if depth > MAX_EVAL_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        self.depth.set(depth);
        let value = self.eval_node(expr);
        self.depth.set(depth - 1);
        value
    }

    fn eval_node(&self, expr: &Expr) -> Result<Value, FormulaError> {
        match expr {
            Expr::Literal(Literal::Number(n)) => Ok(Value::Number(*n)),
            Expr::Literal(Literal::Text(s)) => Ok(Value::Text(s.clone())),
            Expr::Literal(Literal::Bool(b)) => Ok(Value::Bool(*b)),
            Expr::CellRef { column, row } => Ok(self.cell(*column, *row)),
            Expr::Range { .. } => Err(FormulaError::RangeOutsideAggregate),
            Expr::Variable(name) => self
                .ctx
                .variable(name)
                .map(Value::from_cell)
                .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
            Expr::Unary { op, expr } => {
                let v = self.eval(expr)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary(*op, l, r)
            }
            Expr::Call { function, args } => self.call(*function, args),
        }
    }

    /// Resolves `<column><row>`; anything outside the grid reads as 0.
    fn cell(&self, column: Option<usize>, row: u64) -> Value {
        let Some(column) = column else {
            return Value::Number(0.0);
        };
        if row == 0 || row > self.ctx.row_count() as u64 {
            return Value::Number(0.0);
        }
        match self.ctx.column_id(column) {
            Some(id) => Value::from_cell(self.ctx.value(id, (row - 1) as usize)),
            None => Value::Number(0.0),
        }
    }

    fn range_values(
        &self,
        first_column: Option<usize>,
        last_column: Option<usize>,
        rows: Option<(u64, u64)>,
        out: &mut Vec<CellValue>,
    ) {
        let (Some(first), Some(last)) = (first_column, last_column) else {
            return;
        };
        let row_count = self.ctx.row_count();
        let (row_start, row_end) = match rows {
            None => (0, row_count),
            Some((from, to)) => {
                let start = from.max(1) - 1;
                let end = to.min(row_count as u64);
                (start as usize, end as usize)
            }
        };
        let last = last.min(self.ctx.column_count().saturating_sub(1));
        for column in first..=last {
            let Some(id) = self.ctx.column_id(column) else {
                continue;
            };
            for row in row_start..row_end {
                out.push(self.ctx.value(id, row));
            }
        }
    }

    fn aggregate(&self, function: Function, args: &[Expr]) -> Result<Value, FormulaError> {
        let mut items = Vec::new();
        for arg in args {
            match arg {
                Expr::Range {
                    first_column,
                    last_column,
                    rows,
                } => self.range_values(*first_column, *last_column, *rows, &mut items),
                other => items.push(self.eval(other)?.into_cell()),
            }
        }

        // COUNT counts every non-empty value; the others see numbers only.
        if function == Function::Count {
            let count = items.iter().filter(|v| !v.is_blank()).count();
            return Ok(Value::Number(count as f64));
        }
        let numbers: Vec<f64> = items.iter().filter_map(CellValue::as_number).collect();
        if numbers.is_empty() {
            return Ok(Value::Number(0.0));
        }
        let sum: f64 = numbers.iter().sum();
        let result = match function {
            Function::Sum => sum,
            Function::Average => sum / numbers.len() as f64,
            Function::CountA => numbers.len() as f64,
            Function::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Function::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
            _ => unreachable!("not an aggregate"),
        };
        Ok(Value::Number(result))
    }

    fn call(&self, function: Function, args: &[Expr]) -> Result<Value, FormulaError> {
        if function.is_aggregate() {
            return self.aggregate(function, args);
        }

        match function {
            Function::If => {
                arity(function, args, 2, 3)?;
                if self.eval(&args[0])?.truthy() {
                    self.eval(&args[1])
                } else if let Some(otherwise) = args.get(2) {
                    self.eval(otherwise)
                } else {
                    Ok(Value::Bool(false))
                }
            }
            Function::Round => {
                arity(function, args, 1, 2)?;
                let x = self.number(&args[0])?;
                let digits = match args.get(1) {
                    Some(d) => self.number(d)?,
                    None => 0.0,
                };
                let factor = 10f64.powf(digits);
                Ok(Value::Number((x * factor + 0.5).floor() / factor))
            }
            Function::Floor => self.unary_math(function, args, f64::floor),
            Function::Ceil => self.unary_math(function, args, f64::ceil),
            Function::Abs => self.unary_math(function, args, f64::abs),
            Function::Sqrt => self.unary_math(function, args, f64::sqrt),
            Function::Power => {
                arity(function, args, 2, 2)?;
                let base = self.number(&args[0])?;
                let exponent = self.number(&args[1])?;
                Ok(Value::Number(base.powf(exponent)))
            }
            Function::Upper => {
                arity(function, args, 1, 1)?;
                Ok(Value::Text(self.eval(&args[0])?.to_text().to_uppercase()))
            }
            Function::Lower => {
                arity(function, args, 1, 1)?;
                Ok(Value::Text(self.eval(&args[0])?.to_text().to_lowercase()))
            }
            Function::Len => {
                arity(function, args, 1, 1)?;
                let len = self.eval(&args[0])?.to_text().chars().count();
                Ok(Value::Number(len as f64))
            }
            Function::Left => {
                arity(function, args, 1, 2)?;
                let text = self.eval(&args[0])?.to_text();
                let count = self.optional_count(args.get(1))?;
                Ok(Value::Text(substring(&text, 0, count)))
            }
            Function::Right => {
                arity(function, args, 1, 2)?;
                let text = self.eval(&args[0])?.to_text();
                let count = self.optional_count(args.get(1))?;
                let len = text.chars().count() as i64;
                Ok(Value::Text(substring(&text, len.saturating_sub(count.max(0)), len)))
            }
            Function::Mid => {
                arity(function, args, 3, 3)?;
                let text = self.eval(&args[0])?.to_text();
                let start = integer(self.number(&args[1])?).saturating_sub(1);
                let count = integer(self.number(&args[2])?);
                Ok(Value::Text(substring(&text, start, start.saturating_add(count))))
            }
            Function::And => {
                arity(function, args, 1, usize::MAX)?;
                let mut all = true;
                for arg in args {
                    all &= self.eval(arg)?.truthy();
                }
                Ok(Value::Bool(all))
            }
            Function::Or => {
                arity(function, args, 1, usize::MAX)?;
                let mut any = false;
                for arg in args {
                    any |= self.eval(arg)?.truthy();
                }
                Ok(Value::Bool(any))
            }
            Function::Not => {
                arity(function, args, 1, 1)?;
                Ok(Value::Bool(!self.eval(&args[0])?.truthy()))
            }
            Function::Today | Function::Now => {
                arity(function, args, 0, 0)?;
                Ok(Value::Number(self.clock.now().timestamp_millis() as f64))
            }
            Function::Year | Function::Month | Function::Day => {
                arity(function, args, 1, 1)?;
                let date = to_datetime(&self.eval(&args[0])?)?;
                let part = match function {
                    Function::Year => date.year() as f64,
                    Function::Month => date.month() as f64,
                    _ => date.day() as f64,
                };
                Ok(Value::Number(part))
            }
            _ => unreachable!("aggregates handled above"),
        }
    }

    fn number(&self, expr: &Expr) -> Result<f64, FormulaError> {
        Ok(self.eval(expr)?.to_number())
    }

    fn optional_count(&self, expr: Option<&Expr>) -> Result<i64, FormulaError> {
        match expr {
            Some(e) => Ok(integer(self.number(e)?)),
            None => Ok(1),
        }
    }

    fn unary_math(
        &self,
        function: Function,
        args: &[Expr],
        f: fn(f64) -> f64,
    ) -> Result<Value, FormulaError> {
        arity(function, args, 1, 1)?;
        Ok(Value::Number(f(self.number(&args[0])?)))
    }
}

fn arity(function: Function, args: &[Expr], min: usize, max: usize) -> Result<(), FormulaError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(FormulaError::Arity {
            function: function.name(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, FormulaError> {
    let value = match op {
        BinaryOp::Add => {
            if matches!(l, Value::Text(_)) || matches!(r, Value::Text(_)) {
                Value::Text(l.to_text() + &r.to_text())
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => {
            let divisor = r.to_number();
            if divisor == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            Value::Number(l.to_number() / divisor)
        }
        BinaryOp::Pow => Value::Number(l.to_number().powf(r.to_number())),
        BinaryOp::Concat => Value::Text(l.to_text() + &r.to_text()),
        BinaryOp::Eq => Value::Bool(loose_eq(&l, &r)),
        BinaryOp::Ne => Value::Bool(!loose_eq(&l, &r)),
        BinaryOp::Lt => Value::Bool(compare(&l, &r) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            compare(&l, &r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare(&l, &r) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(&l, &r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    };
    Ok(value)
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => l.to_number() == r.to_number(),
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}

fn integer(n: f64) -> i64 {
    if n.is_nan() { 0 } else { n.trunc() as i64 }
}

/// Char-based substring with clamping, swapping reversed bounds.
fn substring(text: &str, from: i64, to: i64) -> String {
    let len = text.chars().count() as i64;
    let a = from.clamp(0, len);
    let b = to.clamp(0, len);
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    text.chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect()
}

fn to_datetime(value: &Value) -> Result<DateTime<Utc>, FormulaError> {
    match value {
        Value::Number(ms) if ms.is_finite() => Utc
            .timestamp_millis_opt(*ms as i64)
            .single()
            .ok_or_else(|| FormulaError::InvalidDate(format_number(*ms))),
        Value::Text(s) => parse_date(s).ok_or_else(|| FormulaError::InvalidDate(s.clone())),
        other => Err(FormulaError::InvalidDate(other.to_text())),
    }
}

/// RFC 3339 timestamps or plain `YYYY-MM-DD` dates (UTC midnight).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    let naive = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&naive.and_hms_opt(0, 0, 0)?))
}

impl Value {
    pub fn from_cell(value: CellValue) -> Self {
        match value {
            CellValue::Null => Value::Number(0.0),
            CellValue::Bool(b) => Value::Bool(b),
            CellValue::Number(n) => Value::Number(n),
            CellValue::Date(d) => Value::Number(d.timestamp_millis() as f64),
            CellValue::Text(s) => Value::Text(s),
        }
    }

    pub fn into_cell(self) -> CellValue {
        match self {
            Value::Number(n) => CellValue::Number(n),
            Value::Text(s) => CellValue::Text(s),
            Value::Bool(b) => CellValue::Bool(b),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Text(s) => parse_number(s),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Text(s) => !s.is_empty(),
        }
    }
}
