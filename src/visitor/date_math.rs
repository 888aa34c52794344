//! Date-math evaluation (`now-1d`, `2024-01-01||+1M/d`).
//!
//! The expression language anchors at `now` or a date literal followed by
//! `||`, then applies arithmetic (`+1M`, `-7d`) and rounding (`/d`)
//! operations left to right. Rounding truncates to the start of the unit
//! for lower bounds and to the last instant of the unit for upper bounds.

use std::any::Any;

use async_trait::async_trait;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, Timelike, Utc,
};

use crate::ast::{QueryNode, RangeNode, TermNode};
use crate::error::{LanceaError, Result};
use crate::text::Text;
use crate::visitor::context::VisitorContext;
use crate::visitor::QueryNodeVisitor;

/// Which end of an interval a value is used for; decides rounding
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Truncate to the start of the unit (lower bounds).
    Down,
    /// Truncate to the last instant of the unit (upper bounds).
    Up,
}

/// Evaluates date-math expressions against a fixed base time.
#[derive(Debug, Clone)]
pub struct DateMathEvaluator {
    base: DateTime<FixedOffset>,
}

fn is_unit(ch: char) -> bool {
    matches!(ch, 'y' | 'M' | 'w' | 'd' | 'h' | 'H' | 'm' | 's')
}

impl DateMathEvaluator {
    /// Create an evaluator whose `now` is the given instant.
    pub fn new(base: DateTime<FixedOffset>) -> Self {
        DateMathEvaluator { base }
    }

    /// Fast check for strings that could be date math: `now...`, a `||`
    /// anchor, or at least four digits directly followed by an operation.
    pub fn is_candidate(text: &str) -> bool {
        if text.starts_with("now") || text.contains("||") {
            return true;
        }
        let digits = text.bytes().take_while(u8::is_ascii_digit).count();
        if digits < 4 {
            return false;
        }
        let mut rest = text[digits..].chars();
        match rest.next() {
            Some('/') => rest.next().map(is_unit).unwrap_or(false),
            Some('+') | Some('-') => rest
                .skip_while(char::is_ascii_digit)
                .next()
                .map(is_unit)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Evaluate an expression. Rounding operations use the given bound
    /// direction. Failures leave the caller free to keep the original.
    pub fn evaluate(&self, expr: &str, rounding: Rounding) -> Result<DateTime<FixedOffset>> {
        let (anchor, operations) = self.split_anchor(expr)?;
        let mut current = anchor;

        let mut chars = operations.chars().peekable();
        while let Some(op) = chars.next() {
            match op {
                '+' | '-' => {
                    let mut digits = String::new();
                    while let Some(ch) = chars.peek() {
                        if ch.is_ascii_digit() {
                            digits.push(*ch);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let amount: i64 = if digits.is_empty() {
                        1
                    } else {
                        digits.parse().map_err(|_| {
                            LanceaError::query(format!("invalid date math amount in '{expr}'"))
                        })?
                    };
                    let amount = if op == '-' { -amount } else { amount };
                    let unit = chars.next().ok_or_else(|| {
                        LanceaError::query(format!("missing unit in date math '{expr}'"))
                    })?;
                    current = shift(current, unit, amount)?;
                }
                '/' => {
                    let unit = chars.next().ok_or_else(|| {
                        LanceaError::query(format!("missing rounding unit in '{expr}'"))
                    })?;
                    current = match rounding {
                        Rounding::Down => round_down(current, unit)?,
                        Rounding::Up => round_up(current, unit)?,
                    };
                }
                _ => {
                    return Err(LanceaError::query(format!(
                        "unexpected character '{op}' in date math '{expr}'"
                    )));
                }
            }
        }

        Ok(current)
    }

    /// Render an evaluated instant in the wire format used for rewritten
    /// query values.
    pub fn format(value: &DateTime<FixedOffset>) -> String {
        value.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
    }

    /// Split off the anchor and return `(instant, remaining operations)`.
    fn split_anchor<'a>(&self, expr: &'a str) -> Result<(DateTime<FixedOffset>, &'a str)> {
        if let Some(rest) = expr.strip_prefix("now") {
            return Ok((self.base, rest));
        }
        if let Some((literal, rest)) = expr.split_once("||") {
            return Ok((self.parse_anchor(literal)?, rest));
        }
        // A bare date followed directly by operations: the anchor is the
        // leading digit run (`2024+1y`).
        let digits = expr.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(LanceaError::query(format!(
                "date math expression '{expr}' has no anchor"
            )));
        }
        let (literal, rest) = expr.split_at(digits);
        Ok((self.parse_anchor(literal)?, rest))
    }

    /// Parse a date literal anchor: `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, or
    /// `YYYY-MM-DDTHH:MM:SS[.fff]`, with an optional `Z` or `±HH:MM`.
    fn parse_anchor(&self, literal: &str) -> Result<DateTime<FixedOffset>> {
        let (body, offset) = if let Some(stripped) = literal.strip_suffix('Z') {
            (stripped, Utc.fix())
        } else if let Some(t_pos) = literal.find('T') {
            match literal[t_pos..].find(['+', '-']) {
                Some(rel) => {
                    let at = t_pos + rel;
                    (&literal[..at], parse_offset(&literal[at..])?)
                }
                None => (literal, *self.base.offset()),
            }
        } else {
            (literal, *self.base.offset())
        };

        let full = expand_literal(body)
            .ok_or_else(|| LanceaError::query(format!("invalid date literal '{literal}'")))?;
        let naive = NaiveDateTime::parse_from_str(&full, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| LanceaError::query(format!("invalid date literal '{literal}': {e}")))?;
        local_datetime(naive, offset)
    }
}

/// Fill in the omitted parts of a partial date literal.
fn expand_literal(body: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if let Some(t_pos) = body.find('T') {
        // Time present; allow HH:MM by appending seconds.
        let colons = body[t_pos..].matches(':').count();
        return match colons {
            1 => Some(format!("{body}:00")),
            2 => Some(body.to_string()),
            _ => None,
        };
    }
    match body.split('-').count() {
        1 => Some(format!("{body}-01-01T00:00:00")),
        2 => Some(format!("{body}-01T00:00:00")),
        3 => Some(format!("{body}T00:00:00")),
        _ => None,
    }
}

fn parse_offset(text: &str) -> Result<FixedOffset> {
    let bad = || LanceaError::query(format!("invalid timezone offset '{text}'"));
    let (sign, rest) = match text.as_bytes().first() {
        Some(b'+') => (1, &text[1..]),
        Some(b'-') => (-1, &text[1..]),
        _ => return Err(bad()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(bad)?;
    let hours: i32 = hours.parse().map_err(|_| bad())?;
    let minutes: i32 = minutes.parse().map_err(|_| bad())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

fn local_datetime(naive: NaiveDateTime, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| LanceaError::query("ambiguous local datetime"))
}

fn shift(dt: DateTime<FixedOffset>, unit: char, amount: i64) -> Result<DateTime<FixedOffset>> {
    let shifted = match unit {
        'y' => shift_months(dt, amount.checked_mul(12)),
        'M' => shift_months(dt, Some(amount)),
        'w' => Duration::try_weeks(amount).and_then(|d| dt.checked_add_signed(d)),
        'd' => Duration::try_days(amount).and_then(|d| dt.checked_add_signed(d)),
        'h' | 'H' => Duration::try_hours(amount).and_then(|d| dt.checked_add_signed(d)),
        'm' => Duration::try_minutes(amount).and_then(|d| dt.checked_add_signed(d)),
        's' => Duration::try_seconds(amount).and_then(|d| dt.checked_add_signed(d)),
        _ => {
            return Err(LanceaError::query(format!(
                "unknown date math unit '{unit}'"
            )));
        }
    };
    shifted.ok_or_else(|| LanceaError::query("date math result out of range"))
}

fn shift_months(dt: DateTime<FixedOffset>, months: Option<i64>) -> Option<DateTime<FixedOffset>> {
    let months = months?;
    if months >= 0 {
        dt.checked_add_months(Months::new(u32::try_from(months).ok()?))
    } else {
        dt.checked_sub_months(Months::new(u32::try_from(-months).ok()?))
    }
}

/// Truncate to the start of the unit. `w` is the ISO week (Monday).
fn round_down(dt: DateTime<FixedOffset>, unit: char) -> Result<DateTime<FixedOffset>> {
    let offset = *dt.offset();
    let naive = dt.naive_local();
    let date = naive.date();
    let time = naive.time();

    let floored = match unit {
        'y' => NaiveDate::from_ymd_opt(date.year(), 1, 1).map(|d| d.and_time(NaiveTime::MIN)),
        'M' => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
            .map(|d| d.and_time(NaiveTime::MIN)),
        'w' => {
            let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
            Some(monday.and_time(NaiveTime::MIN))
        }
        'd' => Some(date.and_time(NaiveTime::MIN)),
        'h' | 'H' => date.and_hms_opt(time.hour(), 0, 0),
        'm' => date.and_hms_opt(time.hour(), time.minute(), 0),
        's' => date.and_hms_opt(time.hour(), time.minute(), time.second()),
        _ => {
            return Err(LanceaError::query(format!(
                "unknown rounding unit '{unit}'"
            )));
        }
    };

    let floored =
        floored.ok_or_else(|| LanceaError::query("date math rounding out of range"))?;
    local_datetime(floored, offset)
}

/// Truncate to the last instant of the unit: the start of the next unit
/// minus one millisecond.
fn round_up(dt: DateTime<FixedOffset>, unit: char) -> Result<DateTime<FixedOffset>> {
    let start = round_down(dt, unit)?;
    let next = shift(start, unit, 1)?;
    next.checked_sub_signed(Duration::milliseconds(1))
        .ok_or_else(|| LanceaError::query("date math result out of range"))
}

/// A visitor that evaluates date-math expressions in terms and range
/// bounds, rewriting them to concrete instants.
///
/// Only candidate strings (see [`DateMathEvaluator::is_candidate`]) are
/// touched; everything else passes through byte-identical. Evaluation
/// failures silently keep the original value.
#[derive(Debug, Clone, Default)]
pub struct DateMathVisitor {
    base_time: Option<DateTime<FixedOffset>>,
    time_zone: Option<FixedOffset>,
}

impl DateMathVisitor {
    /// Create a visitor that evaluates `now` as the current wall clock.
    pub fn new() -> Self {
        DateMathVisitor::default()
    }

    /// Pin `now` to a fixed instant.
    pub fn with_base_time(mut self, base: DateTime<FixedOffset>) -> Self {
        self.base_time = Some(base);
        self
    }

    /// Evaluate the wall clock in the given zone when no base time is set.
    pub fn with_time_zone(mut self, zone: FixedOffset) -> Self {
        self.time_zone = Some(zone);
        self
    }

    fn evaluator(&self) -> DateMathEvaluator {
        let base = match (self.base_time, self.time_zone) {
            (Some(base), _) => base,
            (None, Some(zone)) => Utc::now().with_timezone(&zone),
            (None, None) => Utc::now().fixed_offset(),
        };
        DateMathEvaluator::new(base)
    }

    fn rewrite_bound(&self, value: &mut Text, rounding: Rounding) {
        let text = value.as_str();
        if !DateMathEvaluator::is_candidate(text) {
            return;
        }
        if let Ok(evaluated) = self.evaluator().evaluate(text, rounding) {
            value.set(DateMathEvaluator::format(&evaluated));
        }
    }
}

#[async_trait]
impl QueryNodeVisitor for DateMathVisitor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn visit_term(
        &mut self,
        mut node: TermNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let text = node.unescaped_term().into_owned();
        if DateMathEvaluator::is_candidate(&text) {
            if let Ok(evaluated) = self.evaluator().evaluate(&text, Rounding::Down) {
                node.set_unescaped(DateMathEvaluator::format(&evaluated));
            }
        }
        Ok(node.into())
    }

    async fn visit_range(
        &mut self,
        mut node: RangeNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        if let Some(min) = node.min.as_mut() {
            self.rewrite_bound(min, Rounding::Down);
        }
        if let Some(max) = node.max.as_mut() {
            self.rewrite_bound(max, Rounding::Up);
        }
        Ok(node.into())
    }
}
