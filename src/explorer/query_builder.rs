//! The editable query form: collection, where-conditions, order clauses and
//! a row limit, folded into a Firestore [`Query`].

use crate::firestore::models::{Direction, FieldOperator};
use crate::firestore::query::Query;
use crate::firestore::FirestoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value as SerdeValue;

/// Row limit used when the limit text is not a positive integer.
pub const DEFAULT_LIMIT: i32 = 10;

/// One `field operator value` filter row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCondition {
    pub field: String,
    pub operator: FieldOperator,
    pub value: String,
}

impl Default for QueryCondition {
    fn default() -> Self {
        Self {
            field: String::new(),
            operator: FieldOperator::Equal,
            value: String::new(),
        }
    }
}

impl QueryCondition {
    pub fn new(field: impl Into<String>, operator: FieldOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Conditions missing a field or a value are skipped.
    pub fn is_active(&self) -> bool {
        !self.field.is_empty() && !self.value.is_empty()
    }

    /// The operand sent to Firestore.
    ///
    /// List operators take a JSON array literal as is; every other value goes
    /// through [`coerce_value`].
    pub fn operand(&self) -> SerdeValue {
        if self.operator.takes_list() && self.value.trim_start().starts_with('[') {
            if let Ok(list @ SerdeValue::Array(_)) = serde_json::from_str::<SerdeValue>(&self.value) {
                return list;
            }
        }
        coerce_value(&self.value)
    }
}

/// One `field direction` sort row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOrder {
    pub field: String,
    pub direction: Direction,
}

impl QueryOrder {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Turns typed text into the most specific JSON scalar.
///
/// Numeric text becomes a number (integral values as integers), `"true"` and
/// `"false"` become booleans, anything else stays a string. Numeric text
/// follows number-input rules: blank text is `0` and unsigned `0x`, `0o`
/// and `0b` literals are read in their radix.
pub fn coerce_value(text: &str) -> SerdeValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return SerdeValue::from(0);
    }
    if let Some(i) = parse_radix_literal(trimmed) {
        return SerdeValue::from(i);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return SerdeValue::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            // 2^53: beyond this an f64 no longer holds every integer.
            if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                return SerdeValue::from(f as i64);
            }
            if let Some(n) = serde_json::Number::from_f64(f) {
                return SerdeValue::Number(n);
            }
        }
    }

    match text {
        "true" => SerdeValue::Bool(true),
        "false" => SerdeValue::Bool(false),
        _ => SerdeValue::String(text.to_string()),
    }
}

fn parse_radix_literal(text: &str) -> Option<i64> {
    let prefix = text.get(..2)?.to_ascii_lowercase();
    let radix = match prefix.as_str() {
        "0x" => 16,
        "0o" => 8,
        "0b" => 2,
        _ => return None,
    };
    let digits = &text[2..];
    if digits.starts_with(['+', '-']) {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

/// Reads the limit text the way a number input does: leading sign and
/// digits, anything after ignored. Non-positive or unreadable input gives
/// [`DEFAULT_LIMIT`].
pub fn effective_limit(text: &str) -> i32 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    match digits[..end].parse::<i64>() {
        Ok(n) if !negative && n > 0 => i32::try_from(n).unwrap_or(i32::MAX),
        _ => DEFAULT_LIMIT,
    }
}

/// State of the query form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBuilder {
    pub collection: String,
    pub conditions: Vec<QueryCondition>,
    pub orders: Vec<QueryOrder>,
    /// Raw limit text as typed.
    pub limit: String,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            collection: String::new(),
            conditions: Vec::new(),
            orders: Vec::new(),
            limit: DEFAULT_LIMIT.to_string(),
        }
    }
}

impl QueryBuilder {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    pub fn add_condition(&mut self) -> usize {
        self.conditions.push(QueryCondition::default());
        self.conditions.len() - 1
    }

    pub fn push_condition(&mut self, condition: QueryCondition) {
        self.conditions.push(condition);
    }

    pub fn remove_condition(&mut self, index: usize) -> Option<QueryCondition> {
        (index < self.conditions.len()).then(|| self.conditions.remove(index))
    }

    /// Mutable access to one row; `None` when out of range.
    pub fn condition_mut(&mut self, index: usize) -> Option<&mut QueryCondition> {
        self.conditions.get_mut(index)
    }

    pub fn add_order(&mut self) -> usize {
        self.orders.push(QueryOrder::default());
        self.orders.len() - 1
    }

    pub fn push_order(&mut self, order: QueryOrder) {
        self.orders.push(order);
    }

    pub fn remove_order(&mut self, index: usize) -> Option<QueryOrder> {
        (index < self.orders.len()).then(|| self.orders.remove(index))
    }

    pub fn order_mut(&mut self, index: usize) -> Option<&mut QueryOrder> {
        self.orders.get_mut(index)
    }

    pub fn set_limit(&mut self, text: impl Into<String>) {
        self.limit = text.into();
    }

    pub fn effective_limit(&self) -> i32 {
        effective_limit(&self.limit)
    }

    /// Folds conditions, then orders, then the limit into one query.
    pub fn build(&self) -> Result<Query, FirestoreError> {
        let mut query = Query::new(self.collection.as_str());

        for condition in self.conditions.iter().filter(|c| c.is_active()) {
            query = query.where_filter(&condition.field, condition.operator, condition.operand())?;
        }

        for order in self.orders.iter().filter(|o| !o.field.is_empty()) {
            query = query.order_by(&order.field, order.direction);
        }

        Ok(query.limit(self.effective_limit()))
    }
}
