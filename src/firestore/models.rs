use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

/// A Firestore value in its REST encoding, e.g. `{"integerValue": "18"}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    StringValue(String),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    BooleanValue(bool),
    MapValue(MapValue),
    ArrayValue(ArrayValue),
    NullValue(Option<String>),
    TimestampValue(String),
    GeoPointValue(GeoPoint),
    BytesValue(String), // base64 encoded
    ReferenceValue(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Vec<CollectionSelector>>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<QueryFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<Order>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_descendants: Option<bool>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum QueryFilter {
    CompositeFilter(CompositeFilter),
    FieldFilter(FieldFilter),
}

#[derive(Serialize, Debug, Clone)]
pub struct CompositeFilter {
    pub op: CompositeOperator,
    pub filters: Vec<QueryFilter>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompositeOperator {
    And,
}

#[derive(Serialize, Debug, Clone)]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: FieldOperator,
    pub value: Value,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

impl FieldReference {
    /// Builds a reference from a dotted field name as typed by a user.
    ///
    /// Segments that are not plain identifiers (`user-name`, `2fa`,
    /// `first name`) are wrapped in backticks with `` ` `` and `\` escaped.
    /// A name that already contains a backtick is taken as quoted.
    pub fn from_dotted(path: &str) -> Self {
        if path.contains('`') {
            return Self {
                field_path: path.to_string(),
            };
        }

        let field_path = path
            .split('.')
            .map(|segment| {
                if is_simple_segment(segment) {
                    segment.to_string()
                } else {
                    format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
                }
            })
            .collect::<Vec<_>>()
            .join(".");
        Self { field_path }
    }
}

fn is_simple_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

/// Comparison operators accepted by a field filter.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FieldOperator {
    pub const ALL: [FieldOperator; 10] = [
        FieldOperator::Equal,
        FieldOperator::NotEqual,
        FieldOperator::LessThan,
        FieldOperator::LessThanOrEqual,
        FieldOperator::GreaterThan,
        FieldOperator::GreaterThanOrEqual,
        FieldOperator::ArrayContains,
        FieldOperator::ArrayContainsAny,
        FieldOperator::In,
        FieldOperator::NotIn,
    ];

    /// The symbol users type, e.g. `>=` or `array-contains`.
    pub fn symbol(self) -> &'static str {
        match self {
            FieldOperator::Equal => "==",
            FieldOperator::NotEqual => "!=",
            FieldOperator::LessThan => "<",
            FieldOperator::LessThanOrEqual => "<=",
            FieldOperator::GreaterThan => ">",
            FieldOperator::GreaterThanOrEqual => ">=",
            FieldOperator::ArrayContains => "array-contains",
            FieldOperator::ArrayContainsAny => "array-contains-any",
            FieldOperator::In => "in",
            FieldOperator::NotIn => "not-in",
        }
    }

    /// Operators whose operand is a list of values.
    pub fn takes_list(self) -> bool {
        matches!(
            self,
            FieldOperator::ArrayContainsAny | FieldOperator::In | FieldOperator::NotIn
        )
    }
}

impl std::fmt::Display for FieldOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for FieldOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldOperator::ALL
            .into_iter()
            .find(|op| op.symbol() == s.trim())
            .ok_or_else(|| format!("unknown operator '{}'", s))
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Order {
    pub field: FieldReference,
    pub direction: Direction,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn short_name(self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Ascending),
            "desc" | "descending" => Ok(Direction::Descending),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    pub document: Option<Document>,
    pub read_time: Option<String>,
    pub skipped_results: Option<i32>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListCollectionIdsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListCollectionIdsResponse {
    #[serde(default)]
    pub collection_ids: Vec<String>,
    pub next_page_token: Option<String>,
}
