//! Result types for query-tasks.
//!
//! Defines the structures used to represent task output: a generic ordered
//! record of named values, and the raw column/row result of a SQL query.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Represents the result of executing a SQL query.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data, one value per column.
    pub rows: Vec<Row>,

    /// Time taken to execute the query.
    pub execution_time: Duration,

    /// Number of rows in the result.
    pub row_count: usize,
}

impl QueryResult {
    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
            row_count,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Converts the positional rows into records keyed by column name.
    pub fn into_records(self) -> Vec<Record> {
        let names: Vec<String> = self.columns.into_iter().map(|c| c.name).collect();
        self.rows
            .into_iter()
            .map(|row| names.iter().cloned().zip(row).collect())
            .collect()
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A positional row of data from a SQL query result.
pub type Row = Vec<Value>;

/// One output row of a task: field names in the order the query produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a field, replacing an existing value in place or appending a new one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Returns the value of a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the value at a dotted path, descending into nested records.
    ///
    /// A top-level field whose name itself contains a dot wins over descent.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.get(path) {
            return Some(value);
        }
        let (head, rest) = path.split_once('.')?;
        match self.get(head)? {
            Value::Document(inner) => inner.get_path(rest),
            _ => None,
        }
    }

    /// Field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field-by-field comparison that treats equal numbers as equal
    /// regardless of integer/float representation. Field order matters.
    pub fn matches(&self, other: &Record) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|((ka, va), (kb, vb))| ka == kb && va.matches(vb))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Represents a single value returned by a database.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL / absent value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Ordered list of values.
    Array(Vec<Value>),

    /// Nested record.
    Document(Record),
}

impl Value {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number of digits after the decimal point in the shortest
    /// representation of a number. `None` for non-numbers and non-finite floats.
    pub fn decimal_places(&self) -> Option<usize> {
        match self {
            Value::Int(_) => Some(0),
            Value::Float(f) if f.is_finite() => {
                let text = f.to_string();
                Some(text.split_once('.').map_or(0, |(_, frac)| frac.len()))
            }
            _ => None,
        }
    }

    /// Equality that compares numbers by value, so `Int(60)` matches `Float(60.0)`.
    ///
    /// Bytes are written to JSON as an array of integers, so they also match
    /// an array holding the same byte values.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bytes(bytes), Value::Array(items))
            | (Value::Array(items), Value::Bytes(bytes)) => {
                bytes.len() == items.len()
                    && bytes
                        .iter()
                        .zip(items)
                        .all(|(byte, item)| *item == Value::Int(i64::from(*byte)))
            }
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
            }
            (Value::Document(a), Value::Document(b)) => a.matches(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    /// Total ordering used for sort-key checks.
    ///
    /// Values of different kinds order as null < bool < number < string <
    /// bytes < array < document. With `fold_text`, strings compare the way an
    /// accent- and case-insensitive collation does.
    pub fn compare(&self, other: &Value, fold_text: bool) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) if fold_text => folded(a).cmp(folded(b)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Bytes(_) => 4,
            Value::Array(_) => 5,
            Value::Document(_) => 6,
        }
    }

    /// Converts the value to a string representation for table output.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::Array(_) | Value::Document(_) => {
                serde_json::to_string(self).unwrap_or_else(|_| "<unprintable>".to_string())
            }
        }
    }
}

/// Lowercased characters with diacritics removed, so "Röd" folds to "rod".
fn folded(text: &str) -> impl Iterator<Item = char> + '_ {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Document(record) => record.serialize(serializer),
        }
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::Float(v as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Document(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Document(map.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Bool(true).to_display_string(), "true");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(2.71).to_display_string(), "2.71");
        assert_eq!(Value::from("hello").to_display_string(), "hello");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_display_string(), "<3 bytes>");
        assert_eq!(
            Value::Document(Record::new().with("a", 1)).to_display_string(),
            r#"{"a":1}"#
        );
    }

    #[test]
    fn test_value_from_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from(42u64), Value::Int(42));
        assert_eq!(Value::from(2.71f64), Value::Float(2.71));
        assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(42i32)), Value::Int(42));
    }

    #[test]
    fn test_record_insert_keeps_order_and_replaces() {
        let mut record = Record::new().with("b", 1).with("a", 2);
        record.insert("b", 3);

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(record.get("b"), Some(&Value::Int(3)));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_record_get_path() {
        let record = Record::new()
            .with("answers", Record::new().with("question_id", 7))
            .with("Amount, $", 1.5);

        assert_eq!(record.get_path("answers.question_id"), Some(&Value::Int(7)));
        assert_eq!(record.get_path("Amount, $"), Some(&Value::Float(1.5)));
        assert_eq!(record.get_path("answers.missing"), None);
        assert_eq!(record.get_path("Amount, $.x"), None);
    }

    #[test]
    fn test_query_result_into_records() {
        let columns = vec![
            ColumnInfo::new("Order Id", "INT"),
            ColumnInfo::new("Order Total Price", "DECIMAL"),
        ];
        let rows = vec![vec![Value::Int(10248), Value::Float(440.0)]];

        let records = QueryResult::with_data(columns, rows).into_records();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].keys().collect::<Vec<_>>(),
            vec!["Order Id", "Order Total Price"]
        );
        assert_eq!(records[0].get("Order Id"), Some(&Value::Int(10248)));
    }

    #[test]
    fn test_decimal_places() {
        assert_eq!(Value::Float(60.0).decimal_places(), Some(0));
        assert_eq!(Value::Float(12.345).decimal_places(), Some(3));
        assert_eq!(Value::Float(0.1 + 0.2).decimal_places(), Some(17));
        assert_eq!(Value::Int(5).decimal_places(), Some(0));
        assert_eq!(Value::from("1.5").decimal_places(), None);
        assert_eq!(Value::Float(f64::NAN).decimal_places(), None);
    }

    #[test]
    fn test_matches_compares_numbers_by_value() {
        assert!(Value::Int(60).matches(&Value::Float(60.0)));
        assert!(!Value::Int(60).matches(&Value::Float(60.5)));
        assert!(!Value::from("60").matches(&Value::Int(60)));

        let a = Record::new().with("x", 1).with("y", "-");
        let b = Record::new().with("x", 1.0).with("y", "-");
        let reordered = Record::new().with("y", "-").with("x", 1);
        assert!(a.matches(&b));
        assert!(!a.matches(&reordered));
    }

    #[test]
    fn test_compare_orders_mixed_kinds() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5), false), Ordering::Less);
        assert_eq!(Value::Null.compare(&Value::Int(0), false), Ordering::Less);
        assert_eq!(
            Value::from("chai").compare(&Value::from("Chang"), false),
            Ordering::Greater
        );
        assert_eq!(
            Value::from("chai").compare(&Value::from("Chang"), true),
            Ordering::Less
        );
    }

    #[test]
    fn test_folded_compare_ignores_accents() {
        let names = ["Röd Kaviar", "Rogede sild", "Rössle Sauerkraut"];
        for pair in names.windows(2) {
            let (a, b) = (Value::from(pair[0]), Value::from(pair[1]));
            assert_eq!(a.compare(&b, true), Ordering::Less, "{} vs {}", pair[0], pair[1]);
        }
        assert_eq!(
            Value::from("Côte de Blaye").compare(&Value::from("cote de blaye"), true),
            Ordering::Equal
        );
    }

    #[test]
    fn test_serialize_preserves_field_order() {
        let record = Record::new()
            .with("Order Id", 3)
            .with("Total Order Discount, %", 1.25)
            .with("ReportsTo", Value::Null)
            .with("tags", vec![Value::from("a")]);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"Order Id":3,"Total Order Discount, %":1.25,"ReportsTo":null,"tags":["a"]}"#
        );
    }

    #[test]
    fn test_from_json_object_keeps_order() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"z": 1, "a": {"k": 2.5}, "m": [true, null]}"#).unwrap();

        let Value::Document(record) = Value::from(json) else {
            panic!("expected a document");
        };

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(record.get_path("a.k"), Some(&Value::Float(2.5)));
        assert_eq!(
            record.get("m"),
            Some(&Value::Array(vec![Value::Bool(true), Value::Null]))
        );
    }
}
