use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Logical column type, normalized across backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    Temporal,
    Binary,
    /// No non-null value was seen and the backend reported no type
    Null,
    Other(String),
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Infer a column type from materialized values, for backends with
    /// dynamic typing. Integers mixed with floats widen to `Float`; any other
    /// mix falls back to `Text`.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut inferred = ColumnType::Null;
        for value in values {
            let current = match value {
                Value::Null => continue,
                Value::Bool(_) => ColumnType::Boolean,
                Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
                Value::Number(_) => ColumnType::Float,
                _ => ColumnType::Text,
            };
            inferred = match (inferred, current) {
                (ColumnType::Null, c) => c,
                (a, b) if a == b => a,
                (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => {
                    ColumnType::Float
                }
                _ => return ColumnType::Text,
            };
        }
        inferred
    }

    pub fn name(&self) -> &str {
        match self {
            ColumnType::Integer => "int64",
            ColumnType::Float => "float64",
            ColumnType::Boolean => "bool",
            ColumnType::Text => "object",
            ColumnType::Temporal => "datetime64",
            ColumnType::Binary => "bytes",
            ColumnType::Null => "null",
            ColumnType::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: ColumnType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Materialized output of one query.
///
/// Rows are maps keyed by column name; `columns` keeps the select-list order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Map<String, Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Map<String, Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build a result set from positional rows, inferring the type of every
    /// column whose type is `Null` from its values.
    pub fn from_positional(names: Vec<String>, mut types: Vec<ColumnType>, rows: Vec<Vec<Value>>) -> Self {
        types.resize(names.len(), ColumnType::Null);
        for (idx, data_type) in types.iter_mut().enumerate() {
            if *data_type == ColumnType::Null {
                *data_type = ColumnType::infer(rows.iter().filter_map(|row| row.get(idx)));
            }
        }

        let columns: Vec<ColumnInfo> = names
            .into_iter()
            .zip(types)
            .map(|(name, data_type)| ColumnInfo::new(name, data_type))
            .collect();

        let rows = rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(row.into_iter().chain(std::iter::repeat(Value::Null)))
                    .map(|(column, value)| (column.name.clone(), value))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Values of one column in row order; missing cells read as null
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        self.column(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    pub fn has_numeric_column(&self) -> bool {
        self.columns.iter().any(|c| c.data_type.is_numeric())
    }

    /// Column names and types, one per line. Sent to the inference gateway
    /// as result metadata.
    pub fn describe_columns(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type.name()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Compact markdown rendering of the whole table
    pub fn to_markdown(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        out.push_str("| ");
        out.push_str(
            &self
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(" | "),
        );
        out.push_str(" |\n|");
        for _ in &self.columns {
            out.push_str(":---|");
        }
        out.push('\n');

        for row in &self.rows {
            out.push_str("| ");
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|c| cell_text(row.get(&c.name)))
                .collect();
            out.push_str(&cells.join(" | "));
            out.push_str(" |\n");
        }
        out
    }
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.replace('|', "\\|").replace('\n', " "),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_column_types() {
        assert_eq!(ColumnType::infer(&[json!(1), json!(2)]), ColumnType::Integer);
        assert_eq!(ColumnType::infer(&[json!(1), json!(2.5)]), ColumnType::Float);
        assert_eq!(ColumnType::infer(&[json!(null), json!("a")]), ColumnType::Text);
        assert_eq!(ColumnType::infer(&[json!(1), json!("a")]), ColumnType::Text);
        assert_eq!(ColumnType::infer(&[json!(null)]), ColumnType::Null);
        assert_eq!(ColumnType::infer(std::iter::empty()), ColumnType::Null);
    }

    #[test]
    fn test_from_positional_keeps_order_and_infers() {
        let rs = ResultSet::from_positional(
            vec!["name".into(), "total".into()],
            vec![],
            vec![vec![json!("Rock"), json!(1297)], vec![json!("Jazz"), json!(130)]],
        );
        assert_eq!(rs.row_count(), 2);
        assert_eq!(rs.columns[0].name, "name");
        assert_eq!(rs.columns[0].data_type, ColumnType::Text);
        assert_eq!(rs.columns[1].data_type, ColumnType::Integer);
        assert_eq!(rs.rows[1]["total"], json!(130));
        assert!(rs.has_numeric_column());
    }

    #[test]
    fn test_declared_types_win_over_inference() {
        let rs = ResultSet::from_positional(
            vec!["amount".into()],
            vec![ColumnType::Float],
            vec![vec![json!(3)]],
        );
        assert_eq!(rs.columns[0].data_type, ColumnType::Float);
    }

    #[test]
    fn test_markdown_rendering() {
        let rs = ResultSet::from_positional(
            vec!["genre".into(), "tracks".into()],
            vec![],
            vec![vec![json!("Rock|Pop"), json!(10)], vec![json!(null), json!(2)]],
        );
        let md = rs.to_markdown();
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines[0], "| genre | tracks |");
        assert_eq!(lines[1], "|:---|:---|");
        assert_eq!(lines[2], "| Rock\\|Pop | 10 |");
        assert_eq!(lines[3], "|  | 2 |");
    }

    #[test]
    fn test_describe_columns() {
        let rs = ResultSet::new(
            vec![
                ColumnInfo::new("name", ColumnType::Text),
                ColumnInfo::new("total", ColumnType::Float),
            ],
            vec![],
        );
        assert_eq!(rs.describe_columns(), "name object\ntotal float64");
    }
}
