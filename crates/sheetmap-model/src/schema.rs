//! Target schema descriptors supplied by the table catalog.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Coarse data kind of a target column, used only as matching context.
///
/// Deserializes from either a kind label or a catalog type name, so schema
/// files exported from the database can carry `"decimal(18,2)"` directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataKind {
    #[default]
    Text,
    Integer,
    Number,
    Date,
    DateTime,
    Boolean,
}

impl DataKind {
    /// Derive a kind from a catalog type name such as `varchar(50)` or `decimal(18,2)`.
    pub fn from_type_name(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        let base = lower
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        match base {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" => Self::Integer,
            "number" | "numeric" | "decimal" | "float" | "real" | "double" | "money"
            | "smallmoney" => Self::Number,
            "date" => Self::Date,
            "datetime" | "datetime2" | "smalldatetime" | "timestamp" | "datetimeoffset" => {
                Self::DateTime
            }
            "bit" | "bool" | "boolean" => Self::Boolean,
            _ => Self::Text,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Boolean => "boolean",
        }
    }
}

impl From<String> for DataKind {
    fn from(raw: String) -> Self {
        Self::from_type_name(&raw)
    }
}

impl From<DataKind> for String {
    fn from(kind: DataKind) -> Self {
        kind.label().to_string()
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    /// Canonical column name in the destination table.
    pub name: String,
    #[serde(default)]
    pub kind: DataKind,
    /// Whether a workbook must supply this column.
    #[serde(default)]
    pub required: bool,
    /// Alternative header spellings known to mean this column.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Short semantic description used as language-model context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Example values used as language-model context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl TargetColumn {
    pub fn new(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            aliases: Vec::new(),
            description: None,
            examples: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }

    /// Name followed by aliases, in declaration order.
    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Deserialize)]
struct RawTargetSchema {
    table: String,
    #[serde(default)]
    columns: Vec<TargetColumn>,
}

impl TryFrom<RawTargetSchema> for TargetSchema {
    type Error = ModelError;

    fn try_from(raw: RawTargetSchema) -> Result<Self, Self::Error> {
        TargetSchema::new(raw.table, raw.columns)
    }
}

/// Ordered destination column definitions for one table.
///
/// Column names are unique (compared case-insensitively).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTargetSchema")]
pub struct TargetSchema {
    table: String,
    columns: Vec<TargetColumn>,
}

impl TargetSchema {
    pub fn new(table: impl Into<String>, columns: Vec<TargetColumn>) -> Result<Self, ModelError> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(ModelError::EmptyTargetTable);
        }
        let mut seen = BTreeSet::new();
        for column in &columns {
            if column.name.trim().is_empty() {
                return Err(ModelError::EmptyTargetColumnName);
            }
            if !seen.insert(column.name.to_lowercase()) {
                return Err(ModelError::DuplicateTargetColumn(column.name.clone()));
            }
        }
        Ok(Self { table, columns })
    }

    /// Destination table identifier, e.g. `dbo.Accounts`.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[TargetColumn] {
        &self.columns
    }

    /// Look up a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&TargetColumn> {
        let name = name.trim();
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn required(&self) -> impl Iterator<Item = &TargetColumn> {
        self.columns.iter().filter(|c| c.required)
    }

    pub fn required_count(&self) -> usize {
        self.required().count()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Built-in accounts schema used when no live catalog is available.
    pub fn default_accounts() -> Self {
        let columns = vec![
            TargetColumn::new("account_id", DataKind::Text)
                .required()
                .with_aliases(["account number", "acct id", "acct no"])
                .with_description("Unique identifier for the account")
                .with_examples(["AC12345", "10042", "ACCT-987654321"]),
            TargetColumn::new("balance", DataKind::Number)
                .required()
                .with_aliases(["current balance", "amount"])
                .with_description("Current account balance in currency units")
                .with_examples(["1250.00", "$5,423.50", "10000.75"]),
            TargetColumn::new("open_date", DataKind::Date)
                .with_aliases(["date opened", "opened on"])
                .with_description("Date when the account was opened")
                .with_examples(["2020-01-15", "2019-06-30", "2022-12-01"]),
            TargetColumn::new("status", DataKind::Text)
                .with_aliases(["account status"])
                .with_description("Current status of the account")
                .with_examples(["active", "inactive", "pending"]),
            TargetColumn::new("customer_name", DataKind::Text)
                .required()
                .with_aliases(["account holder", "client name"])
                .with_description("Full name of the customer or account holder")
                .with_examples(["John Doe", "Jane Smith", "Acme Corporation"]),
        ];
        // Names above are distinct literals.
        Self {
            table: "dbo.Accounts".to_string(),
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names_case_insensitively() {
        let err = TargetSchema::new(
            "t",
            vec![
                TargetColumn::new("email", DataKind::Text),
                TargetColumn::new("EMAIL", DataKind::Text),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ModelError::DuplicateTargetColumn("EMAIL".to_string()));
    }

    #[test]
    fn column_lookup_ignores_case() {
        let schema = TargetSchema::default_accounts();
        assert_eq!(schema.column("Account_ID").unwrap().name, "account_id");
        assert!(!schema.contains("ssn"));
        assert_eq!(schema.required_count(), 3);
    }

    #[test]
    fn kind_from_catalog_type_names() {
        assert_eq!(DataKind::from_type_name("varchar(50)"), DataKind::Text);
        assert_eq!(DataKind::from_type_name("decimal(18,2)"), DataKind::Number);
        assert_eq!(DataKind::from_type_name("INT"), DataKind::Integer);
        assert_eq!(DataKind::from_type_name("datetime2"), DataKind::DateTime);
        assert_eq!(DataKind::from_type_name("bit"), DataKind::Boolean);
        assert_eq!(DataKind::from_type_name("double precision"), DataKind::Number);
    }

    #[test]
    fn schema_file_accepts_catalog_type_names() {
        let schema: TargetSchema = serde_json::from_str(
            r#"{"table": "dbo.Accounts", "columns": [
                {"name": "account_id", "kind": "varchar(20)", "required": true},
                {"name": "balance", "kind": "decimal(18,2)"},
                {"name": "opened_at", "kind": "datetime"},
                {"name": "active", "kind": "boolean"}
            ]}"#,
        )
        .unwrap();
        let kinds: Vec<DataKind> = schema.columns().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![DataKind::Text, DataKind::Number, DataKind::DateTime, DataKind::Boolean]
        );

        let written = serde_json::to_value(&schema.columns()[2]).unwrap();
        assert_eq!(written["kind"], "datetime");
    }
}
