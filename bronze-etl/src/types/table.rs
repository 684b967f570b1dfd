use std::fmt;

pub use bronze_config::shared::ConflictPolicy;

/// Fully qualified reference to a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Renders the table reference as a quoted `"schema"."table"` identifier pair.
    ///
    /// Identifiers come from configuration, not from source data, but quoting keeps
    /// mixed-case and reserved-word names working.
    pub fn quoted(&self) -> String {
        format!(
            "\"{}\".\"{}\"",
            self.schema.replace('"', "\"\""),
            self.name.replace('"', "\"\"")
        )
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_quotes_identifiers() {
        let table = TableRef::new("bronze", "discord_messages");
        assert_eq!(table.quoted(), "\"bronze\".\"discord_messages\"");
        assert_eq!(table.to_string(), "bronze.discord_messages");
    }
}
