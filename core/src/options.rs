use serde::{Deserialize, Serialize};

/// Flags that control how record fields are mapped implicitly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct MappingOptions {
    /// Treat a field named like `primary_key_name` as the primary key
    pub implicit_primary_key: bool,
    /// Give implicit or explicit primary keys an auto-increment counter
    pub implicit_auto_increment: bool,
    /// Index columns whose name ends in `foreign_key_suffix`
    pub implicit_index: bool,
    /// Conventional identifier field name, compared case-insensitively
    pub primary_key_name: String,
    /// Conventional foreign-key column suffix, compared case-insensitively
    pub foreign_key_suffix: String,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            implicit_primary_key: true,
            implicit_auto_increment: true,
            implicit_index: false,
            primary_key_name: "Id".to_string(),
            foreign_key_suffix: "Id".to_string(),
        }
    }
}

impl MappingOptions {
    /// No implicit keys, counters or indexes; everything must be declared.
    pub fn explicit() -> Self {
        Self {
            implicit_primary_key: false,
            implicit_auto_increment: false,
            implicit_index: false,
            ..Self::default()
        }
    }

    pub fn with_implicit_index(mut self, enabled: bool) -> Self {
        self.implicit_index = enabled;
        self
    }

    pub(crate) fn is_conventional_key(&self, field: &str) -> bool {
        self.implicit_primary_key && field.eq_ignore_ascii_case(&self.primary_key_name)
    }

    pub(crate) fn is_conventional_foreign_key(&self, column: &str) -> bool {
        let suffix = self.foreign_key_suffix.as_str();
        column.len() >= suffix.len()
            && column.is_char_boundary(column.len() - suffix.len())
            && column[column.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let options: MappingOptions = toml::from_str("implicit_index = true").unwrap();
        assert!(options.implicit_index);
        assert!(options.implicit_primary_key);
        assert_eq!(options.primary_key_name, "Id");
    }

    #[test]
    fn conventions_ignore_case() {
        let options = MappingOptions::default();
        assert!(options.is_conventional_key("id"));
        assert!(!options.is_conventional_key("uid"));
        assert!(options.is_conventional_foreign_key("group_id"));
        assert!(options.is_conventional_foreign_key("OwnerId"));
        assert!(!options.is_conventional_foreign_key("Name"));
        assert!(!MappingOptions::explicit().is_conventional_key("Id"));
    }
}
