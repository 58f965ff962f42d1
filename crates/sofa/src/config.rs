//! Client configuration.

use std::sync::Arc;

use sofa_common::naming::{DocumentCase, FieldNaming, PropertyCase};
use sofa_query::ClassificationTable;

/// Client configuration.
///
/// Consumed when a [`Client`](crate::Client) is created and read-only
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Case convention for document property names.
    pub property_case: PropertyCase,

    /// Case convention for database names derived from document types.
    pub document_case: DocumentCase,

    /// Explicit wire names, keyed by member name or dotted member path.
    pub field_overrides: Vec<(String, String)>,

    /// Classification table. `None` means the standard table.
    pub classification: Option<Arc<ClassificationTable>>,
}

impl Config {
    /// Sets the property case convention.
    #[must_use]
    pub fn with_property_case(mut self, case: PropertyCase) -> Self {
        self.property_case = case;
        self
    }

    /// Sets the database name case convention.
    #[must_use]
    pub fn with_document_case(mut self, case: DocumentCase) -> Self {
        self.document_case = case;
        self
    }

    /// Maps a member (or dotted member path) to an explicit wire name.
    #[must_use]
    pub fn with_field_override(mut self, member: impl Into<String>, wire: impl Into<String>) -> Self {
        self.field_overrides.push((member.into(), wire.into()));
        self
    }

    /// Uses a custom classification table.
    #[must_use]
    pub fn with_classification(mut self, table: ClassificationTable) -> Self {
        self.classification = Some(Arc::new(table));
        self
    }

    /// Builds the field naming described by this configuration.
    pub fn field_naming(&self) -> FieldNaming {
        self.field_overrides
            .iter()
            .fold(FieldNaming::new(self.property_case), |naming, (member, wire)| {
                naming.with_override(member.as_str(), wire.as_str())
            })
    }

    /// Returns the classification table in effect.
    pub fn classification_table(&self) -> Arc<ClassificationTable> {
        self.classification
            .clone()
            .unwrap_or_else(ClassificationTable::standard)
    }
}
