//! Naming conventions.
//!
//! Queries refer to fields by host-side member names (`IsJedi`, `is_jedi`,
//! `Address.City`). The database stores documents under wire names decided by
//! a case convention plus explicit overrides. [`FieldNaming`] performs that
//! mapping; [`DocumentCase`] does the same for database names.
//!
//! Resolution is pure: the same input always maps to the same output.

use convert_case::{Case, Casing};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::FieldPath;

/// Case convention for document property names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCase {
    /// Member names are used verbatim.
    None,
    /// `isJedi`
    #[default]
    CamelCase,
    /// `IsJedi`
    PascalCase,
    /// `is_jedi`
    SnakeCase,
    /// `is-jedi`
    KebabCase,
}

impl PropertyCase {
    /// Converts a single member name.
    ///
    /// Names starting with `_` are reserved by the database (`_id`, `_rev`,
    /// `_conflicts`) and are never converted.
    pub fn apply(&self, member: &str) -> String {
        if member.starts_with('_') {
            return member.to_string();
        }
        match self {
            PropertyCase::None => member.to_string(),
            PropertyCase::CamelCase => member.to_case(Case::Camel),
            PropertyCase::PascalCase => member.to_case(Case::Pascal),
            PropertyCase::SnakeCase => member.to_case(Case::Snake),
            PropertyCase::KebabCase => member.to_case(Case::Kebab),
        }
    }
}

/// Case convention for database names derived from document type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCase {
    /// The type name, lower-cased.
    None,
    /// `rebel_alliance`
    #[default]
    SnakeCase,
    /// `rebel-alliance`
    KebabCase,
}

impl DocumentCase {
    /// Derives a database name from a document type name.
    pub fn database_name(&self, type_name: &str) -> String {
        match self {
            DocumentCase::None => type_name.to_lowercase(),
            DocumentCase::SnakeCase => type_name.to_case(Case::Snake),
            DocumentCase::KebabCase => type_name.to_case(Case::Kebab),
        }
    }
}

/// Maps member paths to wire field names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldNaming {
    case: PropertyCase,
    overrides: HashMap<String, String>,
}

impl FieldNaming {
    /// Creates a naming with the given case convention and no overrides.
    pub fn new(case: PropertyCase) -> Self {
        Self {
            case,
            overrides: HashMap::new(),
        }
    }

    /// Adds an explicit wire name for a member.
    ///
    /// `member` is either a single member name (`Surname`), applied wherever
    /// that member appears, or a dotted path (`Vehicle.Model`) which wins
    /// over segment overrides for that exact path.
    pub fn with_override(mut self, member: impl Into<String>, wire: impl Into<String>) -> Self {
        self.overrides.insert(member.into(), wire.into());
        self
    }

    /// Returns the case convention.
    pub fn case(&self) -> PropertyCase {
        self.case
    }

    /// Resolves a member path to its dotted wire name.
    pub fn resolve(&self, path: &FieldPath) -> String {
        if let Some(wire) = self.overrides.get(&path.to_string()) {
            return wire.clone();
        }
        path.segments()
            .iter()
            .map(|segment| self.resolve_member(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Resolves a single member name.
    pub fn resolve_member(&self, member: &str) -> String {
        match self.overrides.get(member) {
            Some(wire) => wire.clone(),
            None => self.case.apply(member),
        }
    }
}
