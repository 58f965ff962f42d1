//! Operation classification.
//!
//! Every operation kind falls into one of three classes:
//!
//! | Class | Meaning |
//! |-------|---------|
//! | [`Classification::Native`] | Expressible directly in the find request |
//! | [`Classification::Composite`] | Rewritten by the optimizer into native operations plus a client reduction |
//! | [`Classification::ClientOnly`] | Executed in memory after the fetch |
//!
//! The standard table is built once and shared. Restricted tables (for
//! servers that lack a feature) are built with [`ClassificationTable::with`].

use std::fmt;
use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use sofa_common::utils::error::{QueryError, Result};

/// Flat enumeration of every operation kind a plan can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// `Where`
    Filter,
    /// `OrderBy`
    OrderBy,
    /// `OrderByDescending`
    OrderByDescending,
    /// `ThenBy`
    ThenBy,
    /// `ThenByDescending`
    ThenByDescending,
    /// `Skip`
    Skip,
    /// `Take`
    Take,
    /// `Select`
    Project,
    /// `UseBookmark`
    UseBookmark,
    /// `WithReadQuorum`
    ReadQuorum,
    /// `WithoutIndexUpdate`
    SkipIndexUpdate,
    /// `FromStable`
    FromStable,
    /// `UseIndex`
    UseIndex,
    /// `IncludeExecutionStats`
    IncludeExecutionStats,
    /// `IncludeConflicts`
    IncludeConflicts,
    /// `Min`
    Min,
    /// `Max`
    Max,
    /// `Sum`
    Sum,
    /// `Average`
    Average,
    /// `Any`
    Any,
    /// `All`
    All,
    /// `First`
    First,
    /// `FirstOrDefault`
    FirstOrDefault,
    /// `Single`
    Single,
    /// `SingleOrDefault`
    SingleOrDefault,
    /// `Last`
    Last,
    /// `LastOrDefault`
    LastOrDefault,
    /// Post-fetch reduction inserted by the optimizer.
    Reduce,
}

impl OperationKind {
    /// Every operation kind.
    pub const ALL: [OperationKind; 28] = [
        OperationKind::Filter,
        OperationKind::OrderBy,
        OperationKind::OrderByDescending,
        OperationKind::ThenBy,
        OperationKind::ThenByDescending,
        OperationKind::Skip,
        OperationKind::Take,
        OperationKind::Project,
        OperationKind::UseBookmark,
        OperationKind::ReadQuorum,
        OperationKind::SkipIndexUpdate,
        OperationKind::FromStable,
        OperationKind::UseIndex,
        OperationKind::IncludeExecutionStats,
        OperationKind::IncludeConflicts,
        OperationKind::Min,
        OperationKind::Max,
        OperationKind::Sum,
        OperationKind::Average,
        OperationKind::Any,
        OperationKind::All,
        OperationKind::First,
        OperationKind::FirstOrDefault,
        OperationKind::Single,
        OperationKind::SingleOrDefault,
        OperationKind::Last,
        OperationKind::LastOrDefault,
        OperationKind::Reduce,
    ];

    /// Classification in the standard table.
    fn standard(self) -> Classification {
        match self {
            OperationKind::Filter
            | OperationKind::OrderBy
            | OperationKind::OrderByDescending
            | OperationKind::ThenBy
            | OperationKind::ThenByDescending
            | OperationKind::Skip
            | OperationKind::Take
            | OperationKind::Project
            | OperationKind::UseBookmark
            | OperationKind::ReadQuorum
            | OperationKind::SkipIndexUpdate
            | OperationKind::FromStable
            | OperationKind::UseIndex
            | OperationKind::IncludeExecutionStats
            | OperationKind::IncludeConflicts => Classification::Native,

            OperationKind::Min
            | OperationKind::Max
            | OperationKind::Sum
            | OperationKind::Average
            | OperationKind::Any
            | OperationKind::All
            | OperationKind::First
            | OperationKind::FirstOrDefault
            | OperationKind::Single
            | OperationKind::SingleOrDefault => Classification::Composite,

            OperationKind::Last | OperationKind::LastOrDefault | OperationKind::Reduce => {
                Classification::ClientOnly
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How an operation kind is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Sent to the server as part of the find request.
    Native,
    /// Rewritten into native operations plus a client reduction.
    Composite,
    /// Evaluated in memory on the fetched documents.
    ClientOnly,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Native => write!(f, "native"),
            Classification::Composite => write!(f, "composite"),
            Classification::ClientOnly => write!(f, "client-only"),
        }
    }
}

static STANDARD: LazyLock<Arc<ClassificationTable>> = LazyLock::new(|| {
    Arc::new(ClassificationTable {
        entries: OperationKind::ALL
            .iter()
            .map(|kind| (*kind, kind.standard()))
            .collect(),
    })
});

/// Maps operation kinds to their classification.
///
/// Read-only once built; shared between compilers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationTable {
    entries: HashMap<OperationKind, Classification>,
}

impl ClassificationTable {
    /// The standard table covering every operation kind.
    pub fn standard() -> Arc<ClassificationTable> {
        Arc::clone(&STANDARD)
    }

    /// An empty table. Every lookup fails until entries are added.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Sets the classification of an operation kind.
    pub fn with(mut self, kind: OperationKind, class: Classification) -> Self {
        self.entries.insert(kind, class);
        self
    }

    /// Removes an operation kind; compiling it then fails as unsupported.
    pub fn without(mut self, kind: OperationKind) -> Self {
        self.entries.remove(&kind);
        self
    }

    /// Looks up an operation kind.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error naming the kind when the table
    /// has no entry for it.
    pub fn classify(&self, kind: OperationKind) -> Result<Classification> {
        self.entries
            .get(&kind)
            .copied()
            .ok_or_else(|| QueryError::unsupported(kind).into())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ClassificationTable {
    fn default() -> Self {
        ClassificationTable::clone(&STANDARD)
    }
}
