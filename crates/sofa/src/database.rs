//! Typed database handles.

use std::marker::PhantomData;
use std::sync::Arc;

use sofa_common::naming::FieldNaming;
use sofa_query::{ClassificationTable, FindSender, QueryCompiler};

use crate::query::Query;

/// A handle to one database holding documents of type `T`.
pub struct Database<T, S> {
    name: String,
    sender: Arc<S>,
    naming: Arc<FieldNaming>,
    table: Arc<ClassificationTable>,
    compiler: Arc<QueryCompiler>,
    discriminator: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: FindSender> Database<T, S> {
    pub(crate) fn new(
        name: String,
        sender: Arc<S>,
        naming: Arc<FieldNaming>,
        table: Arc<ClassificationTable>,
    ) -> Self {
        let compiler = Arc::new(
            QueryCompiler::new(Arc::clone(&naming)).with_table(Arc::clone(&table)),
        );
        Self {
            name,
            sender,
            naming,
            table,
            compiler,
            discriminator: None,
            _marker: PhantomData,
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the split discriminator, if any.
    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    /// Restricts every query to documents stored under this discriminator.
    ///
    /// Several document types can share one database when each carries a
    /// `split_discriminator` field.
    #[must_use]
    pub fn with_discriminator(mut self, discriminator: impl Into<String>) -> Self {
        let discriminator = discriminator.into();
        self.compiler = Arc::new(
            QueryCompiler::new(Arc::clone(&self.naming))
                .with_table(Arc::clone(&self.table))
                .with_discriminator(Some(discriminator.clone())),
        );
        self.discriminator = Some(discriminator);
        self
    }

    /// Starts a query over every document.
    pub fn query(&self) -> Query<T, S> {
        Query::new(
            self.name.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.compiler),
        )
    }
}

impl<T, S> Clone for Database<T, S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sender: Arc::clone(&self.sender),
            naming: Arc::clone(&self.naming),
            table: Arc::clone(&self.table),
            compiler: Arc::clone(&self.compiler),
            discriminator: self.discriminator.clone(),
            _marker: PhantomData,
        }
    }
}
