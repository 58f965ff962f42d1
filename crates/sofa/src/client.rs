//! The client entry point.

use std::any;
use std::sync::Arc;

use sofa_common::naming::FieldNaming;
use sofa_query::{ClassificationTable, FindSender};
use tracing::debug;

use crate::config::Config;
use crate::database::Database;

/// A client bound to one transport.
///
/// Cheap to clone; clones share the transport and configuration.
pub struct Client<S> {
    sender: Arc<S>,
    config: Arc<Config>,
    naming: Arc<FieldNaming>,
    table: Arc<ClassificationTable>,
}

impl<S: FindSender> Client<S> {
    /// Creates a client with the default configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use sofa::{Client, MemoryDatabase};
    ///
    /// let client = Client::new(MemoryDatabase::new());
    /// let rebels = client.database::<serde_json::Value>("rebels");
    /// assert_eq!(rebels.name(), "rebels");
    /// ```
    pub fn new(sender: S) -> Self {
        Self::with_config(sender, Config::default())
    }

    /// Creates a client with the given configuration.
    pub fn with_config(sender: S, config: Config) -> Self {
        let naming = Arc::new(config.field_naming());
        let table = config.classification_table();
        Self {
            sender: Arc::new(sender),
            config: Arc::new(config),
            naming,
            table,
        }
    }

    /// Opens a handle to a named database holding documents of type `T`.
    pub fn database<T>(&self, name: impl Into<String>) -> Database<T, S> {
        Database::new(
            name.into(),
            Arc::clone(&self.sender),
            Arc::clone(&self.naming),
            Arc::clone(&self.table),
        )
    }

    /// Opens a handle to the database named after `T`.
    ///
    /// The name is the type's name converted with the configured
    /// [`DocumentCase`](crate::DocumentCase): `RebelAlliance` becomes
    /// `rebel_alliance` by default.
    pub fn database_for<T>(&self) -> Database<T, S> {
        let name = self.database_name::<T>();
        debug!("database for {} is {}", any::type_name::<T>(), name);
        self.database(name)
    }

    /// Returns the database name derived from `T`.
    pub fn database_name<T>(&self) -> String {
        self.config
            .document_case
            .database_name(short_type_name(any::type_name::<T>()))
    }

    /// Returns the transport.
    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<S> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            config: Arc::clone(&self.config),
            naming: Arc::clone(&self.naming),
            table: Arc::clone(&self.table),
        }
    }
}

/// Strips the module path and generic arguments from a type name.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
