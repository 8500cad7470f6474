//! Name → principal resolution for component wiring.
//!
//! Writes are gated on a single administrator; reads are restricted to the
//! administrator and the principals already registered, so an unknown caller
//! cannot enumerate the deployment.

use std::collections::HashMap;

use thiserror::Error;

use crate::Principal;

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum DirectoryError {
    #[error("caller is not the directory administrator")]
    NotAdmin,

    #[error("caller is not registered with the directory")]
    UnregisteredReader,

    #[error("no principal registered under name {0:?}")]
    NameNotFound(String),
}

pub struct Directory {
    admin: Principal,
    entries: HashMap<String, Principal>,
}

impl Directory {
    pub fn new(admin: Principal) -> Self {
        Self {
            admin,
            entries: HashMap::new(),
        }
    }

    pub fn admin(&self) -> Principal {
        self.admin
    }

    /// Register or replace the principal backing `name`. Admin only.
    pub fn register(
        &mut self,
        caller: Principal,
        name: &str,
        principal: Principal,
    ) -> Result<(), DirectoryError> {
        if caller != self.admin {
            return Err(DirectoryError::NotAdmin);
        }
        self.entries.insert(name.to_owned(), principal);
        tracing::info!(name, %principal, "directory entry registered");
        Ok(())
    }

    /// Resolve `name`, failing loudly when the deployment is misconfigured.
    pub fn resolve(&self, caller: Principal, name: &str) -> Result<Principal, DirectoryError> {
        if caller != self.admin && !self.entries.values().any(|p| *p == caller) {
            return Err(DirectoryError::UnregisteredReader);
        }
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| DirectoryError::NameNotFound(name.to_owned()))
    }
}
