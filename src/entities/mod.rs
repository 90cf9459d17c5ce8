//! The people and groups over which variables are evaluated.
pub mod graph;

pub use graph::{Entity, EntityGraph, EntityGraphBuilder, EntityId, EntityKind, GroupType, Members, PERSON};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("Role '{role}' is not declared for group type '{group_type}'")]
    UnknownRole { group_type: String, role: String },
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("Unknown group type '{0}'")]
    UnknownGroupType(String),
    #[error("Person '{person}' already belongs to a '{group_type}'")]
    DuplicateMembership { person: String, group_type: String },
    #[error("Entity key '{0}' is already used")]
    DuplicateKey(String),
    #[error("Entity '{0}' is not a group")]
    NotAGroup(String),
    #[error("Entity '{0}' is not a person")]
    NotAPerson(String),
    #[error("'{0}' is reserved for individuals and cannot name a group type")]
    ReservedGroupType(String),
}
