//! graph.rs
//! Persons and groups, with dense ids and role-ordered membership.

use super::EntityError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Type name carried by every person entity.
pub const PERSON: &str = "person";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// Most households hold a handful of members per role; keep them inline.
pub type Members = SmallVec<[EntityId; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupType {
    pub name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Person,
    /// `roles` follows the declaration order of the group type.
    Group { group_type: String, roles: Vec<(String, Members)> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    pub key: String,
    pub kind: EntityKind,
}

impl Entity {
    pub fn is_person(&self) -> bool { matches!(self.kind, EntityKind::Person) }

    pub fn type_name(&self) -> &str {
        match &self.kind {
            EntityKind::Person => PERSON,
            EntityKind::Group { group_type, .. } => group_type,
        }
    }
}

/// Immutable once built; evaluation sessions borrow it.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    entities: Vec<Entity>,
    by_key: HashMap<String, EntityId>,
    group_types: BTreeMap<String, GroupType>,
    // (person, group type) -> group instance
    membership: HashMap<(EntityId, String), EntityId>,
}

impl EntityGraph {
    pub fn builder() -> EntityGraphBuilder { EntityGraphBuilder::default() }

    pub fn len(&self) -> usize { self.entities.len() }
    pub fn is_empty(&self) -> bool { self.entities.is_empty() }

    pub fn get(&self, id: EntityId) -> Result<&Entity, EntityError> {
        self.entities.get(id.index()).ok_or_else(|| EntityError::UnknownEntity(id.to_string()))
    }

    pub fn entity_by_key(&self, key: &str) -> Result<EntityId, EntityError> {
        self.by_key.get(key).copied().ok_or_else(|| EntityError::UnknownEntity(key.to_string()))
    }

    pub fn key_of(&self, id: EntityId) -> &str {
        self.entities.get(id.index()).map_or("?", |e| e.key.as_str())
    }

    pub fn group_type(&self, name: &str) -> Option<&GroupType> { self.group_types.get(name) }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> { self.entities.iter() }

    pub fn persons(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().filter(|e| e.is_person()).map(|e| e.id)
    }

    /// Members holding `role` in `group`, in insertion order.
    pub fn get_role_members(&self, group: EntityId, role: &str) -> Result<&[EntityId], EntityError> {
        let entity = self.get(group)?;
        let EntityKind::Group { group_type, roles } = &entity.kind else {
            return Err(EntityError::NotAGroup(entity.key.clone()));
        };
        roles
            .iter()
            .find(|(name, _)| name == role)
            .map(|(_, members)| members.as_slice())
            .ok_or_else(|| EntityError::UnknownRole { group_type: group_type.clone(), role: role.to_string() })
    }

    /// Every member of `group`, roles in declaration order.
    pub fn members(&self, group: EntityId) -> Result<Vec<EntityId>, EntityError> {
        let entity = self.get(group)?;
        match &entity.kind {
            EntityKind::Group { roles, .. } => Ok(roles.iter().flat_map(|(_, m)| m.iter().copied()).collect()),
            EntityKind::Person => Err(EntityError::NotAGroup(entity.key.clone())),
        }
    }

    /// The instance of `group_type` that `person` belongs to, if any.
    pub fn group_of(&self, person: EntityId, group_type: &str) -> Option<EntityId> {
        self.membership.get(&(person, group_type.to_string())).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityGraphBuilder {
    graph: EntityGraph,
}

impl EntityGraphBuilder {
    pub fn new() -> Self { Self::default() }

    /// Declares a group type and its roles. `person` names the individual
    /// entity type and cannot be used for a group.
    pub fn declare_group_type(&mut self, name: &str, roles: &[&str]) -> Result<&mut Self, EntityError> {
        if name == PERSON {
            return Err(EntityError::ReservedGroupType(name.to_string()));
        }
        let group_type = GroupType { name: name.to_string(), roles: roles.iter().map(|r| r.to_string()).collect() };
        self.graph.group_types.insert(name.to_string(), group_type);
        Ok(self)
    }

    pub fn add_person(&mut self, key: &str) -> Result<EntityId, EntityError> {
        self.push(key, EntityKind::Person)
    }

    /// Adds a group instance. `members` lists `(role, persons)` pairs; roles
    /// left out are present but empty.
    pub fn add_group(
        &mut self,
        group_type: &str,
        key: &str,
        members: &[(&str, &[EntityId])],
    ) -> Result<EntityId, EntityError> {
        let declared = self
            .graph
            .group_types
            .get(group_type)
            .ok_or_else(|| EntityError::UnknownGroupType(group_type.to_string()))?;

        let mut roles: Vec<(String, Members)> = declared.roles.iter().map(|r| (r.clone(), Members::new())).collect();
        let mut seen: Vec<EntityId> = Vec::new();

        for (role, persons) in members {
            let slot = roles
                .iter_mut()
                .find(|(name, _)| name == role)
                .ok_or_else(|| EntityError::UnknownRole { group_type: group_type.to_string(), role: role.to_string() })?;
            for &person in persons.iter() {
                let entity = self.graph.get(person)?;
                if !entity.is_person() {
                    return Err(EntityError::NotAPerson(entity.key.clone()));
                }
                if seen.contains(&person) || self.graph.group_of(person, group_type).is_some() {
                    return Err(EntityError::DuplicateMembership {
                        person: entity.key.clone(),
                        group_type: group_type.to_string(),
                    });
                }
                seen.push(person);
                slot.1.push(person);
            }
        }

        let id = self.push(key, EntityKind::Group { group_type: group_type.to_string(), roles })?;
        for person in seen {
            self.graph.membership.insert((person, group_type.to_string()), id);
        }
        Ok(id)
    }

    pub fn build(self) -> EntityGraph {
        tracing::debug!(entities = self.graph.len(), "entity graph built");
        self.graph
    }

    fn push(&mut self, key: &str, kind: EntityKind) -> Result<EntityId, EntityError> {
        if self.graph.by_key.contains_key(key) {
            return Err(EntityError::DuplicateKey(key.to_string()));
        }
        let id = EntityId::new(self.graph.entities.len());
        self.graph.entities.push(Entity { id, key: key.to_string(), kind });
        self.graph.by_key.insert(key.to_string(), id);
        Ok(id)
    }
}
