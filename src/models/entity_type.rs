//! Entity types that travel through the outbox
//!
//! Each type maps to exactly one remote table and one natural-key column.
//! The mapping is an exhaustive `match`, so adding a variant without a table
//! is a compile error rather than a runtime "no mapping" failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Farm,
    Breed,
    AnimalBirth,
    Weaning,
    Weighing,
    Vaccination,
    Confinement,
    ConfinementAnimalLink,
    ConfinementFeedingRecord,
    AuditLog,
    User,
    Settings,
    RolePermission,
    NotificationReadMarker,
}

/// Column the remote store uses to resolve upsert conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NaturalKey {
    Uuid,
    Id,
}

impl NaturalKey {
    pub fn column(&self) -> &'static str {
        match self {
            NaturalKey::Uuid => "uuid",
            NaturalKey::Id => "id",
        }
    }
}

impl EntityType {
    pub const ALL: [EntityType; 14] = [
        EntityType::Farm,
        EntityType::Breed,
        EntityType::AnimalBirth,
        EntityType::Weaning,
        EntityType::Weighing,
        EntityType::Vaccination,
        EntityType::Confinement,
        EntityType::ConfinementAnimalLink,
        EntityType::ConfinementFeedingRecord,
        EntityType::AuditLog,
        EntityType::User,
        EntityType::Settings,
        EntityType::RolePermission,
        EntityType::NotificationReadMarker,
    ];

    /// Tag stored in the outbox row
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Farm => "farm",
            EntityType::Breed => "breed",
            EntityType::AnimalBirth => "animal-birth",
            EntityType::Weaning => "weaning",
            EntityType::Weighing => "weighing",
            EntityType::Vaccination => "vaccination",
            EntityType::Confinement => "confinement",
            EntityType::ConfinementAnimalLink => "confinement-animal-link",
            EntityType::ConfinementFeedingRecord => "confinement-feeding-record",
            EntityType::AuditLog => "audit-log",
            EntityType::User => "user",
            EntityType::Settings => "settings",
            EntityType::RolePermission => "role-permission",
            EntityType::NotificationReadMarker => "notification-read-marker",
        }
    }

    /// Remote table that receives this entity's rows
    pub fn remote_table(&self) -> &'static str {
        match self {
            EntityType::Farm => "farms",
            EntityType::Breed => "breeds",
            EntityType::AnimalBirth => "animal_births",
            EntityType::Weaning => "weanings",
            EntityType::Weighing => "weighings",
            EntityType::Vaccination => "vaccinations",
            EntityType::Confinement => "confinements",
            EntityType::ConfinementAnimalLink => "confinement_animals",
            EntityType::ConfinementFeedingRecord => "confinement_feedings",
            EntityType::AuditLog => "audit_logs",
            EntityType::User => "users",
            EntityType::Settings => "settings",
            EntityType::RolePermission => "role_permissions",
            EntityType::NotificationReadMarker => "notification_reads",
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        match self {
            EntityType::User
            | EntityType::Settings
            | EntityType::RolePermission
            | EntityType::NotificationReadMarker => NaturalKey::Id,
            _ => NaturalKey::Uuid,
        }
    }

    /// Dependency stage: rows in a later stage may reference rows in an
    /// earlier one (a confinement link references an animal and a confinement).
    pub fn stage(&self) -> u8 {
        match self {
            EntityType::Farm
            | EntityType::Breed
            | EntityType::User
            | EntityType::Settings
            | EntityType::RolePermission => 0,
            EntityType::AnimalBirth
            | EntityType::Weaning
            | EntityType::Weighing
            | EntityType::Vaccination
            | EntityType::Confinement
            | EntityType::AuditLog
            | EntityType::NotificationReadMarker => 1,
            EntityType::ConfinementAnimalLink | EntityType::ConfinementFeedingRecord => 2,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|entity| entity.as_str() == s)
            .ok_or_else(|| format!("unknown entity type '{}'", s))
    }
}
