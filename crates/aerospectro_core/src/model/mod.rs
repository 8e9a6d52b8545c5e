//! Survey domain models.
//!
//! # Responsibility
//! - Define the entity records for the five-level survey hierarchy and the
//!   project/profile join relation.
//! - Keep relationships as plain identity values (no back-pointers).
//!
//! # Invariants
//! - Identifiers are opaque and assigned only by the entity-graph store.
//! - A record never embeds another record; navigation happens by id lookup.

pub mod entity;
pub mod ids;

pub use entity::{
    Area, Client, EntityRef, Measurement, NewArea, NewClient, NewMeasurement, NewProfile,
    NewProject, Profile, Project, User,
};
pub use ids::{AreaId, ClientId, MeasurementId, ProfileId, ProjectId, UserId};
