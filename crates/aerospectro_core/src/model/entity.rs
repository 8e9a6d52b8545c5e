//! Entity records for the survey hierarchy.
//!
//! # Responsibility
//! - Define one plain record per entity level plus the credential record.
//! - Define `New*` drafts used by the store's `add_*` operations.
//!
//! # Invariants
//! - Ownership fields (`client_id`, `project_id`, `profile_id`) are required;
//!   only `Profile::area_id` and `Client::user_id` may be unset.
//! - Spectrum metadata on `Measurement` describes the persisted
//!   `spectrum_data` text; the two must stay consistent per the codec
//!   contract.

use crate::model::ids::{AreaId, ClientId, MeasurementId, ProfileId, ProjectId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Paying customer that owns projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    /// Credential owner, set when the client was created through registration.
    pub user_id: Option<UserId>,
    pub name: String,
    pub contact_info: String,
}

/// Survey contract for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub client_id: ClientId,
    pub name: String,
    pub contract_number: String,
    /// Epoch milliseconds.
    pub start_date: i64,
    /// Epoch milliseconds.
    pub end_date: i64,
    pub description: String,
}

/// Geographic survey area inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub project_id: ProjectId,
    pub name: String,
    pub coordinates: String,
}

/// Flight profile: a line flown over an area.
///
/// The area reference is optional; a profile may be drafted before it is
/// assigned to an area. Project membership is tracked separately through the
/// link set, not through `area_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub area_id: Option<AreaId>,
    pub name: String,
    pub kind: String,
    pub start_coordinates: String,
    pub end_coordinates: String,
}

/// One airborne reading on a profile: position, gamma dose and the raw
/// spectrum payload as persisted text plus its declared channel count and
/// energy window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    pub profile_id: ProfileId,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub gamma_value: f64,
    /// Comma-separated decimal samples; decoded via the spectrum codec.
    pub spectrum_data: String,
    pub spectrum_channels: u32,
    pub spectrum_energy_min: f64,
    pub spectrum_energy_max: f64,
}

/// Login credential. `username` is globally unique, case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

/// Draft for `add_client`.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub user_id: Option<UserId>,
    pub name: String,
    pub contact_info: String,
}

/// Draft for `add_project`.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub client_id: ClientId,
    pub name: String,
    pub contract_number: String,
    pub start_date: i64,
    pub end_date: i64,
    pub description: String,
}

/// Draft for `add_area`.
#[derive(Debug, Clone)]
pub struct NewArea {
    pub project_id: ProjectId,
    pub name: String,
    pub coordinates: String,
}

/// Draft for `add_profile`.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub area_id: Option<AreaId>,
    pub name: String,
    pub kind: String,
    pub start_coordinates: String,
    pub end_coordinates: String,
}

/// Draft for `add_measurement`.
#[derive(Debug, Clone)]
pub struct NewMeasurement {
    pub profile_id: ProfileId,
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub gamma_value: f64,
    pub spectrum_data: String,
    pub spectrum_channels: u32,
    pub spectrum_energy_min: f64,
    pub spectrum_energy_max: f64,
}

/// Typed reference to any entity in the graph.
///
/// Used for change notification, dangling-reference reports and cascade step
/// attribution, where the receiver needs to know both the kind and identity
/// of the row in question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Client(ClientId),
    Project(ProjectId),
    Area(AreaId),
    Profile(ProfileId),
    Measurement(MeasurementId),
    User(UserId),
    /// The join row identified by its unordered endpoint pair.
    Link(ProjectId, ProfileId),
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(id) => write!(f, "{id}"),
            Self::Project(id) => write!(f, "{id}"),
            Self::Area(id) => write!(f, "{id}"),
            Self::Profile(id) => write!(f, "{id}"),
            Self::Measurement(id) => write!(f, "{id}"),
            Self::User(id) => write!(f, "{id}"),
            Self::Link(project_id, profile_id) => write!(f, "link:{}:{}", project_id.0, profile_id.0),
        }
    }
}
