//! Core domain logic for the AeroSpectro survey dataset.
//! This crate is the single source of truth for graph integrity invariants.

pub mod auth;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod spectrum;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{
    Area, AreaId, Client, ClientId, EntityRef, Measurement, MeasurementId, NewArea, NewClient,
    NewMeasurement, NewProfile, NewProject, Profile, ProfileId, Project, ProjectId, User, UserId,
};
pub use repo::{BackendError, GraphSnapshot, RemovalPlan, SqliteBackend, StorageBackend};
pub use spectrum::SpectrumError;
pub use store::{
    ChangeEvent, EntityGraphStore, LinkSet, Selection, StoreError, StoreObserver, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
