//! Durable storage contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the backend contract the entity-graph store mirrors every
//!   mutation through.
//! - Isolate SQL details from graph/cascade orchestration.
//!
//! # Invariants
//! - `apply_removals` executes a whole removal plan atomically: either every
//!   row in the plan is gone afterwards or none are.
//! - Backends return semantic errors (`NotFound`) in addition to transport
//!   errors, instead of silently ignoring missing rows.

use crate::db::DbError;
use crate::model::{
    Area, AreaId, Client, ClientId, EntityRef, Measurement, MeasurementId, Profile, ProfileId,
    Project, ProjectId, User,
};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite;

pub use sqlite::SqliteBackend;

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors from durable-store operations.
#[derive(Debug)]
pub enum BackendError {
    /// Underlying SQLite or bootstrap failure.
    Db(DbError),
    /// A row the in-memory state says exists is missing durably. Indicates
    /// divergence and always aborts the enclosing operation.
    NotFound(EntityRef),
    /// Persisted data cannot be converted into a valid record.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// A required table is missing from the connection.
    MissingRequiredTable { table: &'static str },
    /// A required table exists but lacks one of its required columns.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(entity) => write!(f, "no durable row for {entity}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "storage backend requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable { table } => {
                write!(f, "storage backend requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "storage backend requires column `{table}.{column}`")
            }
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Failure while executing a removal plan.
///
/// Either one deletion step failed (the transaction was rolled back) or the
/// final commit itself failed. The step reference lets the caller report
/// exactly where a cascade stopped.
#[derive(Debug)]
pub enum RemovalError {
    Step {
        step: EntityRef,
        source: BackendError,
    },
    Commit(BackendError),
}

impl Display for RemovalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step { step, source } => write!(f, "removal of {step} failed: {source}"),
            Self::Commit(source) => write!(f, "removal commit failed: {source}"),
        }
    }
}

impl Error for RemovalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Step { source, .. } => Some(source),
            Self::Commit(source) => Some(source),
        }
    }
}

/// Full dataset read once at store startup.
///
/// Rows come back ordered by id so reference resolution and error reporting
/// are deterministic.
#[derive(Debug, Default)]
pub struct GraphSnapshot {
    pub users: Vec<User>,
    pub clients: Vec<Client>,
    pub projects: Vec<Project>,
    pub areas: Vec<Area>,
    pub profiles: Vec<Profile>,
    pub measurements: Vec<Measurement>,
    pub links: Vec<(ProjectId, ProfileId)>,
}

/// Set of rows one cascade will remove, grouped by table.
///
/// Execution order is leaf-first (measurements, links, profiles, areas,
/// projects, clients) so foreign-key constraints hold at every intermediate
/// point of the transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    pub measurements: Vec<MeasurementId>,
    pub links: Vec<(ProjectId, ProfileId)>,
    pub profiles: Vec<ProfileId>,
    pub areas: Vec<AreaId>,
    pub projects: Vec<ProjectId>,
    pub clients: Vec<ClientId>,
}

impl RemovalPlan {
    /// Records a link pair once, even when both of its endpoints contribute
    /// it to the same cascade.
    pub fn push_link(&mut self, pair: (ProjectId, ProfileId)) {
        if !self.links.contains(&pair) {
            self.links.push(pair);
        }
    }

    /// Total number of rows this plan removes.
    pub fn row_count(&self) -> usize {
        self.measurements.len()
            + self.links.len()
            + self.profiles.len()
            + self.areas.len()
            + self.projects.len()
            + self.clients.len()
    }
}

/// Contract between the entity-graph store and its durable backing store.
///
/// The store is the only caller. Every mutating method must be durable when
/// it returns `Ok`; `insert_user_with_client` and `apply_removals` are the
/// two multi-row operations and must be atomic.
pub trait StorageBackend {
    fn load_all(&self) -> BackendResult<GraphSnapshot>;

    fn insert_client(&mut self, client: &Client) -> BackendResult<()>;
    fn update_client(&mut self, client: &Client) -> BackendResult<()>;

    fn insert_project(&mut self, project: &Project) -> BackendResult<()>;
    fn update_project(&mut self, project: &Project) -> BackendResult<()>;

    fn insert_area(&mut self, area: &Area) -> BackendResult<()>;
    fn update_area(&mut self, area: &Area) -> BackendResult<()>;

    fn insert_profile(&mut self, profile: &Profile) -> BackendResult<()>;
    fn update_profile(&mut self, profile: &Profile) -> BackendResult<()>;

    fn insert_measurement(&mut self, measurement: &Measurement) -> BackendResult<()>;
    fn update_measurement(&mut self, measurement: &Measurement) -> BackendResult<()>;

    fn insert_link(&mut self, project_id: ProjectId, profile_id: ProfileId) -> BackendResult<()>;
    fn delete_link(&mut self, project_id: ProjectId, profile_id: ProfileId) -> BackendResult<()>;

    /// Persists a credential and its linked client as one atomic write.
    fn insert_user_with_client(&mut self, user: &User, client: &Client) -> BackendResult<()>;

    /// Removes every row in the plan inside one transaction.
    fn apply_removals(&mut self, plan: &RemovalPlan) -> Result<(), RemovalError>;
}
