//! Shared fixtures for integration tests: draft builders, a change-event
//! recorder and a backend wrapper with injectable write failures.
#![allow(dead_code)]

use aerospectro_core::model::{
    Area, AreaId, Client, ClientId, Measurement, NewArea, NewClient, NewMeasurement, NewProfile,
    NewProject, Profile, ProfileId, Project, ProjectId, User,
};
use aerospectro_core::repo::{
    BackendError, BackendResult, GraphSnapshot, RemovalError, RemovalPlan, StorageBackend,
};
use aerospectro_core::store::{ChangeEvent, StoreObserver};
use aerospectro_core::SqliteBackend;
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub fn client_draft(name: &str) -> NewClient {
    NewClient {
        user_id: None,
        name: name.to_string(),
        contact_info: "info@example.com".to_string(),
    }
}

pub fn project_draft(client_id: ClientId, name: &str) -> NewProject {
    NewProject {
        client_id,
        name: name.to_string(),
        contract_number: "C-100".to_string(),
        start_date: 1_700_000_000_000,
        end_date: 1_702_592_000_000,
        description: "survey contract".to_string(),
    }
}

pub fn area_draft(project_id: ProjectId, name: &str) -> NewArea {
    NewArea {
        project_id,
        name: name.to_string(),
        coordinates: "55.75,37.61".to_string(),
    }
}

pub fn profile_draft(area_id: Option<AreaId>, name: &str) -> NewProfile {
    NewProfile {
        area_id,
        name: name.to_string(),
        kind: "gamma".to_string(),
        start_coordinates: "0,0".to_string(),
        end_coordinates: "1,1".to_string(),
    }
}

pub fn measurement_draft(profile_id: ProfileId) -> NewMeasurement {
    NewMeasurement {
        profile_id,
        timestamp: 1_700_000_100_000,
        latitude: 55.7558,
        longitude: 37.6173,
        altitude: 300.0,
        gamma_value: 150.0,
        spectrum_data: "1,2,3,4".to_string(),
        spectrum_channels: 4,
        spectrum_energy_min: 0.0,
        spectrum_energy_max: 100.0,
    }
}

/// Observer that records every change event for later assertions.
pub struct EventRecorder {
    events: Rc<RefCell<Vec<ChangeEvent>>>,
}

impl EventRecorder {
    pub fn new() -> (Self, Rc<RefCell<Vec<ChangeEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                events: Rc::clone(&events),
            },
            events,
        )
    }
}

impl StoreObserver for EventRecorder {
    fn on_change(&mut self, event: &ChangeEvent) {
        self.events.borrow_mut().push(*event);
    }
}

/// Backend wrapper that can be switched into a failing mode to exercise the
/// no-partial-effect contracts.
pub struct FlakyBackend {
    inner: SqliteBackend,
    fail_writes: Rc<Cell<bool>>,
}

impl FlakyBackend {
    pub fn new(inner: SqliteBackend) -> (Self, Rc<Cell<bool>>) {
        let fail_writes = Rc::new(Cell::new(false));
        (
            Self {
                inner,
                fail_writes: Rc::clone(&fail_writes),
            },
            fail_writes,
        )
    }

    pub fn connection(&self) -> &Connection {
        self.inner.connection()
    }

    fn check(&self) -> BackendResult<()> {
        if self.fail_writes.get() {
            return Err(BackendError::InvalidData(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl StorageBackend for FlakyBackend {
    fn load_all(&self) -> BackendResult<GraphSnapshot> {
        self.inner.load_all()
    }

    fn insert_client(&mut self, client: &Client) -> BackendResult<()> {
        self.check()?;
        self.inner.insert_client(client)
    }

    fn update_client(&mut self, client: &Client) -> BackendResult<()> {
        self.check()?;
        self.inner.update_client(client)
    }

    fn insert_project(&mut self, project: &Project) -> BackendResult<()> {
        self.check()?;
        self.inner.insert_project(project)
    }

    fn update_project(&mut self, project: &Project) -> BackendResult<()> {
        self.check()?;
        self.inner.update_project(project)
    }

    fn insert_area(&mut self, area: &Area) -> BackendResult<()> {
        self.check()?;
        self.inner.insert_area(area)
    }

    fn update_area(&mut self, area: &Area) -> BackendResult<()> {
        self.check()?;
        self.inner.update_area(area)
    }

    fn insert_profile(&mut self, profile: &Profile) -> BackendResult<()> {
        self.check()?;
        self.inner.insert_profile(profile)
    }

    fn update_profile(&mut self, profile: &Profile) -> BackendResult<()> {
        self.check()?;
        self.inner.update_profile(profile)
    }

    fn insert_measurement(&mut self, measurement: &Measurement) -> BackendResult<()> {
        self.check()?;
        self.inner.insert_measurement(measurement)
    }

    fn update_measurement(&mut self, measurement: &Measurement) -> BackendResult<()> {
        self.check()?;
        self.inner.update_measurement(measurement)
    }

    fn insert_link(&mut self, project_id: ProjectId, profile_id: ProfileId) -> BackendResult<()> {
        self.check()?;
        self.inner.insert_link(project_id, profile_id)
    }

    fn delete_link(&mut self, project_id: ProjectId, profile_id: ProfileId) -> BackendResult<()> {
        self.check()?;
        self.inner.delete_link(project_id, profile_id)
    }

    fn insert_user_with_client(&mut self, user: &User, client: &Client) -> BackendResult<()> {
        self.check()?;
        self.inner.insert_user_with_client(user, client)
    }

    fn apply_removals(&mut self, plan: &RemovalPlan) -> Result<(), RemovalError> {
        self.check().map_err(RemovalError::Commit)?;
        self.inner.apply_removals(plan)
    }
}

/// Convenience constructor for a store over a fresh in-memory database.
pub fn in_memory_store() -> aerospectro_core::EntityGraphStore<SqliteBackend> {
    let backend = SqliteBackend::open_in_memory().expect("in-memory backend should open");
    aerospectro_core::EntityGraphStore::load(backend).expect("empty store should load")
}

/// Counts rows of one table through the backend connection.
pub fn table_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .expect("count query should succeed")
}
