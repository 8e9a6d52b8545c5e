//! SQLite implementation of the storage backend contract.
//!
//! # Responsibility
//! - Own the connection and keep every survey SQL statement in one place.
//! - Execute removal plans and registration writes transactionally.
//!
//! # Invariants
//! - Connections are rejected when their schema is not fully migrated or
//!   lacks a required table or column.
//! - A delete touching zero rows aborts the transaction: the in-memory state
//!   and the database have diverged, and masking that would corrupt further.

use crate::db::migrations::latest_version;
use crate::db::{open_db, open_db_in_memory};
use crate::model::{
    Area, AreaId, Client, ClientId, EntityRef, Measurement, MeasurementId, Profile, ProfileId,
    Project, ProjectId, User, UserId,
};
use crate::repo::{
    BackendError, BackendResult, GraphSnapshot, RemovalError, RemovalPlan, StorageBackend,
};
use rusqlite::{params, Connection, Row, Transaction};
use std::path::Path;

const REQUIRED_TABLES: &[(&str, &[&str])] = &[
    ("users", &["user_id", "username", "password_hash"]),
    ("clients", &["client_id", "user_id", "name", "contact_info"]),
    (
        "projects",
        &[
            "project_id",
            "client_id",
            "name",
            "contract_number",
            "start_date",
            "end_date",
            "description",
        ],
    ),
    ("areas", &["area_id", "project_id", "name", "coordinates"]),
    (
        "profiles",
        &[
            "profile_id",
            "area_id",
            "name",
            "kind",
            "start_coordinates",
            "end_coordinates",
        ],
    ),
    (
        "measurements",
        &[
            "measurement_id",
            "profile_id",
            "timestamp",
            "latitude",
            "longitude",
            "altitude",
            "gamma_value",
            "spectrum_data",
            "spectrum_channels",
            "spectrum_energy_min",
            "spectrum_energy_max",
        ],
    ),
    ("project_profiles", &["project_id", "profile_id"]),
];

/// SQLite-backed durable store.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Wraps an already-opened connection after verifying its schema.
    pub fn try_new(conn: Connection) -> BackendResult<Self> {
        verify_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens an in-memory database, mainly for tests and scratch sessions.
    pub fn open_in_memory() -> BackendResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Read access to the underlying connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn verify_schema(conn: &Connection) -> BackendResult<()> {
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(BackendError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in REQUIRED_TABLES {
        let present: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table],
            |row| row.get(0),
        )?;
        if !present {
            return Err(BackendError::MissingRequiredTable { table });
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(BackendError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> BackendResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get("name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

impl StorageBackend for SqliteBackend {
    fn load_all(&self) -> BackendResult<GraphSnapshot> {
        Ok(GraphSnapshot {
            users: self.load_users()?,
            clients: self.load_clients()?,
            projects: self.load_projects()?,
            areas: self.load_areas()?,
            profiles: self.load_profiles()?,
            measurements: self.load_measurements()?,
            links: self.load_links()?,
        })
    }

    fn insert_client(&mut self, client: &Client) -> BackendResult<()> {
        self.conn.execute(
            "INSERT INTO clients (client_id, user_id, name, contact_info)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                client.id.0,
                client.user_id.map(|id| id.0),
                client.name,
                client.contact_info,
            ],
        )?;
        Ok(())
    }

    fn update_client(&mut self, client: &Client) -> BackendResult<()> {
        let changed = self.conn.execute(
            "UPDATE clients SET user_id = ?2, name = ?3, contact_info = ?4
             WHERE client_id = ?1;",
            params![
                client.id.0,
                client.user_id.map(|id| id.0),
                client.name,
                client.contact_info,
            ],
        )?;
        expect_changed(changed, EntityRef::Client(client.id))
    }

    fn insert_project(&mut self, project: &Project) -> BackendResult<()> {
        self.conn.execute(
            "INSERT INTO projects
                (project_id, client_id, name, contract_number, start_date, end_date, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                project.id.0,
                project.client_id.0,
                project.name,
                project.contract_number,
                project.start_date,
                project.end_date,
                project.description,
            ],
        )?;
        Ok(())
    }

    fn update_project(&mut self, project: &Project) -> BackendResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects
             SET client_id = ?2, name = ?3, contract_number = ?4,
                 start_date = ?5, end_date = ?6, description = ?7
             WHERE project_id = ?1;",
            params![
                project.id.0,
                project.client_id.0,
                project.name,
                project.contract_number,
                project.start_date,
                project.end_date,
                project.description,
            ],
        )?;
        expect_changed(changed, EntityRef::Project(project.id))
    }

    fn insert_area(&mut self, area: &Area) -> BackendResult<()> {
        self.conn.execute(
            "INSERT INTO areas (area_id, project_id, name, coordinates)
             VALUES (?1, ?2, ?3, ?4);",
            params![area.id.0, area.project_id.0, area.name, area.coordinates],
        )?;
        Ok(())
    }

    fn update_area(&mut self, area: &Area) -> BackendResult<()> {
        let changed = self.conn.execute(
            "UPDATE areas SET project_id = ?2, name = ?3, coordinates = ?4
             WHERE area_id = ?1;",
            params![area.id.0, area.project_id.0, area.name, area.coordinates],
        )?;
        expect_changed(changed, EntityRef::Area(area.id))
    }

    fn insert_profile(&mut self, profile: &Profile) -> BackendResult<()> {
        self.conn.execute(
            "INSERT INTO profiles
                (profile_id, area_id, name, kind, start_coordinates, end_coordinates)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                profile.id.0,
                profile.area_id.map(|id| id.0),
                profile.name,
                profile.kind,
                profile.start_coordinates,
                profile.end_coordinates,
            ],
        )?;
        Ok(())
    }

    fn update_profile(&mut self, profile: &Profile) -> BackendResult<()> {
        let changed = self.conn.execute(
            "UPDATE profiles
             SET area_id = ?2, name = ?3, kind = ?4,
                 start_coordinates = ?5, end_coordinates = ?6
             WHERE profile_id = ?1;",
            params![
                profile.id.0,
                profile.area_id.map(|id| id.0),
                profile.name,
                profile.kind,
                profile.start_coordinates,
                profile.end_coordinates,
            ],
        )?;
        expect_changed(changed, EntityRef::Profile(profile.id))
    }

    fn insert_measurement(&mut self, measurement: &Measurement) -> BackendResult<()> {
        self.conn.execute(
            "INSERT INTO measurements
                (measurement_id, profile_id, timestamp, latitude, longitude, altitude,
                 gamma_value, spectrum_data, spectrum_channels,
                 spectrum_energy_min, spectrum_energy_max)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                measurement.id.0,
                measurement.profile_id.0,
                measurement.timestamp,
                measurement.latitude,
                measurement.longitude,
                measurement.altitude,
                measurement.gamma_value,
                measurement.spectrum_data,
                measurement.spectrum_channels,
                measurement.spectrum_energy_min,
                measurement.spectrum_energy_max,
            ],
        )?;
        Ok(())
    }

    fn update_measurement(&mut self, measurement: &Measurement) -> BackendResult<()> {
        let changed = self.conn.execute(
            "UPDATE measurements
             SET profile_id = ?2, timestamp = ?3, latitude = ?4, longitude = ?5,
                 altitude = ?6, gamma_value = ?7, spectrum_data = ?8,
                 spectrum_channels = ?9, spectrum_energy_min = ?10, spectrum_energy_max = ?11
             WHERE measurement_id = ?1;",
            params![
                measurement.id.0,
                measurement.profile_id.0,
                measurement.timestamp,
                measurement.latitude,
                measurement.longitude,
                measurement.altitude,
                measurement.gamma_value,
                measurement.spectrum_data,
                measurement.spectrum_channels,
                measurement.spectrum_energy_min,
                measurement.spectrum_energy_max,
            ],
        )?;
        expect_changed(changed, EntityRef::Measurement(measurement.id))
    }

    fn insert_link(&mut self, project_id: ProjectId, profile_id: ProfileId) -> BackendResult<()> {
        self.conn.execute(
            "INSERT INTO project_profiles (project_id, profile_id) VALUES (?1, ?2);",
            params![project_id.0, profile_id.0],
        )?;
        Ok(())
    }

    fn delete_link(&mut self, project_id: ProjectId, profile_id: ProfileId) -> BackendResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM project_profiles WHERE project_id = ?1 AND profile_id = ?2;",
            params![project_id.0, profile_id.0],
        )?;
        expect_changed(changed, EntityRef::Link(project_id, profile_id))
    }

    fn insert_user_with_client(&mut self, user: &User, client: &Client) -> BackendResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO users (user_id, username, password_hash) VALUES (?1, ?2, ?3);",
            params![user.id.0, user.username, user.password_hash],
        )?;
        tx.execute(
            "INSERT INTO clients (client_id, user_id, name, contact_info)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                client.id.0,
                client.user_id.map(|id| id.0),
                client.name,
                client.contact_info,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn apply_removals(&mut self, plan: &RemovalPlan) -> Result<(), RemovalError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| RemovalError::Commit(err.into()))?;

        for id in &plan.measurements {
            delete_by_id(
                &tx,
                "DELETE FROM measurements WHERE measurement_id = ?1;",
                id.0,
                EntityRef::Measurement(*id),
            )?;
        }
        for (project_id, profile_id) in &plan.links {
            let step = EntityRef::Link(*project_id, *profile_id);
            let changed = tx
                .execute(
                    "DELETE FROM project_profiles WHERE project_id = ?1 AND profile_id = ?2;",
                    params![project_id.0, profile_id.0],
                )
                .map_err(|err| RemovalError::Step {
                    step,
                    source: err.into(),
                })?;
            if changed == 0 {
                return Err(RemovalError::Step {
                    step,
                    source: BackendError::NotFound(step),
                });
            }
        }
        for id in &plan.profiles {
            delete_by_id(
                &tx,
                "DELETE FROM profiles WHERE profile_id = ?1;",
                id.0,
                EntityRef::Profile(*id),
            )?;
        }
        for id in &plan.areas {
            delete_by_id(
                &tx,
                "DELETE FROM areas WHERE area_id = ?1;",
                id.0,
                EntityRef::Area(*id),
            )?;
        }
        for id in &plan.projects {
            delete_by_id(
                &tx,
                "DELETE FROM projects WHERE project_id = ?1;",
                id.0,
                EntityRef::Project(*id),
            )?;
        }
        for id in &plan.clients {
            delete_by_id(
                &tx,
                "DELETE FROM clients WHERE client_id = ?1;",
                id.0,
                EntityRef::Client(*id),
            )?;
        }

        tx.commit().map_err(|err| RemovalError::Commit(err.into()))
    }
}

fn delete_by_id(
    tx: &Transaction<'_>,
    sql: &str,
    id: i64,
    step: EntityRef,
) -> Result<(), RemovalError> {
    let changed = tx.execute(sql, [id]).map_err(|err| RemovalError::Step {
        step,
        source: err.into(),
    })?;
    if changed == 0 {
        return Err(RemovalError::Step {
            step,
            source: BackendError::NotFound(step),
        });
    }
    Ok(())
}

fn expect_changed(changed: usize, entity: EntityRef) -> BackendResult<()> {
    if changed == 0 {
        return Err(BackendError::NotFound(entity));
    }
    Ok(())
}

impl SqliteBackend {
    fn load_users(&self) -> BackendResult<Vec<User>> {
        self.load_rows(
            "SELECT user_id, username, password_hash FROM users ORDER BY user_id;",
            parse_user_row,
        )
    }

    fn load_clients(&self) -> BackendResult<Vec<Client>> {
        self.load_rows(
            "SELECT client_id, user_id, name, contact_info FROM clients ORDER BY client_id;",
            parse_client_row,
        )
    }

    fn load_projects(&self) -> BackendResult<Vec<Project>> {
        self.load_rows(
            "SELECT project_id, client_id, name, contract_number, start_date, end_date, description
             FROM projects ORDER BY project_id;",
            parse_project_row,
        )
    }

    fn load_areas(&self) -> BackendResult<Vec<Area>> {
        self.load_rows(
            "SELECT area_id, project_id, name, coordinates FROM areas ORDER BY area_id;",
            parse_area_row,
        )
    }

    fn load_profiles(&self) -> BackendResult<Vec<Profile>> {
        self.load_rows(
            "SELECT profile_id, area_id, name, kind, start_coordinates, end_coordinates
             FROM profiles ORDER BY profile_id;",
            parse_profile_row,
        )
    }

    fn load_measurements(&self) -> BackendResult<Vec<Measurement>> {
        self.load_rows(
            "SELECT measurement_id, profile_id, timestamp, latitude, longitude, altitude,
                    gamma_value, spectrum_data, spectrum_channels,
                    spectrum_energy_min, spectrum_energy_max
             FROM measurements ORDER BY measurement_id;",
            parse_measurement_row,
        )
    }

    fn load_links(&self) -> BackendResult<Vec<(ProjectId, ProfileId)>> {
        self.load_rows(
            "SELECT project_id, profile_id FROM project_profiles
             ORDER BY project_id, profile_id;",
            |row| {
                Ok((
                    ProjectId(row.get("project_id")?),
                    ProfileId(row.get("profile_id")?),
                ))
            },
        )
    }

    fn load_rows<T>(
        &self,
        sql: &str,
        parse: impl Fn(&Row<'_>) -> BackendResult<T>,
    ) -> BackendResult<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse(row)?);
        }
        Ok(items)
    }
}

fn parse_user_row(row: &Row<'_>) -> BackendResult<User> {
    Ok(User {
        id: UserId(row.get("user_id")?),
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
    })
}

fn parse_client_row(row: &Row<'_>) -> BackendResult<Client> {
    Ok(Client {
        id: ClientId(row.get("client_id")?),
        user_id: row.get::<_, Option<i64>>("user_id")?.map(UserId),
        name: row.get("name")?,
        contact_info: row.get("contact_info")?,
    })
}

fn parse_project_row(row: &Row<'_>) -> BackendResult<Project> {
    Ok(Project {
        id: ProjectId(row.get("project_id")?),
        client_id: ClientId(row.get("client_id")?),
        name: row.get("name")?,
        contract_number: row.get("contract_number")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        description: row.get("description")?,
    })
}

fn parse_area_row(row: &Row<'_>) -> BackendResult<Area> {
    Ok(Area {
        id: AreaId(row.get("area_id")?),
        project_id: ProjectId(row.get("project_id")?),
        name: row.get("name")?,
        coordinates: row.get("coordinates")?,
    })
}

fn parse_profile_row(row: &Row<'_>) -> BackendResult<Profile> {
    Ok(Profile {
        id: ProfileId(row.get("profile_id")?),
        area_id: row.get::<_, Option<i64>>("area_id")?.map(AreaId),
        name: row.get("name")?,
        kind: row.get("kind")?,
        start_coordinates: row.get("start_coordinates")?,
        end_coordinates: row.get("end_coordinates")?,
    })
}

fn parse_measurement_row(row: &Row<'_>) -> BackendResult<Measurement> {
    let channels: i64 = row.get("spectrum_channels")?;
    let spectrum_channels = u32::try_from(channels).map_err(|_| {
        BackendError::InvalidData(format!(
            "negative channel count {channels} in measurements.spectrum_channels"
        ))
    })?;

    Ok(Measurement {
        id: MeasurementId(row.get("measurement_id")?),
        profile_id: ProfileId(row.get("profile_id")?),
        timestamp: row.get("timestamp")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        altitude: row.get("altitude")?,
        gamma_value: row.get("gamma_value")?,
        spectrum_data: row.get("spectrum_data")?,
        spectrum_channels,
        spectrum_energy_min: row.get("spectrum_energy_min")?,
        spectrum_energy_max: row.get("spectrum_energy_max")?,
    })
}
