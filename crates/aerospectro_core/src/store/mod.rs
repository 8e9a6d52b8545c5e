//! Entity-graph store: the single source of truth for all survey entities.
//!
//! # Responsibility
//! - Own the in-memory maps for all six entity collections plus the link set.
//! - Mirror every mutation to the durable backend before touching memory, so
//!   the two representations never diverge after a successful call.
//! - Resolve every cross-reference once at load; a dangling foreign key is a
//!   fatal startup condition, never silently repaired.
//!
//! # Invariants
//! - A failed backend write leaves every in-memory collection unchanged.
//! - Entity ids are assigned monotonically and never reused within a process.
//! - Query iterators read only memory; the backend is read once, at load.

use crate::model::{
    Area, AreaId, Client, ClientId, EntityRef, Measurement, MeasurementId, NewArea, NewClient,
    NewMeasurement, NewProfile, NewProject, Profile, ProfileId, Project, ProjectId, User, UserId,
};
use crate::repo::{BackendError, StorageBackend};
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub mod cascade;
pub mod links;

pub use links::LinkSet;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by entity-graph operations.
#[derive(Debug)]
pub enum StoreError {
    /// Durable write or read failed; the operation had no effect.
    Persistence(BackendError),
    /// A multi-step delete could not complete atomically. Nothing was
    /// removed, in memory or durably. `step` is `None` only when the final
    /// commit itself failed.
    Cascade {
        target: EntityRef,
        step: Option<EntityRef>,
        source: BackendError,
    },
    /// A persisted foreign key points at a row that does not exist. Raised
    /// only at load; indicates corrupted durable state.
    DanglingReference {
        entity: EntityRef,
        missing: EntityRef,
    },
    /// Registration attempted with a username that is already taken.
    DuplicateUsername(String),
    /// The operation referenced an entity this store does not hold.
    UnknownEntity(EntityRef),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistence(err) => write!(f, "{err}"),
            Self::Cascade {
                target,
                step: Some(step),
                source,
            } => write!(f, "cascade delete of {target} failed at {step}: {source}"),
            Self::Cascade {
                target,
                step: None,
                source,
            } => write!(f, "cascade delete of {target} failed to commit: {source}"),
            Self::DanglingReference { entity, missing } => {
                write!(f, "{entity} references missing {missing}")
            }
            Self::DuplicateUsername(username) => {
                write!(f, "username `{username}` is already taken")
            }
            Self::UnknownEntity(entity) => write!(f, "unknown entity {entity}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence(err) => Some(err),
            Self::Cascade { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(value: BackendError) -> Self {
        Self::Persistence(value)
    }
}

/// Mutation notification delivered to subscribed observers after the store's
/// memory has been updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(EntityRef),
    Removed(EntityRef),
    Linked(ProjectId, ProfileId),
    Unlinked(ProjectId, ProfileId),
}

/// Receiver for store change notifications; lets a presentation layer stay
/// in sync without re-querying.
pub trait StoreObserver {
    fn on_change(&mut self, event: &ChangeEvent);
}

/// Currently focused entities, tracked so a cascade can clear a selection
/// that names a just-deleted row as part of the same logical operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub client: Option<ClientId>,
    pub project: Option<ProjectId>,
    pub profile: Option<ProfileId>,
}

/// Last-assigned id per entity type.
#[derive(Debug, Default, Clone, Copy)]
struct IdCounters {
    user: i64,
    client: i64,
    project: i64,
    area: i64,
    profile: i64,
    measurement: i64,
}

/// The entity-graph store. Generic over the durable backend so tests can
/// substitute a failing one.
pub struct EntityGraphStore<B: StorageBackend> {
    backend: B,
    users: BTreeMap<UserId, User>,
    clients: BTreeMap<ClientId, Client>,
    projects: BTreeMap<ProjectId, Project>,
    areas: BTreeMap<AreaId, Area>,
    profiles: BTreeMap<ProfileId, Profile>,
    measurements: BTreeMap<MeasurementId, Measurement>,
    links: LinkSet,
    ids: IdCounters,
    selection: Selection,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl<B: StorageBackend> std::fmt::Debug for EntityGraphStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityGraphStore")
            .field("users", &self.users)
            .field("clients", &self.clients)
            .field("projects", &self.projects)
            .field("areas", &self.areas)
            .field("profiles", &self.profiles)
            .field("measurements", &self.measurements)
            .field("links", &self.links)
            .field("ids", &self.ids)
            .field("selection", &self.selection)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> EntityGraphStore<B> {
    /// Loads the full dataset from the backend and resolves every reference.
    ///
    /// # Errors
    /// - `StoreError::Persistence` when the initial read fails.
    /// - `StoreError::DanglingReference` when any foreign key (including a
    ///   link endpoint) does not resolve.
    pub fn load(backend: B) -> StoreResult<Self> {
        let started_at = Instant::now();
        let snapshot = backend.load_all()?;

        let users: BTreeMap<_, _> = snapshot.users.into_iter().map(|u| (u.id, u)).collect();
        let clients: BTreeMap<_, _> = snapshot.clients.into_iter().map(|c| (c.id, c)).collect();
        let projects: BTreeMap<_, _> = snapshot.projects.into_iter().map(|p| (p.id, p)).collect();
        let areas: BTreeMap<_, _> = snapshot.areas.into_iter().map(|a| (a.id, a)).collect();
        let profiles: BTreeMap<_, _> = snapshot.profiles.into_iter().map(|p| (p.id, p)).collect();
        let measurements: BTreeMap<_, _> = snapshot
            .measurements
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        for client in clients.values() {
            if let Some(user_id) = client.user_id {
                if !users.contains_key(&user_id) {
                    return Err(dangling(EntityRef::Client(client.id), EntityRef::User(user_id)));
                }
            }
        }
        for project in projects.values() {
            if !clients.contains_key(&project.client_id) {
                return Err(dangling(
                    EntityRef::Project(project.id),
                    EntityRef::Client(project.client_id),
                ));
            }
        }
        for area in areas.values() {
            if !projects.contains_key(&area.project_id) {
                return Err(dangling(
                    EntityRef::Area(area.id),
                    EntityRef::Project(area.project_id),
                ));
            }
        }
        for profile in profiles.values() {
            if let Some(area_id) = profile.area_id {
                if !areas.contains_key(&area_id) {
                    return Err(dangling(
                        EntityRef::Profile(profile.id),
                        EntityRef::Area(area_id),
                    ));
                }
            }
        }
        for measurement in measurements.values() {
            if !profiles.contains_key(&measurement.profile_id) {
                return Err(dangling(
                    EntityRef::Measurement(measurement.id),
                    EntityRef::Profile(measurement.profile_id),
                ));
            }
        }
        for (project_id, profile_id) in &snapshot.links {
            let link = EntityRef::Link(*project_id, *profile_id);
            if !projects.contains_key(project_id) {
                return Err(dangling(link, EntityRef::Project(*project_id)));
            }
            if !profiles.contains_key(profile_id) {
                return Err(dangling(link, EntityRef::Profile(*profile_id)));
            }
        }

        let ids = IdCounters {
            user: users.keys().next_back().map_or(0, |id| id.0),
            client: clients.keys().next_back().map_or(0, |id| id.0),
            project: projects.keys().next_back().map_or(0, |id| id.0),
            area: areas.keys().next_back().map_or(0, |id| id.0),
            profile: profiles.keys().next_back().map_or(0, |id| id.0),
            measurement: measurements.keys().next_back().map_or(0, |id| id.0),
        };

        info!(
            "event=store_load module=store status=ok duration_ms={} clients={} projects={} areas={} profiles={} measurements={} links={}",
            started_at.elapsed().as_millis(),
            clients.len(),
            projects.len(),
            areas.len(),
            profiles.len(),
            measurements.len(),
            snapshot.links.len()
        );

        Ok(Self {
            backend,
            users,
            clients,
            projects,
            areas,
            profiles,
            measurements,
            links: LinkSet::from_pairs(snapshot.links),
            ids,
            selection: Selection::default(),
            observers: Vec::new(),
        })
    }

    /// Registers an observer for subsequent change notifications.
    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    /// Read access to the durable backend, for diagnostics and tests.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn emit(&mut self, event: ChangeEvent) {
        for observer in &mut self.observers {
            observer.on_change(&event);
        }
    }

    // ---- add operations -------------------------------------------------

    /// Adds a client: persists first, then mirrors into memory.
    pub fn add_client(&mut self, draft: NewClient) -> StoreResult<ClientId> {
        if let Some(user_id) = draft.user_id {
            self.ensure_user(user_id)?;
        }
        let id = ClientId(self.ids.client + 1);
        let client = Client {
            id,
            user_id: draft.user_id,
            name: draft.name,
            contact_info: draft.contact_info,
        };
        self.backend.insert_client(&client)?;
        self.ids.client = id.0;
        self.clients.insert(id, client);
        self.emit(ChangeEvent::Added(EntityRef::Client(id)));
        Ok(id)
    }

    pub fn add_project(&mut self, draft: NewProject) -> StoreResult<ProjectId> {
        self.ensure_client(draft.client_id)?;
        let id = ProjectId(self.ids.project + 1);
        let project = Project {
            id,
            client_id: draft.client_id,
            name: draft.name,
            contract_number: draft.contract_number,
            start_date: draft.start_date,
            end_date: draft.end_date,
            description: draft.description,
        };
        self.backend.insert_project(&project)?;
        self.ids.project = id.0;
        self.projects.insert(id, project);
        self.emit(ChangeEvent::Added(EntityRef::Project(id)));
        Ok(id)
    }

    pub fn add_area(&mut self, draft: NewArea) -> StoreResult<AreaId> {
        self.ensure_project(draft.project_id)?;
        let id = AreaId(self.ids.area + 1);
        let area = Area {
            id,
            project_id: draft.project_id,
            name: draft.name,
            coordinates: draft.coordinates,
        };
        self.backend.insert_area(&area)?;
        self.ids.area = id.0;
        self.areas.insert(id, area);
        self.emit(ChangeEvent::Added(EntityRef::Area(id)));
        Ok(id)
    }

    pub fn add_profile(&mut self, draft: NewProfile) -> StoreResult<ProfileId> {
        if let Some(area_id) = draft.area_id {
            self.ensure_area(area_id)?;
        }
        let id = ProfileId(self.ids.profile + 1);
        let profile = Profile {
            id,
            area_id: draft.area_id,
            name: draft.name,
            kind: draft.kind,
            start_coordinates: draft.start_coordinates,
            end_coordinates: draft.end_coordinates,
        };
        self.backend.insert_profile(&profile)?;
        self.ids.profile = id.0;
        self.profiles.insert(id, profile);
        self.emit(ChangeEvent::Added(EntityRef::Profile(id)));
        Ok(id)
    }

    pub fn add_measurement(&mut self, draft: NewMeasurement) -> StoreResult<MeasurementId> {
        self.ensure_profile(draft.profile_id)?;
        let id = MeasurementId(self.ids.measurement + 1);
        let measurement = Measurement {
            id,
            profile_id: draft.profile_id,
            timestamp: draft.timestamp,
            latitude: draft.latitude,
            longitude: draft.longitude,
            altitude: draft.altitude,
            gamma_value: draft.gamma_value,
            spectrum_data: draft.spectrum_data,
            spectrum_channels: draft.spectrum_channels,
            spectrum_energy_min: draft.spectrum_energy_min,
            spectrum_energy_max: draft.spectrum_energy_max,
        };
        self.backend.insert_measurement(&measurement)?;
        self.ids.measurement = id.0;
        self.measurements.insert(id, measurement);
        self.emit(ChangeEvent::Added(EntityRef::Measurement(id)));
        Ok(id)
    }

    /// Persists a credential and its linked client as one atomic write.
    ///
    /// Used by the registration collaborator. On any failure neither the
    /// user nor the client collection changes.
    pub fn register_credential(
        &mut self,
        username: &str,
        password_hash: &str,
        contact_info: &str,
    ) -> StoreResult<(UserId, ClientId)> {
        if self.users.values().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }

        let user_id = UserId(self.ids.user + 1);
        let client_id = ClientId(self.ids.client + 1);
        let user = User {
            id: user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        let client = Client {
            id: client_id,
            user_id: Some(user_id),
            name: username.to_string(),
            contact_info: contact_info.to_string(),
        };

        self.backend.insert_user_with_client(&user, &client)?;
        self.ids.user = user_id.0;
        self.ids.client = client_id.0;
        self.users.insert(user_id, user);
        self.clients.insert(client_id, client);
        self.emit(ChangeEvent::Added(EntityRef::User(user_id)));
        self.emit(ChangeEvent::Added(EntityRef::Client(client_id)));
        Ok((user_id, client_id))
    }

    // ---- update operations ----------------------------------------------

    /// Field-replace update: persists the new record, then mirrors it.
    pub fn update_client(&mut self, client: Client) -> StoreResult<()> {
        self.ensure_client(client.id)?;
        if let Some(user_id) = client.user_id {
            self.ensure_user(user_id)?;
        }
        self.backend.update_client(&client)?;
        self.clients.insert(client.id, client);
        Ok(())
    }

    pub fn update_project(&mut self, project: Project) -> StoreResult<()> {
        self.ensure_project(project.id)?;
        self.ensure_client(project.client_id)?;
        self.backend.update_project(&project)?;
        self.projects.insert(project.id, project);
        Ok(())
    }

    pub fn update_area(&mut self, area: Area) -> StoreResult<()> {
        self.ensure_area(area.id)?;
        self.ensure_project(area.project_id)?;
        self.backend.update_area(&area)?;
        self.areas.insert(area.id, area);
        Ok(())
    }

    pub fn update_profile(&mut self, profile: Profile) -> StoreResult<()> {
        self.ensure_profile(profile.id)?;
        if let Some(area_id) = profile.area_id {
            self.ensure_area(area_id)?;
        }
        self.backend.update_profile(&profile)?;
        self.profiles.insert(profile.id, profile);
        Ok(())
    }

    pub fn update_measurement(&mut self, measurement: Measurement) -> StoreResult<()> {
        self.ensure_measurement(measurement.id)?;
        self.ensure_profile(measurement.profile_id)?;
        self.backend.update_measurement(&measurement)?;
        self.measurements.insert(measurement.id, measurement);
        Ok(())
    }

    // ---- link operations -------------------------------------------------

    /// Links a profile to a project. Returns `Ok(false)` (not an error) when
    /// the pair is already linked; the set is left unchanged on failure.
    pub fn link(&mut self, project_id: ProjectId, profile_id: ProfileId) -> StoreResult<bool> {
        self.ensure_project(project_id)?;
        self.ensure_profile(profile_id)?;
        if self.links.contains(project_id, profile_id) {
            return Ok(false);
        }
        self.backend.insert_link(project_id, profile_id)?;
        self.links.insert(project_id, profile_id);
        self.emit(ChangeEvent::Linked(project_id, profile_id));
        Ok(true)
    }

    /// Removes a link if present; `Ok(false)` when it was absent.
    pub fn unlink(&mut self, project_id: ProjectId, profile_id: ProfileId) -> StoreResult<bool> {
        if !self.links.contains(project_id, profile_id) {
            return Ok(false);
        }
        self.backend.delete_link(project_id, profile_id)?;
        self.links.remove(project_id, profile_id);
        self.emit(ChangeEvent::Unlinked(project_id, profile_id));
        Ok(true)
    }

    /// The link relation itself, for membership tests and raw iteration.
    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    // ---- lookups and lazy views -----------------------------------------

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.get(&id)
    }

    pub fn profile(&self, id: ProfileId) -> Option<&Profile> {
        self.profiles.get(&id)
    }

    pub fn measurement(&self, id: MeasurementId) -> Option<&Measurement> {
        self.measurements.get(&id)
    }

    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username == username)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn areas(&self) -> impl Iterator<Item = &Area> {
        self.areas.values()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.values()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Projects owned by one client, computed fresh from current state.
    pub fn projects_of_client(&self, client_id: ClientId) -> impl Iterator<Item = &Project> {
        self.projects
            .values()
            .filter(move |p| p.client_id == client_id)
    }

    /// Areas owned by one project.
    pub fn areas_of_project(&self, project_id: ProjectId) -> impl Iterator<Item = &Area> {
        self.areas
            .values()
            .filter(move |a| a.project_id == project_id)
    }

    /// Profiles structurally owned by one area.
    pub fn profiles_of_area(&self, area_id: AreaId) -> impl Iterator<Item = &Profile> {
        self.profiles
            .values()
            .filter(move |p| p.area_id == Some(area_id))
    }

    /// Measurements owned by one profile.
    pub fn measurements_of_profile(
        &self,
        profile_id: ProfileId,
    ) -> impl Iterator<Item = &Measurement> {
        self.measurements
            .values()
            .filter(move |m| m.profile_id == profile_id)
    }

    /// Profiles linked to a project through the join relation.
    pub fn profiles_linked_to_project(
        &self,
        project_id: ProjectId,
    ) -> impl Iterator<Item = &Profile> {
        self.links
            .profiles_for(project_id)
            .filter_map(move |id| self.profiles.get(&id))
    }

    /// Projects linked to a profile through the join relation.
    pub fn projects_linked_to_profile(
        &self,
        profile_id: ProfileId,
    ) -> impl Iterator<Item = &Project> {
        self.links
            .projects_for(profile_id)
            .filter_map(move |id| self.projects.get(&id))
    }

    // ---- selection -------------------------------------------------------

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn select_client(&mut self, id: Option<ClientId>) -> StoreResult<()> {
        if let Some(id) = id {
            self.ensure_client(id)?;
        }
        self.selection.client = id;
        Ok(())
    }

    pub fn select_project(&mut self, id: Option<ProjectId>) -> StoreResult<()> {
        if let Some(id) = id {
            self.ensure_project(id)?;
        }
        self.selection.project = id;
        Ok(())
    }

    pub fn select_profile(&mut self, id: Option<ProfileId>) -> StoreResult<()> {
        if let Some(id) = id {
            self.ensure_profile(id)?;
        }
        self.selection.profile = id;
        Ok(())
    }

    // ---- existence guards ------------------------------------------------

    fn ensure_user(&self, id: UserId) -> StoreResult<()> {
        if !self.users.contains_key(&id) {
            return Err(StoreError::UnknownEntity(EntityRef::User(id)));
        }
        Ok(())
    }

    fn ensure_client(&self, id: ClientId) -> StoreResult<()> {
        if !self.clients.contains_key(&id) {
            return Err(StoreError::UnknownEntity(EntityRef::Client(id)));
        }
        Ok(())
    }

    fn ensure_project(&self, id: ProjectId) -> StoreResult<()> {
        if !self.projects.contains_key(&id) {
            return Err(StoreError::UnknownEntity(EntityRef::Project(id)));
        }
        Ok(())
    }

    fn ensure_area(&self, id: AreaId) -> StoreResult<()> {
        if !self.areas.contains_key(&id) {
            return Err(StoreError::UnknownEntity(EntityRef::Area(id)));
        }
        Ok(())
    }

    fn ensure_profile(&self, id: ProfileId) -> StoreResult<()> {
        if !self.profiles.contains_key(&id) {
            return Err(StoreError::UnknownEntity(EntityRef::Profile(id)));
        }
        Ok(())
    }

    fn ensure_measurement(&self, id: MeasurementId) -> StoreResult<()> {
        if !self.measurements.contains_key(&id) {
            return Err(StoreError::UnknownEntity(EntityRef::Measurement(id)));
        }
        Ok(())
    }
}

fn dangling(entity: EntityRef, missing: EntityRef) -> StoreError {
    StoreError::DanglingReference { entity, missing }
}
