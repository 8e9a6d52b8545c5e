//! Cascade deletion across the hierarchy and the link set.
//!
//! # Responsibility
//! - Plan the full transitive closure of rows depending on a deleted entity.
//! - Execute the plan as one atomic unit and only then prune memory.
//!
//! # Invariants
//! - Either every dependent row and the target are removed, or none are; a
//!   failed step leaves memory and durable state exactly as before.
//! - Plans are built leaf-first and deduplicate link pairs reachable through
//!   both of their endpoints.
//! - A selection naming a deleted entity is cleared in the same operation.

use crate::model::{AreaId, ClientId, EntityRef, MeasurementId, ProfileId, ProjectId};
use crate::repo::{RemovalError, RemovalPlan, StorageBackend};
use crate::store::{ChangeEvent, EntityGraphStore, StoreError, StoreResult};
use log::info;

impl<B: StorageBackend> EntityGraphStore<B> {
    /// Deletes a client, all its projects and everything below them.
    pub fn delete_client(&mut self, id: ClientId) -> StoreResult<()> {
        self.ensure_client(id)?;
        let mut plan = RemovalPlan::default();
        self.collect_client(id, &mut plan);
        self.execute_cascade(EntityRef::Client(id), plan)
    }

    /// Deletes a project, its areas (and their profiles and measurements)
    /// and every link referencing the project.
    pub fn delete_project(&mut self, id: ProjectId) -> StoreResult<()> {
        self.ensure_project(id)?;
        let mut plan = RemovalPlan::default();
        self.collect_project(id, &mut plan);
        self.execute_cascade(EntityRef::Project(id), plan)
    }

    /// Deletes an area and every profile it owns, including each profile's
    /// measurements and cross-project links.
    pub fn delete_area(&mut self, id: AreaId) -> StoreResult<()> {
        self.ensure_area(id)?;
        let mut plan = RemovalPlan::default();
        self.collect_area(id, &mut plan);
        self.execute_cascade(EntityRef::Area(id), plan)
    }

    /// Deletes a profile, its measurements and every link referencing it.
    pub fn delete_profile(&mut self, id: ProfileId) -> StoreResult<()> {
        self.ensure_profile(id)?;
        let mut plan = RemovalPlan::default();
        self.collect_profile(id, &mut plan);
        self.execute_cascade(EntityRef::Profile(id), plan)
    }

    /// Deletes a single measurement (leaf, no dependents).
    pub fn delete_measurement(&mut self, id: MeasurementId) -> StoreResult<()> {
        self.ensure_measurement(id)?;
        let mut plan = RemovalPlan::default();
        plan.measurements.push(id);
        self.execute_cascade(EntityRef::Measurement(id), plan)
    }

    // ---- plan construction ----------------------------------------------

    fn collect_client(&self, id: ClientId, plan: &mut RemovalPlan) {
        let project_ids: Vec<_> = self.projects_of_client(id).map(|p| p.id).collect();
        for project_id in project_ids {
            self.collect_project(project_id, plan);
        }
        plan.clients.push(id);
    }

    fn collect_project(&self, id: ProjectId, plan: &mut RemovalPlan) {
        let area_ids: Vec<_> = self.areas_of_project(id).map(|a| a.id).collect();
        for area_id in area_ids {
            self.collect_area(area_id, plan);
        }
        // Links for the project itself; pairs already gathered through a
        // deleted profile are skipped by push_link.
        for pair in self.links().pairs_for_project(id) {
            plan.push_link(pair);
        }
        plan.projects.push(id);
    }

    fn collect_area(&self, id: AreaId, plan: &mut RemovalPlan) {
        let profile_ids: Vec<_> = self.profiles_of_area(id).map(|p| p.id).collect();
        for profile_id in profile_ids {
            self.collect_profile(profile_id, plan);
        }
        plan.areas.push(id);
    }

    fn collect_profile(&self, id: ProfileId, plan: &mut RemovalPlan) {
        for pair in self.links().pairs_for_profile(id) {
            plan.push_link(pair);
        }
        plan.measurements
            .extend(self.measurements_of_profile(id).map(|m| m.id));
        plan.profiles.push(id);
    }

    // ---- execution -------------------------------------------------------

    /// Applies the plan durably, then prunes memory, notifies observers and
    /// clears any selection naming a removed entity.
    fn execute_cascade(&mut self, target: EntityRef, plan: RemovalPlan) -> StoreResult<()> {
        let row_count = plan.row_count();
        self.backend
            .apply_removals(&plan)
            .map_err(|err| match err {
                RemovalError::Step { step, source } => StoreError::Cascade {
                    target,
                    step: Some(step),
                    source,
                },
                RemovalError::Commit(source) => StoreError::Cascade {
                    target,
                    step: None,
                    source,
                },
            })?;

        for id in &plan.measurements {
            self.remove_measurement_from_memory(*id);
        }
        for (project_id, profile_id) in &plan.links {
            self.remove_link_from_memory(*project_id, *profile_id);
        }
        for id in &plan.profiles {
            self.remove_profile_from_memory(*id);
        }
        for id in &plan.areas {
            self.remove_area_from_memory(*id);
        }
        for id in &plan.projects {
            self.remove_project_from_memory(*id);
        }
        for id in &plan.clients {
            self.remove_client_from_memory(*id);
        }

        info!("event=cascade module=store status=ok target={target} rows={row_count}");
        Ok(())
    }

    fn remove_measurement_from_memory(&mut self, id: MeasurementId) {
        if self.measurements.remove(&id).is_some() {
            self.emit(ChangeEvent::Removed(EntityRef::Measurement(id)));
        }
    }

    fn remove_link_from_memory(&mut self, project_id: ProjectId, profile_id: ProfileId) {
        if self.links.remove(project_id, profile_id) {
            self.emit(ChangeEvent::Unlinked(project_id, profile_id));
        }
    }

    fn remove_profile_from_memory(&mut self, id: ProfileId) {
        if self.profiles.remove(&id).is_some() {
            if self.selection.profile == Some(id) {
                self.selection.profile = None;
            }
            self.emit(ChangeEvent::Removed(EntityRef::Profile(id)));
        }
    }

    fn remove_area_from_memory(&mut self, id: AreaId) {
        if self.areas.remove(&id).is_some() {
            self.emit(ChangeEvent::Removed(EntityRef::Area(id)));
        }
    }

    fn remove_project_from_memory(&mut self, id: ProjectId) {
        if self.projects.remove(&id).is_some() {
            if self.selection.project == Some(id) {
                self.selection.project = None;
            }
            self.emit(ChangeEvent::Removed(EntityRef::Project(id)));
        }
    }

    fn remove_client_from_memory(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            if self.selection.client == Some(id) {
                self.selection.client = None;
            }
            self.emit(ChangeEvent::Removed(EntityRef::Client(id)));
        }
    }
}
