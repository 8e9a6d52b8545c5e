mod common;

use aerospectro_core::model::{AreaId, ClientId, EntityRef, ProfileId, ProjectId};
use aerospectro_core::repo::BackendError;
use aerospectro_core::store::ChangeEvent;
use aerospectro_core::{EntityGraphStore, SqliteBackend, StoreError};
use common::{
    area_draft, client_draft, in_memory_store, measurement_draft, profile_draft, project_draft,
    EventRecorder, FlakyBackend,
};
use rusqlite::Connection;

#[test]
fn add_operations_assign_monotonic_ids_and_mirror_to_memory() {
    let mut store = in_memory_store();

    let c1 = store.add_client(client_draft("first")).unwrap();
    let c2 = store.add_client(client_draft("second")).unwrap();
    assert_eq!(c1, ClientId(1));
    assert_eq!(c2, ClientId(2));

    let p1 = store.add_project(project_draft(c1, "survey A")).unwrap();
    let a1 = store.add_area(area_draft(p1, "zone 1")).unwrap();
    let f1 = store.add_profile(profile_draft(Some(a1), "line 1")).unwrap();
    let m1 = store.add_measurement(measurement_draft(f1)).unwrap();

    assert_eq!(store.client(c1).unwrap().name, "first");
    assert_eq!(store.project(p1).unwrap().client_id, c1);
    assert_eq!(store.area(a1).unwrap().project_id, p1);
    assert_eq!(store.profile(f1).unwrap().area_id, Some(a1));
    assert_eq!(store.measurement(m1).unwrap().profile_id, f1);
    assert_eq!(store.clients().count(), 2);
}

#[test]
fn add_rejects_unknown_parent() {
    let mut store = in_memory_store();

    let err = store
        .add_project(project_draft(ClientId(99), "orphan"))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::UnknownEntity(EntityRef::Client(ClientId(99)))
    ));

    let err = store
        .add_area(area_draft(ProjectId(7), "orphan"))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownEntity(_)));
    assert_eq!(store.projects().count(), 0);
    assert_eq!(store.areas().count(), 0);
}

#[test]
fn profile_may_exist_without_an_area() {
    let mut store = in_memory_store();
    let id = store.add_profile(profile_draft(None, "unassigned")).unwrap();
    assert_eq!(store.profile(id).unwrap().area_id, None);
}

#[test]
fn failed_persist_leaves_memory_unchanged() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let (flaky, fail_writes) = FlakyBackend::new(backend);
    let mut store = EntityGraphStore::load(flaky).unwrap();

    store.add_client(client_draft("kept")).unwrap();
    fail_writes.set(true);

    let err = store.add_client(client_draft("rejected")).unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
    assert_eq!(store.clients().count(), 1);
    assert_eq!(common::table_count(store.backend().connection(), "clients"), 1);

    // The next successful add continues the monotonic sequence.
    fail_writes.set(false);
    let id = store.add_client(client_draft("after")).unwrap();
    assert_eq!(id, ClientId(2));
}

#[test]
fn update_replaces_fields_durably() {
    let mut store = in_memory_store();
    let c = store.add_client(client_draft("old name")).unwrap();

    let mut client = store.client(c).unwrap().clone();
    client.name = "new name".to_string();
    client.contact_info = "ops@survey.example".to_string();
    store.update_client(client).unwrap();

    assert_eq!(store.client(c).unwrap().name, "new name");
    let durable: String = store
        .backend()
        .connection()
        .query_row("SELECT name FROM clients WHERE client_id = ?1;", [c.0], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(durable, "new name");
}

#[test]
fn load_restores_entities_links_and_id_counters_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("survey.db");

    let (c, p, f) = {
        let backend = SqliteBackend::open(&db_path).unwrap();
        let mut store = EntityGraphStore::load(backend).unwrap();
        let c = store.add_client(client_draft("persisted")).unwrap();
        let p = store.add_project(project_draft(c, "persisted project")).unwrap();
        let a = store.add_area(area_draft(p, "persisted area")).unwrap();
        let f = store.add_profile(profile_draft(Some(a), "persisted line")).unwrap();
        store.add_measurement(measurement_draft(f)).unwrap();
        assert!(store.link(p, f).unwrap());
        (c, p, f)
    };

    let backend = SqliteBackend::open(&db_path).unwrap();
    let mut store = EntityGraphStore::load(backend).unwrap();

    assert_eq!(store.client(c).unwrap().name, "persisted");
    assert_eq!(store.measurements().count(), 1);
    assert!(store.links().contains(p, f));

    let next = store.add_client(client_draft("later")).unwrap();
    assert_eq!(next, ClientId(c.0 + 1));
}

#[test]
fn load_fails_on_dangling_foreign_key() {
    let conn = aerospectro_core::db::open_db_in_memory().unwrap();
    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         INSERT INTO clients (client_id, user_id, name, contact_info)
             VALUES (1, NULL, 'c', 'i');
         INSERT INTO areas (area_id, project_id, name, coordinates)
             VALUES (5, 42, 'orphan', '0,0');",
    )
    .unwrap();

    let backend = SqliteBackend::try_new(conn).unwrap();
    let err = EntityGraphStore::load(backend).unwrap_err();
    match err {
        StoreError::DanglingReference { entity, missing } => {
            assert_eq!(entity, EntityRef::Area(AreaId(5)));
            assert_eq!(missing, EntityRef::Project(ProjectId(42)));
        }
        other => panic!("expected dangling reference, got {other}"),
    }
}

#[test]
fn load_fails_on_dangling_link_endpoint() {
    let conn = aerospectro_core::db::open_db_in_memory().unwrap();
    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         INSERT INTO profiles (profile_id, area_id, name, kind, start_coordinates, end_coordinates)
             VALUES (3, NULL, 'line', 'gamma', '0,0', '1,1');
         INSERT INTO project_profiles (project_id, profile_id) VALUES (9, 3);",
    )
    .unwrap();

    let backend = SqliteBackend::try_new(conn).unwrap();
    let err = EntityGraphStore::load(backend).unwrap_err();
    assert!(matches!(
        err,
        StoreError::DanglingReference {
            entity: EntityRef::Link(ProjectId(9), ProfileId(3)),
            missing: EntityRef::Project(ProjectId(9)),
        }
    ));
}

#[test]
fn backend_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let result = SqliteBackend::try_new(conn);
    assert!(matches!(
        result,
        Err(BackendError::UninitializedConnection {
            actual_version: 0,
            ..
        })
    ));
}

#[test]
fn backend_rejects_connection_missing_required_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!(
        "PRAGMA user_version = {};",
        aerospectro_core::db::migrations::latest_version()
    ))
    .unwrap();

    let result = SqliteBackend::try_new(conn);
    assert!(matches!(
        result,
        Err(BackendError::MissingRequiredTable { table: "users" })
    ));
}

#[test]
fn backend_rejects_connection_missing_required_column() {
    let conn = Connection::open_in_memory().unwrap();
    // A users table that predates the password_hash column.
    conn.execute_batch(&format!(
        "CREATE TABLE users (user_id INTEGER PRIMARY KEY, username TEXT NOT NULL);
         PRAGMA user_version = {};",
        aerospectro_core::db::migrations::latest_version()
    ))
    .unwrap();

    let result = SqliteBackend::try_new(conn);
    assert!(matches!(
        result,
        Err(BackendError::MissingRequiredColumn {
            table: "users",
            column: "password_hash",
        })
    ));
}

#[test]
fn observers_see_added_entities() {
    let mut store = in_memory_store();
    let (recorder, events) = EventRecorder::new();
    store.subscribe(Box::new(recorder));

    let c = store.add_client(client_draft("watched")).unwrap();
    let p = store.add_project(project_draft(c, "watched project")).unwrap();

    assert_eq!(
        *events.borrow(),
        vec![
            ChangeEvent::Added(EntityRef::Client(c)),
            ChangeEvent::Added(EntityRef::Project(p)),
        ]
    );
}

#[test]
fn selection_requires_live_entities() {
    let mut store = in_memory_store();
    let c = store.add_client(client_draft("sel")).unwrap();

    store.select_client(Some(c)).unwrap();
    assert_eq!(store.selection().client, Some(c));

    let err = store.select_project(Some(ProjectId(5))).unwrap_err();
    assert!(matches!(err, StoreError::UnknownEntity(_)));

    store.select_client(None).unwrap();
    assert_eq!(store.selection().client, None);
}

#[test]
fn filtered_views_reflect_current_state() {
    let mut store = in_memory_store();
    let c = store.add_client(client_draft("views")).unwrap();
    let p1 = store.add_project(project_draft(c, "one")).unwrap();
    let p2 = store.add_project(project_draft(c, "two")).unwrap();
    let a1 = store.add_area(area_draft(p1, "a1")).unwrap();
    store.add_area(area_draft(p2, "a2")).unwrap();

    let names: Vec<_> = store.areas_of_project(p1).map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["a1"]);

    // The view is restartable and sees later additions.
    store.add_area(area_draft(p1, "a3")).unwrap();
    assert_eq!(store.areas_of_project(p1).count(), 2);
    assert_eq!(store.profiles_of_area(a1).count(), 0);
}
