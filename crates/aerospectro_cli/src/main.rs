//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `aerospectro_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use aerospectro_core::{EntityGraphStore, SqliteBackend};

fn main() {
    println!(
        "aerospectro_core version={}",
        aerospectro_core::core_version()
    );

    let backend = match SqliteBackend::open_in_memory() {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("scratch backend unavailable: {err}");
            return;
        }
    };

    match EntityGraphStore::load(backend) {
        Ok(store) => println!(
            "scratch store ready: clients={} projects={}",
            store.clients().count(),
            store.projects().count()
        ),
        Err(err) => eprintln!("scratch store load failed: {err}"),
    }
}
