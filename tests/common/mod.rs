//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use genealogy_ledger::event_store::{InMemoryEventStore, InMemorySnapshotStore};
use genealogy_ledger::projection::InMemoryReadModelStore;
use genealogy_ledger::{EngineSettings, Genealogy};

/// Byron family: four persons, a marriage and a partnership.
///
/// Dates cover exact, approximate, range, before and free-text forms.
pub const BYRON_GEDCOM: &str = "\
0 HEAD
1 SOUR TEST
1 GEDC
2 VERS 5.5
2 FORM LINEAGE-LINKED
1 CHAR UTF-8
0 @SUB1@ SUBM
1 NAME Archivist
0 @I1@ INDI
1 NAME George Gordon /Byron/
1 SEX M
1 BIRT
2 DATE 22 JAN 1788
2 PLAC London, England
1 DEAT
2 DATE 19 APR 1824
2 PLAC Missolonghi
1 FAMS @F1@
0 @I2@ INDI
1 NAME Anne Isabella /Milbanke/
1 SEX F
1 BIRT
2 DATE ABT 1792
1 DEAT Y
1 FAMS @F1@
0 @I3@ INDI
1 NAME Augusta Ada /Byron/
1 SEX F
1 BIRT
2 DATE 10 DEC 1815
1 DEAT
2 DATE BEF 28 NOV 1852
2 PLAC Marylebone
1 NOTE Mathematician
2 CONT and writer
1 FAMC @F1@
0 @I4@ INDI
1 NAME William /King/
1 SEX M
1 BIRT
2 DATE BET 1804 AND 21 FEB 1805
0 @F1@ FAM
1 HUSB @I1@
1 WIFE @I2@
1 CHIL @I3@
1 MARR
2 DATE 2 JAN 1815
2 PLAC Seaham Hall
0 @F2@ FAM
1 HUSB @I4@
1 WIFE @I3@
1 _REL PARTNERSHIP
1 MARR
2 DATE Summer of 1835
0 TRLR
";

/// Settings with a short retry backoff
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        retry_backoff: Duration::from_millis(1),
        ..EngineSettings::default()
    }
}

/// Facade over fresh in-memory stores
pub fn in_memory() -> Genealogy {
    Genealogy::in_memory(fast_settings())
}

/// Facade plus a handle on its read model store
pub fn in_memory_with_read_models() -> (Genealogy, Arc<InMemoryReadModelStore>) {
    let read_models = Arc::new(InMemoryReadModelStore::new());
    let app = Genealogy::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemorySnapshotStore::new()),
        read_models.clone(),
        fast_settings(),
    );
    (app, read_models)
}

/// Connect to the test database and empty it.
///
/// Returns `None` when `TEST_DATABASE_URL` is not set.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query(
        "TRUNCATE TABLE events, event_snapshots, rm_persons, rm_families, rm_memberships, rm_positions",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    Some(pool)
}
