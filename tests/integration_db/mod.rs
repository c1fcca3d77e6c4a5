use color_eyre::eyre::Error;
use dotenv::dotenv;
use lazy_static::lazy_static;
use polls_server::db::{self, postgres::PgStore};
use sqlx::Executor;
use sqlx::{postgres::PgConnectOptions, PgPool};
use std::fs;
use tokio::sync::Mutex;
use tracing::{debug, span};

lazy_static! {
    static ref CREATE_DB_MUTEX: Mutex<()> = Mutex::new(());
}

async fn create_test_db(pool: &PgPool, test_db: &str) {
    let _lock = CREATE_DB_MUTEX.lock().await;
    debug!("Creating new test db");

    sqlx::query(&format!("DROP DATABASE IF EXISTS {}", test_db))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE DATABASE {}", test_db))
        .execute(pool)
        .await
        .unwrap();
}

async fn init_fixtures_test_db(pool: &PgPool) -> Result<(), Error> {
    let mut fixtures: Vec<fs::DirEntry> = fs::read_dir("fixtures")?.collect::<Result<_, _>>()?;
    fixtures.sort_by_key(|r| r.file_name());
    debug!("Executing init SQL in test db");
    for resource in fixtures {
        pool.execute(fs::read_to_string(resource.path())?.as_str())
            .await?;
    }
    Ok(())
}

async fn drop_test_db(pool: &PgPool, test_db: &str) {
    let _lock = CREATE_DB_MUTEX.lock().await;
    debug!("Dropping test db");
    sqlx::query(&format!("DROP DATABASE IF EXISTS {}", test_db))
        .execute(pool)
        .await
        .unwrap();
}

/// Throwaway database created from `DATABASE_URL`, migrated and loaded with
/// the fixtures.
pub struct IntegrationTestDb {
    db_name: String,
    store: PgStore,
    template_connect_options: PgConnectOptions,
}

impl IntegrationTestDb {
    pub async fn new() -> Self {
        dotenv().ok();
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must point at a Postgres server for these tests");
        let template_connect_options: PgConnectOptions = database_url.parse().unwrap();

        // Creating test database with random name
        let db_name = format!("integration_{}", uuid::Uuid::new_v4().simple());
        let span = span!(tracing::Level::DEBUG, "test_db", test_db = db_name.as_str());
        let _enter = span.enter();
        let template_pool = db::new_pool_with(template_connect_options.clone(), 1)
            .await
            .unwrap();
        create_test_db(&template_pool, &db_name).await;
        template_pool.close().await;

        let connect_options = template_connect_options.clone().database(&db_name);
        let pool = db::new_pool_with(connect_options, 5).await.unwrap();
        let store = PgStore::new(pool);
        store.migrate().await.unwrap();
        init_fixtures_test_db(&store.pool()).await.unwrap();

        Self {
            db_name,
            store,
            template_connect_options,
        }
    }

    pub fn store(&self) -> &PgStore {
        &self.store
    }

    pub async fn cleanup(self) {
        self.store.pool().close().await;
        let template_pool = db::new_pool_with(self.template_connect_options.clone(), 1)
            .await
            .unwrap();
        drop_test_db(&template_pool, &self.db_name).await;
        debug!("Dropped test db");
    }
}
