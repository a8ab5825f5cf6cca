//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for profiles and donations.

mod repository;

pub use repository::*;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;

/// Process-wide database handle, connected at most once.
pub struct Database {
    db_path: PathBuf,
    pool: OnceCell<SqlitePool>,
}

impl Database {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            pool: OnceCell::new(),
        }
    }

    /// Connect and migrate on first call; later calls return the same pool.
    ///
    /// A failed attempt leaves the cell empty so the next call retries.
    pub async fn ensure_connected(&self) -> Result<&SqlitePool, sqlx::Error> {
        if let Some(pool) = self.pool.get() {
            tracing::debug!("Using existing database connection");
            return Ok(pool);
        }

        self.pool
            .get_or_try_init(|| async {
                let pool = init_database(&self.db_path).await?;
                tracing::info!("New database connection established");
                Ok::<_, sqlx::Error>(pool)
            })
            .await
    }
}

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // uid uniqueness is what settles concurrent first-contact creates
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('donor', 'recipient')),
            phone TEXT,
            address TEXT,
            landmark TEXT,
            latitude REAL,
            longitude REAL,
            avatar TEXT,
            is_completed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donations (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            food_type TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL,
            landmark TEXT,
            prepared_at TEXT NOT NULL,
            pickup_date TEXT NOT NULL,
            pickup_time TEXT NOT NULL,
            picture TEXT NOT NULL,
            additional_note TEXT,
            donor_id TEXT NOT NULL REFERENCES profiles(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_donations_created_at ON donations(created_at);
        CREATE INDEX IF NOT EXISTS idx_donations_donor_id ON donations(donor_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
