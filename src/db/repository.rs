//! Database repository for profile and donation operations.
//!
//! Uses prepared statements; uniqueness is enforced by the schema, not by read-then-write checks.

use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    format_timestamp, Donation, NewDonation, NewProfile, Profile, Role, UpdateProfileRequest,
};

const PROFILE_COLUMNS: &str = "id, uid, email, name, role, phone, address, landmark, latitude, longitude, avatar, is_completed, created_at, updated_at";

const DONATION_COLUMNS: &str = "id, name, food_type, quantity, email, phone, address, landmark, prepared_at, pickup_date, pickup_time, picture, additional_note, donor_id, created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== PROFILE OPERATIONS ====================

    /// Find the profile owned by an identity provider subject id.
    pub async fn find_profile_by_uid(&self, uid: &str) -> Result<Option<Profile>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE uid = ?",
            PROFILE_COLUMNS
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    /// Create a profile. Fails with `DuplicateProfile` if the uid is taken.
    pub async fn create_profile(&self, new: &NewProfile) -> Result<Profile, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());

        let result = sqlx::query(
            "INSERT INTO profiles (id, uid, email, name, role, is_completed, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&new.uid)
        .bind(&new.email)
        .bind(&new.name)
        .bind(new.role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(AppError::DuplicateProfile);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Profile {
            id,
            uid: new.uid.clone(),
            email: new.email.clone(),
            name: new.name.clone(),
            role: new.role,
            phone: None,
            address: None,
            landmark: None,
            latitude: None,
            longitude: None,
            avatar: None,
            is_completed: false,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Apply a partial update to the profile with internal id `id`.
    ///
    /// Only the columns named in `changes` are written, so overlapping updates
    /// never overwrite each other's fields. Completion is raised in SQL from the
    /// stored phone and address and is never lowered.
    pub async fn update_profile(
        &self,
        id: &str,
        changes: UpdateProfileRequest,
    ) -> Result<Profile, AppError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE profiles SET ");
        {
            let mut set = query.separated(", ");
            if let Some(phone) = changes.phone {
                set.push("phone = ").push_bind_unseparated(phone);
            }
            if let Some(address) = changes.address {
                set.push("address = ").push_bind_unseparated(address);
            }
            if let Some(landmark) = changes.landmark {
                set.push("landmark = ").push_bind_unseparated(landmark);
            }
            if let Some(latitude) = changes.latitude {
                set.push("latitude = ").push_bind_unseparated(latitude);
            }
            if let Some(longitude) = changes.longitude {
                set.push("longitude = ").push_bind_unseparated(longitude);
            }
            if let Some(avatar) = changes.avatar {
                set.push("avatar = ").push_bind_unseparated(avatar);
            }
            set.push("updated_at = ")
                .push_bind_unseparated(format_timestamp(Utc::now()));
        }
        query.push(" WHERE id = ").push_bind(id.to_string());

        let mut tx = self.pool.begin().await?;

        let result = query.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Profile {} not found", id)));
        }

        sqlx::query(&format!(
            "UPDATE profiles SET is_completed = 1 WHERE id = ? AND is_completed = 0 AND {} <> '' AND {} <> ''",
            trimmed("phone"),
            trimmed("address")
        ))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE id = ?",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        profile_from_row(&row)
    }

    // ==================== DONATION OPERATIONS ====================

    /// List all donations, most recent first.
    pub async fn list_donations(&self) -> Result<Vec<Donation>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM donations ORDER BY created_at DESC, seq DESC",
            DONATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(donation_from_row).collect())
    }

    /// Store a validated donation.
    pub async fn create_donation(&self, new: &NewDonation) -> Result<Donation, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());
        let prepared_at = format_timestamp(new.prepared_at);
        let pickup_date = format_timestamp(new.pickup_date);
        let pickup_time = format_timestamp(new.pickup_time);

        sqlx::query(
            r#"INSERT INTO donations (
                id, name, food_type, quantity, email, phone, address, landmark,
                prepared_at, pickup_date, pickup_time, picture, additional_note,
                donor_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.food_type)
        .bind(new.quantity)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.address)
        .bind(&new.landmark)
        .bind(&prepared_at)
        .bind(&pickup_date)
        .bind(&pickup_time)
        .bind(&new.picture)
        .bind(&new.additional_note)
        .bind(&new.donor)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Donation {
            id,
            name: new.name.clone(),
            food_type: new.food_type.clone(),
            quantity: new.quantity,
            email: new.email.clone(),
            phone: new.phone.clone(),
            address: new.address.clone(),
            landmark: new.landmark.clone(),
            prepared_at,
            pickup_date,
            pickup_time,
            picture: new.picture.clone(),
            additional_note: new.additional_note.clone(),
            donor: new.donor.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

/// SQL for a column with surrounding whitespace removed and NULL read as empty.
fn trimmed(column: &str) -> String {
    format!(
        "trim(coalesce({}, ''), ' ' || char(9) || char(10) || char(13))",
        column
    )
}

// Helper functions for row conversion

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Profile, AppError> {
    let role: String = row.get("role");
    let role = role
        .parse::<Role>()
        .map_err(|e| AppError::Database(format!("Corrupt profile row: {}", e)))?;
    let is_completed: i32 = row.get("is_completed");

    Ok(Profile {
        id: row.get("id"),
        uid: row.get("uid"),
        email: row.get("email"),
        name: row.get("name"),
        role,
        phone: row.get("phone"),
        address: row.get("address"),
        landmark: row.get("landmark"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        avatar: row.get("avatar"),
        is_completed: is_completed != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn donation_from_row(row: &sqlx::sqlite::SqliteRow) -> Donation {
    Donation {
        id: row.get("id"),
        name: row.get("name"),
        food_type: row.get("food_type"),
        quantity: row.get("quantity"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        landmark: row.get("landmark"),
        prepared_at: row.get("prepared_at"),
        pickup_date: row.get("pickup_date"),
        pickup_time: row.get("pickup_time"),
        picture: row.get("picture"),
        additional_note: row.get("additional_note"),
        donor: row.get("donor_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    async fn repo() -> (Repository, SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool.clone()), pool, temp_dir)
    }

    fn new_profile(uid: &str, role: Role) -> NewProfile {
        NewProfile {
            uid: uid.to_string(),
            email: format!("{}@example.com", uid),
            name: uid.to_string(),
            role,
        }
    }

    fn new_donation(donor: &Profile, name: &str) -> NewDonation {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        NewDonation {
            name: name.to_string(),
            food_type: "veg".to_string(),
            quantity: 10,
            email: donor.email.clone(),
            phone: "555".to_string(),
            address: "1 Main St".to_string(),
            landmark: None,
            prepared_at: at,
            pickup_date: at,
            pickup_time: at,
            picture: "pic".to_string(),
            additional_note: None,
            donor: donor.id.clone(),
        }
    }

    #[tokio::test]
    async fn test_find_missing_profile_is_none() {
        let (repo, _pool, _dir) = repo().await;
        assert!(repo.find_profile_by_uid("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_and_find_profile() {
        let (repo, _pool, _dir) = repo().await;
        let created = repo
            .create_profile(&new_profile("uid-1", Role::Recipient))
            .await
            .unwrap();
        assert!(!created.is_completed);

        let found = repo.find_profile_by_uid("uid-1").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.role, Role::Recipient);
    }

    #[tokio::test]
    async fn test_duplicate_uid_is_rejected() {
        let (repo, pool, _dir) = repo().await;
        repo.create_profile(&new_profile("uid-1", Role::Donor))
            .await
            .unwrap();

        let err = repo
            .create_profile(&new_profile("uid-1", Role::Recipient))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateProfile));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE uid = 'uid-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    fn changes(value: serde_json::Value) -> UpdateProfileRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_update_profile_persists_changes() {
        let (repo, _pool, _dir) = repo().await;
        let profile = repo
            .create_profile(&new_profile("uid-1", Role::Donor))
            .await
            .unwrap();

        let updated = repo
            .update_profile(
                &profile.id,
                changes(json!({ "phone": "555", "address": "1 Main St", "latitude": 12.5 })),
            )
            .await
            .unwrap();
        assert!(updated.is_completed);

        let stored = repo.find_profile_by_uid("uid-1").await.unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.phone.as_deref(), Some("555"));
        assert_eq!(stored.latitude, Some(12.5));
        assert_eq!(stored.longitude, None);
        assert_eq!(stored.email, "uid-1@example.com");
    }

    #[tokio::test]
    async fn test_updates_from_same_snapshot_keep_each_others_fields() {
        let (repo, _pool, _dir) = repo().await;
        let snapshot = repo
            .create_profile(&new_profile("uid-1", Role::Donor))
            .await
            .unwrap();

        repo.update_profile(
            &snapshot.id,
            changes(json!({ "phone": "555", "address": "1 Main St" })),
        )
        .await
        .unwrap();
        let last = repo
            .update_profile(&snapshot.id, changes(json!({ "landmark": "near park" })))
            .await
            .unwrap();

        assert_eq!(last.phone.as_deref(), Some("555"));
        assert_eq!(last.address.as_deref(), Some("1 Main St"));
        assert_eq!(last.landmark.as_deref(), Some("near park"));
        assert!(last.is_completed);
    }

    #[tokio::test]
    async fn test_partial_contact_does_not_complete() {
        let (repo, _pool, _dir) = repo().await;
        let profile = repo
            .create_profile(&new_profile("uid-1", Role::Donor))
            .await
            .unwrap();

        let updated = repo
            .update_profile(&profile.id, changes(json!({ "phone": "555" })))
            .await
            .unwrap();
        assert!(!updated.is_completed);

        let updated = repo
            .update_profile(&profile.id, changes(json!({ "address": " \t " })))
            .await
            .unwrap();
        assert!(!updated.is_completed);

        let updated = repo
            .update_profile(&profile.id, changes(json!({ "landmark": "near park" })))
            .await
            .unwrap();
        assert!(!updated.is_completed);
    }

    #[tokio::test]
    async fn test_completion_survives_clearing_contact() {
        let (repo, _pool, _dir) = repo().await;
        let profile = repo
            .create_profile(&new_profile("uid-1", Role::Donor))
            .await
            .unwrap();

        repo.update_profile(
            &profile.id,
            changes(json!({ "phone": "555", "address": "1 Main St", "avatar": "a.png" })),
        )
        .await
        .unwrap();
        let cleared = repo
            .update_profile(&profile.id, changes(json!({ "phone": null, "avatar": null })))
            .await
            .unwrap();

        assert_eq!(cleared.phone, None);
        assert_eq!(cleared.avatar, None);
        assert_eq!(cleared.address.as_deref(), Some("1 Main St"));
        assert!(cleared.is_completed);
    }

    #[tokio::test]
    async fn test_update_unknown_profile_is_not_found() {
        let (repo, _pool, _dir) = repo().await;
        let err = repo
            .update_profile("missing", changes(json!({ "phone": "555" })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_donations_listed_newest_first() {
        let (repo, _pool, _dir) = repo().await;
        let donor = repo
            .create_profile(&new_profile("donor", Role::Donor))
            .await
            .unwrap();

        for name in ["first", "second", "third"] {
            repo.create_donation(&new_donation(&donor, name))
                .await
                .unwrap();
        }

        let names: Vec<String> = repo
            .list_donations()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_created_donation_round_trips() {
        let (repo, _pool, _dir) = repo().await;
        let donor = repo
            .create_profile(&new_profile("donor", Role::Donor))
            .await
            .unwrap();

        let created = repo
            .create_donation(&new_donation(&donor, "rice"))
            .await
            .unwrap();
        let listed = repo.list_donations().await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].donor, donor.id);
        assert_eq!(listed[0].pickup_time, "2024-05-01T12:00:00.000Z");
    }
}
