//! PostgreSQL read-model store
//!
//! Views are stored as JSONB next to the columns queries sort and filter on.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{ProjectionBatch, ReadModelStore};
use super::views::{FamilyView, Membership, MembershipRole, PersonView};
use super::ProjectionError;

/// Read-model store backed by the `rm_*` tables
#[derive(Debug, Clone)]
pub struct PgReadModelStore {
    pool: PgPool,
}

impl PgReadModelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Move the position forward; zero rows means someone else did first
    async fn advance_position(
        tx: &mut Transaction<'_, Postgres>,
        batch: &ProjectionBatch,
    ) -> Result<u64, ProjectionError> {
        let result = if batch.expected_last_applied == 0 {
            sqlx::query(
                r#"
                INSERT INTO rm_positions (aggregate_id, last_applied_sequence)
                VALUES ($1, $2)
                ON CONFLICT (aggregate_id) DO NOTHING
                "#,
            )
            .bind(batch.aggregate_id)
            .bind(batch.last_applied)
            .execute(&mut **tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE rm_positions
                SET last_applied_sequence = $3, updated_at = NOW()
                WHERE aggregate_id = $1 AND last_applied_sequence = $2
                "#,
            )
            .bind(batch.aggregate_id)
            .bind(batch.expected_last_applied)
            .bind(batch.last_applied)
            .execute(&mut **tx)
            .await?
        };

        Ok(result.rows_affected())
    }

    async fn upsert_person(
        tx: &mut Transaction<'_, Postgres>,
        person: &PersonView,
    ) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            INSERT INTO rm_persons (id, surname, given_name, deleted, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET surname = $2, given_name = $3, deleted = $4, data = $5
            "#,
        )
        .bind(person.id)
        .bind(&person.surname)
        .bind(&person.given_name)
        .bind(person.deleted)
        .bind(serde_json::to_value(person)?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_family(
        tx: &mut Transaction<'_, Postgres>,
        family: &FamilyView,
    ) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            INSERT INTO rm_families (id, deleted, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (id)
            DO UPDATE SET deleted = $2, data = $3
            "#,
        )
        .bind(family.id)
        .bind(family.deleted)
        .bind(serde_json::to_value(family)?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReadModelStore for PgReadModelStore {
    async fn last_applied(&self, aggregate_id: Uuid) -> Result<i64, ProjectionError> {
        let position: Option<i64> = sqlx::query_scalar(
            "SELECT last_applied_sequence FROM rm_positions WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(position.unwrap_or(0))
    }

    async fn get_person(&self, person_id: Uuid) -> Result<Option<PersonView>, ProjectionError> {
        let data: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT data FROM rm_persons WHERE id = $1")
                .bind(person_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(data.map(serde_json::from_value).transpose()?)
    }

    async fn get_family(&self, family_id: Uuid) -> Result<Option<FamilyView>, ProjectionError> {
        let data: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT data FROM rm_families WHERE id = $1")
                .bind(family_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(data.map(serde_json::from_value).transpose()?)
    }

    async fn memberships(&self, person_id: Uuid) -> Result<Membership, ProjectionError> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT family_id, role FROM rm_memberships WHERE person_id = $1",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;

        let mut membership = Membership::default();
        for (family_id, role) in rows {
            if role == MembershipRole::Partner.as_str() {
                membership.as_partner.insert(family_id);
            } else {
                membership.as_child.insert(family_id);
            }
        }
        Ok(membership)
    }

    async fn commit(&self, batch: ProjectionBatch) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await?;

        if Self::advance_position(&mut tx, &batch).await? == 0 {
            tx.rollback().await?;
            let actual = self.last_applied(batch.aggregate_id).await?;
            return Err(ProjectionError::PositionMoved {
                aggregate_id: batch.aggregate_id,
                expected: batch.expected_last_applied,
                actual,
            });
        }

        if let Some(person) = &batch.person {
            Self::upsert_person(&mut tx, person).await?;
        }
        if let Some(family) = &batch.family {
            Self::upsert_family(&mut tx, family).await?;
        }

        for change in &batch.membership_changes {
            if change.present {
                sqlx::query(
                    r#"
                    INSERT INTO rm_memberships (person_id, family_id, role)
                    VALUES ($1, $2, $3)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(change.person_id)
                .bind(change.family_id)
                .bind(change.role.as_str())
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    r#"
                    DELETE FROM rm_memberships
                    WHERE person_id = $1 AND family_id = $2 AND role = $3
                    "#,
                )
                .bind(change.person_id)
                .bind(change.family_id)
                .bind(change.role.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_persons(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<PersonView>, u64), ProjectionError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rm_persons WHERE NOT deleted")
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT data FROM rm_persons
            WHERE NOT deleted
            ORDER BY surname COLLATE "C" NULLS FIRST, given_name COLLATE "C" NULLS FIRST, id
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(offset as i64)
        .bind(limit.min(i64::MAX as u64) as i64)
        .fetch_all(&self.pool)
        .await?;

        let persons = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<PersonView>, _>>()?;
        Ok((persons, total as u64))
    }

    async fn list_families(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<FamilyView>, u64), ProjectionError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rm_families WHERE NOT deleted")
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT data FROM rm_families
            WHERE NOT deleted
            ORDER BY id
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(offset as i64)
        .bind(limit.min(i64::MAX as u64) as i64)
        .fetch_all(&self.pool)
        .await?;

        let families = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<FamilyView>, _>>()?;
        Ok((families, total as u64))
    }

    async fn clear(&self) -> Result<(), ProjectionError> {
        sqlx::query("TRUNCATE rm_persons, rm_families, rm_memberships, rm_positions")
            .execute(&self.pool)
            .await?;
        tracing::info!("Read models cleared");
        Ok(())
    }
}
