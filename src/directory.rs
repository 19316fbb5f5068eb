use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{NewProvider, Page, Provider, ProviderPatch},
    pagination::{PageRequest, finish_page},
    sanitize::like_pattern,
};

/// ProviderFilter
///
/// Query parameters of the provider directory listing, after sanitizing.
#[derive(Debug, Clone, Default)]
pub struct ProviderFilter {
    pub specialty: Option<String>,
    pub state: Option<String>,
    pub accepts_new_patients: Option<bool>,
    pub telehealth: Option<bool>,
    pub active: Option<bool>,
    /// Case-insensitive match on name, specialty or city.
    pub search: Option<String>,
}

/// ProviderDirectory Trait
///
/// The relational store holding the provider directory. Listings are keyset-paginated on
/// `(name ASC, id ASC)`; the cursor is the id of the last provider of the previous page.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn list_providers(
        &self,
        filter: &ProviderFilter,
        page: &PageRequest,
    ) -> Result<Page<Provider>, StoreError>;
    async fn get_provider(&self, id: Uuid) -> Result<Option<Provider>, StoreError>;
    async fn create_provider(&self, provider: NewProvider) -> Result<Provider, StoreError>;
    /// Partial update; `None` fields keep their current value.
    async fn update_provider(
        &self,
        id: Uuid,
        patch: ProviderPatch,
    ) -> Result<Option<Provider>, StoreError>;
    async fn delete_provider(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn count_providers(&self, filter: &ProviderFilter) -> Result<i64, StoreError>;
}

pub type DirectoryState = Arc<dyn ProviderDirectory>;

const PROVIDER_COLUMNS: &str = "id, name, specialty, credentials, email, phone, city, state, \
     accepts_new_patients, telehealth, rating, active, created_at, updated_at";

/// PostgresDirectory
///
/// `ProviderDirectory` backed by the `providers` table.
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends the `WHERE` clause for a filter. Always starts with `WHERE TRUE` so callers
/// can keep appending `AND ...`.
fn push_provider_filters(b: &mut QueryBuilder<'_, Postgres>, f: &ProviderFilter) {
    b.push(" WHERE TRUE");
    if let Some(specialty) = &f.specialty {
        b.push(" AND specialty ILIKE ");
        b.push_bind(like_pattern(specialty));
    }
    if let Some(state) = &f.state {
        b.push(" AND state = ");
        b.push_bind(state.clone());
    }
    if let Some(accepting) = f.accepts_new_patients {
        b.push(" AND accepts_new_patients = ");
        b.push_bind(accepting);
    }
    if let Some(telehealth) = f.telehealth {
        b.push(" AND telehealth = ");
        b.push_bind(telehealth);
    }
    if let Some(active) = f.active {
        b.push(" AND active = ");
        b.push_bind(active);
    }
    if let Some(search) = &f.search {
        let pattern = like_pattern(search);
        b.push(" AND (name ILIKE ");
        b.push_bind(pattern.clone());
        b.push(" OR specialty ILIKE ");
        b.push_bind(pattern.clone());
        b.push(" OR city ILIKE ");
        b.push_bind(pattern);
        b.push(")");
    }
}

#[async_trait]
impl ProviderDirectory for PostgresDirectory {
    /// list_providers
    ///
    /// Filtered, keyset-paginated listing built with `QueryBuilder` so every user-supplied
    /// value is bound, never interpolated.
    async fn list_providers(
        &self,
        filter: &ProviderFilter,
        page: &PageRequest,
    ) -> Result<Page<Provider>, StoreError> {
        let cursor = match &page.cursor {
            Some(c) => {
                let id = Uuid::parse_str(c).map_err(|_| StoreError::InvalidCursor)?;
                let row: Option<(String,)> =
                    sqlx::query_as("SELECT name FROM providers WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                let (name,) = row.ok_or(StoreError::InvalidCursor)?;
                Some((name, id))
            }
            None => None,
        };

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM providers", PROVIDER_COLUMNS));
        push_provider_filters(&mut builder, filter);
        if let Some((name, id)) = cursor {
            builder.push(" AND (name, id) > (");
            builder.push_bind(name);
            builder.push(", ");
            builder.push_bind(id);
            builder.push(")");
        }
        builder.push(" ORDER BY name ASC, id ASC LIMIT ");
        builder.push_bind(page.fetch_limit());

        let rows = builder
            .build_query_as::<Provider>()
            .fetch_all(&self.pool)
            .await?;
        Ok(finish_page(rows, page.limit, |p| p.id.to_string()))
    }

    async fn get_provider(&self, id: Uuid) -> Result<Option<Provider>, StoreError> {
        let query = format!("SELECT {} FROM providers WHERE id = $1", PROVIDER_COLUMNS);
        Ok(sqlx::query_as::<_, Provider>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_provider(&self, p: NewProvider) -> Result<Provider, StoreError> {
        let query = format!(
            r#"INSERT INTO providers
                 (id, name, specialty, credentials, email, phone, city, state,
                  accepts_new_patients, telehealth, rating, active, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, true, NOW(), NOW())
               RETURNING {}"#,
            PROVIDER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Provider>(&query)
            .bind(Uuid::new_v4())
            .bind(p.name)
            .bind(p.specialty)
            .bind(p.credentials)
            .bind(p.email)
            .bind(p.phone)
            .bind(p.city)
            .bind(p.state)
            .bind(p.accepts_new_patients)
            .bind(p.telehealth)
            .bind(p.rating)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_provider
    ///
    /// Uses `COALESCE` so only the provided columns change.
    async fn update_provider(
        &self,
        id: Uuid,
        patch: ProviderPatch,
    ) -> Result<Option<Provider>, StoreError> {
        let query = format!(
            r#"UPDATE providers
               SET name = COALESCE($2, name),
                   specialty = COALESCE($3, specialty),
                   credentials = COALESCE($4, credentials),
                   email = COALESCE($5, email),
                   phone = COALESCE($6, phone),
                   city = COALESCE($7, city),
                   state = COALESCE($8, state),
                   accepts_new_patients = COALESCE($9, accepts_new_patients),
                   telehealth = COALESCE($10, telehealth),
                   rating = COALESCE($11, rating),
                   active = COALESCE($12, active),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            PROVIDER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Provider>(&query)
            .bind(id)
            .bind(patch.name)
            .bind(patch.specialty)
            .bind(patch.credentials)
            .bind(patch.email)
            .bind(patch.phone)
            .bind(patch.city)
            .bind(patch.state)
            .bind(patch.accepts_new_patients)
            .bind(patch.telehealth)
            .bind(patch.rating)
            .bind(patch.active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_provider(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_providers(&self, filter: &ProviderFilter) -> Result<i64, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM providers");
        push_provider_filters(&mut builder, filter);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }
}
