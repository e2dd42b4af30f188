use chrono::Utc;
use sqlx::SqlitePool;

use super::cache::TemplateCache;
use crate::core::{DocumentError, DocumentResult};
use crate::models::{NewTemplate, TemplateDescriptor, TemplateRow};

/// Versioned, immutable template lookup. Registration bumps the version and
/// flips the active flag in one transaction; old versions stay resolvable
/// forever because documents pin the version they were created against.
pub struct TemplateRegistry {
    pool: SqlitePool,
    cache: TemplateCache,
}

const SELECT_COLUMNS: &str = "id, version, name, template_type, output_format, \
     content, schema, is_active, created_by, created_at";

impl TemplateRegistry {
    pub async fn new(
        pool: SqlitePool,
        redis_url: Option<String>,
        cache_ttl_seconds: i64,
    ) -> DocumentResult<Self> {
        Ok(TemplateRegistry {
            pool,
            cache: TemplateCache::new(redis_url, cache_ttl_seconds).await?,
        })
    }

    /// The single active version for the id, or NotFound.
    pub async fn resolve(&self, template_id: &str) -> DocumentResult<TemplateDescriptor> {
        if let Some(descriptor) = self.cache.get(template_id).await {
            return Ok(descriptor);
        }

        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM templates WHERE id = ? AND is_active = 1",
            SELECT_COLUMNS
        ))
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let descriptor = TemplateDescriptor::try_from(row)?;
                self.cache.set(descriptor.clone()).await?;
                Ok(descriptor)
            }
            None => Err(DocumentError::NotFound(format!(
                "no active template for id {}",
                template_id
            ))),
        }
    }

    /// A specific pinned version, active or not. Used by workers replaying
    /// documents created before a newer version went live.
    pub async fn resolve_version(
        &self,
        template_id: &str,
        version: i64,
    ) -> DocumentResult<TemplateDescriptor> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM templates WHERE id = ? AND version = ?",
            SELECT_COLUMNS
        ))
        .bind(template_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TemplateDescriptor::try_from).transpose()?.ok_or_else(|| {
            DocumentError::NotFound(format!("template {} version {}", template_id, version))
        })
    }

    /// Inserts the next version and deactivates the previous active one
    /// atomically. The partial unique index on (id) WHERE is_active keeps
    /// two simultaneously active versions impossible even under races.
    pub async fn register(&self, new: NewTemplate) -> DocumentResult<TemplateDescriptor> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE templates SET is_active = 0 WHERE id = ? AND is_active = 1")
            .bind(&new.id)
            .execute(&mut *tx)
            .await?;

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) + 1 FROM templates WHERE id = ?")
                .bind(&new.id)
                .fetch_one(&mut *tx)
                .await?;

        let created_at = Utc::now();
        let schema = new.schema.as_ref().map(|s| s.to_string());

        sqlx::query(
            r#"
            INSERT INTO templates
                (id, version, name, template_type, output_format, content, schema,
                 is_active, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&new.id)
        .bind(version)
        .bind(&new.name)
        .bind(&new.template_type)
        .bind(new.output_format.to_string())
        .bind(&new.content)
        .bind(&schema)
        .bind(&new.created_by)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.cache.invalidate(&new.id).await?;

        Ok(TemplateDescriptor {
            id: new.id,
            version,
            name: new.name,
            template_type: new.template_type,
            output_format: new.output_format,
            content: new.content,
            schema: new.schema,
            is_active: true,
            created_by: new.created_by,
            created_at,
        })
    }

    /// Templates are never hard-deleted; this only retires the active
    /// version from serving new documents.
    pub async fn deactivate(&self, template_id: &str) -> DocumentResult<()> {
        let result =
            sqlx::query("UPDATE templates SET is_active = 0 WHERE id = ? AND is_active = 1")
                .bind(template_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DocumentError::NotFound(format!(
                "no active template for id {}",
                template_id
            )));
        }

        self.cache.invalidate(template_id).await
    }

    pub async fn list_active(&self) -> DocumentResult<Vec<TemplateDescriptor>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM templates WHERE is_active = 1 ORDER BY id",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TemplateDescriptor::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::OutputFormat;

    fn invoice_template(content: &str) -> NewTemplate {
        NewTemplate {
            id: "invoice_v2".to_string(),
            name: "Invoice".to_string(),
            template_type: "invoice".to_string(),
            output_format: OutputFormat::Pdf,
            content: content.to_string(),
            schema: Some(serde_json::json!({ "required": ["customer", "items"] })),
            created_by: "tests".to_string(),
        }
    }

    async fn registry() -> TemplateRegistry {
        let pool = db::connect_memory().await.unwrap();
        TemplateRegistry::new(pool, None, 3600).await.unwrap()
    }

    #[tokio::test]
    async fn register_bumps_version_and_keeps_one_active() {
        let registry = registry().await;

        let v1 = registry.register(invoice_template("one")).await.unwrap();
        let v2 = registry.register(invoice_template("two")).await.unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        let active = registry.resolve("invoice_v2").await.unwrap();
        assert_eq!(active.version, 2);
        assert_eq!(active.content, "two");

        // The superseded version is still resolvable for pinned documents.
        let pinned = registry.resolve_version("invoice_v2", 1).await.unwrap();
        assert_eq!(pinned.content, "one");
        assert!(!pinned.is_active);
    }

    #[tokio::test]
    async fn resolve_unknown_is_not_found() {
        let registry = registry().await;
        let err = registry.resolve("nope").await.unwrap_err();
        assert!(matches!(err, DocumentError::NotFound(_)));
    }

    #[tokio::test]
    async fn deactivate_retires_the_active_version() {
        let registry = registry().await;
        registry.register(invoice_template("one")).await.unwrap();

        registry.deactivate("invoice_v2").await.unwrap();
        assert!(matches!(
            registry.resolve("invoice_v2").await.unwrap_err(),
            DocumentError::NotFound(_)
        ));

        // But the version row itself survives.
        assert!(registry.resolve_version("invoice_v2", 1).await.is_ok());
    }
}
