use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::OriginId;
use crate::models::label::DetectionLabel;
use crate::models::record::ResultRecord;

/// Insert a result record, replacing the row if the job was already recorded.
pub async fn upsert_result(pool: &PgPool, record: &ResultRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO detection_results
            (job_id, origin_id, original_image_key, annotated_image_key, labels, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (job_id) DO UPDATE
        SET origin_id = EXCLUDED.origin_id,
            original_image_key = EXCLUDED.original_image_key,
            annotated_image_key = EXCLUDED.annotated_image_key,
            labels = EXCLUDED.labels,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(record.job_id)
    .bind(record.origin_id.as_str())
    .bind(&record.original_image_key)
    .bind(&record.annotated_image_key)
    .bind(Json(&record.labels))
    .bind(record.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a result record by job ID
pub async fn get_result(pool: &PgPool, job_id: Uuid) -> Result<Option<ResultRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT job_id, origin_id, original_image_key, annotated_image_key, labels, completed_at
        FROM detection_results
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| -> Result<ResultRecord, sqlx::Error> {
        let origin_id: String = r.try_get("origin_id")?;
        let labels: Json<Vec<DetectionLabel>> = r.try_get("labels")?;
        Ok(ResultRecord {
            job_id: r.try_get("job_id")?,
            origin_id: OriginId::new(origin_id),
            original_image_key: r.try_get("original_image_key")?,
            annotated_image_key: r.try_get("annotated_image_key")?,
            labels: labels.0,
            completed_at: r.try_get("completed_at")?,
        })
    })
    .transpose()
}
