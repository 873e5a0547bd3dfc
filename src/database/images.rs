use async_trait::async_trait;

use super::Database;
use crate::errors::RepositoryResult;
use crate::models::{Image, ImageInsertOutcome};
use crate::repositories::ImageRepository;

#[async_trait]
impl ImageRepository for Database {
    async fn get_image(&self, component_id: i32) -> RepositoryResult<Option<Vec<u8>>> {
        let image = sqlx::query_as::<_, Image>("SELECT id, image FROM images WHERE id = $1")
            .bind(component_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(image.map(|row| row.image))
    }

    async fn put_image(
        &self,
        component_id: i32,
        image: &[u8],
    ) -> RepositoryResult<ImageInsertOutcome> {
        // The primary key on images.id turns a concurrent second insert into a no-op.
        let result = sqlx::query(
            "INSERT INTO images (id, image) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(component_id)
        .bind(image)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(ImageInsertOutcome::AlreadyExists)
        } else {
            Ok(ImageInsertOutcome::Inserted)
        }
    }
}
