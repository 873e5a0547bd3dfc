use async_trait::async_trait;
use tracing::debug;

use super::Database;
use crate::errors::RepositoryResult;
use crate::models::Component;
use crate::repositories::ComponentRepository;

#[async_trait]
impl ComponentRepository for Database {
    async fn list_components(&self) -> RepositoryResult<Vec<Component>> {
        let components = sqlx::query_as::<_, Component>(
            "SELECT id, name, type, team, language FROM components",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(components)
    }

    async fn list_components_by_team(&self, team_id: i32) -> RepositoryResult<Vec<Component>> {
        let components = sqlx::query_as::<_, Component>(
            "SELECT id, name, type, team, language FROM components WHERE team = $1",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(components)
    }

    async fn get_component(&self, id: i32) -> RepositoryResult<Option<Component>> {
        let component = sqlx::query_as::<_, Component>(
            "SELECT id, name, type, team, language FROM components WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(component)
    }

    async fn create_component(&self, component: &Component) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO components (id, name, type, team, language) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(component.id)
        .bind(&component.name)
        .bind(&component.kind)
        .bind(component.team)
        .bind(&component.language)
        .execute(&self.pool)
        .await?;

        debug!(component_id = component.id, "Inserted component");
        Ok(())
    }
}
