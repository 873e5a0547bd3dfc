use async_trait::async_trait;

use super::Database;
use crate::errors::RepositoryResult;
use crate::models::Team;
use crate::repositories::TeamRepository;

#[async_trait]
impl TeamRepository for Database {
    async fn list_teams(&self) -> RepositoryResult<Vec<Team>> {
        let teams = sqlx::query_as::<_, Team>("SELECT id, name FROM teams")
            .fetch_all(&self.pool)
            .await?;
        Ok(teams)
    }

    async fn get_team(&self, id: i32) -> RepositoryResult<Option<Team>> {
        let team = sqlx::query_as::<_, Team>("SELECT id, name FROM teams WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(team)
    }

    async fn create_team(&self, team: &Team) -> RepositoryResult<()> {
        sqlx::query("INSERT INTO teams (id, name) VALUES ($1, $2)")
            .bind(team.id)
            .bind(&team.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
