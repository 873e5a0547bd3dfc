//! Repository traits for components, teams and images

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::models::{Component, ImageInsertOutcome, Team};

#[async_trait]
pub trait ComponentRepository: Send + Sync {
    /// All components in store order
    async fn list_components(&self) -> RepositoryResult<Vec<Component>>;

    /// Components owned by the given team
    async fn list_components_by_team(&self, team_id: i32) -> RepositoryResult<Vec<Component>>;

    async fn get_component(&self, id: i32) -> RepositoryResult<Option<Component>>;

    async fn create_component(&self, component: &Component) -> RepositoryResult<()>;
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn list_teams(&self) -> RepositoryResult<Vec<Team>>;

    async fn get_team(&self, id: i32) -> RepositoryResult<Option<Team>>;

    async fn create_team(&self, team: &Team) -> RepositoryResult<()>;
}

#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Identicon bytes for a component, if one has been generated
    async fn get_image(&self, component_id: i32) -> RepositoryResult<Option<Vec<u8>>>;

    /// Store an identicon unless one already exists for the component.
    ///
    /// An existing image is never overwritten; the call reports
    /// [`ImageInsertOutcome::AlreadyExists`] instead of failing.
    async fn put_image(
        &self,
        component_id: i32,
        image: &[u8],
    ) -> RepositoryResult<ImageInsertOutcome>;
}

/// Everything the service needs from its store
#[async_trait]
pub trait CatalogStore: ComponentRepository + TeamRepository + ImageRepository {
    /// Cheap round trip used by the health endpoint
    async fn ping(&self) -> RepositoryResult<()>;
}
