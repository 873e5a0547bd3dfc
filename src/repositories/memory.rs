//! In-memory catalog store
//!
//! Mirrors the uniqueness rules of the relational schema: component, team
//! and image ids are primary keys, and a component must reference an
//! existing team.

use async_trait::async_trait;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::traits::{CatalogStore, ComponentRepository, ImageRepository, TeamRepository};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{Component, ImageInsertOutcome, Team};

#[derive(Default)]
struct Tables {
    components: BTreeMap<i32, Component>,
    teams: BTreeMap<i32, Team>,
    images: BTreeMap<i32, Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    image_writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of images actually written
    pub fn image_writes(&self) -> usize {
        self.image_writes.load(Ordering::SeqCst)
    }

    pub async fn image_count(&self) -> usize {
        self.tables.read().await.images.len()
    }
}

#[async_trait]
impl ComponentRepository for InMemoryStore {
    async fn list_components(&self) -> RepositoryResult<Vec<Component>> {
        Ok(self.tables.read().await.components.values().cloned().collect())
    }

    async fn list_components_by_team(&self, team_id: i32) -> RepositoryResult<Vec<Component>> {
        Ok(self
            .tables
            .read()
            .await
            .components
            .values()
            .filter(|component| component.team == team_id)
            .cloned()
            .collect())
    }

    async fn get_component(&self, id: i32) -> RepositoryResult<Option<Component>> {
        Ok(self.tables.read().await.components.get(&id).cloned())
    }

    async fn create_component(&self, component: &Component) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.teams.contains_key(&component.team) {
            return Err(RepositoryError::constraint_violation(
                "components_team_fkey",
                format!("team {} does not exist", component.team),
            ));
        }
        match tables.components.entry(component.id) {
            Entry::Occupied(_) => Err(RepositoryError::unique_violation(
                "components",
                format!("component {} already exists", component.id),
            )),
            Entry::Vacant(slot) => {
                slot.insert(component.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl TeamRepository for InMemoryStore {
    async fn list_teams(&self) -> RepositoryResult<Vec<Team>> {
        Ok(self.tables.read().await.teams.values().cloned().collect())
    }

    async fn get_team(&self, id: i32) -> RepositoryResult<Option<Team>> {
        Ok(self.tables.read().await.teams.get(&id).cloned())
    }

    async fn create_team(&self, team: &Team) -> RepositoryResult<()> {
        match self.tables.write().await.teams.entry(team.id) {
            Entry::Occupied(_) => Err(RepositoryError::unique_violation(
                "teams",
                format!("team {} already exists", team.id),
            )),
            Entry::Vacant(slot) => {
                slot.insert(team.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ImageRepository for InMemoryStore {
    async fn get_image(&self, component_id: i32) -> RepositoryResult<Option<Vec<u8>>> {
        Ok(self.tables.read().await.images.get(&component_id).cloned())
    }

    async fn put_image(
        &self,
        component_id: i32,
        image: &[u8],
    ) -> RepositoryResult<ImageInsertOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.components.contains_key(&component_id) {
            return Err(RepositoryError::constraint_violation(
                "images_id_fkey",
                format!("component {component_id} does not exist"),
            ));
        }
        match tables.images.entry(component_id) {
            Entry::Occupied(_) => Ok(ImageInsertOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(image.to_vec());
                self.image_writes.fetch_add(1, Ordering::SeqCst);
                Ok(ImageInsertOutcome::Inserted)
            }
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
