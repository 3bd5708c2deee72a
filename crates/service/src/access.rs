//! Team-based access predicate shared by the registries and the orchestrator.

use crate::domain::{Team, User};
use crate::errors::ServiceError;
use crate::repository::EntityStore;

/// `true` when one of `user_teams` is among `entity_teams`.
pub fn has_access(entity_teams: &[String], user_teams: &[Team]) -> bool {
    user_teams.iter().any(|t| entity_teams.iter().any(|n| n == &t.name))
}

pub fn team_names(teams: &[Team]) -> Vec<String> {
    teams.iter().map(|t| t.name.clone()).collect()
}

/// Teams `user` belongs to, straight from the store.
pub async fn user_teams(store: &dyn EntityStore, user: &User) -> Result<Vec<Team>, ServiceError> {
    store.teams_of_user(&user.email).await
}
