use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::{FinalSeed, Group};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateGroupsRequest {
    #[validate(length(min = 1, message = "titles must not be empty"))]
    pub(crate) titles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateGroupsResponse {
    pub(crate) created: Vec<Group>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AffectedRowsResponse {
    pub(crate) affected: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct FinalSeedResponse {
    pub(crate) group_id: i32,
    pub(crate) seed: String,
    pub(crate) active: bool,
}

impl From<FinalSeed> for FinalSeedResponse {
    fn from(seed: FinalSeed) -> Self {
        Self { group_id: seed.group_id, seed: seed.seed, active: seed.active }
    }
}
