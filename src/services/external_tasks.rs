use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;
use crate::db::models::{FinalSeed, Group};

/// Identity of a task as the checker knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ExternalTask {
    pub(crate) group_title: String,
    pub(crate) task: i32,
    pub(crate) variant: i32,
    /// False while a final test exists for the group but is paused.
    pub(crate) active: bool,
}

pub(crate) trait TaskRemapper: Send + Sync {
    fn resolve(
        &self,
        group: &Group,
        variant: i32,
        task: i32,
        seed: Option<&FinalSeed>,
    ) -> ExternalTask;
}

/// Maps internal keys to final-test tasks with a permutation derived from the
/// group's seed, so every student of a group gets a stable, distinct set.
#[derive(Debug, Clone)]
pub(crate) struct SeededTaskRemapper {
    final_tasks: BTreeMap<String, Vec<i32>>,
    final_variants: i32,
}

impl SeededTaskRemapper {
    pub(crate) fn new(final_tasks: BTreeMap<String, Vec<i32>>, final_variants: i32) -> Self {
        Self { final_tasks, final_variants: final_variants.max(1) }
    }

    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.exam().final_tasks.clone(), settings.exam().final_variants)
    }

    /// Task list configured for the longest prefix of `title`.
    fn final_tasks_for(&self, title: &str) -> Option<&[i32]> {
        self.final_tasks
            .iter()
            .filter(|(prefix, tasks)| title.starts_with(prefix.as_str()) && !tasks.is_empty())
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, tasks)| tasks.as_slice())
    }
}

impl TaskRemapper for SeededTaskRemapper {
    fn resolve(
        &self,
        group: &Group,
        variant: i32,
        task: i32,
        seed: Option<&FinalSeed>,
    ) -> ExternalTask {
        let group_title = group.external.clone().unwrap_or_else(|| group.title.clone());

        let Some(seed) = seed else {
            return ExternalTask { group_title, task, variant, active: true };
        };

        let mut rng = seeded_rng(&seed.seed, group.id, variant);
        let external_task = match self.final_tasks_for(&group.title) {
            Some(tasks) => {
                let mut shuffled = tasks.to_vec();
                shuffled.shuffle(&mut rng);
                let slot = usize::try_from(task.rem_euclid(shuffled.len() as i32)).unwrap_or(0);
                shuffled[slot]
            }
            None => task,
        };
        let external_variant = rng.gen_range(0..self.final_variants);

        ExternalTask {
            group_title,
            task: external_task,
            variant: external_variant,
            active: seed.active,
        }
    }
}

fn seeded_rng(seed: &str, group: i32, variant: i32) -> StdRng {
    let digest = Sha256::new()
        .chain_update(seed.as_bytes())
        .chain_update(group.to_le_bytes())
        .chain_update(variant.to_le_bytes())
        .finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    StdRng::from_seed(bytes)
}
