use anyhow::{anyhow, bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::models::{QuestionSet, QuestionSetInfo};

const BUILTIN_QUESTION_SETS: &str = include_str!("../../data/question_sets.json");

/// Source of randomness for question-set selection.
pub trait RandomSource: Send + Sync {
    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

pub struct StdRandomSource {
    rng: Mutex<StdRng>,
}

impl StdRandomSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl RandomSource for StdRandomSource {
    fn pick(&self, len: usize) -> usize {
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..len),
            Err(poisoned) => poisoned.into_inner().random_range(0..len),
        }
    }
}

/// Cycles through a fixed list of indices. Used to force set selection in tests.
pub struct ScriptedRandom {
    picks: Vec<usize>,
    cursor: Mutex<usize>,
}

impl ScriptedRandom {
    pub fn new(picks: Vec<usize>) -> Self {
        Self {
            picks,
            cursor: Mutex::new(0),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn pick(&self, len: usize) -> usize {
        if self.picks.is_empty() {
            return 0;
        }
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pick = self.picks[*cursor % self.picks.len()];
        *cursor += 1;
        pick % len
    }
}

/// The static, versioned collection of question sets a session can draw from.
pub struct QuestionBank {
    sets: Vec<Arc<QuestionSet>>,
}

impl QuestionBank {
    pub fn builtin(default_max_attempts: u32) -> Result<Self> {
        Self::from_json(BUILTIN_QUESTION_SETS, default_max_attempts)
            .context("Built-in question sets are invalid")
    }

    pub fn load(path: &Path, default_max_attempts: u32) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read question sets from {}", path.display()))?;
        Self::from_json(&raw, default_max_attempts)
    }

    pub fn from_json(raw: &str, default_max_attempts: u32) -> Result<Self> {
        let sets: Vec<QuestionSet> =
            serde_json::from_str(raw).context("Failed to parse question sets")?;
        Self::new(sets, default_max_attempts)
    }

    pub fn new(mut sets: Vec<QuestionSet>, default_max_attempts: u32) -> Result<Self> {
        if default_max_attempts == 0 {
            bail!("Default attempt ceiling must be positive");
        }
        if sets.is_empty() {
            bail!("At least one question set is required");
        }

        let mut set_ids = HashSet::new();
        for set in &mut sets {
            if !set_ids.insert(set.id.clone()) {
                bail!("Duplicate question set id: {}", set.id);
            }
            if set.questions.is_empty() {
                bail!("Question set {} has no questions", set.id);
            }

            let mut question_ids = HashSet::new();
            for question in &mut set.questions {
                if !question_ids.insert(question.id) {
                    bail!("Duplicate question id {} in set {}", question.id, set.id);
                }
                match question.max_attempts {
                    Some(0) => {
                        return Err(anyhow!(
                            "Question {} in set {} has a zero attempt ceiling",
                            question.id,
                            set.id
                        ))
                    }
                    Some(_) => {}
                    None => question.max_attempts = Some(default_max_attempts),
                }
            }
        }

        tracing::info!("Question bank loaded with {} set(s)", sets.len());

        Ok(Self {
            sets: sets.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn get(&self, set_id: &str) -> Option<Arc<QuestionSet>> {
        self.sets.iter().find(|set| set.id == set_id).cloned()
    }

    /// Uniform pick over every set; the previous set may come up again.
    pub fn pick_random(&self, random: &dyn RandomSource) -> Arc<QuestionSet> {
        let index = random.pick(self.sets.len());
        self.sets[index.min(self.sets.len() - 1)].clone()
    }

    pub fn list(&self) -> Vec<QuestionSetInfo> {
        self.sets.iter().map(|set| set.as_ref().into()).collect()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
