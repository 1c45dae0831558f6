//! Short shipment identifiers: six uppercase ASCII letters, unique per shipment.
//!
//! Uniqueness is decided by the `UNIQUE` constraint on `shipments.short_id`:
//! a candidate is generated, the insert is attempted, and a violation on that
//! column means "draw again". There is no existence pre-check, so concurrent
//! creations cannot race between check and insert.

use std::fmt;
use std::future::Future;

use rand::Rng;

use crate::error::{AppError, Result, is_unique_violation_on};

pub const SHORT_ID_LEN: usize = 6;
pub const MAX_ALLOCATION_ATTEMPTS: usize = 5;

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortId(String);

impl ShortId {
    /// Accepts any case and normalizes to uppercase.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if is_valid(&normalized) {
            Some(Self(normalized))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_valid(candidate: &str) -> bool {
    candidate.len() == SHORT_ID_LEN && candidate.bytes().all(|b| b.is_ascii_uppercase())
}

/// Source of candidate short ids.
pub trait ShortIdGenerator: Send + Sync {
    fn generate(&self) -> ShortId;
}

/// Uniform draw over the 26 uppercase letters.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomShortIds;

impl ShortIdGenerator for RandomShortIds {
    fn generate(&self) -> ShortId {
        let mut rng = rand::rng();
        let id = (0..SHORT_ID_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        ShortId(id)
    }
}

/// Runs `insert` with fresh candidates until it succeeds, fails for a reason
/// other than a short id collision, or the attempt cap is reached.
pub async fn allocate<T, F, Fut>(generator: &dyn ShortIdGenerator, mut insert: F) -> Result<T>
where
    F: FnMut(ShortId) -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let candidate = generator.generate();
        match insert(candidate.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) if is_unique_violation_on(&err, "short_id") => {
                tracing::warn!(attempt, short_id = %candidate, "Short id collision, retrying");
            }
            Err(err) => return Err(AppError::from_write(err)),
        }
    }

    tracing::error!(
        attempts = MAX_ALLOCATION_ATTEMPTS,
        "Short id allocation exhausted; check the unique constraint on shipments.short_id"
    );
    Err(AppError::IdAllocationExhausted {
        attempts: MAX_ALLOCATION_ATTEMPTS,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Hands out a fixed script of ids, then falls back to random ones.
    pub struct ScriptedShortIds {
        script: Mutex<VecDeque<String>>,
    }

    impl ScriptedShortIds {
        pub fn new<I, S>(ids: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                script: Mutex::new(ids.into_iter().map(Into::into).collect()),
            }
        }
    }

    impl ShortIdGenerator for ScriptedShortIds {
        fn generate(&self) -> ShortId {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(id) => ShortId(id),
                None => RandomShortIds.generate(),
            }
        }
    }
}
