use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use uuid::Uuid;

use crate::config::IdentifierStrategy;

/// Supplies the `counter` value sent by each request unit.
pub trait IdentifierSource: Send + Sync {
    fn next_id(&self) -> Option<String>;
}

/// Requests carry no identifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIdentifier;

impl IdentifierSource for NoIdentifier {
    fn next_id(&self) -> Option<String> {
        None
    }
}

/// Monotonically increasing values starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self { next: AtomicU64::new(1) }
    }
}

impl IdentifierSource for SequentialIds {
    fn next_id(&self) -> Option<String> {
        Some(self.next.fetch_add(1, Ordering::Relaxed).to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdentifierSource for RandomIds {
    fn next_id(&self) -> Option<String> {
        Some(Uuid::new_v4().to_string())
    }
}

pub fn from_strategy(strategy: IdentifierStrategy) -> Arc<dyn IdentifierSource> {
    match strategy {
        IdentifierStrategy::None => Arc::new(NoIdentifier),
        IdentifierStrategy::Sequence => Arc::new(SequentialIds::default()),
        IdentifierStrategy::Uuid => Arc::new(RandomIds),
    }
}
