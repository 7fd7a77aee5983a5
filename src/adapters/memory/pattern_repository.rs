use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{PatternKind, PatternRecord};
use crate::domain::ports::PatternRepository;

/// `PatternRepository` held in process memory.
#[derive(Default)]
pub struct InMemoryPatternRepository {
    patterns: RwLock<HashMap<Uuid, PatternRecord>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn insert(&self, pattern: &PatternRecord) -> DomainResult<()> {
        self.patterns.write().await.insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn update(&self, pattern: &PatternRecord) -> DomainResult<()> {
        let mut patterns = self.patterns.write().await;
        match patterns.get_mut(&pattern.id) {
            Some(existing) => {
                *existing = pattern.clone();
                Ok(())
            }
            None => Err(DomainError::PatternNotFound(pattern.id)),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<PatternRecord>> {
        Ok(self.patterns.read().await.get(&id).cloned())
    }

    async fn list_by_kind(&self, kind: PatternKind) -> DomainResult<Vec<PatternRecord>> {
        let patterns = self.patterns.read().await;
        let mut result: Vec<PatternRecord> = patterns
            .values()
            .filter(|p| p.kind == kind)
            .cloned()
            .collect();
        result.sort_by_key(|p| p.created_at);
        Ok(result)
    }
}
