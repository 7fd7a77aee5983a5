//! `modforge patterns [--kind]`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::SqlitePatternRepository;
use crate::cli::commands::open_database;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{Config, PatternKind, PatternRecord};
use crate::domain::ports::PatternRepository;

#[derive(Debug, Serialize)]
pub struct PatternOutput {
    pub id: String,
    pub kind: String,
    pub fingerprint: String,
    pub category: Option<String>,
    pub files: usize,
    pub use_count: u32,
    pub success_rate: u32,
    pub last_used_at: Option<String>,
}

impl From<&PatternRecord> for PatternOutput {
    fn from(pattern: &PatternRecord) -> Self {
        Self {
            id: pattern.id.to_string(),
            kind: pattern.kind.as_str().to_string(),
            fingerprint: pattern.fingerprint.clone(),
            category: pattern.category.clone(),
            files: pattern.output.len(),
            use_count: pattern.use_count,
            success_rate: pattern.success_rate,
            last_used_at: pattern.last_used_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatternListOutput {
    pub patterns: Vec<PatternOutput>,
    pub total: usize,
}

impl CommandOutput for PatternListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "kind", "category", "uses", "success", "fingerprint"]);
        for p in &self.patterns {
            table.add_row(vec![
                p.id.chars().take(8).collect(),
                p.kind.clone(),
                p.category.clone().unwrap_or_else(|| "-".to_string()),
                p.use_count.to_string(),
                format!("{}%", p.success_rate),
                truncate(&p.fingerprint, 48),
            ]);
        }
        render_list("pattern", &table, self.total)
    }
}

pub async fn execute(kind: Option<String>, config: &Config, json_mode: bool) -> Result<()> {
    let kinds = match kind {
        Some(k) => vec![PatternKind::from_str(&k).with_context(|| format!("Unknown pattern kind '{k}'"))?],
        None => vec![PatternKind::Generation, PatternKind::Fix],
    };

    let repo = SqlitePatternRepository::new(open_database(config).await?);
    let mut patterns = Vec::new();
    for kind in kinds {
        patterns.extend(
            repo.list_by_kind(kind)
                .await
                .with_context(|| format!("Failed to list {} patterns", kind.as_str()))?,
        );
    }

    let out = PatternListOutput {
        total: patterns.len(),
        patterns: patterns.iter().map(PatternOutput::from).collect(),
    };
    output(&out, json_mode);
    Ok(())
}
