//! Failure classification.
//!
//! Two independent concerns live here: deciding how the scheduler should
//! react to a failed cycle ([`ErrorClass`]), and bucketing compiler
//! diagnostics into a category recorded on fix patterns and build logs
//! ([`ErrorCategory`]).

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{CompileError, ProjectId};
use crate::domain::ports::{GenerationError, VerifierError};

/// How the scheduler reacts to a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retry in place after a backoff delay.
    Transient,
    /// Count against the circuit breaker.
    Persistent,
    /// The project record is gone; stop scheduling it.
    ProjectMissing,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Persistent => "persistent",
            Self::ProjectMissing => "project_missing",
        }
    }
}

/// What went wrong inside a cycle.
#[derive(Debug, Error)]
pub enum CycleErrorKind {
    #[error("Project {0} no longer exists")]
    ProjectMissing(ProjectId),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Verifier(#[from] VerifierError),

    #[error(transparent)]
    Store(#[from] DomainError),
}

/// A failed build cycle, with the build it created (if it got that far).
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct CycleError {
    pub build_id: Option<Uuid>,
    #[source]
    pub kind: CycleErrorKind,
}

impl CycleError {
    pub fn new(kind: impl Into<CycleErrorKind>) -> Self {
        Self {
            build_id: None,
            kind: kind.into(),
        }
    }

    pub fn project_missing(project_id: ProjectId) -> Self {
        Self::new(CycleErrorKind::ProjectMissing(project_id))
    }

    /// Attach the build this cycle created.
    pub fn for_build(mut self, build_id: Uuid) -> Self {
        self.build_id = Some(build_id);
        self
    }
}

impl From<GenerationError> for CycleError {
    fn from(err: GenerationError) -> Self {
        Self::new(err)
    }
}

impl From<VerifierError> for CycleError {
    fn from(err: VerifierError) -> Self {
        Self::new(err)
    }
}

impl From<DomainError> for CycleError {
    fn from(err: DomainError) -> Self {
        Self::new(err)
    }
}

const TRANSIENT_MESSAGE_PATTERN: &str =
    r"(?i)(timeout|timed out|connection (reset|refused)|rate limit|\b429\b|\b503\b|socket hang up)";

fn transient_message_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TRANSIENT_MESSAGE_PATTERN).ok())
        .as_ref()
}

/// Whether a free-form error message looks like a transient infrastructure failure.
pub fn message_looks_transient(message: &str) -> bool {
    transient_message_regex().is_some_and(|re| re.is_match(message))
}

/// Classify a failed cycle.
pub fn classify(error: &CycleError) -> ErrorClass {
    match &error.kind {
        CycleErrorKind::ProjectMissing(_) | CycleErrorKind::Store(DomainError::ProjectNotFound(_)) => {
            ErrorClass::ProjectMissing
        }
        CycleErrorKind::Generation(err) if err.is_transient() => ErrorClass::Transient,
        CycleErrorKind::Generation(_) => ErrorClass::Persistent,
        CycleErrorKind::Verifier(err) => {
            if err.is_transient() || message_looks_transient(&err.to_string()) {
                ErrorClass::Transient
            } else {
                ErrorClass::Persistent
            }
        }
        CycleErrorKind::Store(err) => {
            if message_looks_transient(&err.to_string()) {
                ErrorClass::Transient
            } else {
                ErrorClass::Persistent
            }
        }
    }
}

/// Diagnostic category of a compiler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    UnresolvedSymbol,
    TypeMismatch,
    Access,
    NullPointer,
    Registry,
    Mixin,
    Event,
    Networking,
    Rendering,
    Dependency,
    VersionMismatch,
    Gradle,
    General,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax_error",
            Self::UnresolvedSymbol => "unresolved_symbol",
            Self::TypeMismatch => "type_mismatch",
            Self::Access => "access_violation",
            Self::NullPointer => "null_pointer",
            Self::Registry => "registry_error",
            Self::Mixin => "mixin_error",
            Self::Event => "event_error",
            Self::Networking => "networking_error",
            Self::Rendering => "render_error",
            Self::Dependency => "dependency_error",
            Self::VersionMismatch => "version_mismatch",
            Self::Gradle => "gradle_error",
            Self::General => "general_error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Checked in order; generic Java diagnostics before Minecraft-specific ones.
const CATEGORY_RULES: &[(ErrorCategory, &str)] = &[
    (
        ErrorCategory::Syntax,
        r"(?i)(syntax error|unexpected token|illegal start of (expression|type)|';' expected|reached end of file while parsing)",
    ),
    (
        ErrorCategory::UnresolvedSymbol,
        r"(?i)(cannot find symbol|cannot resolve (symbol|method|class)|symbol not found|package \S+ does not exist)",
    ),
    (
        ErrorCategory::TypeMismatch,
        r"(?i)(incompatible types|inconvertible types|cannot be applied to|cannot be converted to|bad type)",
    ),
    (
        ErrorCategory::Access,
        r"(?i)(is not accessible|has private access|has protected access|not visible|illegal access)",
    ),
    (
        ErrorCategory::NullPointer,
        r"(?i)(nullpointerexception|null pointer|\bnpe\b)",
    ),
    (
        ErrorCategory::VersionMismatch,
        r"(?i)(version mismatch|incompatible version|requires version|different version)",
    ),
    (
        ErrorCategory::Mixin,
        r"(?i)(\bmixins?\b|spongepowered|failed to apply mixin)",
    ),
    (
        ErrorCategory::Registry,
        r"(?i)(\bregistry\b|\bregistries\b|deferredregister|deferred register|registerblocks|registeritems)",
    ),
    (
        ErrorCategory::Event,
        r"(?i)(eventbus|subscribeevent|eventsubscriber|event handler)",
    ),
    (
        ErrorCategory::Networking,
        r"(?i)(\bpacket|packetbytebuf|simplechannel|networkhandler)",
    ),
    (
        ErrorCategory::Rendering,
        r"(?i)(renderer|rendertype|renderlayer|vertexconsumer|bakedmodel)",
    ),
    (
        ErrorCategory::Dependency,
        r"(?i)(missing dependency|could not resolve|dependency .*not found|required dependency|depends on)",
    ),
    (
        ErrorCategory::Gradle,
        r"(?i)(gradle|gradlew|execution failed for task)",
    ),
];

fn category_rules() -> &'static [(ErrorCategory, Regex)] {
    static RULES: OnceLock<Vec<(ErrorCategory, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        CATEGORY_RULES
            .iter()
            .filter_map(|(category, pattern)| match Regex::new(pattern) {
                Ok(re) => Some((*category, re)),
                Err(e) => {
                    tracing::error!(category = %category, error = %e, "Invalid error category pattern");
                    None
                }
            })
            .collect()
    })
}

/// Categorize a single diagnostic message.
pub fn categorize_message(message: &str) -> ErrorCategory {
    category_rules()
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map_or(ErrorCategory::General, |(category, _)| *category)
}

/// Most frequent category across a set of errors; ties go to the earliest error.
pub fn categorize(errors: &[CompileError]) -> ErrorCategory {
    let mut counts: Vec<(ErrorCategory, usize)> = Vec::new();
    for error in errors {
        let category = categorize_message(&error.message);
        match counts.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category, 1)),
        }
    }

    let mut best: Option<(ErrorCategory, usize)> = None;
    for (category, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((category, n));
        }
    }
    best.map_or(ErrorCategory::General, |(category, _)| category)
}
