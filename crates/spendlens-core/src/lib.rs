//! Spendlens Core Library
//!
//! Turns a batch of personal transactions into a spending report:
//! - Normalization, calendar enrichment and winsorization
//! - Monthly trends and a next-month forecast
//! - Behavioural patterns, recurring charges and anomalies
//! - Budget variance, rule-based suggestions and savings challenges
//! - Prompt library and pluggable AI backends for model-written suggestions

pub mod ai;
pub mod anomalies;
pub mod calendar;
pub mod challenges;
pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod normalize;
pub mod patterns;
pub mod prompts;
pub mod recurring;
pub mod report;
pub mod stats;
pub mod suggestions;
pub mod trends;
pub mod variance;

/// Test utilities including mock Gemini server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    generate_ai_suggestions, parse_ai_suggestions, AIBackend, AIClient, AiSuggestion,
    GeminiBackend, GenerationConfig, MockBackend,
};
pub use calendar::{MonthKey, WeekKey};
pub use config::{AnalysisConfig, CategoryTables, Thresholds};
pub use error::{Error, Result, ValidationError};
pub use import::{load_transactions, parse_transactions};
pub use models::{
    AnomalyEvent, AnomalyReason, CanonicalTransaction, Challenge, RawTransaction,
    RecurringCharge, RecurringType, Suggestion, SuggestionType, TargetKind, TimeBucket,
};
pub use patterns::Patterns;
pub use prompts::{Prompt, PromptId, PromptLibrary, RenderedPrompt};
pub use report::{Analysis, Analyzer, Report, ReportPatterns, Summary};
pub use trends::{Forecast, ForecastModel, MonthlySeries, Trends};
pub use variance::{CategoryVariance, Variances};
