//! Pipeline orchestration: resolve raw identifiers, fold aggregates,
//! cascade rebuilds after mapping edits, and score goals against targets.

pub mod aggregate;
pub mod cascade;
pub mod error;
pub mod resolve;
pub mod targets;
pub mod upload;

pub use aggregate::{aggregate_group, build_rows, fold};
pub use cascade::{rebuild_group, remove_agent, save_agent, ContextRebuild, ReaggregationReport};
pub use error::EngineError;
pub use resolve::{unmapped_idents, IdentIndex, NameIndex, UnmappedIdent};
pub use targets::{
    achievement, cumulative_schedule, set_percentages, AchievementReport, AgentAchievement,
    ProductAchievement, RollupAchievement, RollupProduct,
};
pub use upload::{ingest_direct, ingest_workbook, DirectOutcome, UploadOutcome};
