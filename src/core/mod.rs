pub mod engine;
pub mod filter;
pub mod reconciler;
pub mod resolution;
pub mod scanner;
pub mod text;

pub use engine::{CompareEngine, ComparePhase, CompareProgress, CompareReport, EngineConfig};
pub use filter::{
    ensure_filter_file, Explanation, FilterRule, FilterSnapshot, IgnoreFilterStore, RuleKind,
};
pub use reconciler::{
    prune_ignored, CompareConfig, ComparisonRecord, FileGroup, FileStatus, Reconciler, Resolution,
    StatusSummary,
};
pub use resolution::{ResolutionExecutor, ResolutionFailure, ResolutionReport};
pub use scanner::{FileScanner, ScanConfig, ScanStream, ScannedFile, Side};
pub use text::{load_text_pair, TextPair};
