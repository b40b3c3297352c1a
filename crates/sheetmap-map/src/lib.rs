//! Sheet identification and column mapping with historical memory.
//!
//! Control flow for one workbook:
//!
//! 1. [`SheetSelector`] scores every sheet with data rows and picks one.
//! 2. [`HistoricalMatcher`] resolves each header against remembered mappings.
//! 3. Leftover, weakly matched and stale-target columns go to the AI matcher
//!    in one batch, with remembered headers as context.
//! 4. [`ConfidenceAggregator`] merges both into a [`MappingResult`].
//! 5. After review, [`MappingEngine::confirm`] writes accepted mappings back.
//!
//! [`MappingResult`]: sheetmap_model::MappingResult

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod historical;
pub mod normalize;
pub mod selector;

pub use aggregate::{AggregatorConfig, ColumnProposals, ConfidenceAggregator};
pub use config::EngineConfig;
pub use engine::{ConfirmSummary, MappingEngine, WorkbookMapping};
pub use error::{EngineError, Result};
pub use historical::{
    HistoricalConfig, HistoricalMatch, HistoricalMatcher, MAX_KNOWN_HEADERS, MatchKind,
    exact_confidence, known_headers,
};
pub use normalize::{Normalizer, NormalizerConfig, normalize_header};
pub use selector::{
    ExcludedSheet, IdentificationFailure, SelectorConfig, SheetScore, SheetSelection,
    SheetSelector,
};
