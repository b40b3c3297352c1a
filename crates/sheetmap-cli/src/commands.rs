use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sheetmap_ai::{AiConfig, AiMatcher, OpenAiClient};
use sheetmap_history::{HistoryStore, JsonHistoryStore, MemoryHistoryStore};
use sheetmap_map::{ConfirmSummary, EngineConfig, EngineError, MappingEngine, SheetSelection};
use sheetmap_model::{
    ConfidenceThresholds, HistoricalRecord, MappingResult, TargetSchema, Workbook,
};
use tracing::{info, info_span, warn};

use crate::cli::{ConfirmArgs, HistoryArgs, MapArgs};

/// What `map` produced.
#[derive(Debug)]
pub struct MapOutcome {
    /// `None` when the caller named the sheet.
    pub selection: Option<SheetSelection>,
    pub result: MappingResult,
    pub thresholds: ConfidenceThresholds,
    pub ai_enabled: bool,
}

#[derive(Debug)]
pub struct ConfirmOutcome {
    pub summary: ConfirmSummary,
    /// Mappings dropped by `--min-tier` before recording.
    pub demoted: usize,
}

pub fn run_map(args: &MapArgs) -> Result<MapOutcome> {
    let workbook: Workbook = read_json(&args.workbook).context("read workbook")?;
    let schema = load_schema(args.schema.as_deref())?;
    let config = load_config(args.config.as_deref(), args.profile.engine_config())?;
    let thresholds = config.thresholds;
    let span = info_span!("map", target_table = %schema.table(), sheets = workbook.sheets.len());
    let _guard = span.enter();

    let store: Box<dyn HistoryStore> = match &args.history {
        Some(path) => Box::new(JsonHistoryStore::new(path)),
        None => Box::new(MemoryHistoryStore::new()),
    };
    let mut engine = MappingEngine::new(store, config);
    let ai = if args.offline {
        info!("offline, AI matching disabled");
        None
    } else {
        ai_matcher()
    };
    let ai_enabled = ai.is_some();
    if let Some(ai) = ai {
        engine = engine.with_ai(ai);
    }

    let (selection, result) = match &args.sheet {
        Some(name) => {
            let result = engine
                .map_sheet_named(&workbook, name, &schema)
                .with_context(|| format!("map sheet '{name}'"))?;
            (None, result)
        }
        None => match engine.map_workbook(&workbook, &schema) {
            Ok(mapped) => (Some(mapped.selection), mapped.result),
            Err(EngineError::Identification(failure)) => {
                bail!("{failure}; rerun with --sheet NAME to map a sheet directly")
            }
            Err(error) => return Err(error).context("map workbook"),
        },
    };

    if let Some(path) = &args.output {
        write_json(path, &result).context("write mapping result")?;
        info!(path = %path.display(), "mapping result written");
    }
    Ok(MapOutcome {
        selection,
        result,
        thresholds,
        ai_enabled,
    })
}

pub fn run_confirm(args: &ConfirmArgs) -> Result<ConfirmOutcome> {
    let mut result: MappingResult = read_json(&args.result).context("read mapping result")?;
    let config = load_config(args.config.as_deref(), EngineConfig::default())?;

    let mut demoted = 0;
    if let Some(min_tier) = args.min_tier {
        let schema = load_schema(args.schema.as_deref())?;
        if !schema.table().eq_ignore_ascii_case(&result.target_table) {
            bail!(
                "schema table '{}' does not match result table '{}'",
                schema.table(),
                result.target_table
            );
        }
        demoted = result.retain_at_or_above(&schema, min_tier.into(), &config.thresholds);
    }

    let engine = MappingEngine::new(Box::new(JsonHistoryStore::new(&args.history)), config);
    let summary = engine
        .confirm(&result)
        .with_context(|| format!("update history {}", args.history.display()))?;
    Ok(ConfirmOutcome { summary, demoted })
}

pub fn run_history(args: &HistoryArgs) -> Result<Vec<HistoricalRecord>> {
    let store = JsonHistoryStore::new(&args.history);
    let records = store
        .load()
        .with_context(|| format!("read history {}", args.history.display()))?;
    Ok(match &args.table {
        Some(table) => records
            .into_iter()
            .filter(|r| r.target_table.eq_ignore_ascii_case(table))
            .collect(),
        None => records,
    })
}

/// Build the AI matcher from the environment, or `None` without an API key.
fn ai_matcher() -> Option<AiMatcher> {
    let config = AiConfig::from_env();
    match OpenAiClient::new(config.clone()) {
        Ok(client) => {
            info!(model = %config.model, "AI matching enabled");
            Some(AiMatcher::new(Arc::new(client), config))
        }
        Err(error) => {
            warn!(%error, "AI matching disabled");
            None
        }
    }
}

fn load_schema(path: Option<&Path>) -> Result<TargetSchema> {
    match path {
        Some(path) => read_json(path).context("read target schema"),
        None => {
            info!("no schema given, using the built-in accounts table");
            Ok(TargetSchema::default_accounts())
        }
    }
}

fn load_config(path: Option<&Path>, fallback: EngineConfig) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_json_file(path)?),
        None => Ok(fallback),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("write {}", path.display()))
}
