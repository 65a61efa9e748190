//! WASM bindings for pattern-engine, used by the browser playground.

use std::collections::BTreeMap;
use wasm_bindgen::prelude::*;

use pattern_engine::core::engine::Engine;
use pattern_engine::core::output::Output;
use pattern_engine::core::vocabulary::MemoryVocabulary;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Deserialize)]
struct TableInput {
    name: String,
    #[serde(default)]
    subtypes: Vec<String>,
    entries: Vec<EntryInput>,
}

#[derive(serde::Deserialize)]
struct EntryInput {
    forms: Vec<String>,
    #[serde(default)]
    classes: Vec<String>,
}

#[derive(serde::Serialize)]
struct RunResult {
    seed: u64,
    channels: BTreeMap<String, String>,
}

fn build_vocabulary(tables_json: &str) -> Result<MemoryVocabulary, JsError> {
    let tables: Vec<TableInput> = serde_json::from_str(tables_json)
        .map_err(|e| JsError::new(&format!("Invalid vocabulary JSON: {e}")))?;
    let mut vocabulary = MemoryVocabulary::new();
    for table in &tables {
        let subtypes: Vec<&str> = table.subtypes.iter().map(String::as_str).collect();
        vocabulary.add_table(&table.name, &subtypes);
        for entry in &table.entries {
            let forms: Vec<&str> = entry.forms.iter().map(String::as_str).collect();
            let classes: Vec<&str> = entry.classes.iter().map(String::as_str).collect();
            vocabulary
                .add_entry(&table.name, &forms, &classes)
                .map_err(|e| JsError::new(&format!("Vocabulary error: {e}")))?;
        }
    }
    Ok(vocabulary)
}

fn to_json(seed: u64, output: Output) -> Result<String, JsError> {
    let result = RunResult {
        seed,
        channels: output
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect(),
    };
    serde_json::to_string(&result).map_err(|e| JsError::new(&format!("JSON error: {e}")))
}

/// Run a pattern once. Returns `{"seed": n, "channels": {"main": "..."}}`.
#[wasm_bindgen]
pub fn run_pattern(source: &str, seed: u64) -> Result<String, JsError> {
    let mut engine = Engine::builder()
        .seed(seed)
        .build()
        .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;
    let output = engine
        .run_source("playground", source)
        .map_err(|e| JsError::new(&format!("Pattern error: {e}")))?;
    to_json(seed, output)
}

// ---------------------------------------------------------------------------
// PatternDemo: an engine whose flags and subroutines persist between runs
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct PatternDemo {
    engine: Engine,
    seed: u64,
}

#[wasm_bindgen]
impl PatternDemo {
    /// Create a demo engine. `vocabulary_json` is an optional array of
    /// `{"name", "subtypes", "entries": [{"forms", "classes"}]}` tables.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64, vocabulary_json: Option<String>) -> Result<PatternDemo, JsError> {
        let mut builder = Engine::builder().seed(seed).char_limit(100_000);
        if let Some(json) = vocabulary_json {
            builder = builder.vocabulary(build_vocabulary(&json)?);
        }
        let engine = builder
            .build()
            .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;
        Ok(PatternDemo { engine, seed })
    }

    /// Run `source` with the next seed and return the channels as JSON.
    pub fn run(&mut self, source: &str) -> Result<String, JsError> {
        let pattern = Engine::compile("playground", source)
            .map_err(|e| JsError::new(&format!("Pattern error: {e}")))?;
        let seed = self.seed;
        self.seed = self.seed.wrapping_add(1);
        let output = self
            .engine
            .run_with_seed(&pattern, seed)
            .map_err(|e| JsError::new(&format!("Pattern error: {e}")))?;
        to_json(seed, output)
    }

    pub fn define(&mut self, flag: &str) {
        self.engine.define(flag);
    }

    pub fn is_defined(&self, flag: &str) -> bool {
        self.engine.is_defined(flag)
    }
}
