/// The host entry point: compile patterns and run them with persistent
/// flags, subroutines, vocabulary and hooks.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::core::expr::{Arithmetic, Evaluator};
use crate::core::interpreter::{Hook, Host, Interpreter, RunLimits};
use crate::core::output::Output;
use crate::core::rng::Rng;
use crate::core::subroutine::Subroutine;
use crate::core::token::Pattern;
use crate::core::vocabulary::{EmptyVocabulary, Vocabulary};

/// Runs patterns. Built via `Engine::builder()`.
pub struct Engine {
    config: EngineConfig,
    vocabulary: Arc<dyn Vocabulary>,
    evaluator: Arc<dyn Evaluator>,
    hooks: FxHashMap<String, Hook>,
    flags: FxHashSet<String>,
    subroutines: FxHashMap<String, Arc<Subroutine>>,
}

pub struct EngineBuilder {
    config: EngineConfig,
    config_file: Option<PathBuf>,
    seed: Option<u64>,
    char_limit: Option<usize>,
    timeout: Option<Duration>,
    max_stack_depth: Option<usize>,
    vocabulary: Option<Arc<dyn Vocabulary>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    hooks: FxHashMap<String, Hook>,
    flags: Vec<String>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            config_file: None,
            seed: None,
            char_limit: None,
            timeout: None,
            max_stack_depth: None,
            vocabulary: None,
            evaluator: None,
            hooks: FxHashMap::default(),
            flags: Vec::new(),
        }
    }

    pub fn compile(name: &str, source: &str) -> Result<Pattern> {
        Ok(Pattern::compile(name, source)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_defined(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn define(&mut self, flag: &str) {
        self.flags.insert(flag.to_string());
    }

    pub fn subroutine(&self, name: &str) -> Option<&Subroutine> {
        self.subroutines.get(name).map(Arc::as_ref)
    }

    /// Run with the configured seed.
    #[instrument(skip(self, pattern), fields(pattern = pattern.name()))]
    pub fn run(&mut self, pattern: &Pattern) -> Result<Output> {
        self.run_with_rng(pattern, Rng::new(self.config.seed))
    }

    pub fn run_with_seed(&mut self, pattern: &Pattern, seed: u64) -> Result<Output> {
        self.run_with_rng(pattern, Rng::new(seed))
    }

    /// Compile and run `source` in one step.
    pub fn run_source(&mut self, name: &str, source: &str) -> Result<Output> {
        let pattern = Engine::compile(name, source)?;
        self.run(&pattern)
    }

    pub fn run_with_rng(&mut self, pattern: &Pattern, rng: Rng) -> Result<Output> {
        let started = Instant::now();
        let seed = rng.base_seed();
        debug!(pattern = pattern.name(), seed, "run started");

        let limits = RunLimits {
            char_limit: self.config.char_limit,
            timeout: self.config.timeout_ms.map(Duration::from_millis),
            max_stack_depth: self.config.max_stack_depth,
        };
        let host = Host {
            vocabulary: self.vocabulary.as_ref(),
            evaluator: self.evaluator.as_ref(),
            hooks: &self.hooks,
            missing_sentinel: &self.config.missing_sentinel,
            strict_queries: self.config.strict_queries,
            flags: &mut self.flags,
            subroutines: &mut self.subroutines,
        };
        let result = Interpreter::new(host, rng, limits, self.config.number_format)
            .run(pattern.sequence());

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(output) => debug!(
                pattern = pattern.name(),
                seed,
                elapsed_ms,
                channels = output.len(),
                "run finished"
            ),
            Err(e) => debug!(pattern = pattern.name(), seed, elapsed_ms, error = %e, "run failed"),
        }
        result
    }
}

impl EngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Start from a whole configuration. Explicit builder settings still
    /// take precedence.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a RON file at build time.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn char_limit(mut self, limit: usize) -> Self {
        self.char_limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = Some(depth);
        self
    }

    pub fn vocabulary(mut self, vocabulary: impl Vocabulary + 'static) -> Self {
        self.vocabulary = Some(Arc::new(vocabulary));
        self
    }

    /// Share one vocabulary between engines.
    pub fn shared_vocabulary(mut self, vocabulary: Arc<dyn Vocabulary>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    pub fn hook(
        mut self,
        name: &str,
        hook: impl Fn(&[String]) -> String + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(name.to_string(), Arc::new(hook));
        self
    }

    pub fn flag(mut self, flag: &str) -> Self {
        self.flags.push(flag.to_string());
        self
    }

    pub fn build(self) -> Result<Engine> {
        let mut config = match &self.config_file {
            Some(path) => EngineConfig::load_from_ron(path)?,
            None => self.config,
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(limit) = self.char_limit {
            config.char_limit = Some(limit);
        }
        if let Some(timeout) = self.timeout {
            config.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        }
        if let Some(depth) = self.max_stack_depth {
            config.max_stack_depth = depth;
        }

        let flags = config
            .flags
            .iter()
            .chain(self.flags.iter())
            .cloned()
            .collect();

        debug!(
            seed = config.seed,
            hooks = self.hooks.len(),
            strict_queries = config.strict_queries,
            "engine built"
        );

        Ok(Engine {
            config,
            vocabulary: self
                .vocabulary
                .unwrap_or_else(|| Arc::new(EmptyVocabulary)),
            evaluator: self.evaluator.unwrap_or_else(|| Arc::new(Arithmetic)),
            hooks: self.hooks,
            flags,
            subroutines: FxHashMap::default(),
        })
    }
}

/// Run a compiled pattern once with no persistent state and return every
/// channel's text.
pub fn run(
    pattern: &Pattern,
    rng: Rng,
    char_limit: Option<usize>,
    timeout: Option<Duration>,
) -> Result<HashMap<String, String>> {
    let mut builder = Engine::builder();
    if let Some(limit) = char_limit {
        builder = builder.char_limit(limit);
    }
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let mut engine = builder.build()?;
    Ok(engine.run_with_rng(pattern, rng)?.into())
}
