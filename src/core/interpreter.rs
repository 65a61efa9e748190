/// The frame-stack machine that runs one pattern.
///
/// Nothing here recurses on the host stack: blocks, tag arguments,
/// subroutine bodies and metapatterns all become frames, and work that has
/// to happen after a frame finishes is queued as a [`Continuation`].

use rand::distributions::{Distribution, WeightedIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

use crate::core::block::{Block, BlockAttribs, Repeater};
use crate::core::error::{EngineError, NameKind, Result};
use crate::core::expr::{as_integer, Evaluator};
use crate::core::format::NumberFormat;
use crate::core::frame::{ArgSlot, Continuation, Frame};
use crate::core::functions::Argument;
use crate::core::limits::{CharLimit, DepthLimit, LimitExceeded, Timeout};
use crate::core::output::{ChannelStack, Output};
use crate::core::replacer::{self, RegexMatch};
use crate::core::rng::Rng;
use crate::core::subroutine::{Param, Subroutine};
use crate::core::sync::SyncManager;
use crate::core::token::{Pattern, Position, Token, TokenKind, TokenSeq};
use crate::core::vocabulary::{CarrierState, Vocabulary};

/// A host callback reachable through `[extern:name;args]`.
pub type Hook = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// Engine-owned state a run reads, and for flags and subroutines, updates.
pub struct Host<'a> {
    pub vocabulary: &'a dyn Vocabulary,
    pub evaluator: &'a dyn Evaluator,
    pub hooks: &'a FxHashMap<String, Hook>,
    pub missing_sentinel: &'a str,
    pub strict_queries: bool,
    pub flags: &'a mut FxHashSet<String>,
    pub subroutines: &'a mut FxHashMap<String, Arc<Subroutine>>,
}

/// Ceilings for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub char_limit: Option<usize>,
    pub timeout: Option<Duration>,
    pub max_stack_depth: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        RunLimits {
            char_limit: None,
            timeout: None,
            max_stack_depth: 1000,
        }
    }
}

/// Two values pushed by `[cmp]` for `[is]` to test.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub a: String,
    pub b: String,
}

impl Comparison {
    /// Test one `[is]` condition. `None` for an unknown condition name.
    /// Ordering is numeric when both sides are numbers, otherwise
    /// lexicographic.
    pub fn holds(&self, condition: &str) -> Option<bool> {
        let a = self.a.parse::<f64>().ok();
        let b = self.b.parse::<f64>().ok();
        let ordering = match (a, b) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(self.a.cmp(&self.b)),
        };
        Some(match condition.to_ascii_lowercase().as_str() {
            "equal" => ordering == Some(std::cmp::Ordering::Equal),
            "not-equal" => ordering != Some(std::cmp::Ordering::Equal),
            "less" => ordering == Some(std::cmp::Ordering::Less),
            "greater" => ordering == Some(std::cmp::Ordering::Greater),
            "a-numeric" => a.is_some(),
            "b-numeric" => b.is_some(),
            "all-numeric" => a.is_some() && b.is_some(),
            "none-numeric" => a.is_none() && b.is_none(),
            _ => return None,
        })
    }
}

pub struct Interpreter<'a> {
    pub(crate) host: Host<'a>,
    pub(crate) rng: Rng,
    frames: Vec<Frame>,
    results: Vec<Output>,
    pub(crate) repeaters: Vec<Repeater>,
    pub(crate) attribs: BlockAttribs,
    pub(crate) syncs: SyncManager,
    blocks: FxHashMap<(u64, usize), (Arc<Block>, usize)>,
    char_limit: CharLimit,
    timeout: Timeout,
    depth: DepthLimit,
    pub(crate) else_armed: bool,
    pub(crate) comparisons: Vec<Comparison>,
    pub(crate) sub_args: Vec<FxHashMap<String, Argument>>,
    /// Matches of the replacers currently running, innermost last.
    pub(crate) matches: Vec<Arc<RegexMatch>>,
    pub(crate) carrier: CarrierState,
    pub(crate) number_format: NumberFormat,
    position: Position,
    next_id: u64,
}

impl<'a> Interpreter<'a> {
    pub fn new(host: Host<'a>, rng: Rng, limits: RunLimits, number_format: NumberFormat) -> Self {
        Interpreter {
            host,
            rng,
            frames: Vec::new(),
            results: Vec::new(),
            repeaters: Vec::new(),
            attribs: BlockAttribs::default(),
            syncs: SyncManager::new(),
            blocks: FxHashMap::default(),
            char_limit: CharLimit::new(limits.char_limit),
            timeout: Timeout::new(limits.timeout),
            depth: DepthLimit {
                max: limits.max_stack_depth,
            },
            else_armed: false,
            comparisons: Vec::new(),
            sub_args: Vec::new(),
            matches: Vec::new(),
            carrier: CarrierState::default(),
            number_format,
            position: Position::default(),
            next_id: 1,
        }
    }

    /// Run `seq` to completion and return the root frame's output.
    pub fn run(mut self, seq: TokenSeq) -> Result<Output> {
        self.push_frame(seq, true)?;

        'outer: while !self.frames.is_empty() {
            self.check_timeout()?;
            let top = self.frames.len() - 1;

            while let Some(continuation) = self.frames[top].pre.pop() {
                if self.resume(continuation)? {
                    continue 'outer;
                }
            }

            while let Some(token) = self.frames[top].reader.read() {
                self.position = token.position;
                self.check_timeout()?;
                if self.dispatch(token)? {
                    continue 'outer;
                }
            }

            while let Some(continuation) = self.frames[top].post.pop() {
                if self.resume(continuation)? {
                    continue 'outer;
                }
            }

            self.pop_frame();
        }

        Ok(self.results.pop().unwrap_or_default())
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn char_count(&self) -> usize {
        self.char_limit.used()
    }

    /// Push a frame over `seq`. A frame that does not own its output writes
    /// into the output of the frame below it.
    pub(crate) fn push_frame(&mut self, seq: TokenSeq, owns_output: bool) -> Result<&mut Frame> {
        self.depth
            .check(self.frames.len() + 1)
            .map_err(|e| self.limit_error(e))?;
        let id = self.next_id();
        let index = self.frames.len();
        let owner = match self.frames.last() {
            Some(parent) if !owns_output => Some(parent.output_frame),
            _ => None,
        };
        trace!(frame = id, depth = index + 1, shared = owner.is_some(), "push frame");
        self.frames
            .push(Frame::new(id, seq, owner, index, self.results.len()));
        Ok(&mut self.frames[index])
    }

    fn pop_frame(&mut self) {
        if let Some(mut frame) = self.frames.pop() {
            trace!(frame = frame.id, depth = self.frames.len(), "pop frame");
            if let Some(output) = frame.finish() {
                self.results.push(output.into_output());
            }
        }
    }

    /// The frame currently executing. Only valid while the run loop is
    /// active, which is the only time handlers are called.
    pub(crate) fn top_mut(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    pub(crate) fn top(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    pub(crate) fn defer(&mut self, continuation: Continuation) {
        self.top_mut().pre.push(continuation);
    }

    fn output_index(&self) -> usize {
        self.frames.last().map_or(0, |f| f.output_frame)
    }

    /// The output the current frame writes to.
    pub(crate) fn output(&mut self) -> &mut ChannelStack {
        let owner = self.output_index();
        self.frames[owner]
            .output
            .get_or_insert_with(ChannelStack::new)
    }

    /// Run a write against the current output and the shared character
    /// budget.
    pub(crate) fn with_output<T>(
        &mut self,
        f: impl FnOnce(&mut ChannelStack, &mut CharLimit) -> Result<T, LimitExceeded>,
    ) -> Result<T> {
        let owner = self.output_index();
        let output = self.frames[owner]
            .output
            .get_or_insert_with(ChannelStack::new);
        let result = f(output, &mut self.char_limit);
        result.map_err(|e| self.limit_error(e))
    }

    pub(crate) fn print(&mut self, text: &str) -> Result<()> {
        self.with_output(|out, limit| out.write(text, limit))
    }

    pub(crate) fn print_number(&mut self, n: i64) -> Result<()> {
        let text = self.number_format.format(n);
        self.print(&text)
    }

    pub(crate) fn print_value(&mut self, value: f64) -> Result<()> {
        match as_integer(value) {
            Some(n) => self.print_number(n),
            None => self.print(&value.to_string()),
        }
    }

    pub(crate) fn check_timeout(&self) -> Result<()> {
        self.timeout.check().map_err(|e| self.limit_error(e))
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn pattern_name(&self) -> String {
        self.frames
            .last()
            .map(|f| f.reader.sequence().pattern_name().to_string())
            .unwrap_or_default()
    }

    pub(crate) fn pattern_code(&self) -> String {
        self.frames
            .last()
            .map(|f| f.reader.sequence().pattern_code().to_string())
            .unwrap_or_default()
    }

    pub(crate) fn limit_error(&self, e: LimitExceeded) -> EngineError {
        warn!(
            resource = %e.resource,
            limit = e.limit,
            position = %self.position,
            "resource limit exceeded"
        );
        EngineError::ResourceExceeded {
            resource: e.resource,
            limit: e.limit,
            pattern: self.pattern_name(),
            position: self.position,
        }
    }

    pub(crate) fn name_error(&self, kind: NameKind, name: &str) -> EngineError {
        EngineError::Name {
            kind,
            name: name.to_string(),
            pattern: self.pattern_name(),
            position: self.position,
        }
    }

    pub(crate) fn arity_error(&self, name: &str, count: usize) -> EngineError {
        EngineError::Arity {
            name: name.to_string(),
            count,
            pattern: self.pattern_name(),
            position: self.position,
        }
    }

    pub(crate) fn invalid(&self, name: &str, message: impl Into<String>) -> EngineError {
        EngineError::InvalidArgument {
            name: name.to_string(),
            message: message.into(),
            pattern: self.pattern_name(),
            position: self.position,
        }
    }

    pub(crate) fn query_error(&self, message: impl Into<String>) -> EngineError {
        EngineError::ExternalQuery {
            message: message.into(),
            pattern: self.pattern_name(),
            position: self.position,
        }
    }

    /// Pop the main-channel text of the most recent result.
    pub(crate) fn pop_result(&mut self) -> String {
        self.results.pop().map(Output::into_main).unwrap_or_default()
    }

    /// Queue `continuation` behind frames evaluating `evaluated`, or run it
    /// now if there is nothing to evaluate.
    pub(crate) fn schedule(
        &mut self,
        continuation: Continuation,
        evaluated: Vec<TokenSeq>,
    ) -> Result<bool> {
        if evaluated.is_empty() {
            return self.resume(continuation);
        }
        self.defer(continuation);
        for seq in evaluated.into_iter().rev() {
            self.push_frame(seq, true)?;
        }
        Ok(true)
    }

    /// Resolve argument slots. Evaluated slots take their results in
    /// argument order.
    fn collect_args(&mut self, slots: Vec<ArgSlot>) -> Vec<Argument> {
        let evaluated = slots
            .iter()
            .filter(|s| matches!(s, ArgSlot::Evaluated))
            .count();
        let at = self.results.len().saturating_sub(evaluated);
        let mut results = self
            .results
            .split_off(at)
            .into_iter()
            .map(Output::into_main);
        slots
            .into_iter()
            .map(|slot| match slot {
                ArgSlot::Evaluated => Argument::Text(results.next().unwrap_or_default()),
                ArgSlot::Literal(text) => Argument::Text(text),
                ArgSlot::Code(seq) => Argument::Code(seq),
            })
            .collect()
    }

    pub(crate) fn repeater_mut(&mut self, id: u64) -> Option<&mut Repeater> {
        self.repeaters.iter_mut().rev().find(|r| r.id() == id)
    }

    pub(crate) fn current_repeater(&self) -> Option<&Repeater> {
        self.repeaters.last()
    }

    /// Compile the block at the reader's current position, or fetch it from
    /// the cache and skip past it.
    pub(crate) fn read_block(&mut self) -> Result<Arc<Block>> {
        let reader = &mut self.top_mut().reader;
        let key = (reader.sequence().source_id(), reader.index().saturating_sub(1));
        if let Some((block, end)) = self.blocks.get(&key) {
            let (block, end) = (Arc::clone(block), *end);
            self.top_mut().reader.jump(end);
            return Ok(block);
        }
        let reader = &mut self.top_mut().reader;
        let items = reader.extract_arguments(
            TokenKind::LeftCurly,
            TokenKind::RightCurly,
            TokenKind::Pipe,
            crate::core::reader::BracketPairs::ALL,
        )?;
        let end = reader.index();
        let block = Arc::new(Block::from_items(items));
        self.blocks.insert(key, (Arc::clone(&block), end));
        Ok(block)
    }

    /// Start a block with the queued attributes.
    pub(crate) fn enter_block(&mut self, block: Arc<Block>) -> Result<bool> {
        let attribs = self.attribs.take();
        if block.is_empty() || block.weight_total() <= 0.0 {
            return Ok(false);
        }
        if attribs.chance < 100 && self.rng.next_below(100) as u32 >= attribs.chance {
            return Ok(false);
        }
        let id = self.next_id();
        let base = self.top().id;
        self.repeaters
            .push(Repeater::new(id, block, attribs).anchored(base));
        self.defer(Continuation::Iterate(id));
        Ok(true)
    }

    fn iterate(&mut self, id: u64) -> Result<bool> {
        let Some(pos) = self.repeaters.iter().rposition(|r| r.id() == id) else {
            return Ok(false);
        };
        if self.repeaters[pos].is_finished() {
            self.repeaters.remove(pos);
            return Ok(false);
        }
        self.defer(Continuation::Iterate(id));

        let rep = &self.repeaters[pos];
        let block = Arc::clone(rep.block());
        let attribs = rep.attribs().clone();
        let is_last = rep.index() + 1 >= rep.count();

        if !is_last {
            if let Some(sep) = attribs.separator {
                let frame = self.push_frame(sep, false)?;
                frame.pre.push(Continuation::Suppress(id));
                frame.post.push(Continuation::Restore(id));
            }
        }
        let has_after = attribs.after.is_some();
        if let Some(after) = attribs.after {
            self.push_frame(after, false)?
                .post
                .push(Continuation::Advance(id));
        }
        let index = self.pick_item(&block, attribs.sync.as_deref())?;
        let item = block.items()[index].1.clone();
        let frame = self.push_frame(item, false)?;
        if !has_after {
            frame.post.push(Continuation::Advance(id));
        }
        if let Some(before) = attribs.before {
            self.push_frame(before, false)?;
        }
        Ok(true)
    }

    fn pick_item(&mut self, block: &Block, sync: Option<&str>) -> Result<usize> {
        let len = block.len();
        if let Some(name) = sync {
            if let Some(index) = self.syncs.next_item(name, len) {
                return Ok(index.min(len - 1));
            }
        }
        if block.is_uniform() {
            return Ok(self.rng.next_below(len));
        }
        let dist = WeightedIndex::new(block.weights())
            .map_err(|e| self.invalid("block", e.to_string()))?;
        Ok(dist.sample(&mut self.rng))
    }

    /// Finish the innermost repeater and drop every frame above the frame
    /// that entered its block.
    pub(crate) fn break_repeater(&mut self) {
        let Some(rep) = self.repeaters.last_mut() else {
            return;
        };
        rep.finish();
        let base = rep.base_frame();
        let Some(keep) = self.frames.iter().position(|f| f.id == base) else {
            return;
        };
        let removed = self.frames.split_off(keep + 1);
        if let Some(first) = removed.first() {
            self.results.truncate(first.results_mark);
        }
        for frame in removed.into_iter().rev() {
            trace!(frame = frame.id, "unwind frame");
            for continuation in frame.pre.into_iter().rev() {
                self.discard(continuation);
            }
            for continuation in frame.post.into_iter().rev() {
                self.discard(continuation);
            }
        }
    }

    /// Undo the state changes a continuation dropped by `break` would have
    /// undone.
    fn discard(&mut self, continuation: Continuation) {
        match continuation {
            Continuation::PopSubArgs => {
                self.sub_args.pop();
            }
            Continuation::MergeRng => {
                self.rng.merge();
            }
            Continuation::PopComparison => {
                self.comparisons.pop();
            }
            Continuation::Restore(id) => {
                if let Some(rep) = self.repeater_mut(id) {
                    rep.restore();
                }
            }
            Continuation::Iterate(id) => self.repeaters.retain(|r| r.id() != id),
            // Keeps the stack balanced against the frame's own PopMatch.
            Continuation::PushMatch(m) => self.matches.push(m),
            Continuation::PopMatch => {
                self.matches.pop();
            }
            _ => {}
        }
    }

    pub(crate) fn call_subroutine(&mut self, sub: Arc<Subroutine>, args: Vec<Argument>) -> Result<bool> {
        let table: FxHashMap<String, Argument> = sub
            .params
            .iter()
            .map(|p| p.name.clone())
            .zip(args)
            .collect();
        self.sub_args.push(table);
        self.defer(Continuation::PopSubArgs);
        self.push_frame(sub.body.clone(), false)?;
        Ok(true)
    }

    fn define_meta(&mut self, name: String, params: Vec<Param>, token: &Token) -> Result<()> {
        let code = self.pop_result();
        let pattern = Pattern::compile(&format!("{}#{}", self.pattern_name(), name), &code)?;
        trace!(name = %name, position = %token.position, "meta subroutine defined");
        self.host.subroutines.insert(
            name.clone(),
            Arc::new(Subroutine {
                name,
                params,
                body: pattern.sequence(),
            }),
        );
        Ok(())
    }

    /// Run the replacement body once per match of `regex` in the input just
    /// evaluated. Bodies for earlier matches run first.
    fn replace(&mut self, regex: &regex::Regex, body: TokenSeq) -> Result<bool> {
        let input = self.pop_result();
        let found = replacer::find_matches(regex, &input);
        trace!(matches = found.len(), "replacer matched");
        if found.is_empty() {
            self.print(&input)?;
            return Ok(false);
        }
        let spans = found.iter().map(|m| (m.start, m.end)).collect();
        self.defer(Continuation::ReplaceJoin { input, spans });
        for m in found.into_iter().rev() {
            let frame = self.push_frame(body.clone(), true)?;
            frame.pre.push(Continuation::PushMatch(Arc::new(m)));
            frame.post.push(Continuation::PopMatch);
        }
        Ok(true)
    }

    /// Run a continuation. Returns whether to restart from the top frame.
    pub(crate) fn resume(&mut self, continuation: Continuation) -> Result<bool> {
        match continuation {
            Continuation::Tag { sig, token, slots } => {
                self.position = token.position;
                let mut args = self.collect_args(slots);
                (sig.handler)(self, &token, &mut args)
            }
            Continuation::SubCall { sub, token, slots } => {
                self.position = token.position;
                let args = self.collect_args(slots);
                self.call_subroutine(sub, args)
            }
            Continuation::PopSubArgs => {
                self.sub_args.pop();
                Ok(false)
            }
            Continuation::DefineMeta {
                name,
                params,
                token,
            } => {
                self.position = token.position;
                self.define_meta(name, params, &token)?;
                Ok(false)
            }
            Continuation::Iterate(id) => self.iterate(id),
            Continuation::Advance(id) => {
                if let Some(rep) = self.repeater_mut(id) {
                    rep.advance();
                }
                Ok(false)
            }
            Continuation::Suppress(id) => {
                if let Some(rep) = self.repeater_mut(id) {
                    rep.suppress();
                }
                Ok(false)
            }
            Continuation::Restore(id) => {
                if let Some(rep) = self.repeater_mut(id) {
                    rep.restore();
                }
                Ok(false)
            }
            Continuation::MergeRng => {
                self.rng.merge();
                Ok(false)
            }
            Continuation::PopComparison => {
                self.comparisons.pop();
                Ok(false)
            }
            Continuation::Metapattern { token } => {
                self.position = token.position;
                let code = self.pop_result();
                let pattern = Pattern::compile(&format!("{}#meta", self.pattern_name()), &code)?;
                self.push_frame(pattern.sequence(), false)?;
                Ok(true)
            }
            Continuation::Expression { print, token } => {
                self.position = token.position;
                let text = self.pop_result();
                let value = self
                    .host
                    .evaluator
                    .evaluate(&text)
                    .map_err(|e| self.invalid("expression", e.to_string()))?;
                if print {
                    self.print_value(value)?;
                }
                Ok(false)
            }
            Continuation::Alt { size, fallback } => {
                if self.output().size() == size {
                    self.push_frame(fallback, false)?;
                    return Ok(true);
                }
                Ok(false)
            }
            Continuation::Any { size, then } => {
                if self.output().size() != size {
                    self.push_frame(then, false)?;
                    return Ok(true);
                }
                Ok(false)
            }
            Continuation::Replacer { regex, body, token } => {
                self.position = token.position;
                self.replace(&regex, body)
            }
            Continuation::ReplaceJoin { input, spans } => {
                let at = self.results.len().saturating_sub(spans.len());
                let replacements: Vec<String> = self
                    .results
                    .split_off(at)
                    .into_iter()
                    .map(Output::into_main)
                    .collect();
                let text = replacer::splice(&input, &spans, &replacements);
                self.print(&text)?;
                Ok(false)
            }
            Continuation::PushMatch(m) => {
                self.matches.push(m);
                Ok(false)
            }
            Continuation::PopMatch => {
                self.matches.pop();
                Ok(false)
            }
        }
    }
}
