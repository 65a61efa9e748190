/// The tag library: `[name:arg;arg]` signatures and their handlers.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::core::block::{Persistence, Repeater, Repetitions};
use crate::core::channel::Visibility;
use crate::core::error::{NameKind, Result};
use crate::core::format::{infer_case, Case, NumberFormat};
use crate::core::frame::Continuation;
use crate::core::interpreter::{Comparison, Interpreter};
use crate::core::sync::SyncType;
use crate::core::token::{Token, TokenSeq};

/// A resolved tag argument.
#[derive(Debug, Clone)]
pub enum Argument {
    Text(String),
    Code(TokenSeq),
}

impl Argument {
    pub fn as_str(&self) -> &str {
        match self {
            Argument::Text(s) => s,
            Argument::Code(_) => "",
        }
    }

    pub fn as_code(&self) -> Option<&TokenSeq> {
        match self {
            Argument::Code(seq) => Some(seq),
            Argument::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Run in its own frame; the handler receives the output.
    Eval,
    /// Passed as raw tokens.
    Code,
}

/// Handler result: whether the run loop must restart from the top frame.
pub type TagHandler = fn(&mut Interpreter<'_>, &Token, &mut [Argument]) -> Result<bool>;

#[derive(Clone)]
pub struct FuncSig {
    pub params: Vec<ParamKind>,
    /// The last parameter repeats.
    pub variadic: bool,
    pub handler: TagHandler,
}

impl fmt::Debug for FuncSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncSig")
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish()
    }
}

impl FuncSig {
    pub fn min_args(&self) -> usize {
        self.params.len()
    }

    pub fn accepts(&self, count: usize) -> bool {
        if self.variadic {
            count >= self.params.len()
        } else {
            count == self.params.len()
        }
    }

    pub fn is_code(&self, index: usize) -> bool {
        let kind = match self.params.get(index) {
            Some(kind) => Some(kind),
            None if self.variadic => self.params.last(),
            None => None,
        };
        kind == Some(&ParamKind::Code)
    }
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: &'static str,
    sigs: Vec<FuncSig>,
}

impl FuncDef {
    /// First signature, by descending minimum then parameter count, that
    /// takes `count` arguments.
    pub fn signature(&self, count: usize) -> Option<&FuncSig> {
        self.sigs.iter().find(|sig| sig.accepts(count))
    }

    pub fn signatures(&self) -> &[FuncSig] {
        &self.sigs
    }
}

pub fn lookup(name: &str) -> Option<&'static FuncDef> {
    TAGS.get(name.to_ascii_lowercase().as_str())
}

/// Every registered tag name, aliases included.
pub fn tag_names() -> impl Iterator<Item = &'static str> {
    TAGS.keys().copied()
}

static TAGS: LazyLock<FxHashMap<&'static str, FuncDef>> = LazyLock::new(build_table);

use ParamKind::{Code as C, Eval as E};

#[derive(Default)]
struct Registry {
    defs: FxHashMap<&'static str, FuncDef>,
}

impl Registry {
    fn add(&mut self, names: &[&'static str], params: &[ParamKind], handler: TagHandler) {
        self.add_sig(names, params, false, handler);
    }

    fn variadic(&mut self, names: &[&'static str], params: &[ParamKind], handler: TagHandler) {
        self.add_sig(names, params, true, handler);
    }

    fn add_sig(
        &mut self,
        names: &[&'static str],
        params: &[ParamKind],
        variadic: bool,
        handler: TagHandler,
    ) {
        let sig = FuncSig {
            params: params.to_vec(),
            variadic,
            handler,
        };
        for &name in names {
            self.defs
                .entry(name)
                .or_insert_with(|| FuncDef {
                    name,
                    sigs: Vec::new(),
                })
                .sigs
                .push(sig.clone());
        }
    }

    fn finish(mut self) -> FxHashMap<&'static str, FuncDef> {
        for def in self.defs.values_mut() {
            def.sigs.sort_by(|a, b| {
                b.min_args()
                    .cmp(&a.min_args())
                    .then(b.params.len().cmp(&a.params.len()))
            });
        }
        self.defs
    }
}

fn build_table() -> FxHashMap<&'static str, FuncDef> {
    let mut r = Registry::default();

    // Block attributes
    r.add(&["rep", "r"], &[E], tag_rep);
    r.add(&["sep", "s"], &[C], tag_sep);
    r.add(&["before"], &[C], tag_before);
    r.add(&["after"], &[C], tag_after);
    r.add(&["chance"], &[E], tag_chance);
    r.add(&["persist"], &[E], tag_persist);
    r.add(&["break"], &[], tag_break);
    r.add(&["repnum", "rn"], &[], tag_repnum);
    r.add(&["repindex", "ri"], &[], tag_repindex);
    r.add(&["repcount", "rc"], &[], tag_repcount);

    // Synchronizers
    r.add(&["sync", "x"], &[E], tag_sync_apply);
    r.add(&["sync", "x"], &[E, E], tag_sync_create);
    r.add(&["xnew"], &[E, E], tag_xnew);
    r.add(&["xreset"], &[E], tag_xreset);
    r.add(&["xseed"], &[E, E], tag_xseed);
    r.add(&["xnone"], &[], tag_xnone);
    r.add(&["xpin"], &[E], tag_xpin);
    r.add(&["xunpin"], &[E], tag_xunpin);
    r.add(&["xstep"], &[E], tag_xstep);

    // RNG
    r.add(&["branch", "b"], &[E], tag_branch);
    r.add(&["branch", "b"], &[E, C], tag_branch_scoped);
    r.add(&["merge", "m"], &[], tag_merge);
    r.add(&["generation", "g"], &[], tag_generation);
    r.add(&["generation", "g"], &[E], tag_set_generation);

    // Repeater predicates
    r.add(&["first"], &[C], tag_first);
    r.add(&["last"], &[C], tag_last);
    r.add(&["middle"], &[C], tag_middle);
    r.add(&["notfirst"], &[C], tag_notfirst);
    r.add(&["notlast"], &[C], tag_notlast);
    r.add(&["notmiddle"], &[C], tag_notmiddle);
    r.add(&["odd"], &[C], tag_odd);
    r.add(&["even"], &[C], tag_even);
    r.add(&["nth"], &[E, C], tag_nth);
    r.add(&["nth"], &[E, E, C], tag_nth_offset);

    // Output tests
    r.add(&["alt"], &[C, C], tag_alt);
    r.add(&["any"], &[C, C], tag_any);

    // Subroutines
    r.add(&["arg"], &[E], tag_arg);

    // Replacer matches
    r.add(&["match"], &[], tag_match);
    r.add(&["group"], &[E], tag_group);

    // Formatting
    r.add(&["caps", "case"], &[E], tag_caps);
    r.add(&["capsinfer"], &[E], tag_capsinfer);
    r.add(&["numfmt"], &[E], tag_numfmt);

    // Channels and targets
    r.add(&["out"], &[E], tag_out_public);
    r.add(&["out"], &[E, E], tag_out);
    r.add(&["close"], &[E], tag_close);
    r.add(&["mark"], &[E], tag_mark);
    r.add(&["dist"], &[E, E], tag_dist);
    r.add(&["copy"], &[E, E], tag_copy);
    r.add(&["get"], &[E], tag_get);
    r.add(&["send"], &[E, E], tag_send);
    r.add(&["osend"], &[E, E], tag_osend);
    r.add(&["clrt"], &[E], tag_clrt);
    r.add(&["a", "an"], &[], tag_article);

    // Host hooks
    r.variadic(&["extern", "ext"], &[E], tag_extern);

    // Generators
    r.add(&["len"], &[E], tag_len);
    r.add(&["char"], &[E], tag_char);
    r.add(&["char"], &[E, E], tag_char_count);
    r.add(&["num", "n"], &[E, E], tag_num);
    r.add(&["dec"], &[], tag_dec);
    r.add(&["src"], &[], tag_src);

    // Flags and comparisons
    r.variadic(&["define"], &[E], tag_define);
    r.variadic(&["undef"], &[E], tag_undef);
    r.add(&["ifdef"], &[E, C], tag_ifdef);
    r.add(&["ifndef"], &[E, C], tag_ifndef);
    r.add(&["else"], &[C], tag_else);
    r.add(&["cmp"], &[E, E, C], tag_cmp);
    r.add(&["is"], &[E, C], tag_is);

    r.finish()
}

fn text(args: &[Argument], index: usize) -> &str {
    args.get(index).map(Argument::as_str).unwrap_or_default().trim()
}

fn code(args: &[Argument], index: usize) -> Option<TokenSeq> {
    args.get(index).and_then(Argument::as_code).cloned()
}

fn parse_int(interp: &Interpreter<'_>, tag: &Token, value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| interp.invalid(&tag.text, format!("'{}' is not an integer", value)))
}

/// Push a frame over a code argument in the caller's output.
fn run_code(interp: &mut Interpreter<'_>, seq: Option<TokenSeq>) -> Result<bool> {
    match seq {
        Some(seq) => {
            interp.push_frame(seq, false)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

// Block attributes

fn tag_rep(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let value = text(args, 0);
    interp.attribs.reps = if value.eq_ignore_ascii_case("each") {
        Repetitions::Each
    } else {
        let n = parse_int(interp, tag, value)?;
        let n = usize::try_from(n)
            .map_err(|_| interp.invalid(&tag.text, "repetitions cannot be negative"))?;
        Repetitions::Count(n)
    };
    Ok(false)
}

fn tag_sep(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.attribs.separator = code(args, 0);
    Ok(false)
}

fn tag_before(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.attribs.before = code(args, 0);
    Ok(false)
}

fn tag_after(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.attribs.after = code(args, 0);
    Ok(false)
}

fn tag_chance(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let value = text(args, 0);
    let chance: f64 = value
        .trim_end_matches('%')
        .parse()
        .map_err(|_| interp.invalid(&tag.text, format!("'{}' is not a percentage", value)))?;
    interp.attribs.chance = chance.clamp(0.0, 100.0) as u32;
    Ok(false)
}

fn tag_persist(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let mode: Persistence = text(args, 0)
        .parse()
        .map_err(|e: String| interp.invalid(&tag.text, e))?;
    interp.attribs.persistence = mode;
    Ok(false)
}

fn tag_break(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    interp.break_repeater();
    Ok(true)
}

fn repeater_value(
    interp: &mut Interpreter<'_>,
    tag: &Token,
    value: impl Fn(usize, usize) -> usize,
) -> Result<bool> {
    let rep = interp
        .current_repeater()
        .ok_or_else(|| interp.invalid(&tag.text, "no block is repeating"))?;
    let n = value(rep.visible_index(), rep.count());
    interp.print_number(n as i64)?;
    Ok(false)
}

fn tag_repnum(interp: &mut Interpreter<'_>, tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    repeater_value(interp, tag, |index, _| index + 1)
}

fn tag_repindex(interp: &mut Interpreter<'_>, tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    repeater_value(interp, tag, |index, _| index)
}

fn tag_repcount(interp: &mut Interpreter<'_>, tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    repeater_value(interp, tag, |_, count| count)
}

// Synchronizers

fn sync_type(interp: &Interpreter<'_>, tag: &Token, value: &str) -> Result<SyncType> {
    value.parse().map_err(|e: String| interp.invalid(&tag.text, e))
}

fn require_sync(interp: &Interpreter<'_>, name: &str) -> Result<()> {
    if interp.syncs.exists(name) {
        Ok(())
    } else {
        Err(interp.name_error(NameKind::Synchronizer, name))
    }
}

fn tag_sync_apply(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let name = text(args, 0);
    require_sync(interp, name)?;
    interp.attribs.sync = Some(name.to_string());
    Ok(false)
}

fn tag_sync_create(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let name = text(args, 0).to_string();
    let kind = sync_type(interp, tag, text(args, 1))?;
    interp.syncs.create(&name, kind, &interp.rng);
    interp.attribs.sync = Some(name);
    Ok(false)
}

fn tag_xnew(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let kind = sync_type(interp, tag, text(args, 1))?;
    interp.syncs.create(text(args, 0), kind, &interp.rng);
    Ok(false)
}

fn tag_xreset(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let name = text(args, 0);
    if !interp.syncs.reset(name) {
        return Err(interp.name_error(NameKind::Synchronizer, name));
    }
    Ok(false)
}

fn tag_xseed(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let name = text(args, 0);
    if !interp.syncs.reseed(name, text(args, 1)) {
        return Err(interp.name_error(NameKind::Synchronizer, name));
    }
    Ok(false)
}

fn tag_xnone(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    interp.attribs.sync = None;
    Ok(false)
}

fn tag_xpin(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.syncs.set_pinned(text(args, 0), true);
    Ok(false)
}

fn tag_xunpin(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.syncs.set_pinned(text(args, 0), false);
    Ok(false)
}

fn tag_xstep(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let name = text(args, 0);
    if !interp.syncs.step(name) {
        return Err(interp.name_error(NameKind::Synchronizer, name));
    }
    Ok(false)
}

// RNG

fn tag_branch(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.rng.branch_str(text(args, 0));
    Ok(false)
}

fn tag_branch_scoped(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.rng.branch_str(text(args, 0));
    interp.defer(Continuation::MergeRng);
    run_code(interp, code(args, 1))
}

fn tag_merge(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    interp.rng.merge();
    Ok(false)
}

fn tag_generation(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    let generation = interp.rng.generation();
    interp.print(&generation.to_string())?;
    Ok(false)
}

fn tag_set_generation(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let value = text(args, 0);
    let generation: u64 = value
        .parse()
        .map_err(|_| interp.invalid(&tag.text, format!("'{}' is not a generation", value)))?;
    interp.rng.set_generation(generation);
    Ok(false)
}

// Repeater predicates

fn when(
    interp: &mut Interpreter<'_>,
    args: &[Argument],
    predicate: impl Fn(&Repeater) -> bool,
) -> Result<bool> {
    let holds = interp.current_repeater().is_some_and(predicate);
    if holds {
        run_code(interp, code(args, 0))
    } else {
        Ok(false)
    }
}

fn tag_first(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, Repeater::is_first)
}

fn tag_last(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, Repeater::is_last)
}

fn tag_middle(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, Repeater::is_middle)
}

fn tag_notfirst(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, |r| !r.is_first())
}

fn tag_notlast(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, |r| !r.is_last())
}

fn tag_notmiddle(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, |r| !r.is_middle())
}

fn tag_odd(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, Repeater::is_odd)
}

fn tag_even(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    when(interp, args, Repeater::is_even)
}

fn nth(
    interp: &mut Interpreter<'_>,
    tag: &Token,
    interval: &str,
    offset: &str,
    body: Option<TokenSeq>,
) -> Result<bool> {
    let interval = parse_int(interp, tag, interval)?;
    let offset = parse_int(interp, tag, offset)?;
    if interval <= 0 {
        return Err(interp.invalid(&tag.text, "interval must be positive"));
    }
    if offset < 0 {
        return Err(interp.invalid(&tag.text, "offset cannot be negative"));
    }
    let holds = interp
        .current_repeater()
        .is_some_and(|rep| rep.is_nth(offset as usize, interval as usize));
    if holds {
        run_code(interp, body)
    } else {
        Ok(false)
    }
}

fn tag_nth(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    nth(interp, tag, text(args, 0), "0", code(args, 1))
}

fn tag_nth_offset(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    nth(interp, tag, text(args, 0), text(args, 1), code(args, 2))
}

// Output tests

fn tag_alt(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let (Some(test), Some(fallback)) = (code(args, 0), code(args, 1)) else {
        return Ok(false);
    };
    let size = interp.output().size();
    interp.defer(Continuation::Alt { size, fallback });
    run_code(interp, Some(test))
}

fn tag_any(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let (Some(test), Some(then)) = (code(args, 0), code(args, 1)) else {
        return Ok(false);
    };
    let size = interp.output().size();
    interp.defer(Continuation::Any { size, then });
    run_code(interp, Some(test))
}

// Subroutine arguments

fn tag_arg(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let name = text(args, 0);
    let value = interp
        .sub_args
        .last()
        .and_then(|table| table.get(name))
        .cloned()
        .ok_or_else(|| interp.name_error(NameKind::Argument, name))?;
    match value {
        Argument::Text(s) => {
            interp.print(&s)?;
            Ok(false)
        }
        Argument::Code(seq) => run_code(interp, Some(seq)),
    }
}

// Replacer matches. Outside a replacer body both print nothing.

fn tag_match(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    if let Some(m) = interp.matches.last().cloned() {
        interp.print(m.text())?;
    }
    Ok(false)
}

fn tag_group(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let Some(m) = interp.matches.last().cloned() else {
        return Ok(false);
    };
    if let Some(group) = m.group(text(args, 0)) {
        interp.print(group)?;
    }
    Ok(false)
}

// Formatting

fn tag_caps(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let case: Case = text(args, 0)
        .parse()
        .map_err(|e: String| interp.invalid(&tag.text, e))?;
    interp.output().set_case(case);
    Ok(false)
}

fn tag_capsinfer(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    if let Some(case) = infer_case(text(args, 0)) {
        interp.output().set_case(case);
    }
    Ok(false)
}

fn tag_numfmt(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let format: NumberFormat = text(args, 0)
        .parse()
        .map_err(|e: String| interp.invalid(&tag.text, e))?;
    interp.number_format = format;
    Ok(false)
}

// Channels and targets

fn tag_out_public(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.output().push_channel(text(args, 0), Visibility::Public);
    Ok(false)
}

fn tag_out(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let visibility: Visibility = text(args, 1)
        .parse()
        .map_err(|e: String| interp.invalid(&tag.text, e))?;
    interp.output().push_channel(text(args, 0), visibility);
    Ok(false)
}

fn tag_close(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.output().pop_channel(text(args, 0));
    Ok(false)
}

fn tag_mark(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.output().set_marker(text(args, 0));
    Ok(false)
}

fn tag_dist(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let (a, b) = (text(args, 0), text(args, 1));
    let distance = interp
        .output()
        .measure_distance(a, b)
        .ok_or_else(|| interp.name_error(NameKind::Marker, &format!("{};{}", a, b)))?;
    interp.print_number(distance as i64)?;
    Ok(false)
}

fn tag_copy(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let (a, b) = (text(args, 0), text(args, 1));
    let region = interp
        .output()
        .copy_region(a, b)
        .ok_or_else(|| interp.name_error(NameKind::Marker, &format!("{};{}", a, b)))?;
    interp.print(&region)?;
    Ok(false)
}

fn tag_get(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.output().create_target(text(args, 0));
    Ok(false)
}

fn send(interp: &mut Interpreter<'_>, args: &[Argument], overwrite: bool) -> Result<bool> {
    let (name, value) = (text(args, 0), args.get(1).map(Argument::as_str).unwrap_or_default());
    interp.with_output(|out, limit| out.write_to_target(name, value, overwrite, limit))?;
    Ok(false)
}

fn tag_send(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    send(interp, args, false)
}

fn tag_osend(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    send(interp, args, true)
}

fn tag_clrt(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.output().clear_target(text(args, 0));
    Ok(false)
}

fn tag_article(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    interp.with_output(|out, limit| out.write_article(limit))?;
    Ok(false)
}

// Host hooks

fn tag_extern(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let name = text(args, 0);
    let hook = interp
        .host
        .hooks
        .get(name)
        .map(Arc::clone)
        .ok_or_else(|| interp.name_error(NameKind::Hook, name))?;
    let values: Vec<String> = args[1..].iter().map(|a| a.as_str().to_string()).collect();
    let result = hook(&values);
    interp.print(&result)?;
    Ok(false)
}

// Generators

fn tag_len(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let len = args.first().map_or(0, |a| a.as_str().chars().count());
    interp.print_number(len as i64)?;
    Ok(false)
}

/// Parse `a-z0-9_` into inclusive character ranges.
fn char_ranges(set: &str) -> Option<Vec<(u32, u32)>> {
    let chars: Vec<char> = set.chars().collect();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if i + 2 < chars.len() && chars[i + 1] == '-' {
            let (lo, hi) = (chars[i] as u32, chars[i + 2] as u32);
            if lo > hi {
                return None;
            }
            ranges.push((lo, hi));
            i += 3;
        } else {
            ranges.push((chars[i] as u32, chars[i] as u32));
            i += 1;
        }
    }
    (!ranges.is_empty()).then_some(ranges)
}

fn random_chars(interp: &mut Interpreter<'_>, tag: &Token, set: &str, count: usize) -> Result<bool> {
    let ranges = char_ranges(set)
        .ok_or_else(|| interp.invalid(&tag.text, format!("bad character ranges '{}'", set)))?;
    let total: u64 = ranges.iter().map(|(lo, hi)| (hi - lo + 1) as u64).sum();
    let mut out = String::with_capacity(count);
    for _ in 0..count {
        let mut pick = interp.rng.next_raw() % total;
        for &(lo, hi) in &ranges {
            let size = (hi - lo + 1) as u64;
            if pick < size {
                if let Some(c) = char::from_u32(lo + pick as u32) {
                    out.push(c);
                }
                break;
            }
            pick -= size;
        }
    }
    interp.print(&out)?;
    Ok(false)
}

fn tag_char(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let set = text(args, 0).to_string();
    random_chars(interp, tag, &set, 1)
}

fn tag_char_count(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let set = text(args, 0).to_string();
    let count = parse_int(interp, tag, text(args, 1))?;
    let count = usize::try_from(count)
        .map_err(|_| interp.invalid(&tag.text, "count cannot be negative"))?;
    random_chars(interp, tag, &set, count)
}

fn tag_num(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let min = parse_int(interp, tag, text(args, 0))?;
    let max = parse_int(interp, tag, text(args, 1))?;
    if min > max {
        return Err(interp.invalid(&tag.text, format!("empty range {}..{}", min, max)));
    }
    let n = interp.rng.next_range(min, max.saturating_add(1));
    interp.print_number(n)?;
    Ok(false)
}

fn tag_dec(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    let value = interp.rng.next_f64();
    interp.print(&value.to_string())?;
    Ok(false)
}

fn tag_src(interp: &mut Interpreter<'_>, _tag: &Token, _args: &mut [Argument]) -> Result<bool> {
    let code = interp.pattern_code();
    interp.print(&code)?;
    Ok(false)
}

// Flags and comparisons

fn tag_define(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    for arg in args.iter() {
        let flag = arg.as_str().trim();
        if !flag.is_empty() {
            interp.host.flags.insert(flag.to_string());
        }
    }
    Ok(false)
}

fn tag_undef(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    for arg in args.iter() {
        interp.host.flags.remove(arg.as_str().trim());
    }
    Ok(false)
}

fn flag_branch(interp: &mut Interpreter<'_>, args: &[Argument], want: bool) -> Result<bool> {
    let defined = interp.host.flags.contains(text(args, 0));
    let taken = defined == want;
    interp.else_armed = !taken;
    if taken {
        run_code(interp, code(args, 1))
    } else {
        Ok(false)
    }
}

fn tag_ifdef(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    flag_branch(interp, args, true)
}

fn tag_ifndef(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    flag_branch(interp, args, false)
}

fn tag_else(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    if !interp.else_armed {
        return Ok(false);
    }
    interp.else_armed = false;
    run_code(interp, code(args, 0))
}

fn tag_cmp(interp: &mut Interpreter<'_>, _tag: &Token, args: &mut [Argument]) -> Result<bool> {
    interp.comparisons.push(Comparison {
        a: text(args, 0).to_string(),
        b: text(args, 1).to_string(),
    });
    interp.defer(Continuation::PopComparison);
    run_code(interp, code(args, 2))
}

fn tag_is(interp: &mut Interpreter<'_>, tag: &Token, args: &mut [Argument]) -> Result<bool> {
    let comparison = interp
        .comparisons
        .last()
        .cloned()
        .ok_or_else(|| interp.invalid(&tag.text, "no comparison is active"))?;
    let mut holds = false;
    for condition in text(args, 0).split(|c: char| c.is_whitespace() || c == ',' || c == '|') {
        if condition.is_empty() {
            continue;
        }
        match comparison.holds(condition) {
            Some(result) => holds |= result,
            None => {
                return Err(interp.invalid(&tag.text, format!("unknown condition '{}'", condition)))
            }
        }
    }
    interp.else_armed = !holds;
    if holds {
        run_code(interp, code(args, 1))
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_signatures() {
        let rep = lookup("rep").unwrap();
        let r = lookup("R").unwrap();
        assert_eq!(rep.signatures().len(), r.signatures().len());
        assert!(lookup("nosuchtag").is_none());
    }

    #[test]
    fn signature_selection_by_count() {
        let nth = lookup("nth").unwrap();
        assert_eq!(nth.signature(2).unwrap().params.len(), 2);
        assert_eq!(nth.signature(3).unwrap().params.len(), 3);
        assert!(nth.signature(1).is_none());
        // Longest signature is tried first.
        assert_eq!(nth.signatures()[0].params.len(), 3);
    }

    #[test]
    fn variadic_matches_at_or_above_minimum() {
        let define = lookup("define").unwrap();
        assert!(define.signature(0).is_none());
        assert!(define.signature(1).is_some());
        assert!(define.signature(5).is_some());
        assert!(!define.signature(5).unwrap().is_code(4));
    }

    #[test]
    fn code_params_are_marked() {
        let sig = lookup("branch").unwrap().signature(2).unwrap();
        assert!(!sig.is_code(0));
        assert!(sig.is_code(1));
    }

    #[test]
    fn char_range_parsing() {
        assert_eq!(char_ranges("a-c"), Some(vec![(97, 99)]));
        assert_eq!(char_ranges("x0-1"), Some(vec![(120, 120), (48, 49)]));
        assert_eq!(char_ranges("z-a"), None);
        assert_eq!(char_ranges(""), None);
        // A trailing hyphen is a literal.
        assert_eq!(char_ranges("a-"), Some(vec![(97, 97), (45, 45)]));
    }
}
