/// Execution frames and the deferred actions attached to them.

use regex::Regex;
use std::sync::Arc;

use crate::core::functions::FuncSig;
use crate::core::output::ChannelStack;
use crate::core::reader::TokenReader;
use crate::core::replacer::RegexMatch;
use crate::core::subroutine::{Param, Subroutine};
use crate::core::token::{Token, TokenSeq};

/// One argument slot of a pending tag or subroutine call.
#[derive(Debug, Clone)]
pub enum ArgSlot {
    /// Filled from the result stack once the argument frame finishes.
    Evaluated,
    /// Known without running anything.
    Literal(String),
    Code(TokenSeq),
}

/// A deferred action. Each is run at most once; the returned flag asks the
/// run loop to restart from the top of the frame stack.
#[derive(Debug, Clone)]
pub enum Continuation {
    /// Call a tag once its evaluated arguments are on the result stack.
    Tag {
        sig: &'static FuncSig,
        token: Token,
        slots: Vec<ArgSlot>,
    },
    SubCall {
        sub: Arc<Subroutine>,
        token: Token,
        slots: Vec<ArgSlot>,
    },
    PopSubArgs,
    /// Compile a meta definition's output as a subroutine body.
    DefineMeta {
        name: String,
        params: Vec<Param>,
        token: Token,
    },
    /// Run one repetition of the repeater with this id.
    Iterate(u64),
    Advance(u64),
    Suppress(u64),
    Restore(u64),
    MergeRng,
    PopComparison,
    /// Run the previous frame's output as a pattern.
    Metapattern { token: Token },
    Expression { print: bool, token: Token },
    /// Run `fallback` if nothing was written since `size` was taken.
    Alt { size: usize, fallback: TokenSeq },
    /// Run `then` if something was written since `size` was taken.
    Any { size: usize, then: TokenSeq },
    /// Match the previous frame's output and run `body` once per match.
    Replacer {
        regex: Arc<Regex>,
        body: TokenSeq,
        token: Token,
    },
    /// Splice one result per span back into `input` and print it.
    ReplaceJoin {
        input: String,
        spans: Vec<(usize, usize)>,
    },
    PushMatch(Arc<RegexMatch>),
    PopMatch,
}

#[derive(Debug)]
pub struct Frame {
    pub id: u64,
    pub reader: TokenReader,
    /// Present while the frame owns its output and has not published it.
    pub output: Option<ChannelStack>,
    /// Index of the frame whose output this one writes to.
    pub output_frame: usize,
    /// Length of the result stack when the frame was pushed.
    pub results_mark: usize,
    pub pre: Vec<Continuation>,
    pub post: Vec<Continuation>,
    owns_output: bool,
    finished: bool,
}

impl Frame {
    pub fn new(
        id: u64,
        seq: TokenSeq,
        owner: Option<usize>,
        self_index: usize,
        results_mark: usize,
    ) -> Self {
        let owns_output = owner.is_none();
        Frame {
            id,
            reader: TokenReader::new(seq),
            output: owns_output.then(ChannelStack::new),
            output_frame: owner.unwrap_or(self_index),
            results_mark,
            pre: Vec::new(),
            post: Vec::new(),
            owns_output,
            finished: false,
        }
    }

    pub fn shares_output(&self) -> bool {
        !self.owns_output
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Mark the frame finished. Returns its output on the first call if the
    /// frame owns one.
    pub fn finish(&mut self) -> Option<ChannelStack> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.output.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::Pattern;

    #[test]
    fn finish_publishes_once() {
        let seq = Pattern::compile("t", "x").unwrap().sequence();
        let mut frame = Frame::new(1, seq, None, 0, 0);
        assert!(!frame.shares_output());
        assert!(frame.finish().is_some());
        assert!(frame.finish().is_none());
        assert!(frame.is_finished());
    }

    #[test]
    fn shared_frame_points_at_owner() {
        let seq = Pattern::compile("t", "x").unwrap().sequence();
        let mut frame = Frame::new(2, seq, Some(0), 3, 0);
        assert!(frame.shares_output());
        assert_eq!(frame.output_frame, 0);
        assert!(frame.finish().is_none());
    }
}
