/// The channel stack of one frame output, and the materialized result of a
/// run.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::channel::{Channel, PendingWrite, Visibility};
use crate::core::format::Case;
use crate::core::limits::{CharLimit, LimitExceeded};

pub const MAIN_CHANNEL: &str = "main";

/// Live channels plus the visitation stack deciding which are active.
#[derive(Debug, Clone)]
pub struct ChannelStack {
    channels: Vec<Channel>,
    index: FxHashMap<String, usize>,
    /// Indices into `channels`, bottom first. `main` is always at 0.
    stack: Vec<usize>,
}

impl Default for ChannelStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStack {
    pub fn new() -> Self {
        let mut index = FxHashMap::default();
        index.insert(MAIN_CHANNEL.to_string(), 0);
        ChannelStack {
            channels: vec![Channel::new(MAIN_CHANNEL, Visibility::Public)],
            index,
            stack: vec![0],
        }
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.index.get(name).map(|&i| &self.channels[i])
    }

    pub fn main(&self) -> &Channel {
        &self.channels[0]
    }

    /// Names on the visitation stack, bottom first.
    pub fn stack_names(&self) -> Vec<&str> {
        self.stack.iter().map(|&i| self.channels[i].name()).collect()
    }

    /// Make `name` active with the given visibility, creating it on first use.
    /// `main` is never pushed and keeps its visibility.
    pub fn push_channel(&mut self, name: &str, visibility: Visibility) {
        if name == MAIN_CHANNEL {
            return;
        }
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.channels.push(Channel::new(name, visibility));
                let idx = self.channels.len() - 1;
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        self.channels[idx].set_visibility(visibility);
        if !self.stack.contains(&idx) {
            self.stack.push(idx);
        }
    }

    /// Remove `name` from the visitation stack. The channel's text is kept.
    pub fn pop_channel(&mut self, name: &str) {
        if name == MAIN_CHANNEL {
            return;
        }
        if let Some(&idx) = self.index.get(name) {
            self.stack.retain(|&i| i != idx);
        }
    }

    /// Channels a write currently reaches, most recent first.
    ///
    /// Walking down from the top: a public channel is written and the walk
    /// continues; a private channel is written and ends the walk; an internal
    /// channel is written only while everything above it is internal. Hitting
    /// a boundary after a public channel was written also writes `main`.
    pub fn active(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.stack.len());
        let mut last: Option<Visibility> = None;
        let mut public_seen = false;

        for &idx in self.stack.iter().rev() {
            let visibility = self.channels[idx].visibility();
            match visibility {
                Visibility::Private => {
                    out.push(idx);
                    if public_seen && idx != 0 {
                        out.push(0);
                    }
                    return out;
                }
                Visibility::Internal if last == Some(Visibility::Public) => {
                    if public_seen {
                        out.push(0);
                    }
                    return out;
                }
                Visibility::Public if last == Some(Visibility::Internal) => {
                    if public_seen {
                        out.push(0);
                    }
                    return out;
                }
                Visibility::Public => public_seen = true,
                Visibility::Internal => {}
            }
            out.push(idx);
            last = Some(visibility);
        }
        out
    }

    /// Names of the active channels, most recent first.
    pub fn active_names(&self) -> Vec<&str> {
        self.active()
            .into_iter()
            .map(|i| self.channels[i].name())
            .collect()
    }

    /// Fan `text` out to the active channels. Each channel formats its copy
    /// first; the formatted total is checked against `limit` before any
    /// channel receives it.
    pub fn write(&mut self, text: &str, limit: &mut CharLimit) -> Result<(), LimitExceeded> {
        if text.is_empty() {
            return Ok(());
        }
        let pending: Vec<(usize, PendingWrite)> = self
            .active()
            .into_iter()
            .map(|idx| (idx, self.channels[idx].prepare_write(text)))
            .collect();
        limit.accumulate(pending.iter().map(|(_, p)| p.cost()).sum())?;
        for (idx, p) in pending {
            self.channels[idx].commit_write(p);
        }
        Ok(())
    }

    pub fn write_article(&mut self, limit: &mut CharLimit) -> Result<(), LimitExceeded> {
        let active = self.active();
        limit.accumulate(active.len())?;
        for idx in active {
            self.channels[idx].write_article();
        }
        Ok(())
    }

    pub fn set_case(&mut self, case: Case) {
        for idx in self.active() {
            self.channels[idx].set_case(case);
        }
    }

    pub fn create_target(&mut self, name: &str) {
        for idx in self.active() {
            self.channels[idx].create_target(name);
        }
    }

    pub fn write_to_target(
        &mut self,
        name: &str,
        value: &str,
        overwrite: bool,
        limit: &mut CharLimit,
    ) -> Result<(), LimitExceeded> {
        let active = self.active();
        let cost = active
            .iter()
            .map(|&idx| self.channels[idx].target_cost(name, value, overwrite))
            .sum();
        limit.accumulate(cost)?;
        for idx in active {
            self.channels[idx].write_to_target(name, value, overwrite);
        }
        Ok(())
    }

    pub fn clear_target(&mut self, name: &str) {
        for idx in self.active() {
            self.channels[idx].clear_target(name);
        }
    }

    pub fn set_marker(&mut self, name: &str) {
        for idx in self.active() {
            self.channels[idx].set_marker(name);
        }
    }

    /// Distance between markers in the most recent active channel holding
    /// both.
    pub fn measure_distance(&self, a: &str, b: &str) -> Option<usize> {
        self.active()
            .into_iter()
            .find_map(|idx| self.channels[idx].measure_distance(a, b))
    }

    pub fn copy_region(&self, a: &str, b: &str) -> Option<String> {
        self.active()
            .into_iter()
            .find_map(|idx| self.channels[idx].copy_region(a, b))
    }

    /// Total characters across every channel.
    pub fn size(&self) -> usize {
        self.channels.iter().map(Channel::len).sum()
    }

    pub fn into_output(self) -> Output {
        Output {
            channels: self
                .channels
                .into_iter()
                .map(|ch| (ch.name().to_string(), ch.value()))
                .collect(),
        }
    }
}

/// Final text of every channel a frame wrote, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    channels: Vec<(String, String)>,
}

impl Output {
    pub fn main(&self) -> &str {
        self.get(MAIN_CHANNEL).unwrap_or("")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.channels.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn into_main(self) -> String {
        self.channels
            .into_iter()
            .find(|(n, _)| n == MAIN_CHANNEL)
            .map(|(_, v)| v)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl From<Output> for HashMap<String, String> {
    fn from(output: Output) -> Self {
        output.channels.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with(channels: &[(&str, Visibility)]) -> ChannelStack {
        let mut stack = ChannelStack::new();
        for (name, vis) in channels {
            stack.push_channel(name, *vis);
        }
        stack
    }

    #[test]
    fn main_only() {
        let stack = ChannelStack::new();
        assert_eq!(stack.active_names(), vec!["main"]);
    }

    #[test]
    fn internal_below_public_is_skipped() {
        let stack = stack_with(&[("a", Visibility::Internal), ("b", Visibility::Public)]);
        assert_eq!(stack.active_names(), vec!["b", "main"]);
    }

    #[test]
    fn private_hides_main() {
        let stack = stack_with(&[("a", Visibility::Private)]);
        assert_eq!(stack.active_names(), vec!["a"]);
    }

    #[test]
    fn main_cannot_be_pushed_or_popped() {
        let mut stack = ChannelStack::new();
        stack.push_channel("main", Visibility::Private);
        stack.pop_channel("main");
        assert_eq!(stack.stack_names(), vec!["main"]);
        assert_eq!(stack.main().visibility(), Visibility::Public);
    }

    #[test]
    fn pushing_existing_channel_updates_visibility_only() {
        let mut stack = stack_with(&[("a", Visibility::Public)]);
        stack.push_channel("a", Visibility::Private);
        assert_eq!(stack.stack_names(), vec!["main", "a"]);
        assert_eq!(stack.active_names(), vec!["a"]);
    }

    #[test]
    fn writes_fan_out_and_persist_after_pop() {
        let mut limit = CharLimit::unlimited();
        let mut stack = stack_with(&[("side", Visibility::Public)]);
        stack.write("both ", &mut limit).unwrap();
        stack.pop_channel("side");
        stack.write("main", &mut limit).unwrap();
        let out = stack.into_output();
        assert_eq!(out.main(), "both main");
        assert_eq!(out.get("side"), Some("both "));
    }

    #[test]
    fn limit_counts_every_channel() {
        let mut limit = CharLimit::new(Some(9));
        let mut stack = stack_with(&[("side", Visibility::Public)]);
        stack.write("abcd", &mut limit).unwrap();
        assert!(stack.write("ab", &mut limit).is_err());
        assert_eq!(stack.main().value(), "abcd");
        assert_eq!(limit.used(), 8);
    }

    #[test]
    fn limit_counts_formatted_text() {
        let mut limit = CharLimit::new(Some(3));
        let mut stack = ChannelStack::new();
        stack.set_case(Case::Upper);
        stack.write("ß", &mut limit).unwrap();
        assert!(stack.write("ß", &mut limit).is_err());
        assert_eq!(stack.main().value(), "SS");
        assert_eq!(limit.used(), 2);
    }

    #[test]
    fn limit_counts_article_growth() {
        let mut limit = CharLimit::new(Some(2));
        let mut stack = ChannelStack::new();
        stack.write_article(&mut limit).unwrap();
        assert!(stack.write("e", &mut limit).is_err());
        assert_eq!(stack.main().value(), "a");
        assert_eq!(limit.used(), 1);
    }

    #[test]
    fn output_into_map() {
        let mut limit = CharLimit::unlimited();
        let mut stack = ChannelStack::new();
        stack.write("x", &mut limit).unwrap();
        let map: HashMap<String, String> = stack.into_output().into();
        assert_eq!(map.get("main").map(String::as_str), Some("x"));
    }
}
