// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Subscription patterns and the middleware hook registry.
//!
//! Patterns use literal dot-separated segments plus `*` (exactly one
//! segment) and `**` (any number of segments, including none). Wildcards
//! are legal here and only here; data paths reject them.
//!
//! Hooks run inside the serialized write section, in LSN order, so they
//! must never call back into engine writes (that deadlocks on the write
//! lock by design of the single-writer protocol).

use std::sync::Arc;

use dotdb_kernel::Value;

use crate::error::{DbError, Result};

/// Engine methods a middleware hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Set,
    Delete,
    Push,
    Pull,
    Add,
    Subtract,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    One,
    Rest,
}

/// A compiled subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<PatternSegment>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Pattern> {
        if text.is_empty() {
            return Ok(Pattern { segments: Vec::new() });
        }
        let mut segments = Vec::new();
        for segment in text.split('.') {
            segments.push(match segment {
                "" => {
                    return Err(DbError::Path(format!(
                        "invalid pattern `{text}`: empty segment"
                    )))
                }
                "*" => PatternSegment::One,
                "**" => PatternSegment::Rest,
                literal if literal.contains('*') => {
                    return Err(DbError::Path(format!(
                        "invalid pattern `{text}`: `*` must stand alone in a segment"
                    )))
                }
                literal => PatternSegment::Literal(literal.to_string()),
            });
        }
        Ok(Pattern { segments })
    }

    pub fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('.').collect()
        };
        Self::matches_from(&self.segments, &segments)
    }

    fn matches_from(pattern: &[PatternSegment], path: &[&str]) -> bool {
        match pattern.split_first() {
            None => path.is_empty(),
            Some((PatternSegment::Literal(literal), rest)) => match path.split_first() {
                Some((head, tail)) => head == literal && Self::matches_from(rest, tail),
                None => false,
            },
            Some((PatternSegment::One, rest)) => match path.split_first() {
                Some((_, tail)) => Self::matches_from(rest, tail),
                None => false,
            },
            Some((PatternSegment::Rest, rest)) => (0..=path.len())
                .any(|skip| Self::matches_from(rest, &path[skip..])),
        }
    }
}

pub type SubscriberFn = dyn Fn(&str, Option<&Value>, Option<&Value>) + Send + Sync;
pub type BeforeFn = dyn Fn(&str, Value) -> Value + Send + Sync;
pub type AfterFn = dyn Fn(&str, Option<&Value>) + Send + Sync;

pub(crate) struct SubscriberEntry {
    pub id: u64,
    pub pattern: Pattern,
    pub callback: Box<SubscriberFn>,
}

pub(crate) struct BeforeEntry {
    pub id: u64,
    pub method: Method,
    pub pattern: Pattern,
    pub callback: Box<BeforeFn>,
}

pub(crate) struct AfterEntry {
    pub id: u64,
    pub method: Method,
    pub pattern: Pattern,
    pub callback: Box<AfterFn>,
}

/// Registered hooks. Entries are `Arc`ed so the write path can snapshot
/// the list and invoke callbacks without holding the registry lock.
#[derive(Default)]
pub(crate) struct HookRegistry {
    next_id: u64,
    subscribers: Vec<Arc<SubscriberEntry>>,
    before: Vec<Arc<BeforeEntry>>,
    after: Vec<Arc<AfterEntry>>,
}

impl HookRegistry {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn subscribe(&mut self, pattern: Pattern, callback: Box<SubscriberFn>) -> u64 {
        let id = self.fresh_id();
        self.subscribers.push(Arc::new(SubscriberEntry { id, pattern, callback }));
        id
    }

    pub fn unsubscribe(&mut self, id: u64) -> bool {
        let before_len = self.subscribers.len();
        self.subscribers.retain(|entry| entry.id != id);
        self.subscribers.len() != before_len
    }

    pub fn add_before(&mut self, method: Method, pattern: Pattern, callback: Box<BeforeFn>) -> u64 {
        let id = self.fresh_id();
        self.before.push(Arc::new(BeforeEntry { id, method, pattern, callback }));
        id
    }

    pub fn add_after(&mut self, method: Method, pattern: Pattern, callback: Box<AfterFn>) -> u64 {
        let id = self.fresh_id();
        self.after.push(Arc::new(AfterEntry { id, method, pattern, callback }));
        id
    }

    pub fn remove_hook(&mut self, id: u64) -> bool {
        let before_len = self.before.len() + self.after.len();
        self.before.retain(|entry| entry.id != id);
        self.after.retain(|entry| entry.id != id);
        self.before.len() + self.after.len() != before_len
    }

    pub fn before_snapshot(&self) -> BeforeHooks {
        BeforeHooks(self.before.clone())
    }

    pub fn after_snapshot(&self) -> Vec<Arc<AfterEntry>> {
        self.after.clone()
    }

    pub fn subscribers_snapshot(&self) -> Vec<Arc<SubscriberEntry>> {
        self.subscribers.clone()
    }
}

/// Snapshot of before-middleware taken at the start of a write.
pub(crate) struct BeforeHooks(Vec<Arc<BeforeEntry>>);

impl BeforeHooks {
    pub fn rewrite(&self, method: Method, path: &str, value: Value) -> Value {
        let mut current = value;
        for entry in &self.0 {
            if entry.method == method && entry.pattern.matches(path) {
                current = (entry.callback)(path, current);
            }
        }
        current
    }
}
