//! Action logging with pattern-based filtering and in-memory storage
//!
//! Logs dispatched actions through `tracing`, optionally keeping the most
//! recent ones in a ring buffer. Each entry records where the action sits in
//! the broadcast flow: marked for broadcast, received from a sibling (marker
//! present but cleared), or purely local.
//!
//! # Example
//!
//! ```
//! use dispatch_broadcast_core::logger::{ActionLogConfig, ActionLoggerMiddleware};
//! use dispatch_broadcast_core::{Action, StoreWithMiddleware};
//!
//! fn reducer(_: &mut (), _: Action) -> bool {
//!     true
//! }
//!
//! let middleware = ActionLoggerMiddleware::with_log(ActionLogConfig::default());
//! let mut store = StoreWithMiddleware::new((), reducer, middleware);
//! store.dispatch(Action::new("TodoAdd").with_meta_field("broadcast", true));
//!
//! let log = store.middleware().log().unwrap();
//! assert_eq!(log.len(), 1);
//! ```

use std::collections::VecDeque;

use serde_json::Value;

use crate::action::is_truthy;
use crate::config::DEFAULT_META_KEY;
use crate::store::Middleware;
use crate::Action;

/// Configuration for action logging with glob pattern filtering.
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
///
/// # Examples
///
/// - `Todo*` matches TodoAdd, TodoRemove, etc.
/// - `*Error*` matches any action type containing "Error"
/// - `__dispatch-broadcast_*` matches the library's own action types
#[derive(Debug, Clone, Default)]
pub struct ActionLoggerConfig {
    /// If non-empty, only log actions matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude actions matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

impl ActionLoggerConfig {
    /// Create a new config from comma-separated pattern strings
    ///
    /// # Example
    /// ```
    /// use dispatch_broadcast_core::logger::ActionLoggerConfig;
    ///
    /// let config = ActionLoggerConfig::new(Some("Todo*,Sync"), Some("TodoTick"));
    /// assert!(config.should_log("TodoAdd"));
    /// assert!(config.should_log("Sync"));
    /// assert!(!config.should_log("TodoTick"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_default(),
        }
    }

    /// Create a config with specific pattern vectors
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Check if an action type should be logged based on include/exclude patterns
    pub fn should_log(&self, action_name: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self
                .include_patterns
                .iter()
                .any(|p| glob_match(p, action_name))
        {
            return false;
        }

        !self
            .exclude_patterns
            .iter()
            .any(|p| glob_match(p, action_name))
    }
}

// ============================================================================
// In-Memory Action Log
// ============================================================================

/// Position of an action in the broadcast flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMark {
    /// No marker in `meta`
    Local,
    /// Truthy marker: will be sent to sibling contexts
    Outbound,
    /// Marker present but falsy, as left on received actions
    Received,
}

impl BroadcastMark {
    /// Classify `action` using the marker at `meta[meta_key]`
    pub fn of(action: &Action, meta_key: &str) -> Self {
        match action.meta_field(meta_key) {
            None => Self::Local,
            Some(value) if is_truthy(value) => Self::Outbound,
            Some(_) => Self::Received,
        }
    }
}

/// An entry in the action log
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    /// Action type
    pub name: String,
    /// Summary representation (from Action::summary())
    pub summary: String,
    /// Broadcast marker classification
    pub mark: BroadcastMark,
    /// Sequence number for ordering
    pub sequence: u64,
    /// Whether the action caused a state change (set after reducer runs)
    pub state_changed: Option<bool>,
}

impl ActionLogEntry {
    /// Create a new log entry
    pub fn new(name: String, summary: String, mark: BroadcastMark, sequence: u64) -> Self {
        Self {
            name,
            summary,
            mark,
            sequence,
            state_changed: None,
        }
    }
}

/// Configuration for the action log ring buffer
#[derive(Debug, Clone)]
pub struct ActionLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    /// Filter config
    pub filter: ActionLoggerConfig,
    /// `meta` field holding the broadcast marker
    pub meta_key: String,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: ActionLoggerConfig::default(),
            meta_key: DEFAULT_META_KEY.to_string(),
        }
    }
}

impl ActionLogConfig {
    /// Create with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Create with custom capacity and filter
    pub fn new(capacity: usize, filter: ActionLoggerConfig) -> Self {
        Self {
            capacity,
            filter,
            ..Default::default()
        }
    }

    /// Use a different broadcast marker field
    pub fn with_meta_key(mut self, meta_key: impl Into<String>) -> Self {
        self.meta_key = meta_key.into();
        self
    }
}

/// In-memory ring buffer for storing recent actions
///
/// Older entries are discarded when capacity is reached.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    config: ActionLogConfig,
    next_sequence: u64,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLog {
    /// Create a new action log with configuration
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Log an action (if it passes the filter)
    ///
    /// Returns the entry if it was logged, None if filtered out.
    pub fn log(&mut self, action: &Action) -> Option<&ActionLogEntry> {
        if !self.config.filter.should_log(action.name()) || self.config.capacity == 0 {
            return None;
        }

        let mark = BroadcastMark::of(action, &self.config.meta_key);
        let entry = ActionLogEntry::new(
            action.name().to_string(),
            action.summary(),
            mark,
            self.next_sequence,
        );
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(entry);
        self.entries.back()
    }

    /// Update the last entry with state_changed info (called after reducer)
    pub fn update_last_state_changed(&mut self, changed: bool) {
        if let Some(entry) = self.entries.back_mut() {
            entry.state_changed = Some(changed);
        }
    }

    /// Get all entries (oldest first)
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter()
    }

    /// Entries with the given broadcast classification (oldest first)
    pub fn with_mark(&self, mark: BroadcastMark) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().filter(move |entry| entry.mark == mark)
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Middleware that logs actions with configurable pattern filtering.
///
/// Supports two modes:
/// - **Tracing only** (default): logs via `tracing::debug!()`
/// - **With storage**: also stores entries in an [`ActionLog`]
#[derive(Debug, Clone)]
pub struct ActionLoggerMiddleware {
    config: ActionLoggerConfig,
    log: Option<ActionLog>,
    /// Tracks whether the last action was logged (for state_changed updates)
    last_action_logged: bool,
    /// When false, all methods become no-ops.
    active: bool,
}

impl ActionLoggerMiddleware {
    /// Create a new action logger middleware with tracing only
    pub fn new(config: ActionLoggerConfig) -> Self {
        Self {
            config,
            log: None,
            last_action_logged: false,
            active: true,
        }
    }

    /// Create middleware with in-memory storage
    pub fn with_log(config: ActionLogConfig) -> Self {
        Self {
            config: config.filter.clone(),
            log: Some(ActionLog::new(config)),
            last_action_logged: false,
            active: true,
        }
    }

    /// Create with no filtering (logs all actions), tracing only
    pub fn log_all() -> Self {
        Self::new(ActionLoggerConfig::default())
    }

    /// Set whether the middleware is active.
    ///
    /// ```ignore
    /// let middleware = ActionLoggerMiddleware::log_all().active(args.debug);
    /// ```
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Get the action log (if storage is enabled)
    pub fn log(&self) -> Option<&ActionLog> {
        self.log.as_ref()
    }
}

impl Middleware for ActionLoggerMiddleware {
    fn before(&mut self, action: &Action) {
        if !self.active {
            return;
        }

        if self.config.should_log(action.name()) {
            let meta = action.meta.as_ref().unwrap_or(&Value::Null);
            tracing::debug!(action = %action.name(), %meta, "action");
        }

        self.last_action_logged = false;
        if let Some(ref mut log) = self.log {
            if log.log(action).is_some() {
                self.last_action_logged = true;
            }
        }
    }

    fn after(&mut self, _action: &Action, state_changed: bool) {
        if !self.active {
            return;
        }

        // Only update state_changed if this action was actually logged
        if self.last_action_logged {
            if let Some(ref mut log) = self.log {
                log.update_last_state_changed(state_changed);
            }
        }
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star_pi = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(spi) = star_pi {
            pi = spi + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }

    pi == pattern.len()
}
