//! Path tidying for finished recordings.
//!
//! Recorder output looks like `/dvr/New_-Some-Show_/New_-Some-Show_2020-01-0121-00.ts`.
//! The renamer turns that into `/dvr/Some Show/Some Show - 2020-01-01T2100.ts`
//! and then applies the user's own substitution rules.

use std::sync::OnceLock;
use log::{error, info};
use regex::Regex;
use crate::config::{RenameConfig, RenameRule};

fn timestamp_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})(\d{2})-(\d{2})").expect("static regex"))
}

fn full_timestamp_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2,4}T?\d{2}-?(?:\d{4}|\d{2})").expect("static regex"))
}

fn new_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"New_?-?").expect("static regex"))
}

fn whitespace_cleaner() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// A user rename rule with its pattern compiled
#[derive(Debug, Clone)]
pub struct CompiledRule {
    old: Regex,
    new: String,
}

impl CompiledRule {
    pub fn compile(rule: &RenameRule) -> Result<Self, regex::Error> {
        Ok(Self {
            old: Regex::new(&format!("(?i){}", rule.old))?,
            new: rule.new.clone(),
        })
    }

    /// Apply the rule to the parent directory and file name of an absolute path
    pub fn apply(&self, path: &str) -> String {
        if !path.starts_with('/') {
            error!("rename: path is not absolute: {}", path);
            return path.to_string();
        }

        let elems: Vec<&str> = path.split('/').collect();
        let prefix_len = elems.len().saturating_sub(2);
        let target = elems[prefix_len..].join("/");

        if !self.old.is_match(&target) {
            return path.to_string();
        }

        info!("rename: applying rule '{}' -> '{}'", self.old.as_str(), self.new);
        let target = self.old.replace_all(&target, self.new.as_str());

        let prefix = elems[..prefix_len].join("/");
        let joined = format!("{}/{}", prefix, target.trim_start_matches('/'));
        if joined.starts_with('/') {
            joined
        } else {
            format!("/{}", joined)
        }
    }
}

/// Renamer built from a single configuration snapshot.
///
/// Create one per job so a config reload cannot change a rename half way through.
#[derive(Debug, Clone, Default)]
pub struct Renamer {
    pub fix_timestamps: bool,
    pub remove_new: bool,
    pub fix_spacing: bool,
    rules: Vec<CompiledRule>,
}

impl Renamer {
    pub fn from_config(cfg: &RenameConfig) -> Self {
        let rules = cfg
            .rules
            .iter()
            .filter_map(|rule| match CompiledRule::compile(rule) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    error!("rename: skipping rule '{}': {}", rule.old, e);
                    None
                }
            })
            .collect();

        Self {
            fix_timestamps: cfg.fix_timestamps,
            remove_new: cfg.remove_new,
            fix_spacing: cfg.fix_spacing,
            rules,
        }
    }

    /// Rename the provided path based on the renamer settings
    pub fn rename(&self, path: &str) -> String {
        let path = self.fix_timestamps(path);
        let path = self.remove_new(&path);
        let path = self.fix_spacing(&path);
        self.apply_rules(&path)
    }

    /// `2020-01-0121-00` -> `2020-01-01T2100`
    fn fix_timestamps(&self, path: &str) -> String {
        if !self.fix_timestamps {
            return path.to_string();
        }
        timestamp_matcher()
            .replace_all(path, "${1}-${2}-${3}T${4}${5}")
            .into_owned()
    }

    fn remove_new(&self, path: &str) -> String {
        if !self.remove_new {
            return path.to_string();
        }

        // Only a marker at the very start of the file name counts, "New" elsewhere is part of the title
        let file = path.rsplit('/').next().unwrap_or(path);
        match new_matcher().find(file) {
            Some(m) if m.start() == 0 => new_matcher().replace_all(path, "").into_owned(),
            _ => path.to_string(),
        }
    }

    fn fix_spacing(&self, path: &str) -> String {
        if !self.fix_spacing {
            return path.to_string();
        }

        // Pull the timestamp out so its dashes survive
        let timestamp = full_timestamp_matcher()
            .find(path)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let mut path = if timestamp.is_empty() {
            path.to_string()
        } else {
            path.replace(&timestamp, "")
        };

        for (from, to) in [("_/", "/"), ("-/", "/"), ("_.", "."), ("-", " "), ("_", " - "), ("...", "")] {
            path = path.replace(from, to);
        }

        let ext = extension_of(&path).to_string();
        if !ext.is_empty() {
            path = path.replace(&ext, "");
        }
        path = format!("{} - {}{}", path, timestamp, ext);

        whitespace_cleaner().replace_all(&path, " ").into_owned()
    }

    fn apply_rules(&self, path: &str) -> String {
        self.rules
            .iter()
            .fold(path.to_string(), |path, rule| rule.apply(&path))
    }
}

/// Extension of the last path element including the dot, or "" when there is none
fn extension_of(path: &str) -> &str {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(i) => &path[file_start + i..],
        None => "",
    }
}
