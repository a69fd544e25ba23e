// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Preference storage, scope resolution, and deterministic response
//! rewriting, the second half of component L.
//!
//! Grounded on `PreferenceManager` in the source this spec was distilled
//! from (`original_source/.../learning/preference_manager.py`):
//! `_filter_by_scope` becomes [`PreferenceStore::applicable`],
//! `_apply_single_preference`'s dispatch table and its `_convert_to_*`/
//! `_shorten_response`/`_formalize_tone`/`_casualize_tone` helpers are
//! ported verbatim into [`apply_to_response`], and `resolve_conflicts`'s
//! tie-break chain becomes [`PreferenceStore::resolve_conflicts`].

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceType {
    OutputFormat,
    ResponseLength,
    CommunicationStyle,
    ContentType,
}

/// How widely a preference applies. Narrower scopes are filtered in only
/// when the caller's current context matches; [`PreferenceScope::Global`]
/// always applies (spec §4.12's `task > topic > session > global`
/// precedence only matters once two scopes both match and conflict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceScope {
    Global,
    Session,
    Topic,
    TaskType,
}

impl PreferenceScope {
    /// Scope precedence at lookup: task > topic > session > global (spec
    /// §3). Compared before priority/confidence/recency when two
    /// conflicting preferences' scopes differ.
    pub fn specificity(self) -> u8 {
        match self {
            PreferenceScope::Global => 0,
            PreferenceScope::Session => 1,
            PreferenceScope::Topic => 2,
            PreferenceScope::TaskType => 3,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Preference {
    pub preference_id: Uuid,
    pub user_id: String,
    pub preference_type: PreferenceType,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub priority: u32,
    pub scope: PreferenceScope,
    /// Set only for [`PreferenceScope::Session`] preferences.
    pub session_id: Option<String>,
    pub extraction_method: String,
    pub created_at: DateTime<Utc>,
}

/// The caller's current context, used to decide which scoped preferences
/// apply (mirrors `_filter_by_scope`'s session/topic/task_type checks).
#[derive(Debug, Clone, Default)]
pub struct ApplicationContext {
    pub session_id: Option<String>,
    pub topic: Option<String>,
    pub task_type: Option<String>,
}

/// One text transform applied while replaying preferences onto a
/// response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Modification {
    pub preference_id: Uuid,
    pub preference_key: String,
    pub preference_value: String,
    pub modification_type: String,
}

/// Outcome of [`apply_to_response`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct PreferenceApplicationResult {
    pub modified_response: String,
    pub original_response: String,
    pub preferences_applied: Vec<Uuid>,
    pub modifications_made: Vec<Modification>,
}

/// A detected conflict between two preferences sharing a (type, key).
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    pub conflict_type: PreferenceType,
    pub conflict_key: String,
    pub winner: Uuid,
    pub loser: Uuid,
}

/// Owns one user's preferences and answers scope-filtered lookups and
/// conflict resolution. No singleton: the caller constructs and keeps
/// one per process or per tenant, same as [`crate::risk::RiskEngine`].
#[derive(Default)]
pub struct PreferenceStore {
    by_user: DashMap<String, Vec<Preference>>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self { by_user: DashMap::new() }
    }

    pub fn store(&self, preference: Preference) {
        self.by_user.entry(preference.user_id.clone()).or_default().push(preference);
    }

    /// Preferences for `user_id` that apply in `ctx`, ported from
    /// `_filter_by_scope`: global always matches, session/topic/task_type
    /// only match when the corresponding context field is present and
    /// equal.
    pub fn applicable(&self, user_id: &str, ctx: &ApplicationContext) -> Vec<Preference> {
        let Some(all) = self.by_user.get(user_id) else { return Vec::new() };
        all.iter()
            .filter(|p| match p.scope {
                PreferenceScope::Global => true,
                PreferenceScope::Session => {
                    p.session_id.is_some() && p.session_id == ctx.session_id
                }
                PreferenceScope::Topic => ctx.topic.is_some(),
                PreferenceScope::TaskType => ctx.task_type.is_some(),
            })
            .cloned()
            .collect()
    }

    /// Resolves conflicts among preferences sharing a (type, key) with
    /// differing values. Scope precedence decides first — task > topic >
    /// session > global (spec §3) — and only preferences tied on scope
    /// fall through to the `resolve_conflicts` tie-break chain: higher
    /// priority, then higher confidence, then the more recently created
    /// preference. Returns the winners (deduplicated by key) plus the
    /// resolutions recorded along the way.
    pub fn resolve_conflicts(&self, preferences: Vec<Preference>) -> (Vec<Preference>, Vec<ConflictResolution>) {
        let mut seen: HashMap<(PreferenceType, String), Preference> = HashMap::new();
        let mut conflicts = Vec::new();

        for pref in preferences {
            let key = (pref.preference_type, pref.key.clone());
            match seen.get(&key) {
                None => {
                    seen.insert(key, pref);
                }
                Some(existing) if existing.value != pref.value => {
                    let existing = existing.clone();
                    let (winner, loser) = if pref.scope.specificity() > existing.scope.specificity() {
                        (pref, existing)
                    } else if pref.scope.specificity() < existing.scope.specificity() {
                        (existing, pref)
                    } else if pref.priority > existing.priority {
                        (pref, existing)
                    } else if pref.priority < existing.priority {
                        (existing, pref)
                    } else if pref.confidence > existing.confidence {
                        (pref, existing)
                    } else if pref.confidence < existing.confidence {
                        (existing, pref)
                    } else if pref.created_at > existing.created_at {
                        (pref, existing)
                    } else {
                        (existing, pref)
                    };

                    conflicts.push(ConflictResolution {
                        conflict_type: key.0,
                        conflict_key: key.1.clone(),
                        winner: winner.preference_id,
                        loser: loser.preference_id,
                    });
                    seen.insert(key, winner);
                }
                Some(_) => {}
            }
        }

        (seen.into_values().collect(), conflicts)
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let trimmed = text.trim();
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = trimmed.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?') && i + 1 <= bytes.len() {
            let boundary = i + 1;
            let is_end = boundary == bytes.len() || bytes[boundary].is_ascii_whitespace();
            if is_end {
                let piece = trimmed[start..boundary].trim();
                if !piece.is_empty() {
                    sentences.push(piece);
                }
                start = boundary;
            }
        }
    }
    let rest = trimmed[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn has_bullets(text: &str) -> bool {
    text.lines().any(|l| matches!(l.trim_start().as_bytes().first(), Some(b'-') | Some(b'*')))
}

fn has_numbers(text: &str) -> bool {
    text.lines().any(|l| {
        let t = l.trim_start();
        let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
        !digits.is_empty() && t[digits.len()..].starts_with('.')
    })
}

fn convert_to_bullet_points(text: &str) -> Option<String> {
    if has_bullets(text) {
        return None;
    }
    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return None;
    }
    Some(sentences.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n"))
}

fn convert_to_numbered_list(text: &str) -> Option<String> {
    if has_numbers(text) {
        return None;
    }
    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return None;
    }
    Some(
        sentences
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {s}", i + 1))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn shorten_response(text: &str, target_sentences: usize) -> Option<String> {
    let sentences = split_sentences(text);
    if sentences.len() <= target_sentences {
        return None;
    }
    Some(sentences[..target_sentences].join(" "))
}

const FORMAL_REPLACEMENTS: &[(&str, &str)] = &[
    ("don't", "do not"),
    ("doesn't", "does not"),
    ("can't", "cannot"),
    ("won't", "will not"),
    ("I'm", "I am"),
    ("you're", "you are"),
    ("it's", "it is"),
    ("that's", "that is"),
];

const CASUAL_REPLACEMENTS: &[(&str, &str)] =
    &[("do not", "don't"), ("does not", "doesn't"), ("cannot", "can't"), ("will not", "won't")];

fn formalize_tone(text: &str) -> Option<String> {
    let mut out = text.to_string();
    let mut changed = false;
    for (informal, formal) in FORMAL_REPLACEMENTS {
        if out.contains(informal) {
            out = out.replace(informal, formal);
            changed = true;
        }
    }
    changed.then_some(out)
}

fn casualize_tone(text: &str) -> Option<String> {
    let mut out = text.to_string();
    let mut changed = false;
    for (formal, informal) in CASUAL_REPLACEMENTS {
        if out.contains(formal) {
            out = out.replace(formal, informal);
            changed = true;
        }
    }
    changed.then_some(out)
}

/// Dispatches one preference to its text transform, the Rust counterpart
/// of `_apply_single_preference`'s `(type, key, value)` match. Preference
/// type/key/value combinations with no corresponding transform (table
/// format, code comments, technical-term simplification) fall through
/// unmodified, matching what the original leaves unimplemented.
fn apply_single_preference(text: &str, preference: &Preference) -> Option<(String, &'static str)> {
    match (preference.preference_type, preference.key.as_str(), preference.value.as_str()) {
        (PreferenceType::OutputFormat, "response_format", "bullet_points") => {
            convert_to_bullet_points(text).map(|t| (t, "format_to_bullets"))
        }
        (PreferenceType::OutputFormat, "response_format", "numbered_list") => {
            convert_to_numbered_list(text).map(|t| (t, "format_to_numbered"))
        }
        (PreferenceType::ResponseLength, "response_length", "short") => {
            shorten_response(text, 3).map(|t| (t, "shorten_response"))
        }
        (PreferenceType::ResponseLength, "response_length", "concise") => {
            shorten_response(text, 5).map(|t| (t, "shorten_response"))
        }
        (PreferenceType::CommunicationStyle, "tone", "formal") => formalize_tone(text).map(|t| (t, "formalize_tone")),
        (PreferenceType::CommunicationStyle, "tone", "casual") => casualize_tone(text).map(|t| (t, "casualize_tone")),
        _ => None,
    }
}

/// Applies every preference in `preferences`, in order, to `response`.
/// Each preference sees the output of the one before it, so an earlier
/// reformat (e.g. to bullets) changes what a later length trim operates
/// on — the same sequential-fold behavior as `apply_to_response`'s loop.
pub fn apply_to_response(response: &str, preferences: &[Preference]) -> PreferenceApplicationResult {
    let mut modified = response.to_string();
    let mut applied = Vec::new();
    let mut modifications = Vec::new();

    for preference in preferences {
        if let Some((new_text, modification_type)) = apply_single_preference(&modified, preference) {
            modified = new_text;
            applied.push(preference.preference_id);
            modifications.push(Modification {
                preference_id: preference.preference_id,
                preference_key: preference.key.clone(),
                preference_value: preference.value.clone(),
                modification_type: modification_type.to_string(),
            });
        }
    }

    PreferenceApplicationResult {
        modified_response: modified,
        original_response: response.to_string(),
        preferences_applied: applied,
        modifications_made: modifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pref(key: &str, value: &str, priority: u32, confidence: f64) -> Preference {
        Preference {
            preference_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            preference_type: PreferenceType::OutputFormat,
            key: key.to_string(),
            value: value.to_string(),
            confidence,
            priority,
            scope: PreferenceScope::Global,
            session_id: None,
            extraction_method: "manual".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn bullet_conversion_splits_on_sentence_boundaries() {
        let text = "First point here. Second point here. Third point here.";
        let p = pref("response_format", "bullet_points", 70, 0.6);
        let result = apply_to_response(text, &[p]);
        assert_eq!(result.modified_response, "- First point here.\n- Second point here.\n- Third point here.");
        assert_eq!(result.modifications_made[0].modification_type, "format_to_bullets");
    }

    #[test]
    fn already_bulleted_text_is_left_alone() {
        let text = "- Already here.\n- Already there.";
        let p = pref("response_format", "bullet_points", 70, 0.6);
        let result = apply_to_response(text, &[p]);
        assert_eq!(result.modified_response, text);
        assert!(result.preferences_applied.is_empty());
    }

    #[test]
    fn shorten_keeps_only_target_sentence_count() {
        let text = "One. Two. Three. Four. Five.";
        let mut p = pref("response_length", "short", 65, 0.6);
        p.preference_type = PreferenceType::ResponseLength;
        let result = apply_to_response(text, &[p]);
        assert_eq!(result.modified_response, "One. Two. Three.");
    }

    #[test]
    fn formalize_tone_expands_contractions() {
        let text = "I'm sure that's right, you're correct.";
        let mut p = pref("tone", "formal", 60, 0.6);
        p.preference_type = PreferenceType::CommunicationStyle;
        let result = apply_to_response(text, &[p]);
        assert_eq!(result.modified_response, "I am sure that is right, you are correct.");
    }

    #[test]
    fn higher_priority_preference_wins_conflict() {
        let store = PreferenceStore::new();
        let low = pref("response_format", "numbered_list", 40, 0.9);
        let high = pref("response_format", "bullet_points", 70, 0.5);
        let (winners, conflicts) = store.resolve_conflicts(vec![low.clone(), high.clone()]);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].preference_id, high.preference_id);
        assert_eq!(conflicts[0].winner, high.preference_id);
    }

    #[test]
    fn equal_priority_falls_back_to_confidence_then_recency() {
        let store = PreferenceStore::new();
        let a = pref("response_format", "bullet_points", 50, 0.6);
        let mut b = pref("response_format", "numbered_list", 50, 0.9);
        b.preference_type = a.preference_type;
        let (winners, _) = store.resolve_conflicts(vec![a, b.clone()]);
        assert_eq!(winners[0].preference_id, b.preference_id);
    }

    #[test]
    fn global_preference_always_applies() {
        let store = PreferenceStore::new();
        store.store(pref("response_format", "bullet_points", 70, 0.6));
        let applicable = store.applicable("u1", &ApplicationContext::default());
        assert_eq!(applicable.len(), 1);
    }

    #[test]
    fn session_scoped_preference_requires_matching_session() {
        let store = PreferenceStore::new();
        let mut p = pref("tone", "formal", 60, 0.6);
        p.scope = PreferenceScope::Session;
        p.session_id = Some("s1".to_string());
        store.store(p);

        let no_match = store.applicable("u1", &ApplicationContext::default());
        assert!(no_match.is_empty());

        let ctx = ApplicationContext { session_id: Some("s1".to_string()), ..Default::default() };
        let matched = store.applicable("u1", &ctx);
        assert_eq!(matched.len(), 1);
    }
}
