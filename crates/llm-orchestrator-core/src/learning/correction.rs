// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correction recording and pattern detection, the first half of
//! component L.
//!
//! Grounded on `CorrectionLearner` in the source this spec was distilled
//! from (`original_source/.../learning/correction_learner.py`):
//! classification is a straight port of `_classify_correction_type`, and
//! `_check_and_create_preference`'s "3+ occurrences in 30 days" rule
//! becomes [`CorrectionLearner::record`]'s rolling-window scan.

use super::preference::{Preference, PreferenceScope, PreferenceType};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Why a user corrected an AI response, classified by shape rather than
/// by asking a model (spec §4.12 — deterministic, rule-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionType {
    FormatPreference,
    LengthAdjustment,
    ToneAdjustment,
    ContentAddition,
    ContentRemoval,
    FactualError,
}

impl CorrectionType {
    /// Fixed priority used when a correction pattern becomes a preference
    /// (spec §4.12's priority table).
    pub fn priority(self) -> u32 {
        match self {
            CorrectionType::FormatPreference => 70,
            CorrectionType::LengthAdjustment => 65,
            CorrectionType::ToneAdjustment => 60,
            CorrectionType::ContentAddition => 50,
            CorrectionType::ContentRemoval => 50,
            CorrectionType::FactualError => 40,
        }
    }
}

/// A single recorded correction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CorrectionRecord {
    pub correction_id: Uuid,
    pub user_id: String,
    pub ai_response: String,
    pub user_correction: String,
    pub correction_type: CorrectionType,
    pub recorded_at: DateTime<Utc>,
}

fn bullet_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*[-*\u{2022}]").unwrap())
}

fn numbered_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+\.").unwrap())
}

fn contraction_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+n't\b|\bI'm\b|\byou're\b").unwrap())
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Classifies a correction by comparing shape, length, and tone of the
/// AI response against the user's rewrite. Mirrors
/// `_classify_correction_type`'s branch order exactly: format wins over
/// length, length wins over tone, tone wins over removal, everything
/// else defaults to a factual error.
pub fn classify_correction_type(ai_response: &str, user_correction: &str) -> CorrectionType {
    let ai_has_bullets = bullet_pattern().is_match(ai_response);
    let user_has_bullets = bullet_pattern().is_match(user_correction);
    let ai_has_numbers = numbered_pattern().is_match(ai_response);
    let user_has_numbers = numbered_pattern().is_match(user_correction);

    if (ai_has_bullets != user_has_bullets) || (ai_has_numbers != user_has_numbers) {
        return CorrectionType::FormatPreference;
    }

    let ai_len = word_count(ai_response);
    let user_len = word_count(user_correction);
    let length_ratio = if ai_len > 0 { user_len as f64 / ai_len as f64 } else { 1.0 };

    if length_ratio < 0.8 {
        return CorrectionType::LengthAdjustment;
    } else if length_ratio > 1.2 {
        return CorrectionType::ContentAddition;
    }

    let ai_contractions = contraction_pattern().find_iter(ai_response).count();
    let user_contractions = contraction_pattern().find_iter(user_correction).count();

    if (ai_contractions as i64 - user_contractions as i64).abs() >= 2 {
        return CorrectionType::ToneAdjustment;
    }

    if length_ratio > 0.5 && length_ratio < 0.8 {
        return CorrectionType::ContentRemoval;
    }

    CorrectionType::FactualError
}

/// Maps a classified correction to a concrete preference, reading the
/// specifics (which format, which direction) back out of the user's
/// rewrite. Returns `None` when the correction type carries no
/// extractable preference value, mirroring `_map_correction_to_preference`
/// returning `None` for a plain factual fix.
fn map_correction_to_preference(
    correction_type: CorrectionType,
    ai_response: &str,
    user_correction: &str,
) -> Option<(PreferenceType, String, String)> {
    match correction_type {
        CorrectionType::FormatPreference => {
            if bullet_pattern().is_match(user_correction) {
                Some((PreferenceType::OutputFormat, "response_format".into(), "bullet_points".into()))
            } else if numbered_pattern().is_match(user_correction) {
                Some((PreferenceType::OutputFormat, "response_format".into(), "numbered_list".into()))
            } else {
                None
            }
        }
        CorrectionType::LengthAdjustment => {
            let ai_len = word_count(ai_response) as f64;
            let user_len = word_count(user_correction) as f64;
            if ai_len == 0.0 {
                None
            } else if user_len < ai_len * 0.6 {
                Some((PreferenceType::ResponseLength, "response_length".into(), "short".into()))
            } else if user_len < ai_len * 0.8 {
                Some((PreferenceType::ResponseLength, "response_length".into(), "concise".into()))
            } else {
                None
            }
        }
        CorrectionType::ToneAdjustment => {
            let ai_contractions = contraction_pattern().find_iter(ai_response).count();
            let user_contractions = contraction_pattern().find_iter(user_correction).count();
            if user_contractions > ai_contractions {
                Some((PreferenceType::CommunicationStyle, "tone".into(), "casual".into()))
            } else if user_contractions < ai_contractions {
                Some((PreferenceType::CommunicationStyle, "tone".into(), "formal".into()))
            } else {
                None
            }
        }
        CorrectionType::ContentAddition | CorrectionType::ContentRemoval | CorrectionType::FactualError => None,
    }
}

fn confidence_for(occurrence_count: usize) -> f64 {
    if occurrence_count >= 10 {
        0.9
    } else if occurrence_count >= 5 {
        0.8
    } else {
        0.6
    }
}

/// Records corrections per user and, once a correction type recurs 3+
/// times within a trailing 30-day window, synthesizes a global
/// [`Preference`] from it (spec §4.12). Holds its own state — no
/// singleton, the caller owns an instance per process or per tenant.
pub struct CorrectionLearner {
    history: DashMap<String, Vec<CorrectionRecord>>,
    window: ChronoDuration,
    min_occurrences: usize,
}

impl Default for CorrectionLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionLearner {
    pub fn new() -> Self {
        Self { history: DashMap::new(), window: ChronoDuration::days(30), min_occurrences: 3 }
    }

    /// Records a correction and returns a freshly synthesized preference
    /// when this correction completed a recurring pattern. `recorded_at`
    /// is caller-supplied so callers (and tests) control the clock.
    pub fn record(
        &self,
        user_id: &str,
        ai_response: &str,
        user_correction: &str,
        recorded_at: DateTime<Utc>,
    ) -> (CorrectionRecord, Option<Preference>) {
        let correction_type = classify_correction_type(ai_response, user_correction);
        let record = CorrectionRecord {
            correction_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            ai_response: ai_response.to_string(),
            user_correction: user_correction.to_string(),
            correction_type,
            recorded_at,
        };

        let mut entry = self.history.entry(user_id.to_string()).or_default();
        entry.push(record.clone());

        let window_start = recorded_at - self.window;
        let occurrence_count =
            entry.iter().filter(|r| r.correction_type == correction_type && r.recorded_at >= window_start).count();
        drop(entry);

        if occurrence_count < self.min_occurrences {
            return (record, None);
        }

        let Some((preference_type, key, value)) =
            map_correction_to_preference(correction_type, ai_response, user_correction)
        else {
            return (record, None);
        };

        let preference = Preference {
            preference_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            preference_type,
            key,
            value,
            confidence: confidence_for(occurrence_count),
            priority: correction_type.priority(),
            scope: PreferenceScope::Global,
            session_id: None,
            extraction_method: "auto_from_correction".to_string(),
            created_at: recorded_at,
        };

        (record, Some(preference))
    }

    /// Corrections recorded for `user_id`, most recent last.
    pub fn history_for(&self, user_id: &str) -> Vec<CorrectionRecord> {
        self.history.get(user_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn format_change_outranks_everything_else() {
        let ai = "First sentence here. Second sentence here.";
        let user = "- First sentence here.\n- Second sentence here.";
        assert_eq!(classify_correction_type(ai, user), CorrectionType::FormatPreference);
    }

    #[test]
    fn shorter_rewrite_is_length_adjustment() {
        let ai = "one two three four five six seven eight nine ten";
        let user = "one two three";
        assert_eq!(classify_correction_type(ai, user), CorrectionType::LengthAdjustment);
    }

    #[test]
    fn longer_rewrite_is_content_addition() {
        let ai = "one two three four five";
        let user = "one two three four five six seven eight nine ten eleven twelve";
        assert_eq!(classify_correction_type(ai, user), CorrectionType::ContentAddition);
    }

    #[test]
    fn contraction_shift_is_tone_adjustment() {
        let ai = "I am certain that you are correct and that is fine.";
        let user = "I'm certain that you're correct and that's fine.";
        assert_eq!(classify_correction_type(ai, user), CorrectionType::ToneAdjustment);
    }

    #[test]
    fn third_occurrence_synthesizes_a_preference() {
        let learner = CorrectionLearner::new();
        let ai = "Item one here today. Item two here today. Item three here today.";
        let user = "- Item one here today.\n- Item two here today.\n- Item three here today.";

        let (_, p1) = learner.record("u1", ai, user, at(1));
        assert!(p1.is_none());
        let (_, p2) = learner.record("u1", ai, user, at(2));
        assert!(p2.is_none());
        let (_, p3) = learner.record("u1", ai, user, at(3));
        let preference = p3.expect("third occurrence should create a preference");
        assert_eq!(preference.value, "bullet_points");
        assert_eq!(preference.confidence, 0.6);
        assert_eq!(preference.priority, 70);
        assert_eq!(preference.scope, PreferenceScope::Global);
    }

    #[test]
    fn occurrences_outside_the_window_do_not_count() {
        let learner = CorrectionLearner::new();
        let ai = "Item one here today. Item two here today.";
        let user = "- Item one here today.\n- Item two here today.";

        learner.record("u1", ai, user, at(1));
        let (_, p) = learner.record("u1", ai, user, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert!(p.is_none());
    }

    #[test]
    fn tenth_occurrence_reaches_highest_confidence() {
        let learner = CorrectionLearner::new();
        let ai = "Item here today. Another item here today.";
        let user = "- Item here today.\n- Another item here today.";
        let mut last = None;
        for day in 1..=10 {
            let (_, p) = learner.record("u1", ai, user, at(day));
            last = p.or(last);
        }
        assert_eq!(last.unwrap().confidence, 0.9);
    }
}
