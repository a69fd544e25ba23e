// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correction/Preference learners (component L): turns recurring user
//! corrections to AI output into durable preferences, and replays those
//! preferences onto future responses.
//!
//! - [`correction`] classifies a single correction and, once the same
//!   type has recurred often enough, synthesizes a [`preference::Preference`].
//! - [`preference`] stores/looks up preferences by scope and deterministically
//!   rewrites response text to match them.

pub mod correction;
pub mod preference;

pub use correction::{CorrectionLearner, CorrectionRecord, CorrectionType};
pub use preference::{Preference, PreferenceScope, PreferenceStore, PreferenceType};
