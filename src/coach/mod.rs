//! Coach decisions and narration
//!
//! Rule-based decision briefs, trade-mode scoping, rationale enrichment and
//! the deduplicating coach timeline.

pub mod brief;
pub mod dedupe;
pub mod explain;
pub mod policy;
pub mod types;

pub use brief::{build_context_hash, build_rule_based_decision};
pub use dedupe::{dedupe_coach_messages_for_timeline, CoachTimeline, TimelineStats, DEDUPE_WINDOW_MS};
pub use explain::apply_explainability;
pub use policy::normalize_coach_decision_for_mode;
pub use types::{CoachDecisionBrief, CoachDecisionRequest, CoachMessage, Verdict};
