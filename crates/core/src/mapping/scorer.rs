//! Confidence scoring of imported events against the class catalog
//!
//! Pure functions: the same event and catalog always produce the same
//! verdict. Classes are visited in id order and ties go to the lowest id.

use std::cmp::Ordering;

use studiosync_domain::constants::REASON_LOW_CONFIDENCE;
use studiosync_domain::utils::text::{contains_phrase, title_similarity};
use studiosync_domain::{
    Catalog, CatalogClass, EventMapping, ImportedEvent, MappingConfig, MappingWeights,
    MigrationStatus, ScheduleSlot,
};

/// Partial credit for a category keyword found in the event text.
const CATEGORY_KEYWORD_SCORE: f64 = 0.6;

#[derive(Debug, Clone)]
struct Signal {
    contribution: f64,
    reason: String,
}

/// Score of one catalog class for one event.
#[derive(Debug, Clone)]
pub struct ClassScore {
    pub class_id: String,
    pub instructor_id: Option<String>,
    pub score: f64,
    /// Strongest signal first.
    pub reasons: Vec<String>,
}

fn class_instructor_email<'a>(class: &'a CatalogClass, catalog: &'a Catalog) -> Option<&'a str> {
    class.instructor_email.as_deref().or_else(|| {
        let instructor_id = class.instructor_id.as_deref()?;
        catalog.instructors.iter().find(|i| i.id == instructor_id)?.email.as_deref()
    })
}

/// Weighted signal sum for `class`, clamped to 1.0.
pub fn score_class(
    event: &ImportedEvent,
    class: &CatalogClass,
    catalog: &Catalog,
    weights: &MappingWeights,
) -> ClassScore {
    let mut signals = Vec::new();

    let title = title_similarity(&event.title, &class.name);
    if title > 0.0 {
        signals.push(Signal {
            contribution: weights.title * title,
            reason: format!("title similarity {title:.2} with \"{}\"", class.name),
        });
    }

    if let (Some(event_email), Some(class_email)) =
        (event.instructor_email.as_deref(), class_instructor_email(class, catalog))
    {
        if event_email.trim().eq_ignore_ascii_case(class_email.trim()) {
            signals.push(Signal {
                contribution: weights.instructor_email,
                reason: format!("instructor email {} matches", class_email.trim()),
            });
        }
    }

    if let Some(category) = class.category.as_deref() {
        let exact = event.category.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(category));
        if exact {
            signals.push(Signal {
                contribution: weights.category,
                reason: format!("category {category} matches"),
            });
        } else {
            let text = format!("{} {}", event.title, event.description.as_deref().unwrap_or_default());
            if contains_phrase(&text, category) {
                signals.push(Signal {
                    contribution: weights.category * CATEGORY_KEYWORD_SCORE,
                    reason: format!("category keyword \"{category}\" in event text"),
                });
            }
        }
    }

    let slot = ScheduleSlot::of(event.start_time);
    let recurrence = catalog
        .schedules_for(&class.id)
        .map(|schedule| slot.similarity(&schedule.slot()))
        .fold(0.0_f64, f64::max);
    if recurrence > 0.0 {
        signals.push(Signal {
            contribution: weights.recurrence * recurrence,
            reason: format!("recurring time slot ({recurrence:.1})"),
        });
    }

    signals.sort_by(|a, b| b.contribution.partial_cmp(&a.contribution).unwrap_or(Ordering::Equal));
    let score = signals.iter().map(|s| s.contribution).sum::<f64>().min(1.0);

    let instructor_id = class.instructor_id.clone().or_else(|| {
        let email = event.instructor_email.as_deref()?;
        catalog.instructor_by_email(email).map(|i| i.id.clone())
    });

    ClassScore {
        class_id: class.id.clone(),
        instructor_id,
        score,
        reasons: signals.into_iter().map(|s| s.reason).collect(),
    }
}

/// Every class scored, best first, ties broken by id.
pub fn rank(event: &ImportedEvent, catalog: &Catalog, weights: &MappingWeights) -> Vec<ClassScore> {
    let mut scores: Vec<ClassScore> =
        catalog.classes.iter().map(|class| score_class(event, class, catalog, weights)).collect();
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.class_id.cmp(&b.class_id))
    });
    scores
}

/// Decide the mapping verdict for `event`.
///
/// - `>= auto_map_threshold` with a clear winner: `Mapped`
/// - a runner-up within `ambiguity_margin` of an auto-map winner, or a score
///   in `[review_threshold, auto_map_threshold)`: `Pending` for review
/// - below `review_threshold`: `Skipped`
pub fn evaluate(event: &ImportedEvent, catalog: &Catalog, config: &MappingConfig) -> EventMapping {
    let mut mapping = EventMapping {
        event_id: event.id.clone(),
        external_id: event.external_id.clone(),
        suggested_class_id: None,
        suggested_instructor_id: None,
        confidence_score: 0.0,
        mapping_reasons: Vec::new(),
        requires_manual_review: false,
        migration_status: MigrationStatus::Skipped,
        mapped_schedule_id: None,
    };

    let ranked = rank(event, catalog, &config.weights);
    let Some(best) = ranked.first() else {
        mapping.mapping_reasons = vec!["no catalog classes".to_string(), REASON_LOW_CONFIDENCE.to_string()];
        return mapping;
    };

    mapping.confidence_score = best.score;
    mapping.mapping_reasons = best.reasons.clone();

    if best.score < config.review_threshold {
        mapping.mapping_reasons.push(REASON_LOW_CONFIDENCE.to_string());
        return mapping;
    }

    mapping.suggested_class_id = Some(best.class_id.clone());
    mapping.suggested_instructor_id = best.instructor_id.clone();

    if best.score >= config.auto_map_threshold {
        let contender = ranked
            .get(1)
            .filter(|runner_up| best.score - runner_up.score <= config.ambiguity_margin);
        match contender {
            Some(runner_up) => {
                mapping.mapping_reasons.push(format!(
                    "ambiguous: {} scored {:.2}",
                    runner_up.class_id, runner_up.score
                ));
                mapping.migration_status = MigrationStatus::Pending;
                mapping.requires_manual_review = true;
            }
            None => mapping.migration_status = MigrationStatus::Mapped,
        }
    } else {
        mapping.migration_status = MigrationStatus::Pending;
        mapping.requires_manual_review = true;
    }

    mapping
}
