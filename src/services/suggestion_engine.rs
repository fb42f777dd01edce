//! Smart suggestions computed from the event list.
//!
//! The engine is pure: the same `(events, now, context, dismissals)` always
//! yields the same suggestions, so callers recompute on every change instead
//! of invalidating anything.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use tracing::debug;

use crate::models::event::Event;
use crate::models::settings::{SchedulingConfig, SchedulingContext};
use crate::models::suggestion::{
    DenseBlockSuggestion, OverbookedSuggestion, Suggestion, SuggestionKey, SuggestionKind,
    SuggestionMode,
};
use crate::services::event_classifier::{is_real_event, pick_reschedule_candidate};
use crate::services::schedule_utils;
use crate::services::slot_finder::SlotFinder;
use crate::services::timezone;

pub const THREE_BACK_TO_BACKS_MESSAGE: &str =
    "Three back-to-backs coming up. Want to protect a 15-minute reset between them?";

pub const DENSE_BLOCK_MESSAGES: [&str; 4] = [
    "A few events are stacked close together. Leave yourself some breathing room.",
    THREE_BACK_TO_BACKS_MESSAGE,
    "Four events packed into one stretch. Moving one would buy you a real break.",
    "That's a marathon block. Grab water and a snack before it starts.",
];

pub fn dense_block_message(event_count: usize) -> &'static str {
    if event_count == 3 {
        return THREE_BACK_TO_BACKS_MESSAGE;
    }
    let index = event_count
        .saturating_sub(2)
        .min(DENSE_BLOCK_MESSAGES.len() - 1);
    DENSE_BLOCK_MESSAGES[index]
}

pub struct SuggestionEngine<'a> {
    config: &'a SchedulingConfig,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(config: &'a SchedulingConfig) -> Self {
        Self { config }
    }

    /// Overbooked days (today and the following days) in date order, then
    /// today's dense block, minus anything dismissed.
    pub fn compute(
        &self,
        events: &[Event],
        now: DateTime<Utc>,
        context: SchedulingContext,
        dismissed: &HashSet<SuggestionKey>,
    ) -> Vec<Suggestion> {
        let today = timezone::local_date(now, context.timezone);
        let mut suggestions = Vec::new();

        for offset in 0..self.config.overbooked_lookahead_days {
            let Some(date) = today.checked_add_signed(Duration::days(offset)) else {
                break;
            };
            if dismissed.contains(&SuggestionKey::new(SuggestionKind::Overbooked, date)) {
                continue;
            }
            if let Some(found) = self.detect_overbooked(events, date, now, context) {
                suggestions.push(Suggestion::Overbooked(found));
            }
        }

        if !dismissed.contains(&SuggestionKey::new(SuggestionKind::DenseBlock, today)) {
            if let Some(found) = self.detect_dense_block(events, now, context) {
                suggestions.push(Suggestion::DenseBlock(found));
            }
        }

        debug!(
            target: "app::suggestions",
            events = events.len(),
            dismissed = dismissed.len(),
            produced = suggestions.len(),
            "computed suggestions"
        );
        suggestions
    }

    pub fn detect_overbooked(
        &self,
        events: &[Event],
        date: NaiveDate,
        now: DateTime<Utc>,
        context: SchedulingContext,
    ) -> Option<OverbookedSuggestion> {
        let day_events = real_events_on(events, date, context);
        if day_events.len() < self.config.overbooked_threshold {
            return None;
        }

        let today = timezone::local_date(now, context.timezone);
        let candidate = pick_reschedule_candidate(&day_events).cloned();
        let (mode, available_slots) = match candidate.as_ref() {
            Some(_) => (
                SuggestionMode::Reschedule,
                SlotFinder::new(events, context, self.config).find(date, now),
            ),
            None => (SuggestionMode::UserPick, Vec::new()),
        };

        debug!(
            target: "app::suggestions",
            %date,
            count = day_events.len(),
            candidate = candidate.as_ref().map(|event| event.id.as_str()),
            slots = available_slots.len(),
            "overbooked day detected"
        );

        Some(OverbookedSuggestion {
            date,
            day_name: schedule_utils::relative_day_label(date, today),
            event_count: day_events.len(),
            candidate_event: candidate,
            mode,
            available_slots,
        })
    }

    pub fn detect_dense_block(
        &self,
        events: &[Event],
        now: DateTime<Utc>,
        context: SchedulingContext,
    ) -> Option<DenseBlockSuggestion> {
        let local_now = now.with_timezone(&context.timezone);
        if local_now.hour() < self.config.dense_block_earliest_hour {
            return None;
        }

        let today = local_now.date_naive();
        let mut day_events = real_events_on(events, today, context);
        let minimum = self.config.dense_block_min_events;
        if day_events.len() < minimum || day_events.is_empty() {
            return None;
        }
        day_events.sort_by_key(|event| event.datetime_utc);

        let length = Duration::minutes(self.config.assumed_event_minutes);
        let limit = Duration::minutes(self.config.dense_block_window_minutes);
        let gap = minimum.saturating_sub(1);

        for i in 0..day_events.len() {
            for j in (i + gap)..day_events.len() {
                let span_start = day_events[i].datetime_utc;
                let span_end = day_events[j].datetime_utc + length;
                let span = span_end - span_start;
                if span > limit {
                    continue;
                }

                let inside: Vec<Event> = day_events
                    .iter()
                    .filter(|event| {
                        event.datetime_utc >= span_start && event.datetime_utc + length <= span_end
                    })
                    .map(|event| (*event).clone())
                    .collect();

                if inside.len() >= minimum {
                    let hours = span.num_minutes() as f64 / 60.0;
                    debug!(
                        target: "app::suggestions",
                        date = %today,
                        count = inside.len(),
                        hours,
                        "dense block detected"
                    );
                    return Some(DenseBlockSuggestion {
                        date: today,
                        event_count: inside.len(),
                        time_span: schedule_utils::round_to_tenth(hours),
                        message: dense_block_message(inside.len()).to_string(),
                        events: inside,
                    });
                }
            }
        }

        None
    }
}

/// Real events whose local date is `date`, in input order.
pub fn real_events_on<'e>(
    events: &'e [Event],
    date: NaiveDate,
    context: SchedulingContext,
) -> Vec<&'e Event> {
    events
        .iter()
        .filter(|event| is_real_event(event))
        .filter(|event| timezone::local_date(event.datetime_utc, context.timezone) == date)
        .collect()
}
