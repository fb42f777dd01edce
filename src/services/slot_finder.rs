use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use crate::models::event::Event;
use crate::models::settings::{SchedulingConfig, SchedulingContext};
use crate::models::suggestion::Slot;
use crate::services::event_classifier::is_real_event;
use crate::services::schedule_utils::{self, DayWindow};
use crate::services::timezone;

const NEXT_DAY_CUTOFF_HOUR: u32 = 12;

/// Busy interval of a real event, already widened by the buffer.
#[derive(Debug, Clone, Copy)]
struct BusyInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Finds free windows for moving an event off `seed_day`.
///
/// The horizon is the seed day, the following day until local noon, and one
/// more full day after that. Steps are aligned to the day window's opening
/// hour; on the current day the search never starts before `now`.
pub struct SlotFinder<'a> {
    config: &'a SchedulingConfig,
    context: SchedulingContext,
    busy: Vec<BusyInterval>,
}

impl<'a> SlotFinder<'a> {
    pub fn new(events: &[Event], context: SchedulingContext, config: &'a SchedulingConfig) -> Self {
        let buffer = Duration::minutes(config.buffer_minutes);
        let length = Duration::minutes(config.assumed_event_minutes);
        let busy = events
            .iter()
            .filter(|event| is_real_event(event))
            .map(|event| BusyInterval {
                start: event.datetime_utc - buffer,
                end: event.datetime_utc + length + buffer,
            })
            .collect();

        Self {
            config,
            context,
            busy,
        }
    }

    pub fn find(&self, seed_day: NaiveDate, now: DateTime<Utc>) -> Vec<Slot> {
        let zone = self.context.timezone;
        let today = timezone::local_date(now, zone);
        let mut slots = Vec::new();

        let horizon = [
            (Some(seed_day), None),
            (seed_day.succ_opt(), Some(NEXT_DAY_CUTOFF_HOUR)),
            (seed_day.succ_opt().and_then(|day| day.succ_opt()), None),
        ];

        for (day, cutoff_hour) in horizon {
            if slots.len() >= self.config.max_slots {
                break;
            }
            let Some(day) = day else {
                continue;
            };
            if day < today {
                continue;
            }
            let Some(window) = schedule_utils::day_window(day, zone, self.context.weekend_mode)
            else {
                debug!(target: "app::slots", %day, "no day window, skipping");
                continue;
            };

            let search_end = match cutoff_hour.and_then(|hour| schedule_utils::local_at(day, hour, zone)) {
                Some(cutoff) => cutoff.min(window.end),
                None => window.end,
            };

            let search_start = if day == today {
                let clamped = schedule_utils::clamp_time_to_window(now, window.start);
                schedule_utils::align_to_step(clamped, window.start, self.config.step_minutes)
            } else {
                window.start
            };

            self.scan_day(&window, search_start, search_end, today, &mut slots);
        }

        debug!(
            target: "app::slots",
            seed_day = %seed_day,
            found = slots.len(),
            "slot search finished"
        );
        slots
    }

    fn scan_day(
        &self,
        window: &DayWindow,
        search_start: DateTime<Utc>,
        search_end: DateTime<Utc>,
        today: NaiveDate,
        slots: &mut Vec<Slot>,
    ) {
        let step = Duration::minutes(self.config.step_minutes.max(1));
        let length = Duration::minutes(self.config.slot_minutes);
        let mut cursor = search_start;

        while slots.len() < self.config.max_slots {
            let end = cursor + length;
            if end > search_end {
                break;
            }
            if window.contains(cursor, end) && self.is_clear(cursor, end) {
                slots.push(Slot {
                    start: cursor,
                    end,
                    label: schedule_utils::slot_label(cursor, self.context.timezone, today),
                });
            }
            cursor += step;
        }
    }

    fn is_clear(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !self
            .busy
            .iter()
            .any(|busy| schedule_utils::overlaps(start, end, busy.start, busy.end))
    }
}

pub fn find_free_slots(
    events: &[Event],
    seed_day: NaiveDate,
    now: DateTime<Utc>,
    context: SchedulingContext,
    config: &SchedulingConfig,
) -> Vec<Slot> {
    SlotFinder::new(events, context, config).find(seed_day, now)
}
