use crate::models::event::{Event, EventCategory};

const NON_EVENT_TITLE_KEYWORDS: [&str; 4] = ["reminder", "note", "to-do", "checklist"];

const FLEXIBLE_KEYWORDS: [&str; 14] = [
    "gym",
    "workout",
    "yoga",
    "exercise",
    "fitness",
    "reading",
    "walk",
    "chores",
    "coffee",
    "meditation",
    "personal",
    "hobby",
    "shopping",
    "errands",
];

const GYM_KEYWORDS: [&str; 3] = ["gym", "workout", "yoga"];

/// Keyword lists used to categorize free text. Ties go to the earlier entry.
pub const CATEGORY_KEYWORDS: [(EventCategory, &[&str]); 5] = [
    (
        EventCategory::Personal,
        &[
            "birthday",
            "anniversary",
            "family",
            "friend",
            "dinner",
            "lunch",
            "party",
            "date night",
            "personal",
        ],
    ),
    (
        EventCategory::Work,
        &[
            "meeting",
            "work",
            "office",
            "project",
            "client",
            "deadline",
            "presentation",
            "standup",
            "conference",
            "interview",
        ],
    ),
    (
        EventCategory::Appointments,
        &[
            "doctor",
            "dentist",
            "appointment",
            "clinic",
            "hospital",
            "checkup",
            "therapy",
            "haircut",
            "vet",
        ],
    ),
    (
        EventCategory::Activities,
        &[
            "gym", "workout", "yoga", "exercise", "hike", "swim", "tennis", "soccer", "class",
            "practice",
        ],
    ),
    (
        EventCategory::Reminders,
        &["remind", "reminder", "todo", "to-do", "checklist", "pay ", "pick up"],
    ),
];

fn searchable_text(event: &Event) -> String {
    format!("{} {}", event.title, event.category.as_str()).to_lowercase()
}

/// Reminders, notes and checklists occupy no time.
pub fn is_real_event(event: &Event) -> bool {
    if event.category == EventCategory::Reminders {
        return false;
    }
    let title = event.title.to_lowercase();
    !NON_EVENT_TITLE_KEYWORDS
        .iter()
        .any(|keyword| title.contains(keyword))
}

/// Events the engine may move on its own.
pub fn is_flexible_event(event: &Event) -> bool {
    if event.category == EventCategory::Activities {
        return true;
    }
    let text = searchable_text(event);
    FLEXIBLE_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

pub fn is_gym_event(event: &Event) -> bool {
    let text = searchable_text(event);
    GYM_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// Picks the event to move off an overbooked day: the first flexible event
/// that is not a workout, else the first workout.
pub fn pick_reschedule_candidate<'a>(events: &[&'a Event]) -> Option<&'a Event> {
    let flexible: Vec<&Event> = events
        .iter()
        .copied()
        .filter(|event| is_flexible_event(event))
        .collect();

    flexible
        .iter()
        .copied()
        .find(|event| !is_gym_event(event))
        .or_else(|| flexible.first().copied())
}

/// Highest keyword score wins; ties keep enumeration order; no hit is Personal.
pub fn classify_text(text: &str) -> EventCategory {
    classify_text_scored(text).0
}

/// Category plus the number of keywords that selected it.
pub fn classify_text_scored(text: &str) -> (EventCategory, usize) {
    let lowered = text.to_lowercase();
    let mut best = EventCategory::Personal;
    let mut best_score = 0usize;

    for (category, keywords) in CATEGORY_KEYWORDS.iter() {
        let score = keywords
            .iter()
            .filter(|keyword| lowered.contains(*keyword))
            .count();
        if score > best_score {
            best = *category;
            best_score = score;
        }
    }

    (best, best_score)
}
