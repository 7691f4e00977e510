//! Static event list served when the hosted store cannot be read.

use crate::types::{Category, Event, EventId, Money};
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

struct SeedEvent {
    id: u128,
    title: &'static str,
    short_description: &'static str,
    description: &'static str,
    date: (i32, u32, u32),
    time: (u32, u32),
    location: &'static str,
    price: u64,
    category: Category,
    image_url: &'static str,
    tags: &'static [&'static str],
    featured: bool,
    total: u32,
    available: u32,
}

const SEED: [SeedEvent; 6] = [
    SeedEvent {
        id: 0x5eed_0000_0000_4000_8000_0000_0000_0001,
        title: "Kathmandu Summer Sound",
        short_description: "Open-air concert in the valley",
        description: "A full evening of live bands and DJs on the Tundikhel grounds, with food stalls and a late-night set.",
        date: (2026, 6, 20),
        time: (19, 0),
        location: "Tundikhel, Kathmandu",
        price: 850_000,
        category: Category::Music,
        image_url: "https://images.boxoffice.local/events/summer-sound.jpg",
        tags: &["concert", "outdoor", "live"],
        featured: true,
        total: 5_000,
        available: 3_200,
    },
    SeedEvent {
        id: 0x5eed_0000_0000_4000_8000_0000_0000_0002,
        title: "Lakhe Dance Night",
        short_description: "Traditional masked dance performance",
        description: "An evening of classic Newari masked dances accompanied by a live dhime ensemble.",
        date: (2026, 5, 9),
        time: (20, 0),
        location: "Patan Durbar Square, Lalitpur",
        price: 200_000,
        category: Category::Culture,
        image_url: "https://images.boxoffice.local/events/lakhe-dance.jpg",
        tags: &["theatre", "traditional"],
        featured: false,
        total: 300,
        available: 120,
    },
    SeedEvent {
        id: 0x5eed_0000_0000_4000_8000_0000_0000_0003,
        title: "Bhaktapur Heritage Festival",
        short_description: "Five days of arts in the old city",
        description: "Chariot processions, lamp nights and performances across the squares of the old city.",
        date: (2026, 6, 5),
        time: (18, 30),
        location: "Taumadhi Square, Bhaktapur",
        price: 450_000,
        category: Category::Festival,
        image_url: "https://images.boxoffice.local/events/bhaktapur-festival.jpg",
        tags: &["festival", "heritage", "multi-day"],
        featured: true,
        total: 2_000,
        available: 1_500,
    },
    SeedEvent {
        id: 0x5eed_0000_0000_4000_8000_0000_0000_0004,
        title: "Pokhara Marathon",
        short_description: "Run the lakeside road at sunrise",
        description: "Full, half and 10K courses around Phewa Lake, finishing at Lakeside.",
        date: (2026, 8, 16),
        time: (4, 30),
        location: "Lakeside, Pokhara",
        price: 600_000,
        category: Category::Sports,
        image_url: "https://images.boxoffice.local/events/pokhara-marathon.jpg",
        tags: &["running", "outdoor"],
        featured: false,
        total: 8_000,
        available: 6_400,
    },
    SeedEvent {
        id: 0x5eed_0000_0000_4000_8000_0000_0000_0005,
        title: "Street Food Weekend",
        short_description: "Regional dishes from forty vendors",
        description: "Two days of momo, sel roti and dishes from every province, cooking demos and a night market.",
        date: (2026, 4, 25),
        time: (16, 0),
        location: "Bhrikuti Mandap, Kathmandu",
        price: 100_000,
        category: Category::Food,
        image_url: "https://images.boxoffice.local/events/street-food.jpg",
        tags: &["food", "market", "family"],
        featured: true,
        total: 3_000,
        available: 2_750,
    },
    SeedEvent {
        id: 0x5eed_0000_0000_4000_8000_0000_0000_0006,
        title: "Langtang Valley Trek",
        short_description: "Guided three-day mountain trek",
        description: "A small-group trek through the Langtang valley with teahouse nights and local guides.",
        date: (2026, 10, 3),
        time: (7, 0),
        location: "Syabrubesi, Rasuwa",
        price: 3_500_000,
        category: Category::Adventure,
        image_url: "https://images.boxoffice.local/events/langtang-trek.jpg",
        tags: &["trekking", "outdoor", "small-group"],
        featured: false,
        total: 40,
        available: 12,
    },
];

/// The seed events, soonest first.
#[must_use]
pub fn events() -> Vec<Event> {
    let mut events: Vec<Event> = SEED.iter().map(to_event).collect();
    events.sort_by(|a, b| (a.date, a.time).cmp(&(b.date, b.time)));
    events
}

/// One seed event by id
#[must_use]
pub fn find(id: EventId) -> Option<Event> {
    SEED.iter()
        .find(|seed| Uuid::from_u128(seed.id) == *id.as_uuid())
        .map(to_event)
}

fn to_event(seed: &SeedEvent) -> Event {
    let (year, month, day) = seed.date;
    let (hour, minute) = seed.time;
    Event {
        id: EventId::from_uuid(Uuid::from_u128(seed.id)),
        title: seed.title.to_string(),
        description: seed.description.to_string(),
        short_description: seed.short_description.to_string(),
        date: NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default(),
        time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default(),
        location: seed.location.to_string(),
        price: Money::from_minor(seed.price),
        category: seed.category,
        image_url: seed.image_url.to_string(),
        tags: seed.tags.iter().map(ToString::to_string).collect(),
        featured: seed.featured,
        organizer_id: None,
        total_tickets: seed.total,
        available_tickets: seed.available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn one_event_per_category() {
        let categories: HashSet<_> = events().iter().map(|e| e.category).collect();
        assert_eq!(categories.len(), 6);
    }

    #[test]
    fn inventory_is_consistent() {
        for event in events() {
            assert!(event.available_tickets <= event.total_tickets, "{}", event.title);
        }
    }

    #[test]
    fn find_by_id() {
        let first = events().remove(0);
        assert_eq!(find(first.id), Some(first));
        assert_eq!(find(EventId::new()), None);
    }
}
