//! Property tests for ticket codes, rendering and pricing.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use boxoffice::codes::{CodeGenerator, TICKET_ID_PREFIX};
use boxoffice::payment_gateway::PaymentDetails;
use boxoffice::render::{barcode_bars, escape_html};
use boxoffice::tickets::upgrade_price;
use boxoffice::types::{Money, TicketType};
use boxoffice_testing::FixedClock;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;

fn ticket_type() -> impl Strategy<Value = TicketType> {
    prop_oneof![
        Just(TicketType::Standard),
        Just(TicketType::Vip),
        Just(TicketType::EarlyBird),
        Just(TicketType::FanZone),
    ]
}

proptest! {
    #[test]
    fn ticket_ids_are_prefixed_base36(seed in any::<u64>()) {
        let codes = CodeGenerator::new("https://tickets.test").with_seed(seed);
        let id = codes.new_ticket_id();

        prop_assert!(id.starts_with(TICKET_ID_PREFIX));
        let suffix = &id[TICKET_ID_PREFIX.len()..];
        prop_assert_eq!(suffix.len(), 8);
        prop_assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn access_codes_are_six_digits(seed in any::<u64>()) {
        let codes = CodeGenerator::new("https://tickets.test").with_seed(seed);
        let code: u32 = codes.new_access_code().parse().unwrap();
        prop_assert!((100_000..=999_999).contains(&code));
    }

    #[test]
    fn barcodes_are_thirteen_digits(seed in any::<u64>(), millis in 0_i64..4_102_444_800_000, key in "[A-Z0-9-]{1,16}") {
        let clock = Arc::new(FixedClock::new(Utc.timestamp_millis_opt(millis).unwrap()));
        let codes = CodeGenerator::new("https://tickets.test").with_seed(seed).with_clock(clock);
        let barcode = codes.new_barcode(&key);

        prop_assert_eq!(barcode.len(), 13);
        prop_assert!(barcode.chars().all(|c| c.is_ascii_digit()));
        prop_assert_eq!(barcode_bars(&barcode).len(), 13);
    }

    #[test]
    fn same_seed_same_codes(seed in any::<u64>()) {
        let a = CodeGenerator::new("https://tickets.test").with_seed(seed);
        let b = CodeGenerator::new("https://tickets.test").with_seed(seed);
        prop_assert_eq!(a.new_ticket_id(), b.new_ticket_id());
        prop_assert_eq!(a.new_access_code(), b.new_access_code());
    }

    #[test]
    fn qr_payload_points_at_ticket(id in "TKT-[A-Z0-9]{8}") {
        let codes = CodeGenerator::new("https://tickets.test/");
        prop_assert_eq!(codes.new_qr_payload(&id), format!("https://tickets.test/verify/{id}"));
    }

    #[test]
    fn bar_heights_follow_parity(digits in "[0-9]{1,20}") {
        for (bar, digit) in barcode_bars(&digits).iter().zip(digits.chars().filter_map(|c| c.to_digit(10))) {
            let base = if digit % 2 == 0 { 40 } else { 28 };
            prop_assert_eq!(bar.height, base + digit * 2);
        }
    }

    #[test]
    fn escaped_text_has_no_markup(text in ".*") {
        let escaped = escape_html(&text);
        prop_assert!(!escaped.contains('<'));
        prop_assert!(!escaped.contains('>'));
        prop_assert!(!escaped.contains('"'));
    }

    #[test]
    fn upgrade_price_never_below_zero_and_scales(price in 0_u64..10_000_000, quantity in 1_u32..=10, ticket_type in ticket_type()) {
        let base = Money::from_minor(price);
        let one = upgrade_price(base, ticket_type, 1).unwrap();
        let many = upgrade_price(base, ticket_type, quantity).unwrap();
        prop_assert_eq!(many, one.checked_mul(quantity).unwrap());
        if matches!(ticket_type, TicketType::Standard | TicketType::EarlyBird) {
            prop_assert!(many.is_zero());
        }
    }

    #[test]
    fn short_card_numbers_are_declined(number in "[0-9]{0,12}") {
        let details = PaymentDetails::Card {
            number,
            holder: "A".to_string(),
            expiry: "01/30".to_string(),
            cvv: "000".to_string(),
        };
        prop_assert_eq!(details.validate(), Err("Card number must be 13 to 19 digits".to_string()));
    }
}
