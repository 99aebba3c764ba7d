use airbar_backend::auth::{create_auth_message, sign, verify_auth_with_timestamp};
use airbar_backend::config::PricingConfig;
use airbar_backend::models::*;
use airbar_backend::pricing::{round_money, PriceEstimator, PriceQuery};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

fn sample_trip(remaining: i64) -> Trip {
    let now = Utc::now().naive_utc();
    Trip {
        id: Uuid::new_v4(),
        traveler_id: Uuid::new_v4(),
        origin_city: "Accra".to_string(),
        origin_country: "GH".to_string(),
        destination_city: "Toronto".to_string(),
        destination_country: "CA".to_string(),
        departure_date: NaiveDate::from_ymd_opt(2030, 3, 10).unwrap(),
        arrival_date: None,
        capacity_kg: Decimal::from(20),
        remaining_kg: Decimal::from(remaining),
        price_per_kg: Decimal::from(6),
        status: TripStatus::Active.as_str().to_string(),
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

fn sample_escrow(status: EscrowStatus, release_in: Option<Duration>) -> EscrowRecord {
    let now = Utc::now().naive_utc();
    EscrowRecord {
        id: Uuid::new_v4(),
        match_id: Uuid::new_v4(),
        sender_id: Uuid::new_v4(),
        traveler_id: Uuid::new_v4(),
        amount: Decimal::new(5500, 2),
        traveler_payout: Decimal::new(5000, 2),
        platform_fee: Decimal::new(500, 2),
        status: status.as_str().to_string(),
        payment_reference: "ref".to_string(),
        held_at: now,
        auto_release_at: release_in.map(|d| now + d),
        released_at: None,
        refunded_at: None,
    }
}

/// Walk the delivery lifecycle and confirm each step is the only way forward
#[test]
fn test_match_lifecycle_order() {
    use MatchStatus::*;
    let path = [Pending, Accepted, Paid, Confirmed, InTransit, Delivered];

    for pair in path.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
    }
    for (i, from) in path.iter().enumerate() {
        for to in path.iter().skip(i + 2) {
            assert!(!from.can_transition_to(*to), "{:?} should not skip to {:?}", from, to);
        }
    }
    for status in MatchStatus::ALL {
        assert!(!Cancelled.can_transition_to(status));
    }
}

#[test]
fn test_escrow_follows_match_states() {
    for status in MatchStatus::ALL {
        if status.is_disputable() {
            assert!(status.has_escrow());
            assert!(status.can_transition_to(MatchStatus::Disputed));
        }
    }
    assert!(!MatchStatus::Accepted.has_escrow());
    assert!(MatchStatus::Accepted.holds_capacity());
    assert!(!MatchStatus::Pending.holds_capacity());
}

#[test]
fn test_auto_release_due() {
    let now = Utc::now().naive_utc();
    let past = sample_escrow(EscrowStatus::Held, Some(Duration::hours(-1)));
    let future = sample_escrow(EscrowStatus::Held, Some(Duration::hours(1)));
    let unscheduled = sample_escrow(EscrowStatus::Held, None);
    let disputed = sample_escrow(EscrowStatus::Disputed, Some(Duration::hours(-1)));

    assert!(past.is_due_for_release(now));
    assert!(!future.is_due_for_release(now));
    assert!(!unscheduled.is_due_for_release(now));
    assert!(!disputed.is_due_for_release(now));
}

#[test]
fn test_trip_capacity_and_route() {
    let trip = sample_trip(5);

    assert_eq!(trip.reserved_kg(), Decimal::from(15));
    assert!(trip.can_carry(Decimal::from(5)));
    assert!(!trip.can_carry(Decimal::new(501, 2)));
    assert!(!trip.can_carry(Decimal::ZERO));
    assert!(trip.serves_route("gh", "ca"));
    assert!(!trip.serves_route("CA", "GH"));
}

#[test]
fn test_match_pricing_matches_escrow_split() {
    let estimator = PriceEstimator::new(PricingConfig::default());
    let trip = sample_trip(20);
    let estimate = estimator
        .estimate(&PriceQuery {
            weight_kg: Decimal::new(35, 1),
            distance_km: None,
            origin_country: trip.origin_country.clone(),
            destination_country: trip.destination_country.clone(),
            rate_per_kg: Some(trip.price_per_kg),
        })
        .unwrap();

    // 3.5 kg at 6.00 plus the cross-border flat fee
    assert_eq!(estimate.subtotal, Decimal::new(3600, 2));
    assert_eq!(estimate.platform_fee, estimator.platform_fee(estimate.subtotal).unwrap());
    assert_eq!(estimate.total, estimate.traveler_payout() + estimate.platform_fee);
}

#[test]
fn test_round_money_half_cent() {
    assert_eq!(round_money(Decimal::new(10005, 3)), Decimal::new(1001, 2));
    assert_eq!(round_money(Decimal::new(-10005, 3)), Decimal::new(-1001, 2));
    assert_eq!(round_money(Decimal::new(10004, 3)), Decimal::new(1000, 2));
}

#[test]
fn test_signature_binds_user_and_time() {
    let user = Uuid::new_v4();
    let now = Utc::now().timestamp();
    let signature = sign("shared", user, now);

    assert!(create_auth_message(user, now).contains(&now.to_string()));
    assert!(verify_auth_with_timestamp("shared", user, now, &signature, false).is_ok());
    assert!(verify_auth_with_timestamp("shared", user, now, &signature.to_uppercase(), false).is_ok());
    assert!(verify_auth_with_timestamp("shared", user, now + 1, &signature, false).is_err());
}

#[test]
fn test_status_strings_round_trip_through_storage() {
    for status in MatchStatus::ALL {
        assert_eq!(MatchStatus::from(status.as_str().to_string()), status);
    }
    assert_eq!(TripStatus::from_str("ACTIVE"), Ok(TripStatus::Active));
    assert!(ParcelStatus::from_str("lost").is_err());
}
