mod helpers;

use airbar_backend::cache::{CacheKeys, CacheTtl};
use airbar_backend::error::{AppError, RepositoryError};
use airbar_backend::models::*;
use airbar_backend::repositories::*;
use airbar_backend::services::*;
use helpers::*;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

// ============================================================================
// Migration Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_migrations_ran(pool: PgPool) {
    let tables = vec![
        "users",
        "trips",
        "parcels",
        "matches",
        "escrow_records",
        "disputes",
        "wallets",
        "payout_methods",
        "withdrawals",
        "wallet_transactions",
    ];

    for table in tables {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .expect("Failed to query information_schema");

        let exists: bool = row.get(0);
        assert!(exists, "Table {} should exist", table);
    }
}

// ============================================================================
// User Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_register_and_duplicate_email(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;

    let user = create_test_user(&db, "ada@example.com", UserRole::Both).await;
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.kyc_enum(), KycStatus::NotStarted);

    let again = db
        .state
        .users
        .register(RegisterUser {
            email: "ADA@example.com".to_string(),
            full_name: "Ada Again".to_string(),
            phone: None,
            role: None,
        })
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_kyc_workflow(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let user = create_test_user(&db, "kyc@example.com", UserRole::Traveler).await;

    // Cannot approve before submitting
    let early = db.state.users.review_kyc(user.id, true).await;
    assert!(matches!(early, Err(AppError::Conflict(_))));

    let pending = db.state.users.submit_kyc(user.id).await.unwrap();
    assert_eq!(pending.kyc_enum(), KycStatus::Pending);

    let verified = db.state.users.review_kyc(user.id, true).await.unwrap();
    assert!(verified.is_kyc_verified());
}

// ============================================================================
// Trip and Parcel Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_trip_create_and_search(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let traveler = create_test_user(&db, "t@example.com", UserRole::Traveler).await;

    let trip = create_test_trip(&db, traveler.id, 12).await;
    assert_eq!(trip.origin_country, "NG");
    assert_eq!(trip.destination_country, "GB");
    assert_eq!(trip.remaining_kg, Decimal::from(12));
    assert_eq!(trip.status_enum(), TripStatus::Active);

    let found = db
        .state
        .trips
        .search(TripSearch {
            origin_country: Some("ng".to_string()),
            destination_city: Some("london".to_string()),
            min_weight_kg: Some(Decimal::from(5)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, trip.id);

    let too_heavy = db
        .state
        .trips
        .search(TripSearch {
            min_weight_kg: Some(Decimal::from(20)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(too_heavy.is_empty());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_sender_only_user_cannot_publish_trip(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let sender = create_test_user(&db, "s@example.com", UserRole::Sender).await;

    let result = db.state.trips.create(sender.id, trip_request(10, 5)).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_trip_views_count_other_users(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let traveler = create_test_user(&db, "t@example.com", UserRole::Traveler).await;
    let viewer = create_test_user(&db, "v@example.com", UserRole::Sender).await;
    let trip = create_test_trip(&db, traveler.id, 10).await;

    db.state.trips.get(trip.id, Some(traveler.id)).await.unwrap();
    db.state.trips.get(trip.id, Some(viewer.id)).await.unwrap();
    db.state.trips.get(trip.id, Some(viewer.id)).await.unwrap();
    db.state.trips.get(trip.id, None).await.unwrap();

    let stats = db.state.trips.stats(traveler.id, trip.id).await.unwrap();
    assert_eq!(stats.views, 3);
    assert_eq!(stats.unique_viewers, 1);

    // Counters age out instead of living forever
    let week = CacheTtl::Weekly.as_secs();
    for key in [CacheKeys::trip_views(trip.id), CacheKeys::trip_viewers(trip.id)] {
        let ttl = db.state.cache.ttl(&key).await.expect("counter has a TTL");
        assert!(ttl > week - 60 && ttl <= week, "{} ttl {}", key, ttl);
    }

    let other = db.state.trips.stats(viewer.id, trip.id).await;
    assert!(matches!(other, Err(AppError::Forbidden(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_parcel_cancel_declines_pending_requests(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixture = MatchFixture::pending(&db).await;

    let cancelled = db
        .state
        .parcels
        .cancel(fixture.sender.id, fixture.parcel.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status_enum(), ParcelStatus::Cancelled);

    let m = db
        .state
        .matches
        .get(fixture.sender.id, fixture.matched.id)
        .await
        .unwrap();
    assert_eq!(m.status_enum(), MatchStatus::Cancelled);
}

// ============================================================================
// Match Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_duplicate_pending_request_rejected(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixture = MatchFixture::pending(&db).await;

    let again = db
        .state
        .matches
        .request(
            fixture.traveler.id,
            RequestMatch {
                trip_id: fixture.trip.id,
                parcel_id: fixture.parcel.id,
                agreed_price: None,
            },
        )
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_default_price_uses_trip_rate(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let sender = create_test_user(&db, "s@example.com", UserRole::Sender).await;
    let traveler = create_test_user(&db, "t@example.com", UserRole::Traveler).await;
    let trip = create_test_trip(&db, traveler.id, 10).await;
    let parcel = create_test_parcel(&db, sender.id, 2).await;

    let absurd = db
        .state
        .matches
        .request(
            sender.id,
            RequestMatch {
                trip_id: trip.id,
                parcel_id: parcel.id,
                agreed_price: Some(Decimal::MAX),
            },
        )
        .await;
    assert!(matches!(absurd, Err(AppError::Validation(_))));

    let m = db
        .state
        .matches
        .request(
            traveler.id,
            RequestMatch {
                trip_id: trip.id,
                parcel_id: parcel.id,
                agreed_price: None,
            },
        )
        .await
        .unwrap();

    // 2 kg at 10.00 plus the 15.00 cross-border flat fee, 10% commission
    assert_eq!(m.agreed_price, dec("35.00"));
    assert_eq!(m.platform_fee, dec("3.50"));
    assert_eq!(m.requested_by, traveler.id);
    assert_eq!(m.counterparty_of_requester(), sender.id);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_only_counterparty_accepts(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixture = MatchFixture::pending(&db).await;

    let own = db
        .state
        .matches
        .accept(fixture.sender.id, fixture.matched.id)
        .await;
    assert!(matches!(own, Err(AppError::Forbidden(_))));

    let accepted = db
        .state
        .matches
        .accept(fixture.traveler.id, fixture.matched.id)
        .await
        .unwrap();
    assert_eq!(accepted.status_enum(), MatchStatus::Accepted);

    let trip = db.state.trips.get(fixture.trip.id, None).await.unwrap();
    assert_eq!(trip.remaining_kg, Decimal::from(7));
    let parcel = db.state.parcels.get(fixture.parcel.id).await.unwrap();
    assert_eq!(parcel.status_enum(), ParcelStatus::Matched);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_payment_holds_escrow_and_pending_earnings(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixture = MatchFixture::paid(&db).await;

    let escrow = db
        .state
        .matches
        .escrow(fixture.sender.id, fixture.matched.id)
        .await
        .unwrap();
    assert_eq!(escrow.status_enum(), EscrowStatus::Held);
    assert_eq!(escrow.amount, dec("55.00"));
    assert_eq!(escrow.traveler_payout, dec("50.00"));
    assert_eq!(escrow.platform_fee, dec("5.00"));
    assert_eq!(escrow.payment_reference, "pay_test_001");

    let wallet = db.state.wallets.get_wallet(fixture.traveler.id).await.unwrap();
    assert_eq!(wallet.pending_balance, dec("50.00"));
    assert_eq!(wallet.available_balance, Decimal::ZERO);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_cancel_paid_match_refunds_sender(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixture = MatchFixture::paid(&db).await;

    let cancelled = db
        .state
        .matches
        .cancel(
            fixture.traveler.id,
            fixture.matched.id,
            CancelMatch {
                reason: Some("Flight cancelled".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status_enum(), MatchStatus::Cancelled);
    assert_eq!(cancelled.cancelled_reason.as_deref(), Some("Flight cancelled"));

    let escrow = db
        .state
        .matches
        .escrow(fixture.sender.id, fixture.matched.id)
        .await
        .unwrap();
    assert_eq!(escrow.status_enum(), EscrowStatus::Refunded);

    let sender_wallet = db.state.wallets.get_wallet(fixture.sender.id).await.unwrap();
    assert_eq!(sender_wallet.available_balance, dec("55.00"));
    let traveler_wallet = db.state.wallets.get_wallet(fixture.traveler.id).await.unwrap();
    assert_eq!(traveler_wallet.pending_balance, Decimal::ZERO);

    let trip = db.state.trips.get(fixture.trip.id, None).await.unwrap();
    assert_eq!(trip.remaining_kg, Decimal::from(10));
    let parcel = db.state.parcels.get(fixture.parcel.id).await.unwrap();
    assert_eq!(parcel.status_enum(), ParcelStatus::Open);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_steps_out_of_order_conflict(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixture = MatchFixture::paid(&db).await;

    let skipped = db
        .state
        .matches
        .deliver(fixture.traveler.id, fixture.matched.id)
        .await;
    assert!(matches!(skipped, Err(AppError::Conflict(_))));

    let early = db
        .state
        .matches
        .confirm_delivery(fixture.sender.id, fixture.matched.id)
        .await;
    assert!(matches!(early, Err(AppError::Conflict(_))));
}

// ============================================================================
// Wallet Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_debit_cannot_overdraw(pool: PgPool) {
    let db = TestDatabase::from_pool(pool.clone()).await;
    let user = create_test_user(&db, "w@example.com", UserRole::Both).await;

    let mut conn = pool.acquire().await.unwrap();
    WalletRepository::credit(
        &mut conn,
        user.id,
        Decimal::from(30),
        TransactionType::Refund,
        &LedgerEntry::default(),
    )
    .await
    .unwrap();

    let overdraw = WalletRepository::debit(
        &mut conn,
        user.id,
        Decimal::from(31),
        TransactionType::Withdrawal,
        &LedgerEntry::default(),
    )
    .await;
    assert!(overdraw.is_err());

    let wallet = db.state.wallets.get_wallet(user.id).await.unwrap();
    assert_eq!(wallet.available_balance, Decimal::from(30));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_ledger_accepts_whole_cents_only(pool: PgPool) {
    let db = TestDatabase::from_pool(pool.clone()).await;
    let user = create_test_user(&db, "c@example.com", UserRole::Both).await;
    let mut conn = pool.acquire().await.unwrap();

    let fraction = WalletRepository::credit(
        &mut conn,
        user.id,
        dec("0.005"),
        TransactionType::Refund,
        &LedgerEntry::default(),
    )
    .await;
    assert!(matches!(fraction, Err(RepositoryError::InvalidInput(_))));

    let wallet = WalletRepository::credit(
        &mut conn,
        user.id,
        dec("10.10"),
        TransactionType::Refund,
        &LedgerEntry::default(),
    )
    .await
    .unwrap();
    assert_eq!(wallet.available_balance, dec("10.10"));

    let fraction = WalletRepository::debit(
        &mut conn,
        user.id,
        dec("1.001"),
        TransactionType::Withdrawal,
        &LedgerEntry::default(),
    )
    .await;
    assert!(matches!(fraction, Err(RepositoryError::InvalidInput(_))));

    let ledger = db.state.wallets.list_transactions(user.id, None, None).await.unwrap();
    assert_eq!(ledger.len(), 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local Postgres"]
async fn test_withdrawal_requires_kyc(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let user = create_test_user(&db, "w@example.com", UserRole::Both).await;
    let method = db
        .state
        .wallets
        .add_payout_method(
            user.id,
            AddPayoutMethod {
                kind: PayoutMethodKind::BankAccount,
                label: "Main account".to_string(),
                account_identifier: "GB29NWBK60161331926819".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(method.account_last4, "6819");

    let result = db
        .state
        .wallets
        .request_withdrawal(
            user.id,
            RequestWithdrawal {
                amount: Decimal::from(25),
                payout_method_id: method.id,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}
