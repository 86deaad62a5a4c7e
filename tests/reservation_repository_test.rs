use chrono::{Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use fermata::{
    domain::{Instrument, NewHold, NewPayment, PaymentStatus, ReservationStatus, User},
    error::AppError,
    repository::{
        CheckoutCompletion, InstrumentRepository, PaymentRepository, ReservationRepository,
        SqliteInstrumentRepository, SqlitePaymentRepository, SqliteReservationRepository,
        SqliteUserRepository, UserRepository,
    },
};

async fn setup_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePool::connect(":memory:").await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

async fn create_user(pool: &SqlitePool, email: &str) -> anyhow::Result<User> {
    let repo = SqliteUserRepository::new(pool.clone());
    Ok(repo
        .create(User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: "Test User".to_string(),
            created_at: Utc::now(),
        })
        .await?)
}

async fn create_instrument(
    pool: &SqlitePool,
    owner_id: Uuid,
    daily_rate_cents: i64,
) -> anyhow::Result<Instrument> {
    let repo = SqliteInstrumentRepository::new(pool.clone());
    Ok(repo
        .create(Instrument {
            id: Uuid::new_v4(),
            owner_id,
            title: "1974 Telecaster".to_string(),
            daily_rate_cents,
            default_address: "12 Harbor St".to_string(),
            created_at: Utc::now(),
        })
        .await?)
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn hold(instrument_id: Uuid, renter_id: Uuid, start: &str, end: &str) -> NewHold {
    NewHold {
        instrument_id,
        renter_id,
        start_date: d(start),
        end_date: d(end),
        total_price_cents: 60_000,
        expires_at: Utc::now() + Duration::minutes(15),
        pickup_address: "12 Harbor St".to_string(),
        pickup_at: None,
        return_at: None,
    }
}

#[tokio::test]
async fn test_hold_creation_and_conflict_detection() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter = create_user(&pool, "renter@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let repo = SqliteReservationRepository::new(pool.clone());

    let reservation = repo
        .create_hold(hold(instrument.id, renter.id, "2024-01-01", "2024-01-07"))
        .await?;
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert!(reservation.expires_at.is_some());
    assert!(reservation.external_session_id.is_none());

    // Overlapping in both directions and containment all conflict
    assert!(repo.has_conflict(instrument.id, d("2024-01-05"), d("2024-01-10"), None).await?);
    assert!(repo.has_conflict(instrument.id, d("2023-12-28"), d("2024-01-01"), None).await?);
    assert!(repo.has_conflict(instrument.id, d("2023-12-28"), d("2024-01-10"), None).await?);
    assert!(repo.has_conflict(instrument.id, d("2024-01-03"), d("2024-01-04"), None).await?);

    // Disjoint range does not
    assert!(!repo.has_conflict(instrument.id, d("2024-01-08"), d("2024-01-12"), None).await?);

    // A reservation being re-validated can exclude itself
    assert!(
        !repo
            .has_conflict(instrument.id, d("2024-01-01"), d("2024-01-07"), Some(reservation.id))
            .await?
    );

    Ok(())
}

#[tokio::test]
async fn test_transactional_recheck_rejects_overlapping_hold() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter_a = create_user(&pool, "a@example.com").await?;
    let renter_b = create_user(&pool, "b@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let repo = SqliteReservationRepository::new(pool.clone());

    repo.create_hold(hold(instrument.id, renter_a.id, "2024-01-01", "2024-01-07"))
        .await?;

    let err = repo
        .create_hold(hold(instrument.id, renter_b.id, "2024-01-05", "2024-01-10"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Non-overlapping dates still go through
    let ok = repo
        .create_hold(hold(instrument.id, renter_b.id, "2024-01-08", "2024-01-12"))
        .await?;
    assert_eq!(ok.status, ReservationStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_expired_hold_does_not_block_and_sweep_reclaims() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter = create_user(&pool, "renter@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let repo = SqliteReservationRepository::new(pool.clone());

    let mut expired = hold(instrument.id, renter.id, "2024-01-01", "2024-01-07");
    expired.expires_at = Utc::now() - Duration::seconds(1);
    let expired = repo.create_hold(expired).await?;

    // Expired-but-unswept holds are invisible to conflict detection
    assert!(!repo.has_conflict(instrument.id, d("2024-01-01"), d("2024-01-07"), None).await?);

    let swept = repo.sweep_expired(Utc::now()).await?;
    assert_eq!(swept, 1);

    let reclaimed = repo.find_by_id(expired.id).await?.unwrap();
    assert_eq!(reclaimed.status, ReservationStatus::Canceled);
    assert_eq!(reclaimed.cancellation_reason.as_deref(), Some("Reservation expired"));
    assert!(reclaimed.expires_at.is_none());
    assert!(reclaimed.canceled_at.is_some());

    // Second sweep finds nothing new
    assert_eq!(repo.sweep_expired(Utc::now()).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_complete_checkout_is_idempotent() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter = create_user(&pool, "renter@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let reservations = SqliteReservationRepository::new(pool.clone());
    let payments = SqlitePaymentRepository::new(pool.clone());

    let reservation = reservations
        .create_hold(hold(instrument.id, renter.id, "2024-01-01", "2024-01-07"))
        .await?;
    let payment = payments
        .create(NewPayment {
            user_id: renter.id,
            instrument_id: instrument.id,
            amount_cents: 60_000,
            currency: "USD".to_string(),
            start_date: d("2024-01-01"),
            end_date: d("2024-01-07"),
        })
        .await?;
    assert_eq!(payment.external_session_id, "");

    reservations
        .link_session(reservation.id, payment.id, "cs_test_123")
        .await?;

    let linked = payments.find_by_session("cs_test_123").await?.unwrap();
    assert_eq!(linked.id, payment.id);

    let outcome = reservations
        .complete_checkout(reservation.id, payment.id, "cs_test_123")
        .await?;
    let activated = match outcome {
        CheckoutCompletion::Activated(r) => r,
        other => panic!("expected activation, got {:?}", other),
    };
    assert_eq!(activated.status, ReservationStatus::Active);
    assert!(activated.expires_at.is_none());
    assert_eq!(activated.external_session_id.as_deref(), Some("cs_test_123"));

    let paid = payments.find_by_id(payment.id).await?.unwrap();
    assert_eq!(paid.status, PaymentStatus::Succeeded);
    assert!(paid.paid_at.is_some());

    // Redelivery of the same session is recognized, not reapplied
    let outcome = reservations
        .complete_checkout(reservation.id, payment.id, "cs_test_123")
        .await?;
    assert!(matches!(outcome, CheckoutCompletion::DuplicateDelivery));

    Ok(())
}

#[tokio::test]
async fn test_completion_of_expired_unswept_hold_is_rejected() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter_a = create_user(&pool, "a@example.com").await?;
    let renter_b = create_user(&pool, "b@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let reservations = SqliteReservationRepository::new(pool.clone());
    let payments = SqlitePaymentRepository::new(pool.clone());

    let mut stale = hold(instrument.id, renter_a.id, "2024-01-01", "2024-01-07");
    stale.expires_at = Utc::now() - Duration::seconds(1);
    let stale = reservations.create_hold(stale).await?;
    let payment = payments
        .create(NewPayment {
            user_id: renter_a.id,
            instrument_id: instrument.id,
            amount_cents: 60_000,
            currency: "USD".to_string(),
            start_date: d("2024-01-01"),
            end_date: d("2024-01-07"),
        })
        .await?;
    reservations
        .link_session(stale.id, payment.id, "cs_test_stale")
        .await?;

    // The expired hold no longer blocks the calendar, so a second renter
    // legitimately takes an overlapping window before any sweep runs
    let fresh = reservations
        .create_hold(hold(instrument.id, renter_b.id, "2024-01-05", "2024-01-10"))
        .await?;

    // A late completion for the expired hold must not activate it over the
    // newer hold
    let err = reservations
        .complete_checkout(stale.id, payment.id, "cs_test_stale")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    let stale = reservations.find_by_id(stale.id).await?.unwrap();
    assert_eq!(stale.status, ReservationStatus::Pending);
    let fresh = reservations.find_by_id(fresh.id).await?.unwrap();
    assert_eq!(fresh.status, ReservationStatus::Pending);
    assert_ne!(
        payments.find_by_id(payment.id).await?.unwrap().status,
        PaymentStatus::Succeeded
    );

    // The sweeper then resolves the stale row as usual
    assert_eq!(reservations.sweep_expired(Utc::now()).await?, 1);
    let stale = reservations.find_by_id(stale.id).await?.unwrap();
    assert_eq!(stale.status, ReservationStatus::Canceled);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_holds_serialize_to_a_single_winner() -> anyhow::Result<()> {
    // A racing loser must see a conflict, not a busy/serialization failure.
    // This needs real concurrent connections, so use a throwaway file-backed
    // database instead of :memory:.
    let path = std::env::temp_dir().join(format!("fermata-race-{}.db", Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = SqlitePool::connect(&url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let owner = create_user(&pool, "owner@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let repo = std::sync::Arc::new(SqliteReservationRepository::new(pool.clone()));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let renter = create_user(&pool, &format!("renter{}@example.com", i)).await?;
        let repo = repo.clone();
        let request = hold(instrument.id, renter.id, "2024-01-01", "2024-01-07");
        tasks.push(tokio::spawn(async move { repo.create_hold(request).await }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => winners += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("expected a conflict for the loser, got {}", other),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 3);

    pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }

    Ok(())
}

#[tokio::test]
async fn test_complete_checkout_rejects_state_mismatch() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter = create_user(&pool, "renter@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let reservations = SqliteReservationRepository::new(pool.clone());
    let payments = SqlitePaymentRepository::new(pool.clone());

    let mut expired = hold(instrument.id, renter.id, "2024-01-01", "2024-01-07");
    expired.expires_at = Utc::now() - Duration::seconds(1);
    let reservation = reservations.create_hold(expired).await?;
    let payment = payments
        .create(NewPayment {
            user_id: renter.id,
            instrument_id: instrument.id,
            amount_cents: 60_000,
            currency: "USD".to_string(),
            start_date: d("2024-01-01"),
            end_date: d("2024-01-07"),
        })
        .await?;
    reservations
        .link_session(reservation.id, payment.id, "cs_test_late")
        .await?;

    // Hold gets swept before the completion event arrives
    assert_eq!(reservations.sweep_expired(Utc::now()).await?, 1);

    // The event then hits a canceled reservation: surfaced as an error so
    // the processor retries rather than us overwriting state
    let err = reservations
        .complete_checkout(reservation.id, payment.id, "cs_test_late")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    let reservation = reservations.find_by_id(reservation.id).await?.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Canceled);
    let payment = payments.find_by_id(payment.id).await?.unwrap();
    assert_ne!(payment.status, PaymentStatus::Succeeded);

    Ok(())
}

#[tokio::test]
async fn test_expire_checkout_only_touches_pending_records() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter = create_user(&pool, "renter@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let reservations = SqliteReservationRepository::new(pool.clone());
    let payments = SqlitePaymentRepository::new(pool.clone());

    let reservation = reservations
        .create_hold(hold(instrument.id, renter.id, "2024-01-01", "2024-01-07"))
        .await?;
    let payment = payments
        .create(NewPayment {
            user_id: renter.id,
            instrument_id: instrument.id,
            amount_cents: 60_000,
            currency: "USD".to_string(),
            start_date: d("2024-01-01"),
            end_date: d("2024-01-07"),
        })
        .await?;
    reservations
        .link_session(reservation.id, payment.id, "cs_test_exp")
        .await?;

    reservations.expire_checkout(reservation.id, payment.id).await?;

    let canceled = reservations.find_by_id(reservation.id).await?.unwrap();
    assert_eq!(canceled.status, ReservationStatus::Canceled);
    assert_eq!(
        canceled.cancellation_reason.as_deref(),
        Some("Payment session expired")
    );
    assert_eq!(
        payments.find_by_id(payment.id).await?.unwrap().status,
        PaymentStatus::Canceled
    );

    // A second (duplicate) expiry event changes nothing
    let canceled_at = canceled.canceled_at;
    reservations.expire_checkout(reservation.id, payment.id).await?;
    let again = reservations.find_by_id(reservation.id).await?.unwrap();
    assert_eq!(again.canceled_at, canceled_at);

    Ok(())
}

#[tokio::test]
async fn test_cancel_syncs_payment_and_guards_terminal_states() -> anyhow::Result<()> {
    let pool = setup_pool().await?;
    let owner = create_user(&pool, "owner@example.com").await?;
    let renter = create_user(&pool, "renter@example.com").await?;
    let instrument = create_instrument(&pool, owner.id, 10_000).await?;
    let reservations = SqliteReservationRepository::new(pool.clone());
    let payments = SqlitePaymentRepository::new(pool.clone());

    let reservation = reservations
        .create_hold(hold(instrument.id, renter.id, "2024-01-01", "2024-01-07"))
        .await?;
    let payment = payments
        .create(NewPayment {
            user_id: renter.id,
            instrument_id: instrument.id,
            amount_cents: 60_000,
            currency: "USD".to_string(),
            start_date: d("2024-01-01"),
            end_date: d("2024-01-07"),
        })
        .await?;
    reservations
        .link_session(reservation.id, payment.id, "cs_test_cancel")
        .await?;

    let canceled = reservations
        .cancel(reservation.id, renter.id, "Change of plans")
        .await?;
    assert_eq!(canceled.status, ReservationStatus::Canceled);
    assert_eq!(canceled.canceled_by, Some(renter.id));
    assert_eq!(canceled.cancellation_reason.as_deref(), Some("Change of plans"));
    assert_eq!(
        payments.find_by_id(payment.id).await?.unwrap().status,
        PaymentStatus::Canceled
    );

    // Terminal states are not re-enterable, and the record is not
    // double-stamped
    let err = reservations
        .cancel(reservation.id, renter.id, "Again")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let unchanged = reservations.find_by_id(reservation.id).await?.unwrap();
    assert_eq!(unchanged.canceled_at, canceled.canceled_at);
    assert_eq!(unchanged.cancellation_reason.as_deref(), Some("Change of plans"));

    // The freed dates no longer conflict
    assert!(
        !reservations
            .has_conflict(instrument.id, d("2024-01-01"), d("2024-01-07"), None)
            .await?
    );

    Ok(())
}
