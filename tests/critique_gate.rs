mod common;

use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Duration;
use common::{acquire_db_lock, TestApp};
use jobcoach::critique::{
    gate::MIN_IN_FLIGHT_RETRY_SECS, Admission, CritiqueGate, GatePolicy, PgCritiqueLease,
};

fn retry_hint(admission: Admission) -> Option<u64> {
    match admission {
        Admission::Busy { retry_after_secs } => Some(retry_after_secs),
        Admission::Granted(_) => None,
    }
}

#[tokio::test]
async fn lease_row_enforces_single_flight_and_cooldown() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let gate = PgCritiqueLease::new(
        app.state.pool.clone(),
        GatePolicy {
            cooldown: Duration::seconds(20),
            lease: Duration::seconds(400),
        },
    );

    let Admission::Granted(permit) = gate.try_acquire().await? else {
        panic!("idle lease should grant");
    };

    let busy = retry_hint(gate.try_acquire().await?).expect("held lease is busy");
    assert!((19..=20).contains(&busy), "in-flight hint was {busy}");

    gate.release(permit).await?;

    let cooling = retry_hint(gate.try_acquire().await?).expect("cooldown is busy");
    assert!((19..=20).contains(&cooling), "cooldown hint was {cooling}");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn expired_lease_is_taken_over_and_stale_release_is_ignored() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let gate = PgCritiqueLease::new(
        app.state.pool.clone(),
        GatePolicy {
            cooldown: Duration::zero(),
            lease: Duration::seconds(1),
        },
    );

    let Admission::Granted(stale) = gate.try_acquire().await? else {
        panic!("idle lease should grant");
    };
    assert_eq!(
        retry_hint(gate.try_acquire().await?),
        Some(MIN_IN_FLIGHT_RETRY_SECS)
    );

    // The holder never releases; its lease lapses.
    tokio::time::sleep(StdDuration::from_millis(1_100)).await;

    let Admission::Granted(current) = gate.try_acquire().await? else {
        panic!("expired lease should be taken over");
    };
    assert_ne!(current, stale);

    gate.release(stale).await?;
    assert_eq!(
        retry_hint(gate.try_acquire().await?),
        Some(MIN_IN_FLIGHT_RETRY_SECS),
        "a late release must not free the new holder's lease"
    );

    gate.release(current).await?;
    assert!(matches!(gate.try_acquire().await?, Admission::Granted(_)));

    app.cleanup().await?;
    Ok(())
}
