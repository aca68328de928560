//! Admission control for AI critiques: one critique in flight at a time and a
//! minimum spacing between starts.
//!
//! [`PgCritiqueLease`] keeps that state in a `service_leases` row so every API
//! process shares it. The lease expires so a crashed holder cannot wedge the
//! gate; callers bound each critique by [`GatePolicy::critique_deadline`] so a
//! live holder never outlasts its lease. [`LocalCritiqueGate`] keeps the state
//! in memory for single-process deployments and tests; its permits are held
//! until released. Both defer to [`evaluate`].

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use tokio::{sync::Mutex, task};
use tracing::debug;
use uuid::Uuid;

use crate::{config::AppConfig, db::PgPool, models::ServiceLease, schema::service_leases};

pub const CRITIQUE_LEASE_NAME: &str = "ai-critique";
/// Floor for the retry hint given while another critique is running.
pub const MIN_IN_FLIGHT_RETRY_SECS: u64 = 5;
/// Slack between the critique deadline and the lease expiry.
pub const LEASE_MARGIN_SECS: i64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    pub cooldown: Duration,
    pub lease: Duration,
}

impl GatePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cooldown: Duration::seconds(config.critique_cooldown_secs as i64),
            lease: Duration::seconds(config.critique_lease_secs as i64),
        }
    }

    /// How long a granted critique may run before the lease could lapse.
    pub fn critique_deadline(&self) -> std::time::Duration {
        let secs = (self.lease.num_seconds() - LEASE_MARGIN_SECS).max(1);
        std::time::Duration::from_secs(secs as u64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateSnapshot {
    /// Expiry of the current holder's lease, if anyone holds it.
    pub held_until: Option<NaiveDateTime>,
    pub last_started_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Granted,
    Busy { retry_after_secs: u64 },
}

pub fn evaluate(snapshot: &GateSnapshot, now: NaiveDateTime, policy: &GatePolicy) -> GateDecision {
    let cooldown_remaining = snapshot
        .last_started_at
        .map(|started| started + policy.cooldown - now)
        .filter(|remaining| *remaining > Duration::zero())
        .map(ceil_secs)
        .unwrap_or(0);

    let in_flight = snapshot.held_until.is_some_and(|until| until > now);
    if in_flight {
        return GateDecision::Busy {
            retry_after_secs: cooldown_remaining.max(MIN_IN_FLIGHT_RETRY_SECS),
        };
    }

    if cooldown_remaining > 0 {
        return GateDecision::Busy {
            retry_after_secs: cooldown_remaining,
        };
    }

    GateDecision::Granted
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CritiquePermit {
    holder: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted(CritiquePermit),
    Busy { retry_after_secs: u64 },
}

#[async_trait]
pub trait CritiqueGate: Send + Sync + 'static {
    async fn try_acquire(&self) -> Result<Admission>;
    async fn release(&self, permit: CritiquePermit) -> Result<()>;
}

/// Cross-process gate backed by a row lock on `service_leases`.
pub struct PgCritiqueLease {
    pool: PgPool,
    policy: GatePolicy,
}

impl PgCritiqueLease {
    pub fn new(pool: PgPool, policy: GatePolicy) -> Self {
        Self { pool, policy }
    }
}

#[async_trait]
impl CritiqueGate for PgCritiqueLease {
    async fn try_acquire(&self) -> Result<Admission> {
        let pool = self.pool.clone();
        let policy = self.policy;
        task::spawn_blocking(move || acquire_lease(&pool, &policy))
            .await
            .map_err(|err| anyhow!("critique lease task panicked: {err}"))?
    }

    async fn release(&self, permit: CritiquePermit) -> Result<()> {
        let pool = self.pool.clone();
        task::spawn_blocking(move || release_lease(&pool, permit))
            .await
            .map_err(|err| anyhow!("critique lease task panicked: {err}"))?
    }
}

fn acquire_lease(pool: &PgPool, policy: &GatePolicy) -> Result<Admission> {
    let mut conn = pool
        .get()
        .map_err(|err| anyhow!("database pool error: {err}"))?;
    let now = Utc::now().naive_utc();

    let admission = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(service_leases::table)
            .values((
                service_leases::name.eq(CRITIQUE_LEASE_NAME),
                service_leases::updated_at.eq(now),
            ))
            .on_conflict_do_nothing()
            .execute(conn)?;

        let lease: ServiceLease = service_leases::table
            .find(CRITIQUE_LEASE_NAME)
            .for_update()
            .first(conn)?;

        let snapshot = GateSnapshot {
            held_until: lease.holder.and(lease.lease_expires_at),
            last_started_at: lease.last_started_at,
        };

        match evaluate(&snapshot, now, policy) {
            GateDecision::Busy { retry_after_secs } => Ok(Admission::Busy { retry_after_secs }),
            GateDecision::Granted => {
                let holder = Uuid::new_v4();
                diesel::update(service_leases::table.find(CRITIQUE_LEASE_NAME))
                    .set((
                        service_leases::holder.eq(Some(holder)),
                        service_leases::lease_expires_at.eq(Some(now + policy.lease)),
                        service_leases::last_started_at.eq(Some(now)),
                        service_leases::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                Ok(Admission::Granted(CritiquePermit { holder }))
            }
        }
    })?;

    Ok(admission)
}

fn release_lease(pool: &PgPool, permit: CritiquePermit) -> Result<()> {
    let mut conn = pool
        .get()
        .map_err(|err| anyhow!("database pool error: {err}"))?;

    let released = diesel::update(
        service_leases::table
            .filter(service_leases::name.eq(CRITIQUE_LEASE_NAME))
            .filter(service_leases::holder.eq(permit.holder)),
    )
    .set((
        service_leases::holder.eq::<Option<Uuid>>(None),
        service_leases::lease_expires_at.eq::<Option<NaiveDateTime>>(None),
        service_leases::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(&mut conn)?;

    if released == 0 {
        debug!(holder = %permit.holder, "critique lease already expired or taken over");
    }
    Ok(())
}

#[derive(Debug, Default)]
struct LocalState {
    holder: Option<Uuid>,
    last_started_at: Option<NaiveDateTime>,
}

/// In-memory gate with the same admission rules as [`PgCritiqueLease`],
/// except that a permit only ends when it is released.
#[derive(Clone)]
pub struct LocalCritiqueGate {
    policy: GatePolicy,
    state: Arc<Mutex<LocalState>>,
}

impl LocalCritiqueGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            state: Arc::new(Mutex::new(LocalState::default())),
        }
    }
}

#[async_trait]
impl CritiqueGate for LocalCritiqueGate {
    async fn try_acquire(&self) -> Result<Admission> {
        let now = Utc::now().naive_utc();
        let mut state = self.state.lock().await;
        let snapshot = GateSnapshot {
            held_until: state.holder.map(|_| NaiveDateTime::MAX),
            last_started_at: state.last_started_at,
        };

        match evaluate(&snapshot, now, &self.policy) {
            GateDecision::Busy { retry_after_secs } => Ok(Admission::Busy { retry_after_secs }),
            GateDecision::Granted => {
                let holder = Uuid::new_v4();
                state.holder = Some(holder);
                state.last_started_at = Some(now);
                Ok(Admission::Granted(CritiquePermit { holder }))
            }
        }
    }

    async fn release(&self, permit: CritiquePermit) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.holder == Some(permit.holder) {
            state.holder = None;
        }
        Ok(())
    }
}
