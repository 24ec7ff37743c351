use chrono::{DateTime, TimeDelta, Utc};
use fabric_submit_queue::{
    Job, JobStatus, JobStore, MemoryJobStore, STALLED_FAILURE_REASON,
};
use futures::future::join_all;
use serde_json::json;

use crate::helpers::with_test_db;

mod helpers;

fn lease(now: DateTime<Utc>) -> DateTime<Utc> {
    now + TimeDelta::seconds(30)
}

async fn insert<S: JobStore>(store: &S, n: i32, max_attempts: i32, now: DateTime<Utc>) -> Job {
    let job = Job::new_waiting(store.queue_name(), json!({ "n": n }), max_attempts, now);
    store.insert(job).await.expect("Failed to insert job")
}

async fn claims_oldest_ready_job_first<S: JobStore>(store: S) {
    let now = Utc::now();
    let first = insert(&store, 1, 5, now).await;
    let second = insert(&store, 2, 5, now).await;

    let claimed = store.claim("worker_a", now, lease(now)).await.unwrap().unwrap();
    assert_eq!(claimed.id(), first.id());
    assert_eq!(claimed.status(), &JobStatus::Active);
    assert_eq!(claimed.attempts_made(), &1);
    assert_eq!(claimed.locked_by().as_deref(), Some("worker_a"));
    assert!(claimed.lock_until().is_some());

    let claimed = store.claim("worker_b", now, lease(now)).await.unwrap().unwrap();
    assert_eq!(claimed.id(), second.id());

    assert!(store.claim("worker_a", now, lease(now)).await.unwrap().is_none());

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.active, 2);
    assert_eq!(counts.total(), 2);
}

async fn records_outcomes_only_for_the_lease_holder<S: JobStore>(store: S) {
    let now = Utc::now();
    let job = insert(&store, 1, 5, now).await;
    let id = *job.id();
    store.claim("worker_a", now, lease(now)).await.unwrap().unwrap();

    assert!(!store
        .complete(id, "worker_b", json!("stolen"), now, 10)
        .await
        .unwrap());
    assert!(!store.fail(id, "worker_b", "stolen", now, 10).await.unwrap());
    assert!(!store
        .retry(id, "worker_b", "stolen", now, None)
        .await
        .unwrap());
    assert_eq!(store.get(id).await.unwrap().unwrap().status(), &JobStatus::Active);

    assert!(store
        .complete(id, "worker_a", json!({ "txId": "abc" }), now, 10)
        .await
        .unwrap());
    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status(), &JobStatus::Completed);
    assert_eq!(job.result(), &Some(json!({ "txId": "abc" })));
    assert_eq!(job.locked_by(), &None);
    assert!(job.finished_at().is_some());

    // Once finished the job no longer belongs to anyone
    assert!(!store.fail(id, "worker_a", "late", now, 10).await.unwrap());
}

async fn delays_retries_until_due<S: JobStore>(store: S) {
    let now = Utc::now();
    let job = insert(&store, 1, 5, now).await;
    let id = *job.id();
    store.claim("worker_a", now, lease(now)).await.unwrap().unwrap();

    let due = now + TimeDelta::seconds(10);
    assert!(store
        .retry(id, "worker_a", "commit timeout", due, Some(json!({ "txId": "t1" })))
        .await
        .unwrap());

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status(), &JobStatus::Delayed);
    assert_eq!(job.last_error().as_deref(), Some("commit timeout"));
    assert_eq!(job.state(), &Some(json!({ "txId": "t1" })));

    assert!(store.claim("worker_a", now, lease(now)).await.unwrap().is_none());
    assert!(store.promote_delayed(now).await.unwrap().is_empty());

    let later = due + TimeDelta::seconds(1);
    assert_eq!(store.promote_delayed(later).await.unwrap(), vec![id]);
    assert_eq!(store.get(id).await.unwrap().unwrap().status(), &JobStatus::Waiting);

    let claimed = store
        .claim("worker_b", later, lease(later))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.attempts_made(), &2);
    assert_eq!(claimed.state(), &Some(json!({ "txId": "t1" })));

    // A retry without a new checkpoint keeps the previous one
    assert!(store
        .retry(id, "worker_b", "network error", later, None)
        .await
        .unwrap());
    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.state(), &Some(json!({ "txId": "t1" })));
    assert_eq!(job.last_error().as_deref(), Some("network error"));

    // Due delayed jobs are claimable without a promotion pass
    let claimed = store
        .claim("worker_b", later, lease(later))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id(), &id);
}

async fn recovers_expired_leases<S: JobStore>(store: S) {
    let now = Utc::now();
    let retried = insert(&store, 1, 2, now).await;
    let exhausted = insert(&store, 2, 1, now).await;
    let healthy = insert(&store, 3, 1, now).await;

    let expired = now + TimeDelta::seconds(1);
    store.claim("gone", now, expired).await.unwrap().unwrap();
    store.claim("gone", now, expired).await.unwrap().unwrap();
    store
        .claim("alive", now, now + TimeDelta::seconds(60))
        .await
        .unwrap()
        .unwrap();

    let stalled = store
        .recover_stalled(now + TimeDelta::seconds(5), 10)
        .await
        .unwrap();
    assert_eq!(stalled.requeued, vec![*retried.id()]);
    assert_eq!(stalled.failed, vec![*exhausted.id()]);

    let job = store.get(*retried.id()).await.unwrap().unwrap();
    assert_eq!(job.status(), &JobStatus::Waiting);
    assert_eq!(job.attempts_made(), &1);
    assert_eq!(job.locked_by(), &None);
    assert_eq!(job.last_error(), &None);

    let job = store.get(*exhausted.id()).await.unwrap().unwrap();
    assert_eq!(job.status(), &JobStatus::Failed);
    assert_eq!(job.failure_reason().as_deref(), Some(STALLED_FAILURE_REASON));
    assert_eq!(job.last_error().as_deref(), Some(STALLED_FAILURE_REASON));

    let job = store.get(*healthy.id()).await.unwrap().unwrap();
    assert_eq!(job.status(), &JobStatus::Active);

    // The vanished worker can no longer record an outcome
    assert!(!store
        .complete(*retried.id(), "gone", json!(null), now, 10)
        .await
        .unwrap());
}

async fn extends_leases_of_the_holder_only<S: JobStore>(store: S) {
    let now = Utc::now();
    let job = insert(&store, 1, 3, now).await;
    let id = *job.id();
    store
        .claim("runner", now, now + TimeDelta::seconds(1))
        .await
        .unwrap()
        .unwrap();

    let renewed = now + TimeDelta::seconds(60);
    assert!(!store.extend_lease(id, "other", renewed).await.unwrap());
    assert!(store.extend_lease(id, "runner", renewed).await.unwrap());

    let stalled = store
        .recover_stalled(now + TimeDelta::seconds(5), 10)
        .await
        .unwrap();
    assert!(stalled.is_empty());

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status(), &JobStatus::Active);
    assert_eq!(job.attempts_made(), &1);
    assert_eq!(job.lock_until().as_ref().map(DateTime::timestamp), Some(renewed.timestamp()));

    assert!(store
        .complete(id, "runner", json!(null), now, 10)
        .await
        .unwrap());
    // Nothing left to renew once the outcome is recorded
    assert!(!store.extend_lease(id, "runner", renewed).await.unwrap());
}

async fn trims_finished_jobs<S: JobStore>(store: S) {
    let now = Utc::now();
    let mut ids = vec![];
    for n in 0..4 {
        let job = insert(&store, n, 1, now).await;
        ids.push(*job.id());
    }

    for (n, id) in ids.iter().enumerate() {
        let finished_at = now + TimeDelta::seconds(n as i64);
        store.claim("worker_a", now, lease(now)).await.unwrap().unwrap();
        assert!(store
            .fail(*id, "worker_a", "rejected", finished_at, 2)
            .await
            .unwrap());
    }

    assert_eq!(store.counts().await.unwrap().failed, 2);
    assert!(store.get(ids[0]).await.unwrap().is_none());
    assert!(store.get(ids[1]).await.unwrap().is_none());
    assert!(store.get(ids[2]).await.unwrap().is_some());
    assert!(store.get(ids[3]).await.unwrap().is_some());
}

async fn keeps_retention_bound_with_concurrent_outcomes<S: JobStore>(store: S) {
    const KEEP: usize = 3;

    for round in 0..5 {
        let now = Utc::now();
        let mut claimed = vec![];
        for n in 0..8 {
            insert(&store, round * 8 + n, 1, now).await;
            let worker_id = format!("worker_{n}");
            let job = store.claim(&worker_id, now, lease(now)).await.unwrap().unwrap();
            claimed.push((*job.id(), worker_id));
        }

        // Half of the jobs complete, the other half fail, all at once
        let outcomes = join_all(claimed.iter().enumerate().map(|(n, (id, worker_id))| {
            let store = &store;
            async move {
                if n % 2 == 0 {
                    store
                        .complete(*id, worker_id, json!(n), Utc::now(), KEEP)
                        .await
                } else {
                    store
                        .fail(*id, worker_id, "rejected", Utc::now(), KEEP)
                        .await
                }
            }
        }))
        .await;
        for outcome in outcomes {
            assert!(outcome.unwrap());
        }

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.completed, KEEP as u64, "round {round}");
        assert_eq!(counts.failed, KEEP as u64, "round {round}");
        assert_eq!(counts.total(), 2 * KEEP as u64, "round {round}");
    }
}

async fn hands_each_job_to_one_claimant<S: JobStore>(store: S) {
    let now = Utc::now();
    let job = insert(&store, 1, 5, now).await;

    let (a, b) = tokio::join!(
        store.claim("worker_a", now, lease(now)),
        store.claim("worker_b", now, lease(now)),
    );
    let winners: Vec<Job> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id(), job.id());
    assert_eq!(winners[0].attempts_made(), &1);
}

#[tokio::test]
async fn memory_claims_oldest_ready_job_first() {
    claims_oldest_ready_job_first(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_records_outcomes_only_for_the_lease_holder() {
    records_outcomes_only_for_the_lease_holder(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_delays_retries_until_due() {
    delays_retries_until_due(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_recovers_expired_leases() {
    recovers_expired_leases(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_extends_leases_of_the_holder_only() {
    extends_leases_of_the_holder_only(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_trims_finished_jobs() {
    trims_finished_jobs(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_keeps_retention_bound_with_concurrent_outcomes() {
    keeps_retention_bound_with_concurrent_outcomes(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_hands_each_job_to_one_claimant() {
    hands_each_job_to_one_claimant(MemoryJobStore::default()).await;
}

#[tokio::test]
async fn memory_stores_keep_queues_apart() {
    let submit = MemoryJobStore::new("submit");
    let audit = MemoryJobStore::new("audit");
    let now = Utc::now();
    insert(&submit, 1, 5, now).await;

    assert!(audit.claim("worker_a", now, lease(now)).await.unwrap().is_none());
    assert_eq!(submit.counts().await.unwrap().waiting, 1);
}

#[tokio::test]
async fn pg_claims_oldest_ready_job_first() {
    with_test_db(|test_db| async move {
        claims_oldest_ready_job_first(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_records_outcomes_only_for_the_lease_holder() {
    with_test_db(|test_db| async move {
        records_outcomes_only_for_the_lease_holder(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_delays_retries_until_due() {
    with_test_db(|test_db| async move {
        delays_retries_until_due(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_recovers_expired_leases() {
    with_test_db(|test_db| async move {
        recovers_expired_leases(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_extends_leases_of_the_holder_only() {
    with_test_db(|test_db| async move {
        extends_leases_of_the_holder_only(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_trims_finished_jobs() {
    with_test_db(|test_db| async move {
        trims_finished_jobs(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_keeps_retention_bound_with_concurrent_outcomes() {
    with_test_db(|test_db| async move {
        keeps_retention_bound_with_concurrent_outcomes(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_hands_each_job_to_one_claimant() {
    with_test_db(|test_db| async move {
        hands_each_job_to_one_claimant(test_db.connect_store().await).await;
    })
    .await;
}

#[tokio::test]
async fn pg_stores_keep_queues_apart() {
    with_test_db(|test_db| async move {
        let submit = test_db.connect_store().await;
        let audit = test_db
            .store_options()
            .queue_name("audit")
            .connect()
            .await
            .unwrap();
        let now = Utc::now();
        let job = insert(&submit, 1, 5, now).await;

        assert!(audit.claim("worker_a", now, lease(now)).await.unwrap().is_none());
        assert!(audit.get(*job.id()).await.unwrap().is_none());
        assert_eq!(audit.counts().await.unwrap().total(), 0);

        let rows = test_db.get_jobs().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].queue_name(), "submit");
        assert_eq!(rows[0].status(), "waiting");
    })
    .await;
}
