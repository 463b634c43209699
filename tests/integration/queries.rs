//! Fire time and summary queries.

use crate::common::{at, now, payload, scheduler_at};
use cadence::{
    CronSpec, InMemoryTriggerStore, JobActivity, JobKey, JobKind, JobStatus, OneShotSpec,
    RepeatingSpec, Scheduler, TriggerSpec, TriggerState,
};
use chrono::Duration;
use serde_json::json;

async fn scheduler_with_jobs() -> Scheduler<InMemoryTriggerStore> {
    let (scheduler, _clock) = scheduler_at(now());
    scheduler
        .schedule(
            &payload("foo", "a").with_parameter("room", "12"),
            &TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?")),
        )
        .await
        .unwrap();
    scheduler
        .schedule(
            &payload("foo", "ab"),
            &TriggerSpec::Repeating(
                RepeatingSpec::new(at(2020, 7, 15, 12, 0), 6 * 3_600_000).with_repeat_count(2),
            ),
        )
        .await
        .unwrap();
    scheduler
        .schedule(
            &payload("barfoo", "a"),
            &TriggerSpec::OneShot(OneShotSpec::new(at(2020, 7, 15, 11, 0))),
        )
        .await
        .unwrap();
    scheduler
}

#[tokio::test]
async fn test_fire_times_by_prefix_merge_in_order() {
    let scheduler = scheduler_with_jobs().await;

    let times = scheduler
        .query()
        .fire_times_in_range_by_prefix("foo", "a", now(), at(2020, 7, 16, 12, 0))
        .await;

    // "foo-a" also matches the "barfoo-a-runonce" key.
    assert_eq!(
        times,
        vec![
            at(2020, 7, 15, 11, 0),
            at(2020, 7, 15, 12, 0),
            at(2020, 7, 15, 18, 0),
            at(2020, 7, 16, 0, 0),
            at(2020, 7, 16, 9, 0),
        ]
    );
}

#[tokio::test]
async fn test_fire_times_by_prefix_with_empty_prefix() {
    let scheduler = scheduler_with_jobs().await;
    let times = scheduler
        .query()
        .fire_times_in_range_by_prefix("foo", "", now(), now() + Duration::days(7))
        .await;
    assert!(times.is_empty());
}

#[tokio::test]
async fn test_list_jobs_basic_info() {
    let scheduler = scheduler_with_jobs().await;

    let infos = scheduler.query().list_jobs_basic_info().await;
    let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["barfoo-a-runonce", "foo-a", "foo-ab-repeat"]);

    let once = &infos[0];
    assert_eq!(once.job_type, JobKind::RunOnce);
    assert_eq!(once.activity, JobActivity::NotStarted);
    assert_eq!(once.start_date, "2020-07-15 11:00:00");
    assert_eq!(once.end_date, "2020-07-15 11:00:00");
    assert_eq!(once.info, "-");

    let cron = &infos[1];
    assert_eq!(cron.job_type, JobKind::Cron);
    assert_eq!(cron.activity, JobActivity::Active);
    assert_eq!(cron.status, JobStatus::Ok);
    assert_eq!(cron.next_fire_date, "2020-07-16 09:00:00");
    assert_eq!(cron.end_date, "-");
    assert_eq!(cron.info, "0 0 9 * * ?");

    let repeating = &infos[2];
    assert_eq!(repeating.job_type, JobKind::Repeating);
    assert_eq!(repeating.info, "0/3");
}

#[tokio::test]
async fn test_basic_info_follows_firing() {
    let (scheduler, clock) = scheduler_at(now());
    scheduler
        .schedule(
            &payload("alert", "once"),
            &TriggerSpec::OneShot(OneShotSpec::new(at(2020, 7, 15, 11, 0))),
        )
        .await
        .unwrap();

    clock.set(at(2020, 7, 15, 11, 0));
    let fired = scheduler.fire_due().await.unwrap();
    assert_eq!(fired.len(), 1);

    clock.set(at(2020, 7, 15, 11, 30));
    let infos = scheduler.query().list_jobs_basic_info().await;
    assert_eq!(infos[0].activity, JobActivity::Finished);
    assert_eq!(infos[0].status, JobStatus::Ok);
    assert_eq!(infos[0].next_fire_date, "-");
}

#[tokio::test]
async fn test_paused_job_is_reported() {
    let scheduler = scheduler_with_jobs().await;
    scheduler
        .store()
        .set_state(&JobKey::new("foo-a"), TriggerState::Paused)
        .unwrap();

    let infos = scheduler.query().list_jobs_basic_info().await;
    let cron = infos.iter().find(|i| i.name == "foo-a").unwrap();
    assert_eq!(cron.status, JobStatus::Paused);
}

#[tokio::test]
async fn test_detailed_info_strips_bookkeeping_keys() {
    let scheduler = scheduler_with_jobs().await;
    let query = scheduler.query();

    let infos = query.list_jobs_basic_info().await;
    let cron = infos.iter().find(|i| i.name == "foo-a").unwrap();
    let details = query.job_detailed_info(cron).await;

    assert_eq!(details.event_infos.len(), 1);
    let event = &details.event_infos[0];
    assert_eq!(event.subject, "foo");
    assert_eq!(event.parameters.get("room"), Some(&json!("12")));
    assert!(event.job_id().is_none());
}

#[tokio::test]
async fn test_listing_survives_interval_past_calendar_range() {
    let (scheduler, _clock) = scheduler_at(now());
    scheduler
        .schedule(
            &payload("far", "1"),
            &TriggerSpec::Repeating(
                RepeatingSpec::new(at(2020, 7, 15, 12, 0), 100_000_000_000_000_000)
                    .with_repeat_count(1),
            ),
        )
        .await
        .unwrap();

    let infos = scheduler.query().list_jobs_basic_info().await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].next_fire_date, "2020-07-15 12:00:00");
    assert_eq!(infos[0].end_date, "-");
    assert_eq!(infos[0].info, "0/1");
}
