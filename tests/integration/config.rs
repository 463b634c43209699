//! Jobs loaded from YAML and scheduled end to end.

use crate::common::{at, now};
use cadence::core::trigger::TriggerSchedule;
use cadence::testing::RecordingHandler;
use cadence::{
    ConfigError, CronMisfirePolicy, Event, EventBus, FakeClock, InMemoryTriggerStore,
    IntervalMisfirePolicy, JobKey, JobRequestBuilder, Scheduler, SchedulerConfig, TriggerStore,
    YamlLoader,
};
use std::io::Write;
use std::sync::Arc;

const CONFIG: &str = r#"
timezone: Europe/Warsaw
misfire:
  cron: do_nothing
  repeating: reschedule_now_with_existing_count
jobs:
  - subject: report.daily
    job_id: "1"
    parameters:
      format: pdf
    schedule:
      type: cron
      expression: "0 0 10 * * ?"
  - subject: reminder
    job_id: "42"
    schedule:
      type: repeating
      start_time: 2020-07-15T12:00:00Z
      interval_millis: 3600000
      repeat_count: 2
  - subject: alert
    job_id: once
    schedule:
      type: run_once
      fire_time: 2020-07-15T11:00:00Z
  - subject: visits
    job_id: clinic
    schedule:
      type: weekly
      start_date: 2020-07-10
      end_date: 2020-07-22
      days_of_week: [Mon, Thu]
      time_of_day: { hour: 10, minute: 10 }
"#;

async fn scheduler_for(config: &SchedulerConfig) -> Scheduler<InMemoryTriggerStore> {
    let store = InMemoryTriggerStore::new().with_misfire_threshold(config.misfire_threshold());
    let scheduler = Scheduler::new(store)
        .with_settings(Arc::new(config.clone()))
        .with_timezone(config.tz().unwrap())
        .with_clock(Arc::new(FakeClock::at(now())));
    for request in JobRequestBuilder::build_all(config).unwrap() {
        scheduler.schedule(&request.payload, &request.spec).await.unwrap();
    }
    scheduler
}

#[tokio::test]
async fn test_yaml_jobs_are_scheduled() {
    let config = YamlLoader::parse_config(CONFIG).unwrap();
    let scheduler = scheduler_for(&config).await;

    let keys = scheduler.store().list_keys().await.unwrap();
    assert_eq!(
        keys,
        vec![
            JobKey::new("alert-once-runonce"),
            JobKey::new("reminder-42-repeat"),
            JobKey::new("report.daily-1"),
            JobKey::new("visits-clinic"),
        ]
    );

    // Weekly dates and cron expressions are read in Europe/Warsaw (UTC+2).
    let visits = scheduler
        .store()
        .get_trigger(&JobKey::new("visits-clinic"))
        .await
        .unwrap();
    assert_eq!(visits.next_fire_time, Some(at(2020, 7, 13, 8, 10)));

    let report = scheduler
        .store()
        .get_trigger(&JobKey::new("report.daily-1"))
        .await
        .unwrap();
    assert_eq!(report.next_fire_time, Some(at(2020, 7, 16, 8, 0)));
    assert_eq!(report.payload().job_id().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_yaml_misfire_policies_are_applied() {
    let config = YamlLoader::parse_config(CONFIG).unwrap();
    let scheduler = scheduler_for(&config).await;

    let report = scheduler
        .store()
        .get_trigger(&JobKey::new("report.daily-1"))
        .await
        .unwrap();
    assert!(matches!(
        report.trigger.schedule(),
        TriggerSchedule::Cron {
            misfire: CronMisfirePolicy::DoNothing,
            ..
        }
    ));

    let reminder = scheduler
        .store()
        .get_trigger(&JobKey::new("reminder-42-repeat"))
        .await
        .unwrap();
    assert!(matches!(
        reminder.trigger.schedule(),
        TriggerSchedule::Simple {
            misfire: IntervalMisfirePolicy::RescheduleNowWithExistingCount,
            ..
        }
    ));
}

#[tokio::test]
async fn test_yaml_listing_uses_configured_timezone() {
    let config = YamlLoader::parse_config(CONFIG).unwrap();
    let scheduler = scheduler_for(&config).await;

    let infos = scheduler.query().list_jobs_basic_info().await;
    let alert = infos.iter().find(|i| i.name == "alert-once-runonce").unwrap();
    assert_eq!(alert.start_date, "2020-07-15 13:00:00");

    let reminder = infos.iter().find(|i| i.name == "reminder-42-repeat").unwrap();
    assert_eq!(reminder.info, "0/3");
}

#[tokio::test]
async fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let config = YamlLoader::load_config(file.path()).unwrap();
    assert_eq!(config.jobs.len(), 4);
    assert_eq!(config.misfire_threshold_secs, 60);
}

#[tokio::test]
async fn test_load_config_reports_missing_file() {
    let result = YamlLoader::load_config("/nonexistent/cadence.yaml");
    assert!(matches!(result, Err(ConfigError::FileReadError { .. })));
}

#[tokio::test]
async fn test_fired_payload_carries_yaml_parameters() {
    let config = YamlLoader::parse_config(CONFIG).unwrap();
    let store = InMemoryTriggerStore::new();
    let clock = FakeClock::at(now());
    let handler = Arc::new(RecordingHandler::new());
    let bus = EventBus::new();
    bus.register(handler.clone()).await;
    let scheduler = Scheduler::new(store)
        .with_settings(Arc::new(config.clone()))
        .with_timezone(config.tz().unwrap())
        .with_clock(Arc::new(clock.clone()))
        .with_event_bus(bus);
    for request in JobRequestBuilder::build_all(&config).unwrap() {
        scheduler.schedule(&request.payload, &request.spec).await.unwrap();
    }

    clock.set(at(2020, 7, 16, 8, 0));
    scheduler.fire_due().await.unwrap();

    let fired: Vec<_> = handler
        .events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            Event::TriggerFired { key, payload, .. } if key.as_str() == "report.daily-1" => {
                Some(payload)
            }
            _ => None,
        })
        .collect();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].subject, "report.daily");
    assert_eq!(fired[0].parameters.get("format"), Some(&serde_json::json!("pdf")));
}
