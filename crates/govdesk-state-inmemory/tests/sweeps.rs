mod common;

use chrono::Duration;
use common::*;
use tokio::sync::watch;

use govdesk_core::{
    Clock, NotificationKind, ReferenceNumber, RequestRepository, RequestState, ServiceRequest,
    SweepReport, WorkflowScheduler,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("govdesk_core=debug")
        .with_test_writer()
        .try_init();
}

/// Insert a request that never went through routing
async fn stranded_submission(h: &Harness) -> ServiceRequest {
    let reference = ReferenceNumber::new("LA", h.clock.today(), 500);
    let request =
        ServiceRequest::submit(small_loan(member("u-7")), reference, h.clock.now()).unwrap();
    h.provider.requests.insert(&request).await.unwrap();
    request
}

#[tokio::test]
async fn overdue_sweep_marks_each_loan_once() {
    let h = harness().await;
    let request = loan_in_use(&h, member("u-7")).await;

    assert_eq!(h.engine.mark_overdue_sweep().await.unwrap(), 0);

    h.clock.advance(Duration::days(8));
    assert_eq!(h.engine.mark_overdue_sweep().await.unwrap(), 1);
    assert_eq!(h.engine.mark_overdue_sweep().await.unwrap(), 0);
    assert!(!h.engine.mark_overdue(&request.id).await.unwrap());

    let stored = h.engine.find_request(&request.id).await.unwrap();
    assert_eq!(stored.state, RequestState::Overdue);
    assert_eq!(stored.last_reminder_on, Some(h.clock.today()));

    let overdue_events = h
        .provider
        .audit
        .records_for(&request.id.0)
        .into_iter()
        .filter(|r| r.event == "loan.overdue")
        .count();
    assert_eq!(overdue_events, 1);
    assert_eq!(
        h.provider
            .notifications
            .queued_of(NotificationKind::OverdueReminder)
            .len(),
        1
    );
}

#[tokio::test]
async fn overdue_reminders_repeat_daily() {
    let h = harness().await;
    loan_in_use(&h, member("u-7")).await;
    h.clock.advance(Duration::days(8));
    h.engine.mark_overdue_sweep().await.unwrap();

    assert_eq!(h.engine.send_reminders().await.unwrap(), 0);

    h.clock.advance(Duration::days(1));
    assert_eq!(h.engine.send_reminders().await.unwrap(), 1);
    assert_eq!(h.engine.send_reminders().await.unwrap(), 0);
    assert_eq!(
        h.provider
            .notifications
            .queued_of(NotificationKind::OverdueReminder)
            .len(),
        2
    );
}

#[tokio::test]
async fn due_soon_reminder_is_sent_once_per_day() {
    let h = harness().await;
    let request = loan_in_use(&h, guest("a@x.com")).await;

    assert_eq!(h.engine.send_reminders().await.unwrap(), 0);

    h.clock.advance(Duration::days(5));
    assert_eq!(h.engine.send_reminders().await.unwrap(), 1);
    assert_eq!(h.engine.send_reminders().await.unwrap(), 0);

    h.clock.advance(Duration::days(1));
    assert_eq!(h.engine.send_reminders().await.unwrap(), 1);

    let reminders = h
        .provider
        .notifications
        .queued_of(NotificationKind::DueSoonReminder);
    assert_eq!(reminders.len(), 2);
    assert_eq!(reminders[0].context["reference"], request.reference.as_str());
    assert_eq!(reminders[0].context["loan_end"], "2024-03-22");
}

#[tokio::test]
async fn stranded_submissions_are_routed_after_grace_period() {
    let h = harness().await;
    let request = stranded_submission(&h).await;

    assert_eq!(h.engine.route_pending_submissions().await.unwrap(), 0);
    assert_eq!(
        h.engine.current_state(&request.id).await.unwrap(),
        RequestState::Submitted
    );

    h.clock.advance(Duration::seconds(61));
    assert_eq!(h.engine.route_pending_submissions().await.unwrap(), 1);
    assert_eq!(
        h.engine.current_state(&request.id).await.unwrap(),
        RequestState::Approved
    );
    assert_eq!(h.engine.route_pending_submissions().await.unwrap(), 0);
}

#[tokio::test]
async fn scheduled_sweeps_report_their_work() {
    let h = harness().await;
    loan_in_use(&h, member("u-7")).await;
    stranded_submission(&h).await;
    h.clock.advance(Duration::days(8));

    let report = h.engine.run_scheduled_sweeps().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            routed: 1,
            marked_overdue: 1,
            reminders_queued: 0,
            links_reconciled: 0,
        }
    );

    assert_eq!(
        h.engine.run_scheduled_sweeps().await.unwrap(),
        SweepReport::default()
    );
}

#[tokio::test(start_paused = true)]
async fn scheduler_runs_until_shutdown() {
    init_tracing();
    let h = harness().await;
    let request = stranded_submission(&h).await;
    h.clock.advance(Duration::minutes(5));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = WorkflowScheduler::new(h.engine.clone())
        .with_interval(std::time::Duration::from_secs(60))
        .spawn(shutdown_rx);

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(
        h.engine.current_state(&request.id).await.unwrap(),
        RequestState::Approved
    );

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn scheduler_stops_when_sender_is_dropped() {
    let h = harness().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = WorkflowScheduler::new(h.engine.clone()).spawn(shutdown_rx);

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    drop(shutdown_tx);
    handle.await.unwrap();
}
