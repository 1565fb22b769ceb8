//! Integration tests for the admin status views.
//!
//! Tests cover:
//! - GET /api/v1/employees/status (fresh fan-out)
//! - GET /api/v1/employees/status/live (status monitor snapshot)
//! - GET /api/v1/dashboard/stats

mod common;

use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use chrono::Duration;
use common::{get_request, TestApp};
use domain::models::Role;
use tokio::sync::watch;

#[tokio::test]
async fn test_status_routes_require_admin() {
    let app = TestApp::new();
    let (_, token) = app.signed_in(Role::Employee).await;

    for uri in [
        "/api/v1/employees/status",
        "/api/v1/employees/status/live",
        "/api/v1/dashboard/stats",
    ] {
        let (status, _) = app.send(get_request(uri, Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);

        let (status, _) = app.send(get_request(uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_employee_statuses_in_directory_order() {
    let app = TestApp::new();
    let (_, admin_token) = app.signed_in(Role::Admin).await;
    let (first, first_token) = app.signed_in(Role::Employee).await;
    let second = app.create_user(Role::Employee).await;

    app.post_location(&first_token, 40.0, -74.0).await;

    let (status, body) = app
        .send(get_request("/api/v1/employees/status", Some(&admin_token)))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Admins are not listed
    let employees = body["employees"].as_array().unwrap();
    assert_eq!(employees.len(), 2);
    assert_eq!(body["online"], 1);

    assert_eq!(employees[0]["userId"], first.uid().to_string());
    assert_eq!(employees[0]["isOnline"], true);
    assert_eq!(employees[0]["lastActiveLabel"], "Just now");
    assert_eq!(employees[0]["currentLocation"]["lng"], -74.0);

    assert_eq!(employees[1]["userId"], second.uid().to_string());
    assert_eq!(employees[1]["isOnline"], false);
    assert!(employees[1]["lastActive"].is_null());
    assert_eq!(employees[1]["lastActiveLabel"], "Never");
}

#[tokio::test]
async fn test_dashboard_stats() {
    let app = TestApp::new();
    let (_, admin_token) = app.signed_in(Role::Admin).await;
    let (_, active_token) = app.signed_in(Role::Employee).await;
    app.create_user(Role::Employee).await;
    app.create_user(Role::Employee).await;

    app.post_location(&active_token, 51.5, -0.12).await;

    let (status, body) = app
        .send(get_request("/api/v1/dashboard/stats", Some(&admin_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalUsers"], 4);
    assert_eq!(body["activeUsers"], 1);
    assert_eq!(body["inactiveUsers"], 2);

    // Time alone moves the active employee offline
    app.clock.advance(Duration::minutes(10));
    let (_, body) = app
        .send(get_request("/api/v1/dashboard/stats", Some(&admin_token)))
        .await;
    assert_eq!(body["activeUsers"], 0);
    assert_eq!(body["inactiveUsers"], 3);
}

#[tokio::test]
async fn test_live_statuses_follow_monitor_refresh() {
    let app = TestApp::new();
    let (_, admin_token) = app.signed_in(Role::Admin).await;
    let (worker, worker_token) = app.signed_in(Role::Employee).await;

    // Nothing evaluated yet
    let (_, body) = app
        .send(get_request("/api/v1/employees/status/live", Some(&admin_token)))
        .await;
    assert!(body["employees"].as_array().unwrap().is_empty());
    assert!(body["evaluatedAt"].is_null());

    app.post_location(&worker_token, 40.0, -74.0).await;
    let transitions = app.state.services.monitor.refresh().await.unwrap();
    assert!(transitions.is_empty());

    let (_, body) = app
        .send(get_request("/api/v1/employees/status/live", Some(&admin_token)))
        .await;
    assert_eq!(body["employees"][0]["userId"], worker.uid().to_string());
    assert_eq!(body["employees"][0]["isOnline"], true);
    assert_eq!(body["evaluatedAt"], "2025-03-01T09:00:00Z");

    app.clock.advance(Duration::minutes(4));
    let transitions = app.state.services.monitor.refresh().await.unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].label(), "Online -> Offline");

    let (_, body) = app
        .send(get_request("/api/v1/employees/status/live", Some(&admin_token)))
        .await;
    assert_eq!(body["employees"][0]["isOnline"], false);
    assert_eq!(body["online"], 0);
}

#[tokio::test]
async fn test_spawned_monitor_reacts_to_new_samples() {
    let app = TestApp::new();
    let (_, worker_token) = app.signed_in(Role::Employee).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut snapshots = app.state.services.monitor.subscribe();
    let handle = app.state.services.monitor.clone().spawn(
        app.state.capabilities.directory.clone(),
        app.state.capabilities.samples.clone(),
        shutdown_rx,
    );

    // Initial refresh: one offline employee
    tokio::time::timeout(StdDuration::from_secs(5), snapshots.changed())
        .await
        .unwrap()
        .unwrap();

    app.post_location(&worker_token, 40.0, -74.0).await;

    let online = tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            snapshots.changed().await.unwrap();
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.statuses.first().map(|s| s.is_online) == Some(true) {
                return true;
            }
        }
    })
    .await
    .unwrap();
    assert!(online);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
