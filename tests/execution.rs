use netshow::config::Settings;
use netshow::errors::{ServiceError, ServiceErrorKind};
use netshow::models::{DeviceInput, ExecutionRequestInput, JumphostInput, ShowCommandInput};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{
    build_app, default_app, DeviceScript, FakeDeviceConnector, FakeProxyConnector, Journal, Reply,
    SHOW_VERSION_IOS,
};

fn device(hostname: &str) -> DeviceInput {
    DeviceInput {
        hostname: hostname.to_string(),
        username: "netops".to_string(),
        password: "s3cret".to_string(),
        os_family: "ios".to_string(),
        ..DeviceInput::default()
    }
}

fn via(mut input: DeviceInput, host: &str) -> DeviceInput {
    input.jumphost = Some(bastion(host));
    input
}

fn bastion(host: &str) -> JumphostInput {
    JumphostInput {
        host: Some(host.to_string()),
        port: None,
        username: Some("jump".to_string()),
        key_path: Some("~/.ssh/id_ed25519".to_string()),
    }
}

fn command(text: &str) -> ShowCommandInput {
    ShowCommandInput {
        command: text.to_string(),
        ..ShowCommandInput::default()
    }
}

fn request(devices: Vec<DeviceInput>, commands: &[&str]) -> ExecutionRequestInput {
    ExecutionRequestInput {
        devices,
        commands: commands.iter().map(|c| command(c)).collect(),
        ..ExecutionRequestInput::default()
    }
}

#[tokio::test]
async fn one_unreachable_device_does_not_fail_the_batch() {
    let journal = Arc::new(Journal::default());
    let devices = FakeDeviceConnector::new(journal.clone())
        .device(
            "10.0.0.1",
            DeviceScript::default().reply("show version", Reply::Output(SHOW_VERSION_IOS.into())),
        )
        .device(
            "10.0.0.2",
            DeviceScript::unreachable(ServiceError::connection("Connection refused by 10.0.0.2:22")),
        );
    let app = build_app(
        Settings::default(),
        devices,
        FakeProxyConnector::new(journal.clone()),
    );

    let response = app
        .execution_manager
        .execute(&request(
            vec![device("10.0.0.1"), device("10.0.0.2")],
            &["show version"],
        ))
        .await
        .expect("batch runs");

    assert_eq!(response.total_devices, 2);
    assert_eq!(response.successful_devices, 1);
    assert_eq!(response.failed_devices, 1);

    let ok = &response.device_results[0];
    assert!(ok.succeeded);
    assert_eq!(ok.command_results.len(), 1);
    assert_eq!(
        ok.command_results[0].raw_output.as_deref(),
        Some(SHOW_VERSION_IOS)
    );

    let down = &response.device_results[1];
    assert!(!down.succeeded);
    assert!(down.command_results.is_empty());
    let err = down.device_error.as_ref().expect("device error");
    assert_eq!(err.kind, ServiceErrorKind::Connection);
    assert!(err.message.contains("refused"));
}

#[tokio::test]
async fn command_timeout_is_isolated_to_its_result() {
    let journal = Arc::new(Journal::default());
    let devices = FakeDeviceConnector::new(journal.clone()).device(
        "r1",
        DeviceScript::default()
            .reply("show clock", Reply::Output("*10:15:01.123 UTC Mon Mar 4 2024\n".into()))
            .reply("show tech-support", Reply::Stall),
    );
    let app = build_app(
        Settings::default(),
        devices,
        FakeProxyConnector::new(journal.clone()),
    );
    let mut input = request(
        vec![device("r1")],
        &["show clock", "show tech-support", "show users"],
    );
    input.timeout_seconds = Some(1);

    let response = app.execution_manager.execute(&input).await.expect("batch");
    let result = &response.device_results[0];
    assert!(result.succeeded);
    assert_eq!(result.command_results.len(), 3);

    assert!(result.command_results[0].succeeded);
    let timed_out = &result.command_results[1];
    assert!(!timed_out.succeeded);
    assert!(timed_out.raw_output.is_none());
    assert_eq!(
        timed_out.execution_error.as_ref().map(|e| e.kind),
        Some(ServiceErrorKind::Timeout)
    );
    assert!(result.command_results[2].succeeded);
    assert_eq!(
        journal.commands_on("r1"),
        vec!["show clock", "show tech-support", "show users"]
    );
    assert_eq!(journal.sessions_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unresponsive_session_is_cut_off_by_the_hard_ceiling() {
    let journal = Arc::new(Journal::default());
    let devices = FakeDeviceConnector::new(journal.clone()).device(
        "r1",
        DeviceScript::default().reply("show tech-support", Reply::Hang),
    );
    let app = build_app(
        Settings::default(),
        devices,
        FakeProxyConnector::new(journal.clone()),
    );
    let mut input = request(vec![device("r1")], &["show tech-support", "show clock"]);
    input.timeout_seconds = Some(1);

    let started = std::time::Instant::now();
    let response = app.execution_manager.execute(&input).await.expect("batch");
    assert!(started.elapsed() < Duration::from_secs(30));

    let result = &response.device_results[0];
    assert!(result.succeeded);
    let hung = &result.command_results[0];
    assert!(!hung.succeeded);
    let err = hung.execution_error.as_ref().expect("timeout error");
    assert_eq!(err.kind, ServiceErrorKind::Timeout);
    assert!(err.message.contains("timed out after 1s"));
    assert!(result.command_results[1].succeeded);
    assert_eq!(journal.commands_on("r1"), vec!["show tech-support", "show clock"]);
    assert_eq!(journal.sessions_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn device_rejection_fails_only_that_command() {
    let journal = Arc::new(Journal::default());
    let devices = FakeDeviceConnector::new(journal.clone()).device(
        "r1",
        DeviceScript::default().reply(
            "show bogus",
            Reply::Fail(ServiceError::execution("% Invalid input detected at '^' marker.")),
        ),
    );
    let app = build_app(
        Settings::default(),
        devices,
        FakeProxyConnector::new(journal.clone()),
    );

    let response = app
        .execution_manager
        .execute(&request(vec![device("r1")], &["show bogus", "show version"]))
        .await
        .expect("batch");
    let results = &response.device_results[0].command_results;
    assert_eq!(
        results[0].execution_error.as_ref().map(|e| e.kind),
        Some(ServiceErrorKind::Execution)
    );
    assert!(results[1].succeeded);
    assert_eq!(response.successful_devices, 1);
}

#[tokio::test]
async fn devices_sharing_a_jumphost_share_one_connection() {
    let journal = Arc::new(Journal::default());
    let app = default_app(journal.clone());

    let response = app
        .execution_manager
        .execute(&request(
            vec![
                via(device("10.1.0.1"), "bastion.example.net"),
                via(device("10.1.0.2"), "bastion.example.net"),
                via(device("10.1.0.3"), "bastion.example.net"),
            ],
            &["show version"],
        ))
        .await
        .expect("batch");

    assert_eq!(response.successful_devices, 3);
    assert_eq!(journal.proxy_connects.load(Ordering::SeqCst), 1);
    for host in ["10.1.0.1", "10.1.0.2", "10.1.0.3"] {
        let key = journal.proxy_for(host).expect("routed through bastion");
        assert_eq!(key.host, "bastion.example.net");
        assert_eq!(key.port, 22);
        assert_eq!(key.username, "jump");
    }
    assert_eq!(journal.proxies_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_jumphosts_and_direct_devices_are_routed_independently() {
    let journal = Arc::new(Journal::default());
    let app = default_app(journal.clone());

    app.execution_manager
        .execute(&request(
            vec![
                via(device("10.1.0.1"), "bastion-a"),
                via(device("10.2.0.1"), "bastion-b"),
                device("10.3.0.1"),
            ],
            &["show clock"],
        ))
        .await
        .expect("batch");

    assert_eq!(journal.proxy_connects.load(Ordering::SeqCst), 2);
    assert_eq!(
        journal.proxy_for("10.1.0.1").map(|k| k.host),
        Some("bastion-a".to_string())
    );
    assert_eq!(
        journal.proxy_for("10.2.0.1").map(|k| k.host),
        Some("bastion-b".to_string())
    );
    assert!(journal.proxy_for("10.3.0.1").is_none());
    assert_eq!(journal.proxies_closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_jumphost_fails_every_device_behind_it_once() {
    let journal = Arc::new(Journal::default());
    let app = build_app(
        Settings::default(),
        FakeDeviceConnector::new(journal.clone()),
        FakeProxyConnector::refusing(
            journal.clone(),
            ServiceError::connection("Jumphost authentication failed for jump@bastion:22"),
        ),
    );

    let response = app
        .execution_manager
        .execute(&request(
            vec![
                via(device("10.1.0.1"), "bastion"),
                via(device("10.1.0.2"), "bastion"),
                device("10.9.0.1"),
            ],
            &["show version"],
        ))
        .await
        .expect("batch");

    assert_eq!(journal.proxy_connects.load(Ordering::SeqCst), 1);
    assert_eq!(response.failed_devices, 2);
    assert_eq!(response.successful_devices, 1);
    for result in &response.device_results[..2] {
        let err = result.device_error.as_ref().expect("jumphost error");
        assert!(err.message.contains("Jumphost authentication failed"));
    }
    assert_eq!(journal.opened_hosts(), vec!["10.9.0.1"]);
}

#[tokio::test]
async fn results_keep_request_order_under_parallelism() {
    let journal = Arc::new(Journal::default());
    let devices = FakeDeviceConnector::new(journal.clone())
        .device("r1", DeviceScript::default().slow(Duration::from_millis(150)))
        .device("r2", DeviceScript::default().slow(Duration::from_millis(50)))
        .device("r3", DeviceScript::default());
    let settings = Settings {
        max_parallel_devices: 3,
        ..Settings::default()
    };
    let app = build_app(settings, devices, FakeProxyConnector::new(journal.clone()));

    let response = app
        .execution_manager
        .execute(&request(
            vec![device("r1"), device("r2"), device("r3")],
            &["show users"],
        ))
        .await
        .expect("batch");

    let order: Vec<_> = response
        .device_results
        .iter()
        .map(|r| r.hostname.as_str())
        .collect();
    assert_eq!(order, vec!["r1", "r2", "r3"]);
    assert_eq!(journal.opened_hosts(), vec!["r3", "r2", "r1"]);
}

#[tokio::test]
async fn use_jumphost_without_default_rejects_before_connecting() {
    let journal = Arc::new(Journal::default());
    let app = default_app(journal.clone());
    let mut input = request(vec![device("r1")], &["show version"]);
    input.use_jumphost = true;

    let err = app
        .execution_manager
        .execute(&input)
        .await
        .expect_err("no default jumphost");
    assert_eq!(err.kind, ServiceErrorKind::Configuration);
    assert!(err.message.contains("no default jumphost"));
    assert!(journal.opened_hosts().is_empty());
    assert_eq!(journal.proxy_connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn use_jumphost_routes_devices_without_their_own_through_the_default() {
    let journal = Arc::new(Journal::default());
    let settings = Settings {
        default_jumphost: Some(bastion("default-bastion")),
        ..Settings::default()
    };
    let app = build_app(
        settings,
        FakeDeviceConnector::new(journal.clone()),
        FakeProxyConnector::new(journal.clone()),
    );
    let mut input = request(
        vec![device("r1"), via(device("r2"), "own-bastion")],
        &["show version"],
    );
    input.use_jumphost = true;

    app.execution_manager.execute(&input).await.expect("batch");
    assert_eq!(
        journal.proxy_for("r1").map(|k| k.host),
        Some("default-bastion".to_string())
    );
    assert_eq!(
        journal.proxy_for("r2").map(|k| k.host),
        Some("own-bastion".to_string())
    );
}

#[tokio::test]
async fn invalid_request_is_rejected_with_no_connection() {
    let journal = Arc::new(Journal::default());
    let app = default_app(journal.clone());

    let err = app
        .execution_manager
        .execute(&request(vec![device("r1")], &["configure terminal"]))
        .await
        .expect_err("write command");
    assert_eq!(err.kind, ServiceErrorKind::InvalidParams);
    assert!(journal.opened_hosts().is_empty());

    let mut junos = device("r2");
    junos.os_family = "junos".to_string();
    let err = app
        .execution_manager
        .execute(&request(vec![junos], &["show version"]))
        .await
        .expect_err("junos");
    assert!(err.message.contains("JunOS is not supported"));
}

#[tokio::test]
async fn panicking_command_fails_only_that_command() {
    let journal = Arc::new(Journal::default());
    let devices = FakeDeviceConnector::new(journal.clone())
        .device("r1", DeviceScript::default().reply("show version", Reply::Panic));
    let app = build_app(
        Settings::default(),
        devices,
        FakeProxyConnector::new(journal.clone()),
    );

    let response = app
        .execution_manager
        .execute(&request(
            vec![device("r1"), device("r2")],
            &["show clock", "show version", "show users"],
        ))
        .await
        .expect("batch");

    let r1 = &response.device_results[0];
    assert!(r1.succeeded);
    assert!(r1.device_error.is_none());
    assert_eq!(r1.command_results.len(), 3);
    assert!(r1.command_results[0].succeeded);
    let err = r1.command_results[1]
        .execution_error
        .as_ref()
        .expect("internal error");
    assert_eq!(err.kind, ServiceErrorKind::Internal);
    assert!(err.message.contains("session state corrupted"));
    assert!(r1.command_results[2].succeeded);
    assert!(response.device_results[1].succeeded);
    assert_eq!(response.successful_devices, 2);
    assert_eq!(
        journal.commands_on("r1"),
        vec!["show clock", "show version", "show users"]
    );
    assert_eq!(journal.sessions_closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn parsed_mode_keeps_raw_only_when_parsing_fails() {
    let journal = Arc::new(Journal::default());
    let devices = FakeDeviceConnector::new(journal.clone()).device(
        "r1",
        DeviceScript::default()
            .reply("show version", Reply::Output(SHOW_VERSION_IOS.into()))
            .reply("show clock", Reply::Output("clock unavailable\n".into())),
    );
    let app = build_app(
        Settings::default(),
        devices,
        FakeProxyConnector::new(journal.clone()),
    );
    let mut input = request(
        vec![device("r1")],
        &["show version", "show clock", "show users"],
    );
    input.output_mode = Some("parsed".to_string());

    let response = app.execution_manager.execute(&input).await.expect("batch");
    let results = &response.device_results[0].command_results;

    assert!(results[0].raw_output.is_none());
    let parsed = results[0].parsed_output.as_ref().expect("parsed version");
    assert_eq!(parsed["version"], "15.0(2)SE11");
    assert_eq!(parsed["hostname"], "router1");

    assert!(results[1].succeeded);
    assert!(results[1].parsed_output.is_none());
    assert!(results[1].parse_error.is_some());
    assert_eq!(results[1].raw_output.as_deref(), Some("clock unavailable\n"));

    assert!(results[2].succeeded);
    assert!(results[2]
        .parse_error
        .as_deref()
        .unwrap_or_default()
        .contains("No parser template"));
}

#[tokio::test]
async fn pipe_filters_are_sent_as_part_of_the_command() {
    let journal = Arc::new(Journal::default());
    let app = default_app(journal.clone());
    let mut input = request(vec![device("r1")], &[]);
    input.commands = vec![ShowCommandInput {
        command: "show running-config".to_string(),
        pipe_operator: Some("section".to_string()),
        pipe_value: Some("interface GigabitEthernet0.1".to_string()),
    }];

    let response = app.execution_manager.execute(&input).await.expect("batch");
    assert_eq!(
        response.device_results[0].command_results[0].full_command,
        "show running-config | section interface GigabitEthernet0.1"
    );
    assert_eq!(
        journal.commands_on("r1"),
        vec!["show running-config | section interface GigabitEthernet0.1"]
    );
}

#[tokio::test]
async fn jumphost_test_reports_reachability_without_touching_devices() {
    let journal = Arc::new(Journal::default());
    let app = default_app(journal.clone());
    let result = app
        .execution_manager
        .test_jumphost(&bastion("bastion.example.net"))
        .await
        .expect("valid input");
    assert!(result.succeeded);
    assert_eq!(result.host, "bastion.example.net");
    assert_eq!(result.port, 22);
    assert_eq!(journal.proxies_closed.load(Ordering::SeqCst), 1);
    assert!(journal.opened_hosts().is_empty());

    let refusing = build_app(
        Settings::default(),
        FakeDeviceConnector::new(journal.clone()),
        FakeProxyConnector::refusing(journal.clone(), ServiceError::timeout("connect timed out")),
    );
    let result = refusing
        .execution_manager
        .test_jumphost(&bastion("bastion.example.net"))
        .await
        .expect("valid input");
    assert!(!result.succeeded);
    assert_eq!(
        result.error.as_ref().map(|e| e.kind),
        Some(ServiceErrorKind::Timeout)
    );

    let err = app
        .execution_manager
        .test_jumphost(&JumphostInput {
            host: Some("bastion".to_string()),
            ..JumphostInput::default()
        })
        .await
        .expect_err("incomplete");
    assert_eq!(err.kind, ServiceErrorKind::Configuration);
}
