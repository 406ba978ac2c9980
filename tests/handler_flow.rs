//! Daemon handler tests: IPC commands against a registry of fake targets

mod support;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::Mutex;

use inspector::cdp::{Connector, TargetInfo, Transport};
use inspector::common::Result;
use inspector::daemon::{handle_command, HandlerContext};
use inspector::ipc::protocol::Command;
use inspector::session::SessionRegistry;
use inspector::sourcemap::IdentityMapper;

use support::{fake_target, test_config, TargetBehavior};

const APP: &str = "http://localhost:3000/app.js";

/// Connector handing out one prepared fake target per connect call
struct FakeConnector {
    behaviors: StdMutex<VecDeque<TargetBehavior>>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        tab_index: Option<usize>,
    ) -> Result<(Box<dyn Transport>, TargetInfo)> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        let (transport, _handle) = fake_target(behavior);
        Ok((
            transport,
            TargetInfo {
                host: host.to_string(),
                port,
                tab_index: tab_index.unwrap_or(0),
            },
        ))
    }

    async fn open_tab(&self, host: &str, port: u16) -> Result<(Box<dyn Transport>, TargetInfo)> {
        self.connect(host, port, None).await
    }
}

fn context(behaviors: Vec<TargetBehavior>) -> HandlerContext {
    HandlerContext {
        registry: Arc::new(Mutex::new(SessionRegistry::new())),
        connector: Arc::new(FakeConnector {
            behaviors: StdMutex::new(behaviors.into()),
        }),
        mapper: Arc::new(IdentityMapper),
        config: test_config(),
    }
}

fn script_behavior() -> TargetBehavior {
    let mut behavior = TargetBehavior {
        node: true,
        scripts: vec![(APP.to_string(), 100)],
        ..Default::default()
    };
    behavior.resolve.insert((APP.to_string(), 9), 9);
    behavior
}

#[tokio::test]
async fn connect_registers_and_references_resolve() {
    let ctx = context(vec![script_behavior(), script_behavior()]);

    let response = handle_command(
        &ctx,
        1,
        Command::Connect {
            host: "127.0.0.1".to_string(),
            port: 9229,
            reference: Some("Checkout Flow".to_string()),
            tab_index: None,
        },
    )
    .await;
    assert!(response.success, "connect failed: {:?}", response.error);
    let result = response.result.unwrap();
    assert_eq!(result["session"], "s1");
    assert_eq!(result["reference"], "checkout-flow");
    assert_eq!(result["kind"], "script-runtime");
    assert_eq!(result["active"], true);

    // A whitespace/case variant of the same reference is a conflict
    let response = handle_command(
        &ctx,
        2,
        Command::Connect {
            host: "127.0.0.1".to_string(),
            port: 9230,
            reference: Some("checkout  flow".to_string()),
            tab_index: None,
        },
    )
    .await;
    assert!(!response.success);
    assert_eq!(response.error.unwrap().code, "REFERENCE_CONFLICT");

    // Keyed operations accept the reference
    let response = handle_command(
        &ctx,
        3,
        Command::SetBreakpoint {
            session: Some("checkout-flow".to_string()),
            file: APP.to_string(),
            line: 10,
            column: None,
            condition: None,
        },
    )
    .await;
    assert!(response.success, "breakpoint failed: {:?}", response.error);
    let result = response.result.unwrap();
    assert_eq!(result["location_differs"], false);
    assert_eq!(result["resolved"]["line"], 10);
}

#[tokio::test]
async fn reference_free_commands_target_the_active_session() {
    let ctx = context(vec![script_behavior()]);

    handle_command(
        &ctx,
        1,
        Command::Connect {
            host: "127.0.0.1".to_string(),
            port: 9229,
            reference: None,
            tab_index: None,
        },
    )
    .await;

    let response = handle_command(
        &ctx,
        2,
        Command::SetBreakpoint {
            session: None,
            file: APP.to_string(),
            line: 10,
            column: None,
            condition: None,
        },
    )
    .await;
    assert!(response.success);

    let response = handle_command(&ctx, 3, Command::ListBreakpoints { session: None }).await;
    let result = response.result.unwrap();
    assert_eq!(result["breakpoints"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn closing_the_active_session_promotes_a_survivor() {
    let ctx = context(vec![script_behavior(), script_behavior()]);

    for port in [9229u16, 9230] {
        let response = handle_command(
            &ctx,
            u64::from(port),
            Command::Connect {
                host: "127.0.0.1".to_string(),
                port,
                reference: None,
                tab_index: None,
            },
        )
        .await;
        assert!(response.success);
    }

    // Close the active session without naming it
    let response = handle_command(&ctx, 1, Command::Close { session: None }).await;
    assert!(response.success);
    assert_eq!(response.result.unwrap()["closed"], "s1");

    let response = handle_command(&ctx, 2, Command::Status).await;
    let status = response.result.unwrap();
    assert_eq!(status["session_count"], 1);
    assert_eq!(status["active"], "s2");

    let response = handle_command(&ctx, 3, Command::Close { session: None }).await;
    assert!(response.success);

    let response = handle_command(&ctx, 4, Command::Status).await;
    let status = response.result.unwrap();
    assert_eq!(status["session_count"], 0);
    assert!(status["active"].is_null());

    // No active session left to target
    let response = handle_command(&ctx, 5, Command::Resume { session: None }).await;
    assert!(!response.success);
    assert_eq!(response.error.unwrap().code, "NO_ACTIVE_SESSION");
}

#[tokio::test]
async fn unknown_sessions_are_reported() {
    let ctx = context(Vec::new());
    let response = handle_command(
        &ctx,
        1,
        Command::SetActive {
            session: "nope".to_string(),
        },
    )
    .await;
    assert!(!response.success);
    assert_eq!(response.error.unwrap().code, "SESSION_NOT_FOUND");
}
