//! Test fixtures for creating frames, snapshots and configurations.

#![allow(dead_code)]

use chrono::Utc;
use pw_protocol::{
    ExecutionSnapshot, ExecutionStatus, ExecutionUpdate, LogLevel, LogUpdate, MonitorConfig,
    ServerMessage, StepKind, StepSnapshot, StepStatus, StepUpdate,
};

/// Configuration with short delays so timer-driven tests finish quickly
/// under paused time.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        ws_url: "ws://push.test/ws/executions".to_string(),
        api_base_url: "http://api.test/api/pipelines".to_string(),
        token: Some("test-token".to_string()),
        reconnect_base_delay_ms: 100,
        reconnect_max_delay_ms: 1_000,
        max_reconnect_attempts: 5,
        connect_timeout_ms: 1_000,
        fallback_poll_interval_ms: 500,
        running_poll_interval_ms: 200,
        ..MonitorConfig::default()
    }
}

/// Create an `execution_update` frame.
pub fn execution_update(status: ExecutionStatus, done: u32, total: u32) -> ServerMessage {
    ServerMessage::ExecutionUpdate(ExecutionUpdate {
        status,
        total_steps: total,
        successful_steps: done,
        failed_steps: 0,
        execution_time: f64::from(done),
        message: None,
        timestamp: Utc::now(),
        pipeline_name: Some("deploy-api".to_string()),
    })
}

/// Create a `step_update` frame for a top-level step.
pub fn step_update(step_id: &str, status: StepStatus) -> ServerMessage {
    ServerMessage::StepUpdate(StepUpdate {
        step_id: step_id.to_string(),
        step_name: format!("Step {step_id}"),
        status,
        execution_time: None,
        output: None,
        error_message: None,
        timestamp: Utc::now(),
        step_type: StepKind::Step,
        parent_step_id: None,
    })
}

/// Create a `log_update` frame.
pub fn log_update(message: &str) -> ServerMessage {
    ServerMessage::LogUpdate(LogUpdate {
        level: LogLevel::Info,
        message: message.to_string(),
        step_name: None,
        source: None,
        timestamp: Utc::now(),
    })
}

/// Create a snapshot step.
pub fn snapshot_step(step_id: &str, status: StepStatus) -> StepSnapshot {
    StepSnapshot {
        step_id: step_id.to_string(),
        step_name: format!("Step {step_id}"),
        status,
        execution_time: None,
        output: None,
        error_message: None,
        step_type: StepKind::Step,
        children: Vec::new(),
        timestamp: None,
    }
}

/// Create a snapshot without a server timestamp; the fetch time applies.
pub fn snapshot(status: ExecutionStatus, steps: Vec<StepSnapshot>) -> ExecutionSnapshot {
    let successful = steps
        .iter()
        .filter(|step| step.status == StepStatus::Success)
        .count() as u32;
    ExecutionSnapshot {
        execution_id: None,
        status,
        total_steps: steps.len() as u32,
        successful_steps: successful,
        failed_steps: 0,
        execution_time: 1.0,
        message: None,
        pipeline_name: Some("deploy-api".to_string()),
        timestamp: None,
        steps,
        logs: None,
    }
}
