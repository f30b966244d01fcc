//! Calendar provider subprocess.
//!
//! A provider is any executable named `urus-calendar-<name>` on `PATH` that
//! reads one JSON request from stdin and writes one JSON response to stdout:
//!
//! ```text
//! -> {"command": "create_event", "params": {"calendar_id": "...", "event": {...}}}
//! <- {"status": "success", "data": "event-id"}
//! <- {"status": "error", "error": "message"}
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::calendar::backend::{CalendarBackend, EventFields, NativeCalendar};
use crate::error::{UrusError, UrusResult};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
/// Permission requests wait on the user.
const PERMISSION_TIMEOUT: Duration = Duration::from_secs(300);

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    CheckPermission,
    RequestPermission,
    ListCalendars,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { error: String },
}

#[derive(Debug, Serialize)]
struct CheckPermission {}

impl ProviderCommand for CheckPermission {
    type Response = bool;
    fn command() -> Command {
        Command::CheckPermission
    }
}

#[derive(Debug, Serialize)]
struct RequestPermission {}

impl ProviderCommand for RequestPermission {
    type Response = bool;
    fn command() -> Command {
        Command::RequestPermission
    }
}

#[derive(Debug, Serialize)]
struct ListCalendars {}

impl ProviderCommand for ListCalendars {
    type Response = Vec<NativeCalendar>;
    fn command() -> Command {
        Command::ListCalendars
    }
}

#[derive(Debug, Serialize)]
struct CreateEvent<'a> {
    calendar_id: &'a str,
    event: &'a EventFields,
}

impl ProviderCommand for CreateEvent<'_> {
    type Response = String;
    fn command() -> Command {
        Command::CreateEvent
    }
}

#[derive(Debug, Serialize)]
struct UpdateEvent<'a> {
    event_id: &'a str,
    event: &'a EventFields,
}

impl ProviderCommand for UpdateEvent<'_> {
    type Response = ();
    fn command() -> Command {
        Command::UpdateEvent
    }
}

#[derive(Debug, Serialize)]
struct DeleteEvent<'a> {
    event_id: &'a str,
}

impl ProviderCommand for DeleteEvent<'_> {
    type Response = ();
    fn command() -> Command {
        Command::DeleteEvent
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderBackend(String);

impl ProviderBackend {
    pub fn from_name(name: &str) -> Self {
        ProviderBackend(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    fn binary_path(&self) -> UrusResult<PathBuf> {
        let binary_name = format!("urus-calendar-{}", self.0);
        which::which(&binary_name).map_err(|_| UrusError::ProviderNotInstalled(binary_name.clone()))
    }

    async fn call<C: ProviderCommand>(&self, cmd: C) -> UrusResult<C::Response> {
        self.call_within(PROVIDER_TIMEOUT, cmd).await
    }

    async fn call_within<C: ProviderCommand>(
        &self,
        limit: Duration,
        cmd: C,
    ) -> UrusResult<C::Response> {
        timeout(limit, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| UrusError::ProviderTimeout(limit.as_secs()))?
    }

    async fn call_raw<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> UrusResult<R> {
        let params = serde_json::to_value(params)?;
        let request_json = serde_json::to_string(&Request { command, params })?;

        let binary_path = self.binary_path()?;
        log::debug!("Calendar: {:?} via {}", command, binary_path.display());

        let mut child = TokioCommand::new(&binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                UrusError::Calendar(format!("Failed to spawn {}: {}", binary_path.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| UrusError::Calendar("Provider stdin unavailable".into()))?;
        stdin.write_all(format!("{request_json}\n").as_bytes()).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(UrusError::Calendar(format!(
                "Provider exited with status: {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        parse_response(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_response<R: DeserializeOwned>(raw: &str) -> UrusResult<R> {
    if raw.trim().is_empty() {
        return Err(UrusError::Calendar("Provider returned no response".into()));
    }

    let response: Response<R> = serde_json::from_str(raw)
        .map_err(|e| UrusError::Calendar(format!("Failed to parse response: {}", e)))?;

    match response {
        Response::Success { data } => Ok(data),
        Response::Error { error } => Err(UrusError::Calendar(error)),
    }
}

#[async_trait]
impl CalendarBackend for ProviderBackend {
    async fn check_permission(&self) -> UrusResult<bool> {
        self.call(CheckPermission {}).await
    }

    async fn request_permission(&self) -> UrusResult<bool> {
        self.call_within(PERMISSION_TIMEOUT, RequestPermission {}).await
    }

    async fn list_calendars(&self) -> UrusResult<Vec<NativeCalendar>> {
        self.call(ListCalendars {}).await
    }

    async fn create_event(&self, calendar_id: &str, fields: &EventFields) -> UrusResult<String> {
        self.call(CreateEvent {
            calendar_id,
            event: fields,
        })
        .await
    }

    async fn update_event(&self, event_id: &str, fields: &EventFields) -> UrusResult<()> {
        self.call(UpdateEvent {
            event_id,
            event: fields,
        })
        .await
    }

    async fn delete_event(&self, event_id: &str) -> UrusResult<()> {
        self.call(DeleteEvent { event_id }).await
    }
}
