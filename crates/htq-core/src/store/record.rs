//! Flat field encoding of tasks and responses.
//!
//! A record that is missing a field, or carries one that does not parse,
//! decodes as `None`: callers treat it exactly like an absent record.

use chrono::{DateTime, Utc};

use crate::domain::{Headers, Task, TaskResponse, TaskStatus};
use crate::ports::Fields;

pub(crate) const STATUS: &str = "status";

const UUID: &str = "uuid";
const URL: &str = "url";
const METHOD: &str = "method";
const HEADERS: &str = "headers";
const DATA: &str = "data";
const TIMEOUT: &str = "timeout";
const CREATED_AT: &str = "created_at";

const STATUS_CODE: &str = "status_code";
const BODY: &str = "body";

const NANOS_PER_SEC: i64 = 1_000_000_000;

fn encode_headers(headers: &Headers) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string())
}

fn decode_headers(raw: &str) -> Option<Headers> {
    serde_json::from_str(raw).ok()
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000))
        .to_string()
}

fn decode_time(raw: &str) -> Option<DateTime<Utc>> {
    let nanos: i64 = raw.parse().ok()?;
    DateTime::from_timestamp(
        nanos.div_euclid(NANOS_PER_SEC),
        nanos.rem_euclid(NANOS_PER_SEC) as u32,
    )
}

pub(crate) fn encode_task(task: &Task) -> Fields {
    Fields::from([
        (UUID.to_string(), task.id.to_string()),
        (URL.to_string(), task.url.clone()),
        (METHOD.to_string(), task.method.clone()),
        (HEADERS.to_string(), encode_headers(&task.headers)),
        (DATA.to_string(), task.data.clone()),
        (TIMEOUT.to_string(), task.timeout.to_string()),
        (CREATED_AT.to_string(), encode_time(task.created_at)),
        (STATUS.to_string(), task.status.as_str().to_string()),
    ])
}

pub(crate) fn decode_task(fields: &Fields) -> Option<Task> {
    let timeout: u64 = fields.get(TIMEOUT)?.parse().ok()?;
    if timeout == 0 {
        return None;
    }
    Some(Task {
        id: fields.get(UUID)?.parse().ok()?,
        url: fields.get(URL)?.clone(),
        method: fields.get(METHOD)?.clone(),
        headers: decode_headers(fields.get(HEADERS)?)?,
        data: fields.get(DATA)?.clone(),
        timeout,
        created_at: decode_time(fields.get(CREATED_AT)?)?,
        status: decode_status(fields)?,
    })
}

/// Just the status field, for conditional checks that do not need the rest.
pub(crate) fn decode_status(fields: &Fields) -> Option<TaskStatus> {
    fields.get(STATUS)?.parse().ok()
}

pub(crate) fn encode_response(response: &TaskResponse) -> Fields {
    Fields::from([
        (STATUS_CODE.to_string(), response.status_code.to_string()),
        (HEADERS.to_string(), encode_headers(&response.headers)),
        (BODY.to_string(), response.body.clone()),
    ])
}

pub(crate) fn decode_response(fields: &Fields) -> Option<TaskResponse> {
    Some(TaskResponse {
        status_code: fields.get(STATUS_CODE)?.parse().ok()?,
        headers: decode_headers(fields.get(HEADERS)?)?,
        body: fields.get(BODY)?.clone(),
    })
}
