//! Synchronous client for the hosted data service, with retries.
//!
//! The service exposes each table as a REST resource under `/rest/v1/<table>`
//! and stored procedures under `/rest/v1/rpc/<function>`.

use crate::{
    ARCHIVED_DEADLINE, CLIENT_REQUEST_TIMEOUT_SECS, CLIENT_VERSION, NewSubmission, SubmissionRecord,
    TaskRecord, UnitRecord,
};
use anyhow::{Context, Result, anyhow, bail};
use log::warn;
use reqwest::blocking::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::{thread, time::Duration};

/// Helper function to determine if an error is retry-able
/// - `is_timeout()` catches typical network timeouts
/// - `is_connect()` catches typical connection failures
/// - `is_request()` catches DNS resolution failures and other transient request errors
fn is_retryable_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

/// Helper function to classify reqwest error types
fn error_type_str(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection"
    } else if e.is_request() {
        "request/DNS"
    } else if e.is_body() {
        "body"
    } else if e.is_decode() {
        "decode"
    } else {
        "unknown"
    }
}

/// Seconds to wait before the next attempt.
fn backoff_secs(attempts: u32) -> u64 {
    2_u64.pow(attempts.saturating_sub(1))
}

/// Generic retry logic for HTTP requests with exponential backoff.
/// Handles both network errors and 5xx server errors.
/// Takes a closure to process the successful response.
fn retry_request<F, P, T>(request_fn: F, process_response: P, max_retries: u32) -> Result<T>
where
    F: Fn() -> Result<Response, reqwest::Error>,
    P: Fn(Response) -> Result<T>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match request_fn() {
            Ok(response) => {
                if response.status().is_server_error() {
                    if attempts < max_retries {
                        let sleep_secs = backoff_secs(attempts);
                        let status = response.status();
                        let error_msg = response.text().unwrap_or_default();
                        warn!(
                            "Server error ({status} {error_msg}), retrying in {sleep_secs} seconds... (attempt {attempts}/{max_retries})"
                        );
                        thread::sleep(Duration::from_secs(sleep_secs));
                        continue;
                    }
                    let status = response.status();
                    return Err(anyhow!("Server error after {attempts} attempts: {status}"));
                }

                return process_response(response);
            }
            Err(e) => {
                if is_retryable_error(&e) && attempts < max_retries {
                    let sleep_secs = backoff_secs(attempts);
                    warn!(
                        "Network error ({}), retrying in {} seconds... (attempt {}/{}): {}",
                        error_type_str(&e),
                        sleep_secs,
                        attempts,
                        max_retries,
                        e
                    );
                    thread::sleep(Duration::from_secs(sleep_secs));
                    continue;
                }
                return Err(anyhow!(
                    "Network error ({}) after {attempts} attempts: {e}",
                    error_type_str(&e)
                ));
            }
        }
    }
}

/// Fail on any non-success status, passing the body text along.
fn ensure_success(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let msg = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        bail!("Server returned an error ({status}): {msg}");
    }
    Ok(response)
}

fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    ensure_success(response)?
        .json::<T>()
        .with_context(|| format!("Failed to deserialize {what}"))
}

/// Quote a value for use inside a PostgREST `in.(...)` list.
fn quote_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("({})", quoted.join(","))
}

/// What `authenticate_unit` returns on success.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitLogin {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct UnitCredentials<'a> {
    unit_name: &'a str,
    unit_password: &'a str,
}

#[derive(Debug, Serialize)]
struct AdminCredentials<'a> {
    admin_password: &'a str,
}

/// Connection details for the data service.
#[derive(Debug, Clone)]
pub struct BackendClient {
    api_base: String,
    api_key: String,
    max_retries: u32,
}

impl BackendClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, max_retries: u32) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: max_retries.max(1),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.api_base)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{function}", self.api_base)
    }

    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should be extremely rare).
    fn http(&self) -> reqwest::blocking::Client {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(CLIENT_REQUEST_TIMEOUT_SECS))
            .user_agent(format!("scoreboard/{CLIENT_VERSION}"))
            .build()
            .expect("Failed to build HTTP client")
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let url = self.table_url(table);
        retry_request(
            || self.authorize(self.http().get(&url).query(query)).send(),
            |response| parse_json(response, table),
            self.max_retries,
        )
    }

    fn rpc<B: Serialize, T: DeserializeOwned>(&self, function: &str, body: &B) -> Result<T> {
        let url = self.rpc_url(function);
        retry_request(
            || self.authorize(self.http().post(&url).json(body)).send(),
            |response| parse_json(response, function),
            self.max_retries,
        )
    }

    /// Fetch every unit with its score.
    ///
    /// # Errors
    /// Returns an error if the request fails after all retries or the rows cannot be parsed.
    pub fn get_units(&self) -> Result<Vec<UnitRecord>> {
        self.select("units", &[("select", "id,name,score".to_string())])
    }

    /// Fetch every task that has not been archived.
    ///
    /// # Errors
    /// Returns an error if the request fails after all retries or the rows cannot be parsed.
    pub fn get_tasks(&self) -> Result<Vec<TaskRecord>> {
        self.select(
            "tasks",
            &[
                ("select", "*".to_string()),
                ("deadline", format!("neq.{}", ARCHIVED_DEADLINE.to_rfc3339())),
                ("order", "deadline.asc".to_string()),
            ],
        )
    }

    /// Fetch specific tasks by id, archived ones included.
    ///
    /// # Errors
    /// Returns an error if the request fails after all retries or the rows cannot be parsed.
    pub fn get_tasks_by_ids(&self, ids: &[String]) -> Result<Vec<TaskRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "tasks",
            &[("select", "*".to_string()), ("id", format!("in.{}", quote_list(ids)))],
        )
    }

    /// Fetch all submissions made by one unit.
    ///
    /// # Errors
    /// Returns an error if the request fails after all retries or the rows cannot be parsed.
    pub fn get_submissions_for_unit(&self, unit_id: &str) -> Result<Vec<SubmissionRecord>> {
        self.select(
            "task_submissions",
            &[
                ("select", "*".to_string()),
                ("unit_id", format!("eq.{unit_id}")),
                ("order", "submitted_at.desc".to_string()),
            ],
        )
    }

    /// Insert a new pending submission and return the stored row.
    ///
    /// # Errors
    /// Returns an error if the request fails after all retries or the service rejects the row.
    pub fn insert_submission(&self, submission: &NewSubmission) -> Result<SubmissionRecord> {
        let url = self.table_url("task_submissions");
        let rows: Vec<SubmissionRecord> = retry_request(
            || {
                self.authorize(self.http().post(&url).json(submission))
                    .header("Prefer", "return=representation")
                    .send()
            },
            |response| parse_json(response, "task_submissions"),
            self.max_retries,
        )?;
        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("Service stored the submission but returned no row"))
    }

    /// Check a unit's credentials. `None` means they were rejected.
    ///
    /// # Errors
    /// Returns an error if the request fails after all retries or the reply cannot be parsed.
    pub fn authenticate_unit(&self, unit_name: &str, password: &str) -> Result<Option<UnitLogin>> {
        let rows: Vec<UnitLogin> = self.rpc(
            "authenticate_unit",
            &UnitCredentials {
                unit_name,
                unit_password: password,
            },
        )?;
        Ok(rows.into_iter().next())
    }

    /// Check the admin password.
    ///
    /// # Errors
    /// Returns an error if the request fails after all retries or the reply cannot be parsed.
    pub fn authenticate_admin(&self, password: &str) -> Result<bool> {
        self.rpc(
            "authenticate_admin",
            &AdminCredentials {
                admin_password: password,
            },
        )
    }
}
