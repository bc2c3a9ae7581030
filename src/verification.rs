//! Invocation reports and the reconciliation of expected against actual calls.
use crate::checks::{CheckOutcome, CheckResult};
use crate::mock::MockId;
use crate::request::{print_body, BodyPrintLimit};
use crate::Request;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::{self, Write};

/// Which mock, if any, a report belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Mock { id: MockId, name: String },
    /// The request matched no route.
    NotMatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Pass,
    Fail,
    Error,
}

impl ReportStatus {
    /// The most severe of the two.
    fn worst(self, other: ReportStatus) -> ReportStatus {
        match (self, other) {
            (ReportStatus::Error, _) | (_, ReportStatus::Error) => ReportStatus::Error,
            (ReportStatus::Fail, _) | (_, ReportStatus::Fail) => ReportStatus::Fail,
            _ => ReportStatus::Pass,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportStatus::Pass => "PASS",
            ReportStatus::Fail => "FAIL",
            ReportStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// What was sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The verifiable record of one request served by a stand-in, or of an expected call that
/// never happened.
#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub origin: Origin,
    /// `None` for reports synthesized for mocks that were not called.
    pub request: Option<Request>,
    pub response: Option<ResponseSnapshot>,
    pub checks: Vec<CheckOutcome>,
    pub received_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub messages: Vec<String>,
}

impl InvocationReport {
    /// Report a request served by a mock. The status is derived from the check outcomes and
    /// any rendering errors.
    pub(crate) fn served(
        id: MockId,
        name: String,
        request: Request,
        response: ResponseSnapshot,
        checks: Vec<CheckOutcome>,
        errors: Vec<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let mut status = ReportStatus::Pass;
        let mut messages = Vec::new();
        for outcome in &checks {
            match &outcome.result {
                CheckResult::Pass => {}
                CheckResult::Fail(_) => {
                    status = status.worst(ReportStatus::Fail);
                    messages.push(outcome.to_string());
                }
                CheckResult::Error(_) => {
                    status = status.worst(ReportStatus::Error);
                    messages.push(outcome.to_string());
                }
            }
        }
        if !errors.is_empty() {
            status = ReportStatus::Error;
            messages.extend(errors);
        }

        Self {
            origin: Origin::Mock { id, name },
            request: Some(request),
            response: Some(response),
            checks,
            received_at,
            completed_at: Utc::now(),
            status,
            messages,
        }
    }

    /// Report a request that matched no route.
    pub(crate) fn not_found(
        request: Request,
        response: ResponseSnapshot,
        received_at: DateTime<Utc>,
    ) -> Self {
        let message = format!("no mock matches {} {}", request.method, request.url.path());
        Self {
            origin: Origin::NotMatched,
            request: Some(request),
            response: Some(response),
            checks: Vec::new(),
            received_at,
            completed_at: Utc::now(),
            status: ReportStatus::Fail,
            messages: vec![message],
        }
    }

    /// Report a request that could not even be captured, e.g. because its body could not be
    /// read.
    pub(crate) fn unreadable(message: String, received_at: DateTime<Utc>) -> Self {
        Self {
            origin: Origin::NotMatched,
            request: None,
            response: Some(ResponseSnapshot {
                status: 500,
                headers: Vec::new(),
                body: Vec::new(),
            }),
            checks: Vec::new(),
            received_at,
            completed_at: Utc::now(),
            status: ReportStatus::Error,
            messages: vec![message],
        }
    }

    /// Synthesize the report of an enabled mock that received no request.
    pub(crate) fn not_called(id: MockId, name: String) -> Self {
        let now = Utc::now();
        let message = format!("mock {} was not called", name);
        Self {
            origin: Origin::Mock { id, name },
            request: None,
            response: None,
            checks: Vec::new(),
            received_at: now,
            completed_at: now,
            status: ReportStatus::Error,
            messages: vec![message],
        }
    }

    pub fn mock_id(&self) -> Option<MockId> {
        match &self.origin {
            Origin::Mock { id, .. } => Some(*id),
            Origin::NotMatched => None,
        }
    }

    pub fn mock_name(&self) -> Option<&str> {
        match &self.origin {
            Origin::Mock { name, .. } => Some(name),
            Origin::NotMatched => None,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == ReportStatus::Pass
    }

    pub(crate) fn print_with_limit(
        &self,
        mut buffer: impl Write,
        body_print_limit: BodyPrintLimit,
    ) -> fmt::Result {
        match &self.origin {
            Origin::Mock { name, .. } => writeln!(buffer, "[{}] {}", self.status, name)?,
            Origin::NotMatched => writeln!(buffer, "[{}] <not matched>", self.status)?,
        }
        for message in &self.messages {
            writeln!(buffer, "  - {}", message)?;
        }
        if let Some(request) = &self.request {
            request.print_with_limit(&mut buffer, body_print_limit)?;
        }
        if let Some(response) = &self.response {
            writeln!(buffer, "-> {}", response.status)?;
            for (name, value) in &response.headers {
                writeln!(buffer, "{}: {}", name, value)?;
            }
            print_body(&mut buffer, &response.body, body_print_limit)?;
        }
        Ok(())
    }
}

impl fmt::Display for InvocationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_with_limit(f, BodyPrintLimit::Limited(crate::request::BODY_PRINT_LIMIT))
    }
}

/// Append a "not called" report for every expected mock that no captured report refers to.
///
/// `expected` lists the identifiers and names of the enabled mocks, in registration order.
pub fn reconcile(
    mut reports: Vec<InvocationReport>,
    expected: &[(MockId, String)],
) -> Vec<InvocationReport> {
    let called: HashSet<MockId> = reports.iter().filter_map(|r| r.mock_id()).collect();
    let missing = expected
        .iter()
        .filter(|(id, _)| !called.contains(id))
        .map(|(id, name)| InvocationReport::not_called(*id, name.clone()))
        .collect::<Vec<_>>();
    reports.extend(missing);
    reports
}

/// Whether a run met every expectation.
#[derive(Debug)]
pub enum VerificationOutcome {
    /// Every report passed.
    Success,
    /// One or more reports did not pass. All of them are returned.
    Failure(Vec<InvocationReport>),
}

impl VerificationOutcome {
    pub fn from_reports(reports: &[InvocationReport]) -> Self {
        let failed = reports
            .iter()
            .filter(|r| !r.is_pass())
            .cloned()
            .collect::<Vec<_>>();
        if failed.is_empty() {
            VerificationOutcome::Success
        } else {
            VerificationOutcome::Failure(failed)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, VerificationOutcome::Success)
    }

    pub(crate) fn error_message(&self, body_print_limit: BodyPrintLimit) -> String {
        let VerificationOutcome::Failure(failed) = self else {
            return String::new();
        };
        let mut message = format!("Verifications failed ({}):\n", failed.len());
        for report in failed {
            // Writing into a `String` never fails.
            let _ = report.print_with_limit(&mut message, body_print_limit);
            message.push('\n');
        }
        message
    }
}
