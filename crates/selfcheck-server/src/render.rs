//! Presentation of run reports as HTML or JSON.

use askama::Template;
use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use selfcheck::{OutcomeView, ReportFormat, RunReport};
use std::sync::Arc;
use tracing::warn;

/// Turns a report into the health endpoint's response
pub trait Presenter: Send + Sync {
    fn render(&self, report: &RunReport) -> Response;
}

/// Presenter for the configured format
pub fn presenter_for(format: ReportFormat) -> Arc<dyn Presenter> {
    match format {
        ReportFormat::Html => Arc::new(HtmlPresenter::default()),
        ReportFormat::Json => Arc::new(JsonPresenter),
    }
}

fn status_of(report: &RunReport) -> StatusCode {
    StatusCode::from_u16(report.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// `{ "passed": [...], "failed": [...] }` with bodies stripped
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPresenter;

impl Presenter for JsonPresenter {
    fn render(&self, report: &RunReport) -> Response {
        (status_of(report), Json(report.view())).into_response()
    }
}

/// One table row of the HTML page
struct RowView {
    url: String,
    elapsed: String,
    reason: String,
    details: String,
}

impl RowView {
    fn new(outcome: &OutcomeView<'_>) -> Self {
        let details = match (outcome.status_code, outcome.error) {
            (_, Some(error)) => error.to_string(),
            (Some(code), None) => format!("HTTP {code}"),
            (None, None) => String::new(),
        };

        Self {
            url: outcome.url.to_string(),
            elapsed: outcome.display_elapsed(),
            reason: outcome.reason.to_string(),
            details,
        }
    }
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate<'a> {
    title: &'a str,
    failed: Vec<RowView>,
    passed: Vec<RowView>,
}

/// Human-readable page listing failed checks first
#[derive(Debug, Clone)]
pub struct HtmlPresenter {
    title: String,
}

impl HtmlPresenter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    fn page(&self, report: &RunReport) -> askama::Result<String> {
        let view = report.view();
        ReportTemplate {
            title: &self.title,
            failed: view.failed.iter().map(RowView::new).collect(),
            passed: view.passed.iter().map(RowView::new).collect(),
        }
        .render()
    }
}

impl Default for HtmlPresenter {
    fn default() -> Self {
        Self::new("Health check")
    }
}

impl Presenter for HtmlPresenter {
    fn render(&self, report: &RunReport) -> Response {
        match self.page(report) {
            Ok(html) => (
                status_of(report),
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                html,
            )
                .into_response(),
            Err(e) => {
                warn!(error = %e, "Failed to render report page");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
