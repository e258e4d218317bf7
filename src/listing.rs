//! Job list queries and client-side table state.
//!
//! Paging and coarse filters go to the server as query parameters
//! ([`ListJobsQuery`]); per-column text filters and sorting are applied to
//! the fetched page locally ([`JobTableView`]).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::job::{JobStatus, ResearchJob, Visibility};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn reversed(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Sortable and filterable job columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobColumn {
    Id,
    JobId,
    Status,
    Service,
    ModelName,
    Visibility,
    Prompt,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl JobColumn {
    /// Display text of this column for `job`, as the filters match it.
    fn text(self, job: &ResearchJob) -> String {
        match self {
            JobColumn::Id => job.id.to_string(),
            JobColumn::JobId => job.job_id.to_string(),
            JobColumn::Status => job.status.to_string(),
            JobColumn::Service => job.service.clone(),
            JobColumn::ModelName => job.model_name.clone(),
            JobColumn::Visibility => job.visibility.to_string(),
            JobColumn::Prompt => job.prompt.clone(),
            JobColumn::CreatedAt => job.created_at.clone().unwrap_or_default(),
            JobColumn::UpdatedAt => job.updated_at.clone().unwrap_or_default(),
        }
    }

    fn compare(self, a: &ResearchJob, b: &ResearchJob) -> Ordering {
        match self {
            JobColumn::Id => a.id.cmp(&b.id),
            JobColumn::CreatedAt => a.created_at_utc().cmp(&b.created_at_utc()),
            JobColumn::UpdatedAt => a.updated_at_utc().cmp(&b.updated_at_utc()),
            other => other.text(a).cmp(&other.text(b)),
        }
    }
}

/// Query parameters of `GET /api/research-jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListJobsQuery {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<JobColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

impl Default for ListJobsQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            service: None,
            model_name: None,
            visibility: None,
            status: None,
            org_id: None,
            order_by: None,
            order: None,
        }
    }
}

impl ListJobsQuery {
    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = page.max(1);
        self.limit = limit.max(1);
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn org(mut self, org_id: i64) -> Self {
        self.org_id = Some(org_id);
        self
    }

    pub fn ordered_by(mut self, column: JobColumn, order: SortOrder) -> Self {
        self.order_by = Some(column);
        self.order = Some(order);
        self
    }
}

/// Local filter and sort state over a fetched page of jobs.
#[derive(Debug, Clone, Default)]
pub struct JobTableView {
    filters: Vec<(JobColumn, String)>,
    order_by: JobColumn,
    order: SortOrder,
}

impl JobTableView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or with an empty needle, clear) the filter on `column`.
    pub fn set_filter(&mut self, column: JobColumn, needle: impl Into<String>) {
        let needle = needle.into();
        self.filters.retain(|(c, _)| *c != column);
        if !needle.is_empty() {
            self.filters.push((column, needle.to_lowercase()));
        }
    }

    /// Toggle sorting: same column flips direction, a new column starts
    /// descending.
    pub fn sort_by(&mut self, column: JobColumn) {
        if self.order_by == column {
            self.order = self.order.reversed();
        } else {
            self.order_by = column;
            self.order = SortOrder::Desc;
        }
    }

    pub fn ordering(&self) -> (JobColumn, SortOrder) {
        (self.order_by, self.order)
    }

    fn matches(&self, job: &ResearchJob) -> bool {
        self.filters
            .iter()
            .all(|(column, needle)| column.text(job).to_lowercase().contains(needle.as_str()))
    }

    /// Filter and sort `jobs`. Equal keys keep their fetched order.
    pub fn apply<'a>(&self, jobs: &'a [ResearchJob]) -> Vec<&'a ResearchJob> {
        let mut rows: Vec<&ResearchJob> = jobs.iter().filter(|job| self.matches(job)).collect();
        rows.sort_by(|a, b| {
            let ordering = self.order_by.compare(a, b);
            match self.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        rows
    }
}

/// Replace the entry with the same `job_id` in `jobs`, as after a refresh
/// or cancel of a single row. Returns `false` if no row matched.
pub fn replace_job(jobs: &mut [ResearchJob], updated: ResearchJob) -> bool {
    match jobs.iter_mut().find(|job| job.job_id == updated.job_id) {
        Some(slot) => {
            *slot = updated;
            true
        }
        None => false,
    }
}
