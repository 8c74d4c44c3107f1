use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info};

use super::nullable;
use crate::fetcher::{Clock, FetchError, Fetcher, Request, Transport};

pub const API_URL: &str = "https://codeforces.com/api/problemset.problems";
const SITE_URL: &str = "https://codeforces.com";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default, deserialize_with = "nullable")]
    status: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProblemsetResult {
    #[serde(default, deserialize_with = "nullable")]
    problems: Vec<ApiProblem>,
    #[serde(default, deserialize_with = "nullable")]
    problem_statistics: Vec<ApiStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProblem {
    #[serde(default)]
    pub contest_id: Option<i64>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

impl ApiProblem {
    /// `{contestId}{index}`, when both parts are present.
    pub fn key(&self) -> Option<String> {
        match (self.contest_id, self.index.as_deref()) {
            (Some(contest), Some(index)) if !index.is_empty() => Some(problem_key(contest, index)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatistics {
    #[serde(default)]
    pub contest_id: Option<i64>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub solved_count: u64,
}

#[derive(Debug, Default)]
pub struct Problemset {
    pub problems: Vec<ApiProblem>,
    /// Keyed by `{contestId}{index}`.
    pub statistics: HashMap<String, ApiStatistics>,
}

pub fn problem_key(contest_id: i64, index: &str) -> String {
    format!("{}{}", contest_id, index)
}

pub fn problem_url(contest_id: i64, index: &str) -> String {
    format!("{}/problemset/problem/{}/{}", SITE_URL, contest_id, index)
}

pub fn fetch_problemset<T: Transport, C: Clock>(
    fetcher: &mut Fetcher<T, C>,
) -> Result<Problemset, FetchError> {
    info!("Fetching problemset from Codeforces API");
    let envelope: Envelope<ProblemsetResult> = fetcher.fetch_json(&Request::get(API_URL))?;
    if envelope.status != "OK" {
        return Err(FetchError::Malformed {
            url: API_URL.to_string(),
            reason: format!(
                "API status {}: {}",
                envelope.status,
                envelope.comment.unwrap_or_default()
            ),
        });
    }
    let result = envelope.result.unwrap_or_default();

    let statistics: HashMap<String, ApiStatistics> = result
        .problem_statistics
        .into_iter()
        .filter_map(|s| {
            let key = problem_key(s.contest_id?, s.index.as_deref()?);
            Some((key, s))
        })
        .collect();

    info!(
        "Fetched {} problems ({} with statistics)",
        result.problems.len(),
        statistics.len()
    );
    Ok(Problemset {
        problems: result.problems,
        statistics,
    })
}

/// Applies the rating window then the limit, preserving API order. With a
/// bound set, unrated problems are excluded.
pub fn select(
    problems: Vec<ApiProblem>,
    min_rating: Option<i32>,
    max_rating: Option<i32>,
    limit: usize,
) -> Vec<ApiProblem> {
    let in_range = |p: &ApiProblem| match (p.rating, min_rating, max_rating) {
        (_, None, None) => true,
        (None, _, _) => false,
        (Some(r), min, max) => min.map_or(true, |m| r >= m) && max.map_or(true, |m| r <= m),
    };

    let total = problems.len();
    let selected: Vec<ApiProblem> = problems.into_iter().filter(in_range).take(limit).collect();
    debug!("Selected {} of {} problems", selected.len(), total);
    selected
}

pub fn fetch_problem_page<T: Transport, C: Clock>(
    fetcher: &mut Fetcher<T, C>,
    contest_id: i64,
    index: &str,
) -> Result<String, FetchError> {
    fetcher.fetch(&Request::get(problem_url(contest_id, index)))
}
