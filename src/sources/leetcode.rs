use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::nullable;
use crate::fetcher::{Clock, FetchError, Fetcher, Request, Transport};
use crate::model::{Difficulty, Statistics};

pub const GRAPHQL_URL: &str = "https://leetcode.com/graphql";
const REFERER: &str = "https://leetcode.com/problemset/all/";

const LIST_QUERY: &str = r#"
query problemsetQuestionList($categorySlug: String, $limit: Int, $skip: Int, $filters: QuestionListFilterInput) {
  problemsetQuestionList: questionList(
    categorySlug: $categorySlug
    limit: $limit
    skip: $skip
    filters: $filters
  ) {
    total: totalNum
    questions: data {
      questionId
      questionFrontendId
      title
      titleSlug
      difficulty
      isPaidOnly
      topicTags { name slug }
      stats
    }
  }
}
"#;

const DETAIL_QUERY: &str = r#"
query questionData($titleSlug: String!) {
  question(titleSlug: $titleSlug) {
    questionId
    questionFrontendId
    title
    titleSlug
    content
    difficulty
    isPaidOnly
    topicTags { name slug }
    hints
    stats
  }
}
"#;

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListData {
    #[serde(default)]
    problemset_question_list: Option<QuestionPage>,
}

#[derive(Debug, Default, Deserialize)]
struct QuestionPage {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default, deserialize_with = "nullable")]
    questions: Vec<QuestionSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailData {
    #[serde(default)]
    question: Option<QuestionDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TopicTag {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    #[serde(default, deserialize_with = "nullable")]
    pub question_frontend_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title_slug: String,
    #[serde(default, deserialize_with = "nullable")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_paid_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetail {
    #[serde(default, deserialize_with = "nullable")]
    pub question_frontend_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title_slug: String,
    #[serde(default, deserialize_with = "nullable")]
    pub content: String,
    #[serde(default, deserialize_with = "nullable")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_paid_only: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub topic_tags: Vec<TopicTag>,
    #[serde(default, deserialize_with = "nullable")]
    pub hints: Vec<String>,
    /// JSON-encoded string, e.g. `{"totalAcceptedRaw": 1, "acRate": "50.0%"}`.
    #[serde(default)]
    pub stats: Option<String>,
}

impl QuestionDetail {
    /// Difficulty from the API label; unknown labels map to medium.
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty.parse().unwrap_or(Difficulty::Medium)
    }

    pub fn statistics(&self) -> Option<Statistics> {
        self.stats.as_deref().and_then(parse_stats)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStats {
    #[serde(default)]
    total_accepted_raw: Option<u64>,
    #[serde(default)]
    total_submission_raw: Option<u64>,
    #[serde(default)]
    ac_rate: Option<String>,
}

fn parse_stats(raw: &str) -> Option<Statistics> {
    let stats: RawStats = match serde_json::from_str(raw) {
        Ok(s) => s,
        Err(e) => {
            debug!("Ignoring unparsable stats: {}", e);
            return None;
        }
    };
    let acceptance_rate = stats
        .ac_rate
        .as_deref()
        .and_then(|r| r.trim().trim_end_matches('%').trim().parse::<f64>().ok());
    if stats.total_submission_raw.is_none()
        && stats.total_accepted_raw.is_none()
        && acceptance_rate.is_none()
    {
        return None;
    }
    Some(Statistics {
        total_submissions: stats.total_submission_raw,
        accepted_submissions: stats.total_accepted_raw,
        acceptance_rate,
    })
}

pub fn problem_url(slug: &str) -> String {
    format!("https://leetcode.com/problems/{}/", slug)
}

fn graphql(query: &str, variables: serde_json::Value) -> Request {
    Request::post_json(GRAPHQL_URL, json!({ "query": query, "variables": variables }))
        .header("Referer", REFERER)
}

// ── Queries ──

/// One page of the problem list, naive offset pagination.
pub fn fetch_question_list<T: Transport, C: Clock>(
    fetcher: &mut Fetcher<T, C>,
    limit: usize,
    skip: usize,
    difficulty: Option<Difficulty>,
) -> Result<Vec<QuestionSummary>, FetchError> {
    let mut filters = json!({});
    if let Some(d) = difficulty {
        filters["difficulty"] = json!(d.label().to_uppercase());
    }
    let variables = json!({
        "categorySlug": "",
        "limit": limit,
        "skip": skip,
        "filters": filters,
    });

    debug!("Fetching question list (limit={}, skip={}, difficulty={:?})", limit, skip, difficulty);
    let response: GraphqlResponse<ListData> = fetcher.fetch_json(&graphql(LIST_QUERY, variables))?;
    let page = response
        .data
        .and_then(|d| d.problemset_question_list)
        .ok_or_else(|| FetchError::Malformed {
            url: GRAPHQL_URL.to_string(),
            reason: "missing data.problemsetQuestionList".to_string(),
        })?;

    info!(
        "Fetched {} questions (of {} total)",
        page.questions.len(),
        page.total.map_or_else(|| "?".to_string(), |t| t.to_string())
    );
    Ok(page.questions)
}

/// Full question by slug. A null `question` means the slug does not exist.
pub fn fetch_question<T: Transport, C: Clock>(
    fetcher: &mut Fetcher<T, C>,
    slug: &str,
) -> Result<QuestionDetail, FetchError> {
    debug!("Fetching details for {}", slug);
    let response: GraphqlResponse<DetailData> =
        fetcher.fetch_json(&graphql(DETAIL_QUERY, json!({ "titleSlug": slug })))?;
    response
        .data
        .and_then(|d| d.question)
        .ok_or_else(|| FetchError::NotFound {
            url: problem_url(slug),
        })
}
