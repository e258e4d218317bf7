//! Request and response payloads of the research job endpoints.
//!
//! Model parameters arrive from the user as key/value text pairs; see
//! [`coerce_param_value`] for how values are typed before they are sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DrkrError, DrkrResult};
use crate::job::{JobId, JobStatus, ResearchJob, Visibility};

/// Body of `POST /api/research-jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub service: String,
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
}

impl JobRequest {
    pub fn new(
        service: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            model: model.into(),
            prompt: prompt.into(),
            model_params: None,
            visibility: None,
            org_id: None,
        }
    }

    /// Attach model parameters typed from user-entered pairs.
    ///
    /// Pairs with a blank key are dropped. An empty result leaves the
    /// request without `model_params`.
    pub fn with_param_pairs<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params = params_from_pairs(pairs);
        self.model_params = (!params.is_empty()).then_some(params);
        self
    }

    pub fn with_model_params(mut self, params: Map<String, Value>) -> Self {
        self.model_params = (!params.is_empty()).then_some(params);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_org(mut self, org_id: i64) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Check the required fields before anything is sent.
    pub fn validate(&self) -> DrkrResult<()> {
        let missing: Vec<&str> = [
            ("service", &self.service),
            ("model", &self.model),
            ("prompt", &self.prompt),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DrkrError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }
}

/// Build a parameter map from key/value text pairs.
pub fn params_from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Map<String, Value>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.as_ref().trim();
            (!key.is_empty()).then(|| (key.to_string(), coerce_param_value(value.as_ref())))
        })
        .collect()
}

/// Type a user-entered parameter value.
///
/// Tried in order: integer, finite float, `true`/`false`/`null`
/// (case-insensitive), any JSON document, and finally the trimmed text.
/// A blank value stays an empty string.
pub fn coerce_param_value(raw: &str) -> Value {
    let value = raw.trim();
    if value.is_empty() {
        return Value::String(String::new());
    }
    if let Ok(int) = value.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(number) = value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(number);
    }
    match value.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

/// Body of a successful create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job: ResearchJob,
    /// Follow-up questions; absent, `null` or empty means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<String>>,
}

impl CreateJobResponse {
    /// The follow-up questions, if the backend asked any.
    pub fn pending_questions(&self) -> Option<&[String]> {
        self.questions.as_deref().filter(|q| !q.is_empty())
    }
}

/// Body of `POST /api/research-jobs/get`.
///
/// A job is addressed either by `job_id` plus `service`, or by row `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetJobRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl GetJobRequest {
    pub fn for_job(job: &ResearchJob) -> Self {
        Self {
            job_id: Some(job.job_id.clone()),
            id: None,
            service: Some(job.service.clone()),
        }
    }

    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Human-readable key for logs and errors.
    pub fn describe(&self) -> String {
        match (&self.job_id, self.id) {
            (Some(job_id), _) => job_id.to_string(),
            (None, Some(id)) => format!("#{id}"),
            (None, None) => "<unspecified>".to_string(),
        }
    }
}

/// Body of `POST /api/research-jobs/answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub service: String,
    pub job_id: JobId,
    pub answers: Vec<String>,
}

/// Body of `PATCH /api/research-jobs/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateJobRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl UpdateJobRequest {
    pub fn cancel() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            visibility: None,
        }
    }

    pub fn visibility(visibility: Visibility) -> Self {
        Self {
            status: None,
            visibility: Some(visibility),
        }
    }
}

/// Follow-up questions awaiting the user's answers.
///
/// `answers` always has one entry per question, seeded empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ClarificationRound {
    job: ResearchJob,
    questions: Vec<String>,
    answers: Vec<String>,
}

impl ClarificationRound {
    pub fn new(job: ResearchJob, questions: Vec<String>) -> Self {
        let answers = vec![String::new(); questions.len()];
        Self {
            job,
            questions,
            answers,
        }
    }

    pub fn job(&self) -> &ResearchJob {
        &self.job
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    /// Set the answer to question `index`.
    pub fn set_answer(&mut self, index: usize, answer: impl Into<String>) -> DrkrResult<()> {
        let count = self.questions.len();
        let slot = self.answers.get_mut(index).ok_or_else(|| {
            DrkrError::Validation(format!("question {index} out of range ({count} questions)"))
        })?;
        *slot = answer.into();
        Ok(())
    }

    /// Replace all answers at once; the count must match the questions.
    pub fn with_answers<S: Into<String>>(
        mut self,
        answers: impl IntoIterator<Item = S>,
    ) -> DrkrResult<Self> {
        let answers: Vec<String> = answers.into_iter().map(Into::into).collect();
        if answers.len() != self.questions.len() {
            return Err(DrkrError::Validation(format!(
                "expected {} answers, got {}",
                self.questions.len(),
                answers.len()
            )));
        }
        self.answers = answers;
        Ok(self)
    }

    /// Indices of questions still lacking a non-blank answer.
    pub fn unanswered(&self) -> Vec<usize> {
        self.answers
            .iter()
            .enumerate()
            .filter(|(_, answer)| answer.trim().is_empty())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.answers.len() == self.questions.len() && self.unanswered().is_empty()
    }

    /// Validate the round and build the answer body.
    pub fn to_answer_request(&self) -> DrkrResult<AnswerRequest> {
        if self.answers.len() != self.questions.len() {
            return Err(DrkrError::Validation(format!(
                "expected {} answers, got {}",
                self.questions.len(),
                self.answers.len()
            )));
        }
        let blank = self.unanswered();
        if !blank.is_empty() {
            let numbers: Vec<String> = blank.iter().map(|i| (i + 1).to_string()).collect();
            return Err(DrkrError::Validation(format!(
                "question(s) {} still need an answer",
                numbers.join(", ")
            )));
        }
        Ok(AnswerRequest {
            service: self.job.service.clone(),
            job_id: self.job.job_id.clone(),
            answers: self.answers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> ResearchJob {
        serde_json::from_value(json!({
            "id": 2,
            "job_id": "J2",
            "status": "pending_answers",
            "service": "s1",
            "model_name": "m1",
            "prompt": "hello"
        }))
        .unwrap()
    }

    #[test]
    fn test_coerce_param_value() {
        assert_eq!(coerce_param_value(" 42 "), json!(42));
        assert_eq!(coerce_param_value("0.7"), json!(0.7));
        assert_eq!(coerce_param_value("TRUE"), json!(true));
        assert_eq!(coerce_param_value("false"), json!(false));
        assert_eq!(coerce_param_value("Null"), Value::Null);
        assert_eq!(coerce_param_value(r#"{"depth": 2}"#), json!({"depth": 2}));
        assert_eq!(coerce_param_value("[1, 2]"), json!([1, 2]));
        assert_eq!(coerce_param_value("concise"), json!("concise"));
        assert_eq!(coerce_param_value(""), json!(""));
        assert_eq!(coerce_param_value("NaN"), json!("NaN"));
    }

    #[test]
    fn test_param_pairs_skip_blank_keys() {
        let request = JobRequest::new("s1", "m1", "hello").with_param_pairs([
            ("temperature", "0.2"),
            ("  ", "ignored"),
            (" max_depth ", "3"),
        ]);
        let params = request.model_params.unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["max_depth"], json!(3));
    }

    #[test]
    fn test_empty_pairs_leave_params_unset() {
        let request = JobRequest::new("s1", "m1", "hello").with_param_pairs([("", "")]);
        assert!(request.model_params.is_none());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, json!({"service": "s1", "model": "m1", "prompt": "hello"}));
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        assert!(JobRequest::new("s1", "m1", "hello").validate().is_ok());
        let err = JobRequest::new("s1", " ", "").validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: missing required field(s): model, prompt");
    }

    #[test]
    fn test_create_response_questions() {
        let body = json!({"job": serde_json::to_value(job()).unwrap(), "questions": null});
        let response: CreateJobResponse = serde_json::from_value(body).unwrap();
        assert!(response.pending_questions().is_none());

        let body = json!({"job": serde_json::to_value(job()).unwrap(), "questions": []});
        let response: CreateJobResponse = serde_json::from_value(body).unwrap();
        assert!(response.pending_questions().is_none());

        let body = json!({"job": serde_json::to_value(job()).unwrap(), "questions": ["Q1?"]});
        let response: CreateJobResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.pending_questions().unwrap(), ["Q1?".to_string()]);
    }

    #[test]
    fn test_get_request_body() {
        let body = serde_json::to_value(GetJobRequest::for_job(&job())).unwrap();
        assert_eq!(body, json!({"job_id": "J2", "service": "s1"}));
        assert_eq!(serde_json::to_value(GetJobRequest::by_id(9)).unwrap(), json!({"id": 9}));
    }

    #[test]
    fn test_cancel_update_body() {
        let body = serde_json::to_value(UpdateJobRequest::cancel()).unwrap();
        assert_eq!(body, json!({"status": "cancelled"}));
    }

    #[test]
    fn test_round_rejects_blank_answers() {
        let mut round = ClarificationRound::new(job(), vec!["Q1?".into(), "Q2?".into()]);
        assert_eq!(round.answers(), ["", ""]);
        assert!(!round.is_complete());
        assert!(round.to_answer_request().unwrap_err().is_validation());

        round.set_answer(0, "a").unwrap();
        round.set_answer(1, "   ").unwrap();
        assert_eq!(round.unanswered(), vec![1]);
        assert!(round.set_answer(2, "c").is_err());

        round.set_answer(1, "b").unwrap();
        let request = round.to_answer_request().unwrap();
        assert_eq!(request.job_id, JobId::from("J2"));
        assert_eq!(request.service, "s1");
        assert_eq!(request.answers, vec!["a", "b"]);
    }

    #[test]
    fn test_round_answer_count_must_match() {
        let round = ClarificationRound::new(job(), vec!["Q1?".into(), "Q2?".into()]);
        assert!(round.clone().with_answers(["only one"]).is_err());
        assert!(round.with_answers(["a", "b"]).unwrap().is_complete());
    }
}
