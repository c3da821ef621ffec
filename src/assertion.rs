use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{
    error::AssertError,
    files,
    functions::Tool,
    providers::ModelProvider,
};

/// How [`ChatAssertion::expect_equals_with`] compares the response against
/// the target text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextComparison {
    #[default]
    CaseInsensitive,
    CaseSensitive,
}

/// One registered check, evaluated against each assistant response.
#[derive(Clone)]
pub(crate) enum Expectation {
    Contains(String),
    NotContains(String),
    NotContainsAny(Vec<String>),
    Matches(String),
    ContainsAll(Vec<String>),
    ContainsAny(Vec<String>),
    Equals(String, TextComparison),
    OrGroup(Vec<String>),
    FunctionCall {
        name: String,
        parameters: Option<Map<String, Value>>,
    },
    Json(JsonExpectation),
}

/// A type-erased JSON shape check: the target type is captured inside the
/// closure at registration, only its name survives for diagnostics.
#[derive(Clone)]
pub(crate) struct JsonExpectation {
    pub(crate) shape: &'static str,
    pub(crate) check: Arc<dyn Fn(&str) -> JsonOutcome + Send + Sync>,
}

pub(crate) enum JsonOutcome {
    Ok,
    Parse(serde_json::Error),
    Null,
    Validation,
}

/// Tracks what `expect_contains_alternative` may attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlternativeState {
    /// Nothing to make an alternative of yet.
    Empty,
    /// The most recent contains-expectation can still be turned into the
    /// seed of a new OR group.
    PendingAnd,
    /// An OR group is open; further alternatives extend it.
    InOrGroup,
}

/// Fluent assertion runner for chat-model conversations.
///
/// Configure prompts, an optional system instruction, and a set of
/// expectations, then call [`assert`](ChatAssertion::assert): each prompt is
/// sent in turn to the provider and every registered expectation is checked
/// against each response. Configuration calls validate eagerly and fail
/// immediately on bad input, so a misconfigured test never reaches the
/// model.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use pruefwerk::{ChatAssertion, ScriptedProvider};
/// # async fn demo() -> Result<(), pruefwerk::AssertError> {
/// let provider = Arc::new(ScriptedProvider::from_texts(["Paris is the capital."]));
///
/// let mut assertion = ChatAssertion::new(provider, "gpt-4o-mini");
/// assertion
///     .with_instruction("Answer in one sentence.")?
///     .add_prompt("What is the capital of France?")?
///     .expect_contains("capital")?
///     .expect_contains_alternative("Paris")?;
/// assertion.assert().await
/// # }
/// ```
pub struct ChatAssertion {
    pub(crate) provider: Arc<dyn ModelProvider>,
    pub(crate) model: String,
    pub(crate) instruction: Option<String>,
    pub(crate) prompts: Vec<String>,
    pub(crate) expectations: Vec<Expectation>,
    pub(crate) tools: Vec<Tool>,
    alternative_state: AlternativeState,
}

impl fmt::Debug for ChatAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatAssertion")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("has_instruction", &self.instruction.is_some())
            .field("prompts", &self.prompts.len())
            .field("expectations", &self.expectations.len())
            .finish()
    }
}

impl ChatAssertion {
    /// Creates an assertion bound to an already-constructed provider.
    /// Credential handling stays with the caller.
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            instruction: None,
            prompts: Vec::new(),
            expectations: Vec::new(),
            tools: Vec::new(),
            alternative_state: AlternativeState::Empty,
        }
    }

    /// Sets the system instruction rendered as the first turn.
    pub fn with_instruction(&mut self, text: impl Into<String>) -> Result<&mut Self, AssertError> {
        let text = text.into();
        require_text(&text, "instruction")?;
        self.instruction = Some(text);
        Ok(self)
    }

    pub fn with_instruction_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<&mut Self, AssertError> {
        let content = files::load_text(path)?;
        self.with_instruction(content)
    }

    /// Appends one user prompt; prompts are sent in registration order.
    pub fn add_prompt(&mut self, text: impl Into<String>) -> Result<&mut Self, AssertError> {
        let text = text.into();
        require_text(&text, "prompt")?;
        self.prompts.push(text);
        Ok(self)
    }

    pub fn add_prompt_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, AssertError> {
        let content = files::load_text(path)?;
        self.add_prompt(content)
    }

    /// Appends several prompts atomically: every element is validated
    /// before any is appended.
    pub fn add_prompts<I, S>(&mut self, prompts: I) -> Result<&mut Self, AssertError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prompts: Vec<String> = prompts.into_iter().map(Into::into).collect();
        if prompts.is_empty() {
            return Err(AssertError::Configuration(
                "prompt list must not be empty".to_string(),
            ));
        }
        for prompt in &prompts {
            require_text(prompt, "prompt")?;
        }
        self.prompts.extend(prompts);
        Ok(self)
    }

    /// Requires the response to contain `text` (case-insensitive). Several
    /// calls accumulate AND-style: all must be present.
    pub fn expect_contains(&mut self, text: impl Into<String>) -> Result<&mut Self, AssertError> {
        let text = text.into();
        require_text(&text, "expected text")?;
        self.expectations.push(Expectation::Contains(text));
        self.alternative_state = AlternativeState::PendingAnd;
        Ok(self)
    }

    /// Turns the most recent [`expect_contains`](ChatAssertion::expect_contains)
    /// into an OR group, or extends the group already being built.
    ///
    /// `expect_contains("capital")` followed by
    /// `expect_contains_alternative("Paris")` means "must contain capital OR
    /// Paris". Calling this with no prior contains-expectation is a usage
    /// error: there is nothing to make an alternative of.
    pub fn expect_contains_alternative(
        &mut self,
        text: impl Into<String>,
    ) -> Result<&mut Self, AssertError> {
        let text = text.into();
        require_text(&text, "alternative text")?;

        match self.alternative_state {
            AlternativeState::Empty => Err(AssertError::OrphanAlternative),
            AlternativeState::PendingAnd => {
                let index = self
                    .expectations
                    .iter()
                    .rposition(|expectation| matches!(expectation, Expectation::Contains(_)))
                    .ok_or(AssertError::OrphanAlternative)?;
                let Expectation::Contains(seed) = self.expectations.remove(index) else {
                    unreachable!("rposition matched a contains expectation");
                };
                self.expectations.push(Expectation::OrGroup(vec![seed, text]));
                self.alternative_state = AlternativeState::InOrGroup;
                Ok(self)
            }
            AlternativeState::InOrGroup => {
                let group = self
                    .expectations
                    .iter_mut()
                    .rev()
                    .find_map(|expectation| match expectation {
                        Expectation::OrGroup(alternatives) => Some(alternatives),
                        _ => None,
                    })
                    .ok_or(AssertError::OrphanAlternative)?;
                group.push(text);
                Ok(self)
            }
        }
    }

    /// Requires the response to not contain `text` (case-insensitive).
    pub fn expect_not_contains(
        &mut self,
        text: impl Into<String>,
    ) -> Result<&mut Self, AssertError> {
        let text = text.into();
        require_text(&text, "forbidden text")?;
        self.expectations.push(Expectation::NotContains(text));
        Ok(self)
    }

    pub fn expect_not_contains_any<I, S>(&mut self, texts: I) -> Result<&mut Self, AssertError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let texts = collect_texts(texts, "forbidden texts")?;
        self.expectations.push(Expectation::NotContainsAny(texts));
        Ok(self)
    }

    /// Requires the response to match `pattern`. The pattern is compiled at
    /// evaluation time; a malformed pattern fails the run with a diagnostic
    /// naming it.
    pub fn expect_matches(&mut self, pattern: impl Into<String>) -> Result<&mut Self, AssertError> {
        let pattern = pattern.into();
        require_text(&pattern, "pattern")?;
        self.expectations.push(Expectation::Matches(pattern));
        Ok(self)
    }

    pub fn expect_contains_all<I, S>(&mut self, texts: I) -> Result<&mut Self, AssertError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let texts = collect_texts(texts, "expected texts")?;
        self.expectations.push(Expectation::ContainsAll(texts));
        Ok(self)
    }

    /// Requires at least one of `texts` to appear in the response.
    pub fn expect_contains_any<I, S>(&mut self, texts: I) -> Result<&mut Self, AssertError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let texts = collect_texts(texts, "expected texts")?;
        self.expectations.push(Expectation::ContainsAny(texts));
        Ok(self)
    }

    /// Requires the whole response to equal `text`, case-insensitively. An
    /// empty string is a legal target.
    pub fn expect_equals(&mut self, text: impl Into<String>) -> Result<&mut Self, AssertError> {
        self.expect_equals_with(text, TextComparison::default())
    }

    pub fn expect_equals_with(
        &mut self,
        text: impl Into<String>,
        comparison: TextComparison,
    ) -> Result<&mut Self, AssertError> {
        self.expectations
            .push(Expectation::Equals(text.into(), comparison));
        Ok(self)
    }

    /// Requires the response to invoke the named function. Registering the
    /// same expectation twice requires two distinct invocations.
    pub fn expect_function_call(
        &mut self,
        name: impl Into<String>,
    ) -> Result<&mut Self, AssertError> {
        let name = name.into();
        require_text(&name, "function name")?;
        self.expectations.push(Expectation::FunctionCall {
            name,
            parameters: None,
        });
        Ok(self)
    }

    /// Requires an invocation of `name` whose arguments contain every
    /// expected key with an equal value (string values compare
    /// case-insensitively; extra actual keys are ignored). An empty object
    /// matches any invocation of that name.
    pub fn expect_function_call_with(
        &mut self,
        name: impl Into<String>,
        parameters: Value,
    ) -> Result<&mut Self, AssertError> {
        let name = name.into();
        require_text(&name, "function name")?;
        let Value::Object(parameters) = parameters else {
            return Err(AssertError::Configuration(
                "function call parameters must be a JSON object".to_string(),
            ));
        };
        self.expectations.push(Expectation::FunctionCall {
            name,
            parameters: Some(parameters),
        });
        Ok(self)
    }

    /// Requires the response text to parse as JSON into `T`.
    pub fn expect_json<T>(&mut self) -> Result<&mut Self, AssertError>
    where
        T: DeserializeOwned + 'static,
    {
        self.push_json_expectation::<T, fn(&T) -> bool>(None);
        Ok(self)
    }

    /// Like [`expect_json`](ChatAssertion::expect_json), additionally
    /// requiring the parsed value to satisfy `validator`.
    pub fn expect_json_with<T, F>(&mut self, validator: F) -> Result<&mut Self, AssertError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.push_json_expectation(Some(validator));
        Ok(self)
    }

    fn push_json_expectation<T, F>(&mut self, validator: Option<F>)
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let check = Arc::new(move |text: &str| {
            let value: Value = match serde_json::from_str(text) {
                Ok(value) => value,
                Err(error) => return JsonOutcome::Parse(error),
            };
            if value.is_null() {
                return JsonOutcome::Null;
            }
            let parsed: T = match serde_json::from_value(value) {
                Ok(parsed) => parsed,
                Err(error) => return JsonOutcome::Parse(error),
            };
            match &validator {
                Some(validator) if !validator(&parsed) => JsonOutcome::Validation,
                _ => JsonOutcome::Ok,
            }
        });

        self.expectations.push(Expectation::Json(JsonExpectation {
            shape: std::any::type_name::<T>(),
            check,
        }));
    }

    /// Advertises a callable function to the model on every transport call.
    pub fn with_tool(&mut self, tool: Tool) -> &mut Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools<I>(&mut self, tools: I) -> &mut Self
    where
        I: IntoIterator<Item = Tool>,
    {
        self.tools.extend(tools);
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }

    pub fn expectation_count(&self) -> usize {
        self.expectations.len()
    }
}

fn require_text(value: &str, what: &str) -> Result<(), AssertError> {
    if value.trim().is_empty() {
        return Err(AssertError::Configuration(format!(
            "{what} must not be blank"
        )));
    }
    Ok(())
}

fn collect_texts<I, S>(texts: I, what: &str) -> Result<Vec<String>, AssertError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let texts: Vec<String> = texts.into_iter().map(Into::into).collect();
    if texts.is_empty() {
        return Err(AssertError::Configuration(format!(
            "{what} must not be empty"
        )));
    }
    for text in &texts {
        require_text(text, what)?;
    }
    Ok(texts)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::providers::scripted::ScriptedProvider;

    use super::*;

    fn assertion() -> ChatAssertion {
        let provider = Arc::new(ScriptedProvider::from_texts(Vec::<String>::new()));
        ChatAssertion::new(provider, "test-model")
    }

    #[test]
    fn rejects_blank_inputs() {
        let mut assertion = assertion();

        assert!(matches!(
            assertion.with_instruction("  ").unwrap_err(),
            AssertError::Configuration(_)
        ));
        assert!(matches!(
            assertion.add_prompt("\t").unwrap_err(),
            AssertError::Configuration(_)
        ));
        assert!(matches!(
            assertion.expect_contains("").unwrap_err(),
            AssertError::Configuration(_)
        ));
        assert!(matches!(
            assertion.expect_matches(" ").unwrap_err(),
            AssertError::Configuration(_)
        ));
        assert!(matches!(
            assertion.expect_function_call("").unwrap_err(),
            AssertError::Configuration(_)
        ));
    }

    #[test]
    fn add_prompts_is_atomic() {
        let mut assertion = assertion();

        let error = assertion.add_prompts(["first", "  ", "third"]).unwrap_err();
        assert!(matches!(error, AssertError::Configuration(_)));
        assert_eq!(assertion.prompt_count(), 0);

        assertion.add_prompts(["first", "second"]).expect("valid prompts");
        assert_eq!(assertion.prompt_count(), 2);
    }

    #[test]
    fn empty_prompt_list_is_rejected() {
        let mut assertion = assertion();
        let error = assertion.add_prompts(Vec::<String>::new()).unwrap_err();
        assert!(matches!(error, AssertError::Configuration(_)));
    }

    #[test]
    fn alternative_without_contains_is_a_usage_error() {
        let mut assertion = assertion();
        let error = assertion.expect_contains_alternative("city").unwrap_err();
        assert!(matches!(error, AssertError::OrphanAlternative));
    }

    #[test]
    fn alternative_pops_the_latest_contains_into_a_group() {
        let mut assertion = assertion();
        assertion
            .expect_contains("capital")
            .unwrap()
            .expect_contains_alternative("city")
            .unwrap()
            .expect_contains_alternative("Paris")
            .unwrap();

        assert_eq!(assertion.expectation_count(), 1);
        match &assertion.expectations[0] {
            Expectation::OrGroup(alternatives) => {
                assert_eq!(alternatives, &["capital", "city", "Paris"]);
            }
            _ => panic!("expected an OR group"),
        }
    }

    #[test]
    fn contains_after_a_group_starts_a_fresh_alternative_target() {
        let mut assertion = assertion();
        assertion
            .expect_contains("a")
            .unwrap()
            .expect_contains_alternative("b")
            .unwrap()
            .expect_contains("c")
            .unwrap()
            .expect_contains_alternative("d")
            .unwrap();

        // (a OR b) and (c OR d), nothing left as a plain contains.
        let groups: Vec<_> = assertion
            .expectations
            .iter()
            .filter_map(|expectation| match expectation {
                Expectation::OrGroup(alternatives) => Some(alternatives.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(groups, vec![vec!["a", "b"], vec!["c", "d"]]);
        assert!(!assertion
            .expectations
            .iter()
            .any(|expectation| matches!(expectation, Expectation::Contains(_))));
    }

    #[test]
    fn mixed_and_and_or_expectations() {
        let mut assertion = assertion();
        assertion
            .expect_contains("a")
            .unwrap()
            .expect_contains("b")
            .unwrap()
            .expect_contains_alternative("c")
            .unwrap();

        // "a" stays an AND requirement; "b OR c" forms the group.
        assert!(assertion.expectations.iter().any(
            |expectation| matches!(expectation, Expectation::Contains(text) if text == "a")
        ));
        assert!(assertion.expectations.iter().any(|expectation| matches!(
            expectation,
            Expectation::OrGroup(alternatives) if alternatives == &["b", "c"]
        )));
    }

    #[test]
    fn collection_expectations_reject_blank_entries() {
        let mut assertion = assertion();

        assert!(assertion.expect_contains_all(["ok", " "]).is_err());
        assert!(assertion.expect_contains_any(Vec::<String>::new()).is_err());
        assert!(assertion.expect_not_contains_any(["", "x"]).is_err());
        assert_eq!(assertion.expectation_count(), 0);
    }

    #[test]
    fn empty_equals_target_is_legal() {
        let mut assertion = assertion();
        assertion.expect_equals("").expect("empty target");
        assert_eq!(assertion.expectation_count(), 1);
    }

    #[test]
    fn function_call_parameters_must_be_an_object() {
        let mut assertion = assertion();

        let error = assertion
            .expect_function_call_with("f", json!(null))
            .unwrap_err();
        assert!(matches!(error, AssertError::Configuration(_)));

        assertion
            .expect_function_call_with("f", json!({}))
            .expect("empty object is legal");
    }
}
