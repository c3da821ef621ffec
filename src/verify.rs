use regex::Regex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::{
    assertion::{ChatAssertion, Expectation, JsonOutcome, TextComparison},
    error::AssertError,
    functions::ToolCall,
    types::{ChatMessage, CompletionRequest},
};

impl ChatAssertion {
    /// Runs the conversation and verifies every registered expectation
    /// against each response, failing on the first violation.
    ///
    /// The configuration is not consumed or cleared: calling `assert` again
    /// replays the same conversation.
    pub async fn assert(&self) -> Result<(), AssertError> {
        self.run(None).await
    }

    /// Like [`assert`](ChatAssertion::assert), aborting with
    /// [`AssertError::Cancelled`] at the next transport suspension point
    /// once `cancel` is triggered.
    pub async fn assert_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), AssertError> {
        self.run(Some(cancel)).await
    }

    async fn run(&self, cancel: Option<&CancellationToken>) -> Result<(), AssertError> {
        if self.prompts.is_empty() {
            return Err(AssertError::NoPrompts);
        }

        let mut transcript = Vec::new();
        if let Some(instruction) = &self.instruction {
            transcript.push(ChatMessage::system(instruction.clone()));
        }

        for (index, prompt) in self.prompts.iter().enumerate() {
            transcript.push(ChatMessage::user(prompt.clone()));

            let request = CompletionRequest::new(self.model.clone(), transcript.clone())
                .with_tools(self.tools.iter().cloned());

            tracing::debug!(
                provider = self.provider.name(),
                turn = index + 1,
                messages = request.messages.len(),
                "dispatching turn"
            );

            let response = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(AssertError::Cancelled),
                    result = self.provider.complete(request) => result?,
                },
                None => self.provider.complete(request).await?,
            };

            let message = response.message;
            let text = message.text().unwrap_or_default().to_string();
            if text.trim().is_empty() && message.tool_calls.is_empty() {
                return Err(AssertError::EmptyResponse);
            }

            tracing::debug!(
                turn = index + 1,
                chars = text.len(),
                tool_calls = message.tool_calls.len(),
                "evaluating response"
            );

            verify_response(&self.expectations, &text, &message.tool_calls)?;
            transcript.push(message);
        }

        Ok(())
    }
}

/// Evaluates all expectations against one response, category by category in
/// fixed order. Each category aggregates its own violations into a single
/// diagnostic; the first failing category ends the sweep.
fn verify_response(
    expectations: &[Expectation],
    text: &str,
    calls: &[ToolCall],
) -> Result<(), AssertError> {
    check_contains(expectations, text)?;
    check_not_contains(expectations, text)?;
    check_matches(expectations, text)?;
    check_contains_all(expectations, text)?;
    check_contains_any(expectations, text)?;
    check_equals(expectations, text)?;
    check_or_groups(expectations, text)?;
    check_function_calls(expectations, calls)?;
    check_json(expectations, text)?;
    Ok(())
}

fn contains_ci(lowered_haystack: &str, needle: &str) -> bool {
    lowered_haystack.contains(&needle.to_lowercase())
}

fn category_verdict(
    failures: Vec<String>,
    text: &str,
) -> Result<(), AssertError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(AssertError::Expectation {
            detail: failures.join(", "),
            response: text.to_string(),
        })
    }
}

fn check_contains(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    let lowered = text.to_lowercase();
    let mut failures = Vec::new();
    for expectation in expectations {
        if let Expectation::Contains(needle) = expectation {
            if !contains_ci(&lowered, needle) {
                failures.push(format!("must contain \"{needle}\""));
            }
        }
    }
    category_verdict(failures, text)
}

fn check_not_contains(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    let lowered = text.to_lowercase();
    let mut failures = Vec::new();
    for expectation in expectations {
        match expectation {
            Expectation::NotContains(needle) => {
                if contains_ci(&lowered, needle) {
                    failures.push(format!("must not contain \"{needle}\""));
                }
            }
            Expectation::NotContainsAny(needles) => {
                for needle in needles {
                    if contains_ci(&lowered, needle) {
                        failures.push(format!("must not contain \"{needle}\""));
                    }
                }
            }
            _ => {}
        }
    }
    category_verdict(failures, text)
}

fn check_matches(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    let mut failures = Vec::new();
    for expectation in expectations {
        if let Expectation::Matches(pattern) = expectation {
            let regex = Regex::new(pattern).map_err(|source| AssertError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            if !regex.is_match(text) {
                failures.push(format!("must match /{pattern}/"));
            }
        }
    }
    category_verdict(failures, text)
}

fn check_contains_all(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    let lowered = text.to_lowercase();
    let mut failures = Vec::new();
    for expectation in expectations {
        if let Expectation::ContainsAll(needles) = expectation {
            for needle in needles {
                if !contains_ci(&lowered, needle) {
                    failures.push(format!("must contain \"{needle}\""));
                }
            }
        }
    }
    category_verdict(failures, text)
}

fn check_contains_any(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    let lowered = text.to_lowercase();
    let mut failures = Vec::new();
    for expectation in expectations {
        if let Expectation::ContainsAny(needles) = expectation {
            if !needles.iter().any(|needle| contains_ci(&lowered, needle)) {
                failures.push(format!(
                    "must contain at least one of [{}]",
                    quoted_list(needles)
                ));
            }
        }
    }
    category_verdict(failures, text)
}

fn check_equals(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    let mut failures = Vec::new();
    for expectation in expectations {
        if let Expectation::Equals(target, comparison) = expectation {
            let equal = match comparison {
                TextComparison::CaseInsensitive => text.to_lowercase() == target.to_lowercase(),
                TextComparison::CaseSensitive => text == target,
            };
            if !equal {
                failures.push(format!("must equal \"{target}\""));
            }
        }
    }
    category_verdict(failures, text)
}

fn check_or_groups(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    let lowered = text.to_lowercase();
    let mut failures = Vec::new();
    for expectation in expectations {
        if let Expectation::OrGroup(alternatives) = expectation {
            if !alternatives
                .iter()
                .any(|alternative| contains_ci(&lowered, alternative))
            {
                failures.push(format!(
                    "must contain one of [{}]",
                    quoted_list(alternatives)
                ));
            }
        }
    }
    category_verdict(failures, text)
}

/// Order-independent, multiplicity-sensitive reconciliation: each expected
/// call consumes one matching invocation from the pool, so registering the
/// same expectation twice requires two distinct invocations.
fn check_function_calls(expectations: &[Expectation], calls: &[ToolCall]) -> Result<(), AssertError> {
    let mut pool: Vec<&ToolCall> = calls.iter().collect();

    for expectation in expectations {
        let Expectation::FunctionCall { name, parameters } = expectation else {
            continue;
        };

        let position = pool.iter().position(|call| {
            call.function.name == *name
                && parameters
                    .as_ref()
                    .map_or(true, |expected| parameters_match(expected, &call.function.arguments))
        });

        match position {
            Some(index) => {
                pool.remove(index);
            }
            None => {
                return Err(AssertError::FunctionCalls {
                    expected: describe_expected_call(name, parameters.as_ref()),
                    actual: describe_actual_calls(calls),
                });
            }
        }
    }

    Ok(())
}

/// Superset match: every expected key must be present with an equal value;
/// extra actual keys are ignored. An expected null also accepts an absent
/// key.
fn parameters_match(expected: &Map<String, Value>, actual_arguments: &Value) -> bool {
    let Some(actual) = actual_arguments.as_object() else {
        return expected.is_empty();
    };

    expected.iter().all(|(key, want)| match actual.get(key) {
        Some(got) => values_equal(want, got),
        None => want.is_null(),
    })
}

fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => expected == actual,
    }
}

fn check_json(expectations: &[Expectation], text: &str) -> Result<(), AssertError> {
    for expectation in expectations {
        let Expectation::Json(json) = expectation else {
            continue;
        };
        match (json.check)(text) {
            JsonOutcome::Ok => {}
            JsonOutcome::Parse(source) => {
                return Err(AssertError::JsonParse {
                    shape: json.shape,
                    source,
                    response: text.to_string(),
                })
            }
            JsonOutcome::Null => {
                return Err(AssertError::JsonNull {
                    shape: json.shape,
                    response: text.to_string(),
                })
            }
            JsonOutcome::Validation => {
                return Err(AssertError::JsonValidation {
                    shape: json.shape,
                    response: text.to_string(),
                })
            }
        }
    }
    Ok(())
}

fn quoted_list(texts: &[String]) -> String {
    texts
        .iter()
        .map(|text| format!("\"{text}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_expected_call(name: &str, parameters: Option<&Map<String, Value>>) -> String {
    match parameters {
        Some(parameters) => format!(
            "{name}({})",
            serde_json::to_string(parameters).unwrap_or_default()
        ),
        None => format!("{name}(..)"),
    }
}

fn describe_actual_calls(calls: &[ToolCall]) -> String {
    if calls.is_empty() {
        return "none were made".to_string();
    }
    calls
        .iter()
        .map(|call| {
            format!(
                "{}({})",
                call.function.name,
                serde_json::to_string(&call.function.arguments).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
