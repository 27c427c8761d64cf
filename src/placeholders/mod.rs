// ============================================================================
// Placeholder Resolution
// ============================================================================
//
// Templates contain `{{ prefix:name }}` expressions which are resolved
// against a context derived from the originating signal. An expression may
// pipe its value through functions: `{{ thing:name | fn:upper() }}`.
//
// Supported prefixes: thing (id, namespace, name), entity (id), feature
// (id), header (any mapped header), topic (full, channel, subject).
//
// ============================================================================

pub mod functions;

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::model::ExternalMessage;
use crate::signal::MessageCommand;
use std::collections::HashMap;

/// Resolution context built from the originating signal and its external
/// message representation.
#[derive(Debug, Clone)]
pub struct PlaceholderContext {
    thing_id: String,
    thing_namespace: String,
    thing_name: String,
    feature_id: Option<String>,
    topic_full: String,
    topic_subject: String,
    headers: HashMap<String, String>,
}

impl PlaceholderContext {
    pub fn from_signal(command: &MessageCommand, external_message: &ExternalMessage) -> Self {
        // External message headers win over signal headers on collision;
        // they already went through the mapping chain.
        let mut headers = command.headers.clone();
        for (key, value) in external_message.headers() {
            headers.insert(key.clone(), value.clone());
        }
        if let Some(correlation_id) = &command.correlation_id {
            headers
                .entry("correlation-id".to_string())
                .or_insert_with(|| correlation_id.clone());
        }

        let topic_full = format!(
            "{}/{}/things/live/messages/{}",
            command.thing_id.namespace(),
            command.thing_id.name(),
            command.subject
        );

        Self {
            thing_id: command.thing_id.to_string(),
            thing_namespace: command.thing_id.namespace().to_string(),
            thing_name: command.thing_id.name().to_string(),
            feature_id: command.feature_id.clone(),
            topic_full,
            topic_subject: command.subject.clone(),
            headers,
        }
    }

    fn lookup(&self, prefix: &str, name: &str) -> ConnectivityResult<Option<String>> {
        let value = match (prefix, name) {
            ("thing", "id") | ("entity", "id") => Some(self.thing_id.clone()),
            ("thing", "namespace") => Some(self.thing_namespace.clone()),
            ("thing", "name") => Some(self.thing_name.clone()),
            ("feature", "id") => self.feature_id.clone(),
            ("header", header_name) => self
                .headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(header_name))
                .map(|(_, value)| value.clone()),
            ("topic", "full") => Some(self.topic_full.clone()),
            ("topic", "channel") => Some("live".to_string()),
            ("topic", "subject") => Some(self.topic_subject.clone()),
            ("thing" | "entity" | "feature" | "topic", _) => {
                return Err(ConnectivityError::unresolved(format!(
                    "The placeholder <{}:{}> is unknown",
                    prefix, name
                )));
            }
            _ => {
                return Err(ConnectivityError::unresolved(format!(
                    "The placeholder prefix <{}> is unknown",
                    prefix
                )));
            }
        };
        Ok(value)
    }
}

/// Substitute every `{{ ... }}` expression in the template.
///
/// Unresolvable expressions yield `PlaceholderUnresolved`; unbalanced braces
/// yield `ConnectionConfigurationInvalid`.
pub fn resolve(template: &str, context: &PlaceholderContext) -> ConnectivityResult<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| {
            ConnectivityError::config_invalid(format!(
                "Unbalanced placeholder braces in <{}>",
                template
            ))
        })?;
        let expression = &after_open[..end];
        output.push_str(&resolve_expression(expression, context)?);
        rest = &after_open[end + 2..];
    }
    if rest.contains("}}") {
        return Err(ConnectivityError::config_invalid(format!(
            "Unbalanced placeholder braces in <{}>",
            template
        )));
    }
    output.push_str(rest);
    Ok(output)
}

/// Check template syntax without resolving, for accept-connection time
/// validation.
pub fn validate_template(template: &str) -> ConnectivityResult<()> {
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| {
            ConnectivityError::config_invalid(format!(
                "Unbalanced placeholder braces in <{}>",
                template
            ))
        })?;
        let expression = &after_open[..end];
        let first_stage = expression.split('|').next().unwrap_or_default().trim();
        if first_stage.split_once(':').is_none() {
            return Err(ConnectivityError::config_invalid(format!(
                "The placeholder expression <{}> is missing a prefix",
                expression.trim()
            )));
        }
        rest = &after_open[end + 2..];
    }
    if rest.contains("}}") {
        return Err(ConnectivityError::config_invalid(format!(
            "Unbalanced placeholder braces in <{}>",
            template
        )));
    }
    Ok(())
}

fn resolve_expression(
    expression: &str,
    context: &PlaceholderContext,
) -> ConnectivityResult<String> {
    let mut stages = expression.split('|');

    let first = stages.next().unwrap_or_default().trim();
    let (prefix, name) = first.split_once(':').ok_or_else(|| {
        ConnectivityError::unresolved(format!(
            "The placeholder expression <{}> is missing a prefix",
            first
        ))
    })?;
    let mut value = context.lookup(prefix.trim(), name.trim())?;

    for stage in stages {
        value = functions::apply(stage.trim(), value)?;
    }

    value.ok_or_else(|| {
        ConnectivityError::unresolved(format!(
            "The placeholder <{}> could not be resolved",
            expression.trim()
        ))
    })
}
