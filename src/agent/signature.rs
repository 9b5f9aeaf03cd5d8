//! Structured prompts
//!
//! A [`Signature`] names the input fields a model call receives and the output
//! fields it must answer with. Sections are delimited with `[[ ## name ## ]]`
//! markers on both sides of the exchange.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{AgentError, AgentResult, LLMProvider};

const COMPLETED_MARKER: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub desc: &'static str,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, desc: &'static str) -> Self {
        Self { name, desc, required: true }
    }

    pub const fn optional(name: &'static str, desc: &'static str) -> Self {
        Self { name, desc, required: false }
    }
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub name: &'static str,
    pub instructions: String,
    pub inputs: Vec<FieldSpec>,
    pub outputs: Vec<FieldSpec>,
}

/// Output fields parsed from a model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, String>);

impl Fields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> AgentResult<&str> {
        self.get(name).ok_or_else(|| AgentError::MissingField(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_string(), value.trim().to_string());
    }
}

fn marker(name: &str) -> String {
    format!("[[ ## {} ## ]]", name)
}

impl Signature {
    pub fn new(name: &'static str, instructions: impl Into<String>) -> Self {
        Self {
            name,
            instructions: instructions.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, field: FieldSpec) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn output(mut self, field: FieldSpec) -> Self {
        self.outputs.push(field);
        self
    }

    /// Returns `(system, prompt)` for the given input values.
    pub fn render(&self, values: &[(&str, &str)]) -> (String, String) {
        let describe = |fields: &[FieldSpec]| {
            fields
                .iter()
                .enumerate()
                .map(|(i, f)| format!("{}. `{}`: {}", i + 1, f.name, f.desc))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let layout = self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .map(|f| format!("{}\n{{{}}}", marker(f.name), f.name))
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = format!(
            "Your input fields are:\n{}\n\nYour output fields are:\n{}\n\n\
             All interactions will be structured in the following way, with the appropriate values filled in.\n\n\
             {}\n\n{}\n\nIn adhering to this structure, your objective is: {}",
            describe(&self.inputs),
            describe(&self.outputs),
            layout,
            marker(COMPLETED_MARKER),
            self.instructions.trim(),
        );

        let mut prompt = String::new();
        for field in &self.inputs {
            let value = values
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, v)| *v)
                .unwrap_or("");
            prompt.push_str(&marker(field.name));
            prompt.push('\n');
            prompt.push_str(value.trim());
            prompt.push_str("\n\n");
        }

        let order = self
            .outputs
            .iter()
            .map(|f| format!("`{}`", marker(f.name)))
            .collect::<Vec<_>>()
            .join(", then ");
        prompt.push_str(&format!(
            "Respond with the corresponding output fields, starting with {}, and then ending with the marker for `{}`.",
            order,
            marker(COMPLETED_MARKER)
        ));

        (system, prompt)
    }

    /// Extracts output fields from a reply.
    ///
    /// Marker sections win; `name:` line labels are accepted next; a lone
    /// output field takes the whole reply.
    pub fn parse(&self, reply: &str) -> AgentResult<Fields> {
        let mut fields = self.parse_markers(reply)?;
        if fields.is_empty() {
            fields = self.parse_labels(reply)?;
        }
        if fields.is_empty() && self.outputs.len() == 1 && !reply.trim().is_empty() {
            fields.insert(self.outputs[0].name, reply);
        }

        for field in self.outputs.iter().filter(|f| f.required) {
            if fields.get(field.name).map_or(true, |v| v.is_empty()) {
                debug!("{} reply missing '{}'", self.name, field.name);
                return Err(AgentError::MissingField(field.name.to_string()));
            }
        }
        Ok(fields)
    }

    fn is_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|f| f.name == name)
    }

    fn parse_markers(&self, reply: &str) -> AgentResult<Fields> {
        let re = Regex::new(r"\[\[\s*##\s*([A-Za-z_][A-Za-z0-9_]*)\s*##\s*\]\]")?;
        let hits: Vec<_> = re
            .captures_iter(reply)
            .filter_map(|c| Some((c.get(0)?, c.get(1)?.as_str().to_string())))
            .collect();

        let mut fields = Fields::default();
        for (i, (whole, name)) in hits.iter().enumerate() {
            let end = hits.get(i + 1).map_or(reply.len(), |(next, _)| next.start());
            if self.is_output(name) && fields.get(name).is_none() {
                fields.insert(name, &reply[whole.end()..end]);
            }
        }
        Ok(fields)
    }

    fn parse_labels(&self, reply: &str) -> AgentResult<Fields> {
        let names = self
            .outputs
            .iter()
            .map(|f| regex::escape(f.name))
            .collect::<Vec<_>>()
            .join("|");
        let re = Regex::new(&format!(r"(?im)^[\s*#]*({})[\s*]*:[ \t]*", names))?;
        let hits: Vec<_> = re
            .captures_iter(reply)
            .filter_map(|c| Some((c.get(0)?, c.get(1)?.as_str().to_lowercase())))
            .collect();

        let mut fields = Fields::default();
        for (i, (whole, name)) in hits.iter().enumerate() {
            let end = hits.get(i + 1).map_or(reply.len(), |(next, _)| next.start());
            if fields.get(name).is_none() {
                fields.insert(name, &reply[whole.end()..end]);
            }
        }
        Ok(fields)
    }
}

/// A provider bound to a model name.
#[derive(Clone)]
pub struct LanguageModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl LanguageModel {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            provider: self.provider.clone(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs one structured call and parses its output fields.
    pub async fn complete(&self, signature: &Signature, values: &[(&str, &str)]) -> AgentResult<Fields> {
        let (system, prompt) = signature.render(values);
        let reply = self.provider.generate(&self.model, prompt, Some(system)).await?;
        signature.parse(&reply)
    }

    /// Free-form call without field parsing.
    pub async fn chat(&self, prompt: String, system: Option<String>) -> AgentResult<String> {
        Ok(self.provider.generate(&self.model, prompt, system).await?)
    }
}
