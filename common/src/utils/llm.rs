use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use async_openai::{
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};

use crate::{error::AppError, utils::config::AppConfig};

/// Answer returned when retrieval produced no usable context.
pub const NO_CONTEXT_ANSWER: &str =
    "I don't have enough information in the documentation to answer this question.";

const SINGLE_VERSION_SYSTEM_PROMPT: &str = "Answer the question based ONLY on the provided \
context. If the context does not contain enough information to answer the question, say \
\"I don't have enough information in the documentation to answer this question.\" Provide a \
clear, concise answer with relevant details from the context.";

const MULTI_VERSION_SYSTEM_PROMPT: &str = "Answer the question based on context drawn from \
multiple documentation versions. When relevant, indicate which version the information comes \
from. Provide a comprehensive answer that synthesizes information from all available versions. \
If information differs between versions, mention the version-specific details.";

/// Selects the synthesis prompt for single- versus multi-version answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStyle {
    SingleVersion,
    MultiVersion,
}

impl AnswerStyle {
    fn system_prompt(self) -> &'static str {
        match self {
            Self::SingleVersion => SINGLE_VERSION_SYSTEM_PROMPT,
            Self::MultiVersion => MULTI_VERSION_SYSTEM_PROMPT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Extractive,
}

impl FromStr for LlmBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "extractive" => Ok(Self::Extractive),
            other => Err(anyhow!(
                "unknown llm backend '{other}'. Expected 'openai' or 'extractive'."
            )),
        }
    }
}

/// Answer-synthesis backend, selected once at configuration-load time.
///
/// `OpenAi` talks to any OpenAI-compatible chat endpoint (the base url covers
/// hosted OpenAI, OpenRouter, or a local Ollama). `Extractive` is fully
/// offline: it returns the top retrieved passages verbatim, which keeps tests
/// hermetic and doubles as a no-LLM degraded mode.
#[derive(Clone)]
pub struct LlmProvider {
    inner: LlmInner,
}

#[derive(Clone)]
enum LlmInner {
    OpenAi {
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
    },
    Extractive {
        max_passages: usize,
    },
}

impl LlmProvider {
    pub fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<async_openai::config::OpenAIConfig>>>,
    ) -> Result<Self, AppError> {
        match LlmBackend::from_str(&config.llm_backend)? {
            LlmBackend::OpenAi => {
                let client = openai_client.ok_or_else(|| {
                    AppError::Validation("OpenAI llm backend requires a client".into())
                })?;
                Ok(Self::new_openai(client, config.llm_model.clone()))
            }
            LlmBackend::Extractive => Ok(Self::new_extractive(3)),
        }
    }

    pub fn new_openai(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
    ) -> Self {
        Self {
            inner: LlmInner::OpenAi { client, model },
        }
    }

    pub fn new_extractive(max_passages: usize) -> Self {
        Self {
            inner: LlmInner::Extractive {
                max_passages: max_passages.max(1),
            },
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            LlmInner::OpenAi { .. } => "openai",
            LlmInner::Extractive { .. } => "extractive",
        }
    }

    /// Synthesizes an answer to `question` from retrieved `context`.
    pub async fn answer(
        &self,
        question: &str,
        context: &str,
        style: AnswerStyle,
    ) -> Result<String, AppError> {
        match &self.inner {
            LlmInner::Extractive { max_passages } => {
                Ok(extractive_answer(context, *max_passages))
            }
            LlmInner::OpenAi { client, model } => {
                let user_message = format!(
                    r"
        Context Information:
        ==================
        {context}

        User Question:
        ==================
        {question}
        "
                );

                let request = CreateChatCompletionRequestArgs::default()
                    .model(model)
                    .messages([
                        ChatCompletionRequestSystemMessage::from(style.system_prompt()).into(),
                        ChatCompletionRequestUserMessage::from(user_message).into(),
                    ])
                    .temperature(0.0)
                    .build()?;

                let response = client.chat().create(request).await?;

                response
                    .choices
                    .first()
                    .and_then(|choice| choice.message.content.clone())
                    .ok_or(AppError::LLMParsing(
                        "No content found in LLM response".into(),
                    ))
            }
        }
    }

    /// Produces up to three paraphrases of `question` for multi-query
    /// retrieval. The extractive backend has nothing to paraphrase with and
    /// returns an empty list, which callers treat as "retrieve with the
    /// original question only".
    pub async fn expand_query(&self, question: &str) -> Result<Vec<String>, AppError> {
        match &self.inner {
            LlmInner::Extractive { .. } => Ok(Vec::new()),
            LlmInner::OpenAi { client, model } => {
                let prompt = format!(
                    "You are an AI language model assistant. Your task is to generate 3 \
different versions of the given user question to retrieve relevant documents from a vector \
database. By generating multiple perspectives on the user question, your goal is to help the \
user overcome some of the limitations of distance-based similarity search. Provide these \
alternative questions separated by newlines.\nOriginal question: {question}"
                );

                let request = CreateChatCompletionRequestArgs::default()
                    .model(model)
                    .messages([ChatCompletionRequestUserMessage::from(prompt).into()])
                    .temperature(0.0)
                    .build()?;

                let response = client.chat().create(request).await?;
                let content = response
                    .choices
                    .first()
                    .and_then(|choice| choice.message.content.clone())
                    .ok_or(AppError::LLMParsing(
                        "No content found in LLM response".into(),
                    ))?;

                Ok(content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && *line != question)
                    .map(ToOwned::to_owned)
                    .take(3)
                    .collect())
            }
        }
    }
}

fn extractive_answer(context: &str, max_passages: usize) -> String {
    let passages: Vec<&str> = context
        .split("\n\n")
        .map(str::trim)
        .filter(|passage| !passage.is_empty())
        .take(max_passages)
        .collect();

    if passages.is_empty() {
        NO_CONTEXT_ANSWER.to_string()
    } else {
        passages.join("\n\n")
    }
}
