//! Conversational query path.
//!
//! `ask` is a pure request/response step over an explicit transcript. `Session` owns one user's
//! transcript and gates submission on having a store identifier.

use gs_core::domain::{Citation, Role, StoreId, Transcript, Turn};
use gs_core::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::citations::citations_from_response;
use crate::generate::{Content, FileSearch, GenerateContentRequest, Generator, Part, Tool};

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    /// Response JSON before mapping.
    pub raw: Value,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

pub fn build_request(
    transcript: &Transcript,
    user_text: &str,
    store_id: &StoreId,
    system_instruction: &str,
) -> GenerateContentRequest {
    let mut contents: Vec<Content> = transcript
        .turns()
        .iter()
        .map(|t| Content {
            role: Some(wire_role(t.role).to_string()),
            parts: vec![Part::text(t.text.clone())],
        })
        .collect();
    contents.push(Content {
        role: Some(wire_role(Role::User).to_string()),
        parts: vec![Part::text(user_text)],
    });

    let system_instruction = if system_instruction.trim().is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: vec![Part::text(system_instruction)],
        })
    };

    GenerateContentRequest {
        system_instruction,
        contents,
        tools: vec![Tool {
            file_search: FileSearch {
                file_search_store_names: vec![store_id.as_str().to_string()],
            },
        }],
    }
}

/// Sends one grounded question. Fails rather than returning a blank answer.
pub fn ask(
    generator: &dyn Generator,
    transcript: &Transcript,
    user_text: &str,
    store_id: &StoreId,
    system_instruction: &str,
    model: &str,
) -> Result<Answer, AppError> {
    if user_text.trim().is_empty() {
        return Err(AppError::new("QUERY_INVALID_INPUT", "Question is empty"));
    }

    let request = build_request(transcript, user_text, store_id, system_instruction);
    let generation = generator.generate(model, &request).map_err(|e| {
        if e.code == "QUERY_FAILED" {
            e
        } else {
            let retryable = e.retryable;
            e.recode("QUERY_FAILED", "Query failed").with_retryable(retryable)
        }
    })?;

    let Some(text) = generation.response.text() else {
        let candidate = generation.response.first_candidate();
        let finish = candidate
            .and_then(|c| c.finish_reason.as_deref())
            .unwrap_or("none");
        let blocked = generation
            .response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
            .unwrap_or("none");
        return Err(
            AppError::new("QUERY_EMPTY_ANSWER", "The model returned no answer text")
                .with_details(format!(
                    "candidates={}; finish_reason={finish}; block_reason={blocked}",
                    generation.response.candidates.len()
                )),
        );
    };

    let citations = citations_from_response(&generation.response);
    tracing::debug!(
        store = %store_id,
        citations = citations.len(),
        chars = text.len(),
        "answer received"
    );

    Ok(Answer {
        text,
        citations,
        raw: generation.raw,
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoStore,
    AwaitingInput,
    Querying,
    ErrorShown,
}

/// One user's conversation. Never shared between users.
#[derive(Debug, Clone)]
pub struct Session {
    store_id: Option<StoreId>,
    transcript: Transcript,
    state: SessionState,
    model: String,
    system_instruction: String,
    debug: bool,
    last_raw: Option<Value>,
    last_error: Option<AppError>,
}

impl Session {
    pub fn new(
        store_id: Option<StoreId>,
        model: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        let state = if store_id.is_some() {
            SessionState::AwaitingInput
        } else {
            SessionState::NoStore
        };
        Self {
            store_id,
            transcript: Transcript::new(),
            state,
            model: model.into(),
            system_instruction: system_instruction.into(),
            debug: false,
            last_raw: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn needs_store(&self) -> bool {
        self.state == SessionState::NoStore
    }

    pub fn store_id(&self) -> Option<&StoreId> {
        self.store_id.as_ref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn last_error(&self) -> Option<&AppError> {
        self.last_error.as_ref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, on: bool) {
        self.debug = on;
        if !on {
            self.last_raw = None;
        }
    }

    /// Raw response of the last successful query, kept only while debug is on.
    pub fn last_raw(&self) -> Option<&Value> {
        self.last_raw.as_ref()
    }

    /// Accepts an identifier typed in at the gating prompt.
    pub fn provide_store_id(&mut self, raw: &str) -> Result<&StoreId, AppError> {
        let id = StoreId::parse_user_input(raw)?;
        tracing::info!(store = %id, "store identifier supplied interactively");
        self.state = SessionState::AwaitingInput;
        Ok(&*self.store_id.insert(id))
    }

    /// Leaves `ErrorShown` once the surface has rendered the failure.
    pub fn acknowledge_error(&mut self) {
        if self.state == SessionState::ErrorShown {
            self.state = SessionState::AwaitingInput;
        }
    }

    /// Clears the conversation but keeps the store identifier.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.last_raw = None;
        self.last_error = None;
        if self.state != SessionState::NoStore {
            self.state = SessionState::AwaitingInput;
        }
    }

    /// Asks `user_text` against the session's store and, on success, appends the user turn and
    /// the assistant turn. On failure the transcript is left exactly as it was.
    pub fn submit(&mut self, generator: &dyn Generator, user_text: &str) -> Result<&Turn, AppError> {
        let Some(store_id) = self.store_id.clone() else {
            return Err(AppError::new(
                "CONFIG_MISSING",
                "No file search store is configured; enter a store identifier first",
            ));
        };
        self.acknowledge_error();
        if user_text.trim().is_empty() {
            return Err(AppError::new("QUERY_INVALID_INPUT", "Question is empty"));
        }

        self.state = SessionState::Querying;
        let result = ask(
            generator,
            &self.transcript,
            user_text,
            &store_id,
            &self.system_instruction,
            &self.model,
        );

        match result {
            Ok(answer) => {
                self.transcript.push_user(user_text);
                self.transcript.push_assistant(answer.text, answer.citations);
                self.last_raw = if self.debug { Some(answer.raw) } else { None };
                self.last_error = None;
                self.state = SessionState::AwaitingInput;
                self.transcript.last().ok_or_else(|| {
                    AppError::new("QUERY_FAILED", "Transcript unexpectedly empty after append")
                })
            }
            Err(e) => {
                tracing::warn!(code = %e.code, details = e.details.as_deref().unwrap_or(""), "query failed");
                self.last_error = Some(e.clone());
                self.state = SessionState::ErrorShown;
                Err(e)
            }
        }
    }
}
