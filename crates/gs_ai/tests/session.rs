use std::cell::RefCell;
use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;

use gs_ai::citations::raw_grounding;
use gs_ai::generate::{GenerateContentRequest, Generation, Generator};
use gs_ai::prompts::{system_instruction, DEFAULT_COLLECTION};
use gs_ai::provision::{provision, ProvisionOptions};
use gs_ai::session::{ask, Session, SessionState};
use gs_ai::stores::{FileSearchStores, Operation, RemoteStore};
use gs_core::config::{load_store_identifier, StoreIdSource};
use gs_core::domain::{DocumentRef, Role, StoreId, Transcript};
use gs_core::error::AppError;
use gs_core::kv::JsonFileStore;

const MODEL: &str = "gemini-3-flash-preview";

struct MockGenerator {
    reply: Result<Value, AppError>,
    seen: RefCell<Vec<(String, GenerateContentRequest)>>,
}

impl MockGenerator {
    fn answering(raw: Value) -> Self {
        Self {
            reply: Ok(raw),
            seen: RefCell::new(Vec::new()),
        }
    }

    fn failing(err: AppError) -> Self {
        Self {
            reply: Err(err),
            seen: RefCell::new(Vec::new()),
        }
    }

    fn last_request(&self) -> GenerateContentRequest {
        self.seen.borrow().last().expect("a request was sent").1.clone()
    }
}

impl Generator for MockGenerator {
    fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<Generation, AppError> {
        self.seen
            .borrow_mut()
            .push((model.to_string(), request.clone()));
        match &self.reply {
            Ok(raw) => Generation::from_raw(raw.clone()),
            Err(e) => Err(e.clone()),
        }
    }
}

fn grounded_answer() -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [
                {"text": "thinking...", "thought": true},
                {"text": "Open the Job Planning screen "},
                {"text": "and press New."}
            ]},
            "finishReason": "STOP",
            "groundingMetadata": {
                "groundingChunks": [
                    {"retrievedContext": {"title": "Job Planning User Guide", "text": "Select New to create a job."}},
                    {"retrievedContext": {"text": "Jobs are listed by date."}}
                ],
                "groundingSupports": [{"groundingChunkIndices": [0]}]
            }
        }]
    })
}

fn decline_answer() -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [
                {"text": "I could not find information about this in the provided documents."}
            ]},
            "finishReason": "STOP"
        }]
    })
}

fn store() -> StoreId {
    StoreId::new("fileSearchStores/guides-123").unwrap()
}

fn session() -> Session {
    Session::new(Some(store()), MODEL, system_instruction(DEFAULT_COLLECTION))
}

#[test]
fn no_store_gates_submission() {
    let gen = MockGenerator::answering(grounded_answer());
    let mut s = Session::new(None, MODEL, "rules");
    assert_eq!(s.state(), SessionState::NoStore);
    assert!(s.needs_store());

    let err = s.submit(&gen, "How do I create a job?").unwrap_err();
    assert_eq!(err.code, "CONFIG_MISSING");
    assert!(gen.seen.borrow().is_empty());
    assert!(s.transcript().is_empty());
    assert_eq!(s.state(), SessionState::NoStore);
}

#[test]
fn interactive_store_id_must_have_prefix() {
    let mut s = Session::new(None, MODEL, "rules");
    for bad in ["", "   ", "guides-123", "fileSearchStores/", "fileSearchStores/a b"] {
        let err = s.provide_store_id(bad).unwrap_err();
        assert_eq!(err.code, "CONFIG_INVALID_STORE_ID", "input {bad:?}");
        assert!(s.needs_store());
    }

    let id = s.provide_store_id("  fileSearchStores/guides-123 ").unwrap().clone();
    assert_eq!(id.as_str(), "fileSearchStores/guides-123");
    assert_eq!(s.state(), SessionState::AwaitingInput);
    assert_eq!(s.store_id(), Some(&id));
}

#[test]
fn successful_turn_appends_user_and_grounded_assistant() {
    let gen = MockGenerator::answering(grounded_answer());
    let mut s = session();

    let turn = s.submit(&gen, "How do I create a job?").unwrap().clone();
    assert_eq!(turn.role, Role::Assistant);
    assert_eq!(turn.text, "Open the Job Planning screen and press New.");
    assert_eq!(turn.citations.len(), 2);
    assert_eq!(turn.citations[0].title, "Job Planning User Guide");
    assert_eq!(turn.citations[1].title, "Unknown Source");
    assert_eq!(turn.citations[1].text, "Jobs are listed by date.");

    let turns = s.transcript().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "How do I create a job?");
    assert_eq!(s.state(), SessionState::AwaitingInput);
    assert_eq!(s.last_raw(), None);
}

#[test]
fn request_carries_history_instruction_and_store_scope() {
    let gen = MockGenerator::answering(grounded_answer());
    let mut s = session();
    s.submit(&gen, "first question").unwrap();
    s.submit(&gen, "follow-up").unwrap();

    let (model, req) = gen.seen.borrow().last().cloned().unwrap();
    assert_eq!(model, MODEL);

    let roles: Vec<_> = req
        .contents
        .iter()
        .map(|c| c.role.clone().unwrap_or_default())
        .collect();
    assert_eq!(roles, vec!["user", "model", "user"]);
    assert_eq!(req.contents[2].parts[0].text.as_deref(), Some("follow-up"));

    let instruction = req.system_instruction.as_ref().unwrap().parts[0]
        .text
        .clone()
        .unwrap();
    assert!(instruction.contains(DEFAULT_COLLECTION));

    assert_eq!(req.tools.len(), 1);
    assert_eq!(
        req.tools[0].file_search.file_search_store_names,
        vec!["fileSearchStores/guides-123".to_string()]
    );

    let wire = serde_json::to_value(&req).unwrap();
    assert!(wire.get("systemInstruction").is_some());
    assert_eq!(
        wire["tools"][0]["fileSearch"]["fileSearchStoreNames"][0],
        "fileSearchStores/guides-123"
    );
}

#[test]
fn failure_leaves_transcript_untouched_and_session_usable() {
    let ok = MockGenerator::answering(grounded_answer());
    let mut s = session();
    s.submit(&ok, "How do I create a job?").unwrap();
    let before = s.transcript().clone();

    let down = MockGenerator::failing(
        AppError::new("QUERY_FAILED", "Generation request failed")
            .with_details("timed out")
            .with_retryable(true),
    );
    let err = s.submit(&down, "And delete one?").unwrap_err();
    assert_eq!(err.code, "QUERY_FAILED");
    assert!(err.retryable);
    assert_eq!(s.transcript(), &before);
    assert_eq!(s.state(), SessionState::ErrorShown);
    assert_eq!(s.last_error().map(|e| e.code.as_str()), Some("QUERY_FAILED"));

    s.acknowledge_error();
    assert_eq!(s.state(), SessionState::AwaitingInput);
    s.submit(&ok, "And delete one?").unwrap();
    assert_eq!(s.transcript().len(), 4);
    assert_eq!(s.last_error(), None);
}

#[test]
fn other_generator_errors_are_reported_as_query_failures() {
    let gen = MockGenerator::failing(
        AppError::new("KV_READ_FAILED", "socket closed").with_retryable(true),
    );
    let err = ask(&gen, &Transcript::new(), "q", &store(), "rules", MODEL).unwrap_err();
    assert_eq!(err.code, "QUERY_FAILED");
    assert!(err.retryable);
    assert!(err.details.unwrap().contains("KV_READ_FAILED: socket closed"));
}

#[test]
fn blank_answer_is_an_error_not_an_empty_turn() {
    let gen = MockGenerator::answering(json!({
        "candidates": [{"content": {"parts": [{"text": "  "}]}, "finishReason": "SAFETY"}]
    }));
    let mut s = session();
    let err = s.submit(&gen, "q").unwrap_err();
    assert_eq!(err.code, "QUERY_EMPTY_ANSWER");
    assert!(err.details.unwrap().contains("finish_reason=SAFETY"));
    assert!(s.transcript().is_empty());

    let blocked = MockGenerator::answering(json!({"promptFeedback": {"blockReason": "OTHER"}}));
    let err = ask(&blocked, &Transcript::new(), "q", &store(), "rules", MODEL).unwrap_err();
    assert_eq!(err.code, "QUERY_EMPTY_ANSWER");
    let details = err.details.unwrap();
    assert!(details.contains("candidates=0"));
    assert!(details.contains("block_reason=OTHER"));
}

#[test]
fn empty_question_is_rejected_without_a_call() {
    let gen = MockGenerator::answering(grounded_answer());
    let mut s = session();
    let err = s.submit(&gen, "   ").unwrap_err();
    assert_eq!(err.code, "QUERY_INVALID_INPUT");
    assert!(gen.seen.borrow().is_empty());
    assert_eq!(s.state(), SessionState::AwaitingInput);
}

#[test]
fn debug_keeps_raw_grounding() {
    let gen = MockGenerator::answering(grounded_answer());
    let mut s = session();
    s.set_debug(true);
    s.submit(&gen, "q").unwrap();

    let raw = s.last_raw().cloned().expect("raw kept in debug");
    let grounding = raw_grounding(&raw);
    assert_eq!(grounding["grounding_chunks"].as_array().unwrap().len(), 2);
    assert_eq!(
        grounding["grounding_supports"][0]["groundingChunkIndices"],
        json!([0])
    );

    s.set_debug(false);
    assert_eq!(s.last_raw(), None);
}

#[test]
fn reset_clears_history_but_keeps_store() {
    let gen = MockGenerator::answering(grounded_answer());
    let mut s = session();
    s.submit(&gen, "q").unwrap();
    s.reset();
    assert!(s.transcript().is_empty());
    assert_eq!(s.store_id(), Some(&store()));
    assert_eq!(s.state(), SessionState::AwaitingInput);

    s.submit(&gen, "fresh").unwrap();
    assert_eq!(gen.last_request().contents.len(), 1);
}

struct InstantStores;

impl FileSearchStores for InstantStores {
    fn create_store(&self, display_name: &str) -> Result<RemoteStore, AppError> {
        Ok(RemoteStore {
            name: "fileSearchStores/gspp-abc".to_string(),
            display_name: Some(display_name.to_string()),
            create_time: None,
        })
    }

    fn list_stores(&self) -> Result<Vec<RemoteStore>, AppError> {
        Ok(Vec::new())
    }

    fn delete_store(&self, _store: &StoreId, _force: bool) -> Result<(), AppError> {
        Ok(())
    }

    fn upload_document(
        &self,
        _store: &StoreId,
        _path: &std::path::Path,
        display_name: &str,
    ) -> Result<Operation, AppError> {
        Ok(Operation {
            name: format!("ops/{display_name}"),
            done: true,
            error: None,
        })
    }

    fn get_operation(&self, name: &str) -> Result<Operation, AppError> {
        Ok(Operation {
            name: name.to_string(),
            done: true,
            error: None,
        })
    }
}

#[test]
fn provisioned_store_is_picked_up_by_a_new_session() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a.pdf");
    let b = tmp.path().join("b.pdf");
    fs::write(&a, b"guide a").unwrap();
    fs::write(&b, b"guide b").unwrap();
    let kv = JsonFileStore::open(tmp.path().join("file_search_config.json"));

    let options = ProvisionOptions {
        poll_interval: Duration::ZERO,
        ..ProvisionOptions::default()
    };
    provision(
        &InstantStores,
        &kv,
        &[
            DocumentRef::new(&a, "Guide A"),
            DocumentRef::new(&b, "Guide B"),
        ],
        "GSPP-User-Guides",
        &options,
    )
    .unwrap();

    let resolved = load_store_identifier(None, None, &kv).expect("store id on disk");
    assert_eq!(resolved.source, StoreIdSource::ConfigFile);

    let mut s = Session::new(
        Some(resolved.id),
        MODEL,
        system_instruction(DEFAULT_COLLECTION),
    );
    assert_eq!(s.state(), SessionState::AwaitingInput);

    let gen = MockGenerator::answering(decline_answer());
    let turn = s.submit(&gen, "What is the capital of France?").unwrap();
    assert!(!turn.text.is_empty());
    assert!(turn.citations.is_empty());
    assert_eq!(
        gen.last_request().tools[0].file_search.file_search_store_names,
        vec!["fileSearchStores/gspp-abc".to_string()]
    );
}
