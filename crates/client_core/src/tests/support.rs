use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use shared::domain::{Identity, UserId};
use storage::MemoryStore;
use tokio::sync::Semaphore;

use crate::{
    gateway::ApiGateway,
    session::SessionController,
    transport::{Transport, TransportError, TransportRequest, TransportResponse},
};

pub(crate) const TOKEN_KEY: &str = "token";

/// Transport that replays queued responses and records every request.
///
/// With a gate, each call waits for a semaphore permit before answering so
/// tests can hold a request in flight.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn respond_json(self, status: u16, body: Value) -> Self {
        self.respond_raw(status, &body.to_string())
    }

    pub(crate) fn respond_raw(self, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Ok(TransportResponse {
                status: StatusCode::from_u16(status).expect("status"),
                body: body.as_bytes().to_vec(),
            }));
        self
    }

    pub(crate) fn fail_network(self, message: &str) -> Self {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Err(TransportError::Network(message.to_string())));
        self
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        let label = format!("{} {}", request.method, request.path);
        self.requests.lock().expect("requests lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted request: {label}"))
    }
}

pub(crate) fn identity_json() -> Value {
    json!({"id": 1, "email": "a@x.com", "username": "a", "is_active": true})
}

pub(crate) fn sample_identity() -> Identity {
    Identity {
        id: UserId(1),
        email: "a@x.com".into(),
        username: "a".into(),
        full_name: None,
    }
}

pub(crate) fn controller(
    transport: Arc<ScriptedTransport>,
    store: &MemoryStore,
) -> SessionController {
    SessionController::new(
        Arc::new(ApiGateway::new(transport)),
        Arc::new(store.clone()),
        TOKEN_KEY,
    )
}
