//! In-memory telephony for tests and local development

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use reverie_core::{PhoneNumber, ProviderCallSid};

use crate::error::{AdapterError, Result};

use super::{InstructionSet, Telephony};

/// A call placed through the mock, captured for assertions.
#[derive(Debug, Clone)]
pub struct PlacedCall {
    pub sid: ProviderCallSid,
    pub to: PhoneNumber,
    pub from: PhoneNumber,
    pub answer_url: String,
    pub status_url: String,
}

#[derive(Default)]
struct Inner {
    placed: Vec<PlacedCall>,
    instructions: HashMap<String, Vec<InstructionSet>>,
    ended: HashSet<String>,
    completed: HashSet<String>,
    fail_place_calls: u32,
    next_sid: u64,
}

/// Deterministic in-memory provider. Mirrors the contract the engine leans
/// on: `place_call` hands back the SID synchronously, and instruction pushes
/// are rejected once the call is completed.
#[derive(Default)]
pub struct MockTelephony {
    inner: Mutex<Inner>,
}

impl MockTelephony {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `place_call` invocations fail transiently.
    pub fn fail_next_place_calls(&self, n: u32) {
        self.inner.lock().fail_place_calls = n;
    }

    pub fn placed_calls(&self) -> Vec<PlacedCall> {
        self.inner.lock().placed.clone()
    }

    pub fn instructions_for(&self, sid: &ProviderCallSid) -> Vec<InstructionSet> {
        self.inner
            .lock()
            .instructions
            .get(sid.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn was_ended(&self, sid: &ProviderCallSid) -> bool {
        let inner = self.inner.lock();
        inner.ended.contains(sid.as_str()) || inner.completed.contains(sid.as_str())
    }
}

#[async_trait]
impl Telephony for MockTelephony {
    async fn place_call(
        &self,
        to: &PhoneNumber,
        from: &PhoneNumber,
        answer_url: &str,
        status_url: &str,
    ) -> Result<ProviderCallSid> {
        let mut inner = self.inner.lock();

        if inner.fail_place_calls > 0 {
            inner.fail_place_calls -= 1;
            return Err(AdapterError::transient("mock telephony: injected failure"));
        }

        inner.next_sid += 1;
        let sid = ProviderCallSid(format!("CA{:032x}", inner.next_sid));
        inner.placed.push(PlacedCall {
            sid: sid.clone(),
            to: to.clone(),
            from: from.clone(),
            answer_url: answer_url.to_string(),
            status_url: status_url.to_string(),
        });
        Ok(sid)
    }

    async fn end_call(&self, sid: &ProviderCallSid) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ended.insert(sid.as_str().to_string());
        inner.completed.insert(sid.as_str().to_string());
        Ok(())
    }

    async fn send_instructions(
        &self,
        sid: &ProviderCallSid,
        instructions: InstructionSet,
    ) -> Result<()> {
        // Render first so malformed documents fail the same way live ones do.
        instructions.to_xml()?;

        let mut inner = self.inner.lock();
        if inner.completed.contains(sid.as_str()) {
            return Err(AdapterError::permanent(format!(
                "call {sid} already completed, instructions rejected"
            )));
        }

        let ends_call = instructions.ends_call();
        inner
            .instructions
            .entry(sid.as_str().to_string())
            .or_default()
            .push(instructions);

        if ends_call {
            inner.completed.insert(sid.as_str().to_string());
        }
        Ok(())
    }
}
