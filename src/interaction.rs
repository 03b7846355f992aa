/// Human-in-the-loop prompts.
///
/// A workflow that needs a decision opens a [`PromptSlot`], tells the
/// [`Presenter`] to show the prompt and awaits the receiver. The UI answers
/// through `resolve`. A slot holds at most one outstanding request, and each
/// request resolves exactly once.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::ledger::TokenAmount;
use crate::storage::{ContentAddress, UploadMethod};

/// Shown to the user after a successful save-as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub filename: String,
    pub address: ContentAddress,
    pub gateway_url: String,
}

impl SaveSummary {
    /// Text placed on the clipboard by the "copy" action.
    pub fn clipboard_text(&self) -> &str {
        self.address.as_str()
    }
}

/// UI surfaces driven by the orchestrator.
pub trait Presenter: Send + Sync {
    /// Show the backend chooser. The choice comes back through the selector.
    fn choose_upload_method(&self, options: &[UploadMethod]);

    /// Tell the user the backend account must be set up first.
    fn setup_required(&self, method: UploadMethod);

    fn save_succeeded(&self, summary: &SaveSummary);

    /// Plain alert message.
    fn notify(&self, message: &str);

    /// The active document changed.
    fn selection_changed(&self, name: &str);

    fn balance_changed(&self, _balance: TokenAmount) {}

    fn uploading_changed(&self, _uploading: bool) {}
}

/// Single-slot deferred answer.
pub struct PromptSlot<T> {
    kind: &'static str,
    pending: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> PromptSlot<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            pending: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<T>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a request. Fails if one is already outstanding.
    pub fn open(&self) -> Result<PendingAnswer<T>> {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(Error::InteractionPending(self.kind));
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Ok(PendingAnswer {
            kind: self.kind,
            rx,
        })
    }

    /// Deliver the answer to the outstanding request.
    pub fn resolve(&self, answer: T) -> Result<()> {
        let tx = self
            .lock()
            .take()
            .ok_or(Error::InteractionNotPending(self.kind))?;
        tx.send(answer)
            .map_err(|_| Error::InteractionNotPending(self.kind))
    }

    /// Close the prompt without an answer; the waiting workflow aborts.
    pub fn dismiss(&self) -> Result<()> {
        self.lock()
            .take()
            .map(drop)
            .ok_or(Error::InteractionNotPending(self.kind))
    }

    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Receiving half of an open prompt.
pub struct PendingAnswer<T> {
    kind: &'static str,
    rx: oneshot::Receiver<T>,
}

impl<T> PendingAnswer<T> {
    pub async fn answer(self) -> Result<T> {
        self.rx.await.map_err(|_| Error::PromptDismissed(self.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_once() {
        let slot = PromptSlot::<u8>::new("test");
        let pending = slot.open().unwrap();
        assert!(slot.is_pending());
        slot.resolve(7).unwrap();
        assert!(!slot.is_pending());
        assert_eq!(pending.answer().await.unwrap(), 7);

        assert!(matches!(slot.resolve(8), Err(Error::InteractionNotPending("test"))));
    }

    #[tokio::test]
    async fn test_second_open_rejected_not_overwritten() {
        let slot = PromptSlot::<u8>::new("test");
        let first = slot.open().unwrap();
        assert!(matches!(slot.open(), Err(Error::InteractionPending("test"))));

        slot.resolve(1).unwrap();
        assert_eq!(first.answer().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_aborts_waiter() {
        let slot = PromptSlot::<u8>::new("test");
        let pending = slot.open().unwrap();
        slot.dismiss().unwrap();
        assert!(matches!(pending.answer().await, Err(Error::PromptDismissed("test"))));
    }

    #[test]
    fn test_abandoned_request_frees_slot() {
        let slot = PromptSlot::<u8>::new("test");
        drop(slot.open().unwrap());
        assert!(!slot.is_pending());
        assert!(slot.open().is_ok());
    }
}
