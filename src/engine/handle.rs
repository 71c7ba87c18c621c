use crate::engine::dom::NodeId;
use crate::engine::errors::WidgetError;
use crate::engine::events::{WidgetCommand, WidgetEvent};
use crate::engine::toast::ToastId;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Cloneable handle to a running [`WidgetWorker`](crate::engine::worker::WidgetWorker).
#[derive(Clone)]
pub struct WidgetHandle {
    /// Command sender into the worker
    cmd_tx: mpsc::Sender<WidgetCommand>,
    /// Event sender, kept to hand out new subscriptions
    event_tx: broadcast::Sender<WidgetEvent>,
    /// Stops the worker loop
    cancel: CancellationToken,
}

impl std::fmt::Debug for WidgetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetHandle")
            .field("cmd_tx", &self.cmd_tx)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl WidgetHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::Sender<WidgetCommand>,
        event_tx: broadcast::Sender<WidgetEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { cmd_tx, event_tx, cancel }
    }

    /// Sends a command to the worker.
    pub async fn send(&self, cmd: WidgetCommand) -> Result<(), WidgetError> {
        self.cmd_tx.send(cmd).await.map_err(|_| WidgetError::WorkerGone)
    }

    /// Sends a command without waiting for channel capacity.
    pub fn try_send(&self, cmd: WidgetCommand) -> Result<(), WidgetError> {
        self.cmd_tx.try_send(cmd).map_err(|_| WidgetError::WorkerGone)
    }

    /// Subscribes to widget events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.event_tx.subscribe()
    }

    pub async fn page_ready(&self) -> Result<(), WidgetError> {
        self.send(WidgetCommand::PageReady).await
    }

    pub async fn click(&self, target: NodeId) -> Result<(), WidgetError> {
        self.send(WidgetCommand::Click { target }).await
    }

    pub async fn change(&self, target: NodeId, checked: bool) -> Result<(), WidgetError> {
        self.send(WidgetCommand::Change { target, checked }).await
    }

    pub async fn show_toast(&self, message: impl Into<String>, title: Option<String>) -> Result<(), WidgetError> {
        self.send(WidgetCommand::ShowToast {
            message: message.into(),
            title,
        })
        .await
    }

    pub async fn dismiss_toast(&self, id: ToastId) -> Result<(), WidgetError> {
        self.send(WidgetCommand::DismissToast(id)).await
    }

    /// Unloads the page: toasts are removed and the worker stops.
    pub async fn unload(&self) -> Result<(), WidgetError> {
        self.send(WidgetCommand::Unload).await
    }

    /// Stops the worker without unloading the page first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.cmd_tx.is_closed()
    }
}
