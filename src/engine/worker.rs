//! Cooperative event loop around a [`ConsentWidget`].
//!
//! The worker owns the widget and a [`Transport`]. It waits on three things at
//! once: commands from [`WidgetHandle`]s, responses of in-flight requests and
//! the widget's next timer. Everything runs on one task; the loop is meant for
//! a current-thread runtime or a `LocalSet`, which is why requests are tracked
//! as local (non-`Send`) futures.

use crate::engine::errors::NetError;
use crate::engine::events::{WidgetCommand, WidgetEvent};
use crate::engine::handle::WidgetHandle;
use crate::engine::net::{PendingRequest, RequestId, Response, Transport};
use crate::engine::widget::ConsentWidget;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::rc::Rc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

type InFlight = FuturesUnordered<LocalBoxFuture<'static, (RequestId, Result<Response, NetError>)>>;

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

pub struct WidgetWorker<T: Transport + 'static> {
    widget: ConsentWidget,
    transport: Rc<T>,
    cmd_rx: mpsc::Receiver<WidgetCommand>,
    event_tx: broadcast::Sender<WidgetEvent>,
    cancel: CancellationToken,
}

impl<T: Transport + 'static> WidgetWorker<T> {
    pub fn new(widget: ConsentWidget, transport: T) -> (Self, WidgetHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();

        let handle = WidgetHandle::new(cmd_tx, event_tx.clone(), cancel.clone());
        let worker = Self {
            widget,
            transport: Rc::new(transport),
            cmd_rx,
            event_tx,
            cancel,
        };
        (worker, handle)
    }

    /// Runs until the page unloads, the worker is shut down, or every handle is
    /// dropped. Returns the widget so the final page state can be inspected.
    pub async fn run(mut self) -> ConsentWidget {
        let mut in_flight: InFlight = FuturesUnordered::new();
        log::debug!("WidgetWorker: started");

        loop {
            self.dispatch_outbound(&mut in_flight);
            self.publish_events();
            let deadline = self.widget.next_deadline();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                msg = self.cmd_rx.recv() => {
                    let Some(cmd) = msg else {
                        // Every handle is gone
                        break;
                    };
                    let unload = matches!(cmd, WidgetCommand::Unload);
                    self.widget.handle_command(cmd, now());
                    if unload {
                        self.cancel.cancel();
                    }
                }

                Some((id, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.widget.on_response(id, result, now());
                }

                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                        None => futures::future::pending().await,
                    }
                } => {
                    self.widget.tick(now());
                }
            }
        }

        if !in_flight.is_empty() {
            log::debug!("WidgetWorker: dropping {} in-flight request(s)", in_flight.len());
        }
        self.publish_events();
        log::debug!("WidgetWorker: stopped");
        self.widget
    }

    fn dispatch_outbound(&mut self, in_flight: &mut InFlight) {
        for PendingRequest { id, kind, request } in self.widget.take_outbound() {
            log::debug!("WidgetWorker: sending {} ({}) {} {}", id, kind, request.method, request.url);
            let transport = Rc::clone(&self.transport);
            in_flight.push(
                async move {
                    let result = transport.send(request).await;
                    (id, result)
                }
                .boxed_local(),
            );
        }
    }

    fn publish_events(&mut self) {
        for event in self.widget.drain_events() {
            // No subscribers is fine
            let _ = self.event_tx.send(event);
        }
    }
}
