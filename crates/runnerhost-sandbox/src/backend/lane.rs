//! The execution lane: one OS thread per sandbox.
//!
//! Script engines are single-threaded, so each sandbox owns a dedicated
//! thread that receives [`LaneRequest`]s in order. Host callers only hold a
//! [`Lane`] handle (a channel sender), which makes every call into one
//! sandbox serialized by construction while many host tasks can await
//! results concurrently. Reverse-channel work runs on the tokio runtime and
//! comes back to the lane as [`LaneRequest::ReverseSettled`].

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, info_span, warn};

use super::{BackendKind, BootScripts, SandboxBackend};
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::handlers::{HostServices, ReverseChannel};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum LaneRequest {
    Invoke {
        method: String,
        args: Vec<Value>,
        reply: Reply<Option<Value>>,
    },
    HasMethod {
        method: String,
        reply: Reply<bool>,
    },
    MethodNames {
        reply: Reply<Vec<String>>,
    },
    ReadProperty {
        name: String,
        reply: Reply<Option<Value>>,
    },
    ReverseSettled {
        ticket: u64,
        outcome: Result<Value>,
    },
    Shutdown,
}

/// A guest → host message waiting to be dispatched.
pub(crate) struct ReverseMessage {
    pub ticket: u64,
    pub channel: ReverseChannel,
    pub payload: Value,
}

pub(crate) type ReverseQueue = Rc<RefCell<VecDeque<ReverseMessage>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallState {
    Created,
    Dispatched,
    Settled,
}

/// One in-flight host → guest invocation.
///
/// Settles exactly once. A second settlement is logged and dropped; a call
/// dropped before settling reports [`SandboxError::SandboxClosed`].
pub(crate) struct PendingCall {
    id: u64,
    method: String,
    state: CallState,
    reply: Option<Reply<Option<Value>>>,
}

impl PendingCall {
    pub(crate) fn new(id: u64, method: String, reply: Reply<Option<Value>>) -> Self {
        Self {
            id,
            method,
            state: CallState::Created,
            reply: Some(reply),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn state(&self) -> CallState {
        self.state
    }

    pub(crate) fn mark_dispatched(&mut self) {
        if self.state == CallState::Created {
            self.state = CallState::Dispatched;
        }
    }

    /// Deliver the outcome. Returns `false` if the call had already settled.
    pub(crate) fn settle(&mut self, outcome: Result<Option<Value>>) -> bool {
        let Some(reply) = self.reply.take() else {
            warn!(call_id = self.id, method = %self.method, "call settled twice; ignoring second outcome");
            return false;
        };
        self.state = CallState::Settled;
        debug!(call_id = self.id, method = %self.method, ok = outcome.is_ok(), "call settled");
        // The caller may have stopped waiting; that is not an error here.
        let _ = reply.send(outcome);
        true
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if let Some(reply) = self.reply.take() {
            debug!(call_id = self.id, method = %self.method, "call dropped unsettled");
            let _ = reply.send(Err(SandboxError::SandboxClosed));
        }
    }
}

/// A script engine living on a lane thread.
pub(crate) trait Engine: Sized {
    const KIND: BackendKind;

    /// Run the boot sequence. On error the engine must already be released.
    fn boot(
        scripts: &BootScripts,
        services: &HostServices,
        config: &SandboxConfig,
        reverse: ReverseQueue,
    ) -> Result<Self>;

    fn invoke(&mut self, call: PendingCall, args: Vec<Value>);

    fn has_method(&mut self, method: &str) -> Result<bool>;

    fn method_names(&mut self) -> Result<Vec<String>>;

    fn read_property(&mut self, name: &str) -> Result<Option<Value>>;

    fn settle_reverse(&mut self, ticket: u64, outcome: Result<Value>);

    /// Run queued guest work until the engine is idle.
    fn pump(&mut self);

    /// Drop every retained guest continuation before the engine goes away.
    fn release(&mut self);
}

/// Host-side handle to a sandbox lane. Dropping it shuts the lane down.
pub(crate) struct Lane {
    kind: BackendKind,
    runner_id: String,
    tx: mpsc::UnboundedSender<LaneRequest>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Lane {
    /// Spawn the lane thread and wait for the boot sequence to finish.
    pub(crate) async fn start<E: Engine + 'static>(
        scripts: BootScripts,
        services: HostServices,
        config: SandboxConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| SandboxError::Engine("sandboxes must be started inside a tokio runtime".into()))?;
        let runner_id = services.runner_id().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let weak = tx.downgrade();
        // Script recursion runs on this thread's stack.
        let stack = config.max_stack_size.saturating_mul(4).max(4 * 1024 * 1024);

        let thread = std::thread::Builder::new()
            .name(format!("runner-{runner_id}"))
            .stack_size(stack)
            .spawn(move || {
                let span = info_span!("sandbox", runner = %services.runner_id(), backend = %E::KIND);
                let _guard = span.enter();
                run::<E>(scripts, services, config, rx, weak, runtime, ready_tx);
            })?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => return Err(SandboxError::SandboxClosed),
        }

        info!(runner = %runner_id, backend = %E::KIND, "sandbox ready");
        Ok(Self {
            kind: E::KIND,
            runner_id,
            tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> LaneRequest) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| SandboxError::SandboxClosed)?;
        rx.await.map_err(|_| SandboxError::SandboxClosed)?
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        let _ = self.tx.send(LaneRequest::Shutdown);
    }
}

#[async_trait]
impl SandboxBackend for Lane {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn runner_id(&self) -> &str {
        &self.runner_id
    }

    async fn method_names(&self) -> Result<Vec<String>> {
        self.request(|reply| LaneRequest::MethodNames { reply }).await
    }

    async fn has_method(&self, method: &str) -> Result<bool> {
        let method = method.to_string();
        self.request(|reply| LaneRequest::HasMethod { method, reply })
            .await
    }

    async fn read_property(&self, name: &str) -> Result<Option<Value>> {
        let name = name.to_string();
        self.request(|reply| LaneRequest::ReadProperty { name, reply })
            .await
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let method = method.to_string();
        self.request(|reply| LaneRequest::Invoke { method, args, reply })
            .await
    }

    async fn shutdown(&self) {
        let _ = self.tx.send(LaneRequest::Shutdown);
        let thread = self.thread.lock().ok().and_then(|mut slot| slot.take());
        if let Some(thread) = thread {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            info!(runner = %self.runner_id, "sandbox shut down");
        }
    }
}

/// Bookkeeping for reverse-channel tasks running on the tokio runtime.
struct ReverseTasks {
    services: HostServices,
    runtime: Handle,
    lane: mpsc::WeakUnboundedSender<LaneRequest>,
    running: HashMap<u64, AbortHandle>,
}

/// A reverse handler that panics still settles its guest promise, as an
/// engine error.
async fn settle_on_panic<F>(handler: F) -> Result<Value>
where
    F: std::future::Future<Output = Result<Value>>,
{
    AssertUnwindSafe(handler).catch_unwind().await.unwrap_or_else(|_| {
        warn!("reverse handler panicked");
        Err(SandboxError::Engine("reverse handler panicked".into()))
    })
}

impl ReverseTasks {
    fn spawn_queued(&mut self, queue: &ReverseQueue) {
        loop {
            let Some(message) = queue.borrow_mut().pop_front() else {
                break;
            };
            let Some(lane) = self.lane.upgrade() else {
                // Every host handle is gone; shutdown is already queued.
                continue;
            };
            let services = self.services.clone();
            let ReverseMessage { ticket, channel, payload } = message;
            debug!(ticket, channel = channel.name(), "reverse message");
            let task = self.runtime.spawn(async move {
                let outcome = settle_on_panic(services.dispatch(channel, payload)).await;
                if let Err(err) = &outcome {
                    debug!(ticket, channel = channel.name(), error = %err, "reverse message failed");
                }
                let _ = lane.send(LaneRequest::ReverseSettled { ticket, outcome });
            });
            self.running.insert(ticket, task.abort_handle());
        }
    }

    fn abort_all(&mut self) {
        for (ticket, task) in self.running.drain() {
            debug!(ticket, "aborting reverse task");
            task.abort();
        }
    }
}

fn run<E: Engine>(
    scripts: BootScripts,
    services: HostServices,
    config: SandboxConfig,
    mut rx: mpsc::UnboundedReceiver<LaneRequest>,
    lane: mpsc::WeakUnboundedSender<LaneRequest>,
    runtime: Handle,
    ready: oneshot::Sender<Result<()>>,
) {
    let queue: ReverseQueue = Rc::default();
    let mut engine = match E::boot(&scripts, &services, &config, Rc::clone(&queue)) {
        Ok(engine) => engine,
        Err(err) => {
            warn!(error = %err, "bootstrap failed");
            let _ = ready.send(Err(err));
            return;
        }
    };
    drop(scripts);

    let mut tasks = ReverseTasks {
        services,
        runtime,
        lane,
        running: HashMap::new(),
    };
    tasks.spawn_queued(&queue);

    if ready.send(Ok(())).is_ok() {
        let mut next_call: u64 = 0;
        while let Some(request) = rx.blocking_recv() {
            match request {
                LaneRequest::Invoke { method, args, reply } => {
                    next_call += 1;
                    debug!(call_id = next_call, %method, "invoke");
                    engine.invoke(PendingCall::new(next_call, method, reply), args);
                }
                LaneRequest::HasMethod { method, reply } => {
                    let _ = reply.send(engine.has_method(&method));
                }
                LaneRequest::MethodNames { reply } => {
                    let _ = reply.send(engine.method_names());
                }
                LaneRequest::ReadProperty { name, reply } => {
                    let _ = reply.send(engine.read_property(&name));
                }
                LaneRequest::ReverseSettled { ticket, outcome } => {
                    tasks.running.remove(&ticket);
                    engine.settle_reverse(ticket, outcome);
                }
                LaneRequest::Shutdown => break,
            }
            engine.pump();
            tasks.spawn_queued(&queue);
        }
    }

    tasks.abort_all();
    queue.borrow_mut().clear();
    engine.release();
    drop(engine);
    debug!("lane stopped");
}
