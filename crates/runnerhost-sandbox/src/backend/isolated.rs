//! Isolated backend: the guest realm gets one native primitive,
//! `__rhPost(text)`, and everything else crosses as JSON text.
//!
//! Guest → host messages are envelopes `{channel, id, payload}` posted to an
//! outbox. The host answers by evaluating `__rhReply(id, ok, text)`; host →
//! guest calls are `__rhCall(id, method, argsText)` and come back as
//! `settle` envelopes carrying the correlation id.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use rquickjs::{Context, Ctx, FromJs, Function, Runtime};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::lane::{Engine, PendingCall, ReverseMessage, ReverseQueue};
use super::{BackendKind, BootScripts, SHIMS_JS, boot_failure};
use crate::codec;
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::handlers::{HostServices, ReverseChannel, invalid_request};
use crate::js;
use crate::translate::translate;

const ROOT_CHECK_JS: &str = "(function (r) { return r !== null && (typeof r === 'object' || typeof r === 'function'); })(globalThis.__RUNNER__)";

#[derive(Debug, Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    /// JSON text of the message body.
    #[serde(default)]
    payload: Option<String>,
}

pub(crate) struct IsolatedEngine {
    runner_id: String,
    services: HostServices,
    reverse: ReverseQueue,
    outbox: Rc<RefCell<VecDeque<String>>>,
    /// Host → guest calls by correlation id.
    calls: HashMap<u64, PendingCall>,
    /// Reverse ticket → guest request id.
    replies: HashMap<u64, u64>,
    next_ticket: u64,
    context: Context,
    runtime: Runtime,
}

impl IsolatedEngine {
    fn load(&mut self, scripts: &BootScripts) -> Result<()> {
        let outbox = Rc::clone(&self.outbox);
        self.context.with(|ctx| -> Result<()> {
            js::eval_stage(&ctx, "commons", &scripts.commons)?;
            install_post(&ctx, outbox)
                .map_err(|err| boot_failure("channels", js::exception_text(&ctx, &err)))?;
            js::eval_stage(&ctx, "channels", SHIMS_JS)?;
            js::eval_stage(&ctx, "runner", &scripts.runner)?;
            js::eval_stage(&ctx, "bootstrap", &scripts.bootstrap)
        })?;
        self.pump();

        let bound: bool = self
            .eval(ROOT_CHECK_JS)
            .map_err(|err| boot_failure("bootstrap", err))?;
        if bound {
            Ok(())
        } else {
            Err(boot_failure("bootstrap", "__RUNNER__ is not an object"))
        }
    }

    fn eval<R>(&self, script: &str) -> Result<R>
    where
        R: for<'js> FromJs<'js>,
    {
        self.context
            .with(|ctx| ctx.eval::<R, _>(script).map_err(|err| js::failure(&ctx, err)))
    }

    fn eval_json<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let text: String = self.eval(script)?;
        codec::decode(&text)
    }

    fn reply(&self, id: u64, ok: bool, payload: &Value) {
        let literal = match codec::encode(payload).and_then(|text| codec::encode(&text)) {
            Ok(literal) => literal,
            Err(err) => {
                warn!(request_id = id, error = %err, "cannot encode reply");
                return;
            }
        };
        match self.eval::<bool>(&format!("__rhReply({id}, {ok}, {literal})")) {
            Ok(true) => {}
            Ok(false) => debug!(request_id = id, "guest dropped reply for unknown request"),
            Err(err) => warn!(request_id = id, error = %err, "reply failed"),
        }
    }

    fn receive(&mut self, text: &str) {
        let envelope: Envelope = match codec::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "malformed envelope from guest");
                return;
            }
        };
        let payload = envelope.payload.as_deref().unwrap_or("null");

        let channel = match envelope.channel.as_str() {
            "log" => {
                let value = codec::decode::<Value>(payload).unwrap_or(Value::Null);
                self.services.log(&value);
                return;
            }
            "settle" => {
                self.settle_call(envelope.id, envelope.ok, payload);
                return;
            }
            "store" => ReverseChannel::Store,
            "network" => ReverseChannel::Network,
            other => {
                warn!(channel = other, "unknown envelope channel");
                return;
            }
        };

        let Some(id) = envelope.id else {
            warn!(channel = channel.name(), "reverse message without id");
            return;
        };
        match codec::decode::<Value>(payload) {
            Ok(payload) => {
                self.next_ticket += 1;
                let ticket = self.next_ticket;
                self.replies.insert(ticket, id);
                self.reverse.borrow_mut().push_back(ReverseMessage {
                    ticket,
                    channel,
                    payload,
                });
            }
            Err(err) => {
                let fault = invalid_request(err).guest_fault().to_json();
                self.reply(id, false, &fault);
            }
        }
    }

    fn settle_call(&mut self, id: Option<u64>, ok: bool, payload: &str) {
        let Some(mut call) = id.and_then(|id| self.calls.remove(&id)) else {
            warn!(call_id = ?id, "settlement for unknown call");
            return;
        };
        let outcome = match codec::decode::<Value>(payload) {
            Ok(value) if ok => Ok(Some(value).filter(|v| !v.is_null())),
            Ok(error) => Err(translate(&error)),
            Err(err) => Err(err),
        };
        call.settle(outcome);
    }
}

impl Engine for IsolatedEngine {
    const KIND: BackendKind = BackendKind::Isolated;

    fn boot(
        scripts: &BootScripts,
        services: &HostServices,
        config: &SandboxConfig,
        reverse: ReverseQueue,
    ) -> Result<Self> {
        let (runtime, context) = js::new_runtime(config)?;
        let mut engine = Self {
            runner_id: services.runner_id().to_string(),
            services: services.clone(),
            reverse,
            outbox: Rc::default(),
            calls: HashMap::new(),
            replies: HashMap::new(),
            next_ticket: 0,
            context,
            runtime,
        };
        match engine.load(scripts) {
            Ok(()) => Ok(engine),
            Err(err) => {
                engine.release();
                Err(err)
            }
        }
    }

    fn invoke(&mut self, mut call: PendingCall, args: Vec<Value>) {
        let script = match call_script(call.id(), call.method(), &args) {
            Ok(script) => script,
            Err(err) => {
                call.settle(Err(err));
                return;
            }
        };
        match self.eval::<bool>(&script) {
            Ok(true) => {
                call.mark_dispatched();
                self.calls.insert(call.id(), call);
            }
            Ok(false) => {
                let method = call.method().to_string();
                call.settle(Err(SandboxError::MethodNotFound { method }));
            }
            Err(err) => {
                call.settle(Err(err));
            }
        }
    }

    fn has_method(&mut self, method: &str) -> Result<bool> {
        self.eval(&format!("__rhHasMethod({})", codec::encode(method)?))
    }

    fn method_names(&mut self) -> Result<Vec<String>> {
        self.eval_json("JSON.stringify(__rhMethods())")
    }

    fn read_property(&mut self, name: &str) -> Result<Option<Value>> {
        let value: Value = self.eval_json(&format!("__rhRead({})", codec::encode(name)?))?;
        Ok(Some(value).filter(|v| !v.is_null()))
    }

    fn settle_reverse(&mut self, ticket: u64, outcome: Result<Value>) {
        let Some(id) = self.replies.remove(&ticket) else {
            warn!(ticket, "reply for unknown reverse message");
            return;
        };
        match outcome {
            Ok(value) => self.reply(id, true, &value),
            Err(err) => self.reply(id, false, &err.guest_fault().to_json()),
        }
    }

    fn pump(&mut self) {
        loop {
            js::run_jobs(&self.runtime, &self.runner_id);
            let batch: Vec<String> = self.outbox.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for text in batch {
                self.receive(&text);
            }
        }
    }

    fn release(&mut self) {
        let unsettled = self.calls.len();
        self.calls.clear();
        self.replies.clear();
        self.outbox.borrow_mut().clear();
        if unsettled > 0 {
            debug!(runner = %self.runner_id, unsettled, "released pending calls");
        }
    }
}

fn install_post(ctx: &Ctx<'_>, outbox: Rc<RefCell<VecDeque<String>>>) -> rquickjs::Result<()> {
    let post = Function::new(ctx.clone(), move |text: String| {
        outbox.borrow_mut().push_back(text);
    })?;
    ctx.globals().set("__rhPost", post)
}

fn call_script(id: u64, method: &str, args: &[Value]) -> Result<String> {
    let args_text = codec::encode(args)?;
    Ok(format!(
        "__rhCall({id}, {}, {})",
        codec::encode(method)?,
        codec::encode(&args_text)?
    ))
}
