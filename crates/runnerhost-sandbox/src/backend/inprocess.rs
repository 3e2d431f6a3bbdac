//! In-process backend: the host installs native functions directly in the
//! guest realm and settles guest promises by calling their resolvers.
//!
//! Host → guest calls are correlated by closure identity: each invocation
//! hands the guest a fresh pair of native callbacks that share the
//! [`PendingCall`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rquickjs::{Context, Ctx, Function, Object, Persistent, Promise, Runtime, Value as JsValue};
use serde_json::Value;
use tracing::{debug, warn};

use super::lane::{Engine, PendingCall, ReverseMessage, ReverseQueue};
use super::{BackendKind, BootScripts, RUNNER_GLOBAL, boot_failure};
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::handlers::{HostServices, LOG_CHANNEL, NETWORK_CHANNEL, ReverseChannel, STORE_CHANNEL};
use crate::js::{self, Mode};
use crate::translate::translate;

const SEAL_CHANNELS_JS: &str = r#"
(function (g) {
  ['__rhStore', '__rhNetwork', '__rhLog'].forEach(function (name) {
    Object.defineProperty(g, name, {
      value: g[name],
      writable: false,
      configurable: false,
      enumerable: false,
    });
  });
})(globalThis);
"#;

/// Resolvers of a guest promise waiting on a reverse message.
struct Resolvers {
    resolve: Persistent<Function<'static>>,
    reject: Persistent<Function<'static>>,
}

type ResolverMap = Rc<RefCell<HashMap<u64, Resolvers>>>;

pub(crate) struct InProcessEngine {
    runner_id: String,
    resolvers: ResolverMap,
    // Field order matters: the context must go before its runtime.
    context: Context,
    runtime: Runtime,
}

impl InProcessEngine {
    fn load(&mut self, scripts: &BootScripts, services: &HostServices, reverse: ReverseQueue) -> Result<()> {
        let resolvers = Rc::clone(&self.resolvers);
        self.context.with(|ctx| -> Result<()> {
            js::eval_stage(&ctx, "commons", &scripts.commons)?;
            install_channels(&ctx, services, reverse, resolvers)
                .map_err(|err| boot_failure("channels", js::exception_text(&ctx, &err)))?;
            js::eval_stage(&ctx, "runner", &scripts.runner)?;
            js::eval_stage(&ctx, "bootstrap", &scripts.bootstrap)
        })?;
        self.pump();

        self.context.with(|ctx| {
            let root: JsValue = ctx
                .globals()
                .get(RUNNER_GLOBAL)
                .map_err(|err| boot_failure("bootstrap", js::exception_text(&ctx, &err)))?;
            if root.is_object() {
                Ok(())
            } else {
                Err(boot_failure("bootstrap", format!("{RUNNER_GLOBAL} is not an object")))
            }
        })
    }
}

impl Engine for InProcessEngine {
    const KIND: BackendKind = BackendKind::InProcess;

    fn boot(
        scripts: &BootScripts,
        services: &HostServices,
        config: &SandboxConfig,
        reverse: ReverseQueue,
    ) -> Result<Self> {
        let (runtime, context) = js::new_runtime(config)?;
        let mut engine = Self {
            runner_id: services.runner_id().to_string(),
            resolvers: Rc::default(),
            context,
            runtime,
        };
        match engine.load(scripts, services, reverse) {
            Ok(()) => Ok(engine),
            Err(err) => {
                engine.release();
                Err(err)
            }
        }
    }

    fn invoke(&mut self, call: PendingCall, args: Vec<Value>) {
        let call = Rc::new(RefCell::new(call));
        match self.context.with(|ctx| dispatch(&ctx, &call, &args)) {
            Ok(()) => call.borrow_mut().mark_dispatched(),
            Err(err) => {
                call.borrow_mut().settle(Err(err));
            }
        }
    }

    fn has_method(&mut self, method: &str) -> Result<bool> {
        self.context
            .with(|ctx| js::call_global(&ctx, "__rhHasMethod", (method,)))
    }

    fn method_names(&mut self) -> Result<Vec<String>> {
        self.context.with(|ctx| js::call_global(&ctx, "__rhMethods", ()))
    }

    fn read_property(&mut self, name: &str) -> Result<Option<Value>> {
        self.context.with(|ctx| {
            let root: Object = ctx
                .globals()
                .get(RUNNER_GLOBAL)
                .map_err(|err| js::failure(&ctx, err))?;
            let value: JsValue = root.get(name).map_err(|err| js::failure(&ctx, err))?;
            Ok(js::to_json(&ctx, value, Mode::Lenient)?.filter(|v| !v.is_null()))
        })
    }

    fn settle_reverse(&mut self, ticket: u64, outcome: Result<Value>) {
        let Some(Resolvers { resolve, reject }) = self.resolvers.borrow_mut().remove(&ticket) else {
            warn!(ticket, "reply for unknown reverse message");
            return;
        };
        self.context.with(|ctx| {
            let settled = match outcome {
                Ok(value) => resolve.restore(&ctx).and_then(|resolve| {
                    let value = js::json_to_js(&ctx, &value)?;
                    resolve.call::<_, ()>((value,))
                }),
                Err(err) => reject.restore(&ctx).and_then(|reject| {
                    let fault = js::fault_to_js(&ctx, &err.guest_fault())?;
                    reject.call::<_, ()>((fault,))
                }),
            };
            if let Err(err) = settled {
                warn!(ticket, error = %js::exception_text(&ctx, &err), "failed to settle reverse message");
            }
        });
    }

    fn pump(&mut self) {
        js::run_jobs(&self.runtime, &self.runner_id);
    }

    fn release(&mut self) {
        let released = self.resolvers.borrow_mut().drain().count();
        if released > 0 {
            debug!(runner = %self.runner_id, released, "released pending reverse resolvers");
        }
    }
}

impl Drop for InProcessEngine {
    fn drop(&mut self) {
        // Persistent handles must not outlive the runtime.
        self.resolvers.borrow_mut().clear();
    }
}

fn install_channels<'js>(
    ctx: &Ctx<'js>,
    services: &HostServices,
    reverse: ReverseQueue,
    resolvers: ResolverMap,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    let tickets = Rc::new(Cell::new(0u64));
    for (name, channel) in [
        (STORE_CHANNEL, ReverseChannel::Store),
        (NETWORK_CHANNEL, ReverseChannel::Network),
    ] {
        let function = reverse_function(
            ctx,
            channel,
            Rc::clone(&reverse),
            Rc::clone(&resolvers),
            Rc::clone(&tickets),
        )?;
        globals.set(name, function)?;
    }

    let services = services.clone();
    let log = Function::new(ctx.clone(), move |ctx: Ctx<'js>, payload: JsValue<'js>| {
        let json = js::to_json(&ctx, payload, Mode::Lenient)
            .ok()
            .flatten()
            .unwrap_or(Value::Null);
        services.log(&json);
    })?;
    globals.set(LOG_CHANNEL, log)?;

    ctx.eval::<(), _>(SEAL_CHANNELS_JS)
}

/// A channel function: queue the payload and hand the guest a promise that
/// settles when the host replies.
fn reverse_function<'js>(
    ctx: &Ctx<'js>,
    channel: ReverseChannel,
    queue: ReverseQueue,
    resolvers: ResolverMap,
    tickets: Rc<Cell<u64>>,
) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, payload: JsValue<'js>| -> rquickjs::Result<Promise<'js>> {
            let (promise, resolve, reject) = Promise::new(&ctx)?;
            match js::to_json(&ctx, payload, Mode::Strict) {
                Ok(json) => {
                    let ticket = tickets.get() + 1;
                    tickets.set(ticket);
                    resolvers.borrow_mut().insert(
                        ticket,
                        Resolvers {
                            resolve: Persistent::save(&ctx, resolve),
                            reject: Persistent::save(&ctx, reject),
                        },
                    );
                    queue.borrow_mut().push_back(ReverseMessage {
                        ticket,
                        channel,
                        payload: json.unwrap_or(Value::Null),
                    });
                }
                Err(err) => {
                    debug!(channel = channel.name(), error = %err, "refusing reverse message");
                    let fault = js::fault_to_js(&ctx, &err.guest_fault())?;
                    reject.call::<_, ()>((fault,))?;
                }
            }
            Ok(promise)
        },
    )
}

/// Start one host → guest call. The guest settles it later through the
/// callbacks handed to `__rhInvoke`.
fn dispatch<'js>(ctx: &Ctx<'js>, call: &Rc<RefCell<PendingCall>>, args: &[Value]) -> Result<()> {
    let method = call.borrow().method().to_string();
    if !js::call_global::<_, bool>(ctx, "__rhHasMethod", (method.as_str(),))? {
        return Err(SandboxError::MethodNotFound { method });
    }

    let on_ok = {
        let call = Rc::clone(call);
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: JsValue<'js>| {
            let outcome = js::to_json(&ctx, value, Mode::Lenient).map(|v| v.filter(|v| !v.is_null()));
            call.borrow_mut().settle(outcome);
        })
        .map_err(|err| js::failure(ctx, err))?
    };
    let on_err = {
        let call = Rc::clone(call);
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, error: JsValue<'js>| {
            let json = js::error_to_json(&ctx, error);
            call.borrow_mut().settle(Err(translate(&json)));
        })
        .map_err(|err| js::failure(ctx, err))?
    };

    let args = js::json_to_js(ctx, &Value::Array(args.to_vec())).map_err(|err| js::failure(ctx, err))?;
    js::call_global::<_, ()>(ctx, "__rhInvoke", (method.as_str(), args, on_ok, on_err))
}
