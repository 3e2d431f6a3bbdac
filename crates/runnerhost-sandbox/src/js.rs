//! Conversions between script-engine values and JSON.
//!
//! Two modes: [`Mode::Lenient`] mirrors `JSON.stringify` (functions and
//! `undefined` vanish from objects, become `null` in arrays) and is used for
//! method results; [`Mode::Strict`] refuses anything JSON cannot carry and
//! is used for reverse-channel payloads.

use rquickjs::function::{IntoArgs, This};
use rquickjs::{Array, Context, Ctx, Exception, FromJs, Function, IntoJs, Object, Runtime, Type, Value};
use serde_json::{Map, Number};
use tracing::warn;

use crate::config::SandboxConfig;
use crate::error::{GuestFault, Result, SandboxError};

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Lenient,
    Strict,
}

/// Build an engine value from JSON.
pub(crate) fn json_to_js<'js>(ctx: &Ctx<'js>, value: &serde_json::Value) -> rquickjs::Result<Value<'js>> {
    Ok(match value {
        serde_json::Value::Null => Value::new_null(ctx.clone()),
        serde_json::Value::Bool(b) => Value::new_bool(ctx.clone(), *b),
        serde_json::Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Value::new_int(ctx.clone(), i),
            None => Value::new_float(ctx.clone(), n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => s.as_str().into_js(ctx)?,
        serde_json::Value::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, json_to_js(ctx, item)?)?;
            }
            array.into_value()
        }
        serde_json::Value::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), json_to_js(ctx, item)?)?;
            }
            object.into_value()
        }
    })
}

/// Convert an engine value to JSON. `Ok(None)` means the value has no JSON
/// form at the top level (`undefined`, or a function in lenient mode).
pub(crate) fn to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>, mode: Mode) -> Result<Option<serde_json::Value>> {
    convert(ctx, value, mode, "", 0)
}

fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn convert<'js>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
    mode: Mode,
    path: &str,
    depth: usize,
) -> Result<Option<serde_json::Value>> {
    if depth > MAX_DEPTH {
        return Err(SandboxError::Unrepresentable {
            path: format!("{path} (nesting too deep or cyclic)"),
        });
    }
    let unrepresentable = || SandboxError::Unrepresentable {
        path: if path.is_empty() { "$".into() } else { path.to_string() },
    };

    match value.type_of() {
        Type::Uninitialized | Type::Undefined => Ok(None),
        Type::Null => Ok(Some(serde_json::Value::Null)),
        Type::Bool => Ok(value.as_bool().map(serde_json::Value::Bool)),
        Type::Int => Ok(value.as_int().map(|i| serde_json::Value::from(i))),
        Type::Float => Ok(Some(
            value
                .as_float()
                .and_then(Number::from_f64)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        )),
        Type::String => {
            let text = value
                .as_string()
                .map(|s| s.to_string())
                .transpose()
                .map_err(engine)?;
            Ok(text.map(serde_json::Value::String))
        }
        Type::Function | Type::Constructor | Type::Symbol => match mode {
            Mode::Strict => Err(unrepresentable()),
            Mode::Lenient => Ok(None),
        },
        Type::BigInt => Err(unrepresentable()),
        Type::Array => {
            let Some(array) = value.as_array() else {
                return Ok(None);
            };
            let mut items = Vec::with_capacity(array.len());
            for i in 0..array.len() {
                let item: Value<'js> = array.get(i).map_err(engine)?;
                let item_path = format!("{path}[{i}]");
                items.push(convert(ctx, item, mode, &item_path, depth + 1)?.unwrap_or(serde_json::Value::Null));
            }
            Ok(Some(serde_json::Value::Array(items)))
        }
        _ => {
            let Some(object) = value.as_object() else {
                return Err(unrepresentable());
            };
            if let Ok(to_json_fn) = object.get::<_, Function<'js>>("toJSON") {
                let replaced: Value<'js> = to_json_fn
                    .call((This(object.clone()), ""))
                    .map_err(engine)?;
                return convert(ctx, replaced, mode, path, depth + 1);
            }
            let mut map = Map::new();
            for entry in object.props::<String, Value<'js>>() {
                let (key, item) = entry.map_err(engine)?;
                let item_path = child(path, &key);
                if let Some(json) = convert(ctx, item, mode, &item_path, depth + 1)? {
                    map.insert(key, json);
                }
            }
            Ok(Some(serde_json::Value::Object(map)))
        }
    }
}

/// JSON form of a rejection or thrown value.
///
/// `name` and `message` of `Error` objects are not enumerable, so they are
/// read explicitly on top of the enumerable fields.
pub(crate) fn error_to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> serde_json::Value {
    let Some(object) = value.as_object().cloned() else {
        return to_json(ctx, value, Mode::Lenient)
            .ok()
            .flatten()
            .unwrap_or(serde_json::Value::Null);
    };
    let mut json = match to_json(ctx, value, Mode::Lenient) {
        Ok(Some(serde_json::Value::Object(map))) => map,
        _ => Map::new(),
    };
    for field in ["name", "message"] {
        if let Ok(text) = object.get::<_, String>(field) {
            json.insert(field.to_string(), serde_json::Value::String(text));
        }
    }
    serde_json::Value::Object(json)
}

/// Build the error object a guest promise is rejected with.
pub(crate) fn fault_to_js<'js>(ctx: &Ctx<'js>, fault: &GuestFault) -> rquickjs::Result<Value<'js>> {
    let exception = Exception::from_message(ctx.clone(), &fault.message)?;
    let object = exception.as_object();
    object.set("name", fault.name.as_str())?;
    for (key, value) in &fault.extra {
        object.set(key.as_str(), json_to_js(ctx, value)?)?;
    }
    Ok(object.clone().into_value())
}

/// Describe the exception pending on `ctx` after an engine call failed.
pub(crate) fn exception_text(ctx: &Ctx<'_>, err: &rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }
    let thrown = ctx.catch();
    let json = error_to_json(ctx, thrown);
    let name = json.get("name").and_then(serde_json::Value::as_str);
    let message = json.get("message").and_then(serde_json::Value::as_str);
    match (name, message, &json) {
        (Some(name), Some(message), _) => format!("{name}: {message}"),
        (None, Some(message), _) => message.to_string(),
        (_, None, serde_json::Value::String(s)) => s.clone(),
        _ => json.to_string(),
    }
}

/// Evaluate one boot script; failures name the stage that broke.
pub(crate) fn eval_stage(ctx: &Ctx<'_>, stage: &str, source: &str) -> Result<()> {
    ctx.eval::<(), _>(source)
        .map_err(|err| crate::backend::boot_failure(stage, exception_text(ctx, &err)))
}

/// Call a global function installed by the boot scripts.
pub(crate) fn call_global<'js, A, R>(ctx: &Ctx<'js>, name: &str, args: A) -> Result<R>
where
    A: IntoArgs<'js>,
    R: FromJs<'js>,
{
    let function: Function<'js> = ctx.globals().get(name).map_err(|err| failure(ctx, err))?;
    function.call(args).map_err(|err| failure(ctx, err))
}

/// An engine call failed; describe it, consuming any pending exception.
pub(crate) fn failure(ctx: &Ctx<'_>, err: rquickjs::Error) -> SandboxError {
    SandboxError::Engine(exception_text(ctx, &err))
}

/// Run queued promise jobs until none are left.
pub(crate) fn run_jobs(runtime: &Runtime, runner_id: &str) {
    loop {
        match runtime.execute_pending_job() {
            Ok(true) => {}
            Ok(false) => break,
            Err(_) => warn!(runner = runner_id, "uncaught exception in guest job"),
        }
    }
}

pub(crate) fn new_runtime(config: &SandboxConfig) -> Result<(Runtime, Context)> {
    let runtime = Runtime::new().map_err(engine)?;
    runtime.set_memory_limit(config.memory_limit);
    runtime.set_max_stack_size(config.max_stack_size);
    let context = Context::full(&runtime).map_err(engine)?;
    Ok((runtime, context))
}

fn engine(err: rquickjs::Error) -> SandboxError {
    SandboxError::Engine(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};
    use serde_json::json;

    fn with_ctx<R>(f: impl FnOnce(Ctx<'_>) -> R) -> R {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(f)
    }

    #[test]
    fn json_survives_engine_round_trip() {
        with_ctx(|ctx| {
            let value = json!({
                "title": "T",
                "count": 3,
                "big": 9_007_199_254_740_991_i64,
                "ratio": 0.25,
                "tags": ["a", null, true],
                "nested": { "empty": {} }
            });
            let js = json_to_js(&ctx, &value).unwrap();
            let back = to_json(&ctx, js, Mode::Strict).unwrap().unwrap();
            assert_eq!(back["big"].as_f64(), Some(9_007_199_254_740_991_f64));
            assert_eq!(back["title"], "T");
            assert_eq!(back["count"], 3);
            assert_eq!(back["tags"], json!(["a", null, true]));
            assert_eq!(back["nested"], json!({ "empty": {} }));
        });
    }

    #[test]
    fn lenient_matches_stringify_rules() {
        with_ctx(|ctx| {
            let value: Value = ctx
                .eval("({ a: 1, f: function () {}, u: undefined, list: [undefined, () => 1], n: NaN, d: new Date(0) })")
                .unwrap();
            let json = to_json(&ctx, value, Mode::Lenient).unwrap().unwrap();
            assert_eq!(
                json,
                json!({ "a": 1, "list": [null, null], "n": null, "d": "1970-01-01T00:00:00.000Z" })
            );
        });
    }

    #[test]
    fn strict_rejects_functions_with_path() {
        with_ctx(|ctx| {
            let value: Value = ctx.eval("({ body: { cb: function () {} } })").unwrap();
            match to_json(&ctx, value, Mode::Strict) {
                Err(SandboxError::Unrepresentable { path }) => assert_eq!(path, "body.cb"),
                other => panic!("unexpected: {other:?}"),
            }
        });
    }

    #[test]
    fn cycles_are_rejected() {
        with_ctx(|ctx| {
            let value: Value = ctx.eval("(() => { const o = {}; o.self = o; return o; })()").unwrap();
            assert!(matches!(
                to_json(&ctx, value, Mode::Lenient),
                Err(SandboxError::Unrepresentable { .. })
            ));
        });
    }

    #[test]
    fn error_objects_keep_name_and_message() {
        with_ctx(|ctx| {
            let value: Value = ctx
                .eval("(() => { const e = new Error('oops'); e.name = 'Boom'; e.code = 7; return e; })()")
                .unwrap();
            let json = error_to_json(&ctx, value);
            assert_eq!(json["name"], "Boom");
            assert_eq!(json["message"], "oops");
            assert_eq!(json["code"], 7);
        });
    }

    #[test]
    fn thrown_exception_is_described() {
        with_ctx(|ctx| {
            let err = ctx.eval::<(), _>("throw new TypeError('bad')").unwrap_err();
            assert_eq!(exception_text(&ctx, &err), "TypeError: bad");
        });
    }
}
