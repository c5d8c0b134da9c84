//! Shared fixtures: the test interfaces and a reference server.

// Each integration binary uses its own subset of these fixtures.
#![allow(dead_code)]

use capwire::{
    CallContext, Client, Error, Interface, MethodDescriptor, MethodResult, Params, Result, Server,
    Value, ValueType,
};
use parking_lot::{Mutex, MutexGuard};
use std::sync::OnceLock;

// One reactor per process; serialize tests that enter one.
static REACTOR_LOCK: Mutex<()> = Mutex::new(());

pub fn exclusive_reactor_access() -> MutexGuard<'static, ()> {
    REACTOR_LOCK.lock()
}

/// `TestInterface`: foo(i, j) -> (x), buz(i) -> (x), bam(i) -> (x, i).
///
/// Interface identity is by definition, so each fixture is built once and
/// shared; rebuilding per call would make ancestry checks miss.
pub fn test_interface() -> Interface {
    static IFACE: OnceLock<Interface> = OnceLock::new();
    IFACE
        .get_or_init(|| {
            Interface::builder("TestInterface")
                .method(
                    MethodDescriptor::new("foo")
                        .param("i", ValueType::Int)
                        .param("j", ValueType::Bool)
                        .result("x", ValueType::Text),
                )
                .method(
                    MethodDescriptor::new("buz")
                        .param("i", ValueType::Struct)
                        .result("x", ValueType::Text),
                )
                .method(
                    MethodDescriptor::new("bam")
                        .param("i", ValueType::Int)
                        .result("x", ValueType::Text)
                        .result("i", ValueType::Int),
                )
                .build()
        })
        .clone()
}

/// Reference implementation of `TestInterface` with a configurable
/// offset: foo computes `i * 5 + j + val`.
pub struct ValueServer {
    val: i64,
}

impl ValueServer {
    pub fn new(val: i64) -> Self {
        Self { val }
    }
}

impl Default for ValueServer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Server for ValueServer {
    fn dispatch_call(
        &mut self,
        method: &str,
        params: &Params,
        _context: &CallContext,
    ) -> Result<MethodResult> {
        match method {
            "foo" => {
                let i = params.get_int("i")?;
                let extra = i64::from(params.get_bool("j")?);
                Ok(MethodResult::Values(vec![Value::text(
                    (i * 5 + extra + self.val).to_string(),
                )]))
            }
            "buz" => {
                let host = params
                    .get("i")?
                    .as_struct()
                    .and_then(|fields| fields.get("host"))
                    .and_then(Value::as_text)
                    .unwrap_or_default()
                    .to_string();
                Ok(MethodResult::Values(vec![Value::text(format!(
                    "{host}_test"
                ))]))
            }
            "bam" => {
                let i = params.get_int("i")?;
                Ok(MethodResult::Values(vec![
                    Value::text(format!("{i}_test")),
                    Value::Int(i),
                ]))
            }
            other => Err(Error::failed(format!("unimplemented method `{other}`"))),
        }
    }
}

/// `TestPipeline`: getCap(n, inCap) -> (s, outBox{cap}).
pub fn pipeline_interface() -> Interface {
    static IFACE: OnceLock<Interface> = OnceLock::new();
    IFACE
        .get_or_init(|| {
            Interface::builder("TestPipeline")
                .method(
                    MethodDescriptor::new("getCap")
                        .param("n", ValueType::Int)
                        .cap_param("inCap", &test_interface())
                        .result("s", ValueType::Text)
                        .result("outBox", ValueType::Struct),
                )
                .build()
        })
        .clone()
}

/// Asynchronous `TestPipeline` implementation: calls `foo` on the passed
/// capability, then publishes a fresh offset-100 capability through the
/// result box.
pub struct PipelineServer;

impl Server for PipelineServer {
    fn dispatch_call(
        &mut self,
        method: &str,
        params: &Params,
        context: &CallContext,
    ) -> Result<MethodResult> {
        match method {
            "getCap" => {
                let n = params.get_int("n")?;
                let in_cap = params.get_capability("inCap")?;
                let reactor = context.reactor().clone();
                let context = context.clone();
                let done = in_cap
                    .call("foo")?
                    .arg("i", Value::Int(n))?
                    .send()?
                    .then(move |response| {
                        let x = response.get_text("x")?.to_string();
                        context.set_result("s", Value::text(format!("{x}_foo")))?;
                        context.set_result(
                            "outBox",
                            Value::struct_of([(
                                "cap",
                                Value::capability(Client::local(
                                    &reactor,
                                    test_interface(),
                                    ValueServer::new(100),
                                )),
                            )]),
                        )?;
                        Ok(())
                    });
                Ok(MethodResult::Async(done))
            }
            other => Err(Error::failed(format!("unimplemented method `{other}`"))),
        }
    }
}
