#![allow(dead_code)]

use alphasolve_core::sync::transport::PacketSink;
use alphasolve_core::{
    CellFunctionResult, Context, ExecutorError, FunctionExecutor, MetaFunctionResult, Packet,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type MetaScript = Box<dyn Fn(&str, &Context) -> Result<MetaFunctionResult, ExecutorError> + Send + Sync>;
type MainScript = Box<dyn Fn(&str, &Context) -> Result<CellFunctionResult, ExecutorError> + Send + Sync>;
type MacroScript = Box<dyn Fn(&str) -> Result<String, ExecutorError> + Send + Sync>;

/// Executor whose functions are closures registered per test.
#[derive(Default)]
pub struct ScriptedExecutor {
    metas: HashMap<String, MetaScript>,
    mains: HashMap<String, MainScript>,
    macros: HashMap<String, MacroScript>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meta(
        mut self,
        name: &str,
        script: impl Fn(&str, &Context) -> Result<MetaFunctionResult, ExecutorError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.metas.insert(name.to_string(), Box::new(script));
        self
    }

    pub fn main(
        mut self,
        name: &str,
        script: impl Fn(&str, &Context) -> Result<CellFunctionResult, ExecutorError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.mains.insert(name.to_string(), Box::new(script));
        self
    }

    pub fn proc_macro(
        mut self,
        name: &str,
        script: impl Fn(&str) -> Result<String, ExecutorError> + Send + Sync + 'static,
    ) -> Self {
        self.macros.insert(name.to_string(), Box::new(script));
        self
    }

    /// Names of every call received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl FunctionExecutor for ScriptedExecutor {
    async fn call_meta(
        &self,
        function_name: &str,
        text: &str,
        context: &Context,
    ) -> Result<MetaFunctionResult, ExecutorError> {
        self.record(function_name);
        match self.metas.get(function_name) {
            Some(script) => script(text, context),
            None => Err(ExecutorError::UnknownFunction(function_name.to_string())),
        }
    }

    async fn call_main(
        &self,
        function_name: &str,
        text: &str,
        context: &Context,
    ) -> Result<CellFunctionResult, ExecutorError> {
        self.record(function_name);
        match self.mains.get(function_name) {
            Some(script) => script(text, context),
            None => Err(ExecutorError::UnknownFunction(function_name.to_string())),
        }
    }

    async fn call_proc_macro(
        &self,
        function_name: &str,
        text: &str,
        _context: &Context,
    ) -> Result<String, ExecutorError> {
        self.record(function_name);
        match self.macros.get(function_name) {
            Some(script) => script(text),
            None => Err(ExecutorError::UnknownFunction(function_name.to_string())),
        }
    }
}

pub fn failed(function: &str) -> ExecutorError {
    ExecutorError::Failed {
        function: function.to_string(),
        message: "scripted failure".to_string(),
    }
}

/// Sink that keeps every packet handed to it.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Packet>>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Packet> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl PacketSink for RecordingSink {
    fn send(&self, packet: Packet) {
        self.sent.lock().unwrap().push(packet);
    }
}

/// Numerical value of `name` in `context`, if any.
pub fn value_of<'a>(context: &'a Context, name: &str) -> Option<&'a str> {
    context.get(name).and_then(|variable| variable.first_value())
}
