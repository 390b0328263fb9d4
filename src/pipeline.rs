//! Demo functions bundled with the worker binary.
//!
//! A small extract/transform/load pipeline whose `main` entry point calls the
//! other stages through the dispatcher, producing a two-level call tree, plus a
//! couple of utility functions useful for smoke testing a deployment.

use crate::calls::types::Arguments;
use crate::proxy::{Dispatcher, FunctionRegistry};

use anyhow::{bail, Context};
use serde_json::{json, Value};

pub fn register_pipeline(registry: &FunctionRegistry) {
    registry.register("extract_data", extract_data);
    registry.register("transform_data", transform_data);
    registry.register("load_data", load_data);
    registry.register("main", run_pipeline);
    registry.register("add", add);
    registry.register("fail", fail);
}

async fn extract_data(_dispatcher: Dispatcher, _arguments: Arguments) -> anyhow::Result<Value> {
    tracing::info!("Extracting data from source...");
    Ok(json!({ "records": 100, "source": "database" }))
}

async fn transform_data(_dispatcher: Dispatcher, arguments: Arguments) -> anyhow::Result<Value> {
    let extraction: Value = arguments.get_arg(0)?;
    let records = record_count(&extraction)?;
    tracing::info!("Transforming {} records...", records);
    Ok(json!({
        "records": records,
        "transformed": true,
        "operations": ["clean", "normalize", "enrich"],
    }))
}

async fn load_data(_dispatcher: Dispatcher, arguments: Arguments) -> anyhow::Result<Value> {
    let transformed: Value = arguments.get_arg(0)?;
    let records = record_count(&transformed)?;
    tracing::info!("Loading {} transformed records...", records);
    Ok(json!({
        "records": records,
        "loaded": true,
        "destination": "data_warehouse",
    }))
}

/// Entry point: each stage runs as its own call, attributed to this one.
async fn run_pipeline(dispatcher: Dispatcher, _arguments: Arguments) -> anyhow::Result<Value> {
    tracing::info!("Starting workflow execution...");

    let data = dispatcher.invoke("extract_data", Arguments::new()).await?;
    let transformed = dispatcher
        .invoke("transform_data", Arguments::new().arg(&data)?)
        .await?;
    let loaded = dispatcher
        .invoke("load_data", Arguments::new().arg(&transformed)?)
        .await?;

    Ok(json!({
        "status": "success",
        "records_processed": record_count(&loaded)?,
    }))
}

async fn add(_dispatcher: Dispatcher, arguments: Arguments) -> anyhow::Result<Value> {
    let a: f64 = arguments.get_arg(0)?;
    let b: f64 = arguments.get_arg(1)?;
    Ok(json!(a + b))
}

async fn fail(_dispatcher: Dispatcher, arguments: Arguments) -> anyhow::Result<Value> {
    let reason: String = arguments
        .get_kwarg("reason")
        .unwrap_or_else(|_| "requested failure".to_string());
    bail!(reason)
}

fn record_count(stage_output: &Value) -> anyhow::Result<u64> {
    stage_output
        .get("records")
        .and_then(Value::as_u64)
        .context("stage output has no 'records' count")
}
