// Copyright 2025 Edge Kube Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Evaluates jq expressions over decoded values. Used throughout to
//! project and type-convert fields out of loosely typed cluster objects.

use crate::shared::error::{EdgeError, Result};
use jaq_interpret::{Ctx, FilterT, ParseCtx, RcIter, Val};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Runs `expr` against `input` and returns the yielded values in
/// evaluation order. A yielded error aborts the evaluation.
pub fn run(expr: &str, input: Value) -> Result<Vec<Value>> {
    let mut defs = ParseCtx::new(Vec::new());
    defs.insert_natives(jaq_core::core());
    defs.insert_defs(jaq_std::std());

    let (filter, errs) = jaq_parse::parse(expr, jaq_parse::main());
    if !errs.is_empty() {
        let details = errs
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(EdgeError::Query(format!(
            "failed to parse '{}': {}",
            expr, details
        )));
    }
    let filter = filter.ok_or_else(|| EdgeError::Query(format!("failed to parse '{}'", expr)))?;

    let filter = defs.compile(filter);
    if !defs.errs.is_empty() {
        return Err(EdgeError::Query(format!(
            "failed to compile '{}': {} unknown references",
            expr,
            defs.errs.len()
        )));
    }

    let inputs = RcIter::new(core::iter::empty());
    let mut results = Vec::new();
    for out in filter.run((Ctx::new([], &inputs), Val::from(input))) {
        match out {
            Ok(val) => results.push(Value::from(val)),
            // jaq raises an error when `[]?` iterates an absent path
            // where jq yields nothing. Callers probe optional paths
            // with the `?` forms and expect silence, so this error
            // class is dropped rather than surfaced.
            Err(e) if e.to_string().contains("cannot use null as iterable") => {}
            Err(e) => return Err(EdgeError::Query(format!("'{}': {}", expr, e))),
        }
    }
    Ok(results)
}

/// Runs `expr` against any serializable input and decodes the results
/// into `O`. A single yield fits any output; multiple yields fit only a
/// sequence output.
pub fn query<I: Serialize, O: DeserializeOwned>(expr: &str, input: &I) -> Result<O> {
    query_value(expr, serde_json::to_value(input)?)
}

pub fn query_string<O: DeserializeOwned>(expr: &str, text: &str) -> Result<O> {
    query_value(expr, serde_json::from_str(text)?)
}

pub fn query_bytes<O: DeserializeOwned>(expr: &str, bytes: &[u8]) -> Result<O> {
    query_value(expr, serde_json::from_slice(bytes)?)
}

pub fn query_value<O: DeserializeOwned>(expr: &str, input: Value) -> Result<O> {
    decode(run(expr, input)?)
}

/// A single yield decodes directly into `O`, falling back to the
/// one-element sequence form. Multiple yields decode as the array of
/// results, so an untyped `Value` output receives the whole array.
fn decode<O: DeserializeOwned>(results: Vec<Value>) -> Result<O> {
    if results.len() == 1 {
        if let Ok(out) = serde_json::from_value(results[0].clone()) {
            return Ok(out);
        }
        return Ok(serde_json::from_value(Value::Array(results))?);
    }
    let count = results.len();
    serde_json::from_value(Value::Array(results))
        .map_err(|_| EdgeError::UnmarshalMismatch { count })
}
