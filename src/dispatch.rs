// CacheLink Agent - Request Dispatcher
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Route -> Execute -> Encode for one request envelope.
// Every failure, including path guard denials, becomes a response with
// success=false. Decoding happens upstream in protocol::decode.

use crate::error::{AgentError, Result};
use crate::fs::CacheFs;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// The fixed operation set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListFiles,
    ReadFile,
    WriteFile,
    GetCacheInfo,
}

impl FromStr for Action {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "listFiles" => Ok(Self::ListFiles),
            "readFile" => Ok(Self::ReadFile),
            "writeFile" => Ok(Self::WriteFile),
            "getCacheInfo" => Ok(Self::GetCacheInfo),
            other => Err(AgentError::UnknownAction(other.to_string())),
        }
    }
}

// ============================================================================
// PARAMS
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    subdir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadParams {
    file_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteParams {
    file_path: String,
    data: String,
    /// Accepted for compatibility; payloads are always base64
    #[allow(dead_code)]
    encoding: Option<String>,
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T> {
    // Absent params behave like an empty object
    let params = if params.is_null() { Value::Object(Default::default()) } else { params.clone() };
    serde_json::from_value(params).map_err(|e| AgentError::InvalidParams(e.to_string()))
}

// ============================================================================
// DISPATCHER
// ============================================================================

pub struct Dispatcher {
    fs: CacheFs,
}

impl Dispatcher {
    pub fn new(fs: CacheFs) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &CacheFs {
        &self.fs
    }

    /// Handle one request. Never fails; errors are folded into the envelope.
    pub fn dispatch(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        match self.execute(&request.action, &request.params) {
            Ok(data) => {
                log::debug!("{} {} ok", request.request_id, request.action);
                ResponseEnvelope::ok(request.request_id.clone(), data)
            }
            Err(e) => {
                log::warn!("{} {} failed: {}", request.request_id, request.action, e);
                ResponseEnvelope::failed(request.request_id.clone(), &e)
            }
        }
    }

    fn execute(&self, action: &str, params: &Value) -> Result<Value> {
        let data = match action.parse::<Action>()? {
            Action::ListFiles => {
                let p: ListParams = parse_params(params)?;
                to_value(self.fs.list_files(p.subdir.as_deref())?)?
            }
            Action::ReadFile => {
                let p: ReadParams = parse_params(params)?;
                to_value(self.fs.read_file(&p.file_path)?)?
            }
            Action::WriteFile => {
                let p: WriteParams = parse_params(params)?;
                to_value(self.fs.write_file(&p.file_path, &p.data)?)?
            }
            Action::GetCacheInfo => to_value(self.fs.cache_info()?)?,
        };
        Ok(data)
    }
}

fn to_value<T: serde::Serialize>(v: T) -> Result<Value> {
    Ok(serde_json::to_value(v)?)
}

// ============================================================================
// TESTS
// ============================================================================
