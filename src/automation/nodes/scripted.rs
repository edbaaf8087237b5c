// SPDX-License-Identifier: MIT

//! Configuration-driven service backing the builtin node types
//!
//! The service answers with the data found in its configuration, or with the
//! event payload when none is configured, and takes the configured output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::{
    AutomationNode, DispatchContext, DispatchResult, Edge, NodeError, Service, ServiceError,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedConfig {
    /// Data returned by a dispatch. `null` returns the event payload.
    #[serde(default)]
    pub data: Value,

    /// Output taken after a dispatch
    #[serde(default)]
    pub output: String,

    /// Outputs besides the default one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,

    /// Label of the default output
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_label: String,

    /// Fail every dispatch as misconfigured with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misconfigured: Option<String>,

    /// Fail every dispatch with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedService {
    config: ScriptedConfig,
}

impl ScriptedService {
    pub fn new(config: ScriptedConfig) -> Self {
        Self { config }
    }

    pub fn from_value(value: &Value) -> Result<Self, NodeError> {
        if value.is_null() {
            return Ok(Self::new(ScriptedConfig::default()));
        }
        let config: ScriptedConfig = serde_json::from_value(value.clone())
            .map_err(|e| NodeError::MisconfiguredService(format!("Invalid service: {}", e)))?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &ScriptedConfig {
        &self.config
    }
}

#[async_trait]
impl Service for ScriptedService {
    fn edges(&self) -> Vec<Edge> {
        let mut edges = vec![Edge::new("", self.config.default_label.clone())];
        edges.extend(self.config.edges.iter().cloned());
        edges
    }

    fn export(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    async fn dispatch(
        &self,
        _node: &AutomationNode,
        context: &DispatchContext,
    ) -> Result<DispatchResult, ServiceError> {
        if let Some(message) = &self.config.misconfigured {
            return Err(ServiceError::ImproperlyConfigured(message.clone()));
        }
        if let Some(message) = &self.config.error {
            return Err(ServiceError::Failed(message.clone()));
        }

        let data = match &self.config.data {
            Value::Null => context.event_payload().clone(),
            data => data.clone(),
        };
        Ok(DispatchResult::new(data).with_output(self.config.output.clone()))
    }
}
