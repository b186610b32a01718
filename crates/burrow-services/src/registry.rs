// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use crate::Service;

/// Name-keyed service lookup with insertion order preserved, so fan-out and
/// diagnostics follow the configuration's declaration order.
#[derive(Default)]
pub struct Registry {
    order: Vec<String>,
    services: HashMap<String, Arc<dyn Service>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service; a second service with the same name is refused.
    pub fn register(&mut self, service: Arc<dyn Service>) -> anyhow::Result<()> {
        let name = service.name().to_string();
        if self.services.contains_key(&name) {
            anyhow::bail!("service {name:?} already registered");
        }
        self.order.push(name.clone());
        self.services.insert(name, service);
        Ok(())
    }

    pub fn get(&self, name: &str) -> anyhow::Result<Arc<dyn Service>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no service {name:?} registered"))
    }

    /// Registered names, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
