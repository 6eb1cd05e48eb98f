// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Name/alias bookkeeping for bandwidth-efficient DATA payloads.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use codec::{EdgeNodeDescriptor, SparkplugBPayload};

/// Alias registrations learned from birth certificates, per edge node.
///
/// A birth payload may pair metric names with numeric aliases; later DATA
/// payloads may then carry only the alias. [`AliasMap::apply`] restores
/// the names on such payloads.
#[derive(Debug, Default)]
pub struct AliasMap {
    by_node: Mutex<HashMap<EdgeNodeDescriptor, HashMap<u64, String>>>,
}

impl AliasMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn all name/alias pairs declared by a birth payload, replacing
    /// the node's previous registrations.
    pub fn register_birth(&self, node: &EdgeNodeDescriptor, payload: &SparkplugBPayload) {
        let aliases: HashMap<u64, String> = payload
            .alias_pairs()
            .map(|(name, alias)| (alias, name.to_string()))
            .collect();
        if aliases.is_empty() {
            return;
        }
        log::debug!("Registered {} aliases for {node}", aliases.len());
        self.lock().insert(node.clone(), aliases);
    }

    /// Resolve one alias for `node`.
    #[must_use]
    pub fn resolve(&self, node: &EdgeNodeDescriptor, alias: u64) -> Option<String> {
        self.lock().get(node).and_then(|map| map.get(&alias).cloned())
    }

    /// Fill in missing metric names on an alias-only payload.
    pub fn apply(&self, node: &EdgeNodeDescriptor, payload: &mut SparkplugBPayload) {
        let map = self.lock();
        let Some(aliases) = map.get(node) else {
            return;
        };
        for metric in &mut payload.metrics {
            if metric.name.is_none() {
                if let Some(name) = metric.alias.and_then(|a| aliases.get(&a)) {
                    metric.name = Some(name.clone());
                }
            }
        }
    }

    /// Drop the registrations of `node` (on NDEATH).
    pub fn forget(&self, node: &EdgeNodeDescriptor) {
        self.lock().remove(node);
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<EdgeNodeDescriptor, HashMap<u64, String>>> {
        self.by_node.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use codec::{Metric, MetricDataType, Value};

    use super::*;

    #[test]
    fn test_register_and_apply() {
        let node = EdgeNodeDescriptor::new("G", "E");
        let aliases = AliasMap::new();

        let mut birth = SparkplugBPayload::new();
        birth.add_metric(
            Metric::new("Inputs/A", MetricDataType::Int32, Value::Int32(0)).with_alias(1),
        );
        birth.add_metric(
            Metric::new("Inputs/B", MetricDataType::Int32, Value::Int32(0)).with_alias(2),
        );
        aliases.register_birth(&node, &birth);

        assert_eq!(aliases.resolve(&node, 1).as_deref(), Some("Inputs/A"));
        assert_eq!(aliases.resolve(&node, 3), None);

        let mut data = SparkplugBPayload::new();
        data.add_metric(Metric::by_alias(2, MetricDataType::Int32, Value::Int32(9)));
        aliases.apply(&node, &mut data);
        assert_eq!(data.metrics[0].name.as_deref(), Some("Inputs/B"));

        aliases.forget(&node);
        assert_eq!(aliases.resolve(&node, 1), None);
    }
}
